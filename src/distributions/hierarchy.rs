//! Resolution of priors whose parameters refer to other declared priors.

use std::collections::HashMap;

use indexmap::IndexMap;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};

use super::parse::{preprocess_distribution_string, ParamValue};
use super::prior::{hierarchical_distribution_factory, Prior};
use super::DistributionKind;
use crate::parser::ParseError;

/// Priors in declaration order, and the subset of them that other priors
/// depend on (the hyper-priors).
pub type PriorDictionaries = (IndexMap<String, Prior>, IndexMap<String, Prior>);

fn strip_time(name: &str) -> &str {
    name.strip_suffix("[]").unwrap_or(name)
}

// Declared name for a reference: exact display name first, then base name.
fn resolve(declared: &IndexMap<String, String>, reference: &str) -> Option<usize> {
    declared
        .get_index_of(reference)
        .or_else(|| {
            declared
                .keys()
                .position(|name| strip_time(name) == strip_time(reference))
        })
}

/// Validate and instantiate every raw `name → distribution string` entry.
///
/// Priors without symbolic parameters are built first; a dependent prior is
/// built from the means of the priors it references. References to names
/// that are not declared priors, self references, and cycles are
/// [ParseError::InvalidDistribution].
pub fn create_prior_distribution_dictionary(
    raw: &IndexMap<String, String>,
) -> Result<PriorDictionaries, ParseError> {
    let mut specs: Vec<(DistributionKind, IndexMap<String, ParamValue>)> =
        Vec::with_capacity(raw.len());
    for (name, text) in raw {
        specs.push(preprocess_distribution_string(name, text)?);
    }

    let mut graph: DiGraph<usize, ()> = DiGraph::with_capacity(raw.len(), raw.len());
    let nodes: Vec<NodeIndex> = (0..raw.len()).map(|i| graph.add_node(i)).collect();

    // (dependent, canonical parameter) → dependency
    let mut links: HashMap<(usize, String), usize> = HashMap::new();
    for (i, (name, text)) in raw.iter().enumerate() {
        for (param, value) in &specs[i].1 {
            let Some(reference) = value.as_symbol() else {
                continue;
            };
            let j = resolve(raw, reference).ok_or_else(|| {
                ParseError::invalid_distribution(
                    name.as_str(),
                    format!("'{}' is not a declared prior", reference),
                    text.as_str(),
                )
            })?;
            if i == j {
                return Err(ParseError::invalid_distribution(
                    name.as_str(),
                    "a prior cannot depend on itself",
                    text.as_str(),
                ));
            }
            graph.add_edge(nodes[j], nodes[i], ());
            links.insert((i, param.clone()), j);
        }
    }

    let order = toposort(&graph, None).map_err(|cycle| {
        let i = graph[cycle.node_id()];
        let (name, text) = raw
            .get_index(i)
            .map(|(n, t)| (n.as_str(), t.as_str()))
            .unwrap_or_default();
        ParseError::invalid_distribution(name, "circular prior dependency", text)
    })?;

    let mut realized: Vec<Option<Prior>> = vec![None; raw.len()];
    for node in order {
        let i = graph[node];
        let name = raw.get_index(i).map(|(n, _)| n.as_str()).unwrap_or_default();
        let (kind, params) = &specs[i];
        let mut parents = IndexMap::new();
        for param in params.keys() {
            if let Some(&j) = links.get(&(i, param.clone())) {
                if let Some(parent) = &realized[j] {
                    parents.insert(param.clone(), parent.clone());
                }
            }
        }
        realized[i] = Some(hierarchical_distribution_factory(
            name, *kind, params, &parents,
        )?);
    }

    let hyper: Vec<bool> = (0..raw.len())
        .map(|j| links.values().any(|&dep| dep == j))
        .collect();

    let mut priors = IndexMap::with_capacity(raw.len());
    let mut hyper_priors = IndexMap::new();
    for ((name, prior), is_hyper) in raw.keys().zip(realized).zip(hyper) {
        let Some(prior) = prior else { continue };
        if is_hyper {
            hyper_priors.insert(name.clone(), prior.clone());
        }
        priors.insert(name.clone(), prior);
    }

    tracing::debug!(
        priors = priors.len(),
        hyper_priors = hyper_priors.len(),
        "Resolved prior dictionary"
    );
    Ok((priors, hyper_priors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::preprocess_gcn;
    use approx::assert_relative_eq;

    fn raw(entries: &[(&str, &str)]) -> IndexMap<String, String> {
        entries
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_compound_distribution() {
        let text = r#"
            Block TEST
            {
                calibration
                {
                    sigma_alpha ~ inv_gamma(a=20, scale=1) = 0.01;
                    mu_alpha ~ N(mean = 1, scale=1) = 0.01;
                    alpha ~ N(mean = mu_alpha, sd = sigma_alpha) = 0.5;
                };
            };
        "#;
        let (_, raw_priors) = preprocess_gcn(text).unwrap();
        let (priors, hyper) = create_prior_distribution_dictionary(&raw_priors).unwrap();

        let d = &priors["alpha"];
        assert_relative_eq!(d.rv_params()["loc"].mean(), 1.0);
        assert_relative_eq!(d.rv_params()["loc"].std(), 1.0);
        assert_relative_eq!(d.rv_params()["scale"].mean(), 1.0 / 19.0, max_relative = 1e-12);
        assert_relative_eq!(
            d.rv_params()["scale"].var(),
            1.0 / (19.0f64.powi(2) * 18.0),
            max_relative = 1e-12
        );

        assert_eq!(
            priors.keys().collect::<Vec<_>>(),
            vec!["sigma_alpha", "mu_alpha", "alpha"]
        );
        assert_eq!(
            hyper.keys().collect::<Vec<_>>(),
            vec!["sigma_alpha", "mu_alpha"]
        );
    }

    #[test]
    fn test_multiple_shocks() {
        let text = r#"
            Block TEST
            {
                identities
                {
                    log(A[]) = rho_A * log(A[-1]) + epsilon_A[];
                    log(B[]) = rho_B * log(B[-1]) + epsilon_B[];
                };

                shocks
                {
                    epsilon_A[] ~ N(mean=0, sd=sigma_epsilon_A);
                    epsilon_B[] ~ N(mean=0, sd=sigma_epsilon_B);
                };

                calibration
                {
                    rho_A ~ Beta(mean=0.95, sd=0.04) = 0.95;
                    rho_B ~ Beta(mean=0.95, sd=0.04) = 0.95;

                    sigma_epsilon_A ~ Gamma(alpha=1, beta=0.1) = 0.01;
                    sigma_epsilon_B ~ Gamma(alpha=1, beta=0.1) = 0.01;
                };
            };
        "#;
        let (_, raw_priors) = preprocess_gcn(text).unwrap();
        let (priors, _) = create_prior_distribution_dictionary(&raw_priors).unwrap();

        assert_eq!(priors.len(), 6);
        assert_eq!(priors["epsilon_A[]"].rv_params().len(), 1);
        assert_eq!(priors["epsilon_B[]"].rv_params().len(), 1);
        assert_relative_eq!(priors["epsilon_A[]"].std(), 10.0, max_relative = 1e-12);
    }

    #[test]
    fn test_declaration_order_does_not_matter() {
        let priors = raw(&[
            ("alpha", "N(mean = mu, sd = 0.1)"),
            ("mu", "N(mean = 0.3, sd = 0.1)"),
        ]);
        let (priors, _) = create_prior_distribution_dictionary(&priors).unwrap();
        assert_relative_eq!(priors["alpha"].mean(), 0.3);
        assert_eq!(priors.get_index(0).map(|(k, _)| k.as_str()), Some("alpha"));
    }

    #[test]
    fn test_reference_by_base_name() {
        let priors = raw(&[
            ("eps[]", "N(mean = 0, sd = 0.2)"),
            ("x", "N(mean = eps, sd = 1)"),
        ]);
        let (priors, hyper) = create_prior_distribution_dictionary(&priors).unwrap();
        assert!(priors["x"].is_hierarchical());
        assert!(hyper.contains_key("eps[]"));
    }

    #[test]
    fn test_bad_references() {
        let undeclared = raw(&[("alpha", "N(mean = beta, sd = 1)")]);
        let own = raw(&[("alpha", "N(mean = alpha, sd = 1)")]);
        let cycle = raw(&[
            ("a", "N(mean = b, sd = 1)"),
            ("b", "N(mean = a, sd = 1)"),
        ]);
        for priors in [undeclared, own, cycle] {
            assert!(matches!(
                create_prior_distribution_dictionary(&priors),
                Err(ParseError::InvalidDistribution { .. })
            ));
        }
    }

    #[test]
    fn test_validation_errors_propagate() {
        let priors = raw(&[("alpha", "N(mean = 0, mean = 1)")]);
        assert!(matches!(
            create_prior_distribution_dictionary(&priors),
            Err(ParseError::RepeatedParameter { .. })
        ));
    }
}
