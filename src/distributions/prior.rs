use indexmap::IndexMap;
use rand::Rng;
use serde::Serialize;

use super::{Distribution, DistributionKind, ParamValue};
use crate::parser::ParseError;

/// A realized prior for one model variable.
///
/// `params` keeps the declared (canonical) parameter values, symbolic ones
/// included. `rv_params` holds the nested prior for each parameter whose value
/// refers to another declared prior.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prior {
    name: String,
    distribution: Distribution,
    params: IndexMap<String, ParamValue>,
    rv_params: IndexMap<String, Prior>,
    initial_value: Option<f64>,
}

impl Prior {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> DistributionKind {
        self.distribution.kind()
    }

    pub fn distribution(&self) -> &Distribution {
        &self.distribution
    }

    pub fn params(&self) -> &IndexMap<String, ParamValue> {
        &self.params
    }

    pub fn rv_params(&self) -> &IndexMap<String, Prior> {
        &self.rv_params
    }

    pub fn is_hierarchical(&self) -> bool {
        !self.rv_params.is_empty()
    }

    pub fn initial_value(&self) -> Option<f64> {
        self.initial_value
    }

    pub fn with_initial_value(mut self, value: Option<f64>) -> Self {
        self.initial_value = value;
        self
    }

    pub fn mean(&self) -> f64 {
        self.distribution.mean()
    }

    pub fn std(&self) -> f64 {
        self.distribution.std()
    }

    pub fn var(&self) -> f64 {
        self.distribution.var()
    }

    pub fn logpdf(&self, x: f64) -> f64 {
        self.distribution.logpdf(x)
    }

    pub fn pdf(&self, x: f64) -> f64 {
        self.distribution.pdf(x)
    }

    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        self.distribution.sample(rng)
    }
}

fn render(kind: DistributionKind, params: &IndexMap<String, ParamValue>) -> String {
    let inner: Vec<String> = params
        .iter()
        .map(|(k, v)| format!("{} = {}", k, v))
        .collect();
    format!("{}({})", kind, inner.join(", "))
}

/// Instantiate a prior whose parameters are all literals.
pub fn distribution_factory(
    name: &str,
    kind: DistributionKind,
    params: &IndexMap<String, ParamValue>,
) -> Result<Prior, ParseError> {
    hierarchical_distribution_factory(name, kind, params, &IndexMap::new())
}

/// Instantiate a prior whose symbolic parameters are resolved through
/// `parents` (canonical parameter → already realized prior).
///
/// A symbolic parameter takes the mean of its parent.
pub fn hierarchical_distribution_factory(
    name: &str,
    kind: DistributionKind,
    params: &IndexMap<String, ParamValue>,
    parents: &IndexMap<String, Prior>,
) -> Result<Prior, ParseError> {
    let mut numeric = IndexMap::with_capacity(params.len());
    let mut rv_params = IndexMap::new();
    for (param, value) in params {
        let v = match value {
            ParamValue::Literal(v) => *v,
            ParamValue::Symbol(reference) => {
                let parent = parents.get(param).ok_or_else(|| {
                    ParseError::invalid_distribution(
                        name,
                        format!("'{}' is not a declared prior", reference),
                        render(kind, params),
                    )
                })?;
                rv_params.insert(param.clone(), parent.clone());
                parent.mean()
            }
        };
        numeric.insert(param.clone(), v);
    }

    let distribution = Distribution::from_params(kind, &numeric)
        .map_err(|reason| ParseError::invalid_distribution(name, reason, render(kind, params)))?;

    tracing::trace!(
        name,
        kind = %kind,
        hierarchical = !rv_params.is_empty(),
        "Built prior"
    );
    Ok(Prior {
        name: name.to_string(),
        distribution,
        params: params.clone(),
        rv_params,
        initial_value: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::preprocess_distribution_string;
    use approx::assert_relative_eq;

    fn build(name: &str, text: &str) -> Result<Prior, ParseError> {
        let (kind, params) = preprocess_distribution_string(name, text)?;
        distribution_factory(name, kind, &params)
    }

    #[test]
    fn test_factory_moments() {
        let d = build("x", "N(mean = 0, sd = 1)").unwrap();
        assert_eq!(d.mean(), 0.0);
        assert_eq!(d.std(), 1.0);
        assert!(!d.is_hierarchical());

        let d = build("x", "beta(a = 1, b = 1)").unwrap();
        assert_eq!(d.mean(), 0.5);

        let cases = [
            ("Beta(mean = 0.5, sd = 0.1)", 0.5, 0.1),
            ("Gamma(mean = 2, sd = 0.5)", 2.0, 0.5),
            ("inv_gamma(mean = 0.1, sd = 0.05)", 0.1, 0.05),
            ("halfnorm(mean = 1, sd = 0.3)", 1.0, 0.3),
            ("exp(mean = 3)", 3.0, 3.0),
            ("U(min = 0, max = 1)", 0.5, (1.0f64 / 12.0).sqrt()),
        ];
        for (text, mean, sd) in cases {
            let d = build("x", text).unwrap();
            assert_relative_eq!(d.mean(), mean, max_relative = 1e-10);
            assert_relative_eq!(d.std(), sd, max_relative = 1e-10);
        }
    }

    #[test]
    fn test_symbolic_parameter_needs_a_parent() {
        let err = build("alpha", "N(mean = mu_alpha, sd = 1)").unwrap_err();
        assert!(matches!(err, ParseError::InvalidDistribution { .. }));
    }

    #[test]
    fn test_infeasible_moments_are_invalid() {
        let err = build("rho", "Beta(mean = 0.5, sd = 0.9)").unwrap_err();
        assert!(matches!(err, ParseError::InvalidDistribution { .. }));
    }

    #[test]
    fn test_hierarchical_uses_parent_means() {
        let sigma = build("sigma_alpha", "inv_gamma(a = 20, scale = 1)").unwrap();
        let mu = build("mu_alpha", "N(mean = 1, scale = 1)").unwrap();
        let (kind, params) =
            preprocess_distribution_string("alpha", "N(mean = mu_alpha, sd = sigma_alpha)").unwrap();

        let parents: IndexMap<String, Prior> = [("loc".to_string(), mu), ("scale".to_string(), sigma)]
            .into_iter()
            .collect();
        let d = hierarchical_distribution_factory("alpha", kind, &params, &parents).unwrap();

        assert!(d.is_hierarchical());
        assert_relative_eq!(d.mean(), 1.0);
        assert_relative_eq!(d.std(), 1.0 / 19.0, max_relative = 1e-12);
        assert_relative_eq!(d.rv_params()["loc"].std(), 1.0);
        assert_relative_eq!(d.rv_params()["scale"].mean(), 1.0 / 19.0, max_relative = 1e-12);
    }
}
