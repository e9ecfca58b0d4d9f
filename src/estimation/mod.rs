//! Glue between the compiled model and an outer estimation loop.
//!
//! Nothing here optimizes or samples a posterior. It collects the priors an
//! estimator needs, maps parameters to an unconstrained space and evaluates
//! the perturbation system for a batch of draws in parallel.

use indexmap::IndexMap;
use ndarray::{Array2, Axis};
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::distributions::Prior;
use crate::model::Model;
use crate::perturbation::PerturbationSystem;
use crate::stability::{blanchard_kahn, BlanchardKahn, StabilityOptions};

/// Priors of the estimated quantities: every parameter prior in declaration
/// order, then the `scale` hyper-prior of each shock keyed by the shock's
/// base name.
pub fn extract_prior_dict(model: &Model) -> IndexMap<String, Prior> {
    let mut priors = model.param_priors().clone();
    for (name, prior) in model.shock_priors() {
        let base_name = name.strip_suffix("[]").unwrap_or(name);
        match prior.rv_params().get("scale") {
            Some(scale) => {
                priors.insert(base_name.to_string(), scale.clone());
            }
            None => tracing::warn!(shock = base_name, "Shock prior has no prior on its scale"),
        }
    }
    priors
}

/// Map between a parameter's natural domain and the real line
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParameterTransform {
    #[default]
    Identity,
    /// Strictly positive parameters, `x = y²`
    Positive,
}

impl ParameterTransform {
    /// Unconstrained → natural domain
    pub fn constrain(&self, y: f64) -> f64 {
        match self {
            ParameterTransform::Identity => y,
            ParameterTransform::Positive => y * y,
        }
    }

    /// Natural domain → unconstrained
    pub fn unconstrain(&self, x: f64) -> f64 {
        match self {
            ParameterTransform::Identity => x,
            ParameterTransform::Positive => x.sqrt(),
        }
    }
}

/// Sum of the prior log densities at `values`, given in prior order.
///
/// A length mismatch reads as an impossible point.
pub fn log_prior_density(priors: &IndexMap<String, Prior>, values: &[f64]) -> f64 {
    if priors.len() != values.len() {
        return f64::NEG_INFINITY;
    }
    priors
        .values()
        .zip(values)
        .map(|(prior, &x)| prior.logpdf(x))
        .sum()
}

/// One row per draw, one column per prior, in prior order
pub fn sample_prior_draws<R: Rng + ?Sized>(
    priors: &IndexMap<String, Prior>,
    n_draws: usize,
    rng: &mut R,
) -> Array2<f64> {
    let mut draws = Array2::zeros((n_draws, priors.len()));
    for mut row in draws.axis_iter_mut(Axis(0)) {
        for (x, prior) in row.iter_mut().zip(priors.values()) {
            *x = prior.sample(rng);
        }
    }
    draws
}

/// Build the system matrices for every row of `draws` (free parameters in
/// [PerturbationSystem::free_params] order) and run the Blanchard–Kahn check.
///
/// A draw that produces an invalid system shows up as
/// [BlanchardKahn::NoValidDecomposition] in its slot.
pub fn evaluate_draws(system: &PerturbationSystem, draws: &Array2<f64>, tol: f64) -> Vec<BlanchardKahn> {
    let options = StabilityOptions::new().with_tol(tol);
    let outcomes: Vec<BlanchardKahn> = draws
        .axis_iter(Axis(0))
        .into_par_iter()
        .map(|row| {
            let values = row.to_vec();
            let m = system.build_from_slice(&values);
            blanchard_kahn(&m.a, &m.b, &m.c, &options)
        })
        .collect();

    tracing::debug!(
        draws = outcomes.len(),
        satisfied = outcomes.iter().filter(|o| o.is_satisfied()).count(),
        "Evaluated parameter draws"
    );
    outcomes
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_transforms() {
        let t = ParameterTransform::Positive;
        assert_relative_eq!(t.constrain(-3.0), 9.0);
        assert_relative_eq!(t.unconstrain(t.constrain(0.7)), 0.7, epsilon = 1e-12);
        assert_relative_eq!(ParameterTransform::Identity.constrain(-3.0), -3.0);
        assert_eq!(ParameterTransform::default(), ParameterTransform::Identity);
    }

    #[test]
    fn test_log_prior_density() {
        let raw: IndexMap<String, String> = [
            ("a".to_string(), "N(mean = 0, sd = 1)".to_string()),
            ("b".to_string(), "N(mean = 1, sd = 2)".to_string()),
        ]
        .into_iter()
        .collect();
        let (priors, _) = crate::distributions::create_prior_distribution_dictionary(&raw).unwrap();

        let expected = priors["a"].logpdf(0.5) + priors["b"].logpdf(-1.0);
        assert_relative_eq!(log_prior_density(&priors, &[0.5, -1.0]), expected);
        assert_eq!(log_prior_density(&priors, &[0.5]), f64::NEG_INFINITY);
    }

    #[test]
    fn test_sample_prior_draws_respects_support() {
        use rand::rngs::StdRng;
        use rand::SeedableRng;

        let raw: IndexMap<String, String> = [
            ("rho".to_string(), "Beta(a = 2, b = 2)".to_string()),
            ("sigma".to_string(), "Gamma(a = 2, rate = 4)".to_string()),
        ]
        .into_iter()
        .collect();
        let (priors, _) = crate::distributions::create_prior_distribution_dictionary(&raw).unwrap();

        let mut rng = StdRng::seed_from_u64(7);
        let draws = sample_prior_draws(&priors, 200, &mut rng);
        assert_eq!(draws.dim(), (200, 2));
        assert!(draws.column(0).iter().all(|&x| x > 0.0 && x < 1.0));
        assert!(draws.column(1).iter().all(|&x| x > 0.0));
        assert!(log_prior_density(&priors, &draws.row(0).to_vec()).is_finite());
    }
}
