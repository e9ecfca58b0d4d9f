//! Prior distributions declared with `name ~ Kind(param = value, ...)`.
//!
//! Strings are validated by [preprocess_distribution_string], realized by
//! [distribution_factory], and resolved as a whole (hierarchical priors
//! included) by [create_prior_distribution_dictionary].

pub mod hierarchy;
pub mod kinds;
pub mod parse;
pub mod prior;
mod truncated;

pub use hierarchy::{create_prior_distribution_dictionary, PriorDictionaries};
pub use kinds::{Distribution, DistributionKind, Parametrization};
pub use parse::{preprocess_distribution_string, ParamValue};
pub use prior::{distribution_factory, hierarchical_distribution_factory, Prior};
