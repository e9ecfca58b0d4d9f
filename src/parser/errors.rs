//! Error types for GCN parsing and prior validation

use thiserror::Error;

/// Errors raised while reading a GCN file or one of its distribution strings.
///
/// Parsing stops at the first error. Every variant carries the raw source
/// fragment that triggered it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ParseError {
    // ─────────────────────────────────────────────────────────────────────────
    // Structural Errors
    // ─────────────────────────────────────────────────────────────────────────
    /// Unbalanced braces or parentheses
    #[error("Unbalanced '{delimiter}' in {context}: \"{fragment}\"")]
    Parsing {
        delimiter: char,
        context: String,
        fragment: String,
    },

    /// Anything else the grammar does not accept
    #[error("Syntax error in {context}: {message} (\"{fragment}\")")]
    Syntax {
        context: String,
        message: String,
        fragment: String,
    },

    // ─────────────────────────────────────────────────────────────────────────
    // Distribution Errors
    // ─────────────────────────────────────────────────────────────────────────
    /// `=` used where `~` was meant, or the other way around
    #[error("Could not parse distribution for '{name}': {reason} (\"{fragment}\")")]
    DistributionParsing {
        name: String,
        reason: String,
        fragment: String,
    },

    /// Unknown kind, wrong parameters or bad parenthesization
    #[error("Invalid distribution for '{name}': {reason} (\"{fragment}\")")]
    InvalidDistribution {
        name: String,
        reason: String,
        fragment: String,
    },

    /// A calibrated parameter with a prior but no `= initial_value`
    #[error("Parameter '{name}' has a prior but no initial value (\"{fragment}\")")]
    MissingParameterValue { name: String, fragment: String },

    /// The same distribution parameter given twice
    #[error("Distribution parameter '{parameter}' is repeated for '{name}' (\"{fragment}\")")]
    RepeatedParameter {
        name: String,
        parameter: String,
        fragment: String,
    },
}

impl ParseError {
    pub fn unbalanced(delimiter: char, context: impl Into<String>, fragment: impl Into<String>) -> Self {
        Self::Parsing {
            delimiter,
            context: context.into(),
            fragment: fragment.into(),
        }
    }

    pub fn syntax(
        context: impl Into<String>,
        message: impl Into<String>,
        fragment: impl Into<String>,
    ) -> Self {
        Self::Syntax {
            context: context.into(),
            message: message.into(),
            fragment: fragment.into(),
        }
    }

    pub fn distribution_parsing(
        name: impl Into<String>,
        reason: impl Into<String>,
        fragment: impl Into<String>,
    ) -> Self {
        Self::DistributionParsing {
            name: name.into(),
            reason: reason.into(),
            fragment: fragment.into(),
        }
    }

    pub fn invalid_distribution(
        name: impl Into<String>,
        reason: impl Into<String>,
        fragment: impl Into<String>,
    ) -> Self {
        Self::InvalidDistribution {
            name: name.into(),
            reason: reason.into(),
            fragment: fragment.into(),
        }
    }
}
