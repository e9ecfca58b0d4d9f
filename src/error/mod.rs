use thiserror::Error;

use crate::expr::ExprError;
use crate::model::ModelError;
use crate::parser::ParseError;
use crate::perturbation::PerturbationError;
use crate::stability::StabilityError;
use crate::symbols::SymbolError;

#[derive(Error, Debug)]
pub enum GeconError {
    #[error("Error while parsing the model: {0}")]
    ParseError(#[from] ParseError),
    #[error("Error in a symbol dictionary: {0}")]
    SymbolError(#[from] SymbolError),
    #[error("Error while evaluating an expression: {0}")]
    ExprError(#[from] ExprError),
    #[error("Error while assembling the model: {0}")]
    ModelError(#[from] ModelError),
    #[error("Error in the perturbation system: {0}")]
    PerturbationError(#[from] PerturbationError),
    #[error("Error in the stability check: {0}")]
    StabilityError(#[from] StabilityError),
    #[error("Invalid steady-state solution: {0}")]
    SteadyStateError(#[from] serde_json::Error),
}
