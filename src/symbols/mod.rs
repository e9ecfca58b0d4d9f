//! Time-aware symbols and the [SymbolDictionary] container.
//!
//! Every model variable carries an explicit time index (`x[-1]`, `x[]`,
//! `x[1]`, `x[ss]`). Parameters are plain symbols and ignore time shifts.

pub mod assumptions;
pub mod dictionary;
pub mod time_aware;

pub use assumptions::{Assumption, Assumptions};
pub use dictionary::{DictKey, KeyMode, SymbolDictionary};
pub use time_aware::{Symbol, TimeAwareSymbol, TimeIndex};

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SymbolError {
    /// A key of the wrong kind was inserted into a dictionary whose mode is fixed
    #[error("Cannot insert {found} key '{key}' into a dictionary holding {expected} keys")]
    KeyModeMismatch {
        key: String,
        expected: KeyMode,
        found: KeyMode,
    },
    /// Two populated dictionaries with different key modes were merged
    #[error("Cannot merge a dictionary of {left} keys with a dictionary of {right} keys")]
    MergeModeMismatch { left: KeyMode, right: KeyMode },
    #[error("'{0}' is not a valid time-aware symbol name")]
    InvalidSafeName(String),
    #[error("Value for '{key}' is not numeric: {value}")]
    NonNumericValue { key: String, value: String },
    #[error("Unknown assumption '{0}'")]
    UnknownAssumption(String),
}
