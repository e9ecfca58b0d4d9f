use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::SymbolError;

/// A single property attached to a symbol at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Assumption {
    Real,
    Positive,
    Negative,
    Nonnegative,
    Nonpositive,
    Integer,
}

impl FromStr for Assumption {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "real" => Ok(Assumption::Real),
            "positive" => Ok(Assumption::Positive),
            "negative" => Ok(Assumption::Negative),
            "nonnegative" => Ok(Assumption::Nonnegative),
            "nonpositive" => Ok(Assumption::Nonpositive),
            "integer" => Ok(Assumption::Integer),
            other => Err(SymbolError::UnknownAssumption(other.to_string())),
        }
    }
}

impl fmt::Display for Assumption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Assumption::Real => "real",
            Assumption::Positive => "positive",
            Assumption::Negative => "negative",
            Assumption::Nonnegative => "nonnegative",
            Assumption::Nonpositive => "nonpositive",
            Assumption::Integer => "integer",
        };
        write!(f, "{}", name)
    }
}

/// The set of [Assumption]s carried by a symbol.
///
/// Assumptions never take part in symbol equality or hashing; two symbols with
/// the same name and time index are the same symbol regardless of what is
/// assumed about them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Assumptions(BTreeSet<Assumption>);

impl Assumptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an assumption, returning the updated set
    pub fn with(mut self, assumption: Assumption) -> Self {
        self.0.insert(assumption);
        self
    }

    pub fn insert(&mut self, assumption: Assumption) -> bool {
        self.0.insert(assumption)
    }

    pub fn contains(&self, assumption: Assumption) -> bool {
        self.0.contains(&assumption)
    }

    pub fn is_positive(&self) -> bool {
        self.contains(Assumption::Positive)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Assumption> {
        self.0.iter()
    }

    /// Union of two assumption sets
    pub fn union(&self, other: &Assumptions) -> Assumptions {
        Assumptions(self.0.union(&other.0).copied().collect())
    }

    /// Merge `other` into `self`
    pub fn extend(&mut self, other: &Assumptions) {
        self.0.extend(other.0.iter().copied());
    }
}

impl FromIterator<Assumption> for Assumptions {
    fn from_iter<I: IntoIterator<Item = Assumption>>(iter: I) -> Self {
        Assumptions(iter.into_iter().collect())
    }
}

impl fmt::Display for Assumptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<String> = self.0.iter().map(|a| a.to_string()).collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}
