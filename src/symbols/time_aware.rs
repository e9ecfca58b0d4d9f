use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use super::{Assumptions, SymbolError};

/// Position of a variable in time relative to the current period.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum TimeIndex {
    Offset(i32),
    SteadyState,
}

impl TimeIndex {
    /// Shift by `delta` periods. The steady state is a fixed point.
    pub fn shift(self, delta: i32) -> TimeIndex {
        match self {
            TimeIndex::Offset(t) => TimeIndex::Offset(t + delta),
            TimeIndex::SteadyState => TimeIndex::SteadyState,
        }
    }

    pub fn offset(self) -> Option<i32> {
        match self {
            TimeIndex::Offset(t) => Some(t),
            TimeIndex::SteadyState => None,
        }
    }

    fn suffix(self) -> String {
        match self {
            TimeIndex::Offset(0) => "t".to_string(),
            TimeIndex::Offset(t) if t < 0 => format!("tm{}", -t),
            TimeIndex::Offset(t) => format!("tp{}", t),
            TimeIndex::SteadyState => "ss".to_string(),
        }
    }

    fn from_suffix(suffix: &str) -> Option<TimeIndex> {
        match suffix {
            "t" => Some(TimeIndex::Offset(0)),
            "ss" => Some(TimeIndex::SteadyState),
            s => {
                if let Some(n) = s.strip_prefix("tm") {
                    parse_lag(n).map(|n| TimeIndex::Offset(-n))
                } else if let Some(n) = s.strip_prefix("tp") {
                    parse_lag(n).map(TimeIndex::Offset)
                } else {
                    None
                }
            }
        }
    }
}

fn parse_lag(digits: &str) -> Option<i32> {
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse::<i32>().ok().filter(|n| *n > 0)
}

/// A model variable at a specific point in time.
///
/// Identity (equality, hashing and ordering) is `(base_name, time_index)`.
/// Assumptions travel with the symbol but are ignored when comparing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeAwareSymbol {
    base_name: String,
    time_index: TimeIndex,
    #[serde(default)]
    assumptions: Assumptions,
}

impl TimeAwareSymbol {
    pub fn new(base_name: impl Into<String>, time_index: TimeIndex) -> Self {
        Self {
            base_name: base_name.into(),
            time_index,
            assumptions: Assumptions::default(),
        }
    }

    pub fn with_assumptions(mut self, assumptions: Assumptions) -> Self {
        self.assumptions = assumptions;
        self
    }

    /// Shorthand for a symbol at offset `t`
    pub fn at(base_name: impl Into<String>, t: i32) -> Self {
        Self::new(base_name, TimeIndex::Offset(t))
    }

    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn time_index(&self) -> TimeIndex {
        self.time_index
    }

    pub fn assumptions(&self) -> &Assumptions {
        &self.assumptions
    }

    pub fn is_steady_state(&self) -> bool {
        self.time_index == TimeIndex::SteadyState
    }

    pub fn shift(&self, delta: i32) -> Self {
        Self {
            base_name: self.base_name.clone(),
            time_index: self.time_index.shift(delta),
            assumptions: self.assumptions.clone(),
        }
    }

    pub fn step_forward(&self) -> Self {
        self.shift(1)
    }

    pub fn step_backward(&self) -> Self {
        self.shift(-1)
    }

    pub fn to_ss(&self) -> Self {
        Self {
            base_name: self.base_name.clone(),
            time_index: TimeIndex::SteadyState,
            assumptions: self.assumptions.clone(),
        }
    }

    /// Same base name and assumptions at a different time index
    pub fn set_t(&self, time_index: TimeIndex) -> Self {
        Self {
            base_name: self.base_name.clone(),
            time_index,
            assumptions: self.assumptions.clone(),
        }
    }

    /// Identifier-safe string form: `x_t`, `x_tm1`, `x_tp1`, `x_ss`.
    pub fn safe_name(&self) -> String {
        format!("{}_{}", self.base_name, self.time_index.suffix())
    }

    /// Inverse of [TimeAwareSymbol::safe_name].
    pub fn from_safe_name(name: &str) -> Result<Self, SymbolError> {
        let (base, suffix) = name
            .rsplit_once('_')
            .ok_or_else(|| SymbolError::InvalidSafeName(name.to_string()))?;
        if base.is_empty() {
            return Err(SymbolError::InvalidSafeName(name.to_string()));
        }
        let time_index = TimeIndex::from_suffix(suffix)
            .ok_or_else(|| SymbolError::InvalidSafeName(name.to_string()))?;
        Ok(Self::new(base, time_index))
    }
}

impl PartialEq for TimeAwareSymbol {
    fn eq(&self, other: &Self) -> bool {
        self.base_name == other.base_name && self.time_index == other.time_index
    }
}

impl Eq for TimeAwareSymbol {}

impl Hash for TimeAwareSymbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.base_name.hash(state);
        self.time_index.hash(state);
    }
}

impl PartialOrd for TimeAwareSymbol {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimeAwareSymbol {
    fn cmp(&self, other: &Self) -> Ordering {
        self.base_name
            .cmp(&other.base_name)
            .then(self.time_index.cmp(&other.time_index))
    }
}

/// Renders in GCN form: `K[]`, `K[-1]`, `K[1]`, `K[ss]`.
impl fmt::Display for TimeAwareSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.time_index {
            TimeIndex::Offset(0) => write!(f, "{}[]", self.base_name),
            TimeIndex::Offset(t) => write!(f, "{}[{}]", self.base_name, t),
            TimeIndex::SteadyState => write!(f, "{}[ss]", self.base_name),
        }
    }
}

/// Any symbol that can appear in a model expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Symbol {
    /// A parameter, unaffected by time shifts
    Plain {
        name: String,
        #[serde(default)]
        assumptions: Assumptions,
    },
    TimeAware(TimeAwareSymbol),
}

impl Symbol {
    pub fn plain(name: impl Into<String>) -> Self {
        Symbol::Plain {
            name: name.into(),
            assumptions: Assumptions::default(),
        }
    }

    pub fn var(base_name: impl Into<String>, t: i32) -> Self {
        Symbol::TimeAware(TimeAwareSymbol::at(base_name, t))
    }

    pub fn ss(base_name: impl Into<String>) -> Self {
        Symbol::TimeAware(TimeAwareSymbol::new(base_name, TimeIndex::SteadyState))
    }

    /// Parse a dictionary key. Keys with a recognised time suffix become
    /// time-aware symbols, everything else is a plain symbol.
    pub fn from_key(key: &str) -> Self {
        match TimeAwareSymbol::from_safe_name(key) {
            Ok(s) => Symbol::TimeAware(s),
            Err(_) => Symbol::plain(key),
        }
    }

    pub fn with_assumptions(self, assumptions: Assumptions) -> Self {
        match self {
            Symbol::Plain { name, .. } => Symbol::Plain { name, assumptions },
            Symbol::TimeAware(s) => Symbol::TimeAware(s.with_assumptions(assumptions)),
        }
    }

    pub fn base_name(&self) -> &str {
        match self {
            Symbol::Plain { name, .. } => name,
            Symbol::TimeAware(s) => s.base_name(),
        }
    }

    pub fn assumptions(&self) -> &Assumptions {
        match self {
            Symbol::Plain { assumptions, .. } => assumptions,
            Symbol::TimeAware(s) => s.assumptions(),
        }
    }

    pub fn time_index(&self) -> Option<TimeIndex> {
        match self {
            Symbol::Plain { .. } => None,
            Symbol::TimeAware(s) => Some(s.time_index()),
        }
    }

    pub fn as_time_aware(&self) -> Option<&TimeAwareSymbol> {
        match self {
            Symbol::TimeAware(s) => Some(s),
            Symbol::Plain { .. } => None,
        }
    }

    pub fn is_time_aware(&self) -> bool {
        matches!(self, Symbol::TimeAware(_))
    }

    pub fn shift(&self, delta: i32) -> Self {
        match self {
            Symbol::TimeAware(s) => Symbol::TimeAware(s.shift(delta)),
            plain => plain.clone(),
        }
    }

    pub fn step_forward(&self) -> Self {
        self.shift(1)
    }

    pub fn step_backward(&self) -> Self {
        self.shift(-1)
    }

    pub fn to_ss(&self) -> Self {
        match self {
            Symbol::TimeAware(s) => Symbol::TimeAware(s.to_ss()),
            plain => plain.clone(),
        }
    }

    /// String used as a dictionary key and as a compiled-function input name
    pub fn safe_name(&self) -> String {
        match self {
            Symbol::Plain { name, .. } => name.clone(),
            Symbol::TimeAware(s) => s.safe_name(),
        }
    }
}

impl From<TimeAwareSymbol> for Symbol {
    fn from(s: TimeAwareSymbol) -> Self {
        Symbol::TimeAware(s)
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Symbol::Plain { name: a, .. }, Symbol::Plain { name: b, .. }) => a == b,
            (Symbol::TimeAware(a), Symbol::TimeAware(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Symbol {}

impl Hash for Symbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Symbol::Plain { name, .. } => {
                0u8.hash(state);
                name.hash(state);
            }
            Symbol::TimeAware(s) => {
                1u8.hash(state);
                s.hash(state);
            }
        }
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Symbol::Plain { name: a, .. }, Symbol::Plain { name: b, .. }) => a.cmp(b),
            (Symbol::TimeAware(a), Symbol::TimeAware(b)) => a.cmp(b),
            (Symbol::Plain { .. }, Symbol::TimeAware(_)) => Ordering::Less,
            (Symbol::TimeAware(_), Symbol::Plain { .. }) => Ordering::Greater,
        }
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Symbol::Plain { name, .. } => write!(f, "{}", name),
            Symbol::TimeAware(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::Assumption;

    #[test]
    fn test_step_forward_undoes_step_backward() {
        for t in [-3, -1, 0, 1, 4] {
            let x = TimeAwareSymbol::at("K", t);
            assert_eq!(x.step_backward().step_forward(), x);
            assert_eq!(x.step_forward().step_backward(), x);
        }
        let ss = TimeAwareSymbol::new("K", TimeIndex::SteadyState);
        assert_eq!(ss.step_forward().step_backward(), ss);
    }

    #[test]
    fn test_to_ss_is_idempotent() {
        let x = TimeAwareSymbol::at("C", -1);
        assert_eq!(x.to_ss().to_ss(), x.to_ss());
        assert!(x.to_ss().is_steady_state());
        assert_eq!(x.to_ss().step_forward(), x.to_ss());
    }

    #[test]
    fn test_equality_ignores_assumptions() {
        let a = TimeAwareSymbol::at("Y", 0);
        let b = TimeAwareSymbol::at("Y", 0)
            .with_assumptions(Assumptions::new().with(Assumption::Positive));
        assert_eq!(a, b);
        assert_ne!(a, TimeAwareSymbol::at("Y", 1));
    }

    #[test]
    fn test_assumptions_survive_shifts() {
        let a = TimeAwareSymbol::at("Y", 0)
            .with_assumptions(Assumptions::new().with(Assumption::Positive));
        assert!(a.step_forward().assumptions().is_positive());
        assert!(a.to_ss().assumptions().is_positive());
    }

    #[test]
    fn test_safe_names() {
        assert_eq!(TimeAwareSymbol::at("x", 0).safe_name(), "x_t");
        assert_eq!(TimeAwareSymbol::at("x", -1).safe_name(), "x_tm1");
        assert_eq!(TimeAwareSymbol::at("x", 2).safe_name(), "x_tp2");
        assert_eq!(
            TimeAwareSymbol::new("x", TimeIndex::SteadyState).safe_name(),
            "x_ss"
        );

        let parsed = TimeAwareSymbol::from_safe_name("sigma_eps_tm1").unwrap();
        assert_eq!(parsed.base_name(), "sigma_eps");
        assert_eq!(parsed.time_index(), TimeIndex::Offset(-1));

        assert!(TimeAwareSymbol::from_safe_name("alpha").is_err());
        assert!(TimeAwareSymbol::from_safe_name("x_tm0").is_err());
        assert!(TimeAwareSymbol::from_safe_name("_t").is_err());
    }

    #[test]
    fn test_display_uses_gcn_form() {
        assert_eq!(TimeAwareSymbol::at("K", 0).to_string(), "K[]");
        assert_eq!(TimeAwareSymbol::at("K", -1).to_string(), "K[-1]");
        assert_eq!(TimeAwareSymbol::at("K", 1).to_string(), "K[1]");
        assert_eq!(Symbol::ss("K").to_string(), "K[ss]");
        assert_eq!(Symbol::plain("beta").to_string(), "beta");
    }

    #[test]
    fn test_plain_symbols_ignore_time() {
        let beta = Symbol::plain("beta");
        assert_eq!(beta.step_forward(), beta);
        assert_eq!(beta.to_ss(), beta);
        assert_eq!(Symbol::from_key("beta"), beta);
        assert_eq!(Symbol::from_key("K_tm1"), Symbol::var("K", -1));
    }
}
