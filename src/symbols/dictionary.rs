use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::ops::BitOr;

use indexmap::IndexMap;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use super::{Assumptions, Symbol, SymbolError, TimeAwareSymbol};
use crate::expr::Expr;

/// Kind of keys held by a [SymbolDictionary].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeyMode {
    String,
    Symbolic,
}

impl fmt::Display for KeyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMode::String => write!(f, "string"),
            KeyMode::Symbolic => write!(f, "symbolic"),
        }
    }
}

/// A dictionary key: either a name (`"K_tm1"`, `"alpha"`) or a [Symbol].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DictKey {
    Name(String),
    Symbol(Symbol),
}

impl DictKey {
    pub fn mode(&self) -> KeyMode {
        match self {
            DictKey::Name(_) => KeyMode::String,
            DictKey::Symbol(_) => KeyMode::Symbolic,
        }
    }

    pub fn base_name(&self) -> String {
        match self {
            DictKey::Name(name) => Symbol::from_key(name).base_name().to_string(),
            DictKey::Symbol(s) => s.base_name().to_string(),
        }
    }

    fn to_symbol(&self, table: &BTreeMap<String, Assumptions>, plain: &BTreeSet<String>) -> Symbol {
        let symbol = match self {
            DictKey::Name(name) if plain.contains(name) => Symbol::plain(name.clone()),
            DictKey::Name(name) => Symbol::from_key(name),
            DictKey::Symbol(s) => s.clone(),
        };
        match table.get(symbol.base_name()) {
            Some(assumptions) => symbol.with_assumptions(assumptions.clone()),
            None => symbol,
        }
    }
}

impl fmt::Display for DictKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DictKey::Name(name) => write!(f, "{}", name),
            DictKey::Symbol(s) => write!(f, "{}", s.safe_name()),
        }
    }
}

impl From<&str> for DictKey {
    fn from(s: &str) -> Self {
        DictKey::Name(s.to_string())
    }
}

impl From<String> for DictKey {
    fn from(s: String) -> Self {
        DictKey::Name(s)
    }
}

impl From<Symbol> for DictKey {
    fn from(s: Symbol) -> Self {
        DictKey::Symbol(s)
    }
}

impl From<&Symbol> for DictKey {
    fn from(s: &Symbol) -> Self {
        DictKey::Symbol(s.clone())
    }
}

impl From<TimeAwareSymbol> for DictKey {
    fn from(s: TimeAwareSymbol) -> Self {
        DictKey::Symbol(Symbol::TimeAware(s))
    }
}

/// Ordered mapping used to carry values through every stage of the pipeline.
///
/// The keys are either all names or all symbols; the mode is fixed by the first
/// insertion and never changes afterwards. Assumptions are tracked by base name
/// in a side table so that converting between modes is lossless.
///
/// Every transform comes as a pair: a method returning a new dictionary and a
/// `*_in_place` method mutating `self`.
#[derive(Debug, Clone)]
pub struct SymbolDictionary<V> {
    entries: IndexMap<DictKey, V>,
    mode: Option<KeyMode>,
    assumptions: BTreeMap<String, Assumptions>,
    /// Plain symbols whose names end in a time suffix; their string keys
    /// convert back to plain symbols
    plain_names: BTreeSet<String>,
}

impl<V> Default for SymbolDictionary<V> {
    fn default() -> Self {
        Self {
            entries: IndexMap::new(),
            mode: None,
            assumptions: BTreeMap::new(),
            plain_names: BTreeSet::new(),
        }
    }
}

impl<V> SymbolDictionary<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a dictionary from `(key, value)` pairs, failing on mixed key kinds
    pub fn from_entries<K, I>(entries: I) -> Result<Self, SymbolError>
    where
        K: Into<DictKey>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut dict = Self::new();
        for (key, value) in entries {
            dict.insert(key, value)?;
        }
        Ok(dict)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// `None` until the first key is inserted
    pub fn mode(&self) -> Option<KeyMode> {
        self.mode
    }

    pub fn is_symbolic(&self) -> bool {
        self.mode == Some(KeyMode::Symbolic)
    }

    pub fn insert(&mut self, key: impl Into<DictKey>, value: V) -> Result<Option<V>, SymbolError> {
        let key = key.into();
        match self.mode {
            Some(mode) if mode != key.mode() => {
                return Err(SymbolError::KeyModeMismatch {
                    key: key.to_string(),
                    expected: mode,
                    found: key.mode(),
                })
            }
            Some(_) => {}
            None => self.mode = Some(key.mode()),
        }

        if let DictKey::Symbol(s) = &key {
            if let Symbol::Plain { name, .. } = s {
                if TimeAwareSymbol::from_safe_name(name).is_ok() {
                    self.plain_names.insert(name.clone());
                }
            }
            if !s.assumptions().is_empty() {
                self.assumptions
                    .entry(s.base_name().to_string())
                    .or_default()
                    .extend(s.assumptions());
            }
        }
        Ok(self.entries.insert(key, value))
    }

    /// Record assumptions for `base_name`, merging with any already known
    pub fn add_assumptions(&mut self, base_name: impl Into<String>, assumptions: &Assumptions) {
        self.assumptions
            .entry(base_name.into())
            .or_default()
            .extend(assumptions);
    }

    pub fn assumptions(&self) -> &BTreeMap<String, Assumptions> {
        &self.assumptions
    }

    pub fn assumptions_for(&self, base_name: &str) -> Option<&Assumptions> {
        self.assumptions.get(base_name)
    }

    pub fn get(&self, key: &DictKey) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn get_symbol(&self, symbol: &Symbol) -> Option<&V> {
        match self.mode {
            Some(KeyMode::String) => self.entries.get(&DictKey::Name(symbol.safe_name())),
            _ => self.entries.get(&DictKey::Symbol(symbol.clone())),
        }
    }

    /// Look up by string form regardless of the dictionary's mode
    pub fn get_by_name(&self, name: &str) -> Option<&V> {
        match self.mode {
            Some(KeyMode::Symbolic) => {
                let symbol = if self.plain_names.contains(name) {
                    Symbol::plain(name)
                } else {
                    Symbol::from_key(name)
                };
                self.entries.get(&DictKey::Symbol(symbol))
            }
            _ => self.entries.get(&DictKey::Name(name.to_string())),
        }
    }

    pub fn contains_key(&self, key: &DictKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &DictKey) -> Option<V> {
        self.entries.shift_remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &DictKey> {
        self.entries.keys()
    }

    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&DictKey, &V)> {
        self.entries.iter()
    }

    /// Apply `f` to every value, keeping keys, mode and assumptions
    pub fn map_values<U>(&self, f: impl Fn(&V) -> U) -> SymbolDictionary<U> {
        SymbolDictionary {
            entries: self.entries.iter().map(|(k, v)| (k.clone(), f(v))).collect(),
            mode: self.mode,
            assumptions: self.assumptions.clone(),
            plain_names: self.plain_names.clone(),
        }
    }

    fn try_map_values<U, E>(
        self,
        f: impl Fn(&DictKey, V) -> Result<U, E>,
    ) -> Result<SymbolDictionary<U>, E> {
        let mut entries = IndexMap::with_capacity(self.entries.len());
        for (k, v) in self.entries {
            let value = f(&k, v)?;
            entries.insert(k, value);
        }
        Ok(SymbolDictionary {
            entries,
            mode: self.mode,
            assumptions: self.assumptions,
            plain_names: self.plain_names,
        })
    }

    /// Rebuild keys through `f`. String keys are promoted to symbols for the
    /// duration of the call and demoted back afterwards.
    fn rekey_in_place(&mut self, f: impl Fn(&Symbol) -> Symbol) {
        let mode = self.mode;
        let entries = std::mem::take(&mut self.entries);
        self.entries = entries
            .into_iter()
            .map(|(key, value)| {
                let shifted = f(&key.to_symbol(&self.assumptions, &self.plain_names));
                let key = match mode {
                    Some(KeyMode::String) => DictKey::Name(shifted.safe_name()),
                    _ => DictKey::Symbol(shifted),
                };
                (key, value)
            })
            .collect();
    }

    pub fn step_forward_in_place(&mut self) {
        self.rekey_in_place(Symbol::step_forward);
    }

    pub fn step_backward_in_place(&mut self) {
        self.rekey_in_place(Symbol::step_backward);
    }

    pub fn to_ss_in_place(&mut self) {
        self.rekey_in_place(Symbol::to_ss);
    }

    /// Convert every key to a [Symbol], attaching assumptions from the side table
    pub fn to_symbolic_in_place(&mut self) {
        if self.mode != Some(KeyMode::String) {
            return;
        }
        let entries = std::mem::take(&mut self.entries);
        self.entries = entries
            .into_iter()
            .map(|(key, value)| {
                let symbol = key.to_symbol(&self.assumptions, &self.plain_names);
                (DictKey::Symbol(symbol), value)
            })
            .collect();
        self.mode = Some(KeyMode::Symbolic);
    }

    /// Convert every key to its string form (`safe_name` for symbols)
    pub fn to_string_keys_in_place(&mut self) {
        if self.mode != Some(KeyMode::Symbolic) {
            return;
        }
        let entries = std::mem::take(&mut self.entries);
        self.entries = entries
            .into_iter()
            .map(|(key, value)| (DictKey::Name(key.to_string()), value))
            .collect();
        self.mode = Some(KeyMode::String);
    }

    /// Sort entries by the string form of their keys
    pub fn sort_keys_in_place(&mut self) {
        self.entries
            .sort_by(|a, _, b, _| a.to_string().cmp(&b.to_string()));
    }
}

impl<V: Clone> SymbolDictionary<V> {
    pub fn step_forward(&self) -> Self {
        let mut out = self.clone();
        out.step_forward_in_place();
        out
    }

    pub fn step_backward(&self) -> Self {
        let mut out = self.clone();
        out.step_backward_in_place();
        out
    }

    pub fn to_ss(&self) -> Self {
        let mut out = self.clone();
        out.to_ss_in_place();
        out
    }

    pub fn to_symbolic(&self) -> Self {
        let mut out = self.clone();
        out.to_symbolic_in_place();
        out
    }

    pub fn to_string_keys(&self) -> Self {
        let mut out = self.clone();
        out.to_string_keys_in_place();
        out
    }

    pub fn sort_keys(&self) -> Self {
        let mut out = self.clone();
        out.sort_keys_in_place();
        out
    }

    /// Union of two dictionaries. On key collision the value from `other` wins.
    ///
    /// If either side is empty the result takes the other side's entries and
    /// mode; otherwise both sides must hold the same kind of key. Assumption
    /// tables are always unioned.
    pub fn merge(&self, other: &Self) -> Result<Self, SymbolError> {
        let mut out = match (self.is_empty(), other.is_empty()) {
            (true, _) => other.clone(),
            (false, true) => self.clone(),
            (false, false) => {
                if self.mode != other.mode {
                    return Err(SymbolError::MergeModeMismatch {
                        left: self.mode.unwrap_or(KeyMode::String),
                        right: other.mode.unwrap_or(KeyMode::String),
                    });
                }
                let mut out = self.clone();
                for (k, v) in other.entries.iter() {
                    out.entries.insert(k.clone(), v.clone());
                }
                out
            }
        };
        for (name, assumptions) in self.assumptions.iter().chain(other.assumptions.iter()) {
            out.add_assumptions(name.clone(), assumptions);
        }
        out.plain_names
            .extend(self.plain_names.iter().chain(other.plain_names.iter()).cloned());
        Ok(out)
    }
}

impl SymbolDictionary<Expr> {
    /// Numeric copy of the dictionary. Every value must reduce to a number.
    pub fn values_to_float(&self) -> Result<SymbolDictionary<f64>, SymbolError> {
        self.clone().into_float_values()
    }

    /// Consuming variant of [SymbolDictionary::values_to_float]
    pub fn into_float_values(self) -> Result<SymbolDictionary<f64>, SymbolError> {
        self.try_map_values(|key, value| {
            value.as_number().ok_or_else(|| SymbolError::NonNumericValue {
                key: key.to_string(),
                value: value.to_string(),
            })
        })
    }
}

impl SymbolDictionary<f64> {
    /// Symbolic copy of the dictionary, each value wrapped as a number expression
    pub fn float_to_values(&self) -> SymbolDictionary<Expr> {
        self.map_values(|v| Expr::Number(*v))
    }

    /// Consuming variant of [SymbolDictionary::float_to_values]
    pub fn into_expr_values(self) -> SymbolDictionary<Expr> {
        SymbolDictionary {
            entries: self
                .entries
                .into_iter()
                .map(|(k, v)| (k, Expr::Number(v)))
                .collect(),
            mode: self.mode,
            assumptions: self.assumptions,
            plain_names: self.plain_names,
        }
    }
}

impl<V: PartialEq> PartialEq for SymbolDictionary<V> {
    fn eq(&self, other: &Self) -> bool {
        self.mode == other.mode
            && self.entries == other.entries
            && self.assumptions == other.assumptions
            && self.plain_names == other.plain_names
    }
}

impl<V: Clone> BitOr for &SymbolDictionary<V> {
    type Output = Result<SymbolDictionary<V>, SymbolError>;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.merge(rhs)
    }
}

/// Serialized as a flat map from the string form of each key to its value.
impl<V: Serialize> Serialize for SymbolDictionary<V> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for (k, v) in &self.entries {
            map.serialize_entry(&k.to_string(), v)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbols::Assumption;

    fn positive() -> Assumptions {
        Assumptions::new().with(Assumption::Positive)
    }

    fn symbolic_dict() -> SymbolDictionary<f64> {
        let mut d = SymbolDictionary::new();
        d.insert(
            TimeAwareSymbol::at("K", 0).with_assumptions(positive()),
            1.0,
        )
        .unwrap();
        d.insert(TimeAwareSymbol::at("C", -1), 2.0).unwrap();
        d.insert(Symbol::plain("alpha"), 0.33).unwrap();
        d
    }

    #[test]
    fn test_mode_is_fixed_by_first_insert() {
        let mut d = SymbolDictionary::new();
        assert_eq!(d.mode(), None);
        d.insert("alpha", 1.0).unwrap();
        assert_eq!(d.mode(), Some(KeyMode::String));
        let err = d.insert(Symbol::plain("beta"), 2.0).unwrap_err();
        assert!(matches!(err, SymbolError::KeyModeMismatch { .. }));
        assert_eq!(d.len(), 1);
    }

    #[test]
    fn test_string_round_trip_keeps_everything() {
        let d = symbolic_dict();
        let strings = d.to_string_keys();
        assert_eq!(strings.mode(), Some(KeyMode::String));
        assert_eq!(strings.get_by_name("K_t"), Some(&1.0));
        assert_eq!(strings.get_by_name("C_tm1"), Some(&2.0));
        assert!(strings.assumptions_for("K").unwrap().is_positive());

        let back = strings.to_symbolic();
        assert_eq!(back, d);
        let k = back.keys().next().unwrap();
        match k {
            DictKey::Symbol(s) => assert!(s.assumptions().is_positive()),
            DictKey::Name(_) => panic!("expected a symbolic key"),
        }
    }

    #[test]
    fn test_symbolic_round_trip_from_strings() {
        let mut d = SymbolDictionary::new();
        d.insert("A_t", 1.0).unwrap();
        d.insert("beta", 0.99).unwrap();
        d.add_assumptions("A", &positive());
        assert_eq!(d.to_symbolic().to_string_keys(), d);
    }

    #[test]
    fn test_plain_symbol_with_time_suffix_stays_plain() {
        let mut d = SymbolDictionary::new();
        d.insert(Symbol::plain("alpha_t").with_assumptions(positive()), 0.3)
            .unwrap();
        d.insert(TimeAwareSymbol::at("K", -1), 1.0).unwrap();

        let strings = d.to_string_keys();
        assert_eq!(strings.get_by_name("alpha_t"), Some(&0.3));

        let back = strings.to_symbolic();
        assert_eq!(back, d);
        assert_eq!(back.get_by_name("alpha_t"), Some(&0.3));
        match back.keys().next().unwrap() {
            DictKey::Symbol(s) => {
                assert!(matches!(s, Symbol::Plain { .. }));
                assert!(s.assumptions().is_positive());
            }
            DictKey::Name(_) => panic!("expected a symbolic key"),
        }

        // time shifts leave it alone in both modes
        assert_eq!(strings.step_forward().get_by_name("alpha_t"), Some(&0.3));
        assert_eq!(strings.step_forward().get_by_name("K_t"), Some(&1.0));
        assert_eq!(
            back.step_forward().get_symbol(&Symbol::plain("alpha_t")),
            Some(&0.3)
        );

        // a string-keyed dictionary without that history reads the suffix
        let mut raw = SymbolDictionary::new();
        raw.insert("alpha_t", 0.3).unwrap();
        assert_eq!(raw.to_symbolic().get_symbol(&Symbol::var("alpha", 0)), Some(&0.3));
    }

    #[test]
    fn test_merge_with_empty_unions_assumptions() {
        let d = symbolic_dict();
        let mut empty: SymbolDictionary<f64> = SymbolDictionary::new();
        empty.add_assumptions("Z", &Assumptions::new().with(Assumption::Real));

        let merged = (&empty | &d).unwrap();
        assert_eq!(merged.len(), d.len());
        assert_eq!(merged.mode(), Some(KeyMode::Symbolic));
        assert!(merged.assumptions_for("Z").is_some());
        assert!(merged.assumptions_for("K").unwrap().is_positive());

        let merged = d.merge(&empty).unwrap();
        assert!(merged.assumptions_for("Z").is_some());
    }

    #[test]
    fn test_merge_right_side_wins() {
        let d = symbolic_dict();
        let mut other = SymbolDictionary::new();
        other.insert(Symbol::plain("alpha"), 0.5).unwrap();
        other.insert(Symbol::plain("delta"), 0.02).unwrap();

        let merged = (&d | &other).unwrap();
        assert_eq!(merged.len(), 4);
        assert_eq!(merged.get_by_name("alpha"), Some(&0.5));
        assert_eq!(merged.get_by_name("delta"), Some(&0.02));
    }

    #[test]
    fn test_merge_mode_mismatch() {
        let d = symbolic_dict();
        let strings = d.to_string_keys();
        let err = (&d | &strings).unwrap_err();
        assert_eq!(
            err,
            SymbolError::MergeModeMismatch {
                left: KeyMode::Symbolic,
                right: KeyMode::String
            }
        );
    }

    #[test]
    fn test_string_mode_shifts_demote_back() {
        let mut d = SymbolDictionary::new();
        d.insert("K_t", 1.0).unwrap();
        d.insert("alpha", 0.3).unwrap();

        let fwd = d.step_forward();
        assert_eq!(fwd.mode(), Some(KeyMode::String));
        assert_eq!(fwd.get_by_name("K_tp1"), Some(&1.0));
        assert_eq!(fwd.get_by_name("alpha"), Some(&0.3));

        let ss = d.to_ss();
        assert_eq!(ss.get_by_name("K_ss"), Some(&1.0));

        // the original is untouched
        assert_eq!(d.get_by_name("K_t"), Some(&1.0));
        assert_eq!(fwd.step_backward(), d);
    }

    #[test]
    fn test_in_place_shift() {
        let mut d = symbolic_dict();
        d.step_backward_in_place();
        assert_eq!(d.get_symbol(&Symbol::var("K", -1)), Some(&1.0));
        assert_eq!(d.get_symbol(&Symbol::var("C", -2)), Some(&2.0));
        assert_eq!(d.get_symbol(&Symbol::plain("alpha")), Some(&0.33));
    }

    #[test]
    fn test_sort_keys() {
        let d = symbolic_dict().sort_keys();
        let names: Vec<String> = d.keys().map(|k| k.to_string()).collect();
        assert_eq!(names, vec!["C_tm1", "K_t", "alpha"]);
    }

    #[test]
    fn test_value_conversions() {
        let d = symbolic_dict();
        let exprs = d.float_to_values();
        assert_eq!(exprs.values_to_float().unwrap(), d);

        let mut bad = SymbolDictionary::new();
        bad.insert("x", Expr::symbol(Symbol::plain("y"))).unwrap();
        assert!(matches!(
            bad.values_to_float(),
            Err(SymbolError::NonNumericValue { .. })
        ));
    }

    #[test]
    fn test_serializes_with_string_keys() {
        let d = symbolic_dict();
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, r#"{"K_t":1.0,"C_tm1":2.0,"alpha":0.33}"#);
    }
}
