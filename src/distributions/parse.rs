use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::DistributionKind;
use crate::parser::ParseError;

/// Value given to a distribution parameter: a literal or a reference to
/// another declared prior (which makes the prior hierarchical).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Literal(f64),
    Symbol(String),
}

impl ParamValue {
    pub fn as_literal(&self) -> Option<f64> {
        match self {
            ParamValue::Literal(v) => Some(*v),
            ParamValue::Symbol(_) => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            ParamValue::Symbol(s) => Some(s),
            ParamValue::Literal(_) => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Literal(v) => write!(f, "{}", v),
            ParamValue::Symbol(s) => write!(f, "{}", s),
        }
    }
}

fn parse_value(text: &str) -> Option<ParamValue> {
    if let Ok(v) = text.parse::<f64>() {
        return Some(ParamValue::Literal(v));
    }
    let base = text.strip_suffix("[]").unwrap_or(text);
    let mut chars = base.chars();
    let first = chars.next()?;
    if (first.is_ascii_alphabetic() || first == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        Some(ParamValue::Symbol(text.to_string()))
    } else {
        None
    }
}

/// Validate a distribution string such as `Beta(mean = 0.5, sd = 0.1)` and
/// resolve it to a kind and canonical parameter names.
///
/// Each failure has its own error:
/// 1. anything but a single `Kind( ... )` with nothing after the `)`:
///    [ParseError::InvalidDistribution]
/// 2. `==` inside the parentheses: [ParseError::DistributionParsing]
/// 3. items not of the form `name = value`, separated by commas:
///    [ParseError::InvalidDistribution]
/// 4. the same parameter twice after alias resolution:
///    [ParseError::RepeatedParameter]
/// 5. unknown kind, unknown parameter, or parameters matching none of the
///    kind's parametrizations: [ParseError::InvalidDistribution]
pub fn preprocess_distribution_string(
    name: &str,
    text: &str,
) -> Result<(DistributionKind, IndexMap<String, ParamValue>), ParseError> {
    let text = text.trim();
    let invalid = |reason: &str| ParseError::invalid_distribution(name, reason, text);

    // 1. Kind( ... )
    let open = text
        .find('(')
        .ok_or_else(|| invalid("expected 'Kind(parameter = value, ...)'"))?;
    let close = text
        .find(')')
        .ok_or_else(|| invalid("missing closing parenthesis"))?;
    if text.matches('(').count() != 1 || text.matches(')').count() != 1 || close < open {
        return Err(invalid("expected exactly one pair of parentheses"));
    }
    if close != text.len() - 1 {
        return Err(invalid(
            "unexpected text after the distribution; shocks cannot take an initial value",
        ));
    }
    let kind_name = text[..open].trim();
    if kind_name.is_empty() {
        return Err(invalid("missing distribution name"));
    }
    let inner = &text[open + 1..close];

    // 2. ==
    if inner.contains("==") {
        return Err(ParseError::distribution_parsing(
            name,
            "found '==' where '=' was expected",
            text,
        ));
    }

    // 3. name = value, comma separated
    let mut raw: Vec<(&str, ParamValue)> = Vec::new();
    for item in inner.split(',') {
        let (key, value) = item
            .split_once('=')
            .ok_or_else(|| invalid("parameters must be 'name = value' separated by commas"))?;
        let (key, value) = (key.trim(), value.trim());
        if key.is_empty() || key.contains(char::is_whitespace) || value.contains('=') {
            return Err(invalid(
                "parameters must be 'name = value' separated by commas",
            ));
        }
        let value = parse_value(value).ok_or_else(|| {
            invalid("parameter values must be numbers or names of other parameters")
        })?;
        raw.push((key, value));
    }

    let kind = DistributionKind::from_name(kind_name)
        .ok_or_else(|| invalid(&format!("unknown distribution '{}'", kind_name)))?;

    // 4. aliases and repeats
    let mut params = IndexMap::new();
    for (key, value) in raw {
        let canonical = kind.canonical_param(key).ok_or_else(|| {
            invalid(&format!("'{}' is not a parameter of the {} distribution", key, kind))
        })?;
        if params.insert(canonical.to_string(), value).is_some() {
            return Err(ParseError::RepeatedParameter {
                name: name.to_string(),
                parameter: canonical.to_string(),
                fragment: text.to_string(),
            });
        }
    }

    // 5. parametrization
    if kind
        .match_parametrization(params.keys().map(|k| k.as_str()))
        .is_none()
    {
        let given: Vec<&str> = params.keys().map(|k| k.as_str()).collect();
        return Err(invalid(&format!(
            "parameters {{{}}} do not match any parametrization of the {} distribution",
            given.join(", "),
            kind
        )));
    }

    Ok((kind, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_names() {
        let (kind, params) = preprocess_distribution_string("eps", "norm(mu = 0, sd = 1)").unwrap();
        assert_eq!(kind, DistributionKind::Normal);
        assert_eq!(params["loc"], ParamValue::Literal(0.0));
        assert_eq!(params["scale"], ParamValue::Literal(1.0));

        let (kind, params) =
            preprocess_distribution_string("tau", "halfnorm(MEAN=0.5, sd=1)").unwrap();
        assert_eq!(kind, DistributionKind::HalfNormal);
        assert_eq!(params.keys().collect::<Vec<_>>(), vec!["mean", "sd"]);
    }

    #[test]
    fn test_symbolic_values() {
        let (_, params) =
            preprocess_distribution_string("alpha", "N(mean = mu_alpha, sd = sigma_alpha)").unwrap();
        assert_eq!(params["loc"], ParamValue::Symbol("mu_alpha".to_string()));
        assert_eq!(params["scale"].as_symbol(), Some("sigma_alpha"));
    }

    #[test]
    fn test_error_taxonomy() {
        let invalid = [
            "N((mean = 0, sd = 1)",
            "N(mean = 0, sd = 1))",
            "N(mean = 0 sd = 1)",
            "N(mean = 0, sd = 1) = 0.5",
            "Cauchy(loc = 0, scale = 1)",
            "Beta(a = 1)",
            "Beta(a = 1, rate = 2)",
            "(a = 1, b = 1)",
            "N(mean = 0, sd = )",
        ];
        for s in invalid {
            assert!(
                matches!(
                    preprocess_distribution_string("alpha", s),
                    Err(ParseError::InvalidDistribution { .. })
                ),
                "{}",
                s
            );
        }

        assert!(matches!(
            preprocess_distribution_string("alpha", "N(mean == 0, sd = 1)"),
            Err(ParseError::DistributionParsing { .. })
        ));

        let err = preprocess_distribution_string("alpha", "N(mean = 0, mean = 1)").unwrap_err();
        assert_eq!(
            err,
            ParseError::RepeatedParameter {
                name: "alpha".to_string(),
                parameter: "loc".to_string(),
                fragment: "N(mean = 0, mean = 1)".to_string(),
            }
        );

        // aliases of the same parameter are repeats too
        assert!(matches!(
            preprocess_distribution_string("alpha", "N(sd = 1, std = 2, mean = 0)"),
            Err(ParseError::RepeatedParameter { .. })
        ));
    }
}
