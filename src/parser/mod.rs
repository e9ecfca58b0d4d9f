//! Reader for the GCN model language.
//!
//! A file is a sequence of `Block NAME { section { statement; ... }; ... };`
//! items plus the optional top-level `assumptions`, `options` and `tryreduce`
//! sections. Distribution strings found in `shocks` and `calibration` are
//! returned unvalidated; see [crate::distributions] for their grammar.

pub mod block;
pub mod equation;
pub mod errors;
pub mod preprocess;

pub use block::{GcnBlock, GcnFile, PriorDeclaration, Section, SectionKind, Statement};
pub use equation::{parse_equation, parse_expression, Equation};
pub use errors::ParseError;

use indexmap::IndexMap;

use block::{parse_assumptions, parse_block, parse_options, parse_tryreduce};
use preprocess::{check_balanced, split_braced, strip_comments};

/// Parse GCN source text.
///
/// Returns the parsed file and the raw prior dictionary: display name →
/// distribution string for every `~` declaration in `shocks` and
/// `calibration`, in declaration order.
pub fn preprocess_gcn(text: &str) -> Result<(GcnFile, IndexMap<String, String>), ParseError> {
    let text = strip_comments(text);
    check_balanced(&text, '{', '}', "file")?;

    let mut file = GcnFile::default();
    for item in split_braced(&text, "file")? {
        let words: Vec<&str> = item.header.split_whitespace().collect();
        match words.as_slice() {
            [special] if special.eq_ignore_ascii_case("assumptions") => {
                for (name, assumptions) in parse_assumptions(&item.body)? {
                    file.assumptions.entry(name).or_default().extend(&assumptions);
                }
            }
            [special] if special.eq_ignore_ascii_case("options") => {
                file.options.extend(parse_options(&item.body)?);
            }
            [special] if special.eq_ignore_ascii_case("tryreduce") => {
                file.tryreduce.extend(parse_tryreduce(&item.body));
            }
            [keyword, name] if keyword.eq_ignore_ascii_case("block") => {
                file.blocks.push(parse_block(name, &item.body)?);
            }
            [name] => {
                file.blocks.push(parse_block(name, &item.body)?);
            }
            _ => {
                return Err(ParseError::syntax(
                    "file",
                    "expected 'Block NAME { ... };'",
                    &item.header,
                ))
            }
        }
    }

    let mut prior_dict = IndexMap::new();
    for prior in file.priors() {
        if prior_dict
            .insert(prior.name.clone(), prior.distribution.clone())
            .is_some()
        {
            return Err(ParseError::syntax(
                "priors",
                format!("'{}' has more than one distribution", prior.name),
                &prior.distribution,
            ));
        }
    }

    tracing::debug!(
        blocks = file.blocks.len(),
        priors = prior_dict.len(),
        "Parsed GCN file"
    );
    Ok((file, prior_dict))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SIMPLE: &str = r#"
        Block TEST
        {
            shocks
            {
                epsilon[] ~ norm(mu = 0, sd = 1);
            };

            calibration
            {
                alpha ~ N(mean = 0, sd = 1) = 0.5;
            };
        };
    "#;

    #[test]
    fn test_prior_dict_in_declaration_order() {
        let (file, priors) = preprocess_gcn(SIMPLE).unwrap();
        assert_eq!(file.blocks.len(), 1);
        assert_eq!(
            priors.keys().collect::<Vec<_>>(),
            vec!["epsilon[]", "alpha"]
        );
        assert_eq!(
            priors.values().collect::<Vec<_>>(),
            vec!["norm(mu = 0, sd = 1)", "N(mean = 0, sd = 1)"]
        );
    }

    #[test]
    fn test_block_keyword_is_optional() {
        let (file, _) = preprocess_gcn("TEST_BLOCK { identities { Y[] = 1; }; };").unwrap();
        assert_eq!(file.blocks[0].name, "TEST_BLOCK");
    }

    #[test]
    fn test_special_sections() {
        let text = r#"
            options { output logfile = TRUE; };
            tryreduce { U[]; };
            assumptions { positive { K[], alpha; }; };
            block A { identities { K[] = alpha; }; };
        "#;
        let (file, _) = preprocess_gcn(text).unwrap();
        assert_eq!(file.options["output logfile"], "TRUE");
        assert_eq!(file.tryreduce, vec!["U[]"]);
        assert!(file.assumptions["K"].is_positive());
    }

    #[test]
    fn test_comments_are_ignored() {
        let text = "block A { # {\n identities { Y[] = 1; # ( \n }; };";
        assert!(preprocess_gcn(text).is_ok());
    }

    #[test]
    fn test_unbalanced_file() {
        let err = preprocess_gcn("block A { identities { Y[] = 1; };").unwrap_err();
        assert!(matches!(err, ParseError::Parsing { .. }));
    }
}
