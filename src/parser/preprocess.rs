//! Text-level passes run before any grammar is applied: comment stripping,
//! delimiter checks, and splitting into braced items and statements.

use super::ParseError;

/// A `header { body }` item found at one nesting level
#[derive(Debug, Clone, PartialEq)]
pub struct BracedItem {
    pub header: String,
    pub body: String,
}

/// Remove `#` comments up to the end of each line
pub fn strip_comments(text: &str) -> String {
    text.lines()
        .map(|line| match line.find('#') {
            Some(i) => &line[..i],
            None => line,
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Collapse every run of whitespace into a single space
pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Check that `open`/`close` pairs balance and never close before opening
pub fn check_balanced(text: &str, open: char, close: char, context: &str) -> Result<(), ParseError> {
    let mut depth: i64 = 0;
    for c in text.chars() {
        if c == open {
            depth += 1;
        } else if c == close {
            depth -= 1;
            if depth < 0 {
                return Err(ParseError::unbalanced(close, context, normalize_whitespace(text)));
            }
        }
    }
    if depth != 0 {
        return Err(ParseError::unbalanced(open, context, normalize_whitespace(text)));
    }
    Ok(())
}

/// Split `text` into consecutive `header { body };` items.
///
/// Braces must already be balanced. The `;` after a closing brace is
/// optional; text after the last item must be blank.
pub fn split_braced(text: &str, context: &str) -> Result<Vec<BracedItem>, ParseError> {
    let mut items = Vec::new();
    let mut rest = text;
    loop {
        let trimmed = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ';');
        if trimmed.is_empty() {
            break;
        }
        let open = trimmed.find('{').ok_or_else(|| {
            ParseError::syntax(context, "expected '{'", normalize_whitespace(trimmed))
        })?;
        let header = normalize_whitespace(&trimmed[..open]);
        if header.is_empty() {
            return Err(ParseError::syntax(
                context,
                "missing name before '{'",
                normalize_whitespace(trimmed),
            ));
        }

        let mut depth = 0usize;
        let mut close = None;
        for (i, c) in trimmed[open..].char_indices() {
            match c {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(open + i);
                        break;
                    }
                }
                _ => {}
            }
        }
        let close = close.ok_or_else(|| ParseError::unbalanced('{', context, header.clone()))?;

        items.push(BracedItem {
            header,
            body: trimmed[open + 1..close].to_string(),
        });
        rest = &trimmed[close + 1..];
    }
    Ok(items)
}

/// Split a section body into `;`-terminated statements, whitespace normalized
pub fn split_statements(body: &str) -> Vec<String> {
    body.split(';')
        .map(normalize_whitespace)
        .filter(|s| !s.is_empty())
        .collect()
}

/// True if an `=` appears inside parentheses, as in `N(mean = 0)`
pub fn has_assignment_in_parens(statement: &str) -> bool {
    let mut depth: i64 = 0;
    for c in statement.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth -= 1,
            '=' if depth > 0 => return true,
            _ => {}
        }
    }
    false
}
