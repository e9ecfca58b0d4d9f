use std::collections::HashSet;
use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::equation::{parse_equation, parse_expression, parse_symbol, Equation};
use super::preprocess::{check_balanced, has_assignment_in_parens, split_braced, split_statements};
use super::ParseError;
use crate::symbols::{Assumption, Assumptions, Symbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SectionKind {
    Definitions,
    Controls,
    Objective,
    Constraints,
    Identities,
    Shocks,
    Calibration,
}

impl SectionKind {
    pub fn from_name(name: &str) -> Option<SectionKind> {
        match name.to_ascii_lowercase().as_str() {
            "definitions" => Some(SectionKind::Definitions),
            "controls" => Some(SectionKind::Controls),
            "objective" => Some(SectionKind::Objective),
            "constraints" => Some(SectionKind::Constraints),
            "identities" => Some(SectionKind::Identities),
            "shocks" => Some(SectionKind::Shocks),
            "calibration" => Some(SectionKind::Calibration),
            _ => None,
        }
    }

    /// Sections where `name ~ Kind(...)` declarations may appear
    pub fn allows_distributions(self) -> bool {
        matches!(self, SectionKind::Shocks | SectionKind::Calibration)
    }

    /// Sections whose statements are bare symbol lists rather than equations
    fn is_declaration_list(self) -> bool {
        matches!(self, SectionKind::Controls | SectionKind::Shocks)
    }
}

impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SectionKind::Definitions => "definitions",
            SectionKind::Controls => "controls",
            SectionKind::Objective => "objective",
            SectionKind::Constraints => "constraints",
            SectionKind::Identities => "identities",
            SectionKind::Shocks => "shocks",
            SectionKind::Calibration => "calibration",
        };
        write!(f, "{}", name)
    }
}

/// `name ~ Kind(p = v, ...) [= initial_value]`, distribution string unvalidated
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriorDeclaration {
    /// Display name, e.g. `epsilon[]` or `alpha`
    pub name: String,
    pub symbol: Symbol,
    pub distribution: String,
    pub initial_value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Statement {
    Equation(Equation),
    Prior(PriorDeclaration),
    /// A bare list of symbols, as in `controls { K[], C[]; };`
    Declaration(Vec<Symbol>),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub kind: SectionKind,
    pub statements: Vec<Statement>,
}

impl Section {
    pub fn equations(&self) -> impl Iterator<Item = &Equation> {
        self.statements.iter().filter_map(|s| match s {
            Statement::Equation(eq) => Some(eq),
            _ => None,
        })
    }

    pub fn priors(&self) -> impl Iterator<Item = &PriorDeclaration> {
        self.statements.iter().filter_map(|s| match s {
            Statement::Prior(p) => Some(p),
            _ => None,
        })
    }

    /// Every symbol declared in this section, whether listed or given a prior
    pub fn declared_symbols(&self) -> Vec<Symbol> {
        let mut out = Vec::new();
        for s in &self.statements {
            match s {
                Statement::Declaration(symbols) => out.extend(symbols.iter().cloned()),
                Statement::Prior(p) => out.push(p.symbol.clone()),
                Statement::Equation(_) => {}
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GcnBlock {
    pub name: String,
    pub sections: Vec<Section>,
}

impl GcnBlock {
    pub fn section(&self, kind: SectionKind) -> Option<&Section> {
        self.sections.iter().find(|s| s.kind == kind)
    }

    pub fn equations(&self, kind: SectionKind) -> impl Iterator<Item = &Equation> {
        self.section(kind).into_iter().flat_map(|s| s.equations())
    }

    pub fn priors(&self, kind: SectionKind) -> impl Iterator<Item = &PriorDeclaration> {
        self.section(kind).into_iter().flat_map(|s| s.priors())
    }
}

/// A parsed GCN file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GcnFile {
    pub blocks: Vec<GcnBlock>,
    /// Base name → assumptions from the `assumptions` section
    pub assumptions: IndexMap<String, Assumptions>,
    /// Raw `key = value` pairs from the `options` section
    pub options: IndexMap<String, String>,
    /// Variables listed under `tryreduce`, kept verbatim
    pub tryreduce: Vec<String>,
}

impl GcnFile {
    pub fn block(&self, name: &str) -> Option<&GcnBlock> {
        self.blocks.iter().find(|b| b.name == name)
    }

    pub fn sections(&self, kind: SectionKind) -> impl Iterator<Item = &Section> {
        self.blocks.iter().filter_map(move |b| b.section(kind))
    }

    pub fn equations(&self, kind: SectionKind) -> impl Iterator<Item = &Equation> {
        self.blocks.iter().flat_map(move |b| b.equations(kind))
    }

    pub fn priors(&self) -> impl Iterator<Item = &PriorDeclaration> {
        self.blocks.iter().flat_map(|b| {
            b.sections
                .iter()
                .filter(|s| s.kind.allows_distributions())
                .flat_map(|s| s.priors())
        })
    }
}

pub(crate) fn parse_block(name: &str, body: &str) -> Result<GcnBlock, ParseError> {
    let context = format!("block {}", name);
    let mut seen = HashSet::new();
    let mut sections = Vec::new();

    for item in split_braced(body, &context)? {
        let kind = SectionKind::from_name(&item.header).ok_or_else(|| {
            ParseError::syntax(&context, format!("unknown section '{}'", item.header), &item.header)
        })?;
        if !seen.insert(kind) {
            return Err(ParseError::syntax(
                &context,
                format!("section '{}' declared twice", kind),
                &item.header,
            ));
        }

        let statements = split_statements(&item.body)
            .iter()
            .map(|stmt| parse_statement(kind, stmt))
            .collect::<Result<Vec<_>, _>>()?;
        sections.push(Section { kind, statements });
    }

    Ok(GcnBlock {
        name: name.to_string(),
        sections,
    })
}

fn parse_statement(kind: SectionKind, stmt: &str) -> Result<Statement, ParseError> {
    if stmt.contains('~') {
        return parse_prior(kind, stmt).map(Statement::Prior);
    }

    // named arguments outside a `~` declaration: `alpha = N(mean = 0, ...)`
    if has_assignment_in_parens(stmt) {
        let name = stmt.split('=').next().unwrap_or(stmt).trim();
        return Err(ParseError::distribution_parsing(
            name,
            "named parameters found in an equation; use '~' to declare a distribution",
            stmt,
        ));
    }
    check_balanced(stmt, '(', ')', &format!("{} equation", kind))?;
    check_balanced(stmt, '[', ']', &format!("{} equation", kind))?;

    if kind.is_declaration_list() && !stmt.contains('=') {
        let symbols = stmt
            .split(',')
            .map(|s| parse_symbol(s.trim()))
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Statement::Declaration(symbols));
    }

    parse_equation(stmt).map(Statement::Equation)
}

fn parse_prior(kind: SectionKind, stmt: &str) -> Result<PriorDeclaration, ParseError> {
    let (lhs, rhs) = stmt.split_once('~').unwrap_or((stmt, ""));
    let name = lhs.trim();

    if !kind.allows_distributions() {
        return Err(ParseError::distribution_parsing(
            name,
            format!("'~' is not allowed in the {} section", kind),
            stmt,
        ));
    }
    if rhs.contains('~') {
        return Err(ParseError::distribution_parsing(name, "more than one '~'", stmt));
    }
    let rhs = rhs.trim();
    if !rhs.contains('(') {
        return Err(ParseError::distribution_parsing(
            name,
            "expected a distribution such as 'N(mean = 0, sd = 1)' after '~'",
            stmt,
        ));
    }

    let symbol = parse_symbol(name)?;
    let display = symbol.to_string();

    // shocks keep the whole right side; a trailing `= value` is rejected later
    if kind == SectionKind::Shocks {
        return Ok(PriorDeclaration {
            name: display,
            symbol,
            distribution: rhs.to_string(),
            initial_value: None,
        });
    }

    let close = rhs.rfind(')').ok_or_else(|| {
        ParseError::distribution_parsing(name, "distribution is missing ')'", stmt)
    })?;
    let distribution = rhs[..=close].trim().to_string();
    let tail = rhs[close + 1..].trim();
    if tail.is_empty() {
        return Err(ParseError::MissingParameterValue {
            name: display,
            fragment: stmt.to_string(),
        });
    }
    let value_text = tail.strip_prefix('=').ok_or_else(|| {
        ParseError::distribution_parsing(
            name,
            "expected '= initial_value' after the distribution",
            stmt,
        )
    })?;
    let initial_value = parse_expression(value_text.trim())?.as_number().ok_or_else(|| {
        ParseError::syntax("calibration", "initial value must be a number", stmt)
    })?;

    Ok(PriorDeclaration {
        name: display,
        symbol,
        distribution,
        initial_value: Some(initial_value),
    })
}

/// `assumptions { positive { a, K[]; }; };`
pub(crate) fn parse_assumptions(body: &str) -> Result<IndexMap<String, Assumptions>, ParseError> {
    let mut out: IndexMap<String, Assumptions> = IndexMap::new();
    for item in split_braced(body, "assumptions")? {
        let assumption: Assumption = item.header.parse().map_err(|_| {
            ParseError::syntax(
                "assumptions",
                format!("unknown assumption '{}'", item.header),
                &item.header,
            )
        })?;
        for name in split_list(&item.body) {
            let symbol = parse_symbol(&name)?;
            out.entry(symbol.base_name().to_string())
                .or_default()
                .insert(assumption);
        }
    }
    Ok(out)
}

/// `options { output logfile = TRUE; };`
pub(crate) fn parse_options(body: &str) -> Result<IndexMap<String, String>, ParseError> {
    let mut out = IndexMap::new();
    for stmt in split_statements(body) {
        let (key, value) = stmt
            .split_once('=')
            .ok_or_else(|| ParseError::syntax("options", "expected 'key = value'", &stmt))?;
        out.insert(key.trim().to_string(), value.trim().to_string());
    }
    Ok(out)
}

/// `tryreduce { U[], TC[]; };`
pub(crate) fn parse_tryreduce(body: &str) -> Vec<String> {
    split_list(body)
}

fn split_list(body: &str) -> Vec<String> {
    body.split([',', ';'])
        .map(|s| s.split_whitespace().collect::<String>())
        .filter(|s| !s.is_empty())
        .collect()
}
