use serde::{Deserialize, Serialize};

use super::ParseError;
use crate::expr::{Expr, Function};
use crate::symbols::{Symbol, TimeAwareSymbol, TimeIndex};

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Num(f64),
    Ident(String),
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
    Op(char),
    Assign,
    Colon,
    Arrow,
}

// Tokenizer + recursive-descent parser for GCN expressions
pub fn tokenize(s: &str) -> Result<Vec<Token>, ParseError> {
    let mut toks = Vec::new();
    let mut chars = s.chars().peekable();
    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
            continue;
        }
        if c.is_ascii_digit() || c == '.' {
            let mut num = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit()
                    || d == '.'
                    || d == 'e'
                    || d == 'E'
                    || ((d == '+' || d == '-') && (num.ends_with('e') || num.ends_with('E')))
                {
                    num.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            let v = num
                .parse::<f64>()
                .map_err(|_| ParseError::syntax("expression", "malformed number", s))?;
            toks.push(Token::Num(v));
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let mut id = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_alphanumeric() || d == '_' {
                    id.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            toks.push(Token::Ident(id));
            continue;
        }
        chars.next();
        match c {
            '[' => toks.push(Token::LBracket),
            ']' => toks.push(Token::RBracket),
            '(' => toks.push(Token::LParen),
            ')' => toks.push(Token::RParen),
            ',' => toks.push(Token::Comma),
            ':' => toks.push(Token::Colon),
            '=' => toks.push(Token::Assign),
            '+' | '*' | '/' | '^' => toks.push(Token::Op(c)),
            '-' => {
                if let Some(&'>') = chars.peek() {
                    chars.next();
                    toks.push(Token::Arrow);
                } else {
                    toks.push(Token::Op('-'));
                }
            }
            other => {
                return Err(ParseError::syntax(
                    "expression",
                    format!("unexpected character '{}'", other),
                    s,
                ))
            }
        }
    }
    Ok(toks)
}

/// A model equation `lhs = rhs`, optionally tagged with a Lagrange multiplier
/// (`: lambda[]`) or, in calibration, the parameter it pins down (`-> delta`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equation {
    pub lhs: Expr,
    pub rhs: Expr,
    pub multiplier: Option<TimeAwareSymbol>,
    pub calibrating: Option<String>,
    pub source: String,
}

impl Equation {
    /// `lhs - rhs`, to be read as `= 0`
    pub fn residual(&self) -> Expr {
        Expr::sub(self.lhs.clone(), self.rhs.clone())
    }

    /// The parameter on the left of a simple assignment `alpha = ...;`
    pub fn assigned_parameter(&self) -> Option<&str> {
        match &self.lhs {
            Expr::Symbol(Symbol::Plain { name, .. }) if self.calibrating.is_none() => Some(name),
            _ => None,
        }
    }
}

pub struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
}

impl<'a> Parser<'a> {
    pub fn new(source: &'a str) -> Result<Self, ParseError> {
        Ok(Self {
            tokens: tokenize(source)?,
            pos: 0,
            source,
        })
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        ParseError::syntax("equation", message, self.source)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset)
    }

    fn next(&mut self) -> Option<Token> {
        let r = self.tokens.get(self.pos).cloned();
        if r.is_some() {
            self.pos += 1;
        }
        r
    }

    fn expect(&mut self, tok: Token, what: &str) -> Result<(), ParseError> {
        match self.next() {
            Some(t) if t == tok => Ok(()),
            Some(t) => Err(self.error(format!("expected {}, found {:?}", what, t))),
            None => Err(self.error(format!("expected {}, found end of input", what))),
        }
    }

    pub fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Parse a full statement `lhs = rhs [: mult[]] [-> param]`
    pub fn parse_equation(&mut self) -> Result<Equation, ParseError> {
        let lhs = self.parse_expr()?;
        self.expect(Token::Assign, "'='")?;
        let rhs = self.parse_expr()?;

        let mut multiplier = None;
        if let Some(Token::Colon) = self.peek() {
            self.next();
            match self.parse_primary()? {
                Expr::Symbol(Symbol::TimeAware(s)) => multiplier = Some(s),
                other => {
                    return Err(self.error(format!(
                        "Lagrange multiplier must be a variable, found '{}'",
                        other
                    )))
                }
            }
        }

        let mut calibrating = None;
        if let Some(Token::Arrow) = self.peek() {
            self.next();
            match self.next() {
                Some(Token::Ident(name)) => calibrating = Some(name),
                _ => return Err(self.error("expected a parameter name after '->'")),
            }
        }

        if !self.at_end() {
            return Err(self.error(format!("unexpected trailing input {:?}", self.peek())));
        }

        Ok(Equation {
            lhs,
            rhs,
            multiplier,
            calibrating,
            source: self.source.to_string(),
        })
    }

    /// Parse a single expression consuming all input
    pub fn parse_complete_expr(&mut self) -> Result<Expr, ParseError> {
        let e = self.parse_expr()?;
        if !self.at_end() {
            return Err(self.error(format!("unexpected trailing input {:?}", self.peek())));
        }
        Ok(e)
    }

    pub fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_add_sub()
    }

    fn parse_add_sub(&mut self) -> Result<Expr, ParseError> {
        let mut node = self.parse_mul_div()?;
        loop {
            match self.peek() {
                Some(Token::Op('+')) => {
                    self.next();
                    let rhs = self.parse_mul_div()?;
                    node = Expr::add(node, rhs);
                }
                Some(Token::Op('-')) => {
                    self.next();
                    let rhs = self.parse_mul_div()?;
                    node = Expr::sub(node, rhs);
                }
                _ => break,
            }
        }
        Ok(node)
    }

    fn parse_mul_div(&mut self) -> Result<Expr, ParseError> {
        let mut node = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::Op('*')) => {
                    self.next();
                    let rhs = self.parse_unary()?;
                    node = Expr::mul(node, rhs);
                }
                Some(Token::Op('/')) => {
                    self.next();
                    let rhs = self.parse_unary()?;
                    node = Expr::div(node, rhs);
                }
                _ => break,
            }
        }
        Ok(node)
    }

    // unary minus binds looser than ^, so -x^2 is -(x^2)
    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Some(Token::Op('-')) => {
                self.next();
                Ok(Expr::neg(self.parse_unary()?))
            }
            Some(Token::Op('+')) => {
                self.next();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    fn parse_power(&mut self) -> Result<Expr, ParseError> {
        let node = self.parse_primary()?;
        if let Some(Token::Op('^')) = self.peek() {
            self.next();
            // right-associative; the exponent may carry its own sign
            let rhs = self.parse_unary()?;
            return Ok(Expr::pow(node, rhs));
        }
        Ok(node)
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let tok = self
            .next()
            .ok_or_else(|| self.error("unexpected end of input"))?;
        match tok {
            Token::Num(v) => Ok(Expr::Number(v)),
            Token::LParen => {
                let e = self.parse_expr()?;
                self.expect(Token::RParen, "')'")?;
                Ok(e)
            }
            Token::Ident(id) => {
                if let Some(Token::LParen) = self.peek() {
                    self.next();
                    let func = Function::from_name(&id)
                        .ok_or_else(|| self.error(format!("unknown function '{}'", id)))?;
                    let arg = self.parse_expr()?;
                    self.expect(Token::RParen, "')'")?;
                    return Ok(Expr::call(func, arg));
                }
                if let Some(Token::LBracket) = self.peek() {
                    let time_index = self.parse_time_index()?;
                    // E[][expr] is the expectation operator
                    if id == "E"
                        && time_index == TimeIndex::Offset(0)
                        && matches!(self.peek(), Some(Token::LBracket))
                    {
                        self.next();
                        let inner = self.parse_expr()?;
                        self.expect(Token::RBracket, "']'")?;
                        return Ok(inner);
                    }
                    return Ok(Expr::Symbol(Symbol::TimeAware(TimeAwareSymbol::new(
                        id, time_index,
                    ))));
                }
                Ok(Expr::Symbol(Symbol::plain(id)))
            }
            other => Err(self.error(format!("unexpected token {:?}", other))),
        }
    }

    /// `[]`, `[ss]`, `[-1]`, `[1]`, `[+1]`
    fn parse_time_index(&mut self) -> Result<TimeIndex, ParseError> {
        self.expect(Token::LBracket, "'['")?;
        let index = match (self.peek().cloned(), self.peek_at(1).cloned()) {
            (Some(Token::RBracket), _) => TimeIndex::Offset(0),
            (Some(Token::Ident(s)), _) if s == "ss" => {
                self.next();
                TimeIndex::SteadyState
            }
            (Some(Token::Num(v)), _) => {
                self.next();
                TimeIndex::Offset(self.integer_offset(v)?)
            }
            (Some(Token::Op(sign @ ('-' | '+'))), Some(Token::Num(v))) => {
                self.next();
                self.next();
                let n = self.integer_offset(v)?;
                TimeIndex::Offset(if sign == '-' { -n } else { n })
            }
            _ => return Err(self.error("malformed time index")),
        };
        self.expect(Token::RBracket, "']'")?;
        Ok(index)
    }

    fn integer_offset(&self, v: f64) -> Result<i32, ParseError> {
        if v.fract() != 0.0 || v.abs() > i32::MAX as f64 {
            return Err(self.error(format!("time index must be an integer, found {}", v)));
        }
        Ok(v as i32)
    }
}

pub fn parse_equation(source: &str) -> Result<Equation, ParseError> {
    Parser::new(source)?.parse_equation()
}

pub fn parse_expression(source: &str) -> Result<Expr, ParseError> {
    Parser::new(source)?.parse_complete_expr()
}

/// Parse a declared name such as `alpha` or `epsilon[]`
pub fn parse_symbol(source: &str) -> Result<Symbol, ParseError> {
    match parse_expression(source)? {
        Expr::Symbol(s) => Ok(s),
        _ => Err(ParseError::syntax(
            "declaration",
            "expected a variable or parameter name",
            source,
        )),
    }
}
