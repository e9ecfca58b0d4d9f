//! Symbolic expressions over model symbols.
//!
//! Only the operations the model pipeline needs are provided: substitution,
//! differentiation, time shifting and numeric evaluation. Constructors fold
//! constants and drop additive/multiplicative identities, so a derivative that
//! is structurally zero comes out as `Expr::Number(0.0)`.

pub mod tape;

pub use tape::{CompiledFn, Opcode, Tape};

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::symbols::Symbol;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExprError {
    #[error("No value bound to symbol '{0}'")]
    UnboundSymbol(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            BinaryOp::Add => a + b,
            BinaryOp::Sub => a - b,
            BinaryOp::Mul => a * b,
            BinaryOp::Div => a / b,
            BinaryOp::Pow => a.powf(b),
        }
    }

    fn precedence(self) -> u8 {
        match self {
            BinaryOp::Add | BinaryOp::Sub => 1,
            BinaryOp::Mul | BinaryOp::Div => 2,
            BinaryOp::Pow => 4,
        }
    }

    fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Pow => "^",
        }
    }
}

/// Elementary functions understood by the GCN language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Function {
    Log,
    Exp,
    Sqrt,
    Sin,
    Cos,
    Tan,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Function> {
        match name {
            "log" | "ln" => Some(Function::Log),
            "exp" => Some(Function::Exp),
            "sqrt" => Some(Function::Sqrt),
            "sin" => Some(Function::Sin),
            "cos" => Some(Function::Cos),
            "tan" => Some(Function::Tan),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Function::Log => "log",
            Function::Exp => "exp",
            Function::Sqrt => "sqrt",
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
        }
    }

    pub fn apply(self, x: f64) -> f64 {
        match self {
            Function::Log => x.ln(),
            Function::Exp => x.exp(),
            Function::Sqrt => x.sqrt(),
            Function::Sin => x.sin(),
            Function::Cos => x.cos(),
            Function::Tan => x.tan(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    Number(f64),
    Symbol(Symbol),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        func: Function,
        arg: Box<Expr>,
    },
}

impl Expr {
    pub fn zero() -> Expr {
        Expr::Number(0.0)
    }

    pub fn one() -> Expr {
        Expr::Number(1.0)
    }

    pub fn symbol(s: Symbol) -> Expr {
        Expr::Symbol(s)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            Expr::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.as_number() == Some(0.0)
    }

    fn is_one(&self) -> bool {
        self.as_number() == Some(1.0)
    }

    pub fn neg(e: Expr) -> Expr {
        match e {
            Expr::Number(v) => Expr::Number(-v),
            Expr::Neg(inner) => *inner,
            other => Expr::Neg(Box::new(other)),
        }
    }

    pub fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        match op {
            BinaryOp::Add => Expr::add(lhs, rhs),
            BinaryOp::Sub => Expr::sub(lhs, rhs),
            BinaryOp::Mul => Expr::mul(lhs, rhs),
            BinaryOp::Div => Expr::div(lhs, rhs),
            BinaryOp::Pow => Expr::pow(lhs, rhs),
        }
    }

    fn raw(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    pub fn add(lhs: Expr, rhs: Expr) -> Expr {
        match (lhs.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => Expr::Number(a + b),
            (Some(a), _) if a == 0.0 => rhs,
            (_, Some(b)) if b == 0.0 => lhs,
            _ => match rhs {
                Expr::Neg(inner) => Expr::sub(lhs, *inner),
                rhs => Expr::raw(BinaryOp::Add, lhs, rhs),
            },
        }
    }

    pub fn sub(lhs: Expr, rhs: Expr) -> Expr {
        match (lhs.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => Expr::Number(a - b),
            (_, Some(b)) if b == 0.0 => lhs,
            (Some(a), _) if a == 0.0 => Expr::neg(rhs),
            _ if lhs == rhs => Expr::zero(),
            _ => Expr::raw(BinaryOp::Sub, lhs, rhs),
        }
    }

    pub fn mul(lhs: Expr, rhs: Expr) -> Expr {
        match (lhs.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) => Expr::Number(a * b),
            (Some(a), _) if a == 0.0 => Expr::zero(),
            (_, Some(b)) if b == 0.0 => Expr::zero(),
            (Some(a), _) if a == 1.0 => rhs,
            (_, Some(b)) if b == 1.0 => lhs,
            (Some(a), _) if a == -1.0 => Expr::neg(rhs),
            (_, Some(b)) if b == -1.0 => Expr::neg(lhs),
            _ => Expr::raw(BinaryOp::Mul, lhs, rhs),
        }
    }

    pub fn div(lhs: Expr, rhs: Expr) -> Expr {
        match (lhs.as_number(), rhs.as_number()) {
            (Some(a), Some(b)) if b != 0.0 => Expr::Number(a / b),
            (Some(a), _) if a == 0.0 => Expr::zero(),
            (_, Some(b)) if b == 1.0 => lhs,
            _ if lhs == rhs => Expr::one(),
            _ => Expr::raw(BinaryOp::Div, lhs, rhs),
        }
    }

    pub fn pow(base: Expr, exponent: Expr) -> Expr {
        match (base.as_number(), exponent.as_number()) {
            (Some(a), Some(b)) => Expr::Number(a.powf(b)),
            (_, Some(b)) if b == 0.0 => Expr::one(),
            (_, Some(b)) if b == 1.0 => base,
            (Some(a), _) if a == 1.0 => Expr::one(),
            _ => Expr::raw(BinaryOp::Pow, base, exponent),
        }
    }

    pub fn call(func: Function, arg: Expr) -> Expr {
        if let Some(v) = arg.as_number() {
            let value = func.apply(v);
            if value.is_finite() {
                return Expr::Number(value);
            }
        }
        match (func, arg) {
            (Function::Log, Expr::Call { func: Function::Exp, arg }) => *arg,
            (Function::Exp, Expr::Call { func: Function::Log, arg }) => *arg,
            (func, arg) => Expr::Call {
                func,
                arg: Box::new(arg),
            },
        }
    }

    /// True if `symbol` appears anywhere in the expression
    pub fn contains(&self, symbol: &Symbol) -> bool {
        match self {
            Expr::Number(_) => false,
            Expr::Symbol(s) => s == symbol,
            Expr::Neg(e) => e.contains(symbol),
            Expr::Binary { lhs, rhs, .. } => lhs.contains(symbol) || rhs.contains(symbol),
            Expr::Call { arg, .. } => arg.contains(symbol),
        }
    }

    /// All symbols in order of first appearance
    pub fn free_symbols(&self) -> IndexSet<Symbol> {
        let mut out = IndexSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut IndexSet<Symbol>) {
        match self {
            Expr::Number(_) => {}
            Expr::Symbol(s) => {
                out.insert(s.clone());
            }
            Expr::Neg(e) => e.collect_symbols(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_symbols(out);
                rhs.collect_symbols(out);
            }
            Expr::Call { arg, .. } => arg.collect_symbols(out),
        }
    }

    /// Replace symbols for which `f` returns `Some`, re-simplifying on the way up
    pub fn substitute(&self, f: &dyn Fn(&Symbol) -> Option<Expr>) -> Expr {
        match self {
            Expr::Number(v) => Expr::Number(*v),
            Expr::Symbol(s) => f(s).unwrap_or_else(|| Expr::Symbol(s.clone())),
            Expr::Neg(e) => Expr::neg(e.substitute(f)),
            Expr::Binary { op, lhs, rhs } => {
                Expr::binary(*op, lhs.substitute(f), rhs.substitute(f))
            }
            Expr::Call { func, arg } => Expr::call(*func, arg.substitute(f)),
        }
    }

    pub fn map_symbols(&self, f: &dyn Fn(&Symbol) -> Symbol) -> Expr {
        self.substitute(&|s| Some(Expr::Symbol(f(s))))
    }

    /// Move every time-aware symbol `delta` periods. Parameters and
    /// steady-state symbols are unchanged.
    pub fn shift_time(&self, delta: i32) -> Expr {
        if delta == 0 {
            return self.clone();
        }
        self.map_symbols(&|s| s.shift(delta))
    }

    pub fn step_forward(&self) -> Expr {
        self.shift_time(1)
    }

    pub fn step_backward(&self) -> Expr {
        self.shift_time(-1)
    }

    pub fn to_ss(&self) -> Expr {
        self.map_symbols(&Symbol::to_ss)
    }

    /// Partial derivative with respect to `wrt`
    pub fn diff(&self, wrt: &Symbol) -> Expr {
        if !self.contains(wrt) {
            return Expr::zero();
        }
        match self {
            Expr::Number(_) => Expr::zero(),
            Expr::Symbol(s) => {
                if s == wrt {
                    Expr::one()
                } else {
                    Expr::zero()
                }
            }
            Expr::Neg(e) => Expr::neg(e.diff(wrt)),
            Expr::Binary { op, lhs, rhs } => {
                let (a, b) = (lhs.as_ref(), rhs.as_ref());
                match op {
                    BinaryOp::Add => Expr::add(a.diff(wrt), b.diff(wrt)),
                    BinaryOp::Sub => Expr::sub(a.diff(wrt), b.diff(wrt)),
                    BinaryOp::Mul => Expr::add(
                        Expr::mul(a.diff(wrt), b.clone()),
                        Expr::mul(a.clone(), b.diff(wrt)),
                    ),
                    BinaryOp::Div => Expr::div(
                        Expr::sub(
                            Expr::mul(a.diff(wrt), b.clone()),
                            Expr::mul(a.clone(), b.diff(wrt)),
                        ),
                        Expr::pow(b.clone(), Expr::Number(2.0)),
                    ),
                    BinaryOp::Pow => {
                        if !b.contains(wrt) {
                            // d(a^n) = n a^(n-1) a'
                            Expr::mul(
                                Expr::mul(
                                    b.clone(),
                                    Expr::pow(a.clone(), Expr::sub(b.clone(), Expr::one())),
                                ),
                                a.diff(wrt),
                            )
                        } else {
                            // d(a^b) = a^b (b' log a + b a'/a)
                            Expr::mul(
                                self.clone(),
                                Expr::add(
                                    Expr::mul(b.diff(wrt), Expr::call(Function::Log, a.clone())),
                                    Expr::div(Expr::mul(b.clone(), a.diff(wrt)), a.clone()),
                                ),
                            )
                        }
                    }
                }
            }
            Expr::Call { func, arg } => {
                let inner = arg.diff(wrt);
                let a = arg.as_ref().clone();
                let outer = match func {
                    Function::Log => Expr::div(Expr::one(), a),
                    Function::Exp => self.clone(),
                    Function::Sqrt => Expr::div(Expr::Number(0.5), self.clone()),
                    Function::Sin => Expr::call(Function::Cos, a),
                    Function::Cos => Expr::neg(Expr::call(Function::Sin, a)),
                    Function::Tan => Expr::div(
                        Expr::one(),
                        Expr::pow(Expr::call(Function::Cos, a), Expr::Number(2.0)),
                    ),
                };
                Expr::mul(outer, inner)
            }
        }
    }

    /// Evaluate numerically, looking up every symbol through `lookup`
    pub fn eval(&self, lookup: &dyn Fn(&Symbol) -> Option<f64>) -> Result<f64, ExprError> {
        match self {
            Expr::Number(v) => Ok(*v),
            Expr::Symbol(s) => lookup(s).ok_or_else(|| ExprError::UnboundSymbol(s.to_string())),
            Expr::Neg(e) => Ok(-e.eval(lookup)?),
            Expr::Binary { op, lhs, rhs } => Ok(op.apply(lhs.eval(lookup)?, rhs.eval(lookup)?)),
            Expr::Call { func, arg } => Ok(func.apply(arg.eval(lookup)?)),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Binary { op, .. } => op.precedence(),
            Expr::Neg(_) => 3,
            Expr::Number(v) if *v < 0.0 => 3,
            _ => 5,
        }
    }

    fn fmt_child(&self, f: &mut fmt::Formatter<'_>, min: u8) -> fmt::Result {
        if self.precedence() < min {
            write!(f, "({})", self)
        } else {
            write!(f, "{}", self)
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(v) => write!(f, "{}", v),
            Expr::Symbol(s) => write!(f, "{}", s),
            Expr::Neg(e) => {
                write!(f, "-")?;
                e.fmt_child(f, 4)
            }
            Expr::Binary { op, lhs, rhs } => {
                let p = op.precedence();
                // left-associative except for ^
                let (left_min, right_min) = match op {
                    BinaryOp::Pow => (p + 1, p),
                    BinaryOp::Add | BinaryOp::Mul => (p, p),
                    BinaryOp::Sub | BinaryOp::Div => (p, p + 1),
                };
                lhs.fmt_child(f, left_min)?;
                write!(f, " {} ", op.symbol())?;
                rhs.fmt_child(f, right_min)
            }
            Expr::Call { func, arg } => write!(f, "{}({})", func.name(), arg),
        }
    }
}

impl From<f64> for Expr {
    fn from(v: f64) -> Self {
        Expr::Number(v)
    }
}

impl From<Symbol> for Expr {
    fn from(s: Symbol) -> Self {
        Expr::Symbol(s)
    }
}

impl Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::add(self, rhs)
    }
}

impl Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::sub(self, rhs)
    }
}

impl Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::mul(self, rhs)
    }
}

impl Div for Expr {
    type Output = Expr;
    fn div(self, rhs: Expr) -> Expr {
        Expr::div(self, rhs)
    }
}

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::neg(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn x() -> Expr {
        Expr::Symbol(Symbol::var("x", 0))
    }

    fn alpha() -> Expr {
        Expr::Symbol(Symbol::plain("alpha"))
    }

    fn eval_at(e: &Expr, xv: f64) -> f64 {
        e.eval(&|s: &Symbol| match s.base_name() {
            "x" => Some(xv),
            "alpha" => Some(0.3),
            _ => None,
        })
        .unwrap()
    }

    #[test]
    fn test_constructors_fold_identities() {
        assert_eq!(Expr::add(Expr::zero(), x()), x());
        assert_eq!(Expr::mul(x(), Expr::one()), x());
        assert!(Expr::mul(Expr::zero(), x()).is_zero());
        assert!(Expr::sub(x(), x()).is_zero());
        assert_eq!(Expr::pow(x(), Expr::one()), x());
        assert_eq!(
            Expr::add(Expr::Number(2.0), Expr::Number(3.0)),
            Expr::Number(5.0)
        );
        assert_eq!(Expr::neg(Expr::neg(x())), x());
    }

    #[test]
    fn test_structural_zero_derivative() {
        let e = Expr::mul(alpha(), Expr::Symbol(Symbol::var("y", 0)));
        assert!(e.diff(&Symbol::var("x", 0)).is_zero());
        assert!(e.diff(&Symbol::var("y", 1)).is_zero());
    }

    #[test]
    fn test_derivatives_match_finite_differences() {
        let exprs = vec![
            Expr::pow(x(), alpha()),
            Expr::call(Function::Log, Expr::mul(alpha(), x())),
            Expr::div(Expr::call(Function::Exp, x()), Expr::add(x(), Expr::one())),
            Expr::call(Function::Sqrt, Expr::mul(x(), x())),
            Expr::pow(alpha(), x()),
            Expr::pow(x(), x()),
            Expr::call(Function::Sin, x()) * Expr::call(Function::Cos, x()),
            Expr::call(Function::Tan, x()) - x(),
        ];
        let wrt = Symbol::var("x", 0);
        let h = 1e-6;
        for e in exprs {
            let d = e.diff(&wrt);
            for xv in [0.4, 1.3, 2.0] {
                let numeric = (eval_at(&e, xv + h) - eval_at(&e, xv - h)) / (2.0 * h);
                assert_relative_eq!(eval_at(&d, xv), numeric, epsilon = 1e-6, max_relative = 1e-6);
            }
        }
    }

    #[test]
    fn test_shift_time_leaves_parameters() {
        let e = Expr::mul(alpha(), Expr::Symbol(Symbol::var("K", -1)));
        let shifted = e.step_forward();
        assert!(shifted.contains(&Symbol::var("K", 0)));
        assert!(shifted.contains(&Symbol::plain("alpha")));
        assert_eq!(shifted.step_backward(), e);

        let ss = e.to_ss();
        assert!(ss.contains(&Symbol::ss("K")));
        assert_eq!(ss.shift_time(3), ss);
    }

    #[test]
    fn test_substitute_simplifies() {
        let e = Expr::add(Expr::mul(alpha(), x()), Expr::one());
        let s = e.substitute(&|s: &Symbol| {
            (s.base_name() == "alpha").then(|| Expr::zero())
        });
        assert_eq!(s, Expr::one());
    }

    #[test]
    fn test_eval_reports_unbound() {
        let err = x().eval(&|_| None).unwrap_err();
        assert_eq!(err, ExprError::UnboundSymbol("x[]".to_string()));
    }

    #[test]
    fn test_display() {
        let e = Expr::sub(
            x(),
            Expr::mul(alpha(), Expr::add(x(), Expr::Symbol(Symbol::var("x", -1)))),
        );
        assert_eq!(e.to_string(), "x[] - alpha * (x[] + x[-1])");
        let p = Expr::pow(x(), Expr::sub(Expr::one(), alpha()));
        assert_eq!(p.to_string(), "x[] ^ (1 - alpha)");
    }

    #[test]
    fn test_free_symbols_in_order() {
        let e = Expr::add(Expr::mul(alpha(), x()), x());
        let syms: Vec<String> = e.free_symbols().iter().map(|s| s.to_string()).collect();
        assert_eq!(syms, vec!["alpha", "x[]"]);
    }
}
