use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::{BinaryOp, Expr, ExprError, Function};
use crate::symbols::Symbol;

/// A compiled scalar function of a fixed input vector.
pub type CompiledFn = Arc<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// Stack-machine instruction set for compiled expressions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub enum Opcode {
    PushConst(f64), // push constant
    LoadInput(usize), // push inputs[idx]

    Neg,
    Add,
    Sub,
    Mul,
    Div,
    Pow,

    Call(Function),
}

/// Postfix program evaluating an [Expr] over an ordered list of input symbols.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Tape {
    code: Vec<Opcode>,
    n_inputs: usize,
    max_depth: usize,
}

impl Tape {
    /// Compile `expr`. Every free symbol must appear in `inputs`; its position
    /// there is the index read at evaluation time.
    pub fn compile(expr: &Expr, inputs: &[Symbol]) -> Result<Tape, ExprError> {
        let mut code = Vec::new();
        emit(expr, inputs, &mut code)?;

        let mut depth: usize = 0;
        let mut max_depth: usize = 0;
        for op in &code {
            match op {
                Opcode::PushConst(_) | Opcode::LoadInput(_) => depth += 1,
                Opcode::Add | Opcode::Sub | Opcode::Mul | Opcode::Div | Opcode::Pow => {
                    depth -= 1
                }
                Opcode::Neg | Opcode::Call(_) => {}
            }
            max_depth = max_depth.max(depth);
        }

        Ok(Tape {
            code,
            n_inputs: inputs.len(),
            max_depth,
        })
    }

    pub fn code(&self) -> &[Opcode] {
        &self.code
    }

    pub fn n_inputs(&self) -> usize {
        self.n_inputs
    }

    /// Run the program. Inputs beyond the slice length read as NaN.
    pub fn eval(&self, inputs: &[f64]) -> f64 {
        let mut stack: Vec<f64> = Vec::with_capacity(self.max_depth);
        for op in &self.code {
            match op {
                Opcode::PushConst(v) => stack.push(*v),
                Opcode::LoadInput(i) => stack.push(inputs.get(*i).copied().unwrap_or(f64::NAN)),
                Opcode::Neg => {
                    let a = stack.pop().unwrap_or(f64::NAN);
                    stack.push(-a);
                }
                Opcode::Add => binary(&mut stack, BinaryOp::Add),
                Opcode::Sub => binary(&mut stack, BinaryOp::Sub),
                Opcode::Mul => binary(&mut stack, BinaryOp::Mul),
                Opcode::Div => binary(&mut stack, BinaryOp::Div),
                Opcode::Pow => binary(&mut stack, BinaryOp::Pow),
                Opcode::Call(func) => {
                    let a = stack.pop().unwrap_or(f64::NAN);
                    stack.push(func.apply(a));
                }
            }
        }
        stack.pop().unwrap_or(f64::NAN)
    }

    /// Wrap the tape in a thread-safe closure
    pub fn into_closure(self) -> CompiledFn {
        Arc::new(move |inputs: &[f64]| self.eval(inputs))
    }
}

fn binary(stack: &mut Vec<f64>, op: BinaryOp) {
    let b = stack.pop().unwrap_or(f64::NAN);
    let a = stack.pop().unwrap_or(f64::NAN);
    stack.push(op.apply(a, b));
}

fn emit(expr: &Expr, inputs: &[Symbol], code: &mut Vec<Opcode>) -> Result<(), ExprError> {
    match expr {
        Expr::Number(v) => code.push(Opcode::PushConst(*v)),
        Expr::Symbol(s) => {
            let idx = inputs
                .iter()
                .position(|i| i == s)
                .ok_or_else(|| ExprError::UnboundSymbol(s.to_string()))?;
            code.push(Opcode::LoadInput(idx));
        }
        Expr::Neg(e) => {
            emit(e, inputs, code)?;
            code.push(Opcode::Neg);
        }
        Expr::Binary { op, lhs, rhs } => {
            emit(lhs, inputs, code)?;
            emit(rhs, inputs, code)?;
            code.push(match op {
                BinaryOp::Add => Opcode::Add,
                BinaryOp::Sub => Opcode::Sub,
                BinaryOp::Mul => Opcode::Mul,
                BinaryOp::Div => Opcode::Div,
                BinaryOp::Pow => Opcode::Pow,
            });
        }
        Expr::Call { func, arg } => {
            emit(arg, inputs, code)?;
            code.push(Opcode::Call(*func));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_tape_matches_tree_evaluation() {
        let beta = Symbol::plain("beta");
        let rho = Symbol::plain("rho");
        let e = Expr::div(
            Expr::call(Function::Log, Expr::symbol(beta.clone())),
            Expr::sub(Expr::one(), Expr::pow(Expr::symbol(rho.clone()), Expr::Number(2.0))),
        );
        let tape = Tape::compile(&e, &[rho.clone(), beta.clone()]).unwrap();
        assert_eq!(tape.n_inputs(), 2);

        let expected = e
            .eval(&|s: &Symbol| {
                if *s == beta {
                    Some(0.99)
                } else if *s == rho {
                    Some(0.5)
                } else {
                    None
                }
            })
            .unwrap();
        assert_relative_eq!(tape.eval(&[0.5, 0.99]), expected, epsilon = 1e-15);

        let f = tape.into_closure();
        assert_relative_eq!(f(&[0.5, 0.99]), expected, epsilon = 1e-15);
    }

    #[test]
    fn test_constant_tape() {
        let tape = Tape::compile(&Expr::Number(-2.5), &[]).unwrap();
        assert_eq!(tape.code(), &[Opcode::PushConst(-2.5)]);
        assert_eq!(tape.eval(&[]), -2.5);
    }

    #[test]
    fn test_compile_rejects_unknown_symbols() {
        let e = Expr::symbol(Symbol::plain("gamma"));
        let err = Tape::compile(&e, &[Symbol::plain("beta")]).unwrap_err();
        assert_eq!(err, ExprError::UnboundSymbol("gamma".to_string()));
    }
}
