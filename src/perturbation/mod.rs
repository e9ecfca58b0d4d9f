//! First-order perturbation of the equilibrium residuals.
//!
//! Every residual `F(x[-1], x, x[1], ε) = 0` is differentiated with respect
//! to the lagged (A), current (B) and leading (C) variables and the shocks
//! (D). Structurally zero derivatives are dropped, the rest are evaluated at
//! the steady state with all non-estimated parameters fixed, and compiled to
//! closures over the free parameters. Each matrix is kept in compressed-row
//! form so it can be rebuilt cheaply for every parameter draw.

use std::collections::HashMap;
use std::fmt;

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::expr::{CompiledFn, Expr, ExprError, Tape};
use crate::symbols::{Symbol, SymbolDictionary, TimeAwareSymbol};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PerturbationError {
    #[error("No steady-state value for '{0}'")]
    MissingSteadyState(String),
    #[error("Parameter '{parameter}' in equation {equation} is neither free nor calibrated")]
    UnknownParameter { parameter: String, equation: usize },
    #[error("No value given for free parameter '{0}'")]
    MissingParameter(String),
    #[error("Malformed CSR data: {0}")]
    MalformedCsr(String),
    #[error(transparent)]
    Expr(#[from] ExprError),
}

/// How variables enter the linear system
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Linearization {
    /// Deviations in levels
    #[default]
    Levels,
    /// Percent deviations: each variable column is scaled by its steady state
    LogLinear,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PerturbationOptions {
    pub linearization: Linearization,
}

impl PerturbationOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_linear(mut self) -> Self {
        self.linearization = Linearization::LogLinear;
        self
    }

    pub fn levels(mut self) -> Self {
        self.linearization = Linearization::Levels;
        self
    }
}

/// Sparse matrix in compressed-row form whose entries are closures over the
/// free parameters
#[derive(Clone)]
pub struct SparseMatrixData {
    closures: Vec<CompiledFn>,
    column_indices: Vec<usize>,
    row_pointers: Vec<usize>,
    shape: (usize, usize),
}

impl fmt::Debug for SparseMatrixData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SparseMatrixData")
            .field("nnz", &self.closures.len())
            .field("column_indices", &self.column_indices)
            .field("row_pointers", &self.row_pointers)
            .field("shape", &self.shape)
            .finish()
    }
}

impl SparseMatrixData {
    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn nnz(&self) -> usize {
        self.closures.len()
    }

    pub fn closures(&self) -> &[CompiledFn] {
        &self.closures
    }

    pub fn column_indices(&self) -> &[usize] {
        &self.column_indices
    }

    pub fn row_pointers(&self) -> &[usize] {
        &self.row_pointers
    }

    /// The stored entries at `params`, in storage order
    pub fn values(&self, params: &[f64]) -> Vec<f64> {
        self.closures.iter().map(|f| f(params)).collect()
    }

    pub fn evaluate(&self, params: &[f64]) -> DMatrix<f64> {
        fill_from_csr(
            &self.values(params),
            &self.column_indices,
            &self.row_pointers,
            self.shape,
        )
    }
}

/// Dense matrix from CSR data.
///
/// `out[(i, column_indices[p])] = values[p]` for `p` in
/// `row_pointers[i]..row_pointers[i + 1]`, zero elsewhere. The triple must
/// have one pointer per row plus one, non-decreasing pointers ending at the
/// number of stored values, and column indices inside `shape`.
pub fn matrix_from_csr_data(
    values: &[f64],
    column_indices: &[usize],
    row_pointers: &[usize],
    shape: (usize, usize),
) -> Result<DMatrix<f64>, PerturbationError> {
    let malformed = |reason: String| Err(PerturbationError::MalformedCsr(reason));
    if values.len() != column_indices.len() {
        return malformed(format!(
            "{} values but {} column indices",
            values.len(),
            column_indices.len()
        ));
    }
    if row_pointers.len() != shape.0 + 1 {
        return malformed(format!(
            "{} row pointers for {} rows",
            row_pointers.len(),
            shape.0
        ));
    }
    if row_pointers.windows(2).any(|w| w[0] > w[1]) {
        return malformed("row pointers decrease".to_string());
    }
    if row_pointers.last() != Some(&values.len()) {
        return malformed(format!(
            "last row pointer {:?} does not match {} values",
            row_pointers.last(),
            values.len()
        ));
    }
    if let Some(&j) = column_indices.iter().find(|&&j| j >= shape.1) {
        return malformed(format!("column index {} outside {} columns", j, shape.1));
    }
    Ok(fill_from_csr(values, column_indices, row_pointers, shape))
}

// Assumes a well-formed triple, as produced by the compiler
fn fill_from_csr(
    values: &[f64],
    column_indices: &[usize],
    row_pointers: &[usize],
    shape: (usize, usize),
) -> DMatrix<f64> {
    let mut out = DMatrix::zeros(shape.0, shape.1);
    for (i, bounds) in row_pointers.windows(2).enumerate().take(shape.0) {
        for p in bounds[0]..bounds[1] {
            out[(i, column_indices[p])] = values[p];
        }
    }
    out
}

/// Dense coefficient matrices of `A x[-1] + B x + C E[x[1]] + D ε = 0`
#[derive(Debug, Clone, PartialEq)]
pub struct SystemMatrices {
    pub a: DMatrix<f64>,
    pub b: DMatrix<f64>,
    pub c: DMatrix<f64>,
    pub d: DMatrix<f64>,
}

/// Everything [compile_perturbation] needs
#[derive(Debug, Clone, Copy)]
pub struct PerturbationInput<'a> {
    /// Residuals, each read as `= 0`
    pub equations: &'a [Expr],
    /// Variables at time t; columns of A, B and C follow this order
    pub variables: &'a [TimeAwareSymbol],
    pub shocks: &'a [TimeAwareSymbol],
    /// Steady-state values keyed by base name (`K`) or steady-state name (`K_ss`)
    pub steady_state: &'a SymbolDictionary<f64>,
    pub calibrated: &'a SymbolDictionary<f64>,
    /// Parameters left symbolic; closures take their values in this order
    pub free_params: &'a [String],
}

/// The compiled A, B, C and D matrices
#[derive(Debug, Clone)]
pub struct PerturbationSystem {
    free_params: Vec<String>,
    variables: Vec<TimeAwareSymbol>,
    shocks: Vec<TimeAwareSymbol>,
    linearization: Linearization,
    a: SparseMatrixData,
    b: SparseMatrixData,
    c: SparseMatrixData,
    d: SparseMatrixData,
}

impl PerturbationSystem {
    pub fn free_params(&self) -> &[String] {
        &self.free_params
    }

    pub fn variables(&self) -> &[TimeAwareSymbol] {
        &self.variables
    }

    pub fn shocks(&self) -> &[TimeAwareSymbol] {
        &self.shocks
    }

    pub fn linearization(&self) -> Linearization {
        self.linearization
    }

    pub fn a(&self) -> &SparseMatrixData {
        &self.a
    }

    pub fn b(&self) -> &SparseMatrixData {
        &self.b
    }

    pub fn c(&self) -> &SparseMatrixData {
        &self.c
    }

    pub fn d(&self) -> &SparseMatrixData {
        &self.d
    }

    /// Evaluate all four matrices with free parameters looked up by name.
    pub fn build_system_matrices(
        &self,
        params: &SymbolDictionary<f64>,
    ) -> Result<SystemMatrices, PerturbationError> {
        let values = self
            .free_params
            .iter()
            .map(|p| {
                params
                    .get_by_name(p)
                    .copied()
                    .ok_or_else(|| PerturbationError::MissingParameter(p.clone()))
            })
            .collect::<Result<Vec<f64>, _>>()?;
        Ok(self.build_from_slice(&values))
    }

    /// Evaluate all four matrices with free parameter values in
    /// [PerturbationSystem::free_params] order.
    pub fn build_from_slice(&self, values: &[f64]) -> SystemMatrices {
        SystemMatrices {
            a: self.a.evaluate(values),
            b: self.b.evaluate(values),
            c: self.c.evaluate(values),
            d: self.d.evaluate(values),
        }
    }
}

fn steady_state_value(
    steady_state: &SymbolDictionary<f64>,
    base_name: &str,
) -> Result<f64, PerturbationError> {
    steady_state
        .get_by_name(base_name)
        .or_else(|| steady_state.get_by_name(&format!("{}_ss", base_name)))
        .copied()
        .ok_or_else(|| PerturbationError::MissingSteadyState(base_name.to_string()))
}

struct Compiler<'a> {
    input: &'a PerturbationInput<'a>,
    free: Vec<Symbol>,
    shock_names: Vec<&'a str>,
}

impl<'a> Compiler<'a> {
    // Steady-state and calibrated values for every non-free symbol of `expr`
    fn evaluate_at_steady_state(&self, expr: &Expr, row: usize) -> Result<Expr, PerturbationError> {
        let mut values: HashMap<Symbol, Expr> = HashMap::new();
        for symbol in expr.free_symbols() {
            match &symbol {
                Symbol::TimeAware(s) if self.shock_names.contains(&s.base_name()) => {
                    values.insert(symbol.clone(), Expr::zero());
                }
                Symbol::TimeAware(s) => {
                    let v = steady_state_value(self.input.steady_state, s.base_name())?;
                    values.insert(symbol.clone(), Expr::Number(v));
                }
                Symbol::Plain { name, .. } => {
                    if self.free.contains(&symbol) {
                        continue;
                    }
                    let v = self.input.calibrated.get_by_name(name).copied().ok_or_else(|| {
                        PerturbationError::UnknownParameter {
                            parameter: name.clone(),
                            equation: row,
                        }
                    })?;
                    values.insert(symbol.clone(), Expr::Number(v));
                }
            }
        }
        Ok(expr.substitute(&|s| values.get(s).cloned()))
    }

    fn compile_matrix(
        &self,
        wrt: &[TimeAwareSymbol],
        scale_by_steady_state: bool,
    ) -> Result<SparseMatrixData, PerturbationError> {
        let mut closures = Vec::new();
        let mut column_indices = Vec::new();
        let mut row_pointers = Vec::with_capacity(self.input.equations.len() + 1);
        row_pointers.push(0);

        for (row, equation) in self.input.equations.iter().enumerate() {
            for (col, var) in wrt.iter().enumerate() {
                let mut derivative = equation.diff(&Symbol::TimeAware(var.clone()));
                if derivative.is_zero() {
                    continue;
                }
                if scale_by_steady_state {
                    let ss = steady_state_value(self.input.steady_state, var.base_name())?;
                    derivative = Expr::mul(derivative, Expr::Number(ss));
                }
                let entry = self.evaluate_at_steady_state(&derivative, row)?;
                if entry.is_zero() {
                    tracing::trace!(row, col, var = %var, "Derivative vanishes at the steady state");
                    continue;
                }
                let tape = Tape::compile(&entry, &self.free)?;
                closures.push(tape.into_closure());
                column_indices.push(col);
            }
            row_pointers.push(closures.len());
        }

        Ok(SparseMatrixData {
            closures,
            column_indices,
            row_pointers,
            shape: (self.input.equations.len(), wrt.len()),
        })
    }
}

/// Differentiate, evaluate at the steady state and compile the A, B, C and D
/// matrices.
pub fn compile_perturbation(
    input: &PerturbationInput,
    options: &PerturbationOptions,
) -> Result<PerturbationSystem, PerturbationError> {
    let compiler = Compiler {
        input,
        free: input.free_params.iter().map(Symbol::plain).collect(),
        shock_names: input.shocks.iter().map(|s| s.base_name()).collect(),
    };

    for var in input.variables {
        steady_state_value(input.steady_state, var.base_name())?;
    }

    let log_linear = options.linearization == Linearization::LogLinear;
    let lags: Vec<TimeAwareSymbol> = input.variables.iter().map(|v| v.step_backward()).collect();
    let leads: Vec<TimeAwareSymbol> = input.variables.iter().map(|v| v.step_forward()).collect();

    let a = compiler.compile_matrix(&lags, log_linear)?;
    let b = compiler.compile_matrix(input.variables, log_linear)?;
    let c = compiler.compile_matrix(&leads, log_linear)?;
    let d = compiler.compile_matrix(input.shocks, false)?;

    tracing::debug!(
        equations = input.equations.len(),
        variables = input.variables.len(),
        shocks = input.shocks.len(),
        nnz_a = a.nnz(),
        nnz_b = b.nnz(),
        nnz_c = c.nnz(),
        nnz_d = d.nnz(),
        "Compiled perturbation system"
    );

    Ok(PerturbationSystem {
        free_params: input.free_params.to_vec(),
        variables: input.variables.to_vec(),
        shocks: input.shocks.to_vec(),
        linearization: options.linearization,
        a,
        b,
        c,
        d,
    })
}
