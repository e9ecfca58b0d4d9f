//! Assembly of a parsed GCN file into an equilibrium system.
//!
//! The model collects the residual equations of `identities` and
//! `constraints`, substitutes `definitions`, classifies every symbol as a
//! variable, shock or parameter, evaluates the calibration block and
//! resolves the priors. Steady-state values come from an external solver as
//! a [SteadyStateSolution].

use std::collections::HashMap;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::distributions::{create_prior_distribution_dictionary, Prior};
use crate::error::GeconError;
use crate::expr::Expr;
use crate::parser::{preprocess_gcn, Equation, GcnFile, SectionKind, Statement};
use crate::perturbation::{
    compile_perturbation, PerturbationInput, PerturbationOptions,
    PerturbationSystem,
};
use crate::symbols::{Symbol, SymbolDictionary, TimeAwareSymbol, TimeIndex};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// Only lags, current values and one-period leads can be linearized
    #[error("'{symbol}' in \"{equation}\" is more than one period away from t")]
    UnsupportedTimeShift { symbol: String, equation: String },
    #[error("Could not calibrate '{parameter}': {reason}")]
    Calibration { parameter: String, reason: String },
    #[error("Definitions must have a single symbol on the left-hand side: \"{0}\"")]
    InvalidDefinition(String),
    #[error("The model has no identities or constraints")]
    NoEquations,
}

/// Values returned by an external steady-state solver.
///
/// Keys are variable base names (`K`) or steady-state names (`K_ss`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SteadyStateSolution {
    pub values: IndexMap<String, f64>,
    pub success: bool,
}

impl SteadyStateSolution {
    pub fn new(values: IndexMap<String, f64>, success: bool) -> Self {
        Self { values, success }
    }

    pub fn from_json(json: &str) -> Result<Self, GeconError> {
        Ok(serde_json::from_str(json)?)
    }

    /// The solution keyed by variable base name
    pub fn to_dictionary(&self) -> Result<SymbolDictionary<f64>, GeconError> {
        let mut dict = SymbolDictionary::new();
        for (key, value) in &self.values {
            let base = match Symbol::from_key(key) {
                Symbol::TimeAware(s) => s.base_name().to_string(),
                Symbol::Plain { name, .. } => name,
            };
            dict.insert(base, *value)?;
        }
        Ok(dict)
    }
}

// A defined symbol and the expression it stands for.
struct Definition {
    lhs: Symbol,
    rhs: Expr,
}

impl Definition {
    fn expand(&self, occurrence: &Symbol) -> Option<Expr> {
        if occurrence.base_name() != self.lhs.base_name() {
            return None;
        }
        match (self.lhs.time_index(), occurrence.time_index()) {
            (None, None) => Some(self.rhs.clone()),
            (Some(_), Some(TimeIndex::SteadyState)) => Some(self.rhs.to_ss()),
            (Some(TimeIndex::Offset(at)), Some(TimeIndex::Offset(t))) => {
                Some(self.rhs.shift_time(t - at))
            }
            _ => None,
        }
    }
}

fn substitute_definitions(expr: &Expr, definitions: &[Definition]) -> Expr {
    expr.substitute(&|s| definitions.iter().find_map(|d| d.expand(s)))
}

#[derive(Debug, Clone)]
pub struct Model {
    file: GcnFile,
    equations: Vec<Expr>,
    sources: Vec<String>,
    variables: Vec<TimeAwareSymbol>,
    shocks: Vec<TimeAwareSymbol>,
    parameters: Vec<String>,
    calibrated: SymbolDictionary<f64>,
    calibrating_equations: Vec<Equation>,
    param_priors: IndexMap<String, Prior>,
    shock_priors: IndexMap<String, Prior>,
    hyper_priors: IndexMap<String, Prior>,
}

impl Model {
    /// Parse GCN source text and assemble the model.
    pub fn from_gcn(text: &str) -> Result<Model, GeconError> {
        let (file, raw_priors) = preprocess_gcn(text)?;
        let (priors, hyper_priors) = create_prior_distribution_dictionary(&raw_priors)?;
        let priors: IndexMap<String, Prior> = priors
            .into_iter()
            .map(|(name, prior)| {
                let initial = file
                    .priors()
                    .find(|d| d.name == name)
                    .and_then(|d| d.initial_value);
                (name, prior.with_initial_value(initial))
            })
            .collect();

        let definitions = collect_definitions(&file)?;

        let mut equations = Vec::new();
        let mut sources = Vec::new();
        for kind in [SectionKind::Identities, SectionKind::Constraints] {
            for eq in file.equations(kind) {
                equations.push(substitute_definitions(&eq.residual(), &definitions));
                sources.push(eq.source.clone());
            }
        }
        if equations.is_empty() {
            return Err(ModelError::NoEquations.into());
        }

        let shock_names: IndexSet<String> = file
            .sections(SectionKind::Shocks)
            .flat_map(|s| s.declared_symbols())
            .map(|s| s.base_name().to_string())
            .collect();

        let mut variables: IndexMap<String, TimeAwareSymbol> = IndexMap::new();
        let mut parameters: IndexSet<String> = IndexSet::new();
        for (eq, source) in equations.iter().zip(&sources) {
            for symbol in eq.free_symbols() {
                match symbol {
                    Symbol::TimeAware(s) => {
                        if let TimeIndex::Offset(t) = s.time_index() {
                            if !(-1..=1).contains(&t) {
                                return Err(ModelError::UnsupportedTimeShift {
                                    symbol: s.to_string(),
                                    equation: source.clone(),
                                }
                                .into());
                            }
                        }
                        if !shock_names.contains(s.base_name()) {
                            variables
                                .entry(s.base_name().to_string())
                                .or_insert_with(|| s.set_t(TimeIndex::Offset(0)));
                        }
                    }
                    Symbol::Plain { name, .. } => {
                        parameters.insert(name);
                    }
                }
            }
        }

        let assumption_of = |name: &str| file.assumptions.get(name).cloned().unwrap_or_default();
        let mut variables: Vec<TimeAwareSymbol> = variables
            .into_values()
            .map(|s| {
                let a = assumption_of(s.base_name());
                s.with_assumptions(a)
            })
            .collect();
        variables.sort_by(|a, b| a.base_name().cmp(b.base_name()));

        let shocks: Vec<TimeAwareSymbol> = shock_names
            .iter()
            .map(|name| TimeAwareSymbol::at(name.as_str(), 0).with_assumptions(assumption_of(name)))
            .collect();

        let (calibrated, calibrating_equations) = calibrate(&file)?;

        // shock priors own their hyper-priors; everything else is a parameter prior
        let shock_prior_names: IndexSet<&str> = file
            .sections(SectionKind::Shocks)
            .flat_map(|s| s.priors())
            .map(|p| p.name.as_str())
            .collect();
        let mut shock_priors = IndexMap::new();
        let mut param_priors = IndexMap::new();
        for (name, prior) in &priors {
            if shock_prior_names.contains(name.as_str()) {
                shock_priors.insert(name.clone(), prior.clone());
            }
        }
        let owned_by_shocks: IndexSet<&str> = shock_priors
            .values()
            .flat_map(|p: &Prior| p.rv_params().values().map(|h| h.name()))
            .collect();
        for (name, prior) in &priors {
            if !shock_prior_names.contains(name.as_str()) && !owned_by_shocks.contains(name.as_str())
            {
                param_priors.insert(name.clone(), prior.clone());
            }
        }

        tracing::debug!(
            equations = equations.len(),
            variables = variables.len(),
            shocks = shocks.len(),
            parameters = parameters.len(),
            "Assembled model"
        );

        Ok(Model {
            file,
            equations,
            sources,
            variables,
            shocks,
            parameters: parameters.into_iter().collect(),
            calibrated,
            calibrating_equations,
            param_priors,
            shock_priors,
            hyper_priors,
        })
    }

    pub fn file(&self) -> &GcnFile {
        &self.file
    }

    /// Residuals `lhs - rhs` of every identity and constraint, to be read as `= 0`
    pub fn equations(&self) -> &[Expr] {
        &self.equations
    }

    /// Source text of each equation, aligned with [Model::equations]
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Variables at time t, sorted by base name
    pub fn variables(&self) -> &[TimeAwareSymbol] {
        &self.variables
    }

    pub fn lags(&self) -> Vec<TimeAwareSymbol> {
        self.variables.iter().map(|v| v.step_backward()).collect()
    }

    pub fn leads(&self) -> Vec<TimeAwareSymbol> {
        self.variables.iter().map(|v| v.step_forward()).collect()
    }

    pub fn shocks(&self) -> &[TimeAwareSymbol] {
        &self.shocks
    }

    /// Parameters referenced by the equations, in order of first appearance
    pub fn parameters(&self) -> &[String] {
        &self.parameters
    }

    pub fn calibrated_parameters(&self) -> &SymbolDictionary<f64> {
        &self.calibrated
    }

    /// Calibration equations left for the steady-state solver
    pub fn calibrating_equations(&self) -> &[Equation] {
        &self.calibrating_equations
    }

    pub fn param_priors(&self) -> &IndexMap<String, Prior> {
        &self.param_priors
    }

    pub fn shock_priors(&self) -> &IndexMap<String, Prior> {
        &self.shock_priors
    }

    pub fn hyper_priors(&self) -> &IndexMap<String, Prior> {
        &self.hyper_priors
    }

    pub fn options(&self) -> &IndexMap<String, String> {
        &self.file.options
    }

    /// Residuals with every variable at its steady state, followed by the
    /// calibrating equations, for the external steady-state solver.
    pub fn steady_state_equations(&self) -> Vec<Expr> {
        self.equations
            .iter()
            .map(|e| e.to_ss())
            .chain(self.calibrating_equations.iter().map(|e| e.residual().to_ss()))
            .collect()
    }

    /// Compile the first-order perturbation system around `steady_state`,
    /// keeping `free_params` symbolic.
    pub fn compile_perturbation(
        &self,
        steady_state: &SteadyStateSolution,
        free_params: &[&str],
        options: &PerturbationOptions,
    ) -> Result<PerturbationSystem, GeconError> {
        if !steady_state.success {
            tracing::warn!("Linearizing around a steady state the solver did not converge to");
        }
        let steady_state = steady_state.to_dictionary()?;
        let free: Vec<String> = free_params.iter().map(|p| p.to_string()).collect();
        let input = PerturbationInput {
            equations: &self.equations,
            variables: &self.variables,
            shocks: &self.shocks,
            steady_state: &steady_state,
            calibrated: &self.calibrated,
            free_params: &free,
        };
        Ok(compile_perturbation(&input, options)?)
    }
}

fn collect_definitions(file: &GcnFile) -> Result<Vec<Definition>, ModelError> {
    let mut definitions: Vec<Definition> = Vec::new();
    for eq in file.equations(SectionKind::Definitions) {
        let Expr::Symbol(lhs) = &eq.lhs else {
            return Err(ModelError::InvalidDefinition(eq.source.clone()));
        };
        // earlier definitions may appear on the right-hand side
        let rhs = substitute_definitions(&eq.rhs, &definitions);
        definitions.push(Definition {
            lhs: lhs.clone(),
            rhs,
        });
    }
    Ok(definitions)
}

// Evaluate the calibration block in order. Assignments of a parameter to an
// expression of already known parameters are evaluated; everything else is
// left for the steady-state solver.
fn calibrate(file: &GcnFile) -> Result<(SymbolDictionary<f64>, Vec<Equation>), GeconError> {
    let mut values: HashMap<String, f64> = HashMap::new();
    let mut calibrated = SymbolDictionary::new();
    let mut deferred = Vec::new();

    for section in file.sections(SectionKind::Calibration) {
        for statement in &section.statements {
            match statement {
                Statement::Prior(decl) => {
                    if let Some(v) = decl.initial_value {
                        values.insert(decl.symbol.base_name().to_string(), v);
                        calibrated.insert(decl.symbol.base_name(), v)?;
                    }
                }
                Statement::Equation(eq) => {
                    let Some(parameter) = eq.assigned_parameter() else {
                        deferred.push(eq.clone());
                        continue;
                    };
                    if eq.rhs.free_symbols().iter().any(|s| s.is_time_aware()) {
                        deferred.push(eq.clone());
                        continue;
                    }
                    let v = eq
                        .rhs
                        .eval(&|s| values.get(s.base_name()).copied())
                        .map_err(|e| ModelError::Calibration {
                            parameter: parameter.to_string(),
                            reason: e.to_string(),
                        })?;
                    tracing::trace!(parameter, value = v, "Calibrated parameter");
                    values.insert(parameter.to_string(), v);
                    calibrated.insert(parameter, v)?;
                }
                Statement::Declaration(_) => {}
            }
        }
    }

    for (name, assumptions) in &file.assumptions {
        if values.contains_key(name) {
            calibrated.add_assumptions(name.as_str(), assumptions);
        }
    }
    Ok((calibrated, deferred))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const MODEL: &str = r#"
        assumptions
        {
            positive
            {
                K[], beta;
            };
        };

        Block SYSTEM
        {
            definitions
            {
                u[] = log(A[]);
            };

            identities
            {
                u[] = rho * u[-1] + epsilon[];
                K[] = (1 - delta) * K[-1] + delta * A[];
                Q[] = beta * E[][Q[1]] + A[];
            };

            shocks
            {
                epsilon[] ~ N(mean = 0, sd = sigma_epsilon);
            };

            calibration
            {
                rho ~ Beta(mean = 0.95, sd = 0.04) = 0.95;
                sigma_epsilon ~ Gamma(alpha = 1, beta = 0.1) = 0.01;
                delta = 0.025;
                beta = 0.99;
                gamma = 2 * delta;
                Q[ss] = 1 / (1 - beta) -> beta;
            };
        };
    "#;

    #[test]
    fn test_classification() {
        let model = Model::from_gcn(MODEL).unwrap();
        assert_eq!(model.equations().len(), 3);

        let names: Vec<&str> = model.variables().iter().map(|v| v.base_name()).collect();
        assert_eq!(names, vec!["A", "K", "Q"]);
        assert!(model.variables()[1].assumptions().is_positive());

        assert_eq!(model.shocks().len(), 1);
        assert_eq!(model.shocks()[0].base_name(), "epsilon");

        assert_eq!(model.parameters(), ["rho", "delta", "beta"]);
    }

    #[test]
    fn test_definitions_are_substituted_with_time_shifts() {
        let model = Model::from_gcn(MODEL).unwrap();
        let first = &model.equations()[0];
        assert!(first.contains(&Symbol::var("A", -1)));
        assert!(!first.free_symbols().iter().any(|s| s.base_name() == "u"));
    }

    #[test]
    fn test_calibration() {
        let model = Model::from_gcn(MODEL).unwrap();
        let calibrated = model.calibrated_parameters();
        assert_relative_eq!(*calibrated.get_by_name("delta").unwrap(), 0.025);
        assert_relative_eq!(*calibrated.get_by_name("beta").unwrap(), 0.99);
        assert_relative_eq!(*calibrated.get_by_name("gamma").unwrap(), 0.05);
        assert_relative_eq!(*calibrated.get_by_name("rho").unwrap(), 0.95);
        assert_eq!(model.calibrating_equations().len(), 1);
        assert!(calibrated.assumptions_for("beta").is_some());
    }

    #[test]
    fn test_prior_split() {
        let model = Model::from_gcn(MODEL).unwrap();
        assert_eq!(model.shock_priors().keys().collect::<Vec<_>>(), vec!["epsilon[]"]);
        assert_eq!(model.param_priors().keys().collect::<Vec<_>>(), vec!["rho"]);
        assert_eq!(model.param_priors()["rho"].initial_value(), Some(0.95));
        assert!(model.hyper_priors().contains_key("sigma_epsilon"));
    }

    #[test]
    fn test_steady_state_equations() {
        let model = Model::from_gcn(MODEL).unwrap();
        let ss = model.steady_state_equations();
        assert_eq!(ss.len(), 4);
        for eq in &ss {
            assert!(eq
                .free_symbols()
                .iter()
                .all(|s| s.time_index().map_or(true, |t| t == TimeIndex::SteadyState)));
        }
    }

    #[test]
    fn test_unsupported_time_shift() {
        let text = "block A { identities { X[] = X[-2]; }; };";
        let err = Model::from_gcn(text).unwrap_err();
        assert!(matches!(
            err,
            GeconError::ModelError(ModelError::UnsupportedTimeShift { .. })
        ));
    }

    #[test]
    fn test_no_equations() {
        let text = "block A { calibration { alpha = 0.3; }; };";
        assert!(matches!(
            Model::from_gcn(text).unwrap_err(),
            GeconError::ModelError(ModelError::NoEquations)
        ));
    }

    #[test]
    fn test_calibration_needs_known_parameters() {
        let text = "block A { identities { X[] = alpha; }; calibration { alpha = gamma * 2; }; };";
        assert!(matches!(
            Model::from_gcn(text).unwrap_err(),
            GeconError::ModelError(ModelError::Calibration { .. })
        ));
    }

    #[test]
    fn test_steady_state_solution_from_json() {
        let json = r#"{"values": {"K_ss": 1.0, "A": 1.0, "Q_ss": 100.0}, "success": true}"#;
        let solution = SteadyStateSolution::from_json(json).unwrap();
        assert!(solution.success);
        let dict = solution.to_dictionary().unwrap();
        assert_eq!(dict.get_by_name("K"), Some(&1.0));
        assert_eq!(dict.get_by_name("Q"), Some(&100.0));
    }
}
