pub mod distributions;
pub mod error;
pub mod estimation;
pub mod expr;
pub mod model;
pub mod parser;
pub mod perturbation;
pub mod stability;
pub mod symbols;

pub use crate::distributions::{
    create_prior_distribution_dictionary, distribution_factory, preprocess_distribution_string,
    Prior,
};
pub use crate::model::{Model, SteadyStateSolution};
pub use crate::parser::preprocess_gcn;
pub use crate::perturbation::{
    compile_perturbation, matrix_from_csr_data, PerturbationOptions, PerturbationSystem,
    SystemMatrices,
};
pub use crate::stability::check_bk_condition;
pub use crate::symbols::{Symbol, SymbolDictionary, TimeAwareSymbol};
pub use error::GeconError;
pub use nalgebra::dmatrix;

pub mod prelude {
    pub mod parser {
        pub use crate::parser::{
            parse_equation, parse_expression, preprocess_gcn, Equation, GcnBlock, GcnFile,
            ParseError, Section, SectionKind, Statement,
        };
    }
    pub mod distributions {
        pub use crate::distributions::{
            create_prior_distribution_dictionary, distribution_factory,
            hierarchical_distribution_factory, preprocess_distribution_string, Distribution,
            DistributionKind, ParamValue, Prior,
        };
    }
    pub mod stability {
        pub use crate::stability::{
            blanchard_kahn, check_bk_condition, compute_eigenvalues, forward_looking_columns,
            generalized_schur, BlanchardKahn, EigenvalueRecord, Eigenvalues, GeneralizedSchur,
            StabilityOptions, C64,
        };
    }

    pub use crate::estimation::{evaluate_draws, extract_prior_dict, ParameterTransform};
    pub use crate::expr::Expr;
    pub use crate::model::{Model, SteadyStateSolution};
    pub use crate::perturbation::{
        Linearization, PerturbationOptions, PerturbationSystem, SystemMatrices,
    };
    pub use crate::symbols::{Assumption, Assumptions, Symbol, SymbolDictionary, TimeAwareSymbol};
    pub use crate::GeconError;
}
