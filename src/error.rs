//! Error taxonomy shared by every stage of the analysis.

use thiserror::Error;

/// Top-level error type for the crate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CircuitError {
    /// A node has no path to ground through any component.
    #[error("floating node '{node}': no path to ground")]
    FloatingNode { node: String },

    /// Two ideal voltage sources fix the same node pair.
    #[error("voltage sources {first} and {second} over-constrain the same node pair")]
    VoltageSourceConflict { first: String, second: String },

    /// The MNA matrix is singular.
    #[error("indeterminate circuit: no unique solution for {unknown}")]
    Indeterminate { unknown: String },

    #[error("unknown node '{0}'")]
    UnknownNode(String),

    #[error("unknown component '{0}'")]
    UnknownComponent(String),

    #[error("component '{0}' already exists")]
    DuplicateComponent(String),

    #[error("invalid component {name}: {reason}")]
    InvalidComponent { name: String, reason: String },

    /// Arithmetic between different physical quantities.
    #[error("quantity mismatch: cannot combine {left} with {right}")]
    QuantityMismatch { left: String, right: String },

    /// Incompatible transform-domain usage.
    #[error("domain error: {0}")]
    Domain(String),

    /// Pure dc/ac superposition was requested for a circuit with initial conditions.
    #[error("component {component} has an initial condition; use the initial value problem path")]
    InitialConditions { component: String },

    /// Symbolic manipulation limit (e.g. unfactorable symbolic polynomial).
    #[error("algebraic limit: {0}")]
    Algebraic(String),

    /// Unmet precondition of a model form.
    #[error("model form: {0}")]
    ModelForm(String),

    #[error("parse error on line {line}: {message}")]
    Parse { line: usize, message: String },

    /// Numeric evaluation was impossible (missing substitution, pole hit).
    #[error("evaluation error: {0}")]
    Evaluation(String),
}

impl CircuitError {
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            CircuitError::FloatingNode { .. }
                | CircuitError::VoltageSourceConflict { .. }
                | CircuitError::Indeterminate { .. }
        )
    }

    pub fn is_quantity(&self) -> bool {
        matches!(self, CircuitError::QuantityMismatch { .. })
    }

    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        CircuitError::InvalidComponent {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CircuitError>;
