pub mod algebra;
pub mod analysis;
pub mod analyzer;
pub mod circuit;
pub mod cli;
pub mod component;
pub mod context;
pub mod domain;
pub mod error;
pub mod mna;
pub mod network;
pub mod parser;
pub mod solver;
pub mod statespace;
pub mod superposition;
pub mod symbol;
pub mod transform;

// Re-export commonly used types
pub use algebra::{Bindings, Expr, RatFunc};
pub use analysis::DomainSolution;
pub use analyzer::{Analyzer, AnalyzerConfig, View};
pub use circuit::{Circuit, Node, GROUND};
pub use component::{Component, ComponentKind, Signal, SourceValue};
pub use context::{AnalysisContext, DisplayOptions, Render};
pub use domain::{decompose, Domain};
pub use error::{CircuitError, Result};
pub use mna::MnaSystem;
pub use network::{OnePort, TwoPort};
pub use parser::NetlistParser;
pub use solver::{LinearSolver, SolverConfig};
pub use statespace::{CanonicalForm, StateSpace};
pub use superposition::{Quantity, Superposition};
pub use symbol::{NoiseId, SymbolId, SymbolRegistry};
pub use transform::{TimeExpr, TransientExpr};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");
