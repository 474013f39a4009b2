//! Explicit per-analysis context: the symbol registry and display options.

use serde::{Deserialize, Serialize};

use crate::symbol::{Assumptions, SymbolId, SymbolRegistry};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayOptions {
    /// Spelling of the imaginary unit.
    pub imaginary_unit: String,
    /// Render `omega` as `ω` and `pi` as `π`.
    pub unicode: bool,
}

impl Default for DisplayOptions {
    fn default() -> Self {
        DisplayOptions {
            imaginary_unit: "j".to_string(),
            unicode: false,
        }
    }
}

/// Owned by one circuit; copy it explicitly to analyse a related circuit with the
/// same symbol identities.
#[derive(Debug, Clone, Default)]
pub struct AnalysisContext {
    pub registry: SymbolRegistry,
    pub options: DisplayOptions,
}

impl AnalysisContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: DisplayOptions) -> Self {
        AnalysisContext {
            registry: SymbolRegistry::new(),
            options,
        }
    }

    /// Shorthand for a positive real symbol.
    pub fn symbol(&mut self, name: &str) -> SymbolId {
        self.registry.symbol(name)
    }

    pub fn resolve(&mut self, name: &str, assumptions: Assumptions) -> SymbolId {
        self.registry.resolve(name, assumptions)
    }

    pub(crate) fn symbol_name(&self, id: SymbolId) -> String {
        if id == SymbolId::J {
            return self.options.imaginary_unit.clone();
        }
        if self.options.unicode {
            match id {
                SymbolId::OMEGA => return "ω".to_string(),
                SymbolId::PI => return "π".to_string(),
                _ => {}
            }
        }
        self.registry.name(id).to_string()
    }

    pub fn render<T: Render + ?Sized>(&self, value: &T) -> String {
        value.render(self)
    }
}

/// Text rendering that needs symbol names.
pub trait Render {
    fn render(&self, ctx: &AnalysisContext) -> String;
}
