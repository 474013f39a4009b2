//! Per-circuit symbol registry.
//!
//! A symbol name resolves to exactly one interned [`SymbolId`] per registry. The
//! assumptions recorded at first use are the ones every later expression sees;
//! redefinition needs an explicit `force`, and expressions built against the old id
//! keep referring to it (they become stale, nothing rewrites them).

use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Interned symbol handle. Only meaningful together with the registry that issued it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SymbolId(u32);

impl SymbolId {
    /// Imaginary unit, reduced by `j^2 = -1` in every polynomial.
    pub const J: SymbolId = SymbolId(0);
    /// Laplace variable.
    pub const S: SymbolId = SymbolId(1);
    /// Time.
    pub const T: SymbolId = SymbolId(2);
    /// Angular frequency.
    pub const OMEGA: SymbolId = SymbolId(3);
    /// Frequency in hertz.
    pub const F: SymbolId = SymbolId(4);
    pub const PI: SymbolId = SymbolId(5);

    const RESERVED: u32 = 6;

    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub fn is_reserved(self) -> bool {
        self.0 < Self::RESERVED
    }

    /// `s`, `t`, `omega` or `f`.
    pub fn is_domain_variable(self) -> bool {
        matches!(self, SymbolId::S | SymbolId::T | SymbolId::OMEGA | SymbolId::F)
    }
}

/// Identifier of one independent noise source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NoiseId(u32);

impl NoiseId {
    pub fn index(self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for NoiseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Algebraic assumptions fixed when a symbol is first defined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assumptions {
    pub real: bool,
    pub positive: bool,
    pub integer: bool,
    pub nonzero: bool,
}

impl Default for Assumptions {
    /// Component values are positive reals unless stated otherwise.
    fn default() -> Self {
        Assumptions {
            real: true,
            positive: true,
            integer: false,
            nonzero: true,
        }
    }
}

impl Assumptions {
    pub fn positive() -> Self {
        Self::default()
    }

    /// Real, sign unknown.
    pub fn real() -> Self {
        Assumptions {
            real: true,
            positive: false,
            integer: false,
            nonzero: false,
        }
    }

    pub fn complex() -> Self {
        Assumptions {
            real: false,
            positive: false,
            integer: false,
            nonzero: false,
        }
    }

    /// Applies the `real=False` / `positive=False` convention: dropping realness also
    /// drops positivity.
    pub fn normalized(mut self) -> Self {
        if !self.real {
            self.positive = false;
        }
        if self.positive {
            self.nonzero = true;
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum SymbolKind {
    ImaginaryUnit,
    DomainVariable,
    /// Named numeric constant such as `pi`.
    Constant(f64),
    User,
    /// Placeholder for a transcendental quantity with no rational s-domain form
    /// (transmission-line hyperbolics).
    Opaque,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub assumptions: Assumptions,
    pub kind: SymbolKind,
}

/// Arena of symbols plus the name index into it.
#[derive(Debug, Clone)]
pub struct SymbolRegistry {
    symbols: Vec<Symbol>,
    by_name: HashMap<String, SymbolId>,
    next_noise: u32,
}

impl Default for SymbolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SymbolRegistry {
    pub fn new() -> Self {
        let mut registry = SymbolRegistry {
            symbols: Vec::new(),
            by_name: HashMap::new(),
            next_noise: 1,
        };
        let reserved = [
            ("j", Assumptions::complex(), SymbolKind::ImaginaryUnit),
            ("s", Assumptions::complex(), SymbolKind::DomainVariable),
            ("t", Assumptions::real(), SymbolKind::DomainVariable),
            ("omega", Assumptions::real(), SymbolKind::DomainVariable),
            ("f", Assumptions::real(), SymbolKind::DomainVariable),
            ("pi", Assumptions::positive(), SymbolKind::Constant(std::f64::consts::PI)),
        ];
        for (name, assumptions, kind) in reserved {
            registry.push(name, assumptions, kind);
        }
        registry
    }

    fn push(&mut self, name: &str, assumptions: Assumptions, kind: SymbolKind) -> SymbolId {
        let id = SymbolId(self.symbols.len() as u32);
        self.symbols.push(Symbol {
            name: name.to_string(),
            assumptions: assumptions.normalized(),
            kind,
        });
        self.by_name.insert(name.to_string(), id);
        id
    }

    /// Resolves `name`, creating it with `assumptions` on first use. Later calls with
    /// different assumptions get the original symbol.
    pub fn resolve(&mut self, name: &str, assumptions: Assumptions) -> SymbolId {
        self.define(name, assumptions, false)
    }

    /// Resolves with the default (positive real) assumptions.
    pub fn symbol(&mut self, name: &str) -> SymbolId {
        self.define(name, Assumptions::default(), false)
    }

    /// Like [`resolve`](Self::resolve) but `force` replaces an existing definition.
    /// The replaced id stays in the arena so stale expressions still render.
    pub fn define(&mut self, name: &str, assumptions: Assumptions, force: bool) -> SymbolId {
        if let Some(&id) = self.by_name.get(name) {
            if !force {
                return id;
            }
            if id.is_reserved() {
                warn!("Refusing to redefine reserved symbol '{}'", name);
                return id;
            }
            if self.symbols[id.index()].assumptions == assumptions.normalized() {
                return id;
            }
            debug!("Redefining symbol '{}' with {:?}", name, assumptions);
            return self.push(name, assumptions, SymbolKind::User);
        }
        self.push(name, assumptions, SymbolKind::User)
    }

    /// Registers an opaque placeholder symbol.
    pub fn opaque(&mut self, name: &str) -> SymbolId {
        if let Some(&id) = self.by_name.get(name) {
            return id;
        }
        self.push(name, Assumptions::complex(), SymbolKind::Opaque)
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.by_name.get(name).copied()
    }

    pub fn get(&self, id: SymbolId) -> Option<&Symbol> {
        self.symbols.get(id.index())
    }

    pub fn name(&self, id: SymbolId) -> &str {
        self.get(id).map(|sym| sym.name.as_str()).unwrap_or("?")
    }

    pub fn assumptions(&self, id: SymbolId) -> Assumptions {
        self.get(id)
            .map(|sym| sym.assumptions)
            .unwrap_or_else(Assumptions::complex)
    }

    pub fn kind(&self, id: SymbolId) -> SymbolKind {
        self.get(id).map(|sym| sym.kind).unwrap_or(SymbolKind::Opaque)
    }

    pub fn is_real(&self, id: SymbolId) -> bool {
        self.assumptions(id).real
    }

    pub fn is_positive(&self, id: SymbolId) -> bool {
        self.assumptions(id).positive
    }

    /// Numeric value of a named constant (`pi`).
    pub fn constant_value(&self, id: SymbolId) -> Option<f64> {
        match self.kind(id) {
            SymbolKind::Constant(value) => Some(value),
            _ => None,
        }
    }

    pub fn new_noise_id(&mut self) -> NoiseId {
        let nid = NoiseId(self.next_noise);
        self.next_noise += 1;
        nid
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_definition_wins() {
        let mut registry = SymbolRegistry::new();
        let r = registry.resolve("R", Assumptions::positive());
        let again = registry.resolve("R", Assumptions::complex());
        assert_eq!(r, again);
        assert!(registry.is_positive(again));
    }

    #[test]
    fn test_force_redefinition_creates_new_id() {
        let mut registry = SymbolRegistry::new();
        let old = registry.symbol("x");
        let new = registry.define("x", Assumptions::real(), true);
        assert_ne!(old, new);
        assert_eq!(registry.lookup("x"), Some(new));
        assert_eq!(registry.name(old), "x");
        assert!(!registry.is_positive(new));
    }

    #[test]
    fn test_reserved_symbols() {
        let mut registry = SymbolRegistry::new();
        assert_eq!(registry.symbol("s"), SymbolId::S);
        assert_eq!(registry.define("t", Assumptions::complex(), true), SymbolId::T);
        assert_eq!(registry.constant_value(SymbolId::PI), Some(std::f64::consts::PI));
        assert!(SymbolId::OMEGA.is_domain_variable());
        assert!(!SymbolId::PI.is_domain_variable());
    }

    #[test]
    fn test_complex_drops_positive() {
        let mut registry = SymbolRegistry::new();
        let z = registry.resolve(
            "z",
            Assumptions {
                real: false,
                positive: true,
                integer: false,
                nonzero: false,
            },
        );
        assert!(!registry.is_positive(z));
    }

    #[test]
    fn test_noise_ids_unique() {
        let mut registry = SymbolRegistry::new();
        let a = registry.new_noise_id();
        let b = registry.new_noise_id();
        assert_ne!(a, b);
    }
}
