//! Netlist elements and the signals carried by independent sources.

use serde::Serialize;

use crate::algebra::RatFunc;
use crate::circuit::{is_ground_name, GROUND};
use crate::context::{AnalysisContext, Render};
use crate::domain::Domain;
use crate::error::{CircuitError, Result};
use crate::symbol::{NoiseId, SymbolId};
use crate::transform::TransientExpr;

/// One domain-tagged part of a source value.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    Dc(RatFunc),
    /// `Re{phasor * exp(j*omega*t)}`.
    Ac { phasor: RatFunc, omega: RatFunc },
    /// Laplace-domain value, possibly with delays.
    Transient(TransientExpr),
    /// Amplitude spectral density of one independent noise source.
    Noise { asd: RatFunc, nid: NoiseId },
}

impl Signal {
    pub fn domain(&self) -> Domain {
        match self {
            Signal::Dc(_) => Domain::Dc,
            Signal::Ac { omega, .. } => Domain::Ac(omega.clone()),
            Signal::Transient(_) => Domain::Transient,
            Signal::Noise { nid, .. } => Domain::Noise(*nid),
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Signal::Dc(v) => v.is_zero(),
            Signal::Ac { phasor, .. } => phasor.is_zero(),
            Signal::Transient(v) => v.is_zero(),
            Signal::Noise { asd, .. } => asd.is_zero(),
        }
    }

    /// The value stamped into the system of this signal's own domain.
    pub fn excitation(&self) -> TransientExpr {
        match self {
            Signal::Dc(v) => TransientExpr::from_laplace(v.clone(), false),
            Signal::Ac { phasor, .. } => TransientExpr::from_laplace(phasor.clone(), false),
            Signal::Transient(v) => v.clone(),
            Signal::Noise { asd, .. } => TransientExpr::from_laplace(asd.clone(), false),
        }
    }

    /// Laplace transform of the signal observed from `t = 0`, used when initial
    /// conditions force a single transient solve. `None` for noise.
    pub fn to_laplace(&self) -> Option<TransientExpr> {
        let s = RatFunc::s();
        match self {
            Signal::Dc(v) => Some(TransientExpr::from_laplace(v.checked_div(&s)?, false)),
            Signal::Ac { phasor, omega } => {
                // L{Re(P) cos(wt) - Im(P) sin(wt)} = (Re(P) s - Im(P) w) / (s^2 + w^2)
                let num = &(&phasor.re() * &s) - &(&phasor.im() * omega);
                let den = &(&s * &s) + &(omega * omega);
                Some(TransientExpr::from_laplace(num.checked_div(&den)?, false))
            }
            Signal::Transient(v) => Some(v.clone()),
            Signal::Noise { .. } => None,
        }
    }

    pub fn substitute(&self, id: SymbolId, value: &RatFunc) -> Signal {
        match self {
            Signal::Dc(v) => Signal::Dc(v.substitute(id, value)),
            Signal::Ac { phasor, omega } => Signal::Ac {
                phasor: phasor.substitute(id, value),
                omega: omega.substitute(id, value),
            },
            Signal::Transient(v) => Signal::Transient(v.substitute(id, value)),
            Signal::Noise { asd, nid } => Signal::Noise {
                asd: asd.substitute(id, value),
                nid: *nid,
            },
        }
    }
}

impl Render for Signal {
    fn render(&self, ctx: &AnalysisContext) -> String {
        match self {
            Signal::Dc(v) => format!("dc {}", v.render(ctx)),
            Signal::Ac { phasor, omega } => format!("ac {} @ {}", phasor.render(ctx), omega.render(ctx)),
            Signal::Transient(v) => format!("s {}", v.render(ctx)),
            Signal::Noise { asd, nid } => format!("noise {} [{}]", asd.render(ctx), nid),
        }
    }
}

/// Sum of domain-tagged parts. A value such as `dc + transient` is kept as two
/// parts that act like separate sources on the same node pair.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SourceValue {
    parts: Vec<Signal>,
}

impl SourceValue {
    pub fn new(parts: Vec<Signal>) -> Self {
        let mut value = SourceValue::default();
        for part in parts {
            value.push(part);
        }
        value
    }

    pub fn dc(value: RatFunc) -> Self {
        SourceValue::new(vec![Signal::Dc(value)])
    }

    /// Adds a part, merging it with an existing part of the same domain.
    pub fn push(&mut self, part: Signal) {
        if part.is_zero() {
            return;
        }
        let domain = part.domain();
        match self.parts.iter().position(|p| p.domain() == domain) {
            Some(i) => {
                let combined = merge_parts(&self.parts[i], &part);
                self.parts[i] = combined;
            }
            None => self.parts.push(part),
        }
        self.parts.retain(|p| !p.is_zero());
    }

    pub fn parts(&self) -> &[Signal] {
        &self.parts
    }

    pub fn is_zero(&self) -> bool {
        self.parts.is_empty()
    }

    pub fn domains(&self) -> Vec<Domain> {
        self.parts.iter().map(Signal::domain).collect()
    }

    /// Excitation in `domain`; zero (killed) when the source has no such part.
    pub fn in_domain(&self, domain: &Domain) -> TransientExpr {
        self.parts
            .iter()
            .filter(|p| &p.domain() == domain)
            .fold(TransientExpr::zero(), |acc, p| acc.add(&p.excitation()))
    }

    /// Keeps only the parts in `domain`.
    pub fn restricted(&self, domain: &Domain) -> SourceValue {
        SourceValue {
            parts: self.parts.iter().filter(|p| &p.domain() == domain).cloned().collect(),
        }
    }

    pub fn substitute(&self, id: SymbolId, value: &RatFunc) -> SourceValue {
        SourceValue::new(self.parts.iter().map(|p| p.substitute(id, value)).collect())
    }

    /// Same source seen with its terminals swapped.
    pub fn negated(&self) -> SourceValue {
        let minus = RatFunc::from_int(-1);
        let parts = self
            .parts
            .iter()
            .map(|p| match p {
                Signal::Dc(v) => Signal::Dc(-v),
                Signal::Ac { phasor, omega } => Signal::Ac {
                    phasor: -phasor,
                    omega: omega.clone(),
                },
                Signal::Transient(v) => Signal::Transient(v.scale(&minus)),
                Signal::Noise { asd, nid } => Signal::Noise { asd: -asd, nid: *nid },
            })
            .collect();
        SourceValue { parts }
    }
}

impl Render for SourceValue {
    fn render(&self, ctx: &AnalysisContext) -> String {
        if self.parts.is_empty() {
            return "0".to_string();
        }
        self.parts.iter().map(|p| p.render(ctx)).collect::<Vec<_>>().join(" + ")
    }
}

fn merge_parts(a: &Signal, b: &Signal) -> Signal {
    match (a, b) {
        (Signal::Dc(x), Signal::Dc(y)) => Signal::Dc(x + y),
        (Signal::Ac { phasor: x, omega }, Signal::Ac { phasor: y, .. }) => Signal::Ac {
            phasor: x + y,
            omega: omega.clone(),
        },
        (Signal::Transient(x), Signal::Transient(y)) => Signal::Transient(x.add(y)),
        (Signal::Noise { asd: x, nid }, Signal::Noise { asd: y, .. }) => Signal::Noise {
            asd: x + y,
            nid: *nid,
        },
        _ => a.clone(),
    }
}

/// Element kind together with its constitutive parameters.
#[derive(Debug, Clone, PartialEq)]
pub enum ComponentKind {
    Resistor(RatFunc),
    Conductor(RatFunc),
    /// Generic impedance, may depend on `s`.
    Impedance(RatFunc),
    /// Generic admittance, may depend on `s`.
    Admittance(RatFunc),
    Capacitor { value: RatFunc, v0: Option<RatFunc> },
    Inductor { value: RatFunc, i0: Option<RatFunc> },
    VoltageSource(SourceValue),
    /// Delivers its current into `n+`.
    CurrentSource(SourceValue),
    /// `E n+ n- nc+ nc- A`
    Vcvs { gain: RatFunc },
    /// `G n+ n- nc+ nc- g`, current flows from `n+` through the source to `n-`.
    Vccs { gain: RatFunc },
    /// `F n+ n- Vctrl k`
    Cccs { control: String, gain: RatFunc },
    /// `H n+ n- Vctrl r`
    Ccvs { control: String, gain: RatFunc },
    /// Ideal transformer `p+ p- s+ s-`, `V_s = ratio * V_p`.
    Transformer { ratio: RatFunc },
    /// Lossless line `in+ in- out+ out-` in ABCD form.
    TransmissionLine { z0: RatFunc, cosh: SymbolId, sinh: SymbolId },
    /// Zero-impedance connection; its nodes are merged.
    Wire,
    Open,
    Port,
}

impl ComponentKind {
    /// Netlist prefix.
    pub fn prefix(&self) -> &'static str {
        match self {
            ComponentKind::Resistor(_) => "R",
            ComponentKind::Conductor(_) | ComponentKind::Vccs { .. } => "G",
            ComponentKind::Impedance(_) => "Z",
            ComponentKind::Admittance(_) => "Y",
            ComponentKind::Capacitor { .. } => "C",
            ComponentKind::Inductor { .. } => "L",
            ComponentKind::VoltageSource(_) => "V",
            ComponentKind::CurrentSource(_) => "I",
            ComponentKind::Vcvs { .. } => "E",
            ComponentKind::Cccs { .. } => "F",
            ComponentKind::Ccvs { .. } => "H",
            ComponentKind::Transformer { .. } => "TF",
            ComponentKind::TransmissionLine { .. } => "TL",
            ComponentKind::Wire => "W",
            ComponentKind::Open => "O",
            ComponentKind::Port => "P",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            ComponentKind::Resistor(_) => "resistor",
            ComponentKind::Conductor(_) => "conductor",
            ComponentKind::Impedance(_) => "impedance",
            ComponentKind::Admittance(_) => "admittance",
            ComponentKind::Capacitor { .. } => "capacitor",
            ComponentKind::Inductor { .. } => "inductor",
            ComponentKind::VoltageSource(_) => "voltage source",
            ComponentKind::CurrentSource(_) => "current source",
            ComponentKind::Vcvs { .. } => "voltage-controlled voltage source",
            ComponentKind::Vccs { .. } => "voltage-controlled current source",
            ComponentKind::Cccs { .. } => "current-controlled current source",
            ComponentKind::Ccvs { .. } => "current-controlled voltage source",
            ComponentKind::Transformer { .. } => "ideal transformer",
            ComponentKind::TransmissionLine { .. } => "transmission line",
            ComponentKind::Wire => "wire",
            ComponentKind::Open => "open circuit",
            ComponentKind::Port => "port",
        }
    }

    pub fn terminal_count(&self) -> usize {
        match self {
            ComponentKind::Vcvs { .. }
            | ComponentKind::Vccs { .. }
            | ComponentKind::Transformer { .. }
            | ComponentKind::TransmissionLine { .. } => 4,
            _ => 2,
        }
    }

    /// Number of auxiliary current unknowns in the MNA system.
    pub fn branch_unknowns(&self) -> usize {
        match self {
            ComponentKind::VoltageSource(_)
            | ComponentKind::Inductor { .. }
            | ComponentKind::Vcvs { .. }
            | ComponentKind::Vccs { .. }
            | ComponentKind::Cccs { .. }
            | ComponentKind::Ccvs { .. } => 1,
            ComponentKind::Transformer { .. } | ComponentKind::TransmissionLine { .. } => 2,
            _ => 0,
        }
    }
}

/// Orientation-agnostic description for external layout tools.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentInfo {
    pub name: String,
    pub kind: String,
    pub nodes: Vec<String>,
    pub value: String,
}

/// Circuit element
#[derive(Debug, Clone, PartialEq)]
pub struct Component {
    pub name: String,
    pub kind: ComponentKind,
    pub nodes: Vec<String>,
}

const DOMAIN_VARIABLES: [SymbolId; 4] = [SymbolId::S, SymbolId::T, SymbolId::OMEGA, SymbolId::F];

fn domain_free(name: &str, what: &str, value: &RatFunc, allow_s: bool) -> Result<()> {
    for var in DOMAIN_VARIABLES {
        if var == SymbolId::S && allow_s {
            continue;
        }
        if value.contains(var) {
            return Err(CircuitError::invalid(
                name,
                format!("{} depends on a transform-domain variable", what),
            ));
        }
    }
    Ok(())
}

impl Component {
    /// Builds and validates a component.
    pub fn new(name: &str, kind: ComponentKind, nodes: Vec<String>) -> Result<Self> {
        let nodes = nodes
            .into_iter()
            .map(|n| if is_ground_name(&n) { GROUND.to_string() } else { n })
            .collect();
        let component = Component {
            name: name.to_string(),
            kind,
            nodes,
        };
        component.validate()?;
        Ok(component)
    }

    pub fn resistor(name: &str, n1: &str, n2: &str, value: RatFunc) -> Result<Self> {
        Component::new(name, ComponentKind::Resistor(value), two(n1, n2))
    }

    pub fn conductor(name: &str, n1: &str, n2: &str, value: RatFunc) -> Result<Self> {
        Component::new(name, ComponentKind::Conductor(value), two(n1, n2))
    }

    pub fn impedance(name: &str, n1: &str, n2: &str, value: RatFunc) -> Result<Self> {
        Component::new(name, ComponentKind::Impedance(value), two(n1, n2))
    }

    pub fn admittance(name: &str, n1: &str, n2: &str, value: RatFunc) -> Result<Self> {
        Component::new(name, ComponentKind::Admittance(value), two(n1, n2))
    }

    pub fn capacitor(name: &str, n1: &str, n2: &str, value: RatFunc, v0: Option<RatFunc>) -> Result<Self> {
        Component::new(name, ComponentKind::Capacitor { value, v0 }, two(n1, n2))
    }

    pub fn inductor(name: &str, n1: &str, n2: &str, value: RatFunc, i0: Option<RatFunc>) -> Result<Self> {
        Component::new(name, ComponentKind::Inductor { value, i0 }, two(n1, n2))
    }

    pub fn voltage_source(name: &str, n1: &str, n2: &str, value: SourceValue) -> Result<Self> {
        Component::new(name, ComponentKind::VoltageSource(value), two(n1, n2))
    }

    pub fn current_source(name: &str, n1: &str, n2: &str, value: SourceValue) -> Result<Self> {
        Component::new(name, ComponentKind::CurrentSource(value), two(n1, n2))
    }

    pub fn wire(name: &str, n1: &str, n2: &str) -> Result<Self> {
        Component::new(name, ComponentKind::Wire, two(n1, n2))
    }

    pub fn validate(&self) -> Result<()> {
        let expected = self.kind.terminal_count();
        if self.nodes.len() != expected {
            return Err(CircuitError::invalid(
                &self.name,
                format!("expects {} nodes, got {}", expected, self.nodes.len()),
            ));
        }
        let name = self.name.as_str();
        match &self.kind {
            ComponentKind::Resistor(v) | ComponentKind::Conductor(v) => {
                domain_free(name, "value", v, false)?;
                if v.is_zero() {
                    return Err(CircuitError::invalid(name, "zero value; use a wire or an open circuit"));
                }
            }
            ComponentKind::Impedance(v) | ComponentKind::Admittance(v) => {
                domain_free(name, "immittance", v, true)?;
                if v.is_zero() {
                    return Err(CircuitError::invalid(name, "zero immittance; use a wire or an open circuit"));
                }
            }
            ComponentKind::Capacitor { value, v0: ic } | ComponentKind::Inductor { value, i0: ic } => {
                domain_free(name, "value", value, false)?;
                if value.is_zero() {
                    return Err(CircuitError::invalid(name, "zero value"));
                }
                if let Some(ic) = ic {
                    domain_free(name, "initial condition", ic, false)?;
                }
            }
            ComponentKind::Vcvs { gain }
            | ComponentKind::Vccs { gain }
            | ComponentKind::Cccs { gain, .. }
            | ComponentKind::Ccvs { gain, .. } => domain_free(name, "gain", gain, true)?,
            ComponentKind::Transformer { ratio } => {
                domain_free(name, "turns ratio", ratio, false)?;
                if ratio.is_zero() {
                    return Err(CircuitError::invalid(name, "zero turns ratio"));
                }
            }
            ComponentKind::TransmissionLine { z0, .. } => domain_free(name, "characteristic impedance", z0, false)?,
            _ => {}
        }
        if let ComponentKind::Cccs { control, .. } | ComponentKind::Ccvs { control, .. } = &self.kind {
            if control == &self.name {
                return Err(CircuitError::invalid(name, "controls itself"));
            }
        }
        Ok(())
    }

    pub fn is_independent_source(&self) -> bool {
        matches!(self.kind, ComponentKind::VoltageSource(_) | ComponentKind::CurrentSource(_))
    }

    pub fn source_value(&self) -> Option<&SourceValue> {
        match &self.kind {
            ComponentKind::VoltageSource(v) | ComponentKind::CurrentSource(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_reactive(&self) -> bool {
        matches!(self.kind, ComponentKind::Capacitor { .. } | ComponentKind::Inductor { .. })
    }

    /// Non-zero initial capacitor voltage or inductor current.
    pub fn initial_condition(&self) -> Option<&RatFunc> {
        match &self.kind {
            ComponentKind::Capacitor { v0: Some(ic), .. } | ComponentKind::Inductor { i0: Some(ic), .. }
                if !ic.is_zero() =>
            {
                Some(ic)
            }
            _ => None,
        }
    }

    /// Admittance of a two-terminal element with `s` replaced by `s_value`.
    /// `None` for elements that need a branch current or carry no current.
    pub fn admittance_at(&self, s_value: &RatFunc) -> Result<Option<RatFunc>> {
        let s = SymbolId::S;
        let value = match &self.kind {
            ComponentKind::Resistor(r) => RatFunc::one().try_div(r)?,
            ComponentKind::Conductor(g) => g.clone(),
            ComponentKind::Capacitor { value, .. } => value * s_value,
            ComponentKind::Admittance(y) => y.try_substitute(s, s_value).map_err(|_| self.pole_error())?,
            ComponentKind::Impedance(z) => {
                let y = RatFunc::one().try_div(z)?;
                y.try_substitute(s, s_value).map_err(|_| self.pole_error())?
            }
            _ => return Ok(None),
        };
        Ok(Some(value))
    }

    fn pole_error(&self) -> CircuitError {
        CircuitError::Domain(format!("admittance of {} has a pole at the analysis frequency", self.name))
    }

    /// Copy with a symbol replaced everywhere in the element's values.
    pub fn substitute(&self, id: SymbolId, value: &RatFunc) -> Component {
        let sub = |v: &RatFunc| v.substitute(id, value);
        let kind = match &self.kind {
            ComponentKind::Resistor(v) => ComponentKind::Resistor(sub(v)),
            ComponentKind::Conductor(v) => ComponentKind::Conductor(sub(v)),
            ComponentKind::Impedance(v) => ComponentKind::Impedance(sub(v)),
            ComponentKind::Admittance(v) => ComponentKind::Admittance(sub(v)),
            ComponentKind::Capacitor { value: c, v0 } => ComponentKind::Capacitor {
                value: sub(c),
                v0: v0.as_ref().map(sub),
            },
            ComponentKind::Inductor { value: l, i0 } => ComponentKind::Inductor {
                value: sub(l),
                i0: i0.as_ref().map(sub),
            },
            ComponentKind::VoltageSource(v) => ComponentKind::VoltageSource(v.substitute(id, value)),
            ComponentKind::CurrentSource(v) => ComponentKind::CurrentSource(v.substitute(id, value)),
            ComponentKind::Vcvs { gain } => ComponentKind::Vcvs { gain: sub(gain) },
            ComponentKind::Vccs { gain } => ComponentKind::Vccs { gain: sub(gain) },
            ComponentKind::Cccs { control, gain } => ComponentKind::Cccs {
                control: control.clone(),
                gain: sub(gain),
            },
            ComponentKind::Ccvs { control, gain } => ComponentKind::Ccvs {
                control: control.clone(),
                gain: sub(gain),
            },
            ComponentKind::Transformer { ratio } => ComponentKind::Transformer { ratio: sub(ratio) },
            ComponentKind::TransmissionLine { z0, cosh, sinh } => ComponentKind::TransmissionLine {
                z0: sub(z0),
                cosh: *cosh,
                sinh: *sinh,
            },
            other => other.clone(),
        };
        Component {
            name: self.name.clone(),
            kind,
            nodes: self.nodes.clone(),
        }
    }

    /// Copy with the source value mapped by `f`; other elements are unchanged.
    pub fn map_source(&self, f: impl Fn(&SourceValue) -> SourceValue) -> Component {
        let kind = match &self.kind {
            ComponentKind::VoltageSource(v) => ComponentKind::VoltageSource(f(v)),
            ComponentKind::CurrentSource(v) => ComponentKind::CurrentSource(f(v)),
            other => other.clone(),
        };
        Component {
            name: self.name.clone(),
            kind,
            nodes: self.nodes.clone(),
        }
    }

    /// Short for a voltage source, open for a current source.
    pub fn killed(&self) -> Component {
        self.map_source(|_| SourceValue::default())
    }

    /// Copy with the initial condition removed.
    pub fn without_initial_condition(&self) -> Component {
        let kind = match &self.kind {
            ComponentKind::Capacitor { value, .. } => ComponentKind::Capacitor {
                value: value.clone(),
                v0: None,
            },
            ComponentKind::Inductor { value, .. } => ComponentKind::Inductor {
                value: value.clone(),
                i0: None,
            },
            other => other.clone(),
        };
        Component {
            name: self.name.clone(),
            kind,
            nodes: self.nodes.clone(),
        }
    }

    pub fn info(&self, ctx: &AnalysisContext) -> ComponentInfo {
        ComponentInfo {
            name: self.name.clone(),
            kind: self.kind.description().to_string(),
            nodes: self.nodes.clone(),
            value: self.value_text(ctx),
        }
    }

    pub fn value_text(&self, ctx: &AnalysisContext) -> String {
        match &self.kind {
            ComponentKind::Resistor(v)
            | ComponentKind::Conductor(v)
            | ComponentKind::Impedance(v)
            | ComponentKind::Admittance(v) => v.render(ctx),
            ComponentKind::Capacitor { value, v0: ic } | ComponentKind::Inductor { value, i0: ic } => match ic {
                Some(ic) => format!("{} ({})", value.render(ctx), ic.render(ctx)),
                None => value.render(ctx),
            },
            ComponentKind::VoltageSource(v) | ComponentKind::CurrentSource(v) => v.render(ctx),
            ComponentKind::Vcvs { gain } | ComponentKind::Vccs { gain } => gain.render(ctx),
            ComponentKind::Cccs { control, gain } | ComponentKind::Ccvs { control, gain } => {
                format!("{} * I({})", gain.render(ctx), control)
            }
            ComponentKind::Transformer { ratio } => ratio.render(ctx),
            ComponentKind::TransmissionLine { z0, .. } => z0.render(ctx),
            ComponentKind::Wire | ComponentKind::Open | ComponentKind::Port => String::new(),
        }
    }
}

fn two(n1: &str, n2: &str) -> Vec<String> {
    vec![n1.to_string(), n2.to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx_with(names: &[&str]) -> (AnalysisContext, Vec<RatFunc>) {
        let mut ctx = AnalysisContext::new();
        let vars = names.iter().map(|n| RatFunc::var(ctx.symbol(n))).collect();
        (ctx, vars)
    }

    #[test]
    fn test_resistor_admittance() {
        let (_, v) = ctx_with(&["R"]);
        let r = Component::resistor("R1", "1", "0", v[0].clone()).unwrap();
        let y = r.admittance_at(&RatFunc::s()).unwrap().unwrap();
        assert_eq!(y, v[0].recip().unwrap());
    }

    #[test]
    fn test_capacitor_open_at_dc() {
        let (_, v) = ctx_with(&["C"]);
        let c = Component::capacitor("C1", "1", "0", v[0].clone(), None).unwrap();
        assert!(c.admittance_at(&RatFunc::zero()).unwrap().unwrap().is_zero());
        assert_eq!(c.admittance_at(&RatFunc::s()).unwrap().unwrap(), &v[0] * &RatFunc::s());
    }

    #[test]
    fn test_time_dependent_resistance_rejected() {
        let r = Component::resistor("R1", "1", "0", RatFunc::var(SymbolId::T));
        assert!(matches!(r, Err(CircuitError::InvalidComponent { .. })));
        let z = Component::impedance("Z1", "1", "0", RatFunc::s());
        assert!(z.is_ok());
    }

    #[test]
    fn test_wrong_terminal_count() {
        let e = Component::new("E1", ComponentKind::Vcvs { gain: RatFunc::from_int(2) }, two("1", "0"));
        assert!(e.is_err());
    }

    #[test]
    fn test_source_parts_merge_by_domain() {
        let mut value = SourceValue::dc(RatFunc::from_int(2));
        value.push(Signal::Dc(RatFunc::from_int(3)));
        value.push(Signal::Transient(TransientExpr::from_laplace(RatFunc::s().recip().unwrap(), true)));
        assert_eq!(value.parts().len(), 2);
        assert_eq!(value.in_domain(&Domain::Dc).undelayed(), RatFunc::from_int(5));
        assert!(value.in_domain(&Domain::Noise(crate::symbol::SymbolRegistry::new().new_noise_id())).is_zero());
        assert_eq!(value.restricted(&Domain::Transient).parts().len(), 1);
    }

    #[test]
    fn test_killed_source_is_zero() {
        let v = Component::voltage_source("V1", "1", "0", SourceValue::dc(RatFunc::from_int(5))).unwrap();
        assert!(v.killed().source_value().unwrap().is_zero());
    }

    #[test]
    fn test_ac_laplace_form() {
        let (_, v) = ctx_with(&["w"]);
        let signal = Signal::Ac {
            phasor: RatFunc::one(),
            omega: v[0].clone(),
        };
        let s = RatFunc::s();
        let expected = s.checked_div(&(&(&s * &s) + &(&v[0] * &v[0]))).unwrap();
        assert_eq!(signal.to_laplace().unwrap().undelayed(), expected);
    }
}
