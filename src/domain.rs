//! Source classification and per-domain decomposition.
//!
//! Each independent source part belongs to exactly one domain. A circuit is
//! solved once per domain with every source part of the other domains killed
//! (voltage sources shorted, current sources opened). Circuits with initial
//! conditions take the initial value problem path instead: all deterministic
//! parts are moved into a single Laplace-domain solve whose result is only valid
//! for `t >= 0`.

use log::{debug, info};
use num_traits::Signed;
use serde::Serialize;

use crate::algebra::expr::{Gate, Oscillation, TimeAtom};
use crate::algebra::{Expr, RatFunc};
use crate::circuit::Circuit;
use crate::component::{Component, Signal, SourceValue};
use crate::context::{AnalysisContext, Render};
use crate::error::{CircuitError, Result};
use crate::symbol::{NoiseId, SymbolId};
use crate::transform::TransientExpr;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Domain {
    Dc,
    /// Sinusoidal steady state at this angular frequency.
    Ac(RatFunc),
    /// Laplace domain.
    Transient,
    Noise(NoiseId),
}

/// Short label used in reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DomainKind {
    Dc,
    Ac,
    Transient,
    Noise,
}

impl Domain {
    pub fn kind(&self) -> DomainKind {
        match self {
            Domain::Dc => DomainKind::Dc,
            Domain::Ac(_) => DomainKind::Ac,
            Domain::Transient => DomainKind::Transient,
            Domain::Noise(_) => DomainKind::Noise,
        }
    }

    /// Value that replaces `s` in immittances: `0`, `j*w`, `s` or `j*omega`.
    pub fn s_value(&self) -> RatFunc {
        match self {
            Domain::Dc => RatFunc::zero(),
            Domain::Ac(omega) => &RatFunc::j() * omega,
            Domain::Transient => RatFunc::s(),
            Domain::Noise(_) => &RatFunc::j() * &RatFunc::var(SymbolId::OMEGA),
        }
    }
}

impl Render for Domain {
    fn render(&self, ctx: &AnalysisContext) -> String {
        match self {
            Domain::Dc => "dc".to_string(),
            Domain::Ac(omega) => format!("ac({})", omega.render(ctx)),
            Domain::Transient => "s".to_string(),
            Domain::Noise(nid) => format!("noise({})", nid),
        }
    }
}

/// Splits a source expression into its domain parts.
///
/// No domain variable means dc (the bare-number convention). An expression in `s`
/// is transient. An expression in `t` is split term by term: ungated constants are
/// dc, ungated pure sinusoids are ac at their frequency, and everything else is
/// transient.
pub fn classify(expr: &Expr) -> Result<SourceValue> {
    let vars = expr.free_symbols();
    if vars.contains(&SymbolId::OMEGA) || vars.contains(&SymbolId::F) {
        return Err(CircuitError::Domain(
            "source value is a frequency-domain expression; use an ac or noise source".to_string(),
        ));
    }
    let has_s = vars.contains(&SymbolId::S);
    let has_t = vars.contains(&SymbolId::T);
    if has_s && has_t {
        return Err(CircuitError::Domain(
            "source value mixes t-domain and s-domain terms".to_string(),
        ));
    }
    if has_s {
        return Ok(SourceValue::new(vec![Signal::Transient(TransientExpr::from_s_expr(expr)?)]));
    }
    if !has_t {
        return Ok(SourceValue::dc(expr.to_ratfunc()?));
    }
    let mut value = SourceValue::default();
    let mut transient: Vec<TimeAtom> = Vec::new();
    for atom in expr.expand_time()? {
        match steady_state(&atom) {
            Some(signal) => value.push(signal),
            None => transient.push(atom),
        }
    }
    if !transient.is_empty() {
        value.push(Signal::Transient(TransientExpr::from_atoms(&transient)?));
    }
    debug!("Classified source into {:?}", value.domains());
    Ok(value)
}

/// Dc or ac signal for an ungated constant or pure sinusoid.
fn steady_state(atom: &TimeAtom) -> Option<Signal> {
    if atom.gate != Gate::Always || atom.power != 0 || !atom.rate.is_zero() {
        return None;
    }
    let negative = |w: &RatFunc| w.constant_value().map(|v| v.is_negative()).unwrap_or(false);
    match &atom.osc {
        Oscillation::None => Some(Signal::Dc(atom.coeff.clone())),
        Oscillation::Cos(w) => Some(Signal::Ac {
            phasor: atom.coeff.clone(),
            omega: if negative(w) { -w } else { w.clone() },
        }),
        Oscillation::Sin(w) => {
            // sin(wt) = Re{-j exp(jwt)}
            let phasor = &(-RatFunc::j()) * &atom.coeff;
            Some(if negative(w) {
                Signal::Ac { phasor: -phasor, omega: -w }
            } else {
                Signal::Ac {
                    phasor,
                    omega: w.clone(),
                }
            })
        }
    }
}

/// One sub-problem of the decomposition.
#[derive(Debug, Clone)]
pub struct SubCircuit {
    pub domain: Domain,
    pub circuit: Circuit,
    /// Initial conditions are stamped and the result holds for `t >= 0` only.
    pub initial_value_problem: bool,
}

/// Domains the circuit is solved in.
pub fn analysis_domains(circuit: &Circuit) -> Vec<Domain> {
    let domains = circuit.domains();
    if !circuit.has_initial_conditions() {
        return domains;
    }
    let mut out = vec![Domain::Transient];
    out.extend(domains.into_iter().filter(|d| matches!(d, Domain::Noise(_))));
    out
}

/// Splits the circuit into one sub-circuit per domain.
pub fn decompose(circuit: &Circuit) -> Result<Vec<SubCircuit>> {
    let subs = analysis_domains(circuit)
        .iter()
        .map(|d| subcircuit(circuit, d))
        .collect::<Result<Vec<_>>>()?;
    info!("Decomposed '{}' into {} domain(s)", circuit.title, subs.len());
    Ok(subs)
}

/// The sub-circuit solved for `domain`.
///
/// With initial conditions present, a dc or ac request fails: superposition of
/// steady states cannot honour them.
pub fn subcircuit(circuit: &Circuit, domain: &Domain) -> Result<SubCircuit> {
    let with_ics = circuit.components().iter().find(|c| c.initial_condition().is_some());
    match (with_ics, domain) {
        (Some(component), Domain::Dc) | (Some(component), Domain::Ac(_)) => Err(CircuitError::InitialConditions {
            component: component.name.clone(),
        }),
        (Some(_), Domain::Transient) => Ok(SubCircuit {
            domain: Domain::Transient,
            circuit: circuit.map_components(initial_value_source),
            initial_value_problem: true,
        }),
        _ => {
            let restricted = circuit.map_components(|c| {
                c.map_source(|v| v.restricted(domain))
                    .without_initial_condition()
            });
            Ok(SubCircuit {
                domain: domain.clone(),
                circuit: restricted,
                initial_value_problem: false,
            })
        }
    }
}

/// Moves every deterministic part of a source into one Laplace-domain part,
/// observed from `t = 0`.
fn initial_value_source(component: &Component) -> Component {
    if !component.is_independent_source() {
        return component.clone();
    }
    component.map_source(|value| {
        let total = value
            .parts()
            .iter()
            .filter_map(Signal::to_laplace)
            .fold(TransientExpr::zero(), |acc, part| acc.add(&part))
            .with_causal(false);
        SourceValue::new(vec![Signal::Transient(total)])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::expr::Func;

    fn t() -> Expr {
        Expr::Sym(SymbolId::T)
    }

    #[test]
    fn test_constant_is_dc() {
        let value = classify(&Expr::num(5)).unwrap();
        assert_eq!(value.domains(), vec![Domain::Dc]);
    }

    #[test]
    fn test_sinusoid_is_ac() {
        let e = Expr::Mul(vec![Expr::num(3), Expr::call(Func::Sin, Expr::Mul(vec![Expr::num(2), t()]))]);
        let value = classify(&e).unwrap();
        assert_eq!(value.domains(), vec![Domain::Ac(RatFunc::from_int(2))]);
        let expected = &RatFunc::j() * &RatFunc::from_int(-3);
        assert_eq!(value.in_domain(&Domain::Ac(RatFunc::from_int(2))).undelayed(), expected);
    }

    #[test]
    fn test_mixed_source_is_split() {
        // 5 + u(t)
        let e = Expr::Add(vec![Expr::num(5), Expr::call(Func::Heaviside, t())]);
        let value = classify(&e).unwrap();
        let mut domains = value.domains();
        domains.sort();
        assert_eq!(domains, vec![Domain::Dc, Domain::Transient]);
        assert!(value.in_domain(&Domain::Transient).is_causal());
    }

    #[test]
    fn test_s_expression_is_transient() {
        let e = Expr::Div(Box::new(Expr::num(1)), Box::new(Expr::Sym(SymbolId::S)));
        let value = classify(&e).unwrap();
        assert_eq!(value.domains(), vec![Domain::Transient]);
    }

    #[test]
    fn test_frequency_expression_rejected() {
        assert!(classify(&Expr::Sym(SymbolId::OMEGA)).is_err());
    }

    #[test]
    fn test_s_values() {
        assert!(Domain::Dc.s_value().is_zero());
        assert_eq!(Domain::Transient.s_value(), RatFunc::s());
        assert!(Domain::Ac(RatFunc::from_int(3)).s_value().has_j());
    }

    #[test]
    fn test_initial_conditions_force_ivp() {
        let mut circuit = Circuit::new("ivp".to_string());
        let c = circuit.symbol("C");
        let r = circuit.symbol("R");
        circuit
            .add(Component::voltage_source("V1", "1", "0", SourceValue::dc(RatFunc::from_int(1))).unwrap())
            .unwrap();
        circuit.add(Component::resistor("R1", "1", "2", r).unwrap()).unwrap();
        circuit
            .add(Component::capacitor("C1", "2", "0", c, Some(RatFunc::from_int(2))).unwrap())
            .unwrap();
        assert_eq!(analysis_domains(&circuit), vec![Domain::Transient]);
        assert!(matches!(
            subcircuit(&circuit, &Domain::Dc),
            Err(CircuitError::InitialConditions { .. })
        ));
        let subs = decompose(&circuit).unwrap();
        assert_eq!(subs.len(), 1);
        assert!(subs[0].initial_value_problem);
        let v1 = subs[0].circuit.component("V1").unwrap();
        let value = v1.source_value().unwrap().in_domain(&Domain::Transient);
        assert_eq!(value.undelayed(), RatFunc::s().recip().unwrap());
        assert!(!value.is_causal());
    }

    #[test]
    fn test_other_domains_killed() {
        let mut circuit = Circuit::new("two sources".to_string());
        circuit
            .add(Component::voltage_source("V1", "1", "0", SourceValue::dc(RatFunc::from_int(1))).unwrap())
            .unwrap();
        let ac = SourceValue::new(vec![Signal::Ac {
            phasor: RatFunc::one(),
            omega: RatFunc::from_int(10),
        }]);
        circuit.add(Component::current_source("I1", "1", "0", ac).unwrap()).unwrap();
        let subs = decompose(&circuit).unwrap();
        assert_eq!(subs.len(), 2);
        let dc = subs.iter().find(|s| s.domain == Domain::Dc).unwrap();
        assert!(dc.circuit.component("I1").unwrap().source_value().unwrap().is_zero());
        assert!(!dc.circuit.component("V1").unwrap().source_value().unwrap().is_zero());
    }
}
