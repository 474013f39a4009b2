use approx::assert_abs_diff_eq;

use symsim::algebra::Bindings;
use symsim::superposition::NoiseAmplitude;
use symsim::{
    AnalysisContext, CanonicalForm, Circuit, Component, Domain, NetlistParser, Quantity, RatFunc, Signal,
    SourceValue, StateSpace, Superposition, SymbolRegistry, TransientExpr,
};

const MIXED: &str = "\
.title mixed sources
V1 1 0 dc 2
R1 1 2 1k
R2 2 0 2k
I1 0 2 ac 1m 1k
E1 3 0 2 0 10
R3 3 0 1k
";

const STEPPED: &str = "\
.title stepped sources
V1 1 0 step 2
R1 1 2 1k
C1 2 0 1u
I1 0 2 step 1m
L1 2 3 1m
R2 3 0 1k
";

fn kill(circuit: &Circuit, name: &str) -> Circuit {
    circuit.map_components(|c| if c.name == name { c.killed() } else { c.clone() })
}

/// Every source replaced by the Laplace transform of its waveform seen from t = 0,
/// so the whole circuit is solved as one transient system with nothing killed.
fn as_single_transient(circuit: &Circuit) -> Circuit {
    circuit.map_components(|c| {
        c.map_source(|value| {
            SourceValue::new(
                value
                    .parts()
                    .iter()
                    .filter_map(Signal::to_laplace)
                    .map(Signal::Transient)
                    .collect(),
            )
        })
    })
}

fn quantities(circuit: &Circuit) -> Vec<(String, Superposition)> {
    let mut out = circuit.node_voltages().unwrap();
    out.extend(circuit.branch_currents().unwrap());
    out
}

fn assert_same_laplace(left: &TransientExpr, right: &TransientExpr, name: &str) {
    assert_eq!(left.delays(), right.delays(), "delays of {}", name);
    assert!((&left.undelayed() - &right.undelayed()).is_zero(), "Laplace value of {}", name);
}

#[test]
fn unkilled_solve_equals_sum_of_dc_and_ac_solves() {
    let circuit = NetlistParser::new().parse_str(MIXED).unwrap();
    let decomposed = quantities(&circuit);
    let whole = quantities(&as_single_transient(&circuit));
    assert_eq!(decomposed.len(), 3 + 6);
    assert_eq!(decomposed.len(), whole.len());

    for ((name, parts), (_, single)) in decomposed.iter().zip(whole.iter()) {
        assert!(parts.transient().is_zero(), "{} was split by domain", name);
        assert_eq!(single.domains(), vec![Domain::Transient]);
        assert_same_laplace(&parts.laplace().unwrap(), single.transient(), name);
    }

    // Each domain part matches the solve with the other source killed
    let dc_only = quantities(&kill(&circuit, "I1"));
    let ac_only = quantities(&kill(&circuit, "V1"));
    for ((name, total), ((_, dc), (_, ac))) in decomposed.iter().zip(dc_only.iter().zip(ac_only.iter())) {
        assert_eq!(total.dc(), dc.dc(), "dc part of {}", name);
        assert_eq!(total.ac(), ac.ac(), "ac part of {}", name);
        assert!(ac.dc().is_zero());
    }
}

#[test]
fn unkilled_transient_solve_equals_sum_of_killed_solves() {
    let circuit = NetlistParser::new().parse_str(STEPPED).unwrap();
    let whole = quantities(&circuit);
    let from_v = quantities(&kill(&circuit, "I1"));
    let from_i = quantities(&kill(&circuit, "V1"));

    for ((name, total), ((_, v), (_, i))) in whole.iter().zip(from_v.iter().zip(from_i.iter())) {
        let sum = v.checked_add(i).unwrap();
        assert_same_laplace(total.transient(), sum.transient(), name);
    }
    // The two sources really interact through the reactive network
    let v2 = whole.iter().find(|(name, _)| name == "2").unwrap();
    assert!(!v2.1.transient().is_zero());
}

fn noise(value: i64, registry: &mut SymbolRegistry) -> Superposition {
    let nid = registry.new_noise_id();
    Superposition::combine(
        Quantity::Voltage,
        [(Domain::Noise(nid), TransientExpr::from_laplace(RatFunc::from_int(value), false))],
    )
}

#[test]
fn independent_noise_adds_in_quadrature_but_subtracts_by_id() {
    let mut registry = SymbolRegistry::new();
    let ctx = AnalysisContext::new();
    let x = noise(3, &mut registry);
    let y = noise(4, &mut registry);

    let sum = x.checked_add(&y).unwrap();
    assert_eq!(sum.noise_amplitude(&ctx), NoiseAmplitude::Exact(RatFunc::from_int(5)));

    let back = sum.checked_sub(&x).unwrap();
    assert_eq!(back, y);
    assert_eq!(back.noise_amplitude(&ctx), NoiseAmplitude::Exact(RatFunc::from_int(4)));
}

#[test]
fn voltage_and_current_never_add() {
    let w = RatFunc::from_int(100);
    for value in [1, -3, 7] {
        let v = Superposition::from_dc(Quantity::Voltage, RatFunc::from_int(value));
        let mut i = Superposition::new(Quantity::Current);
        i.push(&Domain::Ac(w.clone()), &TransientExpr::from_laplace(RatFunc::from_int(value * 2), false));
        assert!(v.checked_add(&i).unwrap_err().is_quantity());
        assert!(i.checked_sub(&v).unwrap_err().is_quantity());
    }
}

#[test]
fn resistor_current_follows_ohms_law() {
    let mut circuit = NetlistParser::new().parse_str("V1 1 0 dc V\nR1 1 0 R\n").unwrap();
    let v = circuit.symbol("V");
    let r = circuit.symbol("R");

    let current = circuit.current("R1").unwrap();
    assert_eq!(current.quantity, Quantity::Current);
    assert_eq!(current.dc(), &v.try_div(&r).unwrap());

    let v_id = circuit.context_mut().symbol("V");
    let r_id = circuit.context_mut().symbol("R");
    let bindings = Bindings::new(circuit.context()).with(v_id, 10.0).with(r_id, 5.0);
    let numeric = current.dc().eval(&bindings).unwrap();
    assert_abs_diff_eq!(numeric.re, 2.0, epsilon = 1e-12);
    assert_abs_diff_eq!(numeric.im, 0.0, epsilon = 1e-12);
}

#[test]
fn controllable_realization_reproduces_second_order_transfer_function() {
    let mut ctx = AnalysisContext::new();
    let [b0, a0, a1, a2] = ["b0", "a0", "a1", "a2"].map(|name| RatFunc::var(ctx.symbol(name)));
    let s = RatFunc::s();
    let den = &(&(&a0 * &s) * &s) + &(&(&a1 * &s) + &a2);
    let h = b0.try_div(&den).unwrap();

    let ss = StateSpace::from_transfer_function(&h, CanonicalForm::Controllable).unwrap();
    assert_eq!(ss.order(), 2);
    assert!(ss.d[(0, 0)].is_zero());
    let back = ss.transfer_function().unwrap();
    assert!((&back[(0, 0)] - &h).is_zero());
}

#[test]
fn capacitor_starts_from_its_initial_voltage() {
    let mut circuit = Circuit::new("ic".to_string());
    let v0 = circuit.symbol("v0");
    let vs = circuit.symbol("Vs");
    let r = circuit.symbol("R");
    let c = circuit.symbol("C");
    let step = SourceValue::new(vec![Signal::Transient(TransientExpr::from_laplace(
        vs.try_div(&RatFunc::s()).unwrap(),
        true,
    ))]);
    circuit.add(Component::voltage_source("V1", "1", "0", step).unwrap()).unwrap();
    circuit.add(Component::resistor("R1", "1", "2", r).unwrap()).unwrap();
    circuit.add(Component::capacitor("C1", "2", "0", c, Some(v0.clone())).unwrap()).unwrap();

    let vc = circuit.voltage("2").unwrap();
    assert_eq!(vc.transient().initial_value().unwrap(), v0);
    assert_eq!(vc.transient().final_value().unwrap(), vs);
}

#[test]
fn parallel_voltage_sources_with_different_values_are_rejected() {
    let netlist = "V1 1 0 dc 10\nV2 1 0 dc 5\nR1 1 0 1k\n";
    let circuit = NetlistParser::new().parse_str(netlist).unwrap();
    assert!(circuit.validate().unwrap_err().is_structural());
    assert!(circuit.voltage("1").unwrap_err().is_structural());

    // Equal sources are consistent for validation but still leave the current split open.
    let equal = NetlistParser::new().parse_str("V1 1 0 dc 5\nV2 1 0 dc 5\nR1 1 0 1k\n").unwrap();
    assert!(equal.validate().is_ok());
    assert!(equal.current("V1").unwrap_err().is_structural());
}
