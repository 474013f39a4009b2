//! Per-domain solves and the circuit-level queries built on them.

use log::{debug, info};
use nalgebra::DMatrix;
use rayon::prelude::*;
use std::sync::Arc;

use crate::algebra::RatFunc;
use crate::circuit::Circuit;
use crate::component::{Component, ComponentKind, Signal, SourceValue};
use crate::domain::{analysis_domains, subcircuit, Domain, SubCircuit};
use crate::error::{CircuitError, Result};
use crate::mna::{Column, LinearForm, MnaSystem};
use crate::network::TwoPort;
use crate::solver::{LinearSolver, SolverStats};
use crate::superposition::{Quantity, Superposition};
use crate::transform::TransientExpr;

/// Solved MNA system of one domain.
#[derive(Debug)]
pub struct DomainSolution {
    pub domain: Domain,
    /// Initial conditions were stamped; values hold for `t >= 0` only.
    pub initial_value_problem: bool,
    /// The sub-circuit that was solved, with other domains' sources killed.
    pub circuit: Circuit,
    pub system: MnaSystem,
    /// One row per unknown, one column per excitation delay.
    pub values: DMatrix<RatFunc>,
    pub stats: SolverStats,
}

impl DomainSolution {
    pub fn solve(sub: SubCircuit, solver: &LinearSolver) -> Result<Self> {
        let system = MnaSystem::new(&sub.circuit, &sub.domain)?;
        if solver.config().check_structure {
            system.check_structure()?;
        }
        let (values, stats) = solver.solve(&system.matrix, &system.rhs, &system.labels())?;
        debug!(
            "Domain {:?}: {} unknowns solved in {:.3} ms",
            sub.domain.kind(),
            system.size(),
            stats.solve_time * 1000.0
        );
        Ok(DomainSolution {
            domain: sub.domain,
            initial_value_problem: sub.initial_value_problem,
            circuit: sub.circuit,
            system,
            values,
            stats,
        })
    }

    fn causal(&self) -> bool {
        self.system.causal && !self.initial_value_problem
    }

    /// Folds per-column values back into one delayed Laplace sum.
    fn collect(&self, per_column: Vec<RatFunc>) -> TransientExpr {
        let causal = self.causal();
        let mut out = TransientExpr::zero().with_causal(causal);
        for (column, value) in self.system.columns.iter().zip(per_column) {
            if let Column::Delay(delay) = column {
                out = out.add(&TransientExpr::delayed(delay.clone(), value, causal));
            }
        }
        out
    }

    pub fn form(&self, form: &LinearForm) -> TransientExpr {
        self.collect(form.eval(&self.values))
    }

    /// Value of unknown `index`.
    pub fn unknown(&self, index: usize) -> TransientExpr {
        let row = (0..self.values.ncols()).map(|c| self.values[(index, c)].clone()).collect();
        self.collect(row)
    }

    pub fn node_voltage(&self, node: &str) -> Result<TransientExpr> {
        Ok(self.form(&self.system.voltage_form(node, crate::circuit::GROUND)?))
    }

    pub fn voltage_between(&self, a: &str, b: &str) -> Result<TransientExpr> {
        Ok(self.form(&self.system.voltage_form(a, b)?))
    }

    /// Current entering the first terminal of `name`.
    pub fn current(&self, name: &str) -> Result<TransientExpr> {
        let component = self.circuit.component(name)?;
        let form = self.system.current_form(component, &self.domain.s_value())?;
        Ok(self.form(&form))
    }

    /// `(label, value)` for every unknown.
    pub fn unknown_values(&self) -> Vec<(String, TransientExpr)> {
        self.system
            .unknowns
            .iter()
            .enumerate()
            .map(|(i, u)| (u.label(), self.unknown(i)))
            .collect()
    }
}

/// Name not yet used by any component, starting from `base`.
fn fresh_name(circuit: &Circuit, base: &str) -> String {
    let mut name = base.to_string();
    let mut n = 1;
    while circuit.component(&name).is_ok() {
        name = format!("{}{}", base, n);
        n += 1;
    }
    name
}

/// Removes voltage sources that sit directly across `a`-`b`; a unit test source replaces them.
fn remove_sources_across(circuit: &mut Circuit, a: &str, b: &str) -> Result<()> {
    let classes = circuit.node_classes();
    let class_of = |n: &str| circuit.node_id(n).map(|id| classes.find(id));
    let (ca, cb) = (class_of(a)?, class_of(b)?);
    let mut across = Vec::new();
    for c in circuit.components() {
        if let ComponentKind::VoltageSource(_) = c.kind {
            let pair = (class_of(&c.nodes[0])?, class_of(&c.nodes[1])?);
            if pair == (ca, cb) || pair == (cb, ca) {
                across.push(c.name.clone());
            }
        }
    }
    for name in across {
        debug!("Replacing {} by the unit test source", name);
        circuit.remove(&name)?;
    }
    Ok(())
}

fn unit_laplace() -> SourceValue {
    SourceValue::new(vec![Signal::Transient(TransientExpr::from_laplace(RatFunc::one(), true))])
}

impl Circuit {
    /// Solution of one domain, from the cache when available.
    pub fn solve_domain(&self, domain: &Domain) -> Result<Arc<DomainSolution>> {
        if let Some(hit) = self.cached(domain) {
            return Ok(hit);
        }
        let sub = subcircuit(self, domain)?;
        let solution = Arc::new(DomainSolution::solve(sub, &LinearSolver::with_config(self.solver_config().clone()))?);
        self.store(solution.clone());
        Ok(solution)
    }

    /// Solves every analysis domain, fanning out over threads when the circuit is
    /// marked parallel. A circuit without sources is solved at dc so structural
    /// errors still surface.
    pub fn solve_all(&self) -> Result<Vec<Arc<DomainSolution>>> {
        let mut domains = analysis_domains(self);
        if domains.is_empty() {
            domains.push(Domain::Dc);
        }
        info!("Solving '{}' in {} domain(s)", self.title, domains.len());
        if self.is_parallel() && domains.len() > 1 {
            domains.par_iter().map(|d| self.solve_domain(d)).collect()
        } else {
            domains.iter().map(|d| self.solve_domain(d)).collect()
        }
    }

    fn superpose(
        &self,
        quantity: Quantity,
        f: impl Fn(&DomainSolution) -> Result<TransientExpr>,
    ) -> Result<Superposition> {
        let parts = self
            .solve_all()?
            .iter()
            .map(|solution| Ok((solution.domain.clone(), f(solution)?)))
            .collect::<Result<Vec<_>>>()?;
        Ok(Superposition::combine(quantity, parts))
    }

    /// Voltage of `node` with respect to ground.
    pub fn voltage(&self, node: &str) -> Result<Superposition> {
        self.node_id(node)?;
        self.superpose(Quantity::Voltage, |s| s.node_voltage(node))
    }

    /// Voltage between two nodes, `V(a) - V(b)`.
    pub fn voltage_between(&self, a: &str, b: &str) -> Result<Superposition> {
        self.superpose(Quantity::Voltage, |s| s.voltage_between(a, b))
    }

    /// Voltage across a component, `V(n+) - V(n-)`.
    pub fn branch_voltage(&self, name: &str) -> Result<Superposition> {
        let component = self.component(name)?;
        let (a, b) = (component.nodes[0].clone(), component.nodes[1].clone());
        self.voltage_between(&a, &b)
    }

    /// Current entering `n+` of a component.
    pub fn current(&self, name: &str) -> Result<Superposition> {
        self.component(name)?;
        self.superpose(Quantity::Current, |s| s.current(name))
    }

    /// Copy with every source killed and initial conditions removed, the starting
    /// point of immittance and transfer-function measurements.
    fn dead(&self) -> Circuit {
        self.map_components(|c| c.killed().without_initial_condition())
    }

    /// Driving-point impedance between two nodes.
    pub fn impedance(&self, n1: &str, n2: &str) -> Result<RatFunc> {
        self.node_id(n1)?;
        self.node_id(n2)?;
        let mut driven = self.dead();
        let name = fresh_name(&driven, "Itest");
        driven.add(Component::current_source(&name, n1, n2, unit_laplace())?)?;
        let solution = driven.solve_domain(&Domain::Transient)?;
        Ok(solution.voltage_between(n1, n2)?.undelayed())
    }

    pub fn admittance(&self, n1: &str, n2: &str) -> Result<RatFunc> {
        let z = self.impedance(n1, n2)?;
        RatFunc::one()
            .checked_div(&z)
            .ok_or_else(|| CircuitError::Domain(format!("nodes {} and {} are shorted", n1, n2)))
    }

    /// `(V(out+) - V(out-)) / (V(in+) - V(in-))` with a unit source driving the input.
    pub fn transfer(&self, in_p: &str, in_n: &str, out_p: &str, out_n: &str) -> Result<RatFunc> {
        for node in [in_p, in_n, out_p, out_n] {
            self.node_id(node)?;
        }
        let mut driven = self.dead();
        remove_sources_across(&mut driven, in_p, in_n)?;
        let name = fresh_name(&driven, "Vtest");
        driven.add(Component::voltage_source(&name, in_p, in_n, unit_laplace())?)?;
        let solution = driven.solve_domain(&Domain::Transient)?;
        Ok(solution.voltage_between(out_p, out_n)?.undelayed())
    }

    /// Open-circuit impedance matrix of the two ports.
    pub fn z_parameters(&self, port1: (&str, &str), port2: (&str, &str)) -> Result<[[RatFunc; 2]; 2]> {
        let ports = [port1, port2];
        for (p, n) in ports {
            self.node_id(p)?;
            self.node_id(n)?;
        }
        let dead = self.dead();
        let mut z: [[RatFunc; 2]; 2] = Default::default();
        for (j, (p, n)) in ports.iter().enumerate() {
            let mut driven = dead.clone();
            let name = fresh_name(&driven, &format!("Iport{}", j + 1));
            driven.add(Component::current_source(&name, p, n, unit_laplace())?)?;
            let solution = driven.solve_domain(&Domain::Transient)?;
            for (i, (a, b)) in ports.iter().enumerate() {
                z[i][j] = solution.voltage_between(a, b)?.undelayed();
            }
        }
        Ok(z)
    }

    /// Two-port network between the ports, in chain (ABCD) form.
    pub fn two_port(&self, port1: (&str, &str), port2: (&str, &str)) -> Result<TwoPort> {
        let z = self.z_parameters(port1, port2)?;
        TwoPort::from_z(&z)
    }

    /// Every node voltage, in node order.
    pub fn node_voltages(&self) -> Result<Vec<(String, Superposition)>> {
        let names: Vec<String> = self
            .nodes()
            .iter()
            .filter(|n| !n.is_ground())
            .map(|n| n.name.clone())
            .collect();
        names
            .into_iter()
            .map(|n| Ok((n.clone(), self.voltage(&n)?)))
            .collect()
    }

    /// Current of every component that carries a tracked current.
    pub fn branch_currents(&self) -> Result<Vec<(String, Superposition)>> {
        let names: Vec<String> = self
            .components()
            .iter()
            .filter(|c| !matches!(c.kind, ComponentKind::Wire | ComponentKind::Open | ComponentKind::Port))
            .map(|c| c.name.clone())
            .collect();
        names
            .into_iter()
            .map(|n| Ok((n.clone(), self.current(&n)?)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::Bindings;

    fn divider() -> (Circuit, RatFunc, RatFunc, RatFunc) {
        let mut circuit = Circuit::new("divider".to_string());
        let v = circuit.symbol("V");
        let r1 = circuit.symbol("R1");
        let r2 = circuit.symbol("R2");
        circuit
            .add(Component::voltage_source("V1", "1", "0", SourceValue::dc(v.clone())).unwrap())
            .unwrap();
        circuit.add(Component::resistor("R1", "1", "2", r1.clone()).unwrap()).unwrap();
        circuit.add(Component::resistor("R2", "2", "0", r2.clone()).unwrap()).unwrap();
        (circuit, v, r1, r2)
    }

    #[test]
    fn test_divider_voltage() {
        let (circuit, v, r1, r2) = divider();
        let out = circuit.voltage("2").unwrap();
        let expected = (&v * &r2).try_div(&(&r1 + &r2)).unwrap();
        assert_eq!(out.dc(), &expected);
        assert_eq!(out.quantity, Quantity::Voltage);
    }

    #[test]
    fn test_passive_sign_convention() {
        let (circuit, v, r1, r2) = divider();
        let i_r1 = circuit.current("R1").unwrap();
        let total = &r1 + &r2;
        assert_eq!(i_r1.dc(), &v.try_div(&total).unwrap());
        // The source delivers power: current enters its n+ terminal negatively.
        let i_v = circuit.current("V1").unwrap();
        assert_eq!(i_v.dc(), &-v.try_div(&total).unwrap());
    }

    #[test]
    fn test_cache_is_reused_and_invalidated() {
        let (mut circuit, ..) = divider();
        let first = circuit.solve_domain(&Domain::Dc).unwrap();
        let second = circuit.solve_domain(&Domain::Dc).unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        circuit.add(Component::resistor("R3", "2", "0", RatFunc::one()).unwrap()).unwrap();
        let third = circuit.solve_domain(&Domain::Dc).unwrap();
        assert!(!Arc::ptr_eq(&first, &third));
    }

    #[test]
    fn test_rc_lowpass_transfer_and_impedance() {
        let mut circuit = Circuit::new("rc".to_string());
        let r = circuit.symbol("R");
        let c = circuit.symbol("C");
        circuit
            .add(Component::voltage_source("V1", "1", "0", SourceValue::dc(RatFunc::one())).unwrap())
            .unwrap();
        circuit.add(Component::resistor("R1", "1", "2", r.clone()).unwrap()).unwrap();
        circuit.add(Component::capacitor("C1", "2", "0", c.clone(), None).unwrap()).unwrap();
        let s = RatFunc::s();
        let rcs = &(&r * &c) * &s;
        let h = circuit.transfer("1", "0", "2", "0").unwrap();
        assert_eq!(h, RatFunc::one().try_div(&(&rcs + &RatFunc::one())).unwrap());
        // Looking into node 2 with the source shorted: R || 1/(sC)
        let z = circuit.impedance("2", "0").unwrap();
        assert_eq!(z, r.try_div(&(&rcs + &RatFunc::one())).unwrap());
    }

    #[test]
    fn test_rc_step_response() {
        let mut circuit = Circuit::new("rc step".to_string());
        circuit
            .add(
                Component::voltage_source(
                    "V1",
                    "1",
                    "0",
                    SourceValue::new(vec![Signal::Transient(TransientExpr::from_laplace(
                        RatFunc::s().recip().unwrap(),
                        true,
                    ))]),
                )
                .unwrap(),
            )
            .unwrap();
        circuit.add(Component::resistor("R1", "1", "2", RatFunc::one()).unwrap()).unwrap();
        circuit.add(Component::capacitor("C1", "2", "0", RatFunc::one(), None).unwrap()).unwrap();
        let v = circuit.voltage("2").unwrap();
        let time = v.time().unwrap();
        assert!(!time.conditional);
        let bindings = Bindings::default();
        let at_one = time.eval(1.0, &bindings).unwrap();
        approx::assert_abs_diff_eq!(at_one, 1.0 - (-1.0f64).exp(), epsilon = 1e-9);
    }

    #[test]
    fn test_initial_value_problem_is_conditional() {
        let mut circuit = Circuit::new("discharge".to_string());
        circuit.add(Component::resistor("R1", "1", "0", RatFunc::one()).unwrap()).unwrap();
        circuit
            .add(Component::capacitor("C1", "1", "0", RatFunc::one(), Some(RatFunc::from_int(2))).unwrap())
            .unwrap();
        let v = circuit.voltage("1").unwrap();
        assert_eq!(v.transient().initial_value().unwrap(), RatFunc::from_int(2));
        let time = v.time().unwrap();
        assert!(time.conditional);
        assert!(time.eval(-1.0, &Bindings::default()).is_err());
    }

    #[test]
    fn test_two_port_of_series_resistor() {
        let mut circuit = Circuit::new("tee".to_string());
        let r = circuit.symbol("R");
        circuit.add(Component::resistor("R1", "1", "2", r.clone()).unwrap()).unwrap();
        circuit.add(Component::resistor("R2", "2", "0", r.clone()).unwrap()).unwrap();
        circuit.add(Component::resistor("R3", "2", "3", r.clone()).unwrap()).unwrap();
        let z = circuit.z_parameters(("1", "0"), ("3", "0")).unwrap();
        let two_r = &r + &r;
        assert_eq!(z[0][0], two_r);
        assert_eq!(z[0][1], r);
        assert_eq!(z[1][0], r);
        assert_eq!(z[1][1], two_r);
    }

    #[test]
    fn test_controlled_source_gain() {
        // E1 drives node 2 with 10 * V(1)
        let mut circuit = Circuit::new("amp".to_string());
        circuit
            .add(Component::voltage_source("V1", "1", "0", SourceValue::dc(RatFunc::one())).unwrap())
            .unwrap();
        let e = Component::new(
            "E1",
            ComponentKind::Vcvs {
                gain: RatFunc::from_int(10),
            },
            vec!["2".into(), "0".into(), "1".into(), "0".into()],
        )
        .unwrap();
        circuit.add(e).unwrap();
        circuit.add(Component::resistor("RL", "2", "0", RatFunc::one()).unwrap()).unwrap();
        assert_eq!(circuit.voltage("2").unwrap().dc(), &RatFunc::from_int(10));
    }

    #[test]
    fn test_transformer_ratio() {
        let mut circuit = Circuit::new("xfmr".to_string());
        circuit
            .add(Component::voltage_source("V1", "1", "0", SourceValue::dc(RatFunc::from_int(3))).unwrap())
            .unwrap();
        let tf = Component::new(
            "TF1",
            ComponentKind::Transformer {
                ratio: RatFunc::from_int(2),
            },
            vec!["1".into(), "0".into(), "2".into(), "0".into()],
        )
        .unwrap();
        circuit.add(tf).unwrap();
        circuit.add(Component::resistor("RL", "2", "0", RatFunc::from_int(4)).unwrap()).unwrap();
        assert_eq!(circuit.voltage("2").unwrap().dc(), &RatFunc::from_int(6));
        // Secondary delivers 6/4 A; the primary draws twice that.
        assert_eq!(circuit.current("TF1").unwrap().dc(), &RatFunc::from_int(3));
    }

    #[test]
    fn test_short_across_current_source_is_fine() {
        let mut circuit = Circuit::new("shorted".to_string());
        circuit
            .add(Component::current_source("I1", "1", "0", SourceValue::dc(RatFunc::one())).unwrap())
            .unwrap();
        circuit.add(Component::wire("W1", "1", "0").unwrap()).unwrap();
        circuit.add(Component::resistor("R1", "1", "2", RatFunc::one()).unwrap()).unwrap();
        circuit.add(Component::resistor("R2", "2", "0", RatFunc::one()).unwrap()).unwrap();
        assert!(circuit.voltage("2").unwrap().dc().is_zero());
    }

    #[test]
    fn test_current_source_shorted_into_ground() {
        let circuit: Circuit = "I1 1 0 dc 1\nW1 1 0\n".parse().unwrap();
        assert!(circuit.voltage("1").unwrap().dc().is_zero());
        // Current enters n+ of a source driving 1 A into node 1
        assert_eq!(circuit.current("I1").unwrap().dc(), &RatFunc::from_int(-1));
        let solution = circuit.solve_domain(&Domain::Dc).unwrap();
        assert_eq!(solution.system.size(), 0);
    }

    /// 1 V source across a 1 ohm load on node 1, plus `extra` driving node 2.
    fn driven(extra: &str) -> Circuit {
        format!("V1 1 0 dc 1\nR1 1 0 1\n{}\nR2 2 0 1\n", extra).parse().unwrap()
    }

    #[test]
    fn test_current_controlled_current_source() {
        // I(V1) = -1, so F1 pushes -2 A into node 2
        let circuit = driven("F1 0 2 V1 2");
        assert_eq!(circuit.voltage("2").unwrap().dc(), &RatFunc::from_int(-2));
        assert_eq!(circuit.current("F1").unwrap().dc(), &RatFunc::from_int(-2));
    }

    #[test]
    fn test_current_controlled_voltage_source() {
        let circuit = driven("H1 2 0 V1 3");
        assert_eq!(circuit.voltage("2").unwrap().dc(), &RatFunc::from_int(-3));
    }

    #[test]
    fn test_voltage_controlled_current_source() {
        let circuit = driven("G1 0 2 1 0 5");
        assert_eq!(circuit.voltage("2").unwrap().dc(), &RatFunc::from_int(5));
        let mut circuit = driven("G1 0 2 1 0 gm");
        let gm = circuit.symbol("gm");
        assert_eq!(circuit.voltage("2").unwrap().dc(), &gm);
    }

    #[test]
    fn test_transmission_line_at_dc_is_a_through() {
        let circuit: Circuit = "V1 1 0 dc 3\nTL1 1 0 2 0 50\nR1 2 0 2\n".parse().unwrap();
        assert_eq!(circuit.voltage("2").unwrap().dc(), &RatFunc::from_int(3));
        let i_r1 = circuit.current("R1").unwrap();
        assert_eq!(i_r1.dc(), &RatFunc::from_int(3).try_div(&RatFunc::from_int(2)).unwrap());
        assert_eq!(circuit.current("TL1").unwrap().dc(), i_r1.dc());
    }
}
