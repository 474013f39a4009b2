use log::debug;
use nalgebra::DMatrix;
use sprs::{CsMat, TriMat};
use std::collections::HashMap;

use crate::algebra::RatFunc;
use crate::circuit::{is_ground_name, Circuit, NodeClasses};
use crate::component::{Component, ComponentKind};
use crate::domain::Domain;
use crate::error::{CircuitError, Result};
use crate::symbol::SymbolId;
use crate::transform::TransientExpr;

/// Entry of the unknown vector.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Unknown {
    NodeVoltage(String),
    /// Auxiliary current entering the first terminal of `port` of a component.
    BranchCurrent { component: String, port: usize },
}

impl Unknown {
    pub fn label(&self) -> String {
        match self {
            Unknown::NodeVoltage(node) => format!("V({})", node),
            Unknown::BranchCurrent { component, port: 0 } => format!("I({})", component),
            Unknown::BranchCurrent { component, port } => format!("I({},{})", component, port + 1),
        }
    }
}

/// Meaning of one right-hand-side column.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Excitation multiplied by `exp(-s*delay)`.
    Delay(RatFunc),
    /// Unit value of a state variable (state-space extraction).
    State(String),
    /// Unit value of an independent source (state-space extraction).
    Input(String),
}

/// How reactive elements and sources are stamped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StampMode {
    /// Immittances in the domain's transform variable.
    Full,
    /// Capacitors become voltage sources and inductors current sources, each driven
    /// by its own column; every independent source gets a unit column.
    StateSpace,
}

/// Linear combination of unknowns plus per-column constants.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LinearForm {
    pub terms: Vec<(usize, RatFunc)>,
    pub constants: Vec<(usize, RatFunc)>,
}

impl LinearForm {
    fn unknown(index: usize) -> Self {
        LinearForm {
            terms: vec![(index, RatFunc::one())],
            constants: Vec::new(),
        }
    }

    fn difference(a: Option<usize>, b: Option<usize>, scale: &RatFunc) -> Self {
        let mut form = LinearForm::default();
        if let Some(a) = a {
            form.terms.push((a, scale.clone()));
        }
        if let Some(b) = b {
            form.terms.push((b, -scale));
        }
        form
    }

    /// Value in every column of the solution `x`.
    pub fn eval(&self, x: &DMatrix<RatFunc>) -> Vec<RatFunc> {
        (0..x.ncols())
            .map(|col| {
                let mut value: RatFunc = self.terms.iter().map(|(i, c)| c * &x[(*i, col)]).sum();
                for (k, c) in &self.constants {
                    if *k == col {
                        value = &value + c;
                    }
                }
                value
            })
            .collect()
    }
}

/// MNA system representation: `[A][x] = [z]` with one column of `z` per
/// excitation delay (or per state/input in state-space mode).
#[derive(Debug, Clone)]
pub struct MnaSystem {
    pub domain: Domain,
    pub mode: StampMode,
    /// System matrix A (coefficient matrix)
    pub matrix: DMatrix<RatFunc>,
    /// Right-hand side, one column per entry of `columns`
    pub rhs: DMatrix<RatFunc>,
    pub columns: Vec<Column>,
    pub unknowns: Vec<Unknown>,
    /// Every excitation is known to vanish for `t < 0`.
    pub causal: bool,
    /// Node name to row; `None` for nodes merged into ground.
    node_rows: HashMap<String, Option<usize>>,
    branch_rows: HashMap<String, usize>,
    num_nodes: usize,
}

impl MnaSystem {
    /// Assemble the system of `circuit` in `domain`.
    pub fn new(circuit: &Circuit, domain: &Domain) -> Result<Self> {
        MnaSystem::build(circuit, domain, StampMode::Full)
    }

    /// Resistive system used for state-space extraction.
    pub fn state_space(circuit: &Circuit) -> Result<Self> {
        MnaSystem::build(circuit, &Domain::Transient, StampMode::StateSpace)
    }

    fn build(circuit: &Circuit, domain: &Domain, mode: StampMode) -> Result<Self> {
        circuit.validate()?;
        let classes = circuit.node_classes();
        let s_value = domain.s_value();

        let mut unknowns = Vec::new();
        let mut rep_rows: HashMap<usize, usize> = HashMap::new();
        for name in circuit.principal_nodes() {
            rep_rows.insert(circuit.node_id(&name)?, unknowns.len());
            unknowns.push(Unknown::NodeVoltage(name));
        }
        let num_nodes = unknowns.len();
        let node_rows = node_row_map(circuit, &classes, &rep_rows);

        let mut branch_rows = HashMap::new();
        for component in circuit.components() {
            let count = aux_count(component, &s_value, mode)?;
            if count > 0 {
                branch_rows.insert(component.name.clone(), unknowns.len());
            }
            for port in 0..count {
                unknowns.push(Unknown::BranchCurrent {
                    component: component.name.clone(),
                    port,
                });
            }
        }

        let columns = match mode {
            StampMode::Full => delay_columns(circuit, domain),
            StampMode::StateSpace => state_space_columns(circuit),
        };

        // Empty when wires merge every node into ground
        let size = unknowns.len();
        let mut system = MnaSystem {
            domain: domain.clone(),
            mode,
            matrix: DMatrix::from_element(size, size, RatFunc::zero()),
            rhs: DMatrix::from_element(size, columns.len(), RatFunc::zero()),
            columns,
            unknowns,
            causal: true,
            node_rows,
            branch_rows,
            num_nodes,
        };
        for component in circuit.components() {
            system.stamp(circuit, component, &s_value)?;
        }
        debug!(
            "Assembled {} MNA system: {} unknowns, {} columns, {} nonzeros",
            match mode {
                StampMode::Full => "full",
                StampMode::StateSpace => "state-space",
            },
            size,
            system.columns.len(),
            system.to_sparse().nnz()
        );
        Ok(system)
    }

    pub fn size(&self) -> usize {
        self.unknowns.len()
    }

    pub fn num_nodes(&self) -> usize {
        self.num_nodes
    }

    pub fn labels(&self) -> Vec<String> {
        self.unknowns.iter().map(Unknown::label).collect()
    }

    /// Row of a node, `None` for ground.
    pub fn node_row(&self, node: &str) -> Result<Option<usize>> {
        if is_ground_name(node) {
            return Ok(None);
        }
        self.node_rows
            .get(node)
            .copied()
            .ok_or_else(|| CircuitError::UnknownNode(node.to_string()))
    }

    /// First auxiliary row of a component.
    pub fn branch_row(&self, component: &str) -> Option<usize> {
        self.branch_rows.get(component).copied()
    }

    pub fn delay_column(&self, delay: &RatFunc) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| matches!(c, Column::Delay(d) if d == delay))
    }

    pub fn column_of(&self, column: &Column) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    fn add(&mut self, row: Option<usize>, col: Option<usize>, value: &RatFunc) {
        if let (Some(r), Some(c)) = (row, col) {
            if !value.is_zero() {
                self.matrix[(r, c)] = &self.matrix[(r, c)] + value;
            }
        }
    }

    fn add_rhs(&mut self, row: Option<usize>, col: usize, value: &RatFunc) {
        if let Some(r) = row {
            self.rhs[(r, col)] = &self.rhs[(r, col)] + value;
        }
    }

    fn stamp_admittance(&mut self, a: Option<usize>, b: Option<usize>, y: &RatFunc) {
        let minus = -y;
        self.add(a, a, y);
        self.add(b, b, y);
        self.add(a, b, &minus);
        self.add(b, a, &minus);
    }

    /// KCL terms of a branch current entering `a` and leaving through `b`, plus the
    /// `V(a) - V(b)` part of its branch equation.
    fn stamp_branch(&mut self, k: usize, a: Option<usize>, b: Option<usize>) {
        let one = RatFunc::one();
        let minus = -&one;
        self.add(a, Some(k), &one);
        self.add(b, Some(k), &minus);
        self.add(Some(k), a, &one);
        self.add(Some(k), b, &minus);
    }

    /// Injects `value` into node `a` and draws it from node `b` in every delay column.
    fn inject(&mut self, a: Option<usize>, b: Option<usize>, value: &TransientExpr) {
        for (delay, v) in value.terms() {
            if let Some(col) = self.delay_column(delay) {
                self.add_rhs(a, col, v);
                self.add_rhs(b, col, &-v);
            }
        }
        self.causal &= value.is_causal() || value.is_zero();
    }

    fn rows(&self, component: &Component) -> Result<Vec<Option<usize>>> {
        component.nodes.iter().map(|n| self.node_row(n)).collect()
    }

    fn stamp(&mut self, circuit: &Circuit, component: &Component, s_value: &RatFunc) -> Result<()> {
        let rows = self.rows(component)?;
        let (a, b) = (rows[0], rows[1]);
        let aux = self.branch_row(&component.name);
        let state_space = self.mode == StampMode::StateSpace;
        match &component.kind {
            ComponentKind::Capacitor { .. } if state_space => {
                let k = aux.ok_or_else(|| missing_branch(component))?;
                self.stamp_branch(k, a, b);
                let col = self.state_column(&component.name)?;
                self.rhs[(k, col)] = RatFunc::one();
            }
            ComponentKind::Inductor { .. } if state_space => {
                // x_L flows from n+ to n- through the element.
                let col = self.state_column(&component.name)?;
                self.add_rhs(a, col, &RatFunc::from_int(-1));
                self.add_rhs(b, col, &RatFunc::one());
            }
            ComponentKind::Capacitor { value, v0 } => {
                let y = value * s_value;
                self.stamp_admittance(a, b, &y);
                if let (Some(v0), Domain::Transient) = (v0, &self.domain) {
                    // i = sCV - C v0: a Norton source C*v0 into n+.
                    let norton = TransientExpr::from_laplace(value * v0, false);
                    self.inject(a, b, &norton);
                }
            }
            ComponentKind::Resistor(_)
            | ComponentKind::Conductor(_)
            | ComponentKind::Impedance(_)
            | ComponentKind::Admittance(_) => match aux {
                None => {
                    let y = component
                        .admittance_at(s_value)?
                        .ok_or_else(|| missing_branch(component))?;
                    self.stamp_admittance(a, b, &y);
                }
                Some(k) => {
                    // Admittance with a pole here: V(a) - V(b) - Z*I = 0.
                    self.stamp_branch(k, a, b);
                    let z = impedance_at(component, s_value)?;
                    self.add(Some(k), Some(k), &-&z);
                }
            },
            ComponentKind::Inductor { value, i0 } => {
                let k = aux.ok_or_else(|| missing_branch(component))?;
                self.stamp_branch(k, a, b);
                self.add(Some(k), Some(k), &-&(value * s_value));
                if let (Some(i0), Domain::Transient) = (i0, &self.domain) {
                    // V = sL I - L i0
                    let col = self.delay_column(&RatFunc::zero()).ok_or_else(|| missing_branch(component))?;
                    self.add_rhs(Some(k), col, &-&(value * i0));
                    self.causal = false;
                }
            }
            ComponentKind::VoltageSource(value) => {
                let k = aux.ok_or_else(|| missing_branch(component))?;
                self.stamp_branch(k, a, b);
                if state_space {
                    let col = self.input_column(&component.name)?;
                    self.rhs[(k, col)] = RatFunc::one();
                } else {
                    let excitation = value.in_domain(&self.domain);
                    self.inject(Some(k), None, &excitation);
                }
            }
            ComponentKind::CurrentSource(value) => {
                if state_space {
                    let col = self.input_column(&component.name)?;
                    self.add_rhs(a, col, &RatFunc::one());
                    self.add_rhs(b, col, &RatFunc::from_int(-1));
                } else {
                    let excitation = value.in_domain(&self.domain);
                    self.inject(a, b, &excitation);
                }
            }
            ComponentKind::Vcvs { gain } => {
                let k = aux.ok_or_else(|| missing_branch(component))?;
                self.stamp_branch(k, a, b);
                let gain = gain_at(component, gain, s_value, state_space)?;
                self.add(Some(k), rows[2], &-&gain);
                self.add(Some(k), rows[3], &gain);
            }
            ComponentKind::Vccs { gain } => {
                let k = aux.ok_or_else(|| missing_branch(component))?;
                let gain = gain_at(component, gain, s_value, state_space)?;
                let one = RatFunc::one();
                self.add(a, Some(k), &one);
                self.add(b, Some(k), &-&one);
                self.add(Some(k), Some(k), &one);
                self.add(Some(k), rows[2], &-&gain);
                self.add(Some(k), rows[3], &gain);
            }
            ComponentKind::Cccs { control, gain } => {
                let k = aux.ok_or_else(|| missing_branch(component))?;
                let gain = gain_at(component, gain, s_value, state_space)?;
                let sensed = self.current_form(circuit.component(control)?, s_value)?;
                let one = RatFunc::one();
                self.add(a, Some(k), &one);
                self.add(b, Some(k), &-&one);
                self.add(Some(k), Some(k), &one);
                self.stamp_sensed(k, &gain, &sensed);
            }
            ComponentKind::Ccvs { control, gain } => {
                let k = aux.ok_or_else(|| missing_branch(component))?;
                let gain = gain_at(component, gain, s_value, state_space)?;
                let sensed = self.current_form(circuit.component(control)?, s_value)?;
                self.stamp_branch(k, a, b);
                self.stamp_sensed(k, &gain, &sensed);
            }
            ComponentKind::Transformer { ratio } => {
                let kp = aux.ok_or_else(|| missing_branch(component))?;
                let ks = kp + 1;
                let one = RatFunc::one();
                // KCL for both windings
                self.add(a, Some(kp), &one);
                self.add(b, Some(kp), &-&one);
                self.add(rows[2], Some(ks), &one);
                self.add(rows[3], Some(ks), &-&one);
                // V_s - n V_p = 0
                self.add(Some(kp), rows[2], &one);
                self.add(Some(kp), rows[3], &-&one);
                self.add(Some(kp), a, &-ratio);
                self.add(Some(kp), b, ratio);
                // I_p + n I_s = 0
                self.add(Some(ks), Some(kp), &one);
                self.add(Some(ks), Some(ks), ratio);
            }
            ComponentKind::TransmissionLine { z0, cosh, sinh } => {
                if state_space {
                    return Err(CircuitError::ModelForm(format!(
                        "transmission line {} has no finite state-space realization",
                        component.name
                    )));
                }
                let k1 = aux.ok_or_else(|| missing_branch(component))?;
                let k2 = k1 + 1;
                let (ch, sh) = if self.domain == Domain::Dc {
                    (RatFunc::one(), RatFunc::zero())
                } else {
                    (RatFunc::var(*cosh), RatFunc::var(*sinh))
                };
                let b_param = z0 * &sh;
                let c_param = sh.try_div(z0)?;
                let one = RatFunc::one();
                self.add(a, Some(k1), &one);
                self.add(b, Some(k1), &-&one);
                self.add(rows[2], Some(k2), &one);
                self.add(rows[3], Some(k2), &-&one);
                // V1 - A V2 + B I2 = 0
                self.add(Some(k1), a, &one);
                self.add(Some(k1), b, &-&one);
                self.add(Some(k1), rows[2], &-&ch);
                self.add(Some(k1), rows[3], &ch);
                self.add(Some(k1), Some(k2), &b_param);
                // I1 - C V2 + D I2 = 0
                self.add(Some(k2), Some(k1), &one);
                self.add(Some(k2), rows[2], &-&c_param);
                self.add(Some(k2), rows[3], &c_param);
                self.add(Some(k2), Some(k2), &ch);
            }
            ComponentKind::Wire | ComponentKind::Open | ComponentKind::Port => {}
        }
        Ok(())
    }

    /// Adds `-gain * sensed` to row `k`.
    fn stamp_sensed(&mut self, k: usize, gain: &RatFunc, sensed: &LinearForm) {
        for (i, c) in &sensed.terms {
            self.add(Some(k), Some(*i), &-&(gain * c));
        }
        for (col, c) in &sensed.constants {
            self.add_rhs(Some(k), *col, &(gain * c));
        }
    }

    fn state_column(&self, name: &str) -> Result<usize> {
        self.column_of(&Column::State(name.to_string()))
            .ok_or_else(|| CircuitError::UnknownComponent(name.to_string()))
    }

    fn input_column(&self, name: &str) -> Result<usize> {
        self.column_of(&Column::Input(name.to_string()))
            .ok_or_else(|| CircuitError::UnknownComponent(name.to_string()))
    }

    /// `V(a) - V(b)` as a linear form.
    pub fn voltage_form(&self, a: &str, b: &str) -> Result<LinearForm> {
        Ok(LinearForm::difference(self.node_row(a)?, self.node_row(b)?, &RatFunc::one()))
    }

    /// Current entering the first terminal of `component` (passive sign convention).
    pub fn current_form(&self, component: &Component, s_value: &RatFunc) -> Result<LinearForm> {
        let state_space = self.mode == StampMode::StateSpace;
        let rows = self.rows(component)?;
        if let Some(k) = self.branch_row(&component.name) {
            return Ok(LinearForm::unknown(k));
        }
        match &component.kind {
            ComponentKind::Inductor { .. } if state_space => {
                let col = self.state_column(&component.name)?;
                Ok(LinearForm {
                    terms: Vec::new(),
                    constants: vec![(col, RatFunc::one())],
                })
            }
            ComponentKind::CurrentSource(value) => {
                let mut form = LinearForm::default();
                if state_space {
                    form.constants.push((self.input_column(&component.name)?, RatFunc::from_int(-1)));
                } else {
                    for (delay, v) in value.in_domain(&self.domain).terms() {
                        if let Some(col) = self.delay_column(delay) {
                            form.constants.push((col, -v));
                        }
                    }
                }
                Ok(form)
            }
            ComponentKind::Open | ComponentKind::Port => Ok(LinearForm::default()),
            ComponentKind::Wire => Err(CircuitError::invalid(
                &component.name,
                "current through a wire is not tracked; use a zero-valued voltage source",
            )),
            _ => {
                let y = component
                    .admittance_at(s_value)?
                    .ok_or_else(|| missing_branch(component))?;
                let mut form = LinearForm::difference(rows[0], rows[1], &y);
                if let (ComponentKind::Capacitor { value, v0: Some(v0) }, Domain::Transient, StampMode::Full) =
                    (&component.kind, &self.domain, self.mode)
                {
                    if let Some(col) = self.delay_column(&RatFunc::zero()) {
                        form.constants.push((col, -&(value * v0)));
                    }
                }
                Ok(form)
            }
        }
    }

    /// Sparsity pattern of the system matrix, 1.0 where an entry is non-zero.
    pub fn to_sparse(&self) -> CsMat<f64> {
        let size = self.size();
        let mut triplets = TriMat::new((size, size));
        for i in 0..size {
            for j in 0..size {
                if !self.matrix[(i, j)].is_zero() {
                    triplets.add_triplet(i, j, 1.0);
                }
            }
        }
        triplets.to_csr()
    }

    /// Rejects systems with an empty row or column before elimination.
    pub fn check_structure(&self) -> Result<()> {
        let csr = self.to_sparse();
        for (row, vec) in csr.outer_iterator().enumerate() {
            if vec.nnz() == 0 {
                return Err(CircuitError::Indeterminate {
                    unknown: self.unknowns[row].label(),
                });
            }
        }
        let csc = csr.to_csc();
        for (col, vec) in csc.outer_iterator().enumerate() {
            if vec.nnz() == 0 {
                return Err(CircuitError::Indeterminate {
                    unknown: self.unknowns[col].label(),
                });
            }
        }
        Ok(())
    }

}

fn missing_branch(component: &Component) -> CircuitError {
    CircuitError::invalid(&component.name, "element has no admittance form in this system")
}

fn impedance_at(component: &Component, s_value: &RatFunc) -> Result<RatFunc> {
    let z = match &component.kind {
        ComponentKind::Impedance(z) => z.clone(),
        ComponentKind::Admittance(y) => RatFunc::one().try_div(y)?,
        _ => return Err(missing_branch(component)),
    };
    z.try_substitute(SymbolId::S, s_value)
}

fn gain_at(component: &Component, gain: &RatFunc, s_value: &RatFunc, state_space: bool) -> Result<RatFunc> {
    if state_space && gain.contains(SymbolId::S) {
        return Err(CircuitError::ModelForm(format!(
            "frequency-dependent gain of {} needs extra states",
            component.name
        )));
    }
    gain.try_substitute(SymbolId::S, s_value)
}

/// Auxiliary unknowns of a component in this system.
fn aux_count(component: &Component, s_value: &RatFunc, mode: StampMode) -> Result<usize> {
    let count = match &component.kind {
        ComponentKind::Capacitor { .. } if mode == StampMode::StateSpace => 1,
        ComponentKind::Inductor { .. } if mode == StampMode::StateSpace => 0,
        ComponentKind::Impedance(v) | ComponentKind::Admittance(v) => {
            if mode == StampMode::StateSpace && v.contains(SymbolId::S) {
                return Err(CircuitError::ModelForm(format!(
                    "frequency-dependent immittance {} needs extra states",
                    component.name
                )));
            }
            match component.admittance_at(s_value) {
                Ok(_) => 0,
                Err(CircuitError::Domain(_)) => 1,
                Err(e) => return Err(e),
            }
        }
        kind => kind.branch_unknowns(),
    };
    Ok(count)
}

fn node_row_map(
    circuit: &Circuit,
    classes: &NodeClasses,
    rep_rows: &HashMap<usize, usize>,
) -> HashMap<String, Option<usize>> {
    circuit
        .nodes()
        .iter()
        .map(|node| (node.name.clone(), rep_rows.get(&classes.find(node.id)).copied()))
        .collect()
}

/// Delay columns: zero first, then every delay some source uses.
fn delay_columns(circuit: &Circuit, domain: &Domain) -> Vec<Column> {
    let mut delays = vec![RatFunc::zero()];
    for source in circuit.independent_sources() {
        if let Some(value) = source.source_value() {
            for delay in value.in_domain(domain).delays() {
                if !delays.contains(&delay) {
                    delays.push(delay);
                }
            }
        }
    }
    delays.into_iter().map(Column::Delay).collect()
}

fn state_space_columns(circuit: &Circuit) -> Vec<Column> {
    let mut columns: Vec<Column> = circuit
        .components()
        .iter()
        .filter(|c| c.is_reactive())
        .map(|c| Column::State(c.name.clone()))
        .collect();
    columns.extend(
        circuit
            .independent_sources()
            .map(|c| Column::Input(c.name.clone())),
    );
    columns
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::SourceValue;

    fn divider() -> Circuit {
        let mut circuit = Circuit::new("divider".to_string());
        let r1 = circuit.symbol("R1");
        let r2 = circuit.symbol("R2");
        circuit
            .add(Component::voltage_source("V1", "1", "0", SourceValue::dc(RatFunc::from_int(5))).unwrap())
            .unwrap();
        circuit.add(Component::resistor("R1", "1", "2", r1).unwrap()).unwrap();
        circuit.add(Component::resistor("R2", "2", "0", r2).unwrap()).unwrap();
        circuit
    }

    #[test]
    fn test_mna_voltage_divider_shape() {
        let circuit = divider();
        let mna = MnaSystem::new(&circuit, &Domain::Dc).unwrap();
        assert_eq!(mna.size(), 3); // 2 nodes + 1 voltage source
        assert_eq!(mna.num_nodes(), 2);
        assert_eq!(mna.columns, vec![Column::Delay(RatFunc::zero())]);
        let k = mna.branch_row("V1").unwrap();
        assert_eq!(mna.rhs[(k, 0)], RatFunc::from_int(5));
        assert!(mna.check_structure().is_ok());
    }

    #[test]
    fn test_mna_current_source() {
        let mut circuit = Circuit::new("Test".to_string());
        let i = SourceValue::dc(RatFunc::from_int(2));
        circuit.add(Component::current_source("I1", "1", "0", i).unwrap()).unwrap();
        circuit.add(Component::resistor("R1", "1", "0", RatFunc::from_int(1000)).unwrap()).unwrap();
        let mna = MnaSystem::new(&circuit, &Domain::Dc).unwrap();
        assert_eq!(mna.size(), 1);
        assert_eq!(mna.rhs[(0, 0)], RatFunc::from_int(2));
    }

    #[test]
    fn test_inductor_branch_row() {
        let mut circuit = Circuit::new("rl".to_string());
        let l = circuit.symbol("L");
        circuit
            .add(Component::voltage_source("V1", "1", "0", SourceValue::dc(RatFunc::one())).unwrap())
            .unwrap();
        circuit.add(Component::inductor("L1", "1", "0", l.clone(), None).unwrap()).unwrap();
        let mna = MnaSystem::new(&circuit, &Domain::Transient).unwrap();
        let k = mna.branch_row("L1").unwrap();
        assert_eq!(mna.matrix[(k, k)], -(&l * &RatFunc::s()));
        let dc = MnaSystem::new(&circuit, &Domain::Dc).unwrap();
        assert!(dc.matrix[(k, k)].is_zero());
    }

    #[test]
    fn test_wire_merged_node_shares_row() {
        let mut circuit = divider();
        circuit.add(Component::wire("W1", "2", "3").unwrap()).unwrap();
        circuit.add(Component::resistor("R3", "3", "0", RatFunc::one()).unwrap()).unwrap();
        let mna = MnaSystem::new(&circuit, &Domain::Dc).unwrap();
        assert_eq!(mna.node_row("3").unwrap(), mna.node_row("2").unwrap());
        assert_eq!(mna.node_row("0").unwrap(), None);
    }

    #[test]
    fn test_delayed_source_adds_column() {
        let mut circuit = Circuit::new("delay".to_string());
        let tau = circuit.symbol("tau");
        let step = TransientExpr::delayed(tau.clone(), RatFunc::s().recip().unwrap(), true);
        let value = SourceValue::new(vec![crate::component::Signal::Transient(step)]);
        circuit.add(Component::voltage_source("V1", "1", "0", value).unwrap()).unwrap();
        circuit.add(Component::resistor("R1", "1", "0", RatFunc::one()).unwrap()).unwrap();
        let mna = MnaSystem::new(&circuit, &Domain::Transient).unwrap();
        assert_eq!(mna.columns.len(), 2);
        assert!(mna.delay_column(&tau).is_some());
        assert!(mna.causal);
    }

    #[test]
    fn test_state_space_columns() {
        let mut circuit = divider();
        let c = circuit.symbol("C");
        circuit.add(Component::capacitor("C1", "2", "0", c, None).unwrap()).unwrap();
        let mna = MnaSystem::state_space(&circuit).unwrap();
        assert_eq!(
            mna.columns,
            vec![Column::State("C1".to_string()), Column::Input("V1".to_string())]
        );
        assert!(mna.branch_row("C1").is_some());
    }
}
