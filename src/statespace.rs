//! State-space models `dx/dt = A x + B u`, `y = C x + D u`.
//!
//! Models come from a circuit (capacitor voltages and inductor currents as states)
//! or from a SISO transfer function in one of three canonical forms. Model
//! reduction works on `f64` copies of the matrices and is refused for symbolic
//! models.

use log::{debug, info};
use nalgebra::{DMatrix, DVector};
use serde::Serialize;

use crate::algebra::roots::{find_roots, Root};
use crate::algebra::{rational_from_f64, rational_to_f64, residues, RatFunc, UPoly};
use crate::circuit::{Circuit, GROUND};
use crate::component::ComponentKind;
use crate::context::{AnalysisContext, Render};
use crate::error::{CircuitError, Result};
use crate::mna::MnaSystem;
use crate::solver::LinearSolver;
use crate::symbol::SymbolId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CanonicalForm {
    Controllable,
    Observable,
    /// Modal form; needs distinct poles in closed form.
    Diagonal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StateSpace {
    pub a: DMatrix<RatFunc>,
    pub b: DMatrix<RatFunc>,
    pub c: DMatrix<RatFunc>,
    pub d: DMatrix<RatFunc>,
    pub states: Vec<String>,
    pub inputs: Vec<String>,
    pub outputs: Vec<String>,
}

fn zeros(rows: usize, cols: usize) -> DMatrix<RatFunc> {
    DMatrix::from_element(rows, cols, RatFunc::zero())
}

fn matmul(x: &DMatrix<RatFunc>, y: &DMatrix<RatFunc>) -> DMatrix<RatFunc> {
    DMatrix::from_fn(x.nrows(), y.ncols(), |i, j| {
        (0..x.ncols())
            .filter(|&k| !x[(i, k)].is_zero() && !y[(k, j)].is_zero())
            .map(|k| &x[(i, k)] * &y[(k, j)])
            .sum()
    })
}

impl StateSpace {
    /// Model of `circuit` with every independent source as an input and the
    /// voltages of `outputs` (node names) as outputs.
    ///
    /// Capacitors are replaced by voltage sources and inductors by current
    /// sources; one resistive solve then gives every state derivative and output
    /// as a combination of states and inputs.
    pub fn from_circuit(circuit: &Circuit, outputs: &[&str]) -> Result<StateSpace> {
        let system = MnaSystem::state_space(circuit)?;
        let reactive: Vec<_> = circuit.components().iter().filter(|c| c.is_reactive()).collect();
        let inputs: Vec<String> = circuit.independent_sources().map(|c| c.name.clone()).collect();
        let n = reactive.len();
        let m = inputs.len();
        let (x, _) = LinearSolver::new()
            .solve(&system.matrix, &system.rhs, &system.labels())
            .map_err(|e| match e {
                CircuitError::Indeterminate { unknown } => CircuitError::ModelForm(format!(
                    "algebraic capacitor loop or inductor cutset at {}",
                    unknown
                )),
                other => other,
            })?;

        let mut a = zeros(n, n);
        let mut b = zeros(n, m);
        let s_value = RatFunc::zero();
        for (i, component) in reactive.iter().enumerate() {
            let (form, scale) = match &component.kind {
                ComponentKind::Capacitor { value, .. } => (system.current_form(component, &s_value)?, value),
                ComponentKind::Inductor { value, .. } => {
                    (system.voltage_form(&component.nodes[0], &component.nodes[1])?, value)
                }
                _ => continue,
            };
            for (j, v) in form.eval(&x).into_iter().enumerate() {
                let v = v.try_div(scale)?;
                if j < n {
                    a[(i, j)] = v;
                } else {
                    b[(i, j - n)] = v;
                }
            }
        }

        let mut c = zeros(outputs.len(), n);
        let mut d = zeros(outputs.len(), m);
        for (i, node) in outputs.iter().enumerate() {
            circuit.node_id(node)?;
            let form = system.voltage_form(node, GROUND)?;
            for (j, v) in form.eval(&x).into_iter().enumerate() {
                if j < n {
                    c[(i, j)] = v;
                } else {
                    d[(i, j - n)] = v;
                }
            }
        }
        info!("State-space model of '{}': {} states, {} inputs", circuit.title, n, m);
        Ok(StateSpace {
            a,
            b,
            c,
            d,
            states: reactive
                .iter()
                .map(|c| match c.kind {
                    ComponentKind::Inductor { .. } => format!("I({})", c.name),
                    _ => format!("V({})", c.name),
                })
                .collect(),
            inputs,
            outputs: outputs.iter().map(|n| format!("V({})", n)).collect(),
        })
    }

    /// Realization of a proper SISO transfer function in `s`.
    pub fn from_transfer_function(h: &RatFunc, form: CanonicalForm) -> Result<StateSpace> {
        let s = SymbolId::S;
        let den = UPoly::from_poly(h.denom(), s);
        let num = UPoly::from_poly(h.numer(), s);
        let n = den.degree();
        if num.degree() > n {
            return Err(CircuitError::ModelForm("transfer function is improper".to_string()));
        }
        let lead = den.leading();
        let den = den.monic();
        let num = num.scale(&lead.recip().ok_or_else(|| {
            CircuitError::ModelForm("transfer function has a zero denominator".to_string())
        })?);
        // Split off the direct feedthrough: num = d * den + rest
        let d = if num.degree() == n && !num.is_zero() { num.coeff(n) } else { RatFunc::zero() };
        let rest = num.sub(&den.scale(&d));

        let mut ss = match form {
            CanonicalForm::Controllable => controllable(&den, &rest, n),
            CanonicalForm::Observable => {
                let c = controllable(&den, &rest, n);
                StateSpace {
                    a: c.a.transpose(),
                    b: c.c.transpose(),
                    c: c.b.transpose(),
                    ..c
                }
            }
            CanonicalForm::Diagonal => diagonal(&den, &rest, n)?,
        };
        ss.d = DMatrix::from_element(1, 1, d);
        debug!("Realized degree-{} transfer function in {:?} form", n, form);
        Ok(ss)
    }

    pub fn order(&self) -> usize {
        self.a.nrows()
    }

    /// `det(sI - A)`.
    pub fn characteristic_polynomial(&self) -> Result<RatFunc> {
        LinearSolver::new().determinant(&self.resolvent_matrix())
    }

    fn resolvent_matrix(&self) -> DMatrix<RatFunc> {
        let s = RatFunc::s();
        let n = self.order();
        DMatrix::from_fn(n, n, |i, j| if i == j { &s - &self.a[(i, j)] } else { -&self.a[(i, j)] })
    }

    /// `C (sI - A)^-1 B + D`, one entry per output/input pair.
    pub fn transfer_function(&self) -> Result<DMatrix<RatFunc>> {
        if self.order() == 0 {
            return Ok(self.d.clone());
        }
        let names: Vec<String> = self.states.clone();
        let (x, _) = LinearSolver::new().solve(&self.resolvent_matrix(), &self.b, &names)?;
        let cx = matmul(&self.c, &x);
        Ok(DMatrix::from_fn(cx.nrows(), cx.ncols(), |i, j| &cx[(i, j)] + &self.d[(i, j)]))
    }

    pub fn is_numeric(&self) -> bool {
        [&self.a, &self.b, &self.c, &self.d]
            .iter()
            .all(|m| m.iter().all(|v| v.is_constant() && !v.has_j()))
    }

    fn numeric(&self) -> Result<NumericModel> {
        let convert = |m: &DMatrix<RatFunc>| -> Result<DMatrix<f64>> {
            let values = m
                .iter()
                .map(|v| match v.constant_value() {
                    Some(c) if !v.has_j() => Ok(rational_to_f64(&c)),
                    _ => Err(CircuitError::ModelForm(
                        "operation requires numeric realization; substitute every symbol first".to_string(),
                    )),
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(DMatrix::from_column_slice(m.nrows(), m.ncols(), &values))
        };
        Ok(NumericModel {
            a: convert(&self.a)?,
            b: convert(&self.b)?,
            c: convert(&self.c)?,
            d: convert(&self.d)?,
        })
    }

    fn with_numeric(&self, model: &NumericModel, states: Vec<String>) -> StateSpace {
        let convert = |m: &DMatrix<f64>| m.map(|v| RatFunc::constant(rational_from_f64(v)));
        StateSpace {
            a: convert(&model.a),
            b: convert(&model.b),
            c: convert(&model.c),
            d: convert(&model.d),
            states,
            inputs: self.inputs.clone(),
            outputs: self.outputs.clone(),
        }
    }

    /// Hankel singular values in descending order.
    pub fn hankel_singular_values(&self) -> Result<Vec<f64>> {
        Ok(self.numeric()?.balancing()?.hsv)
    }

    /// Balanced realization: both Gramians equal `diag(hsv)`.
    pub fn balance(&self) -> Result<(StateSpace, Vec<f64>)> {
        let model = self.numeric()?;
        let balancing = model.balancing()?;
        let balanced = model.transform(&balancing.t, &balancing.t_inv);
        let states = (1..=self.order()).map(|i| format!("z{}", i)).collect();
        Ok((self.with_numeric(&balanced, states), balancing.hsv))
    }

    /// Balanced truncation keeping the states whose Hankel singular value exceeds
    /// `threshold`.
    pub fn truncate(&self, threshold: f64) -> Result<StateSpace> {
        let (balanced, hsv) = self.balance()?;
        let keep = hsv.iter().take_while(|&&h| h > threshold).count();
        info!("Truncating {} of {} states", self.order() - keep, self.order());
        let model = balanced.numeric()?;
        let reduced = NumericModel {
            a: model.a.view((0, 0), (keep, keep)).into_owned(),
            b: model.b.rows(0, keep).into_owned(),
            c: model.c.columns(0, keep).into_owned(),
            d: model.d.clone(),
        };
        Ok(balanced.with_numeric(&reduced, balanced.states[..keep].to_vec()))
    }

    /// Removes the listed states by singular perturbation (their derivatives set to
    /// zero), which preserves the dc gain.
    pub fn residualize(&self, eliminate: &[usize]) -> Result<StateSpace> {
        let model = self.numeric()?;
        let n = self.order();
        if let Some(bad) = eliminate.iter().find(|&&i| i >= n) {
            return Err(CircuitError::ModelForm(format!("state index {} out of range", bad)));
        }
        let keep: Vec<usize> = (0..n).filter(|i| !eliminate.contains(i)).collect();
        let drop: Vec<usize> = (0..n).filter(|i| eliminate.contains(i)).collect();
        let pick = |m: &DMatrix<f64>, rows: &[usize], cols: &[usize]| {
            DMatrix::from_fn(rows.len(), cols.len(), |i, j| m[(rows[i], cols[j])])
        };
        let all_in: Vec<usize> = (0..model.b.ncols()).collect();
        let all_out: Vec<usize> = (0..model.c.nrows()).collect();
        let a11 = pick(&model.a, &keep, &keep);
        let a12 = pick(&model.a, &keep, &drop);
        let a21 = pick(&model.a, &drop, &keep);
        let a22 = pick(&model.a, &drop, &drop);
        let b1 = pick(&model.b, &keep, &all_in);
        let b2 = pick(&model.b, &drop, &all_in);
        let c1 = pick(&model.c, &all_out, &keep);
        let c2 = pick(&model.c, &all_out, &drop);
        let a22_inv = a22
            .try_inverse()
            .ok_or_else(|| CircuitError::ModelForm("eliminated states have a singular A22 block".to_string()))?;
        let reduced = NumericModel {
            a: &a11 - &a12 * &a22_inv * &a21,
            b: &b1 - &a12 * &a22_inv * &b2,
            c: &c1 - &c2 * &a22_inv * &a21,
            d: &model.d - &c2 * &a22_inv * &b2,
        };
        let states = keep.iter().map(|&i| self.states[i].clone()).collect();
        Ok(self.with_numeric(&reduced, states))
    }
}

/// Controllable canonical form of `rest / den`, `den` monic of degree `n`.
fn controllable(den: &UPoly<RatFunc>, rest: &UPoly<RatFunc>, n: usize) -> StateSpace {
    let mut a = zeros(n, n);
    for i in 0..n.saturating_sub(1) {
        a[(i, i + 1)] = RatFunc::one();
    }
    for j in 0..n {
        a[(n - 1, j)] = -den.coeff(j);
    }
    let mut b = zeros(n, 1);
    if n > 0 {
        b[(n - 1, 0)] = RatFunc::one();
    }
    let c = DMatrix::from_fn(1, n, |_, j| rest.coeff(j));
    StateSpace {
        a,
        b,
        c,
        d: zeros(1, 1),
        states: (1..=n).map(|i| format!("x{}", i)).collect(),
        inputs: vec!["u".to_string()],
        outputs: vec!["y".to_string()],
    }
}

/// Modal form: `A = diag(p_i)`, `B = 1`, `C = residues`.
fn diagonal(den: &UPoly<RatFunc>, rest: &UPoly<RatFunc>, n: usize) -> Result<StateSpace> {
    let roots = find_roots(den)?;
    if roots.has_repeated() {
        return Err(CircuitError::ModelForm("non-diagonalizable: repeated pole".to_string()));
    }
    let mut poles = Vec::with_capacity(n);
    for (root, _) in &roots.roots {
        match root {
            Root::Exact(p) => poles.push(p.clone()),
            _ => {
                return Err(CircuitError::ModelForm(
                    "diagonal form needs every pole in closed form".to_string(),
                ))
            }
        }
    }
    let mut a = zeros(n, n);
    let mut c = zeros(1, n);
    for (i, p) in poles.iter().enumerate() {
        a[(i, i)] = p.clone();
        c[(0, i)] = residues(rest, den, p, 1)
            .and_then(|r| r.into_iter().next())
            .ok_or_else(|| CircuitError::Algebraic("residue computation failed".to_string()))?;
    }
    Ok(StateSpace {
        a,
        b: DMatrix::from_element(n, 1, RatFunc::one()),
        c,
        d: zeros(1, 1),
        states: (1..=n).map(|i| format!("x{}", i)).collect(),
        inputs: vec!["u".to_string()],
        outputs: vec!["y".to_string()],
    })
}

#[derive(Debug, Clone)]
struct NumericModel {
    a: DMatrix<f64>,
    b: DMatrix<f64>,
    c: DMatrix<f64>,
    d: DMatrix<f64>,
}

struct Balancing {
    t: DMatrix<f64>,
    t_inv: DMatrix<f64>,
    hsv: Vec<f64>,
}

impl NumericModel {
    fn transform(&self, t: &DMatrix<f64>, t_inv: &DMatrix<f64>) -> NumericModel {
        NumericModel {
            a: t_inv * &self.a * t,
            b: t_inv * &self.b,
            c: &self.c * t,
            d: self.d.clone(),
        }
    }

    fn check_stable(&self) -> Result<()> {
        if self.a.complex_eigenvalues().iter().any(|e| e.re >= 0.0) {
            return Err(CircuitError::ModelForm(
                "balancing requires an asymptotically stable model".to_string(),
            ));
        }
        Ok(())
    }

    /// Square-root balancing from the Cholesky factors of both Gramians.
    fn balancing(&self) -> Result<Balancing> {
        self.check_stable()?;
        let p = lyapunov(&self.a, &(&self.b * self.b.transpose()))?;
        let q = lyapunov(&self.a.transpose(), &(self.c.transpose() * &self.c))?;
        let not_minimal = || CircuitError::ModelForm("balancing requires a minimal realization".to_string());
        let lp = p.cholesky().ok_or_else(not_minimal)?.l();
        let lq = q.cholesky().ok_or_else(not_minimal)?.l();
        let svd = (lq.transpose() * &lp).svd(true, true);
        let u = svd.u.ok_or_else(not_minimal)?;
        let v_t = svd.v_t.ok_or_else(not_minimal)?;

        let n = self.a.nrows();
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&i, &j| svd.singular_values[j].total_cmp(&svd.singular_values[i]));
        let hsv: Vec<f64> = order.iter().map(|&i| svd.singular_values[i]).collect();
        if hsv.iter().any(|&h| h <= f64::EPSILON) {
            return Err(not_minimal());
        }
        let u = DMatrix::from_fn(n, n, |i, j| u[(i, order[j])]);
        let v = DMatrix::from_fn(n, n, |i, j| v_t[(order[j], i)]);
        let scale = DMatrix::from_diagonal(&DVector::from_iterator(n, hsv.iter().map(|h| 1.0 / h.sqrt())));
        let t = &lp * &v * &scale;
        let t_inv = &scale * u.transpose() * lq.transpose();
        Ok(Balancing { t, t_inv, hsv })
    }
}

/// Solves `A X + X A^T + Q = 0` through the Kronecker form, symmetrized.
fn lyapunov(a: &DMatrix<f64>, q: &DMatrix<f64>) -> Result<DMatrix<f64>> {
    let n = a.nrows();
    let identity = DMatrix::<f64>::identity(n, n);
    let kron = identity.kronecker(a) + a.kronecker(&identity);
    let rhs = -DVector::from_column_slice(q.as_slice());
    let x = kron
        .lu()
        .solve(&rhs)
        .ok_or_else(|| CircuitError::ModelForm("Lyapunov equation is singular".to_string()))?;
    let x = DMatrix::from_column_slice(n, n, x.as_slice());
    Ok((&x + x.transpose()) * 0.5)
}

fn render_matrix(m: &DMatrix<RatFunc>, ctx: &AnalysisContext) -> String {
    let rows: Vec<String> = (0..m.nrows())
        .map(|i| {
            let row: Vec<String> = (0..m.ncols()).map(|j| m[(i, j)].render(ctx)).collect();
            format!("[{}]", row.join(", "))
        })
        .collect();
    format!("[{}]", rows.join(", "))
}

impl Render for StateSpace {
    fn render(&self, ctx: &AnalysisContext) -> String {
        format!(
            "x = [{}]\nu = [{}]\ny = [{}]\nA = {}\nB = {}\nC = {}\nD = {}",
            self.states.join(", "),
            self.inputs.join(", "),
            self.outputs.join(", "),
            render_matrix(&self.a, ctx),
            render_matrix(&self.b, ctx),
            render_matrix(&self.c, ctx),
            render_matrix(&self.d, ctx)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{Component, SourceValue};
    use approx::assert_relative_eq;

    fn r(v: i64) -> RatFunc {
        RatFunc::from_int(v)
    }

    #[test]
    fn test_rc_from_circuit() {
        let mut circuit = Circuit::new("rc".to_string());
        let res = circuit.symbol("R");
        let cap = circuit.symbol("C");
        circuit
            .add(Component::voltage_source("V1", "1", "0", SourceValue::dc(r(1))).unwrap())
            .unwrap();
        circuit.add(Component::resistor("R1", "1", "2", res.clone()).unwrap()).unwrap();
        circuit.add(Component::capacitor("C1", "2", "0", cap.clone(), None).unwrap()).unwrap();
        let ss = StateSpace::from_circuit(&circuit, &["2"]).unwrap();
        let tau = &res * &cap;
        assert_eq!(ss.a[(0, 0)], RatFunc::from_int(-1).try_div(&tau).unwrap());
        assert_eq!(ss.b[(0, 0)], RatFunc::one().try_div(&tau).unwrap());
        assert_eq!(ss.c[(0, 0)], RatFunc::one());
        assert!(ss.d[(0, 0)].is_zero());
        let h = ss.transfer_function().unwrap();
        let expected = RatFunc::one().try_div(&(&(&tau * &RatFunc::s()) + &r(1))).unwrap();
        assert_eq!(h[(0, 0)], expected);
    }

    #[test]
    fn test_rlc_states() {
        let mut circuit = Circuit::new("rlc".to_string());
        circuit
            .add(Component::voltage_source("V1", "1", "0", SourceValue::dc(r(1))).unwrap())
            .unwrap();
        circuit.add(Component::resistor("R1", "1", "2", r(1)).unwrap()).unwrap();
        circuit.add(Component::inductor("L1", "2", "3", r(1), None).unwrap()).unwrap();
        circuit.add(Component::capacitor("C1", "3", "0", r(1), None).unwrap()).unwrap();
        let ss = StateSpace::from_circuit(&circuit, &["3"]).unwrap();
        assert_eq!(ss.states, vec!["I(L1)".to_string(), "V(C1)".to_string()]);
        let s = RatFunc::s();
        let expected = &(&(&s * &s) + &s) + &r(1);
        assert_eq!(ss.characteristic_polynomial().unwrap(), expected);
    }

    #[test]
    fn test_capacitor_loop_rejected() {
        let mut circuit = Circuit::new("loop".to_string());
        circuit
            .add(Component::voltage_source("V1", "1", "0", SourceValue::dc(r(1))).unwrap())
            .unwrap();
        circuit.add(Component::capacitor("C1", "1", "0", r(1), None).unwrap()).unwrap();
        let err = StateSpace::from_circuit(&circuit, &["1"]).unwrap_err();
        assert!(matches!(err, CircuitError::ModelForm(_)));
    }

    #[test]
    fn test_forms_share_transfer_function() {
        // (s + 3) / (s^2 + 3s + 2)
        let s = RatFunc::s();
        let num = &s + &r(3);
        let den = &(&(&s * &s) + &(&r(3) * &s)) + &r(2);
        let h = num.try_div(&den).unwrap();
        for form in [CanonicalForm::Controllable, CanonicalForm::Observable, CanonicalForm::Diagonal] {
            let ss = StateSpace::from_transfer_function(&h, form).unwrap();
            assert_eq!(ss.transfer_function().unwrap()[(0, 0)], h, "{:?}", form);
        }
    }

    #[test]
    fn test_feedthrough() {
        // (s + 2) / (s + 1) = 1 + 1 / (s + 1)
        let s = RatFunc::s();
        let h = (&s + &r(2)).try_div(&(&s + &r(1))).unwrap();
        let ss = StateSpace::from_transfer_function(&h, CanonicalForm::Controllable).unwrap();
        assert_eq!(ss.d[(0, 0)], r(1));
        assert_eq!(ss.c[(0, 0)], r(1));
    }

    #[test]
    fn test_repeated_pole_not_diagonalizable() {
        let s = RatFunc::s();
        let den = &(&s + &r(1)) * &(&s + &r(1));
        let h = r(1).try_div(&den).unwrap();
        let err = StateSpace::from_transfer_function(&h, CanonicalForm::Diagonal).unwrap_err();
        assert_eq!(err, CircuitError::ModelForm("non-diagonalizable: repeated pole".to_string()));
    }

    #[test]
    fn test_symbolic_model_refuses_reduction() {
        let mut ctx = AnalysisContext::new();
        let a = RatFunc::var(ctx.symbol("a"));
        let h = r(1).try_div(&(&RatFunc::s() + &a)).unwrap();
        let ss = StateSpace::from_transfer_function(&h, CanonicalForm::Controllable).unwrap();
        assert!(!ss.is_numeric());
        match ss.hankel_singular_values() {
            Err(CircuitError::ModelForm(msg)) => assert!(msg.contains("requires numeric realization")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_balanced_truncation_and_residualization() {
        // 1/(s+1) + 1/(s+10)
        let s = RatFunc::s();
        let h = (&(&r(2) * &s) + &r(11))
            .try_div(&(&(&s + &r(1)) * &(&s + &r(10))))
            .unwrap();
        let ss = StateSpace::from_transfer_function(&h, CanonicalForm::Diagonal).unwrap();
        let hsv = ss.hankel_singular_values().unwrap();
        assert_eq!(hsv.len(), 2);
        assert!(hsv[0] >= hsv[1] && hsv[1] > 0.0);

        let reduced = ss.truncate(hsv[1] * 1.5).unwrap();
        assert_eq!(reduced.order(), 1);

        // Residualizing the fast mode keeps the dc gain 1 + 1/10.
        let fast = (0..2).find(|&i| ss.a[(i, i)] == r(-10)).unwrap();
        let slow = ss.residualize(&[fast]).unwrap();
        let numeric = slow.numeric().unwrap();
        let dc = numeric.d[(0, 0)] - (&numeric.c * numeric.a.clone().try_inverse().unwrap() * &numeric.b)[(0, 0)];
        assert_relative_eq!(dc, 1.1, epsilon = 1e-9);
    }
}
