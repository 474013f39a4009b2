//! Expression trees as parsed from netlist values, and their expansion into the
//! exponential-polynomial atoms the transforms work on.

use num_complex::Complex64;
use num_rational::BigRational;
use num_traits::{Signed, ToPrimitive, Zero};
use std::collections::BTreeSet;

use super::ratfunc::RatFunc;
use super::{rat, rational_from_f64, rational_to_f64, Bindings};
use crate::context::{AnalysisContext, Render};
use crate::error::{CircuitError, Result};
use crate::symbol::SymbolId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Func {
    Exp,
    Sin,
    Cos,
    Sqrt,
    Heaviside,
    Delta,
}

impl Func {
    pub fn from_name(name: &str) -> Option<Func> {
        match name {
            "exp" => Some(Func::Exp),
            "sin" => Some(Func::Sin),
            "cos" => Some(Func::Cos),
            "sqrt" => Some(Func::Sqrt),
            "u" | "H" | "Heaviside" | "heaviside" => Some(Func::Heaviside),
            "delta" | "DiracDelta" => Some(Func::Delta),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Func::Exp => "exp",
            Func::Sin => "sin",
            Func::Cos => "cos",
            Func::Sqrt => "sqrt",
            Func::Heaviside => "u",
            Func::Delta => "delta",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Num(BigRational),
    Sym(SymbolId),
    Add(Vec<Expr>),
    Mul(Vec<Expr>),
    Neg(Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Pow(Box<Expr>, Box<Expr>),
    Call(Func, Box<Expr>),
}

/// `cos`/`sin` factor of a time atom.
#[derive(Debug, Clone, PartialEq)]
pub enum Oscillation {
    None,
    Cos(RatFunc),
    Sin(RatFunc),
}

/// Switching factor of a time atom.
#[derive(Debug, Clone, PartialEq)]
pub enum Gate {
    Always,
    /// `u(t - T)`
    Step(RatFunc),
    /// `delta(t - T)`
    Impulse(RatFunc),
}

/// `coeff * t^power * exp(rate*t) * osc * gate`.
#[derive(Debug, Clone, PartialEq)]
pub struct TimeAtom {
    pub coeff: RatFunc,
    pub power: u32,
    pub rate: RatFunc,
    pub osc: Oscillation,
    pub gate: Gate,
}

impl TimeAtom {
    pub fn constant(coeff: RatFunc) -> Self {
        TimeAtom {
            coeff,
            power: 0,
            rate: RatFunc::zero(),
            osc: Oscillation::None,
            gate: Gate::Always,
        }
    }

    fn with_coeff(&self, coeff: RatFunc) -> Self {
        TimeAtom {
            coeff,
            ..self.clone()
        }
    }

    fn same_shape(&self, other: &TimeAtom) -> bool {
        self.power == other.power
            && self.rate == other.rate
            && self.osc == other.osc
            && self.gate == other.gate
    }
}

fn domain_error(message: impl Into<String>) -> CircuitError {
    CircuitError::Domain(message.into())
}

/// `(slope, intercept)` when `r` is affine in `var`.
pub(crate) fn affine_in(r: &RatFunc, var: SymbolId) -> Option<(RatFunc, RatFunc)> {
    if r.denom().contains(var) || r.numer().degree_in(var) > 1 {
        return None;
    }
    let den = RatFunc::from_poly(r.denom().clone());
    let slope = RatFunc::from_poly(r.numer().coeff_of(var, 1)).checked_div(&den)?;
    let intercept = RatFunc::from_poly(r.numer().coeff_of(var, 0)).checked_div(&den)?;
    Some((slope, intercept))
}

impl Expr {
    pub fn num(value: i64) -> Expr {
        Expr::Num(rat(value))
    }

    pub fn sym(id: SymbolId) -> Expr {
        Expr::Sym(id)
    }

    pub fn call(func: Func, arg: Expr) -> Expr {
        Expr::Call(func, Box::new(arg))
    }

    pub fn free_symbols(&self) -> BTreeSet<SymbolId> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut BTreeSet<SymbolId>) {
        match self {
            Expr::Num(_) => {}
            Expr::Sym(id) => {
                out.insert(*id);
            }
            Expr::Add(items) | Expr::Mul(items) => items.iter().for_each(|e| e.collect_symbols(out)),
            Expr::Neg(e) | Expr::Call(_, e) => e.collect_symbols(out),
            Expr::Div(a, b) | Expr::Pow(a, b) => {
                a.collect_symbols(out);
                b.collect_symbols(out);
            }
        }
    }

    pub fn contains(&self, id: SymbolId) -> bool {
        self.free_symbols().contains(&id)
    }

    pub fn has_calls(&self) -> bool {
        match self {
            Expr::Num(_) | Expr::Sym(_) => false,
            Expr::Call(..) => true,
            Expr::Add(items) | Expr::Mul(items) => items.iter().any(Expr::has_calls),
            Expr::Neg(e) => e.has_calls(),
            Expr::Div(a, b) | Expr::Pow(a, b) => a.has_calls() || b.has_calls(),
        }
    }

    /// Integer value of a constant exponent.
    fn integer_exponent(exp: &Expr) -> Result<i32> {
        let value = exp.to_ratfunc()?.constant_value().ok_or_else(|| {
            CircuitError::Algebraic("exponent must be a numeric integer".to_string())
        })?;
        if !value.is_integer() {
            return Err(CircuitError::Algebraic(format!("non-integer exponent {}", value)));
        }
        value
            .to_integer()
            .to_i32()
            .ok_or_else(|| CircuitError::Algebraic("exponent too large".to_string()))
    }

    /// The rational function this expression denotes.
    pub fn to_ratfunc(&self) -> Result<RatFunc> {
        match self {
            Expr::Num(value) => Ok(RatFunc::constant(value.clone())),
            Expr::Sym(id) => Ok(RatFunc::var(*id)),
            Expr::Add(items) => items
                .iter()
                .try_fold(RatFunc::zero(), |acc, e| Ok::<_, CircuitError>(&acc + &e.to_ratfunc()?)),
            Expr::Mul(items) => items
                .iter()
                .try_fold(RatFunc::one(), |acc, e| Ok::<_, CircuitError>(&acc * &e.to_ratfunc()?)),
            Expr::Neg(e) => Ok(-e.to_ratfunc()?),
            Expr::Div(a, b) => a.to_ratfunc()?.try_div(&b.to_ratfunc()?),
            Expr::Pow(base, exp) => {
                let k = Expr::integer_exponent(exp)?;
                base.to_ratfunc()?
                    .pow(k)
                    .ok_or_else(|| CircuitError::Algebraic("zero to a negative power".to_string()))
            }
            Expr::Call(Func::Sqrt, arg) => {
                let inner = arg.to_ratfunc()?;
                inner
                    .sqrt_any()
                    .ok_or_else(|| CircuitError::Algebraic("square root has no rational form".to_string()))
            }
            Expr::Call(func, _) => Err(CircuitError::Algebraic(format!(
                "{}() has no rational form",
                func.name()
            ))),
        }
    }

    /// Expands a function of `t` into a sum of [`TimeAtom`]s.
    pub fn expand_time(&self) -> Result<Vec<TimeAtom>> {
        let atoms = match self {
            Expr::Num(value) => vec![TimeAtom::constant(RatFunc::constant(value.clone()))],
            Expr::Sym(SymbolId::T) => vec![TimeAtom {
                power: 1,
                ..TimeAtom::constant(RatFunc::one())
            }],
            Expr::Sym(SymbolId::S) => return Err(domain_error("s appears in a time-domain expression")),
            Expr::Sym(id) => vec![TimeAtom::constant(RatFunc::var(*id))],
            Expr::Add(items) => {
                let mut out = Vec::new();
                for item in items {
                    out.extend(item.expand_time()?);
                }
                out
            }
            Expr::Mul(items) => {
                let mut acc = vec![TimeAtom::constant(RatFunc::one())];
                for item in items {
                    acc = multiply_atoms(&acc, &item.expand_time()?)?;
                }
                acc
            }
            Expr::Neg(e) => e
                .expand_time()?
                .into_iter()
                .map(|a| a.with_coeff(-&a.coeff))
                .collect(),
            Expr::Div(a, b) => {
                if b.contains(SymbolId::T) {
                    return Err(domain_error("division by a function of t"));
                }
                let divisor = b.to_ratfunc()?;
                let mut out = Vec::new();
                for atom in a.expand_time()? {
                    out.push(atom.with_coeff(atom.coeff.try_div(&divisor)?));
                }
                out
            }
            Expr::Pow(base, exp) => {
                let k = Expr::integer_exponent(exp)?;
                if !base.contains(SymbolId::T) {
                    vec![TimeAtom::constant(self.to_ratfunc()?)]
                } else if k < 0 {
                    return Err(domain_error("negative power of a function of t"));
                } else {
                    let expanded = base.expand_time()?;
                    let mut acc = vec![TimeAtom::constant(RatFunc::one())];
                    for _ in 0..k {
                        acc = multiply_atoms(&acc, &expanded)?;
                    }
                    acc
                }
            }
            Expr::Call(func, arg) => expand_call(*func, arg)?,
        };
        Ok(merge_atoms(atoms))
    }

    /// Expands an s-domain expression into `(delay, F(s))` pairs meaning
    /// `sum F(s) * exp(-s*delay)`.
    pub fn expand_laplace(&self) -> Result<Vec<(RatFunc, RatFunc)>> {
        let terms = match self {
            Expr::Sym(SymbolId::T) => return Err(domain_error("t appears in an s-domain expression")),
            Expr::Num(_) | Expr::Sym(_) => vec![(RatFunc::zero(), self.to_ratfunc()?)],
            Expr::Add(items) => {
                let mut out = Vec::new();
                for item in items {
                    out.extend(item.expand_laplace()?);
                }
                out
            }
            Expr::Mul(items) => {
                let mut acc = vec![(RatFunc::zero(), RatFunc::one())];
                for item in items {
                    let rhs = item.expand_laplace()?;
                    let mut next = Vec::new();
                    for (d1, f1) in &acc {
                        for (d2, f2) in &rhs {
                            next.push((d1 + d2, f1 * f2));
                        }
                    }
                    acc = next;
                }
                acc
            }
            Expr::Neg(e) => e
                .expand_laplace()?
                .into_iter()
                .map(|(d, f)| (d, -f))
                .collect(),
            Expr::Div(a, b) => {
                let divisor = b.expand_laplace()?;
                let divisor = match divisor.as_slice() {
                    [(d, f)] if d.is_zero() => f.clone(),
                    _ => return Err(domain_error("division by a delayed s-domain expression")),
                };
                let mut out = Vec::new();
                for (d, f) in a.expand_laplace()? {
                    out.push((d, f.try_div(&divisor)?));
                }
                out
            }
            Expr::Pow(base, exp) => {
                let k = Expr::integer_exponent(exp)?;
                let expanded = base.expand_laplace()?;
                match expanded.as_slice() {
                    [(d, f)] => {
                        let f = f
                            .pow(k)
                            .ok_or_else(|| CircuitError::Algebraic("zero to a negative power".to_string()))?;
                        vec![(d.scale(&rat(k as i64)), f)]
                    }
                    _ if k >= 0 => {
                        let mut acc = vec![(RatFunc::zero(), RatFunc::one())];
                        for _ in 0..k {
                            let mut next = Vec::new();
                            for (d1, f1) in &acc {
                                for (d2, f2) in &expanded {
                                    next.push((d1 + d2, f1 * f2));
                                }
                            }
                            acc = next;
                        }
                        acc
                    }
                    _ => return Err(domain_error("negative power of a delayed expression")),
                }
            }
            Expr::Call(Func::Exp, arg) => {
                let exponent = arg.to_ratfunc()?;
                if exponent.is_zero() {
                    vec![(RatFunc::zero(), RatFunc::one())]
                } else {
                    match affine_in(&exponent, SymbolId::S) {
                        Some((slope, intercept)) if intercept.is_zero() => vec![(-slope, RatFunc::one())],
                        _ => return Err(domain_error("only exp(-s*T) delays are supported in the s-domain")),
                    }
                }
            }
            Expr::Call(Func::Sqrt, _) => vec![(RatFunc::zero(), self.to_ratfunc()?)],
            Expr::Call(func, _) => {
                return Err(domain_error(format!("{}() is not an s-domain function", func.name())))
            }
        };
        let mut merged: Vec<(RatFunc, RatFunc)> = Vec::new();
        for (d, f) in terms {
            match merged.iter_mut().find(|(md, _)| *md == d) {
                Some(entry) => entry.1 = &entry.1 + &f,
                None => merged.push((d, f)),
            }
        }
        merged.retain(|(_, f)| !f.is_zero());
        Ok(merged)
    }

    pub fn eval(&self, bindings: &Bindings) -> Result<Complex64> {
        let value = match self {
            Expr::Num(v) => Complex64::new(rational_to_f64(v), 0.0),
            Expr::Sym(id) => bindings
                .get(*id)
                .ok_or_else(|| CircuitError::Evaluation(format!("no numeric value for symbol #{}", id.index())))?,
            Expr::Add(items) => items
                .iter()
                .try_fold(Complex64::new(0.0, 0.0), |acc, e| Ok::<_, CircuitError>(acc + e.eval(bindings)?))?,
            Expr::Mul(items) => items
                .iter()
                .try_fold(Complex64::new(1.0, 0.0), |acc, e| Ok::<_, CircuitError>(acc * e.eval(bindings)?))?,
            Expr::Neg(e) => -e.eval(bindings)?,
            Expr::Div(a, b) => a.eval(bindings)? / b.eval(bindings)?,
            Expr::Pow(a, b) => a.eval(bindings)?.powc(b.eval(bindings)?),
            Expr::Call(func, arg) => {
                let x = arg.eval(bindings)?;
                match func {
                    Func::Exp => x.exp(),
                    Func::Sin => x.sin(),
                    Func::Cos => x.cos(),
                    Func::Sqrt => x.sqrt(),
                    Func::Heaviside => Complex64::new(if x.re >= 0.0 { 1.0 } else { 0.0 }, 0.0),
                    Func::Delta => Complex64::new(if x.re == 0.0 { f64::INFINITY } else { 0.0 }, 0.0),
                }
            }
        };
        Ok(value)
    }
}

/// Sums atoms of identical shape and drops zeros.
fn merge_atoms(atoms: Vec<TimeAtom>) -> Vec<TimeAtom> {
    let mut out: Vec<TimeAtom> = Vec::new();
    for atom in atoms {
        if atom.coeff.is_zero() {
            continue;
        }
        match out.iter_mut().find(|a| a.same_shape(&atom)) {
            Some(existing) => existing.coeff = &existing.coeff + &atom.coeff,
            None => out.push(atom),
        }
    }
    out.retain(|a| !a.coeff.is_zero());
    out
}

fn expand_call(func: Func, arg: &Expr) -> Result<Vec<TimeAtom>> {
    if !arg.contains(SymbolId::T) {
        let value = Expr::Call(func, Box::new(arg.clone()));
        return match func {
            Func::Sqrt => Ok(vec![TimeAtom::constant(value.to_ratfunc()?)]),
            Func::Exp | Func::Sin | Func::Cos => {
                let constant = arg.to_ratfunc()?;
                match constant.constant_value() {
                    Some(x) => Ok(vec![TimeAtom::constant(RatFunc::constant(numeric_call(func, &x)))]),
                    None => Err(domain_error(format!(
                        "{}() of a symbolic constant has no rational form",
                        func.name()
                    ))),
                }
            }
            Func::Heaviside | Func::Delta => Err(domain_error(format!(
                "{}() needs an argument in t",
                func.name()
            ))),
        };
    }
    let inner = arg
        .to_ratfunc()
        .map_err(|_| domain_error(format!("argument of {}() must be affine in t", func.name())))?;
    let (slope, intercept) = affine_in(&inner, SymbolId::T)
        .ok_or_else(|| domain_error(format!("argument of {}() must be affine in t", func.name())))?;
    match func {
        Func::Exp => {
            if !intercept.is_zero() {
                let shift = intercept
                    .constant_value()
                    .ok_or_else(|| domain_error("exp(a*t + b) needs a numeric b"))?;
                let scale = RatFunc::constant(numeric_call(Func::Exp, &shift));
                return Ok(exp_atoms(&slope)
                    .into_iter()
                    .map(|a| a.with_coeff(&a.coeff * &scale))
                    .collect());
            }
            Ok(exp_atoms(&slope))
        }
        Func::Sin | Func::Cos => {
            let (c, s) = if intercept.is_zero() {
                (RatFunc::one(), RatFunc::zero())
            } else {
                let phase = intercept
                    .constant_value()
                    .ok_or_else(|| domain_error("sinusoid phase must be numeric"))?;
                (
                    RatFunc::constant(numeric_call(Func::Cos, &phase)),
                    RatFunc::constant(numeric_call(Func::Sin, &phase)),
                )
            };
            let cos_atom = TimeAtom {
                osc: Oscillation::Cos(slope.clone()),
                ..TimeAtom::constant(RatFunc::one())
            };
            let sin_atom = TimeAtom {
                osc: Oscillation::Sin(slope),
                ..TimeAtom::constant(RatFunc::one())
            };
            // sin(x + p) = sin x cos p + cos x sin p; cos(x + p) = cos x cos p - sin x sin p
            let atoms = match func {
                Func::Sin => vec![sin_atom.with_coeff(c.clone()), cos_atom.with_coeff(s)],
                _ => vec![cos_atom.with_coeff(c), sin_atom.with_coeff(-s)],
            };
            Ok(atoms.into_iter().filter_map(normalize_atom).collect())
        }
        Func::Heaviside | Func::Delta => {
            let delay = (-&intercept).try_div(&slope)?;
            let negative_slope = slope
                .constant_value()
                .map(|v| v.is_negative())
                .unwrap_or(false);
            if func == Func::Heaviside {
                let step = TimeAtom {
                    gate: Gate::Step(delay),
                    ..TimeAtom::constant(RatFunc::one())
                };
                if negative_slope {
                    // u(-(t - T)) = 1 - u(t - T)
                    Ok(merge_atoms(vec![
                        TimeAtom::constant(RatFunc::one()),
                        step.with_coeff(RatFunc::from_int(-1)),
                    ]))
                } else {
                    Ok(vec![step])
                }
            } else {
                let weight = match slope.constant_value() {
                    Some(v) => RatFunc::constant(v.abs().recip()),
                    None => slope.recip().unwrap_or_else(RatFunc::one),
                };
                Ok(vec![TimeAtom {
                    gate: Gate::Impulse(delay),
                    ..TimeAtom::constant(weight)
                }])
            }
        }
        Func::Sqrt => Err(domain_error("sqrt() of a function of t")),
    }
}

/// `exp(a*t)`; a complex rate becomes a damped cos/sin pair.
fn exp_atoms(rate: &RatFunc) -> Vec<TimeAtom> {
    let sigma = rate.re();
    let omega = rate.im();
    let base = TimeAtom {
        rate: sigma,
        ..TimeAtom::constant(RatFunc::one())
    };
    if omega.is_zero() {
        return vec![base];
    }
    vec![
        TimeAtom {
            osc: Oscillation::Cos(omega.clone()),
            ..base.clone()
        },
        TimeAtom {
            osc: Oscillation::Sin(omega),
            ..base.with_coeff(RatFunc::j())
        },
    ]
}

fn numeric_call(func: Func, x: &BigRational) -> BigRational {
    let v = rational_to_f64(x);
    let y = match func {
        Func::Exp => v.exp(),
        Func::Sin => v.sin(),
        Func::Cos => v.cos(),
        _ => v,
    };
    if y.abs() < 1e-15 {
        return BigRational::zero();
    }
    if (y - y.round()).abs() < 1e-15 {
        return rat(y.round() as i64);
    }
    rational_from_f64(y)
}

fn half() -> RatFunc {
    RatFunc::constant(BigRational::new(1.into(), 2.into()))
}

fn product_osc(a: &Oscillation, b: &Oscillation) -> Vec<(RatFunc, Oscillation)> {
    use Oscillation::*;
    match (a, b) {
        (None, x) | (x, None) => vec![(RatFunc::one(), x.clone())],
        (Cos(w1), Cos(w2)) => vec![(half(), Cos(w1 - w2)), (half(), Cos(w1 + w2))],
        (Sin(w1), Sin(w2)) => vec![(half(), Cos(w1 - w2)), (-half(), Cos(w1 + w2))],
        (Sin(w1), Cos(w2)) => vec![(half(), Sin(w1 + w2)), (half(), Sin(w1 - w2))],
        (Cos(w1), Sin(w2)) => vec![(half(), Sin(w1 + w2)), (half(), Sin(w2 - w1))],
    }
}

fn product_gate(a: &Gate, b: &Gate) -> Result<Option<Gate>> {
    let later = |t1: &RatFunc, t2: &RatFunc| -> Result<std::cmp::Ordering> {
        if t1 == t2 {
            return Ok(std::cmp::Ordering::Equal);
        }
        match (t1.constant_value(), t2.constant_value()) {
            (Some(x), Some(y)) => Ok(x.cmp(&y)),
            _ => Err(domain_error("cannot order symbolic switching times")),
        }
    };
    use std::cmp::Ordering;
    let gate = match (a, b) {
        (Gate::Always, g) | (g, Gate::Always) => Some(g.clone()),
        (Gate::Step(t1), Gate::Step(t2)) => match later(t1, t2)? {
            Ordering::Less => Some(Gate::Step(t2.clone())),
            _ => Some(Gate::Step(t1.clone())),
        },
        (Gate::Step(ts), Gate::Impulse(ti)) | (Gate::Impulse(ti), Gate::Step(ts)) => match later(ti, ts)? {
            Ordering::Less => None,
            _ => Some(Gate::Impulse(ti.clone())),
        },
        (Gate::Impulse(_), Gate::Impulse(_)) => {
            return Err(domain_error("product of two impulses"));
        }
    };
    Ok(gate)
}

/// Applies `cos(0) = 1`, `sin(0) = 0` and impulse sifting.
fn normalize_atom(mut atom: TimeAtom) -> Option<TimeAtom> {
    match &atom.osc {
        Oscillation::Cos(w) if w.is_zero() => atom.osc = Oscillation::None,
        Oscillation::Sin(w) if w.is_zero() => return None,
        _ => {}
    }
    if atom.coeff.is_zero() {
        return None;
    }
    Some(atom)
}

fn sift(atom: TimeAtom) -> Result<Option<TimeAtom>> {
    let at = match &atom.gate {
        Gate::Impulse(at) => at.clone(),
        _ => return Ok(Some(atom)),
    };
    let mut coeff = atom.coeff.clone();
    if at.is_zero() {
        if atom.power > 0 || matches!(atom.osc, Oscillation::Sin(_)) {
            return Ok(None);
        }
    } else {
        if !atom.rate.is_zero() || atom.osc != Oscillation::None {
            return Err(domain_error(
                "delayed impulse times an exponential or sinusoid has no rational weight",
            ));
        }
        coeff = &coeff * &at.pow(atom.power as i32).unwrap_or_else(RatFunc::zero);
    }
    Ok(Some(TimeAtom {
        coeff,
        power: 0,
        rate: RatFunc::zero(),
        osc: Oscillation::None,
        gate: Gate::Impulse(at),
    }))
}

fn multiply_atoms(lhs: &[TimeAtom], rhs: &[TimeAtom]) -> Result<Vec<TimeAtom>> {
    let mut out = Vec::new();
    for a in lhs {
        for b in rhs {
            let gate = match product_gate(&a.gate, &b.gate)? {
                Some(gate) => gate,
                None => continue,
            };
            for (weight, osc) in product_osc(&a.osc, &b.osc) {
                let atom = TimeAtom {
                    coeff: &(&a.coeff * &b.coeff) * &weight,
                    power: a.power + b.power,
                    rate: &a.rate + &b.rate,
                    osc,
                    gate: gate.clone(),
                };
                if let Some(atom) = normalize_atom(atom) {
                    if let Some(atom) = sift(atom)? {
                        out.push(atom);
                    }
                }
            }
        }
    }
    Ok(merge_atoms(out))
}

impl Render for Expr {
    fn render(&self, ctx: &AnalysisContext) -> String {
        match self {
            Expr::Num(v) => {
                if v.is_negative() {
                    format!("({})", v)
                } else {
                    v.to_string()
                }
            }
            Expr::Sym(id) => ctx.symbol_name(*id),
            Expr::Add(items) => format!(
                "({})",
                items.iter().map(|e| e.render(ctx)).collect::<Vec<_>>().join(" + ")
            ),
            Expr::Mul(items) => items.iter().map(|e| e.render(ctx)).collect::<Vec<_>>().join("*"),
            Expr::Neg(e) => format!("-{}", e.render(ctx)),
            Expr::Div(a, b) => format!("{}/({})", a.render(ctx), b.render(ctx)),
            Expr::Pow(a, b) => format!("({})^{}", a.render(ctx), b.render(ctx)),
            Expr::Call(func, arg) => format!("{}({})", func.name(), arg.render(ctx)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t() -> Expr {
        Expr::Sym(SymbolId::T)
    }

    #[test]
    fn test_to_ratfunc() {
        let mut ctx = AnalysisContext::new();
        let r = ctx.symbol("R");
        let e = Expr::Div(Box::new(Expr::num(1)), Box::new(Expr::Add(vec![Expr::sym(r), Expr::sym(SymbolId::S)])));
        let value = e.to_ratfunc().unwrap();
        assert_eq!(value.render(&ctx), "1/(s + R)");
        assert!(Expr::call(Func::Exp, t()).to_ratfunc().is_err());
    }

    #[test]
    fn test_expand_damped_sinusoid() {
        // 3 * exp(-2t) * sin(5t)
        let e = Expr::Mul(vec![
            Expr::num(3),
            Expr::call(Func::Exp, Expr::Mul(vec![Expr::num(-2), t()])),
            Expr::call(Func::Sin, Expr::Mul(vec![Expr::num(5), t()])),
        ]);
        let atoms = e.expand_time().unwrap();
        assert_eq!(atoms.len(), 1);
        assert_eq!(atoms[0].coeff, RatFunc::from_int(3));
        assert_eq!(atoms[0].rate, RatFunc::from_int(-2));
        assert_eq!(atoms[0].osc, Oscillation::Sin(RatFunc::from_int(5)));
    }

    #[test]
    fn test_expand_sin_squared() {
        // sin(t)^2 = 1/2 - cos(2t)/2
        let e = Expr::Pow(Box::new(Expr::call(Func::Sin, t())), Box::new(Expr::num(2)));
        let atoms = e.expand_time().unwrap();
        assert_eq!(atoms.len(), 2);
        assert!(atoms.contains(&TimeAtom::constant(half())));
        assert!(atoms.contains(&TimeAtom {
            osc: Oscillation::Cos(RatFunc::from_int(2)),
            ..TimeAtom::constant(-half())
        }));
    }

    #[test]
    fn test_expand_delayed_step() {
        // 2*u(t - 3)
        let e = Expr::Mul(vec![
            Expr::num(2),
            Expr::call(Func::Heaviside, Expr::Add(vec![t(), Expr::num(-3)])),
        ]);
        let atoms = e.expand_time().unwrap();
        assert_eq!(atoms[0].gate, Gate::Step(RatFunc::from_int(3)));
        assert_eq!(atoms[0].coeff, RatFunc::from_int(2));
    }

    #[test]
    fn test_impulse_sifting() {
        // t^2 * delta(t - 2) = 4 delta(t - 2)
        let e = Expr::Mul(vec![
            Expr::Pow(Box::new(t()), Box::new(Expr::num(2))),
            Expr::call(Func::Delta, Expr::Add(vec![t(), Expr::num(-2)])),
        ]);
        let atoms = e.expand_time().unwrap();
        assert_eq!(atoms.len(), 1);
        assert_eq!(atoms[0].coeff, RatFunc::from_int(4));
        assert_eq!(atoms[0].power, 0);
    }

    #[test]
    fn test_expand_laplace_delay() {
        let mut ctx = AnalysisContext::new();
        let tau = ctx.symbol("T");
        // exp(-s*T)/s
        let e = Expr::Div(
            Box::new(Expr::call(
                Func::Exp,
                Expr::Neg(Box::new(Expr::Mul(vec![Expr::sym(SymbolId::S), Expr::sym(tau)]))),
            )),
            Box::new(Expr::sym(SymbolId::S)),
        );
        let terms = e.expand_laplace().unwrap();
        assert_eq!(terms.len(), 1);
        assert_eq!(terms[0].0, RatFunc::var(tau));
        assert_eq!(terms[0].1, RatFunc::s().recip().unwrap());
    }

    #[test]
    fn test_mixed_domains_rejected() {
        let e = Expr::Mul(vec![Expr::sym(SymbolId::S), t()]);
        assert!(matches!(e.expand_time(), Err(CircuitError::Domain(_))));
        assert!(matches!(e.expand_laplace(), Err(CircuitError::Domain(_))));
    }
}
