//! Laplace-domain signals with delays, their inverse transforms and spectra.

use log::{debug, warn};
use num_complex::Complex64;
use num_rational::BigRational;
use num_traits::Signed;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::algebra::expr::{Gate, Oscillation, TimeAtom};
use crate::algebra::roots::{find_roots, Root};
use crate::algebra::{laurent_coefficients, rat, residues, Bindings, Expr, Poly, RatFunc, UPoly};
use crate::context::{AnalysisContext, Render};
use crate::error::{CircuitError, Result};
use crate::symbol::SymbolId;

fn factorial(n: u32) -> BigRational {
    (1..=n as i64).fold(rat(1), |acc, k| acc * rat(k))
}

/// `sum_k F_k(s) * exp(-s*T_k)`; `causal` records that the signal is known to be
/// zero for `t < 0`.
#[derive(Debug, Clone, PartialEq)]
pub struct TransientExpr {
    terms: BTreeMap<RatFunc, RatFunc>,
    causal: bool,
}

impl Default for TransientExpr {
    fn default() -> Self {
        TransientExpr::zero()
    }
}

impl TransientExpr {
    pub fn zero() -> Self {
        TransientExpr {
            terms: BTreeMap::new(),
            causal: true,
        }
    }

    pub fn from_laplace(value: RatFunc, causal: bool) -> Self {
        TransientExpr::delayed(RatFunc::zero(), value, causal)
    }

    pub fn delayed(delay: RatFunc, value: RatFunc, causal: bool) -> Self {
        let mut out = TransientExpr {
            terms: BTreeMap::new(),
            causal,
        };
        out.insert(delay, value);
        out
    }

    fn insert(&mut self, delay: RatFunc, value: RatFunc) {
        if value.is_zero() {
            return;
        }
        let sum = match self.terms.remove(&delay) {
            Some(existing) => &existing + &value,
            None => value,
        };
        if !sum.is_zero() {
            self.terms.insert(delay, sum);
        }
    }

    /// Forward (unilateral) Laplace transform of a function of `t`.
    pub fn from_time_expr(expr: &Expr) -> Result<Self> {
        TransientExpr::from_atoms(&expr.expand_time()?)
    }

    pub fn from_atoms(atoms: &[TimeAtom]) -> Result<Self> {
        let mut out = TransientExpr::zero();
        out.causal = atoms.iter().all(|a| !matches!(a.gate, Gate::Always));
        for atom in atoms {
            if let Some((delay, value)) = laplace_atom(atom)? {
                out.insert(delay, value);
            }
        }
        debug!("Laplace transform produced {} delay groups", out.terms.len());
        Ok(out)
    }

    /// An s-domain expression, possibly with `exp(-s*T)` delays. Always causal.
    pub fn from_s_expr(expr: &Expr) -> Result<Self> {
        let mut out = TransientExpr::zero();
        for (delay, value) in expr.expand_laplace()? {
            out.insert(delay, value);
        }
        Ok(out)
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn is_causal(&self) -> bool {
        self.causal
    }

    pub fn with_causal(mut self, causal: bool) -> Self {
        self.causal = causal;
        self
    }

    /// `(delay, F(s))` pairs in delay order.
    pub fn terms(&self) -> impl Iterator<Item = (&RatFunc, &RatFunc)> {
        self.terms.iter()
    }

    pub fn delays(&self) -> Vec<RatFunc> {
        self.terms.keys().cloned().collect()
    }

    pub fn term(&self, delay: &RatFunc) -> RatFunc {
        self.terms.get(delay).cloned().unwrap_or_else(RatFunc::zero)
    }

    /// The undelayed part; the whole value when there are no delays.
    pub fn undelayed(&self) -> RatFunc {
        self.term(&RatFunc::zero())
    }

    pub fn add(&self, other: &TransientExpr) -> TransientExpr {
        let mut out = self.clone();
        out.causal = self.causal && other.causal;
        for (delay, value) in &other.terms {
            out.insert(delay.clone(), value.clone());
        }
        out
    }

    pub fn neg(&self) -> TransientExpr {
        self.scale(&RatFunc::from_int(-1))
    }

    pub fn sub(&self, other: &TransientExpr) -> TransientExpr {
        self.add(&other.neg())
    }

    /// Multiplies every term by an s-domain factor (an immittance or gain).
    pub fn scale(&self, factor: &RatFunc) -> TransientExpr {
        let mut out = TransientExpr {
            terms: BTreeMap::new(),
            causal: self.causal,
        };
        for (delay, value) in &self.terms {
            out.insert(delay.clone(), value * factor);
        }
        out
    }

    pub fn substitute(&self, id: SymbolId, value: &RatFunc) -> TransientExpr {
        let mut out = TransientExpr {
            terms: BTreeMap::new(),
            causal: self.causal,
        };
        for (delay, f) in &self.terms {
            out.insert(delay.substitute(id, value), f.substitute(id, value));
        }
        out
    }

    pub fn contains(&self, id: SymbolId) -> bool {
        self.terms.iter().any(|(d, f)| d.contains(id) || f.contains(id))
    }

    /// `lim_{s->inf} s F(s)` over the undelayed terms.
    pub fn initial_value(&self) -> Result<RatFunc> {
        let f = self.undelayed();
        let s = SymbolId::S;
        let sf = &f * &RatFunc::s();
        let n = sf.numer().degree_in(s);
        let d = sf.denom().degree_in(s);
        if n > d {
            return Err(CircuitError::Domain(
                "initial value is unbounded (impulse at t = 0)".to_string(),
            ));
        }
        if n < d {
            return Ok(RatFunc::zero());
        }
        RatFunc::from_poly(sf.numer().coeff_of(s, n)).try_div(&RatFunc::from_poly(sf.denom().coeff_of(s, d)))
    }

    /// `lim_{s->0} s F(s)`; assumes the remaining poles are in the left half-plane.
    pub fn final_value(&self) -> Result<RatFunc> {
        let total: RatFunc = self.terms.values().cloned().sum();
        let sf = &total * &RatFunc::s();
        sf.try_substitute(SymbolId::S, &RatFunc::zero())
            .map_err(|_| CircuitError::Domain("final value is unbounded".to_string()))
    }

    /// Inverse Laplace transform by partial fractions.
    pub fn inverse(&self) -> Result<TimeExpr> {
        let mut out = TimeExpr {
            terms: Vec::new(),
            conditional: !self.causal,
            approximate: false,
        };
        for (delay, f) in &self.terms {
            let gated = self.causal || !delay.is_zero();
            let part = inverse_laplace(f, delay, gated)?;
            out.approximate |= part.approximate;
            out.terms.extend(part.terms);
        }
        if out.conditional && !out.terms.is_empty() {
            warn!("Transient result is only known for t >= 0");
        }
        Ok(out)
    }

    /// Angular-Fourier spectrum `X(j*omega)`.
    pub fn angular_spectrum(&self) -> Result<Spectrum> {
        if !self.causal {
            warn!("Fourier transform of a signal unknown for t < 0; assuming it is zero there");
        }
        let jw = &RatFunc::j() * &RatFunc::var(SymbolId::OMEGA);
        let mut spectrum = Spectrum::new(SymbolId::OMEGA);
        for (delay, f) in &self.terms {
            let den = UPoly::from_poly(f.denom(), SymbolId::S);
            let num = UPoly::from_poly(f.numer(), SymbolId::S);
            if den.coeff(0).is_zero() {
                if den.coeff(1).is_zero() {
                    return Err(CircuitError::Domain(
                        "repeated pole at s = 0 has no Fourier transform".to_string(),
                    ));
                }
                // A simple pole at s = 0 adds pi * r * delta(omega).
                let r = residues(&num, &den, &RatFunc::zero(), 1)
                    .and_then(|r| r.into_iter().next())
                    .ok_or_else(|| CircuitError::Algebraic("residue at s = 0 failed".to_string()))?;
                spectrum.impulses.push((&r * &RatFunc::var(SymbolId::PI), RatFunc::zero()));
            }
            spectrum
                .continuous
                .push((delay.clone(), f.substitute(SymbolId::S, &jw)));
        }
        Ok(spectrum)
    }
}

/// Laplace transform of one atom, as `(delay, F(s))`.
fn laplace_atom(atom: &TimeAtom) -> Result<Option<(RatFunc, RatFunc)>> {
    let delay = match &atom.gate {
        Gate::Impulse(at) => {
            if is_negative(at) {
                return Ok(None);
            }
            return Ok(Some((at.clone(), atom.coeff.clone())));
        }
        Gate::Step(at) if !at.is_zero() && !is_negative(at) => at.clone(),
        _ => RatFunc::zero(),
    };
    if delay.is_zero() {
        return Ok(Some((RatFunc::zero(), &atom.coeff * &base_transform(atom)?)));
    }
    if !atom.rate.is_zero() || atom.osc != Oscillation::None {
        return Err(CircuitError::Domain(
            "delayed exponential or sinusoid needs an explicit t - T argument".to_string(),
        ));
    }
    // c * t^n * u(t - T) = c * (tau + T)^n * u(tau), tau = t - T
    let n = atom.power;
    let s = RatFunc::s();
    let mut value = RatFunc::zero();
    for k in 0..=n {
        let binom = factorial(n) / (factorial(k) * factorial(n - k));
        let shift = delay.pow((n - k) as i32).unwrap_or_else(RatFunc::zero);
        let term = RatFunc::constant(binom * factorial(k))
            .checked_div(&s.pow(k as i32 + 1).unwrap_or_else(RatFunc::one))
            .unwrap_or_else(RatFunc::zero);
        value = &value + &(&shift * &term);
    }
    Ok(Some((delay, &atom.coeff * &value)))
}

fn is_negative(value: &RatFunc) -> bool {
    value
        .constant_value()
        .map(|v| v.is_negative())
        .unwrap_or(false)
}

/// `L{t^n exp(a t) osc(w t)}` without the coefficient.
fn base_transform(atom: &TimeAtom) -> Result<RatFunc> {
    let n = atom.power;
    let s = RatFunc::s();
    let shifted = &s - &atom.rate;
    let kernel = |x: &RatFunc| -> Result<RatFunc> {
        let power = x
            .pow(n as i32 + 1)
            .ok_or_else(|| CircuitError::Algebraic("degenerate transform".to_string()))?;
        RatFunc::constant(factorial(n)).try_div(&power)
    };
    match &atom.osc {
        Oscillation::None => kernel(&shifted),
        Oscillation::Cos(w) | Oscillation::Sin(w) => {
            let jw = &RatFunc::j() * w;
            let minus = kernel(&(&shifted - &jw))?;
            let plus = kernel(&(&shifted + &jw))?;
            let half = RatFunc::constant(crate::algebra::roots::half());
            if matches!(atom.osc, Oscillation::Cos(_)) {
                Ok(&half * &(&minus + &plus))
            } else {
                // (minus - plus) / (2j) = -j/2 * (minus - plus)
                Ok(&(&half * &-RatFunc::j()) * &(&minus - &plus))
            }
        }
    }
}

/// Coefficient that is exact or a numeric multiple of a symbolic factor.
#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Exact(RatFunc),
    Approx { factor: RatFunc, value: f64 },
}

impl Scalar {
    pub fn approx(value: f64) -> Self {
        Scalar::Approx {
            factor: RatFunc::one(),
            value,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Scalar::Exact(v) => v.is_zero(),
            Scalar::Approx { factor, value } => factor.is_zero() || *value == 0.0,
        }
    }

    pub fn is_exact(&self) -> bool {
        matches!(self, Scalar::Exact(_))
    }

    pub fn eval(&self, bindings: &Bindings) -> Result<Complex64> {
        match self {
            Scalar::Exact(v) => v.eval(bindings),
            Scalar::Approx { factor, value } => Ok(factor.eval(bindings)? * *value),
        }
    }

    fn render(&self, ctx: &AnalysisContext) -> String {
        match self {
            Scalar::Exact(v) => v.render(ctx),
            Scalar::Approx { factor, value } => {
                if factor.is_one() {
                    format!("{:.6}", value)
                } else {
                    format!("{:.6}*{}", value, paren(factor.render(ctx)))
                }
            }
        }
    }
}

fn paren(text: String) -> String {
    if text.contains(' ') || text.contains('/') {
        format!("({})", text)
    } else {
        text
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Wave {
    /// No oscillation.
    Flat,
    Cos,
    Sin,
}

/// One term of an inverse transform.
#[derive(Debug, Clone, PartialEq)]
pub enum TimeTerm {
    /// `coeff * tau^power * exp(sigma*tau) * wave(omega*tau)`, `tau = t - delay`.
    Mode {
        coeff: Scalar,
        power: u32,
        sigma: Scalar,
        omega: Scalar,
        wave: Wave,
        delay: RatFunc,
        /// Multiplied by `u(tau)`.
        gated: bool,
    },
    /// Inverse of `(a*s + b) / (s^2 + p*s + q)` when the quadratic has no
    /// rational roots.
    Damped {
        a: RatFunc,
        b: RatFunc,
        p: RatFunc,
        q: RatFunc,
        delay: RatFunc,
        gated: bool,
    },
    /// `coeff * delta^(order)(t - delay)`.
    Impulse {
        coeff: RatFunc,
        order: u32,
        delay: RatFunc,
    },
}

impl TimeTerm {
    pub fn constant(value: RatFunc) -> Self {
        TimeTerm::Mode {
            coeff: Scalar::Exact(value),
            power: 0,
            sigma: Scalar::Exact(RatFunc::zero()),
            omega: Scalar::Exact(RatFunc::zero()),
            wave: Wave::Flat,
            delay: RatFunc::zero(),
            gated: false,
        }
    }

    pub fn sinusoid(coeff: RatFunc, omega: RatFunc, wave: Wave) -> Self {
        TimeTerm::Mode {
            coeff: Scalar::Exact(coeff),
            power: 0,
            sigma: Scalar::Exact(RatFunc::zero()),
            omega: Scalar::Exact(omega),
            wave,
            delay: RatFunc::zero(),
            gated: false,
        }
    }

    pub fn eval(&self, t: f64, bindings: &Bindings) -> Result<f64> {
        let tau_of = |delay: &RatFunc| -> Result<f64> { Ok(t - delay.eval(bindings)?.re) };
        let value = match self {
            TimeTerm::Mode {
                coeff,
                power,
                sigma,
                omega,
                wave,
                delay,
                gated,
            } => {
                let tau = tau_of(delay)?;
                if *gated && tau < 0.0 {
                    return Ok(0.0);
                }
                let c = coeff.eval(bindings)?;
                let envelope = tau.powi(*power as i32) * (sigma.eval(bindings)?.re * tau).exp();
                let w = omega.eval(bindings)?.re;
                let shape = match wave {
                    Wave::Flat => 1.0,
                    Wave::Cos => (w * tau).cos(),
                    Wave::Sin => (w * tau).sin(),
                };
                (c * envelope * shape).re
            }
            TimeTerm::Damped {
                a,
                b,
                p,
                q,
                delay,
                gated,
            } => {
                let tau = tau_of(delay)?;
                if *gated && tau < 0.0 {
                    return Ok(0.0);
                }
                let a = a.eval(bindings)?;
                let b = b.eval(bindings)?;
                let p = p.eval(bindings)?;
                let q = q.eval(bindings)?;
                let alpha = -p / 2.0;
                let beta = (q - p * p / 4.0).sqrt();
                let sin_over_beta = if beta.norm() < 1e-12 {
                    Complex64::new(tau, 0.0)
                } else {
                    (beta * tau).sin() / beta
                };
                ((alpha * tau).exp() * (a * (beta * tau).cos() + (b + a * alpha) * sin_over_beta)).re
            }
            TimeTerm::Impulse { coeff, delay, .. } => {
                let tau = tau_of(delay)?;
                if tau == 0.0 && !coeff.is_zero() {
                    f64::INFINITY
                } else {
                    0.0
                }
            }
        };
        Ok(value)
    }
}

impl Render for TimeTerm {
    fn render(&self, ctx: &AnalysisContext) -> String {
        let tau = |delay: &RatFunc| -> String {
            if delay.is_zero() {
                ctx.symbol_name(SymbolId::T)
            } else {
                format!("(t - {})", paren(delay.render(ctx)))
            }
        };
        let gate = |delay: &RatFunc, gated: bool| -> Option<String> {
            if gated {
                Some(format!("u({})", tau(delay).trim_start_matches('(').trim_end_matches(')')))
            } else {
                None
            }
        };
        let times = |x: &Scalar, var: &str| -> String {
            match x {
                Scalar::Exact(v) if v.is_one() => var.to_string(),
                Scalar::Exact(v) if v == &RatFunc::from_int(-1) => format!("-{}", var),
                _ => format!("{}*{}", paren(x.render(ctx)), var),
            }
        };
        let mut factors = Vec::new();
        match self {
            TimeTerm::Mode {
                coeff,
                power,
                sigma,
                omega,
                wave,
                delay,
                gated,
            } => {
                let t = tau(delay);
                match coeff {
                    Scalar::Exact(v) if v.is_one() => {}
                    _ => factors.push(paren(coeff.render(ctx))),
                }
                match power {
                    0 => {}
                    1 => factors.push(t.clone()),
                    n => factors.push(format!("{}^{}", t, n)),
                }
                if !sigma.is_zero() {
                    factors.push(format!("exp({})", times(sigma, &t)));
                }
                match wave {
                    Wave::Flat => {}
                    Wave::Cos => factors.push(format!("cos({})", times(omega, &t))),
                    Wave::Sin => factors.push(format!("sin({})", times(omega, &t))),
                }
                factors.extend(gate(delay, *gated));
            }
            TimeTerm::Damped {
                a,
                b,
                p,
                q,
                delay,
                gated,
            } => {
                let t = tau(delay);
                let alpha = -&p.scale(&crate::algebra::roots::half());
                let beta_sq = q - &(&alpha * &alpha);
                let beta = format!("sqrt({})", beta_sq.render(ctx));
                let k = b + &(a * &alpha);
                if !alpha.is_zero() {
                    factors.push(format!("exp({})", times(&Scalar::Exact(alpha.clone()), &t)));
                }
                let mut parts = Vec::new();
                if !a.is_zero() {
                    parts.push(format!("{}*cos({}*{})", paren(a.render(ctx)), beta, t));
                }
                if !k.is_zero() {
                    parts.push(format!("{}*sin({}*{})/{}", paren(k.render(ctx)), beta, t, beta));
                }
                factors.push(format!("({})", parts.join(" + ")));
                factors.extend(gate(delay, *gated));
            }
            TimeTerm::Impulse { coeff, order, delay } => {
                if !coeff.is_one() {
                    factors.push(paren(coeff.render(ctx)));
                }
                let arg = tau(delay);
                let arg = arg.trim_start_matches('(').trim_end_matches(')');
                match order {
                    0 => factors.push(format!("delta({})", arg)),
                    n => factors.push(format!("delta^({})({})", n, arg)),
                }
            }
        }
        if factors.is_empty() {
            "1".to_string()
        } else {
            factors.join("*")
        }
    }
}

/// Time-domain result of an inverse transform.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TimeExpr {
    pub terms: Vec<TimeTerm>,
    /// Only known for `t >= 0`.
    pub conditional: bool,
    /// Contains numerically approximated roots.
    pub approximate: bool,
}

impl TimeExpr {
    pub fn zero() -> Self {
        TimeExpr::default()
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn push(&mut self, term: TimeTerm) {
        self.terms.push(term);
    }

    pub fn add(&self, other: &TimeExpr) -> TimeExpr {
        let mut terms = self.terms.clone();
        terms.extend(other.terms.iter().cloned());
        TimeExpr {
            terms,
            conditional: self.conditional || other.conditional,
            approximate: self.approximate || other.approximate,
        }
    }

    /// Value at time `t`; fails before `t = 0` when the result is conditional.
    pub fn eval(&self, t: f64, bindings: &Bindings) -> Result<f64> {
        if self.conditional && t < 0.0 {
            return Err(CircuitError::Domain("result is only known for t >= 0".to_string()));
        }
        self.terms
            .iter()
            .try_fold(0.0, |acc, term| Ok(acc + term.eval(t, bindings)?))
    }

    pub fn eval_grid(&self, times: &ndarray::Array1<f64>, bindings: &Bindings) -> Result<ndarray::Array1<f64>> {
        let values = times
            .iter()
            .map(|t| self.eval(*t, bindings))
            .collect::<Result<Vec<_>>>()?;
        Ok(ndarray::Array1::from_vec(values))
    }
}

impl Render for TimeExpr {
    fn render(&self, ctx: &AnalysisContext) -> String {
        if self.terms.is_empty() {
            return "0".to_string();
        }
        let mut out = String::new();
        for (i, term) in self.terms.iter().enumerate() {
            let text = term.render(ctx);
            if i == 0 {
                out.push_str(&text);
            } else if let Some(rest) = text.strip_prefix('-') {
                out.push_str(" - ");
                out.push_str(rest);
            } else {
                out.push_str(" + ");
                out.push_str(&text);
            }
        }
        if self.conditional {
            out.push_str("  (t >= 0)");
        }
        if self.approximate {
            out.push_str("  [numeric]");
        }
        out
    }
}

/// Splits a polynomial into symbolic weights times polynomials in `var` with
/// numeric coefficients.
fn split_weights(p: &Poly, var: SymbolId) -> Vec<(RatFunc, UPoly<Complex64>)> {
    let mut groups: BTreeMap<Poly, Vec<Complex64>> = BTreeMap::new();
    for (k, coeff) in p.coeffs_in(var).iter().enumerate() {
        for (m, c) in coeff.terms() {
            let weight = Poly::term(m.clone(), rat(1));
            let slot = groups.entry(weight).or_default();
            if slot.len() <= k {
                slot.resize(k + 1, Complex64::new(0.0, 0.0));
            }
            slot[k] += Complex64::new(crate::algebra::rational_to_f64(c), 0.0);
        }
    }
    groups
        .into_iter()
        .map(|(w, coeffs)| (RatFunc::from_poly(w), UPoly::new(coeffs)))
        .collect()
}

fn positive_imag(root: &RatFunc) -> bool {
    root.im()
        .numer()
        .leading()
        .map(|(_, c)| c.is_positive())
        .unwrap_or(false)
}

/// Inverse Laplace transform of one rational function of `s`.
fn inverse_laplace(f: &RatFunc, delay: &RatFunc, gated: bool) -> Result<TimeExpr> {
    let s = SymbolId::S;
    let mut out = TimeExpr::zero();
    if f.is_zero() {
        return Ok(out);
    }
    let num = UPoly::from_poly(f.numer(), s);
    let den = UPoly::from_poly(f.denom(), s);
    let (quot, rem) = num
        .div_rem(&den)
        .ok_or_else(|| CircuitError::Algebraic("zero denominator".to_string()))?;
    for (order, c) in quot.coeffs().iter().enumerate() {
        if !c.is_zero() {
            out.push(TimeTerm::Impulse {
                coeff: c.clone(),
                order: order as u32,
                delay: delay.clone(),
            });
        }
    }
    if rem.is_zero() {
        return Ok(out);
    }
    let roots = find_roots(&den)?;
    out.approximate = roots.approximate;
    for (root, mult) in &roots.roots {
        match root {
            Root::Exact(r) => {
                // The conjugate root carries the other half of the pair.
                if r.has_j() && !positive_imag(r) {
                    continue;
                }
                let cs = residues(&rem, &den, r, *mult)
                    .ok_or_else(|| CircuitError::Algebraic("residue computation failed".to_string()))?;
                for (k, c) in cs.into_iter().enumerate() {
                    let c = c.scale(&factorial(k as u32).recip());
                    exact_mode(&mut out, &c, r, k as u32, delay, gated);
                }
            }
            Root::Quadratic { p, q } => {
                if *mult > 1 {
                    return Err(CircuitError::Algebraic(
                        "repeated irreducible quadratic factor with symbolic roots".to_string(),
                    ));
                }
                let (a, b) = quadratic_numerator(&rem, &den, p, q)?;
                out.push(TimeTerm::Damped {
                    a,
                    b,
                    p: p.clone(),
                    q: q.clone(),
                    delay: delay.clone(),
                    gated,
                });
            }
            Root::Approx(z) => {
                if z.im < 0.0 {
                    continue;
                }
                let den_c = den
                    .to_complex()
                    .ok_or_else(|| CircuitError::Algebraic("numeric roots of a symbolic polynomial".to_string()))?;
                let (rest, _) = den_c
                    .div_rem(&UPoly::linear(*z).pow(*mult))
                    .ok_or_else(|| CircuitError::Algebraic("numeric deflation failed".to_string()))?;
                for (weight, part) in split_weights(f.numer(), s) {
                    let part_rem = match part.div_rem(&den_c) {
                        Some((_, r)) => r,
                        None => part,
                    };
                    let cs = laurent_coefficients(&part_rem, &rest, z, *mult)
                        .ok_or_else(|| CircuitError::Algebraic("numeric residue failed".to_string()))?;
                    for (k, c) in cs.into_iter().enumerate() {
                        let c = c / crate::algebra::rational_to_f64(&factorial(k as u32));
                        approx_mode(&mut out, &weight, c, *z, k as u32, delay, gated);
                    }
                }
            }
        }
    }
    Ok(out)
}

fn exact_mode(out: &mut TimeExpr, c: &RatFunc, r: &RatFunc, power: u32, delay: &RatFunc, gated: bool) {
    if c.is_zero() {
        return;
    }
    let mode = |coeff: RatFunc, omega: RatFunc, wave: Wave| TimeTerm::Mode {
        coeff: Scalar::Exact(coeff),
        power,
        sigma: Scalar::Exact(r.re()),
        omega: Scalar::Exact(omega),
        wave,
        delay: delay.clone(),
        gated,
    };
    if !r.has_j() {
        out.push(mode(c.clone(), RatFunc::zero(), Wave::Flat));
        return;
    }
    // c e^{rt} + conj(c) e^{conj(r) t} = 2 e^{sigma t} (Re c cos(w t) - Im c sin(w t))
    let omega = r.im();
    let two = RatFunc::from_int(2);
    let re = &two * &c.re();
    let im = &two * &c.im();
    if !re.is_zero() {
        out.push(mode(re, omega.clone(), Wave::Cos));
    }
    if !im.is_zero() {
        out.push(mode(-im, omega, Wave::Sin));
    }
}

fn approx_mode(
    out: &mut TimeExpr,
    weight: &RatFunc,
    c: Complex64,
    z: Complex64,
    power: u32,
    delay: &RatFunc,
    gated: bool,
) {
    let mode = |value: f64, wave: Wave| TimeTerm::Mode {
        coeff: Scalar::Approx {
            factor: weight.clone(),
            value,
        },
        power,
        sigma: Scalar::approx(z.re),
        omega: Scalar::approx(z.im),
        wave,
        delay: delay.clone(),
        gated,
    };
    if z.im == 0.0 {
        if c.re != 0.0 {
            out.push(mode(c.re, Wave::Flat));
        }
        return;
    }
    if c.re != 0.0 {
        out.push(mode(2.0 * c.re, Wave::Cos));
    }
    if c.im != 0.0 {
        out.push(mode(-2.0 * c.im, Wave::Sin));
    }
}

/// `(a, b)` with `num/den = (a s + b)/(s^2 + p s + q) + ...`.
fn quadratic_numerator(
    num: &UPoly<RatFunc>,
    den: &UPoly<RatFunc>,
    p: &RatFunc,
    q: &RatFunc,
) -> Result<(RatFunc, RatFunc)> {
    let quad = UPoly::new(vec![q.clone(), p.clone(), RatFunc::one()]);
    let fail = || CircuitError::Algebraic("partial fraction over a quadratic failed".to_string());
    let (rest, _) = den.div_rem(&quad).ok_or_else(fail)?;
    let (_, e) = rest.div_rem(&quad).ok_or_else(fail)?;
    let (_, r) = num.div_rem(&quad).ok_or_else(fail)?;
    let (e0, e1) = (e.coeff(0), e.coeff(1));
    let (r0, r1) = (r.coeff(0), r.coeff(1));
    // (e1 s + e0)(x s + y) = 1 mod s^2 + p s + q
    let det = &(&(&e0 - &(p * &e1)) * &e0) + &(&(q * &e1) * &e1);
    let x = (-&e1).try_div(&det)?;
    let y = (&e0 - &(p * &e1)).try_div(&det)?;
    let a = &(&(&r1 * &y) + &(&r0 * &x)) - &(&(p * &r1) * &x);
    let b = &(&r0 * &y) - &(&(q * &r1) * &x);
    Ok((a, b))
}

/// Continuous spectrum plus impulses `weight * delta(var - at)`.
#[derive(Debug, Clone, PartialEq)]
pub struct Spectrum {
    pub variable: SymbolId,
    /// `(delay, X)` meaning `X * exp(-j*var*delay)` (angular) terms.
    pub continuous: Vec<(RatFunc, RatFunc)>,
    pub impulses: Vec<(RatFunc, RatFunc)>,
}

impl Spectrum {
    pub fn new(variable: SymbolId) -> Self {
        Spectrum {
            variable,
            continuous: Vec::new(),
            impulses: Vec::new(),
        }
    }

    pub fn is_zero(&self) -> bool {
        self.continuous.iter().all(|(_, x)| x.is_zero()) && self.impulses.iter().all(|(w, _)| w.is_zero())
    }

    pub fn add(&self, other: &Spectrum) -> Spectrum {
        let mut out = self.clone();
        for (delay, x) in &other.continuous {
            match out.continuous.iter_mut().find(|(d, _)| d == delay) {
                Some(entry) => entry.1 = &entry.1 + x,
                None => out.continuous.push((delay.clone(), x.clone())),
            }
        }
        for (w, at) in &other.impulses {
            match out.impulses.iter_mut().find(|(_, a)| a == at) {
                Some(entry) => entry.0 = &entry.0 + w,
                None => out.impulses.push((w.clone(), at.clone())),
            }
        }
        out.impulses.retain(|(w, _)| !w.is_zero());
        out
    }

    /// `2*pi*V*delta(omega)` for a constant `V`.
    pub fn dc(value: &RatFunc) -> Spectrum {
        let mut out = Spectrum::new(SymbolId::OMEGA);
        let two_pi = &RatFunc::from_int(2) * &RatFunc::var(SymbolId::PI);
        out.impulses.push((&two_pi * value, RatFunc::zero()));
        out
    }

    /// `pi*(P delta(omega - w0) + conj(P) delta(omega + w0))` for the phasor `P`.
    pub fn ac(phasor: &RatFunc, omega: &RatFunc) -> Spectrum {
        let mut out = Spectrum::new(SymbolId::OMEGA);
        let pi = RatFunc::var(SymbolId::PI);
        out.impulses.push((&pi * phasor, omega.clone()));
        out.impulses.push((&pi * &phasor.conj(), -omega));
        out
    }

    /// Angular frequency to hertz: `omega = 2*pi*f`,
    /// `delta(omega - w0) = delta(f - w0/(2 pi)) / (2 pi)`.
    pub fn to_hertz(&self) -> Result<Spectrum> {
        if self.variable == SymbolId::F {
            return Ok(self.clone());
        }
        let two_pi = &RatFunc::from_int(2) * &RatFunc::var(SymbolId::PI);
        let omega = &two_pi * &RatFunc::var(SymbolId::F);
        let mut out = Spectrum::new(SymbolId::F);
        for (delay, x) in &self.continuous {
            out.continuous.push((delay.clone(), x.substitute(SymbolId::OMEGA, &omega)));
        }
        for (w, at) in &self.impulses {
            out.impulses.push((w.try_div(&two_pi)?, at.try_div(&two_pi)?));
        }
        Ok(out)
    }
}

impl Render for Spectrum {
    fn render(&self, ctx: &AnalysisContext) -> String {
        let var = ctx.symbol_name(self.variable);
        let mut parts = Vec::new();
        for (delay, x) in &self.continuous {
            if x.is_zero() {
                continue;
            }
            let scale = if self.variable == SymbolId::F { "2*pi*" } else { "" };
            if delay.is_zero() {
                parts.push(x.render(ctx));
            } else {
                parts.push(format!(
                    "{}*exp(-j*{}{}*{})",
                    paren(x.render(ctx)),
                    scale,
                    var,
                    paren(delay.render(ctx))
                ));
            }
        }
        for (w, at) in &self.impulses {
            let arg = if at.is_zero() {
                var.clone()
            } else if at.constant_value().map(|v| v.is_negative()).unwrap_or(false)
                || at.numer().leading().map(|(_, c)| c.is_negative()).unwrap_or(false)
            {
                format!("{} + {}", var, (-at).render(ctx))
            } else {
                format!("{} - {}", var, at.render(ctx))
            };
            parts.push(format!("{}*delta({})", paren(w.render(ctx)), arg));
        }
        if parts.is_empty() {
            "0".to_string()
        } else {
            parts.join(" + ")
        }
    }
}

impl Render for TransientExpr {
    fn render(&self, ctx: &AnalysisContext) -> String {
        if self.terms.is_empty() {
            return "0".to_string();
        }
        self.terms
            .iter()
            .map(|(delay, f)| {
                if delay.is_zero() {
                    f.render(ctx)
                } else {
                    format!("{}*exp(-s*{})", paren(f.render(ctx)), paren(delay.render(ctx)))
                }
            })
            .collect::<Vec<_>>()
            .join(" + ")
    }
}
