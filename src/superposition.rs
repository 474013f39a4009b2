//! Per-domain results joined into one value.
//!
//! A [`Superposition`] keeps at most one dc value, one Laplace-domain transient,
//! one phasor per ac angular frequency and one amplitude spectral density per noise
//! id. Noise densities of different ids are never merged: they only collapse into
//! a root-sum-square when [`Superposition::noise_amplitude`] is asked for, so that
//! subtracting the same id cancels exactly.

use log::warn;
use num_complex::Complex64;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::algebra::{Bindings, RatFunc};
use crate::component::Signal;
use crate::context::{AnalysisContext, Render};
use crate::domain::Domain;
use crate::error::{CircuitError, Result};
use crate::symbol::NoiseId;
use crate::transform::{Spectrum, TimeExpr, TimeTerm, TransientExpr, Wave};

/// Physical meaning of a value; arithmetic is only defined within one quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Quantity {
    Voltage,
    Current,
    Impedance,
    Admittance,
    TransferFunction,
    /// Dimensionless or unknown; combines with anything.
    Undefined,
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = match self {
            Quantity::Voltage => "voltage",
            Quantity::Current => "current",
            Quantity::Impedance => "impedance",
            Quantity::Admittance => "admittance",
            Quantity::TransferFunction => "transfer function",
            Quantity::Undefined => "undefined",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Superposition {
    pub quantity: Quantity,
    dc: RatFunc,
    transient: TransientExpr,
    ac: BTreeMap<RatFunc, RatFunc>,
    noise: BTreeMap<NoiseId, RatFunc>,
}

/// Root-sum-square of the noise densities.
#[derive(Debug, Clone, PartialEq)]
pub enum NoiseAmplitude {
    Exact(RatFunc),
    /// `sqrt(value)` with no exact root.
    Sqrt(RatFunc),
}

impl Render for NoiseAmplitude {
    fn render(&self, ctx: &AnalysisContext) -> String {
        match self {
            NoiseAmplitude::Exact(v) => v.render(ctx),
            NoiseAmplitude::Sqrt(v) => format!("sqrt({})", v.render(ctx)),
        }
    }
}

impl Superposition {
    pub fn new(quantity: Quantity) -> Self {
        Superposition {
            quantity,
            dc: RatFunc::zero(),
            transient: TransientExpr::zero(),
            ac: BTreeMap::new(),
            noise: BTreeMap::new(),
        }
    }

    /// Sums `(domain, value)` contributions; contributions of one domain are added.
    pub fn combine(quantity: Quantity, parts: impl IntoIterator<Item = (Domain, TransientExpr)>) -> Self {
        let mut out = Superposition::new(quantity);
        for (domain, value) in parts {
            out.push(&domain, &value);
        }
        out
    }

    pub fn from_dc(quantity: Quantity, value: RatFunc) -> Self {
        Superposition::combine(quantity, [(Domain::Dc, TransientExpr::from_laplace(value, false))])
    }

    pub fn from_signal(quantity: Quantity, signal: &Signal) -> Self {
        Superposition::combine(quantity, [(signal.domain(), signal.excitation())])
    }

    /// Adds one contribution. Dc, ac and noise take the undelayed part of `value`.
    pub fn push(&mut self, domain: &Domain, value: &TransientExpr) {
        match domain {
            Domain::Dc => self.dc = &self.dc + &value.undelayed(),
            Domain::Transient => self.transient = self.transient.add(value),
            Domain::Ac(omega) => {
                let sum = &self.ac.get(omega).cloned().unwrap_or_else(RatFunc::zero) + &value.undelayed();
                if sum.is_zero() {
                    self.ac.remove(omega);
                } else {
                    self.ac.insert(omega.clone(), sum);
                }
            }
            Domain::Noise(nid) => {
                let sum = &self.noise.get(nid).cloned().unwrap_or_else(RatFunc::zero) + &value.undelayed();
                if sum.is_zero() {
                    self.noise.remove(nid);
                } else {
                    self.noise.insert(*nid, sum);
                }
            }
        }
    }

    pub fn with_quantity(mut self, quantity: Quantity) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn dc(&self) -> &RatFunc {
        &self.dc
    }

    pub fn transient(&self) -> &TransientExpr {
        &self.transient
    }

    pub fn ac(&self) -> &BTreeMap<RatFunc, RatFunc> {
        &self.ac
    }

    pub fn noise(&self) -> &BTreeMap<NoiseId, RatFunc> {
        &self.noise
    }

    pub fn is_zero(&self) -> bool {
        self.dc.is_zero() && self.transient.is_zero() && self.ac.is_empty() && self.noise.is_empty()
    }

    /// Domains holding a non-zero value.
    pub fn domains(&self) -> Vec<Domain> {
        let mut out = Vec::new();
        if !self.dc.is_zero() {
            out.push(Domain::Dc);
        }
        out.extend(self.ac.keys().map(|w| Domain::Ac(w.clone())));
        if !self.transient.is_zero() {
            out.push(Domain::Transient);
        }
        out.extend(self.noise.keys().map(|n| Domain::Noise(*n)));
        out
    }

    /// Parts as `(domain, value)` pairs, the inverse of [`Superposition::combine`].
    pub fn parts(&self) -> Vec<(Domain, TransientExpr)> {
        let mut out = Vec::new();
        if !self.dc.is_zero() {
            out.push((Domain::Dc, TransientExpr::from_laplace(self.dc.clone(), false)));
        }
        for (w, p) in &self.ac {
            out.push((Domain::Ac(w.clone()), TransientExpr::from_laplace(p.clone(), false)));
        }
        if !self.transient.is_zero() {
            out.push((Domain::Transient, self.transient.clone()));
        }
        for (n, v) in &self.noise {
            out.push((Domain::Noise(*n), TransientExpr::from_laplace(v.clone(), false)));
        }
        out
    }

    /// The plain value when only dc or only the transient part is present.
    pub fn as_scalar(&self) -> Option<&RatFunc> {
        let single = self.ac.is_empty() && self.noise.is_empty();
        if single && self.transient.is_zero() {
            return Some(&self.dc);
        }
        if single && self.dc.is_zero() && self.transient.delays().iter().all(|d| d.is_zero()) {
            return self.transient.terms().next().map(|(_, v)| v);
        }
        None
    }

    fn compatible(&self, other: &Superposition) -> Result<Quantity> {
        match (self.quantity, other.quantity) {
            (a, b) if a == b => Ok(a),
            (Quantity::Undefined, b) => Ok(b),
            (a, Quantity::Undefined) => Ok(a),
            (a, b) => Err(CircuitError::QuantityMismatch {
                left: a.to_string(),
                right: b.to_string(),
            }),
        }
    }

    pub fn checked_add(&self, other: &Superposition) -> Result<Superposition> {
        let quantity = self.compatible(other)?;
        let mut out = self.clone().with_quantity(quantity);
        for (domain, value) in other.parts() {
            out.push(&domain, &value);
        }
        Ok(out)
    }

    pub fn checked_sub(&self, other: &Superposition) -> Result<Superposition> {
        self.checked_add(&other.neg())
    }

    pub fn neg(&self) -> Superposition {
        self.scale(&RatFunc::from_int(-1))
    }

    /// Multiplies every part, noise included, so scaled copies of one noise source
    /// stay correlated.
    pub fn scale(&self, factor: &RatFunc) -> Superposition {
        let mut out = Superposition::new(self.quantity);
        for (domain, value) in self.parts() {
            out.push(&domain, &value.scale(factor));
        }
        out
    }

    pub fn substitute(&self, name: &str, value: &RatFunc, ctx: &AnalysisContext) -> Superposition {
        let id = match ctx.registry.lookup(name) {
            Some(id) => id,
            None => return self.clone(),
        };
        let mut out = Superposition::new(self.quantity);
        for (domain, part) in self.parts() {
            let domain = match domain {
                Domain::Ac(w) => Domain::Ac(w.substitute(id, value)),
                other => other,
            };
            out.push(&domain, &part.substitute(id, value));
        }
        out
    }

    /// `sqrt(sum |N_k|^2)` over the noise ids, treating them as independent.
    pub fn noise_amplitude(&self, ctx: &AnalysisContext) -> NoiseAmplitude {
        let power: RatFunc = self.noise.values().map(RatFunc::norm_sqr).sum();
        match power.try_sqrt(&ctx.registry) {
            Some(root) => NoiseAmplitude::Exact(root),
            None => NoiseAmplitude::Sqrt(power),
        }
    }

    /// Time-domain view. Noise has no time-domain form and is left out.
    pub fn time(&self) -> Result<TimeExpr> {
        self.warn_noise("time");
        let mut out = TimeExpr::zero();
        if !self.dc.is_zero() {
            out.push(TimeTerm::constant(self.dc.clone()));
        }
        for (omega, phasor) in &self.ac {
            // Re{P exp(jwt)} = Re(P) cos(wt) - Im(P) sin(wt)
            let re = phasor.re();
            let im = phasor.im();
            if !re.is_zero() {
                out.push(TimeTerm::sinusoid(re, omega.clone(), Wave::Cos));
            }
            if !im.is_zero() {
                out.push(TimeTerm::sinusoid(-im, omega.clone(), Wave::Sin));
            }
        }
        Ok(out.add(&self.transient.inverse()?))
    }

    /// Laplace-domain view of every deterministic part, observed from `t = 0`.
    pub fn laplace(&self) -> Result<TransientExpr> {
        self.warn_noise("Laplace");
        let mut out = self.transient.clone();
        let mut steady = Vec::new();
        if !self.dc.is_zero() {
            steady.push(Signal::Dc(self.dc.clone()));
        }
        for (omega, phasor) in &self.ac {
            steady.push(Signal::Ac {
                phasor: phasor.clone(),
                omega: omega.clone(),
            });
        }
        for signal in steady {
            let part = signal
                .to_laplace()
                .ok_or_else(|| CircuitError::Domain("steady-state part has no Laplace transform".to_string()))?;
            out = out.add(&part);
        }
        Ok(out)
    }

    /// Spectrum over angular frequency: impulses for dc and ac, the transient's
    /// transform, and each noise density at its own id.
    pub fn angular_fourier(&self) -> Result<Spectrum> {
        let mut out = Spectrum::new(crate::symbol::SymbolId::OMEGA);
        if !self.dc.is_zero() {
            out = out.add(&Spectrum::dc(&self.dc));
        }
        for (omega, phasor) in &self.ac {
            out = out.add(&Spectrum::ac(phasor, omega));
        }
        out = out.add(&self.transient.angular_spectrum()?);
        for value in self.noise.values() {
            out = out.add(&Spectrum {
                variable: crate::symbol::SymbolId::OMEGA,
                continuous: vec![(RatFunc::zero(), value.clone())],
                impulses: Vec::new(),
            });
        }
        Ok(out)
    }

    /// Spectrum over frequency in hertz.
    pub fn fourier(&self) -> Result<Spectrum> {
        self.angular_fourier()?.to_hertz()
    }

    /// Magnitude and phase in degrees of the phasor at `omega`.
    pub fn phasor_polar(&self, omega: &RatFunc, bindings: &Bindings) -> Result<(f64, f64)> {
        let phasor = self.ac.get(omega).cloned().unwrap_or_else(RatFunc::zero);
        let value: Complex64 = phasor.eval(bindings)?;
        Ok((value.norm(), value.arg().to_degrees()))
    }

    fn warn_noise(&self, view: &str) {
        if !self.noise.is_empty() {
            warn!("Dropping {} noise term(s) from the {} view", self.noise.len(), view);
        }
    }
}

impl Render for Superposition {
    fn render(&self, ctx: &AnalysisContext) -> String {
        if let Some(value) = self.as_scalar() {
            return value.render(ctx);
        }
        let mut parts = Vec::new();
        if !self.dc.is_zero() {
            parts.push(format!("dc: {}", self.dc.render(ctx)));
        }
        for (omega, phasor) in &self.ac {
            parts.push(format!("ac({}): {}", omega.render(ctx), phasor.render(ctx)));
        }
        if !self.transient.is_zero() {
            parts.push(format!("s: {}", self.transient.render(ctx)));
        }
        for (nid, value) in &self.noise {
            parts.push(format!("noise({}): {}", nid, value.render(ctx)));
        }
        format!("{{{}}}", parts.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::SymbolRegistry;

    fn noise(quantity: Quantity, value: i64, nid: NoiseId) -> Superposition {
        Superposition::combine(
            quantity,
            [(Domain::Noise(nid), TransientExpr::from_laplace(RatFunc::from_int(value), false))],
        )
    }

    #[test]
    fn test_noise_sum_is_root_sum_square() {
        let mut registry = SymbolRegistry::new();
        let (a, b) = (registry.new_noise_id(), registry.new_noise_id());
        let ctx = AnalysisContext::new();
        let x = noise(Quantity::Voltage, 3, a);
        let y = noise(Quantity::Voltage, 4, b);
        let sum = x.checked_add(&y).unwrap();
        assert_eq!(sum.noise_amplitude(&ctx), NoiseAmplitude::Exact(RatFunc::from_int(5)));
        let back = sum.checked_sub(&x).unwrap();
        assert_eq!(back, y);
    }

    #[test]
    fn test_same_noise_id_adds_coherently() {
        let mut registry = SymbolRegistry::new();
        let a = registry.new_noise_id();
        let x = noise(Quantity::Voltage, 3, a);
        let doubled = x.checked_add(&x).unwrap();
        assert_eq!(doubled.noise()[&a], RatFunc::from_int(6));
        assert!(x.checked_sub(&x).unwrap().is_zero());
    }

    #[test]
    fn test_quantity_mismatch() {
        let v = Superposition::from_dc(Quantity::Voltage, RatFunc::one());
        let i = Superposition::from_dc(Quantity::Current, RatFunc::one());
        let err = v.checked_add(&i).unwrap_err();
        assert!(err.is_quantity());
        let u = Superposition::from_dc(Quantity::Undefined, RatFunc::one());
        assert_eq!(v.checked_add(&u).unwrap().quantity, Quantity::Voltage);
    }

    #[test]
    fn test_ac_summed_per_frequency() {
        let w = RatFunc::from_int(10);
        let part = || (Domain::Ac(w.clone()), TransientExpr::from_laplace(RatFunc::one(), false));
        let value = Superposition::combine(Quantity::Voltage, [part(), part()]);
        assert_eq!(value.ac()[&w], RatFunc::from_int(2));
        assert_eq!(value.domains(), vec![Domain::Ac(w)]);
    }

    #[test]
    fn test_degenerate_display() {
        let ctx = AnalysisContext::new();
        let v = Superposition::from_dc(Quantity::Voltage, RatFunc::from_int(5));
        assert_eq!(v.render(&ctx), "5");
        assert_eq!(v.as_scalar(), Some(&RatFunc::from_int(5)));
    }

    #[test]
    fn test_time_view_of_dc_and_ac() {
        let mut value = Superposition::from_dc(Quantity::Voltage, RatFunc::from_int(2));
        value.push(
            &Domain::Ac(RatFunc::from_int(3)),
            &TransientExpr::from_laplace(RatFunc::one(), false),
        );
        let bindings = Bindings::new(&AnalysisContext::new());
        let time = value.time().unwrap();
        assert!(!time.conditional);
        // 2 + cos(3t) at t = 0
        approx::assert_abs_diff_eq!(time.eval(0.0, &bindings).unwrap(), 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_laplace_view_of_dc() {
        let value = Superposition::from_dc(Quantity::Voltage, RatFunc::from_int(2));
        let s = value.laplace().unwrap();
        assert_eq!(s.undelayed(), RatFunc::from_int(2).try_div(&RatFunc::s()).unwrap());
        assert!(!s.is_causal());
    }

    #[test]
    fn test_phasor_polar() {
        let w = RatFunc::from_int(10);
        let mut value = Superposition::new(Quantity::Voltage);
        // 2j
        value.push(
            &Domain::Ac(w.clone()),
            &TransientExpr::from_laplace(&RatFunc::from_int(2) * &RatFunc::j(), false),
        );
        let bindings = Bindings::new(&AnalysisContext::new());
        let (mag, phase) = value.phasor_polar(&w, &bindings).unwrap();
        approx::assert_abs_diff_eq!(mag, 2.0, epsilon = 1e-12);
        approx::assert_abs_diff_eq!(phase, 90.0, epsilon = 1e-9);

        let (mag, phase) = value.phasor_polar(&RatFunc::from_int(3), &bindings).unwrap();
        assert_eq!((mag, phase), (0.0, 0.0));
    }
}
