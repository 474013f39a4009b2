//! Sparse multivariate polynomials with rational coefficients.

use num_bigint::BigInt;
use num_complex::Complex64;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::{Add, Mul, Neg, Sub};

use super::{rational_to_f64, Bindings};
use crate::context::{AnalysisContext, Render};
use crate::symbol::{SymbolId, SymbolKind};

/// Power product, sorted by symbol id, exponents strictly positive.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Monomial(Vec<(SymbolId, u32)>);

impl Monomial {
    pub fn one() -> Self {
        Monomial(Vec::new())
    }

    pub fn var(id: SymbolId, exp: u32) -> Self {
        if exp == 0 {
            Monomial::one()
        } else {
            Monomial(vec![(id, exp)])
        }
    }

    pub fn is_one(&self) -> bool {
        self.0.is_empty()
    }

    pub fn factors(&self) -> &[(SymbolId, u32)] {
        &self.0
    }

    pub fn degree_in(&self, id: SymbolId) -> u32 {
        self.0
            .iter()
            .find(|(var, _)| *var == id)
            .map(|(_, exp)| *exp)
            .unwrap_or(0)
    }

    pub fn without(&self, id: SymbolId) -> Monomial {
        Monomial(self.0.iter().filter(|(var, _)| *var != id).cloned().collect())
    }

    /// Product; the flag is set when `j^2 = -1` flipped the sign.
    fn mul(&self, other: &Monomial) -> (Monomial, bool) {
        let mut out = Vec::with_capacity(self.0.len() + other.0.len());
        let (mut i, mut k) = (0, 0);
        while i < self.0.len() || k < other.0.len() {
            match (self.0.get(i), other.0.get(k)) {
                (Some(&(va, ea)), Some(&(vb, eb))) if va == vb => {
                    out.push((va, ea + eb));
                    i += 1;
                    k += 1;
                }
                (Some(&(va, ea)), Some(&(vb, _))) if va < vb => {
                    out.push((va, ea));
                    i += 1;
                }
                (Some(_), Some(&(vb, eb))) => {
                    out.push((vb, eb));
                    k += 1;
                }
                (Some(&(va, ea)), None) => {
                    out.push((va, ea));
                    i += 1;
                }
                (None, Some(&(vb, eb))) => {
                    out.push((vb, eb));
                    k += 1;
                }
                (None, None) => break,
            }
        }
        let mut negate = false;
        if let Some(first) = out.first_mut() {
            if first.0 == SymbolId::J && first.1 >= 2 {
                negate = (first.1 / 2) % 2 == 1;
                first.1 %= 2;
            }
        }
        out.retain(|(_, exp)| *exp > 0);
        (Monomial(out), negate)
    }

    fn div(&self, other: &Monomial) -> Option<Monomial> {
        let mut out = self.0.clone();
        for &(var, exp) in &other.0 {
            let slot = out.iter_mut().find(|(v, _)| *v == var)?;
            if slot.1 < exp {
                return None;
            }
            slot.1 -= exp;
        }
        out.retain(|(_, exp)| *exp > 0);
        Some(Monomial(out))
    }
}

impl Ord for Monomial {
    /// Lexicographic order; smaller symbol ids have higher priority.
    fn cmp(&self, other: &Self) -> Ordering {
        let (mut i, mut k) = (0, 0);
        loop {
            match (self.0.get(i), other.0.get(k)) {
                (None, None) => return Ordering::Equal,
                (Some(_), None) => return Ordering::Greater,
                (None, Some(_)) => return Ordering::Less,
                (Some(&(va, ea)), Some(&(vb, eb))) => {
                    if va == vb {
                        if ea != eb {
                            return ea.cmp(&eb);
                        }
                        i += 1;
                        k += 1;
                    } else if va < vb {
                        return Ordering::Greater;
                    } else {
                        return Ordering::Less;
                    }
                }
            }
        }
    }
}

impl PartialOrd for Monomial {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Polynomial in interned symbols. Zero coefficients are never stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Poly {
    terms: BTreeMap<Monomial, BigRational>,
}

impl Poly {
    pub fn zero() -> Self {
        Poly::default()
    }

    pub fn one() -> Self {
        Poly::constant(BigRational::one())
    }

    pub fn constant(value: BigRational) -> Self {
        Poly::term(Monomial::one(), value)
    }

    pub fn var(id: SymbolId) -> Self {
        Poly::term(Monomial::var(id, 1), BigRational::one())
    }

    pub fn var_pow(id: SymbolId, exp: u32) -> Self {
        Poly::term(Monomial::var(id, exp), BigRational::one())
    }

    pub fn term(monomial: Monomial, coeff: BigRational) -> Self {
        let mut poly = Poly::zero();
        poly.add_term(monomial, coeff);
        poly
    }

    fn add_term(&mut self, monomial: Monomial, coeff: BigRational) {
        if coeff.is_zero() {
            return;
        }
        let entry = self.terms.entry(monomial).or_insert_with(BigRational::zero);
        *entry += coeff;
        if entry.is_zero() {
            self.terms.retain(|_, c| !c.is_zero());
        }
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn is_one(&self) -> bool {
        self.constant_value().map(|c| c.is_one()).unwrap_or(false)
    }

    pub fn is_constant(&self) -> bool {
        self.terms.is_empty() || (self.terms.len() == 1 && self.terms.keys().all(Monomial::is_one))
    }

    /// The value when the polynomial has no symbols.
    pub fn constant_value(&self) -> Option<BigRational> {
        if self.terms.is_empty() {
            return Some(BigRational::zero());
        }
        if self.is_constant() {
            return self.terms.values().next().cloned();
        }
        None
    }

    pub fn terms(&self) -> impl DoubleEndedIterator<Item = (&Monomial, &BigRational)> {
        self.terms.iter()
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// Largest term in lex order.
    pub fn leading(&self) -> Option<(&Monomial, &BigRational)> {
        self.terms.iter().next_back()
    }

    pub fn leading_coefficient(&self) -> BigRational {
        self.leading()
            .map(|(_, c)| c.clone())
            .unwrap_or_else(BigRational::zero)
    }

    pub fn scale(&self, factor: &BigRational) -> Poly {
        if factor.is_zero() {
            return Poly::zero();
        }
        Poly {
            terms: self
                .terms
                .iter()
                .map(|(m, c)| (m.clone(), c * factor))
                .collect(),
        }
    }

    pub fn pow(&self, exp: u32) -> Poly {
        let mut result = Poly::one();
        let mut base = self.clone();
        let mut e = exp;
        while e > 0 {
            if e & 1 == 1 {
                result = &result * &base;
            }
            e >>= 1;
            if e > 0 {
                base = &base * &base;
            }
        }
        result
    }

    pub fn variables(&self) -> BTreeSet<SymbolId> {
        self.terms
            .keys()
            .flat_map(|m| m.factors().iter().map(|(var, _)| *var))
            .collect()
    }

    pub fn contains(&self, id: SymbolId) -> bool {
        self.terms.keys().any(|m| m.degree_in(id) > 0)
    }

    pub fn has_j(&self) -> bool {
        self.contains(SymbolId::J)
    }

    pub fn degree_in(&self, id: SymbolId) -> u32 {
        self.terms.keys().map(|m| m.degree_in(id)).max().unwrap_or(0)
    }

    /// Coefficient of `id^k`, as a polynomial free of `id`.
    pub fn coeff_of(&self, id: SymbolId, k: u32) -> Poly {
        let mut out = Poly::zero();
        for (m, c) in &self.terms {
            if m.degree_in(id) == k {
                out.terms.insert(m.without(id), c.clone());
            }
        }
        out
    }

    /// Coefficients of the powers of `id`, lowest first.
    pub fn coeffs_in(&self, id: SymbolId) -> Vec<Poly> {
        let degree = self.degree_in(id) as usize;
        let mut coeffs = vec![Poly::zero(); degree + 1];
        for (m, c) in &self.terms {
            let k = m.degree_in(id) as usize;
            coeffs[k].terms.insert(m.without(id), c.clone());
        }
        coeffs
    }

    pub fn from_coeffs_in(id: SymbolId, coeffs: &[Poly]) -> Poly {
        let mut out = Poly::zero();
        for (k, c) in coeffs.iter().enumerate() {
            if !c.is_zero() {
                out = &out + &(c * &Poly::var_pow(id, k as u32));
            }
        }
        out
    }

    pub fn derivative(&self, id: SymbolId) -> Poly {
        let mut out = Poly::zero();
        for (m, c) in &self.terms {
            let exp = m.degree_in(id);
            if exp == 0 {
                continue;
            }
            let reduced = m.div(&Monomial::var(id, 1)).unwrap_or_default();
            out.add_term(reduced, c * super::rat(exp as i64));
        }
        out
    }

    /// Replaces `id` by `value`.
    pub fn substitute(&self, id: SymbolId, value: &Poly) -> Poly {
        if !self.contains(id) {
            return self.clone();
        }
        let coeffs = self.coeffs_in(id);
        let mut acc = Poly::zero();
        for c in coeffs.iter().rev() {
            acc = &(&acc * value) + c;
        }
        acc
    }

    /// Formal conjugation `j -> -j`.
    pub fn conj(&self) -> Poly {
        Poly {
            terms: self
                .terms
                .iter()
                .map(|(m, c)| {
                    if m.degree_in(SymbolId::J) % 2 == 1 {
                        (m.clone(), -c)
                    } else {
                        (m.clone(), c.clone())
                    }
                })
                .collect(),
        }
    }

    /// Splits `a + j*b` into `(a, b)`.
    pub fn split_j(&self) -> (Poly, Poly) {
        let mut re = Poly::zero();
        let mut im = Poly::zero();
        for (m, c) in &self.terms {
            if m.degree_in(SymbolId::J) > 0 {
                im.terms.insert(m.without(SymbolId::J), c.clone());
            } else {
                re.terms.insert(m.clone(), c.clone());
            }
        }
        (re, im)
    }

    /// Positive rational `c` with the sign of the leading coefficient such that
    /// `self / c` has coprime integer coefficients.
    pub fn content(&self) -> BigRational {
        let mut numer_gcd = BigInt::zero();
        let mut denom_lcm = BigInt::one();
        for c in self.terms.values() {
            numer_gcd = numer_gcd.gcd(c.numer());
            denom_lcm = denom_lcm.lcm(c.denom());
        }
        if numer_gcd.is_zero() {
            return BigRational::one();
        }
        let content = BigRational::new(numer_gcd, denom_lcm);
        if self.leading_coefficient().is_negative() {
            -content
        } else {
            content
        }
    }

    /// Integer-coefficient associate with positive leading coefficient.
    pub fn primitive(&self) -> Poly {
        if self.is_zero() {
            return Poly::zero();
        }
        let content = self.content();
        self.scale(&content.recip())
    }

    /// Exact quotient `self / divisor`, or `None` when it does not divide.
    pub fn div_exact(&self, divisor: &Poly) -> Option<Poly> {
        let (lead_m, lead_c) = divisor.leading()?;
        let (lead_m, lead_c) = (lead_m.clone(), lead_c.clone());
        let mut remainder = self.clone();
        let mut quotient = Poly::zero();
        while let Some((rm, rc)) = remainder.leading() {
            let factor_m = rm.div(&lead_m)?;
            let factor_c = rc / &lead_c;
            let step = Poly::term(factor_m, factor_c);
            remainder = &remainder - &(&step * divisor);
            quotient = &quotient + &step;
        }
        Some(quotient)
    }

    pub fn eval(&self, bindings: &Bindings) -> std::result::Result<Complex64, SymbolId> {
        let mut total = Complex64::new(0.0, 0.0);
        for (m, c) in &self.terms {
            let mut term = Complex64::new(rational_to_f64(c), 0.0);
            for &(var, exp) in m.factors() {
                let value = bindings.get(var).ok_or(var)?;
                term *= value.powu(exp);
            }
            total += term;
        }
        Ok(total)
    }

    fn render_monomial(m: &Monomial, ctx: &AnalysisContext) -> String {
        let mut factors: Vec<(u8, String, u32)> = m
            .factors()
            .iter()
            .map(|&(var, exp)| {
                let rank = match ctx.registry.kind(var) {
                    SymbolKind::ImaginaryUnit => 0,
                    SymbolKind::Constant(_) => 1,
                    SymbolKind::DomainVariable => 3,
                    _ => 2,
                };
                (rank, ctx.symbol_name(var), exp)
            })
            .collect();
        factors.sort();
        factors
            .into_iter()
            .map(|(_, name, exp)| {
                if exp == 1 {
                    name
                } else {
                    format!("{}^{}", name, exp)
                }
            })
            .collect::<Vec<_>>()
            .join("*")
    }
}

impl Render for Poly {
    fn render(&self, ctx: &AnalysisContext) -> String {
        if self.is_zero() {
            return "0".to_string();
        }
        let mut out = String::new();
        for (i, (m, c)) in self.terms.iter().rev().enumerate() {
            let negative = c.is_negative();
            let magnitude = c.abs();
            if i == 0 {
                if negative {
                    out.push('-');
                }
            } else if negative {
                out.push_str(" - ");
            } else {
                out.push_str(" + ");
            }
            if m.is_one() {
                out.push_str(&magnitude.to_string());
            } else if magnitude.is_one() {
                out.push_str(&Poly::render_monomial(m, ctx));
            } else {
                out.push_str(&format!("{}*{}", magnitude, Poly::render_monomial(m, ctx)));
            }
        }
        out
    }
}

impl From<BigRational> for Poly {
    fn from(value: BigRational) -> Self {
        Poly::constant(value)
    }
}

impl From<i64> for Poly {
    fn from(value: i64) -> Self {
        Poly::constant(super::rat(value))
    }
}

impl<'a, 'b> Add<&'b Poly> for &'a Poly {
    type Output = Poly;
    fn add(self, rhs: &'b Poly) -> Poly {
        let mut out = self.clone();
        for (m, c) in &rhs.terms {
            out.add_term(m.clone(), c.clone());
        }
        out
    }
}

impl<'a, 'b> Sub<&'b Poly> for &'a Poly {
    type Output = Poly;
    fn sub(self, rhs: &'b Poly) -> Poly {
        let mut out = self.clone();
        for (m, c) in &rhs.terms {
            out.add_term(m.clone(), -c.clone());
        }
        out
    }
}

impl<'a, 'b> Mul<&'b Poly> for &'a Poly {
    type Output = Poly;
    fn mul(self, rhs: &'b Poly) -> Poly {
        let mut out = Poly::zero();
        for (ma, ca) in &self.terms {
            for (mb, cb) in &rhs.terms {
                let (m, negate) = ma.mul(mb);
                let c = ca * cb;
                out.add_term(m, if negate { -c } else { c });
            }
        }
        out
    }
}

forward_binop!(Add, add, Poly);
forward_binop!(Sub, sub, Poly);
forward_binop!(Mul, mul, Poly);

impl Neg for Poly {
    type Output = Poly;
    fn neg(self) -> Poly {
        -&self
    }
}

impl<'a> Neg for &'a Poly {
    type Output = Poly;
    fn neg(self) -> Poly {
        Poly {
            terms: self.terms.iter().map(|(m, c)| (m.clone(), -c)).collect(),
        }
    }
}

/// Pseudo-remainder of `a` by `b` with respect to `x`.
fn prem(a: &Poly, b: &Poly, x: SymbolId) -> Poly {
    let db = b.degree_in(x);
    let lb = b.coeff_of(x, db);
    let mut r = a.clone();
    while !r.is_zero() && r.degree_in(x) >= db {
        let dr = r.degree_in(x);
        let lr = r.coeff_of(x, dr);
        let shifted = &(&lr * &Poly::var_pow(x, dr - db)) * b;
        r = &(&r * &lb) - &shifted;
    }
    r
}

/// GCD of the coefficients of `p` viewed as a polynomial in `x`.
fn content_in(p: &Poly, x: SymbolId) -> Poly {
    let mut g = Poly::zero();
    for c in p.coeffs_in(x) {
        if c.is_zero() {
            continue;
        }
        g = gcd(&g, &c);
        if g.is_one() {
            break;
        }
    }
    g
}

fn primitive_in(p: &Poly, x: SymbolId) -> Poly {
    let content = content_in(p, x);
    if content.is_zero() {
        return Poly::zero();
    }
    p.div_exact(&content).unwrap_or_else(|| p.clone())
}

/// Greatest common divisor over `Q[symbols]`, normalised by [`Poly::primitive`].
/// Polynomials containing `j` are treated as coprime.
pub fn gcd(a: &Poly, b: &Poly) -> Poly {
    if a.is_zero() {
        return b.primitive();
    }
    if b.is_zero() {
        return a.primitive();
    }
    if a.is_constant() || b.is_constant() || a.has_j() || b.has_j() {
        return Poly::one();
    }
    let x = match a.variables().union(&b.variables()).next() {
        Some(&x) => x,
        None => return Poly::one(),
    };
    if !a.contains(x) {
        return gcd(a, &content_in(b, x));
    }
    if !b.contains(x) {
        return gcd(&content_in(a, x), b);
    }
    let ca = content_in(a, x);
    let cb = content_in(b, x);
    let common = gcd(&ca, &cb);
    let mut p = a.div_exact(&ca).unwrap_or_else(|| a.clone());
    let mut q = b.div_exact(&cb).unwrap_or_else(|| b.clone());
    if p.degree_in(x) < q.degree_in(x) {
        std::mem::swap(&mut p, &mut q);
    }
    while !q.is_zero() {
        let r = prem(&p, &q, x);
        p = q;
        q = if r.is_zero() { r } else { primitive_in(&r, x) };
    }
    let g = if p.degree_in(x) == 0 {
        Poly::one()
    } else {
        primitive_in(&p, x)
    };
    (&g * &common).primitive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::rat;

    fn setup() -> (AnalysisContext, Poly, Poly) {
        let mut ctx = AnalysisContext::new();
        let x = Poly::var(ctx.symbol("x"));
        let y = Poly::var(ctx.symbol("y"));
        (ctx, x, y)
    }

    #[test]
    fn test_j_squared_is_minus_one() {
        let j = Poly::var(SymbolId::J);
        assert_eq!(&j * &j, Poly::from(-1));
        assert_eq!(j.pow(4), Poly::one());
        assert_eq!(j.pow(3), -&j);
    }

    #[test]
    fn test_gcd_multivariate() {
        let (_, x, y) = setup();
        let common = &x + &y;
        let a = &common * &(&x - &Poly::one());
        let b = &common * &(&y + &Poly::from(2));
        assert_eq!(gcd(&a, &b), common);
    }

    #[test]
    fn test_gcd_monomial_factor() {
        let (_, x, y) = setup();
        let a = &(&x * &x) * &y;
        let b = &x * &(&y + &Poly::one());
        assert_eq!(gcd(&a, &b), x);
    }

    #[test]
    fn test_div_exact() {
        let (_, x, y) = setup();
        let a = &(&x + &y) * &(&x - &y);
        assert_eq!(a.div_exact(&(&x - &y)), Some(&x + &y));
        assert_eq!(a.div_exact(&(&x + &Poly::one())), None);
    }

    #[test]
    fn test_primitive_normalisation() {
        let (_, x, _) = setup();
        let p = (&x * &Poly::from(-4)) + Poly::constant(BigRational::new(2.into(), 3.into()));
        let prim = p.primitive();
        assert_eq!(prim, &(&x * &Poly::from(6)) - &Poly::one());
    }

    #[test]
    fn test_render() {
        let (ctx, x, y) = setup();
        let p = &(&(&x * &y) * &Poly::from(3)) - &Poly::one();
        assert_eq!(p.render(&ctx), "3*x*y - 1");
        let s = Poly::var(SymbolId::S);
        assert_eq!((&s * &x).render(&ctx), "x*s");
    }

    #[test]
    fn test_substitute_and_derivative() {
        let (_, x, y) = setup();
        let p = &(&x * &x) + &y;
        let xid = *x.variables().iter().next().unwrap();
        assert_eq!(p.substitute(xid, &Poly::from(3)), &y + &Poly::from(9));
        assert_eq!(p.derivative(xid), &x * &Poly::constant(rat(2)));
    }

    #[test]
    fn test_eval() {
        let (ctx, x, _) = setup();
        let xid = *x.variables().iter().next().unwrap();
        let bindings = Bindings::new(&ctx).with(xid, 2.0);
        let p = &(&x * &x) + &Poly::var(SymbolId::J);
        let value = p.eval(&bindings).unwrap();
        assert_eq!(value, Complex64::new(4.0, 1.0));
    }
}
