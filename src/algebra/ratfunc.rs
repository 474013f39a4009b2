//! Canonical rational functions `num / den` over `Q[symbols]`.

use num_bigint::BigInt;
use num_complex::Complex64;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Signed, Zero};
use std::collections::BTreeSet;
use std::ops::{Add, AddAssign, Mul, MulAssign, Neg, Sub, SubAssign};

use super::poly::{self, Monomial, Poly};
use super::Bindings;
use crate::context::{AnalysisContext, Render};
use crate::error::{CircuitError, Result};
use crate::symbol::{SymbolId, SymbolRegistry};

/// Rational function kept in lowest terms with a `j`-free monic denominator, so
/// `==` decides algebraic equality.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RatFunc {
    num: Poly,
    den: Poly,
}

impl Default for RatFunc {
    fn default() -> Self {
        RatFunc::zero()
    }
}

impl RatFunc {
    pub fn zero() -> Self {
        RatFunc {
            num: Poly::zero(),
            den: Poly::one(),
        }
    }

    pub fn one() -> Self {
        RatFunc::from_poly(Poly::one())
    }

    pub fn from_int(value: i64) -> Self {
        RatFunc::from_poly(Poly::from(value))
    }

    pub fn constant(value: BigRational) -> Self {
        RatFunc::from_poly(Poly::constant(value))
    }

    pub fn var(id: SymbolId) -> Self {
        RatFunc::from_poly(Poly::var(id))
    }

    pub fn j() -> Self {
        RatFunc::var(SymbolId::J)
    }

    pub fn s() -> Self {
        RatFunc::var(SymbolId::S)
    }

    pub fn from_poly(num: Poly) -> Self {
        RatFunc { num, den: Poly::one() }
    }

    /// `num / den` in canonical form; fails on a zero denominator.
    pub fn new(num: Poly, den: Poly) -> Result<Self> {
        if den.is_zero() {
            return Err(CircuitError::Algebraic("division by zero".to_string()));
        }
        Ok(RatFunc::canonical(num, den))
    }

    fn canonical(mut num: Poly, mut den: Poly) -> Self {
        if num.is_zero() {
            return RatFunc::zero();
        }
        if den.has_j() {
            let conj = den.conj();
            num = &num * &conj;
            den = &den * &conj;
        }
        let g = if num.has_j() {
            let (re, im) = num.split_j();
            poly::gcd(&den, &poly::gcd(&re, &im))
        } else {
            poly::gcd(&num, &den)
        };
        if !g.is_one() {
            if let (Some(n), Some(d)) = (num.div_exact(&g), den.div_exact(&g)) {
                num = n;
                den = d;
            }
        }
        let lead = den.leading_coefficient();
        if !lead.is_one() {
            let inv = lead.recip();
            num = num.scale(&inv);
            den = den.scale(&inv);
        }
        RatFunc { num, den }
    }

    pub fn numer(&self) -> &Poly {
        &self.num
    }

    pub fn denom(&self) -> &Poly {
        &self.den
    }

    pub fn is_zero(&self) -> bool {
        self.num.is_zero()
    }

    pub fn is_one(&self) -> bool {
        self.den.is_one() && self.num.is_one()
    }

    pub fn is_polynomial(&self) -> bool {
        self.den.is_one()
    }

    pub fn is_constant(&self) -> bool {
        self.num.is_constant() && self.den.is_constant()
    }

    pub fn constant_value(&self) -> Option<BigRational> {
        if !self.is_constant() {
            return None;
        }
        Some(self.num.constant_value()? / self.den.constant_value()?)
    }

    pub fn contains(&self, id: SymbolId) -> bool {
        self.num.contains(id) || self.den.contains(id)
    }

    pub fn has_j(&self) -> bool {
        self.num.has_j()
    }

    pub fn variables(&self) -> BTreeSet<SymbolId> {
        let mut vars = self.num.variables();
        vars.extend(self.den.variables());
        vars
    }

    /// True when no symbol other than `j` and named constants appears.
    pub fn is_numeric(&self, registry: &SymbolRegistry) -> bool {
        self.variables()
            .into_iter()
            .all(|id| id == SymbolId::J || registry.constant_value(id).is_some())
    }

    pub fn recip(&self) -> Option<RatFunc> {
        if self.is_zero() {
            return None;
        }
        Some(RatFunc::canonical(self.den.clone(), self.num.clone()))
    }

    pub fn checked_div(&self, rhs: &RatFunc) -> Option<RatFunc> {
        if rhs.is_zero() {
            return None;
        }
        Some(RatFunc::canonical(&self.num * &rhs.den, &self.den * &rhs.num))
    }

    /// Division reporting a zero divisor as an algebraic error.
    pub fn try_div(&self, rhs: &RatFunc) -> Result<RatFunc> {
        self.checked_div(rhs)
            .ok_or_else(|| CircuitError::Algebraic("division by zero".to_string()))
    }

    pub fn pow(&self, exp: i32) -> Option<RatFunc> {
        let base = if exp < 0 { self.recip()? } else { self.clone() };
        let e = exp.unsigned_abs();
        Some(RatFunc {
            num: base.num.pow(e),
            den: base.den.pow(e),
        })
    }

    pub fn scale(&self, factor: &BigRational) -> RatFunc {
        RatFunc::canonical(self.num.scale(factor), self.den.clone())
    }

    /// Replaces `id` by `value` everywhere.
    pub fn substitute(&self, id: SymbolId, value: &RatFunc) -> RatFunc {
        if !self.contains(id) {
            return self.clone();
        }
        let horner = |p: &Poly| {
            p.coeffs_in(id)
                .iter()
                .rev()
                .fold(RatFunc::zero(), |acc, c| &(&acc * value) + &RatFunc::from_poly(c.clone()))
        };
        let num = horner(&self.num);
        let den = horner(&self.den);
        num.checked_div(&den).unwrap_or_else(RatFunc::zero)
    }

    /// Like [`substitute`](Self::substitute) but fails when the denominator vanishes.
    pub fn try_substitute(&self, id: SymbolId, value: &RatFunc) -> Result<RatFunc> {
        if !self.den.contains(id) {
            return Ok(self.substitute(id, value));
        }
        let den = RatFunc::from_poly(self.den.clone()).substitute(id, value);
        if den.is_zero() {
            return Err(CircuitError::Evaluation(format!(
                "pole at substituted value of symbol #{}",
                id.index()
            )));
        }
        Ok(self.substitute(id, value))
    }

    pub fn conj(&self) -> RatFunc {
        RatFunc {
            num: self.num.conj(),
            den: self.den.clone(),
        }
    }

    /// Real part, treating every symbol as real.
    pub fn re(&self) -> RatFunc {
        let (re, _) = self.num.split_j();
        RatFunc::canonical(re, self.den.clone())
    }

    /// Imaginary part, treating every symbol as real.
    pub fn im(&self) -> RatFunc {
        let (_, im) = self.num.split_j();
        RatFunc::canonical(im, self.den.clone())
    }

    /// `|x|^2 = x * conj(x)`.
    pub fn norm_sqr(&self) -> RatFunc {
        self * &self.conj()
    }

    /// Exact square root that is positive under the registry's assumptions.
    pub fn try_sqrt(&self, registry: &SymbolRegistry) -> Option<RatFunc> {
        if self.is_zero() {
            return Some(RatFunc::zero());
        }
        if self.has_j() {
            return None;
        }
        let num = positive_sqrt(&self.num, registry)?;
        let den = positive_sqrt(&self.den, registry)?;
        Some(RatFunc::canonical(num, den))
    }

    /// Exact square root of either sign, when one exists.
    pub fn sqrt_any(&self) -> Option<RatFunc> {
        if self.is_zero() {
            return Some(RatFunc::zero());
        }
        if self.has_j() {
            return None;
        }
        let num = poly_sqrt(&self.num)?;
        let den = poly_sqrt(&self.den)?;
        Some(RatFunc::canonical(num, den))
    }

    pub fn eval(&self, bindings: &Bindings) -> Result<Complex64> {
        let missing = |id: SymbolId| {
            CircuitError::Evaluation(format!("no numeric value for symbol #{}", id.index()))
        };
        let num = self.num.eval(bindings).map_err(missing)?;
        let den = self.den.eval(bindings).map_err(missing)?;
        if den.norm() == 0.0 {
            return Err(CircuitError::Evaluation("denominator evaluates to zero".to_string()));
        }
        Ok(num / den)
    }

    /// Like [`eval`](Self::eval) but names the missing symbol.
    pub fn eval_in(&self, ctx: &AnalysisContext, bindings: &Bindings) -> Result<Complex64> {
        self.eval(bindings).map_err(|err| match err {
            CircuitError::Evaluation(_) => {
                let missing: Vec<String> = self
                    .variables()
                    .into_iter()
                    .filter(|id| bindings.get(*id).is_none())
                    .map(|id| ctx.symbol_name(id))
                    .collect();
                if missing.is_empty() {
                    err
                } else {
                    CircuitError::Evaluation(format!("no numeric value for {}", missing.join(", ")))
                }
            }
            other => other,
        })
    }

    /// Integer-coefficient numerator and denominator for display.
    fn display_parts(&self) -> (Poly, Poly) {
        let mut numer_gcd = BigInt::zero();
        let mut denom_lcm = BigInt::one();
        for (_, c) in self.num.terms().chain(self.den.terms()) {
            numer_gcd = numer_gcd.gcd(c.numer());
            denom_lcm = denom_lcm.lcm(c.denom());
        }
        if numer_gcd.is_zero() || (denom_lcm.is_one() && self.den.is_one()) {
            return (self.num.clone(), self.den.clone());
        }
        if self.den.is_one() {
            if self.num.len() == 1 {
                return (self.num.clone(), self.den.clone());
            }
            let factor = BigRational::from_integer(denom_lcm);
            return (self.num.scale(&factor), Poly::constant(factor));
        }
        let factor = BigRational::new(denom_lcm, numer_gcd);
        (self.num.scale(&factor), self.den.scale(&factor))
    }
}

/// Exact square root of a `j`-free polynomial, positive under `registry`.
fn positive_sqrt(p: &Poly, registry: &SymbolRegistry) -> Option<Poly> {
    let root = poly_sqrt(p)?;
    if is_positive(&root, registry) {
        Some(root)
    } else if is_positive(&-&root, registry) {
        Some(-&root)
    } else {
        None
    }
}

/// Square root by leading-term extraction; the sign follows the leading term.
fn poly_sqrt(p: &Poly) -> Option<Poly> {
    if let Some(value) = p.constant_value() {
        return rational_sqrt(&value).map(Poly::constant);
    }
    let (lead_m, lead_c) = p.leading()?;
    let mut root = Poly::term(monomial_sqrt(lead_m)?, rational_sqrt(lead_c)?);
    let two_lead = root.scale(&super::rat(2));
    let (lead_root_m, lead_root_c) = {
        let (m, c) = two_lead.leading()?;
        (m.clone(), c.clone())
    };
    let limit = p.len() * 2 + 2;
    for _ in 0..limit {
        let rest = p - &(&root * &root);
        if rest.is_zero() {
            break;
        }
        let (rm, rc) = rest.leading()?;
        let step = Poly::term(monomial_quotient(rm, &lead_root_m)?, rc / &lead_root_c);
        root = &root + &step;
    }
    if &(&root * &root) != p {
        return None;
    }
    Some(root)
}

fn monomial_sqrt(m: &Monomial) -> Option<Monomial> {
    let mut out = Poly::one();
    for &(var, exp) in m.factors() {
        if exp % 2 != 0 {
            return None;
        }
        out = &out * &Poly::var_pow(var, exp / 2);
    }
    out.leading().map(|(m, _)| m.clone())
}

fn monomial_quotient(a: &Monomial, b: &Monomial) -> Option<Monomial> {
    let q = Poly::term(a.clone(), BigRational::one()).div_exact(&Poly::term(b.clone(), BigRational::one()))?;
    q.leading().map(|(m, _)| m.clone())
}

fn rational_sqrt(value: &BigRational) -> Option<BigRational> {
    if value.is_negative() {
        return None;
    }
    let n = value.numer().sqrt();
    let d = value.denom().sqrt();
    if &(&n * &n) == value.numer() && &(&d * &d) == value.denom() {
        Some(BigRational::new(n, d))
    } else {
        None
    }
}

/// Every coefficient positive and every symbol (with odd exponent) positive.
fn is_positive(p: &Poly, registry: &SymbolRegistry) -> bool {
    !p.is_zero()
        && p.terms().all(|(m, c)| {
            c.is_positive()
                && m.factors()
                    .iter()
                    .all(|&(var, exp)| registry.is_positive(var) || (exp % 2 == 0 && registry.is_real(var)))
        })
}

fn wrap(text: String, poly: &Poly) -> String {
    if poly.len() > 1 {
        format!("({})", text)
    } else {
        text
    }
}

impl Render for RatFunc {
    fn render(&self, ctx: &AnalysisContext) -> String {
        let (num, den) = self.display_parts();
        if den.is_one() {
            return num.render(ctx);
        }
        let den_text = den.render(ctx);
        let den_needs_parens = den.len() > 1
            || den
                .leading()
                .map(|(m, c)| !m.is_one() && (!c.is_one() || m.factors().len() > 1))
                .unwrap_or(false);
        let den_text = if den_needs_parens {
            format!("({})", den_text)
        } else {
            den_text
        };
        format!("{}/{}", wrap(num.render(ctx), &num), den_text)
    }
}

impl From<Poly> for RatFunc {
    fn from(value: Poly) -> Self {
        RatFunc::from_poly(value)
    }
}

impl From<BigRational> for RatFunc {
    fn from(value: BigRational) -> Self {
        RatFunc::constant(value)
    }
}

impl From<i64> for RatFunc {
    fn from(value: i64) -> Self {
        RatFunc::from_int(value)
    }
}

impl<'a, 'b> Add<&'b RatFunc> for &'a RatFunc {
    type Output = RatFunc;
    fn add(self, rhs: &'b RatFunc) -> RatFunc {
        if self.is_zero() {
            return rhs.clone();
        }
        if rhs.is_zero() {
            return self.clone();
        }
        if self.den == rhs.den {
            return RatFunc::canonical(&self.num + &rhs.num, self.den.clone());
        }
        RatFunc::canonical(
            &(&self.num * &rhs.den) + &(&rhs.num * &self.den),
            &self.den * &rhs.den,
        )
    }
}

impl<'a, 'b> Sub<&'b RatFunc> for &'a RatFunc {
    type Output = RatFunc;
    fn sub(self, rhs: &'b RatFunc) -> RatFunc {
        self + &(-rhs)
    }
}

impl<'a, 'b> Mul<&'b RatFunc> for &'a RatFunc {
    type Output = RatFunc;
    fn mul(self, rhs: &'b RatFunc) -> RatFunc {
        if self.is_zero() || rhs.is_zero() {
            return RatFunc::zero();
        }
        if self.is_polynomial() && rhs.is_polynomial() && !self.has_j() && !rhs.has_j() {
            return RatFunc::from_poly(&self.num * &rhs.num);
        }
        RatFunc::canonical(&self.num * &rhs.num, &self.den * &rhs.den)
    }
}

forward_binop!(Add, add, RatFunc);
forward_binop!(Sub, sub, RatFunc);
forward_binop!(Mul, mul, RatFunc);

impl<'a> Neg for &'a RatFunc {
    type Output = RatFunc;
    fn neg(self) -> RatFunc {
        RatFunc {
            num: -&self.num,
            den: self.den.clone(),
        }
    }
}

impl Neg for RatFunc {
    type Output = RatFunc;
    fn neg(self) -> RatFunc {
        -&self
    }
}

impl AddAssign<&RatFunc> for RatFunc {
    fn add_assign(&mut self, rhs: &RatFunc) {
        *self = &*self + rhs;
    }
}

impl AddAssign for RatFunc {
    fn add_assign(&mut self, rhs: RatFunc) {
        *self = &*self + &rhs;
    }
}

impl SubAssign<&RatFunc> for RatFunc {
    fn sub_assign(&mut self, rhs: &RatFunc) {
        *self = &*self - rhs;
    }
}

impl SubAssign for RatFunc {
    fn sub_assign(&mut self, rhs: RatFunc) {
        *self = &*self - &rhs;
    }
}

impl MulAssign<&RatFunc> for RatFunc {
    fn mul_assign(&mut self, rhs: &RatFunc) {
        *self = &*self * rhs;
    }
}

impl std::iter::Sum for RatFunc {
    fn sum<I: Iterator<Item = RatFunc>>(iter: I) -> Self {
        iter.fold(RatFunc::zero(), |acc, x| &acc + &x)
    }
}

impl num_traits::Zero for RatFunc {
    fn zero() -> Self {
        RatFunc::zero()
    }
    fn is_zero(&self) -> bool {
        RatFunc::is_zero(self)
    }
}

impl num_traits::One for RatFunc {
    fn one() -> Self {
        RatFunc::one()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algebra::rat;

    #[test]
    fn test_canonical_cancellation() {
        let mut ctx = AnalysisContext::new();
        let r = RatFunc::var(ctx.symbol("R"));
        let c = RatFunc::var(ctx.symbol("C"));
        let s = RatFunc::s();
        let den = &(&(&r * &c) * &s) + &RatFunc::one();
        let h = RatFunc::one().checked_div(&den).unwrap();
        let back = (&h * &den).checked_div(&den).unwrap();
        assert_eq!(back, h);
        assert_eq!(&h * &den, RatFunc::one());
        assert_eq!(h.render(&ctx), "1/(C*R*s + 1)");
    }

    #[test]
    fn test_rationalised_denominator() {
        let ctx = AnalysisContext::new();
        let z = &RatFunc::one() + &RatFunc::j();
        let inv = z.recip().unwrap();
        assert!(!inv.denom().has_j());
        assert_eq!(inv.render(&ctx), "(-j + 1)/2");
        assert_eq!(&inv * &z, RatFunc::one());
    }

    #[test]
    fn test_re_im_and_norm() {
        let z = &RatFunc::from_int(3) + &(&RatFunc::j() * &RatFunc::from_int(4));
        assert_eq!(z.re(), RatFunc::from_int(3));
        assert_eq!(z.im(), RatFunc::from_int(4));
        assert_eq!(z.norm_sqr(), RatFunc::from_int(25));
    }

    #[test]
    fn test_exact_sqrt() {
        let mut ctx = AnalysisContext::new();
        let a = RatFunc::var(ctx.symbol("a"));
        let b = RatFunc::var(ctx.symbol("b"));
        let sum = &a + &b;
        let squared = &sum * &sum;
        assert_eq!(squared.try_sqrt(&ctx.registry), Some(sum));
        assert_eq!(RatFunc::from_int(25).try_sqrt(&ctx.registry), Some(RatFunc::from_int(5)));
        assert_eq!(RatFunc::from_int(2).try_sqrt(&ctx.registry), None);
        let x = RatFunc::var(ctx.resolve("x", crate::symbol::Assumptions::complex()));
        assert_eq!((&x * &x).try_sqrt(&ctx.registry), None);
    }

    #[test]
    fn test_substitute_and_eval() {
        let mut ctx = AnalysisContext::new();
        let rid = ctx.symbol("R");
        let h = RatFunc::one().checked_div(&(&RatFunc::var(rid) + &RatFunc::s())).unwrap();
        let at_zero = h.substitute(SymbolId::S, &RatFunc::zero());
        assert_eq!(at_zero, RatFunc::var(rid).recip().unwrap());
        let bindings = Bindings::new(&ctx).with(rid, 4.0);
        let value = at_zero.eval(&bindings).unwrap();
        assert!((value.re - 0.25).abs() < 1e-12);
        assert!(h.eval(&bindings).is_err());
        assert_eq!(RatFunc::from_int(2).scale(&rat(3)), RatFunc::from_int(6));
    }

    #[test]
    fn test_zero_division_is_error() {
        assert!(RatFunc::one().checked_div(&RatFunc::zero()).is_none());
        assert!(RatFunc::new(Poly::one(), Poly::zero()).is_err());
    }
}
