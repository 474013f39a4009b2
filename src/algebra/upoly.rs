//! Dense univariate polynomials over a field.

use num_complex::Complex64;

use super::poly::Poly;
use super::ratfunc::RatFunc;
use crate::symbol::SymbolId;

/// Coefficient field used by [`UPoly`].
pub trait Field: Clone + PartialEq + std::fmt::Debug {
    fn zero() -> Self;
    fn one() -> Self;
    fn from_int(value: i64) -> Self;
    fn is_zero(&self) -> bool;
    fn add(&self, rhs: &Self) -> Self;
    fn sub(&self, rhs: &Self) -> Self;
    fn mul(&self, rhs: &Self) -> Self;
    /// `None` on a zero divisor.
    fn div(&self, rhs: &Self) -> Option<Self>;
    fn neg(&self) -> Self {
        Self::zero().sub(self)
    }
}

impl Field for RatFunc {
    fn zero() -> Self {
        RatFunc::zero()
    }
    fn one() -> Self {
        RatFunc::one()
    }
    fn from_int(value: i64) -> Self {
        RatFunc::from_int(value)
    }
    fn is_zero(&self) -> bool {
        RatFunc::is_zero(self)
    }
    fn add(&self, rhs: &Self) -> Self {
        self + rhs
    }
    fn sub(&self, rhs: &Self) -> Self {
        self - rhs
    }
    fn mul(&self, rhs: &Self) -> Self {
        self * rhs
    }
    fn div(&self, rhs: &Self) -> Option<Self> {
        self.checked_div(rhs)
    }
}

/// Magnitudes below this count as zero in numeric arithmetic.
const NUMERIC_ZERO: f64 = 1e-12;

impl Field for Complex64 {
    fn zero() -> Self {
        Complex64::new(0.0, 0.0)
    }
    fn one() -> Self {
        Complex64::new(1.0, 0.0)
    }
    fn from_int(value: i64) -> Self {
        Complex64::new(value as f64, 0.0)
    }
    fn is_zero(&self) -> bool {
        self.norm() < NUMERIC_ZERO
    }
    fn add(&self, rhs: &Self) -> Self {
        self + rhs
    }
    fn sub(&self, rhs: &Self) -> Self {
        self - rhs
    }
    fn mul(&self, rhs: &Self) -> Self {
        self * rhs
    }
    fn div(&self, rhs: &Self) -> Option<Self> {
        if Field::is_zero(rhs) {
            None
        } else {
            Some(self / rhs)
        }
    }
}

/// Coefficients lowest power first; no trailing zeros.
#[derive(Debug, Clone, PartialEq)]
pub struct UPoly<F: Field> {
    coeffs: Vec<F>,
}

impl<F: Field> UPoly<F> {
    pub fn new(mut coeffs: Vec<F>) -> Self {
        while coeffs.last().map(|c| c.is_zero()).unwrap_or(false) {
            coeffs.pop();
        }
        UPoly { coeffs }
    }

    pub fn zero() -> Self {
        UPoly { coeffs: Vec::new() }
    }

    pub fn one() -> Self {
        UPoly::constant(F::one())
    }

    pub fn constant(value: F) -> Self {
        UPoly::new(vec![value])
    }

    /// `x - root`.
    pub fn linear(root: F) -> Self {
        UPoly::new(vec![root.neg(), F::one()])
    }

    pub fn coeffs(&self) -> &[F] {
        &self.coeffs
    }

    pub fn coeff(&self, k: usize) -> F {
        self.coeffs.get(k).cloned().unwrap_or_else(F::zero)
    }

    pub fn is_zero(&self) -> bool {
        self.coeffs.is_empty()
    }

    /// Degree; zero for the zero polynomial.
    pub fn degree(&self) -> usize {
        self.coeffs.len().saturating_sub(1)
    }

    pub fn leading(&self) -> F {
        self.coeffs.last().cloned().unwrap_or_else(F::zero)
    }

    pub fn monic(&self) -> Self {
        let lead = self.leading();
        if lead.is_zero() {
            return self.clone();
        }
        UPoly::new(
            self.coeffs
                .iter()
                .map(|c| c.div(&lead).unwrap_or_else(F::zero))
                .collect(),
        )
    }

    pub fn add(&self, rhs: &Self) -> Self {
        let n = self.coeffs.len().max(rhs.coeffs.len());
        UPoly::new((0..n).map(|k| self.coeff(k).add(&rhs.coeff(k))).collect())
    }

    pub fn sub(&self, rhs: &Self) -> Self {
        let n = self.coeffs.len().max(rhs.coeffs.len());
        UPoly::new((0..n).map(|k| self.coeff(k).sub(&rhs.coeff(k))).collect())
    }

    pub fn mul(&self, rhs: &Self) -> Self {
        if self.is_zero() || rhs.is_zero() {
            return UPoly::zero();
        }
        let mut out = vec![F::zero(); self.coeffs.len() + rhs.coeffs.len() - 1];
        for (i, a) in self.coeffs.iter().enumerate() {
            if a.is_zero() {
                continue;
            }
            for (k, b) in rhs.coeffs.iter().enumerate() {
                out[i + k] = out[i + k].add(&a.mul(b));
            }
        }
        UPoly::new(out)
    }

    pub fn scale(&self, factor: &F) -> Self {
        UPoly::new(self.coeffs.iter().map(|c| c.mul(factor)).collect())
    }

    pub fn pow(&self, exp: u32) -> Self {
        (0..exp).fold(UPoly::one(), |acc, _| acc.mul(self))
    }

    /// Quotient and remainder; `None` when dividing by zero.
    pub fn div_rem(&self, divisor: &Self) -> Option<(Self, Self)> {
        if divisor.is_zero() {
            return None;
        }
        let lead = divisor.leading();
        let dd = divisor.degree();
        let mut rem = self.coeffs.clone();
        if rem.len() <= dd {
            return Some((UPoly::zero(), self.clone()));
        }
        let mut quot = vec![F::zero(); rem.len() - dd];
        for k in (0..quot.len()).rev() {
            let factor = rem[k + dd].div(&lead)?;
            if factor.is_zero() {
                continue;
            }
            for (i, d) in divisor.coeffs.iter().enumerate() {
                rem[k + i] = rem[k + i].sub(&factor.mul(d));
            }
            rem[k + dd] = F::zero();
            quot[k] = factor;
        }
        rem.truncate(dd);
        Some((UPoly::new(quot), UPoly::new(rem)))
    }

    pub fn derivative(&self) -> Self {
        UPoly::new(
            self.coeffs
                .iter()
                .enumerate()
                .skip(1)
                .map(|(k, c)| c.mul(&F::from_int(k as i64)))
                .collect(),
        )
    }

    pub fn eval(&self, x: &F) -> F {
        self.coeffs
            .iter()
            .rev()
            .fold(F::zero(), |acc, c| acc.mul(x).add(c))
    }

    /// Monic greatest common divisor.
    pub fn gcd(&self, rhs: &Self) -> Self {
        let mut a = self.clone();
        let mut b = rhs.clone();
        while !b.is_zero() {
            let r = match a.div_rem(&b) {
                Some((_, r)) => r,
                None => break,
            };
            a = b;
            b = r;
        }
        a.monic()
    }

    /// Yun's algorithm: `self = c * prod_i f_i^i` with square-free, pairwise
    /// coprime monic `f_i`. Returns `(i, f_i)` for non-trivial factors.
    pub fn square_free(&self) -> Vec<(u32, UPoly<F>)> {
        let mut factors = Vec::new();
        if self.degree() == 0 {
            return factors;
        }
        let f = self.monic();
        let df = f.derivative();
        let a = f.gcd(&df);
        let mut b = quotient(&f, &a);
        let c = quotient(&df, &a);
        let mut d = c.sub(&b.derivative());
        let mut i = 1;
        while b.degree() > 0 {
            let g = b.gcd(&d);
            let next_b = quotient(&b, &g);
            let next_c = quotient(&d, &g);
            if g.degree() > 0 {
                factors.push((i, g.clone()));
            }
            b = next_b;
            d = next_c.sub(&b.derivative());
            i += 1;
            if i > self.degree() as u32 + 1 {
                break;
            }
        }
        factors
    }
}

/// Partial-fraction coefficients of `num/den` at a root of multiplicity `mult`:
/// `[c_1, .., c_mult]` with `num/den = sum_k c_k / (x - root)^k + ...`.
pub fn residues<F: Field>(num: &UPoly<F>, den: &UPoly<F>, root: &F, mult: u32) -> Option<Vec<F>> {
    let (rest, rem) = den.div_rem(&UPoly::linear(root.clone()).pow(mult))?;
    if !rem.is_zero() {
        return None;
    }
    laurent_coefficients(num, &rest, root, mult)
}

/// Like [`residues`] with the cofactor `den / (x - root)^mult` already known.
pub fn laurent_coefficients<F: Field>(num: &UPoly<F>, rest: &UPoly<F>, root: &F, mult: u32) -> Option<Vec<F>> {
    let mut n = num.clone();
    let mut d = rest.clone();
    let mut factorial = F::one();
    let mut out = Vec::with_capacity(mult as usize);
    for j in 0..mult {
        let value = n.eval(root).div(&d.eval(root))?;
        out.push(value.div(&factorial)?);
        let next = n.derivative().mul(&d).sub(&n.mul(&d.derivative()));
        d = d.mul(&d);
        n = next;
        factorial = factorial.mul(&F::from_int(j as i64 + 1));
    }
    out.reverse();
    Some(out)
}

fn quotient<F: Field>(a: &UPoly<F>, b: &UPoly<F>) -> UPoly<F> {
    a.div_rem(b).map(|(q, _)| q).unwrap_or_else(|| a.clone())
}

impl UPoly<RatFunc> {
    /// Views `p` as a polynomial in `var` with coefficients free of `var`.
    pub fn from_poly(p: &Poly, var: SymbolId) -> Self {
        UPoly::new(p.coeffs_in(var).into_iter().map(RatFunc::from_poly).collect())
    }

    /// Back to a rational function in `var`.
    pub fn to_ratfunc(&self, var: SymbolId) -> RatFunc {
        let x = RatFunc::var(var);
        self.eval(&x)
    }

    /// True when every coefficient is a rational number.
    pub fn is_numeric(&self) -> bool {
        self.coeffs.iter().all(|c| c.is_constant() && !c.has_j())
    }

    pub fn to_complex(&self) -> Option<UPoly<Complex64>> {
        let coeffs = self
            .coeffs
            .iter()
            .map(|c| {
                c.constant_value()
                    .map(|v| Complex64::new(super::rational_to_f64(&v), 0.0))
            })
            .collect::<Option<Vec<_>>>()?;
        Some(UPoly::new(coeffs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn q(values: &[i64]) -> UPoly<RatFunc> {
        UPoly::new(values.iter().map(|v| RatFunc::from_int(*v)).collect())
    }

    #[test]
    fn test_div_rem() {
        // (x^2 + 3x + 2) / (x + 1) = x + 2
        let (quot, rem) = q(&[2, 3, 1]).div_rem(&q(&[1, 1])).unwrap();
        assert_eq!(quot, q(&[2, 1]));
        assert!(rem.is_zero());
    }

    #[test]
    fn test_gcd_is_monic() {
        let a = q(&[2, 3, 1]);
        let b = q(&[3, 4, 1]);
        assert_eq!(a.gcd(&b), q(&[1, 1]));
    }

    #[test]
    fn test_square_free_decomposition() {
        // (x + 1)^2 (x + 2)
        let p = q(&[1, 1]).pow(2).mul(&q(&[2, 1]));
        let factors = p.square_free();
        assert_eq!(factors, vec![(1, q(&[2, 1])), (2, q(&[1, 1]))]);
    }

    #[test]
    fn test_symbolic_coefficients() {
        let mut ctx = crate::context::AnalysisContext::new();
        let a = RatFunc::var(ctx.symbol("a"));
        let p = &(&RatFunc::s() + &a) * &(&RatFunc::s() + &a);
        let up = UPoly::from_poly(p.numer(), SymbolId::S);
        assert_eq!(up.degree(), 2);
        let factors = up.square_free();
        assert_eq!(factors.len(), 1);
        assert_eq!(factors[0].0, 2);
        assert_eq!(factors[0].1.to_ratfunc(SymbolId::S), &RatFunc::s() + &a);
    }

    #[test]
    fn test_residues_double_pole() {
        // 1 / (x (x + 1)^2) = 1/x - 1/(x + 1) - 1/(x + 1)^2
        let den = q(&[0, 1]).mul(&q(&[1, 1]).pow(2));
        let num = q(&[1]);
        let at_minus_one = residues(&num, &den, &RatFunc::from_int(-1), 2).unwrap();
        assert_eq!(at_minus_one, vec![RatFunc::from_int(-1), RatFunc::from_int(-1)]);
        let at_zero = residues(&num, &den, &RatFunc::zero(), 1).unwrap();
        assert_eq!(at_zero, vec![RatFunc::one()]);
    }

    #[test]
    fn test_complex_eval() {
        let p: UPoly<Complex64> = UPoly::new(vec![Complex64::new(1.0, 0.0), Complex64::new(0.0, 0.0), Complex64::new(1.0, 0.0)]);
        let value = p.eval(&Complex64::new(0.0, 1.0));
        assert!(value.norm() < 1e-12);
    }
}
