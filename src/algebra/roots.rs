//! Roots of univariate polynomials with rational-function coefficients.
//!
//! Exact wherever the factor structure allows it; numeric polynomials of degree
//! three and above without rational roots fall back to companion-matrix
//! eigenvalues, and the set is then flagged approximate.

use log::{debug, warn};
use nalgebra::DMatrix;
use num_bigint::BigInt;
use num_complex::Complex64;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, ToPrimitive, Zero};

use super::ratfunc::RatFunc;
use super::upoly::UPoly;
use super::rational_to_f64;
use crate::error::{CircuitError, Result};

/// Largest integer coefficient magnitude tried by the rational root search.
const RATIONAL_SEARCH_LIMIT: i64 = 1_000_000_000;
const MAX_CANDIDATES: usize = 4096;
const NEWTON_STEPS: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub enum Root {
    /// Exact root, possibly complex (`sigma + j*omega`).
    Exact(RatFunc),
    /// Irreducible `x^2 + p*x + q` kept whole; its roots involve a square root.
    Quadratic { p: RatFunc, q: RatFunc },
    /// Numeric approximation.
    Approx(Complex64),
}

impl Root {
    pub fn is_exact(&self) -> bool {
        !matches!(self, Root::Approx(_))
    }

    /// Number of roots this entry stands for.
    pub fn count(&self) -> usize {
        match self {
            Root::Quadratic { .. } => 2,
            _ => 1,
        }
    }
}

/// All roots of a polynomial with multiplicities.
#[derive(Debug, Clone, PartialEq)]
pub struct RootSet {
    pub roots: Vec<(Root, u32)>,
    pub leading: RatFunc,
    pub approximate: bool,
}

impl RootSet {
    pub fn degree(&self) -> usize {
        self.roots
            .iter()
            .map(|(root, mult)| root.count() * *mult as usize)
            .sum()
    }

    pub fn has_repeated(&self) -> bool {
        self.roots.iter().any(|(_, mult)| *mult > 1)
    }
}

/// Finds every root of `p`.
pub fn find_roots(p: &UPoly<RatFunc>) -> Result<RootSet> {
    let mut set = RootSet {
        roots: Vec::new(),
        leading: p.leading(),
        approximate: false,
    };
    if p.degree() == 0 {
        return Ok(set);
    }
    for (mult, factor) in p.square_free() {
        for root in factor_roots(&factor)? {
            if !root.is_exact() {
                set.approximate = true;
            }
            set.roots.push((root, mult));
        }
    }
    if set.approximate {
        warn!("Degree {} polynomial solved numerically", p.degree());
    }
    debug!("Found {} distinct roots", set.roots.len());
    Ok(set)
}

/// Roots of a monic square-free factor.
fn factor_roots(factor: &UPoly<RatFunc>) -> Result<Vec<Root>> {
    let mut roots = Vec::new();
    let mut f = factor.monic();
    if f.degree() > 0 && f.coeff(0).is_zero() {
        roots.push(Root::Exact(RatFunc::zero()));
        f = UPoly::new(f.coeffs()[1..].to_vec());
    }
    loop {
        match f.degree() {
            0 => break,
            1 => {
                roots.push(Root::Exact(-&(f.coeff(0))));
                break;
            }
            2 => {
                roots.extend(quadratic_roots(&f.coeff(1), &f.coeff(0)));
                break;
            }
            degree => {
                if !f.is_numeric() {
                    return Err(CircuitError::Algebraic(format!(
                        "cannot factor degree-{} polynomial with symbolic coefficients; substitute numeric values",
                        degree
                    )));
                }
                match rational_root(&f) {
                    Some(r) => {
                        let root = RatFunc::constant(r);
                        let (quot, _) = f
                            .div_rem(&UPoly::linear(root.clone()))
                            .ok_or_else(|| CircuitError::Algebraic("deflation failed".to_string()))?;
                        roots.push(Root::Exact(root));
                        f = quot;
                    }
                    None => {
                        roots.extend(numeric_roots(&f)?.into_iter().map(Root::Approx));
                        break;
                    }
                }
            }
        }
    }
    Ok(roots)
}

/// Roots of `x^2 + b*x + c`.
fn quadratic_roots(b: &RatFunc, c: &RatFunc) -> Vec<Root> {
    let mid = b.scale(&half());
    let disc = &(&mid * &mid) - c;
    if let Some(r) = disc.sqrt_any() {
        return vec![Root::Exact(&(-&mid) + &r), Root::Exact(&(-&mid) - &r)];
    }
    if let Some(r) = (-&disc).sqrt_any() {
        let jr = &RatFunc::j() * &r;
        return vec![Root::Exact(&(-&mid) + &jr), Root::Exact(&(-&mid) - &jr)];
    }
    vec![Root::Quadratic {
        p: b.clone(),
        q: c.clone(),
    }]
}

fn integer_coefficients(f: &UPoly<RatFunc>) -> Option<Vec<BigInt>> {
    let values = f
        .coeffs()
        .iter()
        .map(|c| c.constant_value())
        .collect::<Option<Vec<_>>>()?;
    let lcm = values
        .iter()
        .fold(BigInt::one(), |acc, v| acc.lcm(v.denom()));
    let scale = BigRational::from_integer(lcm);
    Some(values.iter().map(|v| (v * &scale).to_integer()).collect())
}

fn divisors(n: i64) -> Vec<i64> {
    let n = n.abs();
    let mut out = Vec::new();
    let mut d = 1;
    while d * d <= n {
        if n % d == 0 {
            out.push(d);
            if d != n / d {
                out.push(n / d);
            }
        }
        d += 1;
    }
    out
}

/// A rational root by the rational root theorem, if any.
fn rational_root(f: &UPoly<RatFunc>) -> Option<BigRational> {
    let coeffs = integer_coefficients(f)?;
    let a0 = coeffs.first()?.to_i64()?;
    let an = coeffs.last()?.to_i64()?;
    if a0 == 0 || a0.abs() > RATIONAL_SEARCH_LIMIT || an.abs() > RATIONAL_SEARCH_LIMIT {
        return None;
    }
    let ps = divisors(a0);
    let qs = divisors(an);
    if ps.len() * qs.len() * 2 > MAX_CANDIDATES {
        return None;
    }
    for p in &ps {
        for q in &qs {
            for sign in [1, -1] {
                let candidate = BigRational::new(BigInt::from(sign * p), BigInt::from(*q));
                let value = coeffs
                    .iter()
                    .rev()
                    .fold(BigRational::zero(), |acc, c| acc * &candidate + BigRational::from_integer(c.clone()));
                if value.is_zero() {
                    return Some(candidate);
                }
            }
        }
    }
    None
}

/// Eigenvalues of the companion matrix, polished with a few Newton steps.
fn numeric_roots(f: &UPoly<RatFunc>) -> Result<Vec<Complex64>> {
    let complex = f
        .to_complex()
        .ok_or_else(|| CircuitError::Algebraic("non-numeric coefficients".to_string()))?;
    let n = complex.degree();
    let lead = complex.leading().re;
    let mut companion = DMatrix::<f64>::zeros(n, n);
    for i in 1..n {
        companion[(i, i - 1)] = 1.0;
    }
    for i in 0..n {
        companion[(i, n - 1)] = -complex.coeff(i).re / lead;
    }
    let derivative = complex.derivative();
    let roots = companion
        .complex_eigenvalues()
        .iter()
        .map(|z| {
            let mut x = Complex64::new(z.re, z.im);
            for _ in 0..NEWTON_STEPS {
                let d = derivative.eval(&x);
                if d.norm() == 0.0 {
                    break;
                }
                x -= complex.eval(&x) / d;
            }
            if x.im.abs() < 1e-12 * x.norm().max(1.0) {
                x.im = 0.0;
            }
            x
        })
        .collect();
    Ok(roots)
}

/// Numeric value of an exact root.
pub fn exact_to_complex(root: &RatFunc) -> Option<Complex64> {
    let re = root.re().constant_value()?;
    let im = root.im().constant_value()?;
    Some(Complex64::new(rational_to_f64(&re), rational_to_f64(&im)))
}

/// Builds `prod (x - r)^m` from exact linear roots, for checks and tests.
pub fn from_roots(roots: &[(RatFunc, u32)]) -> UPoly<RatFunc> {
    roots.iter().fold(UPoly::one(), |acc, (r, m)| {
        acc.mul(&UPoly::linear(r.clone()).pow(*m))
    })
}

pub(crate) fn half() -> BigRational {
    BigRational::new(1.into(), 2.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AnalysisContext;
    use crate::symbol::SymbolId;

    fn q(values: &[i64]) -> UPoly<RatFunc> {
        UPoly::new(values.iter().map(|v| RatFunc::from_int(*v)).collect())
    }

    #[test]
    fn test_repeated_real_roots() {
        // (x + 1)^2 (x + 3)
        let p = from_roots(&[(RatFunc::from_int(-1), 2), (RatFunc::from_int(-3), 1)]);
        let set = find_roots(&p).unwrap();
        assert!(!set.approximate);
        assert!(set.has_repeated());
        assert_eq!(set.degree(), 3);
        assert!(set.roots.contains(&(Root::Exact(RatFunc::from_int(-1)), 2)));
        assert!(set.roots.contains(&(Root::Exact(RatFunc::from_int(-3)), 1)));
    }

    #[test]
    fn test_complex_pair() {
        // x^2 + 2x + 5 -> -1 +- 2j
        let set = find_roots(&q(&[5, 2, 1])).unwrap();
        let expected = &RatFunc::from_int(-1) + &(&RatFunc::j() * &RatFunc::from_int(2));
        assert!(set.roots.iter().any(|(r, _)| r == &Root::Exact(expected.clone())));
        assert!(set.roots.iter().any(|(r, _)| r == &Root::Exact(expected.conj())));
    }

    #[test]
    fn test_irreducible_quadratic_kept_exact() {
        let set = find_roots(&q(&[-1, 1, 1])).unwrap();
        assert!(!set.approximate);
        assert!(matches!(set.roots[0].0, Root::Quadratic { .. }));
    }

    #[test]
    fn test_cubic_rational_roots() {
        // 2x^3 - 3x^2 - 3x + 2 = (x - 2)(2x - 1)(x + 1)
        let set = find_roots(&q(&[2, -3, -3, 2])).unwrap();
        assert!(!set.approximate);
        assert_eq!(set.roots.len(), 3);
        let half_root = Root::Exact(RatFunc::constant(half()));
        assert!(set.roots.iter().any(|(r, _)| r == &half_root));
    }

    #[test]
    fn test_numeric_fallback_is_flagged() {
        // x^5 - x - 1 has no rational roots
        let set = find_roots(&q(&[-1, -1, 0, 0, 0, 1])).unwrap();
        assert!(set.approximate);
        let real: Vec<_> = set
            .roots
            .iter()
            .filter_map(|(r, _)| match r {
                Root::Approx(z) if z.im == 0.0 => Some(z.re),
                _ => None,
            })
            .collect();
        assert_eq!(real.len(), 1);
        assert!((real[0] - 1.1673039782614187).abs() < 1e-9);
    }

    #[test]
    fn test_symbolic_first_order() {
        let mut ctx = AnalysisContext::new();
        let r = RatFunc::var(ctx.symbol("R"));
        let c = RatFunc::var(ctx.symbol("C"));
        let tau = &r * &c;
        let den = &(&tau * &RatFunc::s()) + &RatFunc::one();
        let p = UPoly::from_poly(den.numer(), SymbolId::S);
        let set = find_roots(&p).unwrap();
        assert_eq!(set.roots.len(), 1);
        assert_eq!(set.roots[0].0, Root::Exact(-&tau.recip().unwrap()));
    }

    #[test]
    fn test_symbolic_cubic_is_algebraic_error() {
        let mut ctx = AnalysisContext::new();
        let a = RatFunc::var(ctx.symbol("a"));
        let p = UPoly::new(vec![a.clone(), RatFunc::one(), RatFunc::zero(), RatFunc::one()]);
        assert!(matches!(find_roots(&p), Err(CircuitError::Algebraic(_))));
    }
}
