//! Exact symbolic algebra used by the circuit engine.
//!
//! Everything is built from sparse multivariate polynomials over arbitrary-precision
//! rationals. Rational functions are kept canonical (no common factor, monic
//! denominator free of `j`) so that structural equality is algebraic equality.

use num_bigint::BigInt;
use num_complex::Complex64;
use num_rational::BigRational;
use num_traits::{ToPrimitive, Zero};
use std::collections::HashMap;

use crate::context::AnalysisContext;
use crate::symbol::SymbolId;

/// Forwards owned/borrowed operator combinations to the `&a op &b` impl.
macro_rules! forward_binop {
    ($imp:ident, $method:ident, $ty:ty) => {
        impl std::ops::$imp<$ty> for $ty {
            type Output = $ty;
            fn $method(self, rhs: $ty) -> $ty {
                std::ops::$imp::$method(&self, &rhs)
            }
        }
        impl<'a> std::ops::$imp<&'a $ty> for $ty {
            type Output = $ty;
            fn $method(self, rhs: &'a $ty) -> $ty {
                std::ops::$imp::$method(&self, rhs)
            }
        }
        impl<'a> std::ops::$imp<$ty> for &'a $ty {
            type Output = $ty;
            fn $method(self, rhs: $ty) -> $ty {
                std::ops::$imp::$method(self, &rhs)
            }
        }
    };
}

pub mod expr;
pub mod poly;
pub mod ratfunc;
pub mod roots;
pub mod upoly;

pub use expr::{Expr, Func};
pub use poly::{Monomial, Poly};
pub use ratfunc::RatFunc;
pub use roots::{Root, RootSet};
pub use upoly::{laurent_coefficients, residues, Field, UPoly};

/// Numeric values for symbols, used by every `eval`.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: HashMap<SymbolId, Complex64>,
}

impl Bindings {
    /// Starts with the named constants of `ctx` (`pi`) already bound.
    pub fn new(ctx: &AnalysisContext) -> Self {
        let mut values = HashMap::new();
        if let Some(pi) = ctx.registry.constant_value(SymbolId::PI) {
            values.insert(SymbolId::PI, Complex64::new(pi, 0.0));
        }
        Bindings { values }
    }

    pub fn set(&mut self, id: SymbolId, value: f64) -> &mut Self {
        self.values.insert(id, Complex64::new(value, 0.0));
        self
    }

    pub fn set_complex(&mut self, id: SymbolId, value: Complex64) -> &mut Self {
        self.values.insert(id, value);
        self
    }

    /// Binds by name; unknown names are registered so the binding is never lost.
    pub fn set_name(&mut self, ctx: &mut AnalysisContext, name: &str, value: f64) -> &mut Self {
        let id = ctx.symbol(name);
        self.set(id, value)
    }

    pub fn with(mut self, id: SymbolId, value: f64) -> Self {
        self.set(id, value);
        self
    }

    pub fn get(&self, id: SymbolId) -> Option<Complex64> {
        if id == SymbolId::J {
            return Some(Complex64::new(0.0, 1.0));
        }
        self.values.get(&id).copied()
    }
}

/// Converts an exact rational to the nearest `f64`.
pub fn rational_to_f64(value: &BigRational) -> f64 {
    let numer = value.numer().to_f64().unwrap_or(f64::NAN);
    let denom = value.denom().to_f64().unwrap_or(f64::NAN);
    numer / denom
}

/// Largest decimal exponent accepted in a literal.
pub const MAX_DECIMAL_EXPONENT: i32 = 308;

/// Parses `1.5`, `-2e-3`, `.25` exactly. `None` for malformed text or an exponent
/// outside `±MAX_DECIMAL_EXPONENT`.
pub fn rational_from_decimal(text: &str) -> Option<BigRational> {
    let text = text.trim();
    let (mantissa, exponent) = match text.find(|c: char| c == 'e' || c == 'E') {
        Some(pos) => (&text[..pos], text[pos + 1..].parse::<i32>().ok()?),
        None => (text, 0),
    };
    if exponent.abs() > MAX_DECIMAL_EXPONENT {
        return None;
    }
    let (negative, mantissa) = match mantissa.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, mantissa.strip_prefix('+').unwrap_or(mantissa)),
    };
    let (int_part, frac_part) = match mantissa.find('.') {
        Some(pos) => (&mantissa[..pos], &mantissa[pos + 1..]),
        None => (mantissa, ""),
    };
    if int_part.is_empty() && frac_part.is_empty() {
        return None;
    }
    if !int_part.chars().chain(frac_part.chars()).all(|c| c.is_ascii_digit()) {
        return None;
    }
    let digits = format!("{}{}", int_part, frac_part);
    let mut numer: BigInt = digits.parse().ok()?;
    if negative {
        numer = -numer;
    }
    let scale = exponent - frac_part.len() as i32;
    let ten = BigInt::from(10);
    let value = if scale >= 0 {
        BigRational::from_integer(numer * num_traits::pow(ten, scale as usize))
    } else {
        BigRational::new(numer, num_traits::pow(ten, (-scale) as usize))
    };
    Some(value)
}

/// Rational approximation of a float with 12 significant digits.
pub fn rational_from_f64(value: f64) -> BigRational {
    if value == 0.0 || !value.is_finite() {
        return BigRational::zero();
    }
    let text = format!("{:.11e}", value);
    rational_from_decimal(&text)
        .or_else(|| BigRational::from_float(value))
        .unwrap_or_else(BigRational::zero)
}

pub(crate) fn rat(value: i64) -> BigRational {
    BigRational::from_integer(BigInt::from(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decimal_parsing_is_exact() {
        assert_eq!(rational_from_decimal("1.5").unwrap(), BigRational::new(3.into(), 2.into()));
        assert_eq!(rational_from_decimal("-2e-3").unwrap(), BigRational::new((-1).into(), 500.into()));
        assert_eq!(rational_from_decimal(".25").unwrap(), BigRational::new(1.into(), 4.into()));
        assert_eq!(rational_from_decimal("10").unwrap(), rat(10));
        assert!(rational_from_decimal("abc").is_none());
        assert!(rational_from_decimal("1e309").is_none());
        assert!(rational_from_decimal("2e99999999999").is_none());
        assert_eq!(rational_from_decimal("1e-308").unwrap().denom().to_string().len(), 309);
    }

    #[test]
    fn test_float_round_trip() {
        let q = rational_from_f64(0.1);
        assert_eq!(q, BigRational::new(1.into(), 10.into()));
        assert!((rational_to_f64(&q) - 0.1).abs() < 1e-15);
    }
}
