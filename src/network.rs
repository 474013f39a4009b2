//! One-port composition and two-port networks in chain (ABCD) form.

use crate::algebra::RatFunc;
use crate::circuit::{Circuit, GROUND};
use crate::component::Component;
use crate::context::{AnalysisContext, Render};
use crate::error::{CircuitError, Result};

/// Series/parallel composition of two-terminal elements.
#[derive(Debug, Clone, PartialEq)]
pub enum OnePort {
    R(RatFunc),
    G(RatFunc),
    L(RatFunc),
    C(RatFunc),
    Z(RatFunc),
    Y(RatFunc),
    Series(Vec<OnePort>),
    Parallel(Vec<OnePort>),
}

impl OnePort {
    pub fn series(self, other: OnePort) -> OnePort {
        match self {
            OnePort::Series(mut parts) => {
                parts.push(other);
                OnePort::Series(parts)
            }
            first => OnePort::Series(vec![first, other]),
        }
    }

    pub fn parallel(self, other: OnePort) -> OnePort {
        match self {
            OnePort::Parallel(mut parts) => {
                parts.push(other);
                OnePort::Parallel(parts)
            }
            first => OnePort::Parallel(vec![first, other]),
        }
    }

    /// Impedance in `s`.
    pub fn impedance(&self) -> Result<RatFunc> {
        let s = RatFunc::s();
        match self {
            OnePort::R(r) | OnePort::Z(r) => Ok(r.clone()),
            OnePort::G(g) | OnePort::Y(g) => RatFunc::one().try_div(g),
            OnePort::L(l) => Ok(l * &s),
            OnePort::C(c) => RatFunc::one().try_div(&(c * &s)),
            OnePort::Series(parts) => parts.iter().map(OnePort::impedance).sum(),
            OnePort::Parallel(_) => RatFunc::one().try_div(&self.admittance()?),
        }
    }

    pub fn admittance(&self) -> Result<RatFunc> {
        match self {
            OnePort::Parallel(parts) => parts.iter().map(OnePort::admittance).sum(),
            OnePort::G(g) | OnePort::Y(g) => Ok(g.clone()),
            OnePort::C(c) => Ok(c * &RatFunc::s()),
            other => RatFunc::one().try_div(&other.impedance()?),
        }
    }

    /// Netlist of the one-port between node `1` and ground.
    pub fn to_circuit(&self, ctx: AnalysisContext) -> Result<Circuit> {
        let mut circuit = Circuit::with_context("one-port".to_string(), ctx);
        let mut counter = 0;
        self.build(&mut circuit, "1", GROUND, &mut counter)?;
        Ok(circuit)
    }

    fn build(&self, circuit: &mut Circuit, a: &str, b: &str, counter: &mut usize) -> Result<()> {
        *counter += 1;
        let n = *counter;
        let component = match self {
            OnePort::R(v) => Component::resistor(&format!("R{}", n), a, b, v.clone())?,
            OnePort::G(v) => Component::conductor(&format!("G{}", n), a, b, v.clone())?,
            OnePort::L(v) => Component::inductor(&format!("L{}", n), a, b, v.clone(), None)?,
            OnePort::C(v) => Component::capacitor(&format!("C{}", n), a, b, v.clone(), None)?,
            OnePort::Z(v) => Component::impedance(&format!("Z{}", n), a, b, v.clone())?,
            OnePort::Y(v) => Component::admittance(&format!("Y{}", n), a, b, v.clone())?,
            OnePort::Series(parts) => {
                let mut from = a.to_string();
                for (i, part) in parts.iter().enumerate() {
                    let to = if i + 1 == parts.len() {
                        b.to_string()
                    } else {
                        format!("n{}_{}", n, i + 1)
                    };
                    part.build(circuit, &from, &to, counter)?;
                    from = to;
                }
                return Ok(());
            }
            OnePort::Parallel(parts) => {
                for part in parts {
                    part.build(circuit, a, b, counter)?;
                }
                return Ok(());
            }
        };
        circuit.add(component)
    }
}

/// Chain parameters: `V1 = A V2 + B I2`, `I1 = C V2 + D I2`, with `I2` leaving
/// port 2.
#[derive(Debug, Clone, PartialEq)]
pub struct TwoPort {
    pub a: RatFunc,
    pub b: RatFunc,
    pub c: RatFunc,
    pub d: RatFunc,
}

impl TwoPort {
    pub fn new(a: RatFunc, b: RatFunc, c: RatFunc, d: RatFunc) -> Self {
        TwoPort { a, b, c, d }
    }

    pub fn identity() -> Self {
        TwoPort::new(RatFunc::one(), RatFunc::zero(), RatFunc::zero(), RatFunc::one())
    }

    pub fn series_impedance(z: RatFunc) -> Self {
        TwoPort::new(RatFunc::one(), z, RatFunc::zero(), RatFunc::one())
    }

    pub fn shunt_admittance(y: RatFunc) -> Self {
        TwoPort::new(RatFunc::one(), RatFunc::zero(), y, RatFunc::one())
    }

    /// Ideal transformer with `V2 = n V1`.
    pub fn transformer(ratio: &RatFunc) -> Result<Self> {
        Ok(TwoPort::new(
            RatFunc::one().try_div(ratio)?,
            RatFunc::zero(),
            RatFunc::zero(),
            ratio.clone(),
        ))
    }

    /// `self` followed by `next`.
    pub fn cascade(&self, next: &TwoPort) -> TwoPort {
        TwoPort {
            a: &(&self.a * &next.a) + &(&self.b * &next.c),
            b: &(&self.a * &next.b) + &(&self.b * &next.d),
            c: &(&self.c * &next.a) + &(&self.d * &next.c),
            d: &(&self.c * &next.b) + &(&self.d * &next.d),
        }
    }

    pub fn determinant(&self) -> RatFunc {
        &(&self.a * &self.d) - &(&self.b * &self.c)
    }

    pub fn from_z(z: &[[RatFunc; 2]; 2]) -> Result<Self> {
        if z[1][0].is_zero() {
            return Err(CircuitError::ModelForm(
                "two-port has no forward transmission (z21 = 0)".to_string(),
            ));
        }
        let det = &(&z[0][0] * &z[1][1]) - &(&z[0][1] * &z[1][0]);
        Ok(TwoPort {
            a: z[0][0].try_div(&z[1][0])?,
            b: det.try_div(&z[1][0])?,
            c: RatFunc::one().try_div(&z[1][0])?,
            d: z[1][1].try_div(&z[1][0])?,
        })
    }

    pub fn to_z(&self) -> Result<[[RatFunc; 2]; 2]> {
        if self.c.is_zero() {
            return Err(CircuitError::ModelForm("impedance parameters do not exist (C = 0)".to_string()));
        }
        Ok([
            [self.a.try_div(&self.c)?, self.determinant().try_div(&self.c)?],
            [RatFunc::one().try_div(&self.c)?, self.d.try_div(&self.c)?],
        ])
    }

    pub fn to_y(&self) -> Result<[[RatFunc; 2]; 2]> {
        if self.b.is_zero() {
            return Err(CircuitError::ModelForm("admittance parameters do not exist (B = 0)".to_string()));
        }
        Ok([
            [self.d.try_div(&self.b)?, (-self.determinant()).try_div(&self.b)?],
            [RatFunc::from_int(-1).try_div(&self.b)?, self.a.try_div(&self.b)?],
        ])
    }

    /// Open-circuit voltage gain `V2 / V1`.
    pub fn voltage_gain(&self) -> Result<RatFunc> {
        RatFunc::one().try_div(&self.a)
    }

    /// Impedance seen at port 1 with `load` on port 2.
    pub fn input_impedance(&self, load: &RatFunc) -> Result<RatFunc> {
        let num = &(&self.a * load) + &self.b;
        let den = &(&self.c * load) + &self.d;
        num.try_div(&den)
    }
}

impl Render for TwoPort {
    fn render(&self, ctx: &AnalysisContext) -> String {
        format!(
            "[[{}, {}], [{}, {}]]",
            self.a.render(ctx),
            self.b.render(ctx),
            self.c.render(ctx),
            self.d.render(ctx)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_series_parallel() {
        let mut ctx = AnalysisContext::new();
        let r = RatFunc::var(ctx.symbol("R"));
        let c = RatFunc::var(ctx.symbol("C"));
        let rc = OnePort::R(r.clone()).parallel(OnePort::C(c.clone()));
        let expected = r.try_div(&(&(&(&r * &c) * &RatFunc::s()) + &RatFunc::one())).unwrap();
        assert_eq!(rc.impedance().unwrap(), expected);
        let two = OnePort::R(r.clone()).series(OnePort::R(r.clone()));
        assert_eq!(two.impedance().unwrap(), &r + &r);
    }

    #[test]
    fn test_one_port_netlist_matches_formula() {
        let mut ctx = AnalysisContext::new();
        let r = RatFunc::var(ctx.symbol("R"));
        let l = RatFunc::var(ctx.symbol("L"));
        let net = OnePort::R(r.clone()).series(OnePort::L(l).parallel(OnePort::R(r)));
        let circuit = net.to_circuit(ctx).unwrap();
        assert_eq!(circuit.impedance("1", "0").unwrap(), net.impedance().unwrap());
    }

    #[test]
    fn test_tee_cascade_matches_z_parameters() {
        let mut ctx = AnalysisContext::new();
        let r = RatFunc::var(ctx.symbol("R"));
        let tee = TwoPort::series_impedance(r.clone())
            .cascade(&TwoPort::shunt_admittance(r.recip().unwrap()))
            .cascade(&TwoPort::series_impedance(r.clone()));
        let two_r = &r + &r;
        let z = [[two_r.clone(), r.clone()], [r.clone(), two_r.clone()]];
        assert_eq!(TwoPort::from_z(&z).unwrap(), tee);
        assert_eq!(tee.to_z().unwrap(), z);
        assert!(tee.determinant().is_one());
    }

    #[test]
    fn test_series_element_has_no_z() {
        let series = TwoPort::series_impedance(RatFunc::from_int(5));
        assert!(matches!(series.to_z(), Err(CircuitError::ModelForm(_))));
        let y = series.to_y().unwrap();
        assert_eq!(y[0][0], RatFunc::constant(num_rational::BigRational::new(1.into(), 5.into())));
        assert_eq!(series.input_impedance(&RatFunc::from_int(5)).unwrap(), RatFunc::from_int(10));
    }
}
