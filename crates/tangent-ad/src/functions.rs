//! Elementary function library.
//!
//! Each function checks its domain, computes `f(x)` and `f'(x)`, and hands
//! both to [`Scalar::chain`], so the same definition serves plain reals,
//! forward values (trace scaled by `f'(x)`) and reverse nodes (edge
//! `(f'(x), new)` appended to the operand). Guards run before anything is
//! constructed: a rejected call leaves the reverse graph untouched.

use std::f64::consts::{E, FRAC_PI_2, PI};
use std::fmt;
use std::str::FromStr;

use tangent_core::{Error, Result};

use crate::scalar::Scalar;

/// Residual allowance for the multiple-of-π guards, in ulps of the argument.
const PERIOD_ULPS: f64 = 4.0;

/// `x` lies within float resolution of `k * period` for some integer `k`;
/// returns `k`. The residual is measured in radians, so large arguments are
/// not swallowed by a tolerance that scales with `k`.
fn nearest_multiple(x: f64, period: f64) -> Option<f64> {
    let r = (x / period).round();
    let residual = (x - r * period).abs();
    (residual <= PERIOD_ULPS * f64::EPSILON * x.abs().max(1.0)).then_some(r)
}

fn is_odd_multiple_of_half_pi(x: f64) -> bool {
    nearest_multiple(x, FRAC_PI_2).is_some_and(|k| k % 2.0 != 0.0)
}

fn is_multiple_of_pi(x: f64) -> bool {
    nearest_multiple(x, PI).is_some()
}

fn domain(name: &str, x: f64, why: &str) -> Error {
    Error::Domain(format!("{name}({x}): {why}"))
}

/// Exponential: d/dx exp(x) = exp(x).
pub fn exp<S: Scalar>(x: &S) -> Result<S> {
    let e = x.value().exp();
    Ok(x.chain(e, e))
}

/// Natural logarithm: d/dx ln(x) = 1/x. Requires x > 0.
pub fn log<S: Scalar>(x: &S) -> Result<S> {
    let v = x.value();
    if v <= 0.0 {
        return Err(domain("log", v, "argument must be positive"));
    }
    Ok(x.chain(v.ln(), 1.0 / v))
}

/// Logarithm in `base`: d/dx log_b(x) = 1/(x ln b). Requires x > 0, b > 0, b != 1.
pub fn log_base<S: Scalar>(x: &S, base: f64) -> Result<S> {
    if base <= 0.0 || base == 1.0 {
        return Err(Error::Domain(format!("log_base: base must be positive and not 1, got {base}")));
    }
    let v = x.value();
    if v <= 0.0 {
        return Err(domain("log_base", v, "argument must be positive"));
    }
    let ln_b = base.ln();
    Ok(x.chain(v.ln() / ln_b, 1.0 / (v * ln_b)))
}

/// Square root: d/dx sqrt(x) = 1/(2 sqrt(x)). Requires x >= 0.
///
/// At x = 0 the value is 0 and the derivative is `+inf`.
pub fn sqrt<S: Scalar>(x: &S) -> Result<S> {
    let v = x.value();
    if v < 0.0 {
        return Err(domain("sqrt", v, "argument must be non-negative"));
    }
    let s = v.sqrt();
    Ok(x.chain(s, 0.5 / s))
}

/// Sine: d/dx sin(x) = cos(x).
pub fn sin<S: Scalar>(x: &S) -> Result<S> {
    let v = x.value();
    Ok(x.chain(v.sin(), v.cos()))
}

/// Cosine: d/dx cos(x) = -sin(x).
pub fn cos<S: Scalar>(x: &S) -> Result<S> {
    let v = x.value();
    Ok(x.chain(v.cos(), -v.sin()))
}

/// Tangent: d/dx tan(x) = 1/cos²(x). Undefined at odd multiples of π/2.
pub fn tan<S: Scalar>(x: &S) -> Result<S> {
    let v = x.value();
    if is_odd_multiple_of_half_pi(v) {
        return Err(domain("tan", v, "odd multiple of pi/2"));
    }
    let c = v.cos();
    Ok(x.chain(v.tan(), 1.0 / (c * c)))
}

/// Cotangent: d/dx cot(x) = -1/sin²(x). Undefined at multiples of π.
pub fn cot<S: Scalar>(x: &S) -> Result<S> {
    let v = x.value();
    if is_multiple_of_pi(v) {
        return Err(domain("cot", v, "multiple of pi"));
    }
    let s = v.sin();
    Ok(x.chain(1.0 / v.tan(), -1.0 / (s * s)))
}

/// Secant: d/dx sec(x) = sin(x)/cos²(x). Undefined at odd multiples of π/2.
pub fn sec<S: Scalar>(x: &S) -> Result<S> {
    let v = x.value();
    if is_odd_multiple_of_half_pi(v) {
        return Err(domain("sec", v, "odd multiple of pi/2"));
    }
    let c = v.cos();
    Ok(x.chain(1.0 / c, v.sin() / (c * c)))
}

/// Cosecant: d/dx csc(x) = -cos(x)/sin²(x). Undefined at multiples of π.
pub fn csc<S: Scalar>(x: &S) -> Result<S> {
    let v = x.value();
    if is_multiple_of_pi(v) {
        return Err(domain("csc", v, "multiple of pi"));
    }
    let s = v.sin();
    Ok(x.chain(1.0 / s, -v.cos() / (s * s)))
}

/// |x| <= 1 for the value; |x| < 1 when a derivative is carried.
fn check_unit_interval<S: Scalar>(name: &str, x: &S) -> Result<f64> {
    let v = x.value();
    if v.abs() > 1.0 {
        return Err(domain(name, v, "argument outside [-1, 1]"));
    }
    if !x.is_constant() && v.abs() == 1.0 {
        return Err(domain(name, v, "derivative undefined at the interval ends"));
    }
    Ok(v)
}

/// Inverse sine: d/dx arcsin(x) = 1/sqrt(1 - x²).
pub fn arcsin<S: Scalar>(x: &S) -> Result<S> {
    let v = check_unit_interval("arcsin", x)?;
    Ok(x.chain(v.asin(), 1.0 / (1.0 - v * v).sqrt()))
}

/// Inverse cosine: d/dx arccos(x) = -1/sqrt(1 - x²).
pub fn arccos<S: Scalar>(x: &S) -> Result<S> {
    let v = check_unit_interval("arccos", x)?;
    Ok(x.chain(v.acos(), -1.0 / (1.0 - v * v).sqrt()))
}

/// Inverse tangent: d/dx arctan(x) = 1/(1 + x²).
pub fn arctan<S: Scalar>(x: &S) -> Result<S> {
    let v = x.value();
    Ok(x.chain(v.atan(), 1.0 / (1.0 + v * v)))
}

/// Hyperbolic sine: d/dx sinh(x) = cosh(x).
pub fn sinh<S: Scalar>(x: &S) -> Result<S> {
    let v = x.value();
    Ok(x.chain(v.sinh(), v.cosh()))
}

/// Hyperbolic cosine: d/dx cosh(x) = sinh(x).
pub fn cosh<S: Scalar>(x: &S) -> Result<S> {
    let v = x.value();
    Ok(x.chain(v.cosh(), v.sinh()))
}

/// Hyperbolic tangent: d/dx tanh(x) = 1/cosh²(x).
pub fn tanh<S: Scalar>(x: &S) -> Result<S> {
    let v = x.value();
    let c = v.cosh();
    Ok(x.chain(v.tanh(), 1.0 / (c * c)))
}

/// One-argument elementary functions, addressable by name.
///
/// `log_base` is not listed: it takes a second, real argument and is called
/// through [`log_base`] directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Elementary {
    /// [`exp`]
    Exp,
    /// [`log`]
    Log,
    /// [`sqrt`]
    Sqrt,
    /// [`sin`]
    Sin,
    /// [`cos`]
    Cos,
    /// [`tan`]
    Tan,
    /// [`cot`]
    Cot,
    /// [`sec`]
    Sec,
    /// [`csc`]
    Csc,
    /// [`arcsin`]
    Arcsin,
    /// [`arccos`]
    Arccos,
    /// [`arctan`]
    Arctan,
    /// [`sinh`]
    Sinh,
    /// [`cosh`]
    Cosh,
    /// [`tanh`]
    Tanh,
}

impl Elementary {
    /// Every function, in declaration order.
    pub const ALL: [Elementary; 15] = [
        Elementary::Exp,
        Elementary::Log,
        Elementary::Sqrt,
        Elementary::Sin,
        Elementary::Cos,
        Elementary::Tan,
        Elementary::Cot,
        Elementary::Sec,
        Elementary::Csc,
        Elementary::Arcsin,
        Elementary::Arccos,
        Elementary::Arctan,
        Elementary::Sinh,
        Elementary::Cosh,
        Elementary::Tanh,
    ];

    /// Resolve a function name as written in expression text.
    pub fn from_name(name: &str) -> Option<Self> {
        let f = match name {
            "exp" => Elementary::Exp,
            "log" | "ln" => Elementary::Log,
            "sqrt" => Elementary::Sqrt,
            "sin" => Elementary::Sin,
            "cos" => Elementary::Cos,
            "tan" => Elementary::Tan,
            "cot" => Elementary::Cot,
            "sec" => Elementary::Sec,
            "csc" => Elementary::Csc,
            "arcsin" | "asin" => Elementary::Arcsin,
            "arccos" | "acos" => Elementary::Arccos,
            "arctan" | "atan" => Elementary::Arctan,
            "sinh" => Elementary::Sinh,
            "cosh" => Elementary::Cosh,
            "tanh" => Elementary::Tanh,
            _ => return None,
        };
        Some(f)
    }

    /// Canonical name.
    pub fn name(self) -> &'static str {
        match self {
            Elementary::Exp => "exp",
            Elementary::Log => "log",
            Elementary::Sqrt => "sqrt",
            Elementary::Sin => "sin",
            Elementary::Cos => "cos",
            Elementary::Tan => "tan",
            Elementary::Cot => "cot",
            Elementary::Sec => "sec",
            Elementary::Csc => "csc",
            Elementary::Arcsin => "arcsin",
            Elementary::Arccos => "arccos",
            Elementary::Arctan => "arctan",
            Elementary::Sinh => "sinh",
            Elementary::Cosh => "cosh",
            Elementary::Tanh => "tanh",
        }
    }

    /// Apply the function to any operand kind.
    pub fn apply<S: Scalar>(self, x: &S) -> Result<S> {
        match self {
            Elementary::Exp => exp(x),
            Elementary::Log => log(x),
            Elementary::Sqrt => sqrt(x),
            Elementary::Sin => sin(x),
            Elementary::Cos => cos(x),
            Elementary::Tan => tan(x),
            Elementary::Cot => cot(x),
            Elementary::Sec => sec(x),
            Elementary::Csc => csc(x),
            Elementary::Arcsin => arcsin(x),
            Elementary::Arccos => arccos(x),
            Elementary::Arctan => arctan(x),
            Elementary::Sinh => sinh(x),
            Elementary::Cosh => cosh(x),
            Elementary::Tanh => tanh(x),
        }
    }
}

impl fmt::Display for Elementary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Elementary {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s).ok_or_else(|| Error::Expression(format!("unknown function: '{s}'")))
    }
}

/// Named real constants available to expression text.
pub fn named_constant(name: &str) -> Option<f64> {
    match name {
        "pi" => Some(PI),
        "e" => Some(E),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::forward::ForwardValue;
    use crate::reverse::{Graph, ReverseValue};
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    /// Central difference on the plain-real path.
    fn numeric(f: Elementary, x: f64) -> f64 {
        let h = 1e-6 * x.abs().max(1.0);
        let hi = f.apply(&(x + h)).unwrap();
        let lo = f.apply(&(x - h)).unwrap();
        (hi - lo) / (2.0 * h)
    }

    fn forward(f: Elementary, x: f64) -> (f64, f64) {
        let y = f.apply(&ForwardValue::variable("x", x)).unwrap();
        (y.value(), y.trace()[0])
    }

    fn reverse(f: Elementary, x: f64) -> (f64, f64) {
        let g = Graph::shared();
        let leaf = ReverseValue::leaf(&g, x);
        let y = f.apply(&leaf).unwrap();
        (y.value(), leaf.gradient())
    }

    /// A point strictly inside each function's domain, away from poles.
    fn interior(f: Elementary) -> f64 {
        match f {
            Elementary::Arcsin | Elementary::Arccos => 0.3,
            Elementary::Log | Elementary::Sqrt => 2.5,
            _ => 0.7,
        }
    }

    #[test]
    fn test_every_function_matches_finite_difference() {
        for f in Elementary::ALL {
            let x = interior(f);
            let (fv, fd) = forward(f, x);
            let (rv, rd) = reverse(f, x);
            let plain = f.apply(&x).unwrap();
            assert_relative_eq!(fv, plain, epsilon = 1e-12);
            assert_relative_eq!(rv, plain, epsilon = 1e-12);
            assert!((fd - numeric(f, x)).abs() < 1e-6, "{f}: forward {fd} vs numeric");
            assert!((fd - rd).abs() < 1e-12, "{f}: forward {fd} vs reverse {rd}");
        }
    }

    #[test]
    fn test_known_derivatives() {
        assert_relative_eq!(forward(Elementary::Exp, 3.0).1, 3.0_f64.exp(), epsilon = 1e-12);
        assert_relative_eq!(forward(Elementary::Log, 2.0).1, 0.5, epsilon = 1e-12);
        assert_relative_eq!(forward(Elementary::Sqrt, 4.0).1, 0.25, epsilon = 1e-12);
        assert_relative_eq!(forward(Elementary::Sin, 0.0).1, 1.0, epsilon = 1e-12);
        assert_relative_eq!(forward(Elementary::Cos, 0.0).1, 0.0, epsilon = 1e-12);
        assert_relative_eq!(forward(Elementary::Tan, 0.0).1, 1.0, epsilon = 1e-12);
        assert_relative_eq!(forward(Elementary::Arctan, 1.0).1, 0.5, epsilon = 1e-12);
        assert_relative_eq!(forward(Elementary::Arcsin, 0.0).1, 1.0, epsilon = 1e-12);
        assert_relative_eq!(forward(Elementary::Arccos, 0.0).1, -1.0, epsilon = 1e-12);
        assert_relative_eq!(forward(Elementary::Tanh, 0.0).1, 1.0, epsilon = 1e-12);
        assert_relative_eq!(forward(Elementary::Cosh, 0.0).1, 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_log_base() {
        // d/dx log_10(x) = 1/(x ln 10)
        let x = ForwardValue::variable("x", 100.0);
        let y = log_base(&x, 10.0).unwrap();
        assert_relative_eq!(y.value(), 2.0, epsilon = 1e-12);
        assert_relative_eq!(y.trace()[0], 1.0 / (100.0 * 10.0_f64.ln()), epsilon = 1e-12);

        let g = Graph::shared();
        let leaf = ReverseValue::leaf(&g, 8.0);
        let y = log_base(&leaf, 2.0).unwrap();
        assert_relative_eq!(y.value(), 3.0, epsilon = 1e-12);
        assert_relative_eq!(leaf.gradient(), 1.0 / (8.0 * 2.0_f64.ln()), epsilon = 1e-12);

        assert!(matches!(log_base(&8.0, 1.0), Err(Error::Domain(_))));
        assert!(matches!(log_base(&8.0, -2.0), Err(Error::Domain(_))));
        assert!(matches!(log_base(&0.0, 2.0), Err(Error::Domain(_))));
    }

    #[test]
    fn test_domain_guards_on_reals() {
        assert!(matches!(log(&-1.0), Err(Error::Domain(_))));
        assert!(matches!(log(&0.0), Err(Error::Domain(_))));
        assert!(matches!(sqrt(&-1.0), Err(Error::Domain(_))));
        assert!(matches!(arcsin(&2.0), Err(Error::Domain(_))));
        assert!(matches!(arccos(&-1.5), Err(Error::Domain(_))));
        assert!(matches!(tan(&FRAC_PI_2), Err(Error::Domain(_))));
        assert!(matches!(tan(&(-3.0 * FRAC_PI_2)), Err(Error::Domain(_))));
        assert!(matches!(sec(&FRAC_PI_2), Err(Error::Domain(_))));
        assert!(matches!(cot(&0.0), Err(Error::Domain(_))));
        assert!(matches!(cot(&PI), Err(Error::Domain(_))));
        assert!(matches!(csc(&(2.0 * PI)), Err(Error::Domain(_))));

        // Multiples of pi are fine for tan, and sqrt(0) is defined.
        assert_relative_eq!(tan(&PI).unwrap(), PI.tan(), epsilon = 1e-12);

        // Large arguments away from the poles stay in the domain.
        assert!(cot(&2e12).is_ok());
        assert!(csc(&5e12).is_ok());
        assert!(sec(&3e13).is_ok());
        assert!(tan(&2e12).is_ok());
        let k = 636_619_772_368.0_f64;
        assert!(matches!(cot(&(k * PI)), Err(Error::Domain(_))));
        assert_eq!(sqrt(&0.0).unwrap(), 0.0);
        let at_zero = sqrt(&ForwardValue::variable("x", 0.0)).unwrap();
        assert_eq!(at_zero.trace()[0], f64::INFINITY);
    }

    #[test]
    fn test_unit_interval_ends() {
        // The value exists at the ends; the derivative does not.
        assert_relative_eq!(arcsin(&1.0).unwrap(), FRAC_PI_2, epsilon = 1e-12);
        assert_relative_eq!(arccos(&-1.0).unwrap(), PI, epsilon = 1e-12);
        assert!(arcsin(&ForwardValue::variable("x", 1.0)).is_err());
        assert!(arccos(&ForwardValue::variable("x", -1.0)).is_err());

        let g = Graph::shared();
        let leaf = ReverseValue::leaf(&g, 1.0);
        assert!(arcsin(&leaf).is_err());
    }

    #[test]
    fn test_guard_failure_constructs_no_node() {
        let g = Graph::shared();
        let neg = ReverseValue::leaf(&g, -1.0);
        let two = ReverseValue::leaf(&g, 2.0);
        let half_pi = ReverseValue::leaf(&g, FRAC_PI_2);

        assert!(matches!(log(&neg), Err(Error::Domain(_))));
        assert!(matches!(sqrt(&neg), Err(Error::Domain(_))));
        assert!(matches!(arcsin(&two), Err(Error::Domain(_))));
        assert!(matches!(tan(&half_pi), Err(Error::Domain(_))));

        assert_eq!(g.borrow().len(), 3);
        assert_eq!(g.borrow().edge_count(), 0);
    }

    #[test]
    fn test_name_lookup() {
        for f in Elementary::ALL {
            assert_eq!(Elementary::from_name(f.name()), Some(f));
        }
        assert_eq!("ln".parse::<Elementary>().unwrap(), Elementary::Log);
        assert_eq!(Elementary::from_name("atan"), Some(Elementary::Arctan));
        assert!(matches!("erf".parse::<Elementary>(), Err(Error::Expression(_))));
        assert_eq!(named_constant("pi"), Some(PI));
        assert_eq!(named_constant("tau"), None);
    }

    proptest! {
        #[test]
        fn prop_forward_reverse_agree_on_trig(x in -1.4f64..1.4) {
            for f in [Elementary::Sin, Elementary::Cos, Elementary::Tan, Elementary::Sec,
                      Elementary::Arctan, Elementary::Sinh, Elementary::Cosh, Elementary::Tanh] {
                let (_, fd) = forward(f, x);
                let (_, rd) = reverse(f, x);
                prop_assert!((fd - rd).abs() <= 1e-9 * fd.abs().max(1.0));
                prop_assert!((fd - numeric(f, x)).abs() < 1e-5 * fd.abs().max(1.0));
            }
        }

        #[test]
        fn prop_inverse_trig_inside_unit_interval(x in -0.95f64..0.95) {
            for f in [Elementary::Arcsin, Elementary::Arccos] {
                let (_, fd) = forward(f, x);
                let (_, rd) = reverse(f, x);
                prop_assert!((fd - rd).abs() < 1e-12);
                prop_assert!((fd - numeric(f, x)).abs() < 1e-6);
            }
        }

        #[test]
        fn prop_log_family_on_positive_reals(x in 0.1f64..50.0) {
            for f in [Elementary::Log, Elementary::Sqrt, Elementary::Exp] {
                let (_, fd) = forward(f, x.min(10.0));
                let (_, rd) = reverse(f, x.min(10.0));
                prop_assert!((fd - rd).abs() <= 1e-12 * fd.abs().max(1.0));
            }
            let y = log_base(&ForwardValue::variable("x", x), 3.0).unwrap();
            prop_assert!((y.trace()[0] - 1.0 / (x * 3.0_f64.ln())).abs() < 1e-12);
        }
    }
}
