//! Forward-mode automatic differentiation with a full tangent vector.
//!
//! A [`ForwardValue`] carries its primal value together with the partial
//! derivatives with respect to **every** declared variable. One evaluation
//! pass over an expression therefore yields a complete Jacobian row for that
//! output; the cost per operation grows with the number of variables, not
//! with the number of outputs.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::sync::Arc;

use tangent_core::{Error, Result};

/// A real value plus its tangent vector.
///
/// `trace[i]` is ∂value/∂`names[i]`. All values derived from the same seeds
/// share one `names` allocation, so the ordering is fixed by construction.
/// Operations never mutate their operands.
#[derive(Debug, Clone)]
pub struct ForwardValue {
    value: f64,
    trace: Vec<f64>,
    names: Arc<[String]>,
}

impl ForwardValue {
    /// Create a value with an explicit trace.
    pub fn new(value: f64, trace: Vec<f64>, names: Arc<[String]>) -> Result<Self> {
        if trace.len() != names.len() {
            return Err(Error::Validation(format!(
                "trace has {} entries but {} variables are declared",
                trace.len(),
                names.len()
            )));
        }
        Ok(Self { value, trace, names })
    }

    /// Seed the independent variable at `index`: unit tangent at its own
    /// position, zero elsewhere.
    pub fn seed(names: Arc<[String]>, index: usize, value: f64) -> Result<Self> {
        if index >= names.len() {
            return Err(Error::Validation(format!(
                "seed index {index} out of range for {} variables",
                names.len()
            )));
        }
        let mut trace = vec![0.0; names.len()];
        trace[index] = 1.0;
        Ok(Self { value, trace, names })
    }

    /// Seed one leaf per declared variable, in order.
    pub fn variables<S: AsRef<str>>(names: &[S], values: &[f64]) -> Result<Vec<Self>> {
        if names.len() != values.len() {
            return Err(Error::Validation(format!(
                "{} names but {} values",
                names.len(),
                values.len()
            )));
        }
        let names: Arc<[String]> = names.iter().map(|n| n.as_ref().to_string()).collect();
        values.iter().enumerate().map(|(i, &v)| Self::seed(names.clone(), i, v)).collect()
    }

    /// A single independent variable (trace `[1.0]`).
    pub fn variable(name: &str, value: f64) -> Self {
        Self { value, trace: vec![1.0], names: Arc::from(vec![name.to_string()]) }
    }

    /// A constant over the same variables as `self` (zero trace).
    pub fn constant_like(&self, value: f64) -> Self {
        Self { value, trace: vec![0.0; self.trace.len()], names: self.names.clone() }
    }

    /// Primal value.
    #[inline]
    pub fn value(&self) -> f64 {
        self.value
    }

    /// Partial derivatives, aligned with [`names`](Self::names).
    #[inline]
    pub fn trace(&self) -> &[f64] {
        &self.trace
    }

    /// Variable identifiers, aligned with [`trace`](Self::trace).
    #[inline]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Partial derivative with respect to `name`, if declared.
    pub fn partial(&self, name: &str) -> Option<f64> {
        self.names.iter().position(|n| n == name).map(|i| self.trace[i])
    }

    /// Chain rule for a unary step: new value, trace scaled by `local`.
    pub(crate) fn scaled(&self, value: f64, local: f64) -> Self {
        Self { value, trace: self.trace.iter().map(|t| t * local).collect(), names: self.names.clone() }
    }

    /// Whether `other` was seeded from the same variable ordering.
    pub fn same_variables(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.names, &other.names) || self.names == other.names
    }

    /// Combine two traces elementwise: `a * self.trace + b * rhs.trace`.
    ///
    /// # Panics
    /// If the operands were seeded from different variable orderings.
    fn combine(&self, rhs: &Self, value: f64, a: f64, b: f64) -> Self {
        assert!(
            self.same_variables(rhs),
            "forward values seeded from different variable orderings"
        );
        let trace = self.trace.iter().zip(rhs.trace.iter()).map(|(x, y)| a * x + b * y).collect();
        Self { value, trace, names: self.names.clone() }
    }

    /// Power with a real exponent: d/dx x^n = n * x^(n-1).
    ///
    /// A negative base with `|n| < 1` is rejected: the result is not real.
    pub fn powf(&self, n: f64) -> Result<Self> {
        check_real_power(self.value, n)?;
        Ok(self.scaled(self.value.powf(n), n * self.value.powf(n - 1.0)))
    }

    /// Power with a variable exponent:
    /// d(x^y) = y * x^(y-1) dx + x^y * ln(x) dy.
    ///
    /// The base must be positive even when the exponent's trace happens to
    /// be zero; use [`powf`](Self::powf) for a real exponent.
    pub fn pow(&self, exponent: &Self) -> Result<Self> {
        check_real_power(self.value, exponent.value)?;
        check_log_base(self.value)?;
        let value = self.value.powf(exponent.value);
        let a = exponent.value * self.value.powf(exponent.value - 1.0);
        let b = value * self.value.ln();
        Ok(self.combine(exponent, value, a, b))
    }

    /// `base^self` with a real base: d/dx b^x = b^x * ln(b).
    pub fn rpow(&self, base: f64) -> Result<Self> {
        check_real_power(base, self.value)?;
        check_log_base(base)?;
        let value = base.powf(self.value);
        Ok(self.scaled(value, value * base.ln()))
    }
}

/// Negative base with a fractional exponent in (-1, 1) has no real value.
pub(crate) fn check_real_power(base: f64, exponent: f64) -> Result<()> {
    if base < 0.0 && exponent.abs() < 1.0 {
        return Err(Error::Domain(format!(
            "{base} raised to {exponent}: negative base with |exponent| < 1"
        )));
    }
    Ok(())
}

/// The exponent's partial needs ln(base).
pub(crate) fn check_log_base(base: f64) -> Result<()> {
    if base <= 0.0 {
        return Err(Error::Domain(format!(
            "variable exponent requires a positive base, got {base}"
        )));
    }
    Ok(())
}

// --- Arithmetic: ForwardValue op ForwardValue ---

impl Add<&ForwardValue> for &ForwardValue {
    type Output = ForwardValue;
    fn add(self, rhs: &ForwardValue) -> ForwardValue {
        self.combine(rhs, self.value + rhs.value, 1.0, 1.0)
    }
}

impl Sub<&ForwardValue> for &ForwardValue {
    type Output = ForwardValue;
    fn sub(self, rhs: &ForwardValue) -> ForwardValue {
        self.combine(rhs, self.value - rhs.value, 1.0, -1.0)
    }
}

impl Mul<&ForwardValue> for &ForwardValue {
    type Output = ForwardValue;
    fn mul(self, rhs: &ForwardValue) -> ForwardValue {
        // d(uv) = v du + u dv
        self.combine(rhs, self.value * rhs.value, rhs.value, self.value)
    }
}

impl Div<&ForwardValue> for &ForwardValue {
    type Output = ForwardValue;
    fn div(self, rhs: &ForwardValue) -> ForwardValue {
        // d(u/v) = du/v - u dv/v^2
        let v2 = rhs.value * rhs.value;
        self.combine(rhs, self.value / rhs.value, 1.0 / rhs.value, -self.value / v2)
    }
}

// --- Arithmetic: ForwardValue op f64 ---

impl Add<f64> for &ForwardValue {
    type Output = ForwardValue;
    fn add(self, rhs: f64) -> ForwardValue {
        self.scaled(self.value + rhs, 1.0)
    }
}

impl Sub<f64> for &ForwardValue {
    type Output = ForwardValue;
    fn sub(self, rhs: f64) -> ForwardValue {
        self.scaled(self.value - rhs, 1.0)
    }
}

impl Mul<f64> for &ForwardValue {
    type Output = ForwardValue;
    fn mul(self, rhs: f64) -> ForwardValue {
        self.scaled(self.value * rhs, rhs)
    }
}

impl Div<f64> for &ForwardValue {
    type Output = ForwardValue;
    fn div(self, rhs: f64) -> ForwardValue {
        self.scaled(self.value / rhs, 1.0 / rhs)
    }
}

// --- Arithmetic: f64 op ForwardValue ---

impl Add<&ForwardValue> for f64 {
    type Output = ForwardValue;
    fn add(self, rhs: &ForwardValue) -> ForwardValue {
        rhs + self
    }
}

impl Sub<&ForwardValue> for f64 {
    type Output = ForwardValue;
    fn sub(self, rhs: &ForwardValue) -> ForwardValue {
        rhs.scaled(self - rhs.value, -1.0)
    }
}

impl Mul<&ForwardValue> for f64 {
    type Output = ForwardValue;
    fn mul(self, rhs: &ForwardValue) -> ForwardValue {
        rhs * self
    }
}

impl Div<&ForwardValue> for f64 {
    type Output = ForwardValue;
    fn div(self, rhs: &ForwardValue) -> ForwardValue {
        rhs.scaled(self / rhs.value, -self / (rhs.value * rhs.value))
    }
}

impl Neg for &ForwardValue {
    type Output = ForwardValue;
    fn neg(self) -> ForwardValue {
        self.scaled(-self.value, -1.0)
    }
}

impl Neg for ForwardValue {
    type Output = ForwardValue;
    fn neg(self) -> ForwardValue {
        -&self
    }
}

/// Owned-operand variants delegate to the borrowed impls above.
macro_rules! forward_owned_binop {
    ($($trait:ident :: $method:ident),* $(,)?) => {$(
        impl $trait for ForwardValue {
            type Output = ForwardValue;
            fn $method(self, rhs: ForwardValue) -> ForwardValue {
                (&self).$method(&rhs)
            }
        }

        impl $trait<&ForwardValue> for ForwardValue {
            type Output = ForwardValue;
            fn $method(self, rhs: &ForwardValue) -> ForwardValue {
                (&self).$method(rhs)
            }
        }

        impl $trait<ForwardValue> for &ForwardValue {
            type Output = ForwardValue;
            fn $method(self, rhs: ForwardValue) -> ForwardValue {
                self.$method(&rhs)
            }
        }

        impl $trait<f64> for ForwardValue {
            type Output = ForwardValue;
            fn $method(self, rhs: f64) -> ForwardValue {
                (&self).$method(rhs)
            }
        }

        impl $trait<ForwardValue> for f64 {
            type Output = ForwardValue;
            fn $method(self, rhs: ForwardValue) -> ForwardValue {
                self.$method(&rhs)
            }
        }
    )*};
}

forward_owned_binop!(Add::add, Sub::sub, Mul::mul, Div::div);

// --- Comparison (by value only) ---

impl PartialEq for ForwardValue {
    fn eq(&self, other: &Self) -> bool {
        self.value == other.value
    }
}

impl PartialEq<f64> for ForwardValue {
    fn eq(&self, other: &f64) -> bool {
        self.value == *other
    }
}

impl PartialOrd for ForwardValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.value.partial_cmp(&other.value)
    }
}

impl PartialOrd<f64> for ForwardValue {
    fn partial_cmp(&self, other: &f64) -> Option<Ordering> {
        self.value.partial_cmp(other)
    }
}

impl fmt::Display for ForwardValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ForwardValue(value={}, names={:?}, trace={:?})", self.value, self.names, self.trace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn xy(x: f64, y: f64) -> (ForwardValue, ForwardValue) {
        let mut v = ForwardValue::variables(&["x", "y"], &[x, y]).unwrap();
        let y = v.pop().unwrap();
        let x = v.pop().unwrap();
        (x, y)
    }

    #[test]
    fn test_seed_is_unit_vector() {
        let vars = ForwardValue::variables(&["x1", "x2", "x3"], &[5.0, 1.0, 2.0]).unwrap();
        assert_eq!(vars[0].trace(), &[1.0, 0.0, 0.0]);
        assert_eq!(vars[2].trace(), &[0.0, 0.0, 1.0]);
        assert_eq!(vars[1].names(), &["x1", "x2", "x3"]);
        assert_eq!(vars[0].value(), 5.0);
    }

    #[test]
    fn test_new_rejects_length_mismatch() {
        let names: Arc<[String]> = Arc::from(vec!["x".to_string()]);
        let err = ForwardValue::new(1.0, vec![1.0, 0.0], names).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_seed_index_out_of_range() {
        let names: Arc<[String]> = Arc::from(vec!["x".to_string()]);
        assert!(ForwardValue::seed(names, 1, 0.0).is_err());
    }

    #[test]
    fn test_add_sub() {
        let (x, y) = xy(3.0, 4.0);
        let s = &x + &y;
        assert_eq!(s.value(), 7.0);
        assert_eq!(s.trace(), &[1.0, 1.0]);

        let d = &x - &y;
        assert_eq!(d.value(), -1.0);
        assert_eq!(d.trace(), &[1.0, -1.0]);

        let c = 2.0 - &x;
        assert_eq!(c.value(), -1.0);
        assert_eq!(c.trace(), &[-1.0, 0.0]);

        let c = x.clone() + 3.0;
        assert_eq!(c.value(), 6.0);
        assert_eq!(c.trace(), &[1.0, 0.0]);
    }

    #[test]
    fn test_mul_div() {
        // f = x * y => (y, x)
        let (x, y) = xy(3.0, 4.0);
        let p = &x * &y;
        assert_eq!(p.value(), 12.0);
        assert_eq!(p.trace(), &[4.0, 3.0]);

        // f = x / y => (1/y, -x/y^2)
        let q = &x / &y;
        assert_relative_eq!(q.value(), 0.75, epsilon = 1e-12);
        assert_relative_eq!(q.trace()[0], 0.25, epsilon = 1e-12);
        assert_relative_eq!(q.trace()[1], -3.0 / 16.0, epsilon = 1e-12);

        // f = 8 / x => -8/x^2
        let r = 8.0 / &x;
        assert_relative_eq!(r.trace()[0], -8.0 / 9.0, epsilon = 1e-12);

        let s = 3.0 * x / 2.0;
        assert_relative_eq!(s.trace()[0], 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_neg() {
        let (x, _) = xy(3.0, 4.0);
        let n = -&x;
        assert_eq!(n.value(), -3.0);
        assert_eq!(n.trace(), &[-1.0, 0.0]);
    }

    #[test]
    fn test_powf() {
        // f = x^3 => 3x^2
        let x = ForwardValue::variable("x", 2.0);
        let y = x.powf(3.0).unwrap();
        assert_relative_eq!(y.value(), 8.0, epsilon = 1e-12);
        assert_relative_eq!(y.trace()[0], 12.0, epsilon = 1e-12);
    }

    #[test]
    fn test_powf_negative_base_fractional_exponent() {
        let x = ForwardValue::variable("x", -4.0);
        assert!(matches!(x.powf(0.5), Err(Error::Domain(_))));
        assert!(matches!(x.powf(-0.5), Err(Error::Domain(_))));
        // Integer exponent on a negative base is fine.
        let y = x.powf(2.0).unwrap();
        assert_relative_eq!(y.trace()[0], -8.0, epsilon = 1e-12);
    }

    #[test]
    fn test_pow_variable_exponent() {
        // f = x^y at (2, 3): df/dx = y x^(y-1) = 12, df/dy = x^y ln x = 8 ln 2
        let (x, y) = xy(2.0, 3.0);
        let f = x.pow(&y).unwrap();
        assert_relative_eq!(f.value(), 8.0, epsilon = 1e-12);
        assert_relative_eq!(f.trace()[0], 12.0, epsilon = 1e-12);
        assert_relative_eq!(f.trace()[1], 8.0 * 2.0_f64.ln(), epsilon = 1e-12);

        let (neg, y) = xy(-2.0, 3.0);
        assert!(matches!(neg.pow(&y), Err(Error::Domain(_))));
    }

    #[test]
    fn test_pow_zero_trace_exponent_still_needs_positive_base() {
        let (x, _) = xy(-2.0, 0.0);
        let three = x.constant_like(3.0);
        assert!(matches!(x.pow(&three), Err(Error::Domain(_))));
        let f = x.powf(3.0).unwrap();
        assert_relative_eq!(f.value(), -8.0, epsilon = 1e-12);
        assert_relative_eq!(f.trace()[0], 12.0, epsilon = 1e-12);
    }

    #[test]
    #[should_panic(expected = "different variable orderings")]
    fn test_combine_rejects_mismatched_orderings() {
        let a = ForwardValue::variable("x", 1.0);
        let b = ForwardValue::variables(&["x", "y"], &[1.0, 2.0]).unwrap();
        let _ = &a + &b[1];
    }

    #[test]
    fn test_rpow() {
        // f = 2^x at x = 3: 8 ln 2
        let x = ForwardValue::variable("x", 3.0);
        let f = x.rpow(2.0).unwrap();
        assert_relative_eq!(f.value(), 8.0, epsilon = 1e-12);
        assert_relative_eq!(f.trace()[0], 8.0 * 2.0_f64.ln(), epsilon = 1e-12);

        assert!(matches!(x.rpow(-2.0), Err(Error::Domain(_))));
    }

    #[test]
    fn test_comparisons_use_value_only() {
        let (x, y) = xy(3.0, 4.0);
        assert!(x < y);
        assert!(y > x);
        assert!(x <= 3.0);
        assert!(x == 3.0);
        assert!(x != y);
        // Same value, different trace: still equal.
        assert!(x == x.constant_like(3.0));
    }

    #[test]
    fn test_partial_lookup() {
        let (x, y) = xy(3.0, 4.0);
        let f = &x * &y;
        assert_eq!(f.partial("x"), Some(4.0));
        assert_eq!(f.partial("z"), None);
    }

    #[test]
    fn test_display() {
        let x = ForwardValue::variable("x", 1.5);
        let s = x.to_string();
        assert!(s.contains("value=1.5"));
        assert!(s.contains("\"x\""));
    }
}
