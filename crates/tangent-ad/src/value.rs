//! [`Value`]: closed tagged union over the operand kinds an expression
//! evaluator can produce.
//!
//! Literals stay [`Value::Constant`] until they meet a node, so a constant
//! subexpression never allocates a trace or a graph node. Mixing forward and
//! reverse operands, or reverse operands from two graphs, is a
//! [`Error::TypeKind`] rather than a panic.

use std::cmp::Ordering;
use std::fmt;
use std::ops::Neg;

use tangent_core::{Error, Result};

use crate::forward::{ForwardValue, check_real_power};
use crate::reverse::ReverseValue;

/// A real constant, a forward-mode value or a reverse-mode node handle.
#[derive(Debug, Clone)]
pub enum Value {
    /// Plain real number (no derivative information).
    Constant(f64),
    /// Forward-mode value with a tangent vector.
    Forward(ForwardValue),
    /// Reverse-mode node handle.
    Reverse(ReverseValue),
}

impl Value {
    /// Primal value.
    pub fn value(&self) -> f64 {
        match self {
            Value::Constant(c) => *c,
            Value::Forward(f) => f.value(),
            Value::Reverse(r) => r.value(),
        }
    }

    /// Short name of the operand kind, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Constant(_) => "constant",
            Value::Forward(_) => "forward",
            Value::Reverse(_) => "reverse",
        }
    }

    /// The forward value, if this is one.
    pub fn as_forward(&self) -> Option<&ForwardValue> {
        match self {
            Value::Forward(f) => Some(f),
            _ => None,
        }
    }

    /// The reverse handle, if this is one.
    pub fn as_reverse(&self) -> Option<&ReverseValue> {
        match self {
            Value::Reverse(r) => Some(r),
            _ => None,
        }
    }

    /// `self + rhs`
    pub fn try_add(&self, rhs: &Value) -> Result<Value> {
        use Value::*;
        Ok(match (self, rhs) {
            (Constant(a), Constant(b)) => Constant(a + b),
            (Constant(a), Forward(b)) => Forward(*a + b),
            (Forward(a), Constant(b)) => Forward(a + *b),
            (Forward(a), Forward(b)) => Forward(same_seeds(a, b, "+")? + b),
            (Constant(a), Reverse(b)) => Reverse(*a + b),
            (Reverse(a), Constant(b)) => Reverse(a + *b),
            (Reverse(a), Reverse(b)) => Reverse(same_graph(a, b, "+")? + b),
            (a, b) => return Err(mixed(a, b, "+")),
        })
    }

    /// `self - rhs`
    pub fn try_sub(&self, rhs: &Value) -> Result<Value> {
        use Value::*;
        Ok(match (self, rhs) {
            (Constant(a), Constant(b)) => Constant(a - b),
            (Constant(a), Forward(b)) => Forward(*a - b),
            (Forward(a), Constant(b)) => Forward(a - *b),
            (Forward(a), Forward(b)) => Forward(same_seeds(a, b, "-")? - b),
            (Constant(a), Reverse(b)) => Reverse(*a - b),
            (Reverse(a), Constant(b)) => Reverse(a - *b),
            (Reverse(a), Reverse(b)) => Reverse(same_graph(a, b, "-")? - b),
            (a, b) => return Err(mixed(a, b, "-")),
        })
    }

    /// `self * rhs`
    pub fn try_mul(&self, rhs: &Value) -> Result<Value> {
        use Value::*;
        Ok(match (self, rhs) {
            (Constant(a), Constant(b)) => Constant(a * b),
            (Constant(a), Forward(b)) => Forward(*a * b),
            (Forward(a), Constant(b)) => Forward(a * *b),
            (Forward(a), Forward(b)) => Forward(same_seeds(a, b, "*")? * b),
            (Constant(a), Reverse(b)) => Reverse(*a * b),
            (Reverse(a), Constant(b)) => Reverse(a * *b),
            (Reverse(a), Reverse(b)) => Reverse(same_graph(a, b, "*")? * b),
            (a, b) => return Err(mixed(a, b, "*")),
        })
    }

    /// `self / rhs`
    pub fn try_div(&self, rhs: &Value) -> Result<Value> {
        use Value::*;
        Ok(match (self, rhs) {
            (Constant(a), Constant(b)) => Constant(a / b),
            (Constant(a), Forward(b)) => Forward(*a / b),
            (Forward(a), Constant(b)) => Forward(a / *b),
            (Forward(a), Forward(b)) => Forward(same_seeds(a, b, "/")? / b),
            (Constant(a), Reverse(b)) => Reverse(*a / b),
            (Reverse(a), Constant(b)) => Reverse(a / *b),
            (Reverse(a), Reverse(b)) => Reverse(same_graph(a, b, "/")? / b),
            (a, b) => return Err(mixed(a, b, "/")),
        })
    }

    /// `self ^ rhs`, with the domain guards of the power rule.
    pub fn try_pow(&self, rhs: &Value) -> Result<Value> {
        use Value::*;
        Ok(match (self, rhs) {
            (Constant(a), Constant(b)) => {
                check_real_power(*a, *b)?;
                Constant(a.powf(*b))
            }
            (Constant(a), Forward(b)) => Forward(b.rpow(*a)?),
            (Forward(a), Constant(b)) => Forward(a.powf(*b)?),
            (Forward(a), Forward(b)) => Forward(same_seeds(a, b, "^")?.pow(b)?),
            (Constant(a), Reverse(b)) => Reverse(b.rpow(*a)?),
            (Reverse(a), Constant(b)) => Reverse(a.powf(*b)?),
            (Reverse(a), Reverse(b)) => Reverse(same_graph(a, b, "^")?.pow(b)?),
            (a, b) => return Err(mixed(a, b, "^")),
        })
    }
}

fn mixed(a: &Value, b: &Value, op: &str) -> Error {
    Error::TypeKind(format!("cannot apply '{op}' to {} and {} operands", a.kind(), b.kind()))
}

fn same_seeds<'a>(a: &'a ForwardValue, b: &ForwardValue, op: &str) -> Result<&'a ForwardValue> {
    if a.same_variables(b) {
        Ok(a)
    } else {
        Err(Error::TypeKind(format!(
            "cannot apply '{op}' to forward values seeded from different variables"
        )))
    }
}

fn same_graph<'a>(a: &'a ReverseValue, b: &ReverseValue, op: &str) -> Result<&'a ReverseValue> {
    if a.same_graph(b) {
        Ok(a)
    } else {
        Err(Error::TypeKind(format!("cannot apply '{op}' to reverse nodes from different graphs")))
    }
}

impl Neg for &Value {
    type Output = Value;
    fn neg(self) -> Value {
        match self {
            Value::Constant(c) => Value::Constant(-c),
            Value::Forward(f) => Value::Forward(-f),
            Value::Reverse(r) => Value::Reverse(-r),
        }
    }
}

impl Neg for Value {
    type Output = Value;
    fn neg(self) -> Value {
        -&self
    }
}

impl From<f64> for Value {
    fn from(c: f64) -> Self {
        Value::Constant(c)
    }
}

impl From<ForwardValue> for Value {
    fn from(f: ForwardValue) -> Self {
        Value::Forward(f)
    }
}

impl From<ReverseValue> for Value {
    fn from(r: ReverseValue) -> Self {
        Value::Reverse(r)
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.value() == other.value()
    }
}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        self.value().partial_cmp(&other.value())
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Constant(c) => write!(f, "{c}"),
            Value::Forward(v) => fmt::Display::fmt(v, f),
            Value::Reverse(v) => fmt::Display::fmt(v, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::functions;
    use crate::reverse::Graph;
    use approx::assert_relative_eq;

    #[test]
    fn test_constant_folding_stays_constant() {
        let a = Value::from(2.0);
        let b = Value::from(3.0);
        let c = a.try_mul(&b).unwrap().try_add(&Value::from(1.0)).unwrap();
        assert!(matches!(c, Value::Constant(v) if v == 7.0));
        assert_eq!(c.kind(), "constant");
    }

    #[test]
    fn test_constant_with_forward() {
        let x = Value::from(ForwardValue::variable("x", 4.0));
        let y = Value::from(1.0).try_sub(&x).unwrap();
        let f = y.as_forward().unwrap();
        assert_eq!(f.value(), -3.0);
        assert_eq!(f.trace(), &[-1.0]);

        let p = Value::from(2.0).try_pow(&x).unwrap();
        assert_relative_eq!(p.as_forward().unwrap().trace()[0], 16.0 * 2.0_f64.ln(), epsilon = 1e-12);
    }

    #[test]
    fn test_constant_with_reverse() {
        let g = Graph::shared();
        let leaf = ReverseValue::leaf(&g, 4.0);
        let x = Value::from(leaf.clone());
        let y = x.try_div(&Value::from(2.0)).unwrap().try_pow(&Value::from(3.0)).unwrap();
        assert_relative_eq!(y.value(), 8.0, epsilon = 1e-12);
        // d/dx (x/2)^3 = 3/2 (x/2)^2 = 6
        assert_relative_eq!(leaf.gradient(), 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_mixed_kinds_rejected() {
        let g = Graph::shared();
        let r = Value::from(ReverseValue::leaf(&g, 1.0));
        let f = Value::from(ForwardValue::variable("x", 1.0));
        for res in [r.try_add(&f), f.try_sub(&r), r.try_mul(&f), f.try_div(&r), r.try_pow(&f)] {
            assert!(matches!(res, Err(Error::TypeKind(_))));
        }
        assert_eq!(g.borrow().len(), 1);
    }

    #[test]
    fn test_cross_graph_rejected() {
        let a = Value::from(ReverseValue::leaf(&Graph::shared(), 1.0));
        let b = Value::from(ReverseValue::leaf(&Graph::shared(), 2.0));
        assert!(matches!(a.try_add(&b), Err(Error::TypeKind(_))));
    }

    #[test]
    fn test_forward_seeds_must_match() {
        let a = Value::from(ForwardValue::variable("x", 1.0));
        let vs = ForwardValue::variables(&["x", "y"], &[1.0, 2.0]).unwrap();
        let b = Value::from(vs[1].clone());
        for res in [a.try_add(&b), a.try_sub(&b), a.try_mul(&b), a.try_div(&b), a.try_pow(&b)] {
            assert!(matches!(res, Err(Error::TypeKind(_))));
        }
    }

    #[test]
    fn test_node_exponent_needs_positive_base_in_both_modes() {
        // x^(0*y + 2) at x = -2: the exponent is a node even with a zero partial.
        let vs = ForwardValue::variables(&["x", "y"], &[-2.0, 1.0]).unwrap();
        let (fx, fy) = (Value::from(vs[0].clone()), Value::from(vs[1].clone()));
        let fe = Value::from(0.0).try_mul(&fy).unwrap().try_add(&Value::from(2.0)).unwrap();
        assert!(matches!(fx.try_pow(&fe), Err(Error::Domain(_))));

        let g = Graph::shared();
        let rx = Value::from(ReverseValue::leaf(&g, -2.0));
        let ry = Value::from(ReverseValue::leaf(&g, 1.0));
        let re = Value::from(0.0).try_mul(&ry).unwrap().try_add(&Value::from(2.0)).unwrap();
        assert!(matches!(rx.try_pow(&re), Err(Error::Domain(_))));

        // A constant exponent keeps the real power rule.
        let ok = fx.try_pow(&Value::from(2.0)).unwrap();
        assert_relative_eq!(ok.as_forward().unwrap().trace()[0], -4.0, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_pow_guard() {
        let r = Value::from(-8.0).try_pow(&Value::from(1.0 / 3.0));
        assert!(matches!(r, Err(Error::Domain(_))));
        let ok = Value::from(-2.0).try_pow(&Value::from(3.0)).unwrap();
        assert_eq!(ok.value(), -8.0);
    }

    #[test]
    fn test_functions_accept_value() {
        let x = Value::from(ForwardValue::variable("x", 0.0));
        let y = functions::cos(&-&x).unwrap();
        assert_relative_eq!(y.value(), 1.0, epsilon = 1e-12);
        assert!(matches!(functions::log(&Value::from(-1.0)), Err(Error::Domain(_))));
    }

    #[test]
    fn test_ordering_by_value() {
        let a = Value::from(1.0);
        let b = Value::from(ForwardValue::variable("x", 2.0));
        assert!(a < b);
        assert!(a != b);
        assert_eq!(a.to_string(), "1");
    }
}
