//! [`Scalar`] trait: abstraction over `f64`, [`ForwardValue`], [`ReverseValue`]
//! and [`Value`] that lets every elementary function be written once and
//! reused for plain evaluation, tangent propagation and graph recording.

use crate::forward::ForwardValue;
use crate::reverse::ReverseValue;
use crate::value::Value;

/// An operand the elementary function library can act on.
///
/// Implementors only need to know how to apply a single one-operand step
/// given its result value and its local derivative; the chain rule for each
/// representation lives in [`chain`](Scalar::chain).
pub trait Scalar: Clone {
    /// Extract the primal (function) value.
    fn value(&self) -> f64;

    /// `true` for plain reals, which carry no derivative information.
    ///
    /// Guards that only matter for the derivative (e.g. `arcsin` at ±1)
    /// are skipped for constants.
    fn is_constant(&self) -> bool;

    /// Result of a unary step `f(self)` where `value = f(self.value())` and
    /// `local = f'(self.value())`.
    fn chain(&self, value: f64, local: f64) -> Self;
}

// --- f64 implementation ---

impl Scalar for f64 {
    #[inline]
    fn value(&self) -> f64 {
        *self
    }

    #[inline]
    fn is_constant(&self) -> bool {
        true
    }

    #[inline]
    fn chain(&self, value: f64, _local: f64) -> Self {
        value
    }
}

// --- ForwardValue implementation ---

impl Scalar for ForwardValue {
    #[inline]
    fn value(&self) -> f64 {
        ForwardValue::value(self)
    }

    #[inline]
    fn is_constant(&self) -> bool {
        false
    }

    fn chain(&self, value: f64, local: f64) -> Self {
        self.scaled(value, local)
    }
}

// --- ReverseValue implementation ---

impl Scalar for ReverseValue {
    #[inline]
    fn value(&self) -> f64 {
        ReverseValue::value(self)
    }

    #[inline]
    fn is_constant(&self) -> bool {
        false
    }

    fn chain(&self, value: f64, local: f64) -> Self {
        self.record_unary(value, local)
    }
}

// --- Value implementation ---

impl Scalar for Value {
    fn value(&self) -> f64 {
        Value::value(self)
    }

    fn is_constant(&self) -> bool {
        matches!(self, Value::Constant(_))
    }

    fn chain(&self, value: f64, local: f64) -> Self {
        match self {
            Value::Constant(_) => Value::Constant(value),
            Value::Forward(f) => Value::Forward(f.chain(value, local)),
            Value::Reverse(r) => Value::Reverse(r.chain(value, local)),
        }
    }
}
