//! # tangent-ad
//!
//! Automatic differentiation (AD) of real-valued expressions.
//!
//! Provides:
//! - **Forward-mode AD** via [`ForwardValue`]: a value carrying its full
//!   per-variable tangent vector, so one pass yields the derivative of that
//!   output with respect to every variable.
//! - **Reverse-mode AD** via [`ReverseValue`] handles into a [`Graph`] arena:
//!   operations record local derivatives, and adjoints are accumulated in a
//!   backward traversal.
//! - [`Scalar`], the capability trait that lets the elementary function
//!   library in [`functions`] be written once for `f64`, both node kinds and
//!   the dynamic [`Value`] union.
//! - The [`extract`] module, which reads scalar derivatives, gradients and
//!   Jacobians out of either representation.
//!
//! # Example
//! ```
//! use tangent_ad::{ForwardValue, functions};
//!
//! let vars = ForwardValue::variables(&["x", "y"], &[2.0, 3.0]).unwrap();
//! let (x, y) = (&vars[0], &vars[1]);
//! let z = functions::sin(&(x * y)).unwrap() + x;
//! // dz/dx = y*cos(xy) + 1, dz/dy = x*cos(xy)
//! assert!((z.trace()[0] - (3.0 * 6.0_f64.cos() + 1.0)).abs() < 1e-12);
//! assert!((z.trace()[1] - 2.0 * 6.0_f64.cos()).abs() < 1e-12);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod extract;
pub mod forward;
pub mod functions;
pub mod reverse;
pub mod scalar;
pub mod value;

pub use extract::Targets;
pub use forward::ForwardValue;
pub use functions::Elementary;
pub use reverse::{Graph, NodeId, ReverseValue, SharedGraph};
pub use scalar::Scalar;
pub use value::Value;
