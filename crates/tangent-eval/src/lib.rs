//! # tangent-eval
//!
//! Text front end for [`tangent_ad`]: compiles functions given as strings,
//! evaluates them with forward- or reverse-mode derivatives and assembles
//! the result.
//!
//! ## Example
//!
//! ```
//! use tangent_core::Variable;
//! use tangent_eval::auto_diff;
//!
//! let vars = [Variable::new("x", 2.0), Variable::new("y", 3.0)];
//! let d = auto_diff(&["x * y + y^2"], &vars, None, "reverse").unwrap();
//! assert_eq!(d.as_vector().unwrap(), &[3.0, 8.0]);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod expr;
pub mod root;
pub mod session;

pub use expr::CompiledExpr;
pub use root::{NewtonOptions, RootResult, find_root};
pub use session::{Evaluation, Problem, auto_diff, differentiate};
