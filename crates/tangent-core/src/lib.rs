//! # tangent-core
//!
//! Shared building blocks for the tangent workspace: the [`Error`] type,
//! the [`Result`] alias, and the plain data types exchanged between the
//! differentiation engine, the expression front end and the CLI.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::{Derivative, DiffReport, DiffRequest, Mode, Variable};
