//! Common data types for tangent

use crate::{Error, Result};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Differentiation algorithm selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", rename_all = "lowercase")]
pub enum Mode {
    /// Tangent propagation: one pass per output yields a full Jacobian row.
    #[default]
    Forward,
    /// Graph recording plus one adjoint traversal per output.
    Reverse,
}

impl Mode {
    /// Lowercase name, as accepted by [`FromStr`].
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Forward => "forward",
            Mode::Reverse => "reverse",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "forward" => Ok(Mode::Forward),
            "reverse" => Ok(Mode::Reverse),
            _ => Err(Error::Mode(format!("'{s}' is not one of: forward, reverse"))),
        }
    }
}

impl TryFrom<String> for Mode {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

/// A named independent variable and the point it is seeded at.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    /// Identifier used in expression text
    pub name: String,
    /// Seed value
    pub value: f64,
}

impl Variable {
    /// Create a new variable
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self { name: name.into(), value }
    }
}

/// A differentiation request as read from a config file or built by a caller.
///
/// The order of `variables` is the declared ordering: it fixes the tangent
/// index of every forward leaf and the column order of the result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffRequest {
    /// Expression texts, one output per entry
    pub functions: Vec<String>,

    /// Independent variables in declared order
    pub variables: Vec<Variable>,

    /// Variables to differentiate against (default: all, in declared order)
    #[serde(default)]
    pub targets: Option<Vec<String>>,

    /// Algorithm selector (default: forward)
    #[serde(default)]
    pub mode: Mode,
}

impl DiffRequest {
    /// Create a request over all variables in forward mode.
    pub fn new(functions: Vec<String>, variables: Vec<Variable>) -> Self {
        Self { functions, variables, targets: None, mode: Mode::Forward }
    }

    /// Restrict the result columns to `targets`.
    pub fn with_targets(mut self, targets: Vec<String>) -> Self {
        self.targets = Some(targets);
        self
    }

    /// Select the algorithm.
    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Declared variable names, in order.
    pub fn variable_names(&self) -> Vec<String> {
        self.variables.iter().map(|v| v.name.clone()).collect()
    }

    /// Declared seed values, in order.
    pub fn point(&self) -> Vec<f64> {
        self.variables.iter().map(|v| v.value).collect()
    }

    /// Structural checks that do not need the expression compiler.
    pub fn validate(&self) -> Result<()> {
        if self.functions.is_empty() {
            return Err(Error::Validation("at least one function is required".into()));
        }
        if self.variables.is_empty() {
            return Err(Error::Validation("at least one variable is required".into()));
        }
        for (i, v) in self.variables.iter().enumerate() {
            if self.variables[..i].iter().any(|w| w.name == v.name) {
                return Err(Error::Validation(format!("duplicate variable '{}'", v.name)));
            }
        }
        Ok(())
    }
}

/// Derivative result with the layout collapsed to its natural shape.
///
/// Rows are outputs (caller order), columns are target variables (caller order).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Derivative {
    /// Single output, single target
    Scalar(f64),
    /// Single output (gradient row), or a single target across several outputs
    Vector(Vec<f64>),
    /// Full Jacobian, row-major
    Matrix(Vec<Vec<f64>>),
}

impl Derivative {
    /// The value if this is a scalar result.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Derivative::Scalar(v) => Some(*v),
            _ => None,
        }
    }

    /// The entries if this is a vector result.
    pub fn as_vector(&self) -> Option<&[f64]> {
        match self {
            Derivative::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// The rows if this is a matrix result.
    pub fn as_matrix(&self) -> Option<&[Vec<f64>]> {
        match self {
            Derivative::Matrix(m) => Some(m),
            _ => None,
        }
    }
}

impl From<DMatrix<f64>> for Derivative {
    fn from(m: DMatrix<f64>) -> Self {
        match (m.nrows(), m.ncols()) {
            (1, 1) => Derivative::Scalar(m[(0, 0)]),
            (1, _) => Derivative::Vector(m.row(0).iter().copied().collect()),
            (_, 1) => Derivative::Vector(m.column(0).iter().copied().collect()),
            (rows, _) => Derivative::Matrix(
                (0..rows).map(|r| m.row(r).iter().copied().collect()).collect(),
            ),
        }
    }
}

/// Output of one differentiation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiffReport {
    /// Algorithm used
    pub mode: Mode,
    /// Result columns, in order
    pub targets: Vec<String>,
    /// Output values, one per function
    pub values: Vec<f64>,
    /// Derivatives of the outputs with respect to `targets`
    pub derivative: Derivative,
}
