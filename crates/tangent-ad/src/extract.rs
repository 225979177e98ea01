//! Reading derivatives back out of evaluated outputs.
//!
//! Forward mode already holds every partial in each output's trace, so a
//! Jacobian row costs nothing beyond the evaluation pass. Reverse mode pays
//! one rooted [`backward`](crate::reverse::Graph::backward) traversal per
//! output and reads every requested leaf's adjoint from that single sweep.

use nalgebra::DMatrix;
use tangent_core::{Error, Result};

use crate::forward::ForwardValue;
use crate::reverse::ReverseValue;
use crate::value::Value;

/// Target variables resolved to positions in the declared ordering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Targets {
    names: Vec<String>,
    indices: Vec<usize>,
}

impl Targets {
    /// Resolve `requested` names against `declared`.
    ///
    /// `None` selects every declared variable in order. A name that is not
    /// declared is a [`Error::Domain`].
    pub fn resolve(declared: &[String], requested: Option<&[String]>) -> Result<Self> {
        let Some(requested) = requested else {
            return Ok(Self { names: declared.to_vec(), indices: (0..declared.len()).collect() });
        };
        let mut indices = Vec::with_capacity(requested.len());
        for name in requested {
            let idx = declared.iter().position(|d| d == name).ok_or_else(|| {
                Error::Domain(format!("target variable '{name}' is not declared"))
            })?;
            indices.push(idx);
        }
        Ok(Self { names: requested.to_vec(), indices })
    }

    /// Every declared variable.
    pub fn all(declared: &[String]) -> Self {
        Self { names: declared.to_vec(), indices: (0..declared.len()).collect() }
    }

    /// Target names, in request order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Positions of the targets in the declared ordering.
    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    /// Number of targets (Jacobian columns).
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// `true` when no target is selected.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

// --- Typed helpers ---

/// ∂output/∂`name`, read from the trace.
pub fn forward_derivative(output: &ForwardValue, name: &str) -> Result<f64> {
    output
        .partial(name)
        .ok_or_else(|| Error::Domain(format!("target variable '{name}' is not declared")))
}

/// Full gradient of one forward output, in declared order.
pub fn forward_gradient(output: &ForwardValue) -> Vec<f64> {
    output.trace().to_vec()
}

/// Derivative of the current sinks with respect to `leaf`.
///
/// Calls [`ReverseValue::gradient`]; the leaf must have been reset before
/// the evaluation pass if it took part in an earlier one.
pub fn reverse_derivative(leaf: &ReverseValue) -> f64 {
    leaf.gradient()
}

/// Gradient of `output` with respect to each of `leaves` from one traversal.
pub fn reverse_gradient(output: &ReverseValue, leaves: &[ReverseValue]) -> Result<Vec<f64>> {
    check_same_graph(output, leaves)?;
    output.backward();
    Ok(leaves.iter().map(ReverseValue::adjoint).collect())
}

fn check_same_graph(output: &ReverseValue, leaves: &[ReverseValue]) -> Result<()> {
    if leaves.iter().all(|l| l.same_graph(output)) {
        Ok(())
    } else {
        Err(Error::TypeKind("output and leaves live on different graphs".into()))
    }
}

// --- Jacobians ---

/// Jacobian of forward-mode outputs: row `i` is output `i`, column `j` is
/// target `j`. A constant output contributes a zero row.
pub fn forward_jacobian(outputs: &[Value], targets: &Targets) -> Result<DMatrix<f64>> {
    let mut jac = DMatrix::zeros(outputs.len(), targets.len());
    for (i, out) in outputs.iter().enumerate() {
        match out {
            Value::Constant(_) => {}
            Value::Forward(f) => {
                let trace = f.trace();
                for (j, &idx) in targets.indices().iter().enumerate() {
                    jac[(i, j)] = *trace.get(idx).ok_or_else(|| {
                        Error::Validation(format!(
                            "target index {idx} out of range for a trace of {} entries",
                            trace.len()
                        ))
                    })?;
                }
            }
            Value::Reverse(_) => {
                return Err(Error::TypeKind(format!(
                    "output {i} is a reverse node; forward extraction needs forward values"
                )));
            }
        }
    }
    tracing::debug!(outputs = outputs.len(), targets = targets.len(), "forward jacobian extracted");
    Ok(jac)
}

/// Jacobian of reverse-mode outputs recorded on one graph.
///
/// `leaves` are the declared variables in order; `targets` index into them.
/// Each node output gets its own rooted traversal, so outputs sharing
/// subexpressions never mix adjoints.
pub fn reverse_jacobian(
    outputs: &[Value],
    leaves: &[ReverseValue],
    targets: &Targets,
) -> Result<DMatrix<f64>> {
    if let Some(&idx) = targets.indices().iter().find(|&&idx| idx >= leaves.len()) {
        return Err(Error::Validation(format!(
            "target index {idx} out of range for {} leaves",
            leaves.len()
        )));
    }
    let mut jac = DMatrix::zeros(outputs.len(), targets.len());
    let mut traversals = 0usize;
    for (i, out) in outputs.iter().enumerate() {
        match out {
            Value::Constant(_) => {}
            Value::Reverse(r) => {
                check_same_graph(r, leaves)?;
                r.backward();
                traversals += 1;
                for (j, &idx) in targets.indices().iter().enumerate() {
                    jac[(i, j)] = leaves[idx].adjoint();
                }
            }
            Value::Forward(_) => {
                return Err(Error::TypeKind(format!(
                    "output {i} is a forward value; reverse extraction needs graph nodes"
                )));
            }
        }
    }
    tracing::debug!(
        outputs = outputs.len(),
        targets = targets.len(),
        traversals,
        "reverse jacobian extracted"
    );
    Ok(jac)
}
