//! Newton's method for square systems `f(x) = 0`, with the Jacobian of each
//! step supplied by automatic differentiation.

use nalgebra::DVector;
use tangent_ad::Targets;
use tangent_core::{Error, Mode, Result, Variable};

use crate::session::Problem;

/// Newton iteration settings.
#[derive(Debug, Clone, Copy)]
pub struct NewtonOptions {
    /// Maximum number of Newton steps.
    pub max_iter: usize,
    /// Stop once `‖f(x)‖₂` is at or below this value.
    pub tolerance: f64,
    /// AD mode used for the Jacobian.
    pub mode: Mode,
}

impl Default for NewtonOptions {
    fn default() -> Self {
        Self { max_iter: 50, tolerance: 1e-10, mode: Mode::Forward }
    }
}

/// Outcome of [`find_root`].
#[derive(Debug, Clone)]
pub struct RootResult {
    /// Variable names, aligned with `point`.
    pub names: Vec<String>,
    /// Last iterate.
    pub point: Vec<f64>,
    /// `‖f(point)‖₂`.
    pub residual_norm: f64,
    /// Newton steps taken.
    pub iterations: usize,
    /// Whether the tolerance was reached within `max_iter` steps.
    pub converged: bool,
}

/// Solve `functions(x) = 0` starting from `initial`.
///
/// Each step solves `J Δ = -f` by LU decomposition. A singular Jacobian or a
/// non-finite iterate is an [`Error::Computation`]; running out of steps is
/// not an error and returns `converged = false`.
pub fn find_root<S: AsRef<str>>(
    functions: &[S],
    initial: &[Variable],
    options: &NewtonOptions,
) -> Result<RootResult> {
    if functions.len() != initial.len() {
        return Err(Error::Validation(format!(
            "root finding needs a square system: {} functions, {} variables",
            functions.len(),
            initial.len()
        )));
    }
    if !(options.tolerance.is_finite() && options.tolerance > 0.0) {
        return Err(Error::Validation(format!(
            "tolerance must be positive and finite, got {}",
            options.tolerance
        )));
    }

    let names: Vec<String> = initial.iter().map(|v| v.name.clone()).collect();
    let problem = Problem::compile(functions, &names)?;
    let targets = Targets::all(&names);
    let mut x = DVector::from_iterator(initial.len(), initial.iter().map(|v| v.value));

    let mut iterations = 0;
    loop {
        let eval = problem.evaluate(x.as_slice(), &targets, options.mode)?;
        let f = DVector::from_vec(eval.values);
        let residual_norm = f.norm();
        tracing::debug!(iteration = iterations, residual = residual_norm, "newton step");

        if residual_norm <= options.tolerance || iterations == options.max_iter {
            let converged = residual_norm <= options.tolerance;
            if converged {
                tracing::info!(iterations, residual = residual_norm, "newton converged");
            } else {
                tracing::info!(iterations, residual = residual_norm, "newton hit max_iter");
            }
            return Ok(RootResult {
                names,
                point: x.as_slice().to_vec(),
                residual_norm,
                iterations,
                converged,
            });
        }

        let delta = eval.jacobian.lu().solve(&(-&f)).ok_or_else(|| {
            Error::Computation(format!("singular Jacobian at iteration {iterations}"))
        })?;
        x += delta;
        iterations += 1;
        if x.iter().any(|v| !v.is_finite()) {
            return Err(Error::Computation(format!(
                "non-finite iterate at iteration {iterations}"
            )));
        }
    }
}
