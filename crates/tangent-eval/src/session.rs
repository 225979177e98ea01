//! Differentiation entry points: compile a set of functions once, then
//! evaluate them with derivatives at any point in either mode.

use nalgebra::DMatrix;
use tangent_ad::extract::{forward_jacobian, reverse_jacobian};
use tangent_ad::functions::named_constant;
use tangent_ad::{ForwardValue, Graph, ReverseValue, Targets, Value};
use tangent_core::{Derivative, DiffReport, DiffRequest, Error, Mode, Result, Variable};

use crate::expr::CompiledExpr;

/// How an identifier of one expression is bound at evaluation time.
#[derive(Debug, Clone, Copy)]
enum Binding {
    /// Declared variable at this position.
    Leaf(usize),
    /// Named constant (`pi`, `e`) that no variable shadows.
    Constant(f64),
}

/// A compiled system of functions over an ordered set of variables.
#[derive(Debug, Clone)]
pub struct Problem {
    names: Vec<String>,
    exprs: Vec<CompiledExpr>,
    bindings: Vec<Vec<Binding>>,
}

/// Output values and Jacobian from one [`Problem::evaluate`] call.
#[derive(Debug, Clone)]
pub struct Evaluation {
    /// One value per function, in function order.
    pub values: Vec<f64>,
    /// Rows follow function order, columns follow target order.
    pub jacobian: DMatrix<f64>,
}

impl Problem {
    /// Compile `functions` against the declared variable `names`.
    ///
    /// Every identifier must be a declared variable or a named constant.
    pub fn compile<S: AsRef<str>>(functions: &[S], names: &[String]) -> Result<Self> {
        if functions.is_empty() {
            return Err(Error::Validation("at least one function is required".into()));
        }
        for (i, n) in names.iter().enumerate() {
            if names[..i].contains(n) {
                return Err(Error::Validation(format!("duplicate variable name '{n}'")));
            }
        }

        let mut exprs = Vec::with_capacity(functions.len());
        let mut bindings = Vec::with_capacity(functions.len());
        for f in functions {
            let expr = CompiledExpr::compile(f.as_ref())?;
            let bound = expr
                .identifiers
                .iter()
                .map(|id| {
                    if let Some(pos) = names.iter().position(|n| n == id) {
                        Ok(Binding::Leaf(pos))
                    } else if let Some(c) = named_constant(id) {
                        Ok(Binding::Constant(c))
                    } else {
                        Err(Error::Expression(format!(
                            "unbound variable '{id}' in '{}'",
                            expr.source()
                        )))
                    }
                })
                .collect::<Result<Vec<_>>>()?;
            exprs.push(expr);
            bindings.push(bound);
        }

        tracing::debug!(functions = exprs.len(), variables = names.len(), "compiled problem");
        Ok(Self { names: names.to_vec(), exprs, bindings })
    }

    /// Declared variable names.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of functions (Jacobian rows).
    pub fn len(&self) -> usize {
        self.exprs.len()
    }

    /// `true` if there are no functions; never the case for a compiled problem.
    pub fn is_empty(&self) -> bool {
        self.exprs.is_empty()
    }

    /// Evaluate every function at `point` and differentiate with respect to
    /// `targets`.
    ///
    /// Forward mode evaluates each output in its own pass over the seeded
    /// variables. Reverse mode records every output on one fresh graph and
    /// runs one backward traversal per output.
    pub fn evaluate(&self, point: &[f64], targets: &Targets, mode: Mode) -> Result<Evaluation> {
        if point.len() != self.names.len() {
            return Err(Error::Validation(format!(
                "point has {} coordinates but {} variables are declared",
                point.len(),
                self.names.len()
            )));
        }

        let (outputs, jacobian) = match mode {
            Mode::Forward => {
                let leaves: Vec<Value> = ForwardValue::variables(&self.names, point)?
                    .into_iter()
                    .map(Value::from)
                    .collect();
                let outputs = self.run(&leaves)?;
                let jac = forward_jacobian(&outputs, targets)?;
                (outputs, jac)
            }
            Mode::Reverse => {
                let graph = Graph::shared();
                let leaves: Vec<ReverseValue> =
                    point.iter().map(|&v| ReverseValue::leaf(&graph, v)).collect();
                let bound: Vec<Value> = leaves.iter().cloned().map(Value::from).collect();
                let outputs = self.run(&bound)?;
                {
                    let g = graph.borrow();
                    tracing::debug!(nodes = g.len(), edges = g.edge_count(), "recorded graph");
                }
                let jac = reverse_jacobian(&outputs, &leaves, targets)?;
                (outputs, jac)
            }
        };

        let values = outputs.iter().map(Value::value).collect();
        tracing::debug!(%mode, outputs = self.exprs.len(), targets = targets.len(), "evaluated problem");
        Ok(Evaluation { values, jacobian })
    }

    /// Plain function values at `point`, without derivatives.
    pub fn values(&self, point: &[f64]) -> Result<Vec<f64>> {
        if point.len() != self.names.len() {
            return Err(Error::Validation(format!(
                "point has {} coordinates but {} variables are declared",
                point.len(),
                self.names.len()
            )));
        }
        let leaves: Vec<Value> = point.iter().copied().map(Value::Constant).collect();
        Ok(self.run(&leaves)?.iter().map(Value::value).collect())
    }

    fn run(&self, leaves: &[Value]) -> Result<Vec<Value>> {
        self.exprs
            .iter()
            .zip(&self.bindings)
            .map(|(expr, bound)| {
                let args: Vec<Value> = bound
                    .iter()
                    .map(|b| match *b {
                        Binding::Leaf(i) => leaves[i].clone(),
                        Binding::Constant(c) => Value::Constant(c),
                    })
                    .collect();
                expr.eval(&args)
            })
            .collect()
    }
}

/// Differentiate `functions` at `variables` with respect to `targets`
/// (all variables when `None`).
///
/// `mode` is `"forward"` or `"reverse"`; anything else is an
/// [`Error::Mode`]. The result collapses to a scalar, a vector or a matrix
/// following the shape rules of [`Derivative`].
pub fn auto_diff<S: AsRef<str>>(
    functions: &[S],
    variables: &[Variable],
    targets: Option<&[String]>,
    mode: &str,
) -> Result<Derivative> {
    let mode: Mode = mode.parse()?;
    let mut request = DiffRequest::new(
        functions.iter().map(|f| f.as_ref().to_string()).collect(),
        variables.to_vec(),
    )
    .with_mode(mode);
    if let Some(t) = targets {
        request = request.with_targets(t.to_vec());
    }
    Ok(differentiate(&request)?.derivative)
}

/// Run a full [`DiffRequest`].
pub fn differentiate(request: &DiffRequest) -> Result<DiffReport> {
    request.validate()?;
    let names = request.variable_names();
    let problem = Problem::compile(&request.functions, &names)?;
    let targets = Targets::resolve(&names, request.targets.as_deref())?;
    let eval = problem.evaluate(&request.point(), &targets, request.mode)?;
    Ok(DiffReport {
        mode: request.mode,
        targets: targets.names().to_vec(),
        values: eval.values,
        derivative: Derivative::from(eval.jacobian),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn vars(pairs: &[(&str, f64)]) -> Vec<Variable> {
        pairs.iter().map(|&(n, v)| Variable::new(n, v)).collect()
    }

    #[test]
    fn test_single_function_single_variable() {
        for mode in ["forward", "reverse"] {
            let d = auto_diff(&["x^2 + 3*x"], &vars(&[("x", 2.0)]), None, mode).unwrap();
            assert_relative_eq!(d.as_scalar().unwrap(), 7.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_gradient_is_vector() {
        for mode in ["forward", "reverse"] {
            let d = auto_diff(&["x*y + sin(x)"], &vars(&[("x", 1.0), ("y", 2.0)]), None, mode)
                .unwrap();
            let g = d.as_vector().unwrap();
            assert_relative_eq!(g[0], 2.0 + 1.0_f64.cos(), epsilon = 1e-12);
            assert_relative_eq!(g[1], 1.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_single_target_column_is_vector() {
        let targets = vec!["y".to_string()];
        let d = auto_diff(
            &["x*y", "y^2"],
            &vars(&[("x", 3.0), ("y", 2.0)]),
            Some(targets.as_slice()),
            "reverse",
        )
        .unwrap();
        assert_eq!(d.as_vector().unwrap(), &[3.0, 4.0]);
    }

    #[test]
    fn test_long_sum_in_both_modes() {
        let sum = vec!["x"; 100_000].join("+");
        for mode in ["forward", "reverse"] {
            let d = auto_diff(&[sum.as_str()], &vars(&[("x", 1.0)]), None, mode).unwrap();
            assert_eq!(d.as_scalar(), Some(100_000.0));
        }
    }

    #[test]
    fn test_node_exponent_with_negative_base_fails_in_both_modes() {
        for mode in ["forward", "reverse"] {
            let r = auto_diff(&["x^(0*y + 2)"], &vars(&[("x", -2.0), ("y", 1.0)]), None, mode);
            assert!(matches!(r, Err(Error::Domain(_))), "{mode}: {r:?}");
            let ok = auto_diff(&["x^2"], &vars(&[("x", -2.0)]), None, mode).unwrap();
            assert_relative_eq!(ok.as_scalar().unwrap(), -4.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_log_base_default_in_both_modes() {
        for mode in ["forward", "reverse"] {
            let d = auto_diff(&["log_base(x)"], &vars(&[("x", 10.0)]), None, mode).unwrap();
            assert_relative_eq!(d.as_scalar().unwrap(), 1.0 / (10.0 * 10.0_f64.ln()), epsilon = 1e-12);
        }
    }

    #[test]
    fn test_bad_mode() {
        let r = auto_diff(&["x"], &vars(&[("x", 1.0)]), None, "sideways");
        assert!(matches!(r, Err(Error::Mode(_))));
    }

    #[test]
    fn test_undeclared_target() {
        let targets = vec!["z".to_string()];
        let r = auto_diff(&["x"], &vars(&[("x", 1.0)]), Some(targets.as_slice()), "forward");
        assert!(matches!(r, Err(Error::Domain(_))));
    }

    #[test]
    fn test_unbound_variable() {
        let r = Problem::compile(&["x + q"], &["x".to_string()]);
        assert!(matches!(r, Err(Error::Expression(_))));
    }

    #[test]
    fn test_named_constants_and_shadowing() {
        let p = Problem::compile(&["sin(pi*x)"], &["x".to_string()]).unwrap();
        let v = p.values(&[0.5]).unwrap();
        assert_relative_eq!(v[0], 1.0, epsilon = 1e-12);

        // A declared `e` is a variable, not Euler's number.
        let names = vec!["e".to_string()];
        let p = Problem::compile(&["e^2"], &names).unwrap();
        let ev = p.evaluate(&[3.0], &Targets::all(&names), Mode::Forward).unwrap();
        assert_relative_eq!(ev.values[0], 9.0, epsilon = 1e-12);
        assert_relative_eq!(ev.jacobian[(0, 0)], 6.0, epsilon = 1e-12);
    }

    #[test]
    fn test_constant_function_has_zero_row() {
        let names = vec!["x".to_string()];
        let p = Problem::compile(&["2 + 3", "x"], &names).unwrap();
        for mode in [Mode::Forward, Mode::Reverse] {
            let ev = p.evaluate(&[4.0], &Targets::all(&names), mode).unwrap();
            assert_eq!(ev.values, vec![5.0, 4.0]);
            assert_eq!(ev.jacobian[(0, 0)], 0.0);
            assert_eq!(ev.jacobian[(1, 0)], 1.0);
        }
    }

    #[test]
    fn test_report_fields() {
        let req = DiffRequest::new(vec!["x*y".into()], vars(&[("x", 2.0), ("y", 5.0)]))
            .with_mode(Mode::Reverse);
        let report = differentiate(&req).unwrap();
        assert_eq!(report.mode, Mode::Reverse);
        assert_eq!(report.targets, vec!["x", "y"]);
        assert_eq!(report.values, vec![10.0]);
        assert_eq!(report.derivative, Derivative::Vector(vec![5.0, 2.0]));
    }

    #[test]
    fn test_point_length_checked() {
        let names = vec!["x".to_string()];
        let p = Problem::compile(&["x"], &names).unwrap();
        let r = p.evaluate(&[1.0, 2.0], &Targets::all(&names), Mode::Forward);
        assert!(matches!(r, Err(Error::Validation(_))));
    }
}
