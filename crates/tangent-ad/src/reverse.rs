//! Graph-based reverse-mode automatic differentiation.
//!
//! Every operation on a [`ReverseValue`] allocates a new node in a shared
//! [`Graph`] arena and appends `(local_derivative, new_node)` to the child
//! list of each node operand. Nothing beyond that one-step derivative is
//! computed at construction time; adjoints are accumulated afterwards by
//! [`Graph::gradient`] (sink-rooted, the adjoint of a node with no children
//! is 1) or [`Graph::backward`] (rooted at one chosen output).
//!
//! Children always have larger ids than their operands, so a single sweep in
//! decreasing id order visits every edge once.
//!
//! # Example
//! ```
//! use tangent_ad::{Graph, ReverseValue};
//!
//! let g = Graph::shared();
//! let x = ReverseValue::leaf(&g, 0.1);
//! let _y = &x * 2.0;
//! let _z = &x + 1.0;
//! // Both children are sinks with adjoint 1: 2*1 + 1*1.
//! assert_eq!(x.gradient(), 3.0);
//! ```

use std::cell::RefCell;
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};
use std::rc::Rc;

use tangent_core::Result;

use crate::forward::{check_log_base, check_real_power};

/// Handle to a node in a [`Graph`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// Position of the node in its arena.
    pub fn index(self) -> usize {
        self.0
    }
}

/// Node in the arena: value, adjoint and outgoing edges to the nodes that
/// consumed it.
#[derive(Debug, Clone)]
struct Node {
    value: f64,
    adjoint: f64,
    children: Vec<(f64, NodeId)>,
}

impl Node {
    fn new(value: f64) -> Self {
        Self { value, adjoint: 1.0, children: Vec::new() }
    }
}

/// Arena of reverse-mode nodes.
///
/// Build it through [`ReverseValue`] handles (or [`push`](Graph::push) /
/// [`record`](Graph::record) directly), then read derivatives with
/// [`gradient`](Graph::gradient) or [`backward`](Graph::backward) followed by
/// [`adjoint`](Graph::adjoint).
#[derive(Debug, Default)]
pub struct Graph {
    nodes: Vec<Node>,
}

/// Graph shared by all handles of one evaluation pass.
///
/// `Rc` keeps the graph on one thread: construction from several threads
/// against the same leaves is not supported.
pub type SharedGraph = Rc<RefCell<Graph>>;

impl Graph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self { nodes: Vec::new() }
    }

    /// Create a graph pre-allocated for `capacity` nodes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self { nodes: Vec::with_capacity(capacity) }
    }

    /// Create an empty graph ready to be shared between handles.
    pub fn shared() -> SharedGraph {
        Rc::new(RefCell::new(Self::new()))
    }

    /// Number of nodes in the arena.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the arena is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Number of recorded edges.
    pub fn edge_count(&self) -> usize {
        self.nodes.iter().map(|n| n.children.len()).sum()
    }

    // --- Construction ---

    /// Allocate a node with no operands (a leaf).
    #[inline]
    pub fn push(&mut self, value: f64) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node::new(value));
        id
    }

    /// Allocate a node with `value` and append `(local, new)` to the child
    /// list of each `(operand, local)` pair.
    pub fn record(&mut self, value: f64, operands: &[(NodeId, f64)]) -> NodeId {
        let id = self.push(value);
        for &(operand, local) in operands {
            self.nodes[operand.0].children.push((local, id));
        }
        id
    }

    // --- Access ---

    /// Primal value of a node.
    #[inline]
    pub fn value(&self, id: NodeId) -> f64 {
        self.nodes[id.0].value
    }

    /// Adjoint of a node. Meaningful after a traversal; 1.0 before.
    #[inline]
    pub fn adjoint(&self, id: NodeId) -> f64 {
        self.nodes[id.0].adjoint
    }

    /// Outgoing `(local_derivative, child)` edges of a node.
    #[inline]
    pub fn children(&self, id: NodeId) -> &[(f64, NodeId)] {
        &self.nodes[id.0].children
    }

    // --- Traversals ---

    /// Sink-rooted adjoint of `id`:
    /// `adjoint = Σ local * adjoint(child)`, and 1.0 for a node with no
    /// children.
    ///
    /// Memoized per traversal: nodes reachable from `id` are marked first,
    /// then visited once each in decreasing id order, so diamonds cost
    /// O(|edges|) rather than one walk per path. The computed adjoint is
    /// stored on every visited node.
    pub fn gradient(&mut self, id: NodeId) -> f64 {
        let n = self.nodes.len();
        let mut reachable = vec![false; n];
        let mut stack = vec![id.0];
        reachable[id.0] = true;
        while let Some(i) = stack.pop() {
            for &(_, child) in &self.nodes[i].children {
                if !reachable[child.0] {
                    reachable[child.0] = true;
                    stack.push(child.0);
                }
            }
        }

        let mut visited = 0usize;
        for i in (id.0..n).rev() {
            if !reachable[i] {
                continue;
            }
            visited += 1;
            let node = &self.nodes[i];
            let adj: f64 = if node.children.is_empty() {
                1.0
            } else {
                node.children.iter().map(|&(d, c)| d * self.nodes[c.0].adjoint).sum()
            };
            self.nodes[i].adjoint = adj;
        }
        tracing::trace!(node = id.0, visited, "gradient traversal");
        self.nodes[id.0].adjoint
    }

    /// Rooted adjoint propagation for the output `root`.
    ///
    /// After this call, [`adjoint`](Graph::adjoint) of any node is
    /// ∂root/∂node: 1.0 for `root` itself, 0.0 for nodes that do not lie
    /// upstream of it (including other sinks). One sweep covers every
    /// ancestor, so the full gradient of one output costs one traversal.
    pub fn backward(&mut self, root: NodeId) {
        for node in &mut self.nodes[root.0 + 1..] {
            node.adjoint = 0.0;
        }
        self.nodes[root.0].adjoint = 1.0;

        for i in (0..root.0).rev() {
            let node = &self.nodes[i];
            let adj: f64 = node
                .children
                .iter()
                .filter(|(_, c)| c.0 <= root.0)
                .map(|&(d, c)| d * self.nodes[c.0].adjoint)
                .sum();
            self.nodes[i].adjoint = adj;
        }
        tracing::trace!(root = root.0, nodes = root.0 + 1, "backward traversal");
    }

    /// Drop the child edges of `id`, reset its adjoint to 1.0 and optionally
    /// overwrite its value.
    ///
    /// Required before reusing a leaf in an independent pass; otherwise the
    /// old edges are still summed by [`gradient`](Graph::gradient).
    pub fn reset(&mut self, id: NodeId, value: Option<f64>) {
        let node = &mut self.nodes[id.0];
        node.children.clear();
        node.adjoint = 1.0;
        if let Some(v) = value {
            node.value = v;
        }
    }
}

/// A node handle for reverse-mode AD.
///
/// Cloning a handle is cheap and refers to the same node. Arithmetic and the
/// elementary functions record new nodes on the shared graph; both node
/// operands of a binary operation must live on the same graph.
#[derive(Clone)]
pub struct ReverseValue {
    graph: SharedGraph,
    id: NodeId,
}

impl ReverseValue {
    /// Record a leaf (independent variable) on `graph`.
    pub fn leaf(graph: &SharedGraph, value: f64) -> Self {
        let id = graph.borrow_mut().push(value);
        Self { graph: graph.clone(), id }
    }

    /// Node handle.
    #[inline]
    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Graph this node lives on.
    #[inline]
    pub fn graph(&self) -> &SharedGraph {
        &self.graph
    }

    /// Whether `other` lives on the same graph.
    #[inline]
    pub fn same_graph(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.graph, &other.graph)
    }

    /// Primal value.
    pub fn value(&self) -> f64 {
        self.graph.borrow().value(self.id)
    }

    /// Adjoint from the last traversal that touched this node.
    pub fn adjoint(&self) -> f64 {
        self.graph.borrow().adjoint(self.id)
    }

    /// Snapshot of the outgoing edges.
    pub fn children(&self) -> Vec<(f64, NodeId)> {
        self.graph.borrow().children(self.id).to_vec()
    }

    /// Sink-rooted adjoint of this node; see [`Graph::gradient`].
    pub fn gradient(&self) -> f64 {
        self.graph.borrow_mut().gradient(self.id)
    }

    /// Propagate adjoints from this node as the output; see [`Graph::backward`].
    pub fn backward(&self) {
        self.graph.borrow_mut().backward(self.id)
    }

    /// Clear children and adjoint, optionally overwriting the value; see
    /// [`Graph::reset`].
    pub fn reset(&self, value: Option<f64>) {
        self.graph.borrow_mut().reset(self.id, value)
    }

    pub(crate) fn record_unary(&self, value: f64, local: f64) -> Self {
        let id = self.graph.borrow_mut().record(value, &[(self.id, local)]);
        Self { graph: self.graph.clone(), id }
    }

    fn record_binary(&self, rhs: &Self, value: f64, d_lhs: f64, d_rhs: f64) -> Self {
        assert!(self.same_graph(rhs), "reverse values must share a graph");
        let id = self.graph.borrow_mut().record(value, &[(self.id, d_lhs), (rhs.id, d_rhs)]);
        Self { graph: self.graph.clone(), id }
    }

    /// Power with a real exponent: local derivative n * x^(n-1).
    pub fn powf(&self, n: f64) -> Result<Self> {
        let x = self.value();
        check_real_power(x, n)?;
        Ok(self.record_unary(x.powf(n), n * x.powf(n - 1.0)))
    }

    /// Power with a node exponent: locals y * x^(y-1) and x^y * ln(x).
    pub fn pow(&self, exponent: &Self) -> Result<Self> {
        let (x, y) = (self.value(), exponent.value());
        check_real_power(x, y)?;
        check_log_base(x)?;
        let value = x.powf(y);
        Ok(self.record_binary(exponent, value, y * x.powf(y - 1.0), value * x.ln()))
    }

    /// `base^self` with a real base: local derivative b^x * ln(b).
    pub fn rpow(&self, base: f64) -> Result<Self> {
        let x = self.value();
        check_real_power(base, x)?;
        check_log_base(base)?;
        let value = base.powf(x);
        Ok(self.record_unary(value, value * base.ln()))
    }
}

impl fmt::Debug for ReverseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let g = self.graph.borrow();
        f.debug_struct("ReverseValue")
            .field("id", &self.id.0)
            .field("value", &g.value(self.id))
            .field("adjoint", &g.adjoint(self.id))
            .field("children", &g.children(self.id).len())
            .finish()
    }
}

impl fmt::Display for ReverseValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ReverseValue(value={})", self.value())
    }
}

// --- Arithmetic: ReverseValue op ReverseValue ---

impl Add<&ReverseValue> for &ReverseValue {
    type Output = ReverseValue;
    fn add(self, rhs: &ReverseValue) -> ReverseValue {
        self.record_binary(rhs, self.value() + rhs.value(), 1.0, 1.0)
    }
}

impl Sub<&ReverseValue> for &ReverseValue {
    type Output = ReverseValue;
    fn sub(self, rhs: &ReverseValue) -> ReverseValue {
        self.record_binary(rhs, self.value() - rhs.value(), 1.0, -1.0)
    }
}

impl Mul<&ReverseValue> for &ReverseValue {
    type Output = ReverseValue;
    fn mul(self, rhs: &ReverseValue) -> ReverseValue {
        let (a, b) = (self.value(), rhs.value());
        self.record_binary(rhs, a * b, b, a)
    }
}

impl Div<&ReverseValue> for &ReverseValue {
    type Output = ReverseValue;
    fn div(self, rhs: &ReverseValue) -> ReverseValue {
        let (a, b) = (self.value(), rhs.value());
        self.record_binary(rhs, a / b, 1.0 / b, -a / (b * b))
    }
}

// --- Arithmetic: ReverseValue op f64 (the constant gets no node) ---

impl Add<f64> for &ReverseValue {
    type Output = ReverseValue;
    fn add(self, rhs: f64) -> ReverseValue {
        self.record_unary(self.value() + rhs, 1.0)
    }
}

impl Sub<f64> for &ReverseValue {
    type Output = ReverseValue;
    fn sub(self, rhs: f64) -> ReverseValue {
        self.record_unary(self.value() - rhs, 1.0)
    }
}

impl Mul<f64> for &ReverseValue {
    type Output = ReverseValue;
    fn mul(self, rhs: f64) -> ReverseValue {
        self.record_unary(self.value() * rhs, rhs)
    }
}

impl Div<f64> for &ReverseValue {
    type Output = ReverseValue;
    fn div(self, rhs: f64) -> ReverseValue {
        self.record_unary(self.value() / rhs, 1.0 / rhs)
    }
}

// --- Arithmetic: f64 op ReverseValue ---

impl Add<&ReverseValue> for f64 {
    type Output = ReverseValue;
    fn add(self, rhs: &ReverseValue) -> ReverseValue {
        rhs + self
    }
}

impl Sub<&ReverseValue> for f64 {
    type Output = ReverseValue;
    fn sub(self, rhs: &ReverseValue) -> ReverseValue {
        rhs.record_unary(self - rhs.value(), -1.0)
    }
}

impl Mul<&ReverseValue> for f64 {
    type Output = ReverseValue;
    fn mul(self, rhs: &ReverseValue) -> ReverseValue {
        rhs * self
    }
}

impl Div<&ReverseValue> for f64 {
    type Output = ReverseValue;
    fn div(self, rhs: &ReverseValue) -> ReverseValue {
        let b = rhs.value();
        rhs.record_unary(self / b, -self / (b * b))
    }
}

impl Neg for &ReverseValue {
    type Output = ReverseValue;
    fn neg(self) -> ReverseValue {
        self.record_unary(-self.value(), -1.0)
    }
}

impl Neg for ReverseValue {
    type Output = ReverseValue;
    fn neg(self) -> ReverseValue {
        -&self
    }
}

/// Owned-operand variants delegate to the borrowed impls above.
macro_rules! reverse_owned_binop {
    ($($trait:ident :: $method:ident),* $(,)?) => {$(
        impl $trait for ReverseValue {
            type Output = ReverseValue;
            fn $method(self, rhs: ReverseValue) -> ReverseValue {
                (&self).$method(&rhs)
            }
        }

        impl $trait<&ReverseValue> for ReverseValue {
            type Output = ReverseValue;
            fn $method(self, rhs: &ReverseValue) -> ReverseValue {
                (&self).$method(rhs)
            }
        }

        impl $trait<ReverseValue> for &ReverseValue {
            type Output = ReverseValue;
            fn $method(self, rhs: ReverseValue) -> ReverseValue {
                self.$method(&rhs)
            }
        }

        impl $trait<f64> for ReverseValue {
            type Output = ReverseValue;
            fn $method(self, rhs: f64) -> ReverseValue {
                (&self).$method(rhs)
            }
        }

        impl $trait<ReverseValue> for f64 {
            type Output = ReverseValue;
            fn $method(self, rhs: ReverseValue) -> ReverseValue {
                self.$method(&rhs)
            }
        }
    )*};
}

reverse_owned_binop!(Add::add, Sub::sub, Mul::mul, Div::div);

// --- Comparison (by value only) ---

impl PartialEq for ReverseValue {
    fn eq(&self, other: &Self) -> bool {
        self.value() == other.value()
    }
}

impl PartialEq<f64> for ReverseValue {
    fn eq(&self, other: &f64) -> bool {
        self.value() == *other
    }
}

impl PartialOrd for ReverseValue {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        self.value().partial_cmp(&other.value())
    }
}

impl PartialOrd<f64> for ReverseValue {
    fn partial_cmp(&self, other: &f64) -> Option<std::cmp::Ordering> {
        self.value().partial_cmp(other)
    }
}
