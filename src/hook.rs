//! Capability seams between the Jacobian hooks, the autograd engine, and the
//! host network.
//!
//! The attacher and driver never see a concrete engine or model. Hooks
//! program against [`HookCtx`] (observe values, inject leaves, trigger a
//! seeded backward pass) and the driver programs against [`HookedNetwork`]
//! (install/remove interceptors, evaluate, toggle parameter tracking). The
//! bundled reference implementations live in [`crate::graph`] and
//! [`crate::net`].

use std::fmt;
use std::ops::Range;

use crate::error::Result;
use crate::float::Float;
use crate::tensor::Tensor;

/// Handle to a value node in a recording graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Var(pub(crate) usize);

/// Name of an addressable interception point in a network's forward pass.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HookPoint(pub String);

impl HookPoint {
    /// Name a hook point.
    pub fn new(name: impl Into<String>) -> Self {
        HookPoint(name.into())
    }
}

impl From<&str> for HookPoint {
    fn from(name: &str) -> Self {
        HookPoint(name.to_string())
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Handle returned by hook installation, used to remove the hook again.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HookHandle(pub(crate) u64);

/// Forward-evaluation interceptor.
///
/// Fired with the recording context and the hooked node's output after the
/// node produces its value. Returning `Some(var)` replaces the value that
/// continues to flow forward; returning `None` leaves it untouched.
pub type ForwardHook<F> = Box<dyn FnMut(&mut dyn HookCtx<F>, Var) -> Result<Option<Var>>>;

/// Capability interface the interceptors program against: an
/// observable-and-replaceable computation graph with reverse-mode support.
pub trait HookCtx<F: Float> {
    /// Current value of a node.
    fn value(&self, v: Var) -> &Tensor<F>;

    /// Inject a zero-valued leaf of the given shape. The leaf tracks
    /// gradients only while reverse-mode recording is globally enabled.
    fn zeros_tracked(&mut self, shape: &[usize]) -> Var;

    /// Record an elementwise sum of two same-shaped nodes.
    fn add(&mut self, lhs: Var, rhs: Var) -> Result<Var>;

    /// Record a replication of each example `n` times, fused into the batch
    /// axis: `[b, rest..] -> [b·n, rest..]`.
    fn repeat_into_batch(&mut self, input: Var, n: usize) -> Result<Var>;

    /// Record the un-fusing of a synthetic axis out of the batch axis:
    /// `[b·n, pos.., d] -> [b, pos.., n, d]`.
    fn split_from_batch(&mut self, input: Var, n: usize) -> Result<Var>;

    /// Record a slice of the feature axis.
    fn slice_features(&mut self, input: Var, range: Range<usize>) -> Result<Var>;

    /// Zero every accumulated gradient buffer in the graph.
    fn zero_grads(&mut self);

    /// Reverse sweep from `from`, seeded with `seed` (same shape as the
    /// node's value). Each seed row propagates an independent signal.
    fn backward(&mut self, from: Var, seed: Tensor<F>) -> Result<()>;

    /// Accumulated gradient of a tracked leaf, if any backward pass has
    /// reached it since the last [`HookCtx::zero_grads`].
    fn grad(&self, v: Var) -> Option<&Tensor<F>>;
}

/// Capability interface the attacher and driver program against: a network
/// with named interception points, forward evaluation, and a per-parameter
/// gradient-tracking toggle.
pub trait HookedNetwork<F: Float> {
    /// Register an interceptor at a named point. Hooks at the same point fire
    /// in installation order.
    fn install_hook(&mut self, point: &HookPoint, hook: ForwardHook<F>) -> Result<HookHandle>;

    /// Remove an installed interceptor, leaving evaluation as if it had never
    /// been installed.
    fn remove_hook(&mut self, handle: HookHandle) -> Result<()>;

    /// Run a forward pass, firing any installed interceptors in layer order.
    fn evaluate(&mut self, input: &Tensor<F>) -> Result<Tensor<F>>;

    /// Set whether parameters accumulate gradients. Returns the previous
    /// setting so callers can restore it.
    fn set_params_tracked(&mut self, tracked: bool) -> bool;

    /// Feature width of the activation produced at a named point.
    fn point_width(&self, point: &HookPoint) -> Result<usize>;
}
