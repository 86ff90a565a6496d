//! Jacobian extraction between named activations of a differentiable network.
//!
//! Computes `d(downstream)/d(upstream)` for a pair of named hook points in
//! ONE backward pass per example instead of one per output element. The
//! upstream activation is replicated `n_outputs` times along a synthetic
//! axis fused into the batch axis, a zero-valued gradient-tracking leaf is
//! injected additively at that point, and the backward pass is seeded with
//! an identity matrix so each replica receives the gradient of exactly one
//! downstream output. [`jac::attach_jacobian_hooks`] installs the two
//! interceptors; [`driver::calc_jacobian`] loops a batch through them one
//! example at a time to bound peak memory.
//!
//! The core is generic over the [`hook::HookCtx`] and
//! [`hook::HookedNetwork`] capability traits; [`graph::Graph`] and
//! [`net::Network`] are the bundled reference implementations used by tests
//! and benches.

pub mod driver;
pub mod error;
pub mod float;
pub mod graph;
pub mod hook;
pub mod jac;
pub mod net;
#[cfg(feature = "ndarray")]
pub mod ndarray_support;
pub mod tensor;

pub use driver::{calc_jacobian, with_tracked_params};
pub use error::{Error, Result};
pub use float::Float;
pub use graph::{grad_enabled, GradGuard, Graph};
pub use hook::{ForwardHook, HookCtx, HookHandle, HookPoint, HookedNetwork, Var};
pub use jac::{attach_jacobian_hooks, CaptureState, JacobianHooks};
pub use net::{Layer, Linear, Network, TanhLayer};
pub use tensor::Tensor;
