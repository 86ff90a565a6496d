//! Hook Attacher: the Jacobian-extraction core.
//!
//! [`attach_jacobian_hooks`] installs two interceptors around a forward pass.
//! The upstream interceptor captures the raw activation, replicates it
//! `n_outputs` times along a synthetic axis fused into the batch axis, and
//! injects an additive zero leaf with gradient tracking at exactly that
//! point. The downstream interceptor un-fuses the synthetic axis, zeroes the
//! gradient buffers, and triggers ONE backward pass seeded with an identity
//! matrix over the requested output range, so each replica receives the
//! gradient of one output index. The injected leaf's gradient buffer then
//! holds the full Jacobian slice, one row per output.

use std::cell::RefCell;
use std::ops::Range;
use std::rc::Rc;

use crate::error::{Error, Result};
use crate::float::Float;
use crate::graph::grad_enabled;
use crate::hook::{ForwardHook, HookHandle, HookPoint, HookedNetwork, Var};
use crate::tensor::Tensor;

/// Rendezvous record shared by the two interceptors of one attachment.
///
/// Rewritten on every forward pass; never shared across attachments.
#[derive(Debug)]
pub struct CaptureState<F: Float> {
    /// Raw upstream activation from the most recent pass.
    upstream_vec: Option<Tensor<F>>,
    /// The injected leaf's gradient buffer, copied out after the seeded
    /// backward pass. Still carries the fused synthetic axis.
    upstream_grad: Option<Tensor<F>>,
    /// Pass-local handle to the injected leaf, set by the upstream
    /// interceptor and consumed by the downstream interceptor.
    leaf: Option<Var>,
}

/// One live attachment: both interceptor handles plus the capture state.
///
/// Detaching consumes the value, so a double detach is unrepresentable.
#[derive(Debug)]
pub struct JacobianHooks<F: Float> {
    capture: Rc<RefCell<CaptureState<F>>>,
    upstream_handle: HookHandle,
    downstream_handle: HookHandle,
    outputs: Range<usize>,
}

/// Install the upstream and downstream interceptors on `network`.
///
/// The Jacobian is taken for downstream outputs in `outputs`
/// (`[start, stop)`). Preconditions are checked fail-fast: the range must be
/// non-empty and within the downstream feature width, both points must
/// exist, and reverse-mode recording must be enabled. The gradients only
/// populate once a forward pass has run through the network.
pub fn attach_jacobian_hooks<F: Float, N: HookedNetwork<F>>(
    network: &mut N,
    upstream: &HookPoint,
    downstream: &HookPoint,
    outputs: Range<usize>,
) -> Result<JacobianHooks<F>> {
    if outputs.start >= outputs.end {
        return Err(Error::EmptyOutputRange {
            start: outputs.start,
            stop: outputs.end,
        });
    }
    network.point_width(upstream)?;
    let width = network.point_width(downstream)?;
    if outputs.end > width {
        return Err(Error::RangeOutOfBounds {
            stop: outputs.end,
            width,
        });
    }
    if !grad_enabled() {
        return Err(Error::GradientTrackingDisabled);
    }

    let n_outputs = outputs.len();
    let capture = Rc::new(RefCell::new(CaptureState {
        upstream_vec: None,
        upstream_grad: None,
        leaf: None,
    }));

    let cap = Rc::clone(&capture);
    let upstream_hook: ForwardHook<F> = Box::new(move |ctx, out| {
        let raw = ctx.value(out).clone();
        let replicated = ctx.repeat_into_batch(out, n_outputs)?;
        let shape = ctx.value(replicated).shape.clone();
        // Do-nothing additive leaf: changes no forward value, but gives a
        // gradient-tracked node at exactly the upstream point, one replica
        // per output index.
        let leaf = ctx.zeros_tracked(&shape);
        {
            let mut state = cap.borrow_mut();
            state.upstream_vec = Some(raw);
            state.upstream_grad = None;
            state.leaf = Some(leaf);
        }
        let injected = ctx.add(replicated, leaf)?;
        Ok(Some(injected))
    });

    let cap = Rc::clone(&capture);
    let range = outputs.clone();
    let downstream_hook: ForwardHook<F> = Box::new(move |ctx, out| {
        // Consume the pass-local leaf handle; absent means the upstream
        // interceptor never fired this pass.
        let leaf = match cap.borrow_mut().leaf.take() {
            Some(leaf) => leaf,
            None => return Err(Error::UpstreamNotCaptured),
        };
        // Pull the output-index axis we snuck into the batch axis back out.
        let unfused = ctx.split_from_batch(out, n_outputs)?;
        let sliced = ctx.slice_features(unfused, range.clone())?;
        ctx.zero_grads();
        let shape = ctx.value(sliced).shape.clone();
        let seed = Tensor::identity_seed(&shape[..shape.len() - 2], n_outputs);
        ctx.backward(sliced, seed)?;
        cap.borrow_mut().upstream_grad = ctx.grad(leaf).cloned();
        Ok(None)
    });

    let upstream_handle = network.install_hook(upstream, upstream_hook)?;
    let downstream_handle = match network.install_hook(downstream, downstream_hook) {
        Ok(handle) => handle,
        Err(err) => {
            let _ = network.remove_hook(upstream_handle);
            return Err(err);
        }
    };

    Ok(JacobianHooks {
        capture,
        upstream_handle,
        downstream_handle,
        outputs,
    })
}

impl<F: Float> JacobianHooks<F> {
    /// The Jacobian slice from the most recent forward pass, un-fused to
    /// `[batch, pos.., n_outputs, d_upstream]`.
    pub fn jacobian(&self) -> Result<Tensor<F>> {
        let state = self.capture.borrow();
        match &state.upstream_grad {
            Some(fused) => fused.split_from_batch(self.outputs.len()),
            None => Err(Error::Uninitialized { what: "jacobian" }),
        }
    }

    /// The raw upstream activation captured by the most recent forward pass.
    pub fn upstream_vec(&self) -> Result<Tensor<F>> {
        let state = self.capture.borrow();
        state
            .upstream_vec
            .clone()
            .ok_or(Error::Uninitialized { what: "upstream vector" })
    }

    /// Number of downstream outputs covered by this attachment.
    pub fn n_outputs(&self) -> usize {
        self.outputs.len()
    }

    /// The downstream output range covered by this attachment.
    pub fn outputs(&self) -> Range<usize> {
        self.outputs.clone()
    }

    /// Remove both interceptors, leaving the network's forward behavior as
    /// if they had never been installed.
    pub fn detach<N: HookedNetwork<F>>(self, network: &mut N) -> Result<()> {
        network.remove_hook(self.upstream_handle)?;
        network.remove_hook(self.downstream_handle)
    }
}
