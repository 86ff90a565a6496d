//! Jacobian Driver: batch iteration over the Hook Attacher.
//!
//! [`calc_jacobian`] walks a batch one example at a time. The replication
//! trick already multiplies memory by `n_outputs`; running the whole batch at
//! once would multiply by `batch · n_outputs` simultaneously, so each example
//! gets a fresh attachment that is fully consumed and detached before the
//! next one. Gradient-tracking state is scoped: the global toggle through the
//! RAII [`GradGuard`] and the parameter flag through
//! [`with_tracked_params`], both restored on failure as well as success.

use crate::error::Result;
use crate::float::Float;
use crate::graph::GradGuard;
use crate::hook::{HookPoint, HookedNetwork};
use crate::jac::attach_jacobian_hooks;
use crate::tensor::Tensor;

/// Run `f` with parameter gradient-tracking enabled, restoring the prior
/// setting on both `Ok` and `Err` exits.
pub fn with_tracked_params<F: Float, N: HookedNetwork<F>, R>(
    network: &mut N,
    f: impl FnOnce(&mut N) -> Result<R>,
) -> Result<R> {
    let prev = network.set_params_tracked(true);
    let result = f(network);
    network.set_params_tracked(prev);
    result
}

/// Compute `d(downstream)/d(upstream)` across a batch of inputs.
///
/// `tokens` is `[batch, *positional_axes, feature]`; the result is
/// `[batch, *positional_axes, n_outputs, d_upstream]`. `stop_idx` bounds the
/// downstream output range `[0, stop_idx)` and defaults to the downstream
/// point's full feature width. Any failure aborts the whole call with no
/// partial results, but tracking state is still restored.
///
/// ```
/// use jacquard::{calc_jacobian, HookPoint, Linear, Network, Tensor};
///
/// let w = Tensor::from_vec(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], &[3, 2]).unwrap();
/// let mut net = Network::new()
///     .with_layer("input", Linear::identity(2))
///     .with_layer("out", Linear::new(w, Tensor::zeros(&[3])).unwrap());
/// let tokens = Tensor::from_vec(vec![0.3, -0.7], &[1, 2]).unwrap();
///
/// let jac = calc_jacobian(
///     &mut net,
///     &HookPoint::from("input"),
///     &HookPoint::from("out"),
///     &tokens,
///     None,
/// )
/// .unwrap();
/// assert_eq!(jac.shape, vec![1, 3, 2]);
/// assert_eq!(jac.at(&[0, 2, 0]), 1.0); // d(out_2)/d(in_0)
/// ```
pub fn calc_jacobian<F: Float, N: HookedNetwork<F>>(
    network: &mut N,
    upstream: &HookPoint,
    downstream: &HookPoint,
    tokens: &Tensor<F>,
    stop_idx: Option<usize>,
) -> Result<Tensor<F>> {
    let _guard = GradGuard::enable();
    let stop = match stop_idx {
        Some(stop) => stop,
        None => network.point_width(downstream)?,
    };

    with_tracked_params(network, |net| {
        let mut jacs = Vec::with_capacity(tokens.batch());
        for i in 0..tokens.batch() {
            let example = tokens.slice_batch(i)?;
            let hooks = attach_jacobian_hooks(net, upstream, downstream, 0..stop)?;
            match net.evaluate(&example).and_then(|_| hooks.jacobian()) {
                Ok(jac) => {
                    hooks.detach(net)?;
                    jacs.push(jac);
                }
                Err(err) => {
                    // Best-effort detach; the original failure wins.
                    let _ = hooks.detach(net);
                    return Err(err);
                }
            }
        }
        Tensor::concat_batch(&jacs)
    })
}
