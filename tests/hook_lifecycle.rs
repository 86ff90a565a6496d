use jacquard::{
    attach_jacobian_hooks, Error, ForwardHook, GradGuard, HookPoint, HookedNetwork, Linear,
    Network, Tensor,
};

fn two_layer_net() -> Network<f64> {
    let b = Tensor::from_vec(vec![1.0, 2.0, -1.0, 0.5, 3.0, -2.0], &[3, 2]).unwrap();
    let a = Tensor::from_vec(
        vec![0.5, 1.0, -1.0, 2.0, -0.5, 1.0, 0.0, 1.0, 2.0, -1.0, 1.5, 0.5],
        &[4, 3],
    )
    .unwrap();
    Network::new()
        .with_layer("input", Linear::identity(2))
        .with_layer("mid", Linear::new(b, Tensor::zeros(&[3])).unwrap())
        .with_layer("out", Linear::new(a, Tensor::zeros(&[4])).unwrap())
}

fn tokens() -> Tensor<f64> {
    Tensor::from_vec(vec![0.7, -1.3], &[1, 2]).unwrap()
}

// ── Accessor ordering ──

#[test]
fn accessors_error_before_any_forward_pass() {
    let mut net = two_layer_net();
    let _guard = GradGuard::enable();
    let hooks =
        attach_jacobian_hooks(&mut net, &HookPoint::from("input"), &HookPoint::from("out"), 0..4)
            .unwrap();

    assert!(matches!(hooks.jacobian(), Err(Error::Uninitialized { .. })));
    assert!(matches!(hooks.upstream_vec(), Err(Error::Uninitialized { .. })));

    net.evaluate(&tokens()).unwrap();
    assert!(hooks.jacobian().is_ok());
    assert!(hooks.upstream_vec().is_ok());

    hooks.detach(&mut net).unwrap();
}

#[test]
fn capture_is_rewritten_on_every_pass() {
    let mut net = two_layer_net();
    let _guard = GradGuard::enable();
    let hooks =
        attach_jacobian_hooks(&mut net, &HookPoint::from("input"), &HookPoint::from("out"), 0..4)
            .unwrap();

    net.evaluate(&tokens()).unwrap();
    let first = hooks.upstream_vec().unwrap();
    assert_eq!(first.data, vec![0.7, -1.3]);

    let other = Tensor::from_vec(vec![2.0, 3.0], &[1, 2]).unwrap();
    net.evaluate(&other).unwrap();
    let second = hooks.upstream_vec().unwrap();
    assert_eq!(second.data, vec![2.0, 3.0]);

    hooks.detach(&mut net).unwrap();
}

// ── Detach semantics ──

#[test]
fn detach_restores_forward_behavior() {
    let mut net = two_layer_net();
    let input = tokens();
    let baseline = net.evaluate(&input).unwrap();
    assert_eq!(baseline.shape, vec![1, 4]);

    let _guard = GradGuard::enable();
    let hooks =
        attach_jacobian_hooks(&mut net, &HookPoint::from("input"), &HookPoint::from("out"), 0..4)
            .unwrap();
    // While attached, the replicated batch flows downstream.
    let fused = net.evaluate(&input).unwrap();
    assert_eq!(fused.shape, vec![4, 4]);
    hooks.detach(&mut net).unwrap();

    let after = net.evaluate(&input).unwrap();
    assert_eq!(after, baseline);
}

#[test]
fn removing_an_unknown_hook_fails() {
    let mut net = two_layer_net();
    let observe: ForwardHook<f64> = Box::new(|_ctx, _out| Ok(None));
    let handle = net.install_hook(&HookPoint::from("mid"), observe).unwrap();

    assert!(net.remove_hook(handle).is_ok());
    assert_eq!(net.remove_hook(handle), Err(Error::UnknownHook));
}

// ── Fail-fast validation ──

#[test]
fn empty_range_fails_fast() {
    let mut net = two_layer_net();
    let _guard = GradGuard::enable();
    let err =
        attach_jacobian_hooks(&mut net, &HookPoint::from("input"), &HookPoint::from("out"), 3..1)
            .unwrap_err();
    assert_eq!(err, Error::EmptyOutputRange { start: 3, stop: 1 });
}

#[test]
fn range_past_feature_width_fails_fast() {
    let mut net = two_layer_net();
    let _guard = GradGuard::enable();
    let err =
        attach_jacobian_hooks(&mut net, &HookPoint::from("input"), &HookPoint::from("out"), 0..5)
            .unwrap_err();
    assert_eq!(err, Error::RangeOutOfBounds { stop: 5, width: 4 });
}

#[test]
fn unknown_points_fail_fast() {
    let mut net = two_layer_net();
    let _guard = GradGuard::enable();
    let err =
        attach_jacobian_hooks(&mut net, &HookPoint::from("nope"), &HookPoint::from("out"), 0..4)
            .unwrap_err();
    assert!(matches!(err, Error::UnknownHookPoint { .. }));

    let err =
        attach_jacobian_hooks(&mut net, &HookPoint::from("input"), &HookPoint::from("nope"), 0..4)
            .unwrap_err();
    assert!(matches!(err, Error::UnknownHookPoint { .. }));
}

#[test]
fn attach_without_grad_tracking_fails_fast() {
    let mut net = two_layer_net();
    // No GradGuard on this thread: recording is disabled.
    let err =
        attach_jacobian_hooks(&mut net, &HookPoint::from("input"), &HookPoint::from("out"), 0..4)
            .unwrap_err();
    assert_eq!(err, Error::GradientTrackingDisabled);
}

// ── Ordering and lazy-disable paths ──

#[test]
fn misordered_points_fail() {
    // Upstream point topologically after the downstream point: the downstream
    // interceptor fires first, with nothing captured.
    let mut net = two_layer_net();
    let _guard = GradGuard::enable();
    let hooks =
        attach_jacobian_hooks(&mut net, &HookPoint::from("out"), &HookPoint::from("input"), 0..2)
            .unwrap();

    assert_eq!(net.evaluate(&tokens()).unwrap_err(), Error::UpstreamNotCaptured);
    hooks.detach(&mut net).unwrap();
}

#[test]
fn grad_toggle_dropped_between_attach_and_evaluate() {
    let mut net = two_layer_net();
    let hooks = {
        let _guard = GradGuard::enable();
        attach_jacobian_hooks(&mut net, &HookPoint::from("input"), &HookPoint::from("out"), 0..4)
            .unwrap()
    };

    // The forward pass still runs, but the injected leaf never tracks a
    // gradient, so the Jacobian surfaces as uninitialized at query time.
    net.evaluate(&tokens()).unwrap();
    assert!(matches!(hooks.jacobian(), Err(Error::Uninitialized { .. })));
    assert!(hooks.upstream_vec().is_ok());

    hooks.detach(&mut net).unwrap();
}
