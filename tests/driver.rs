use approx::assert_relative_eq;
use jacquard::{calc_jacobian, grad_enabled, HookPoint, HookedNetwork, Linear, Network, Tensor};

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

#[test]
fn batch_matches_individual_examples() {
    let mut net = two_layer_net();
    let up = HookPoint::from("input");
    let down = HookPoint::from("out");
    let tokens =
        Tensor::from_vec(vec![0.7, -1.3, 2.0, 0.5, -0.4, 1.1], &[3, 2]).unwrap();

    let batched = calc_jacobian(&mut net, &up, &down, &tokens, None).unwrap();
    assert_eq!(batched.shape, vec![3, 4, 2]);

    for i in 0..3 {
        let example = tokens.slice_batch(i).unwrap();
        let single = calc_jacobian(&mut net, &up, &down, &example, None).unwrap();
        let slice = batched.slice_batch(i).unwrap();
        for (j, (b, s)) in slice.data.iter().zip(&single.data).enumerate() {
            assert!(
                (b - s).abs() < 1e-12,
                "example {}, component {}: batched={}, single={}",
                i,
                j,
                b,
                s
            );
        }
    }
}

#[test]
fn stop_idx_defaults_to_full_feature_width() {
    let mut net = two_layer_net();
    let up = HookPoint::from("input");
    let down = HookPoint::from("out");
    let tokens = Tensor::from_vec(vec![0.7, -1.3], &[1, 2]).unwrap();

    let full = calc_jacobian(&mut net, &up, &down, &tokens, None).unwrap();
    assert_eq!(full.shape, vec![1, 4, 2]);

    let truncated = calc_jacobian(&mut net, &up, &down, &tokens, Some(2)).unwrap();
    assert_eq!(truncated.shape, vec![1, 2, 2]);
    for j in 0..2 {
        for k in 0..2 {
            assert_relative_eq!(
                truncated.at(&[0, j, k]),
                full.at(&[0, j, k]),
                max_relative = 1e-12
            );
        }
    }
}

#[test]
fn positional_axes_are_carried_through() {
    // Position-independent layers: every sequence position gets the same
    // Jacobian, and the result keeps the positional axis.
    let mut net = two_layer_net();
    let tokens = Tensor::from_vec(
        vec![0.7, -1.3, 2.0, 0.5, -0.4, 1.1, 0.0, 1.0, -2.0, 0.3, 0.9, -0.6],
        &[2, 3, 2],
    )
    .unwrap();

    let jac = calc_jacobian(
        &mut net,
        &HookPoint::from("input"),
        &HookPoint::from("out"),
        &tokens,
        None,
    )
    .unwrap();
    assert_eq!(jac.shape, vec![2, 3, 4, 2]);

    for b in 0..2 {
        for p in 0..3 {
            for j in 0..4 {
                for k in 0..2 {
                    assert_relative_eq!(
                        jac.at(&[b, p, j, k]),
                        jac.at(&[0, 0, j, k]),
                        max_relative = 1e-12
                    );
                }
            }
        }
    }
}

// ── Gradient-tracking state restoration ──

#[test]
fn tracking_restored_on_success() {
    let mut net = two_layer_net();
    let tokens = Tensor::from_vec(vec![0.7, -1.3], &[1, 2]).unwrap();
    let up = HookPoint::from("input");
    let down = HookPoint::from("out");

    net.set_params_tracked(false);
    calc_jacobian(&mut net, &up, &down, &tokens, None).unwrap();
    assert!(!net.set_params_tracked(false));
    assert!(!grad_enabled());

    // A pre-enabled flag is restored to enabled, not forced off.
    net.set_params_tracked(true);
    calc_jacobian(&mut net, &up, &down, &tokens, None).unwrap();
    assert!(net.set_params_tracked(false));
}

#[test]
fn tracking_restored_when_an_example_fails() {
    let mut net = two_layer_net();
    let tokens = Tensor::from_vec(vec![0.7, -1.3], &[1, 2]).unwrap();

    net.set_params_tracked(false);
    // Misordered points: the failure surfaces mid-loop, during evaluation.
    let err = calc_jacobian(
        &mut net,
        &HookPoint::from("out"),
        &HookPoint::from("input"),
        &tokens,
        None,
    )
    .unwrap_err();
    assert_eq!(err, jacquard::Error::UpstreamNotCaptured);

    assert!(!net.set_params_tracked(false));
    assert!(!grad_enabled());
}
