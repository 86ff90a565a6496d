#![cfg(feature = "ndarray")]

use jacquard::ndarray_support::{jacobian_to_array4, to_ndarray};
use jacquard::{calc_jacobian, Error, HookPoint, Linear, Network, Tensor};

#[test]
fn driver_result_converts_to_array4() {
    let w = Tensor::from_vec(vec![1.0, 0.0, 0.0, 1.0, 1.0, 1.0], &[3, 2]).unwrap();
    let mut net = Network::new()
        .with_layer("input", Linear::identity(2))
        .with_layer("out", Linear::new(w, Tensor::zeros(&[3])).unwrap());
    let tokens = Tensor::from_vec(vec![0.3, -0.7, 0.1, 0.4], &[1, 2, 2]).unwrap();

    let jac = calc_jacobian(
        &mut net,
        &HookPoint::from("input"),
        &HookPoint::from("out"),
        &tokens,
        None,
    )
    .unwrap();

    let arr = jacobian_to_array4(&jac).unwrap();
    assert_eq!(arr.dim(), (1, 2, 3, 2));
    assert_eq!(arr[[0, 0, 2, 0]], 1.0);

    let dyn_arr = to_ndarray(&jac);
    assert_eq!(dyn_arr.shape(), &[1, 2, 3, 2]);
}

#[test]
fn array4_view_rejects_other_ranks() {
    let t = Tensor::<f64>::zeros(&[2, 3]);
    assert!(matches!(
        jacobian_to_array4(&t),
        Err(Error::ShapeMismatch { .. })
    ));
}
