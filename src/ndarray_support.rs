//! ndarray adapters for handing Jacobian tensors to analysis collaborators.
//!
//! Thin wrappers returning owned arrays; plotting and further analysis live
//! outside this crate.

use ndarray::{Array4, ArrayD, IxDyn};

use crate::error::{Error, Result};
use crate::float::Float;
use crate::tensor::Tensor;

/// Convert any tensor into a dynamic-dimensional `ArrayD`.
pub fn to_ndarray<F: Float>(t: &Tensor<F>) -> ArrayD<F> {
    ArrayD::from_shape_vec(IxDyn(&t.shape), t.data.clone()).unwrap()
}

/// View a driver result `[batch, seq, n_outputs, d_upstream]` as a typed
/// `Array4`.
pub fn jacobian_to_array4<F: Float>(t: &Tensor<F>) -> Result<Array4<F>> {
    if t.shape.len() != 4 {
        return Err(Error::ShapeMismatch {
            op: "jacobian_to_array4",
            expected: "[batch, seq, n_outputs, d_upstream]".to_string(),
            got: format!("{:?}", t.shape),
        });
    }
    let dims = (t.shape[0], t.shape[1], t.shape[2], t.shape[3]);
    Ok(Array4::from_shape_vec(dims, t.data.clone()).unwrap())
}
