//! Dense row-major tensors and the shape algebra the Jacobian hooks need.
//!
//! Flat `Vec<F>` storage with explicit shape metadata, row-major throughout.
//! By convention the batch axis is axis 0 and the feature axis is the last
//! axis; positional axes (e.g. sequence) sit in between. The batching trick
//! lives in [`Tensor::repeat_into_batch`] / [`Tensor::split_from_batch`]:
//! a synthetic replica axis is fused into the batch axis on the way down and
//! un-fused next to the feature axis on the way back up.

use std::ops::Range;

use crate::error::{Error, Result};
use crate::float::Float;

/// Flat row-major tensor with shape metadata.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Tensor<F: Float> {
    pub data: Vec<F>,
    pub shape: Vec<usize>,
}

impl<F: Float> Tensor<F> {
    /// All-zero tensor of the given shape.
    pub fn zeros(shape: &[usize]) -> Self {
        let n: usize = shape.iter().product();
        Tensor {
            data: vec![F::zero(); n],
            shape: shape.to_vec(),
        }
    }

    /// Build a tensor from flat data, checking that the element count matches.
    pub fn from_vec(data: Vec<F>, shape: &[usize]) -> Result<Self> {
        let n: usize = shape.iter().product();
        if data.len() != n {
            return Err(Error::ShapeMismatch {
                op: "from_vec",
                expected: format!("{} elements for shape {:?}", n, shape),
                got: format!("{} elements", data.len()),
            });
        }
        Ok(Tensor {
            data,
            shape: shape.to_vec(),
        })
    }

    /// Total number of elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Size of the batch axis (axis 0).
    pub fn batch(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Width of the feature axis (last axis).
    pub fn features(&self) -> usize {
        self.shape.last().copied().unwrap_or(0)
    }

    /// Element at a full multi-index. Intended for tests and small reads.
    pub fn at(&self, idx: &[usize]) -> F {
        debug_assert_eq!(idx.len(), self.shape.len());
        let mut flat = 0;
        for (&i, &dim) in idx.iter().zip(&self.shape) {
            debug_assert!(i < dim);
            flat = flat * dim + i;
        }
        self.data[flat]
    }

    /// Elementwise sum of two same-shaped tensors.
    pub fn add(&self, other: &Tensor<F>) -> Result<Tensor<F>> {
        if self.shape != other.shape {
            return Err(Error::ShapeMismatch {
                op: "add",
                expected: format!("{:?}", self.shape),
                got: format!("{:?}", other.shape),
            });
        }
        let data = self
            .data
            .iter()
            .zip(&other.data)
            .map(|(&a, &b)| a + b)
            .collect();
        Ok(Tensor {
            data,
            shape: self.shape.clone(),
        })
    }

    /// Elementwise in-place accumulation.
    pub fn add_assign(&mut self, other: &Tensor<F>) -> Result<()> {
        if self.shape != other.shape {
            return Err(Error::ShapeMismatch {
                op: "add_assign",
                expected: format!("{:?}", self.shape),
                got: format!("{:?}", other.shape),
            });
        }
        for (a, &b) in self.data.iter_mut().zip(&other.data) {
            *a = *a + b;
        }
        Ok(())
    }

    /// Elementwise hyperbolic tangent.
    pub fn tanh(&self) -> Tensor<F> {
        Tensor {
            data: self.data.iter().map(|&x| x.tanh()).collect(),
            shape: self.shape.clone(),
        }
    }

    /// Affine map over the feature axis: `out[.., j] = Σ_t in[.., t]·w[j, t] + b[j]`.
    ///
    /// `weight` is `[d_out, d_in]`, `bias` is `[d_out]`. All leading axes are
    /// treated as independent rows.
    pub fn affine(&self, weight: &Tensor<F>, bias: &Tensor<F>) -> Result<Tensor<F>> {
        let d_in = self.features();
        if self.shape.is_empty() || d_in == 0 {
            return Err(Error::ShapeMismatch {
                op: "affine",
                expected: "input with a non-empty feature axis".to_string(),
                got: format!("{:?}", self.shape),
            });
        }
        if weight.shape.len() != 2 || weight.shape[1] != d_in {
            return Err(Error::ShapeMismatch {
                op: "affine",
                expected: format!("weight [d_out, {}]", d_in),
                got: format!("{:?}", weight.shape),
            });
        }
        let d_out = weight.shape[0];
        if bias.shape != [d_out] {
            return Err(Error::ShapeMismatch {
                op: "affine",
                expected: format!("bias [{}]", d_out),
                got: format!("{:?}", bias.shape),
            });
        }
        let rows = self.numel() / d_in;
        let mut data = vec![F::zero(); rows * d_out];
        for r in 0..rows {
            let x = &self.data[r * d_in..(r + 1) * d_in];
            for j in 0..d_out {
                let wrow = &weight.data[j * d_in..(j + 1) * d_in];
                let mut acc = bias.data[j];
                for t in 0..d_in {
                    acc = acc + wrow[t] * x[t];
                }
                data[r * d_out + j] = acc;
            }
        }
        let mut shape = self.shape.clone();
        let last = shape.len() - 1;
        shape[last] = d_out;
        Ok(Tensor { data, shape })
    }

    /// Plain matrix product over the feature axis: `out[.., t] = Σ_j in[.., j]·w[j, t]`.
    ///
    /// This is the adjoint of [`Tensor::affine`] with respect to its input.
    pub fn matmul(&self, weight: &Tensor<F>) -> Result<Tensor<F>> {
        let m = self.features();
        if m == 0 || weight.shape.len() != 2 || weight.shape[0] != m {
            return Err(Error::ShapeMismatch {
                op: "matmul",
                expected: format!("weight [{}, d]", m),
                got: format!("{:?}", weight.shape),
            });
        }
        let k = weight.shape[1];
        let rows = self.numel() / m;
        let mut data = vec![F::zero(); rows * k];
        for r in 0..rows {
            let a = &self.data[r * m..(r + 1) * m];
            let out = &mut data[r * k..(r + 1) * k];
            for (j, &aj) in a.iter().enumerate() {
                if aj != F::zero() {
                    let wrow = &weight.data[j * k..(j + 1) * k];
                    for t in 0..k {
                        out[t] = out[t] + aj * wrow[t];
                    }
                }
            }
        }
        let mut shape = self.shape.clone();
        let last = shape.len() - 1;
        shape[last] = k;
        Ok(Tensor { data, shape })
    }

    /// Accumulate the weight adjoint of an affine map:
    /// `dW[j, t] = Σ_rows adj[row, j]·input[row, t]`, returned as `[d_out, d_in]`.
    pub fn outer_accum(adj: &Tensor<F>, input: &Tensor<F>) -> Result<Tensor<F>> {
        let m = adj.features();
        let k = input.features();
        let rows = adj.numel() / m;
        if m == 0 || k == 0 || rows != input.numel() / k {
            return Err(Error::ShapeMismatch {
                op: "outer_accum",
                expected: format!("matching leading axes, adj {:?}", adj.shape),
                got: format!("{:?}", input.shape),
            });
        }
        let mut data = vec![F::zero(); m * k];
        for r in 0..rows {
            let a = &adj.data[r * m..(r + 1) * m];
            let x = &input.data[r * k..(r + 1) * k];
            for (j, &aj) in a.iter().enumerate() {
                if aj != F::zero() {
                    let out = &mut data[j * k..(j + 1) * k];
                    for t in 0..k {
                        out[t] = out[t] + aj * x[t];
                    }
                }
            }
        }
        Ok(Tensor {
            data,
            shape: vec![m, k],
        })
    }

    /// Sum over all leading axes, leaving the feature axis: `[.., m] -> [m]`.
    pub fn sum_leading(&self) -> Result<Tensor<F>> {
        let m = self.features();
        if m == 0 {
            return Err(Error::ShapeMismatch {
                op: "sum_leading",
                expected: "a non-empty feature axis".to_string(),
                got: format!("{:?}", self.shape),
            });
        }
        let rows = self.numel() / m;
        let mut data = vec![F::zero(); m];
        for r in 0..rows {
            let block = &self.data[r * m..(r + 1) * m];
            for j in 0..m {
                data[j] = data[j] + block[j];
            }
        }
        Ok(Tensor {
            data,
            shape: vec![m],
        })
    }

    /// Replicate each example `n` times along a new axis fused into the batch
    /// axis: `[b, rest..] -> [b·n, rest..]` with `out[b·n + r] = in[b]`.
    pub fn repeat_into_batch(&self, n: usize) -> Result<Tensor<F>> {
        if self.shape.is_empty() || n == 0 {
            return Err(Error::ShapeMismatch {
                op: "repeat_into_batch",
                expected: "a batched tensor and a replica count of at least 1".to_string(),
                got: format!("shape {:?}, n = {}", self.shape, n),
            });
        }
        let b = self.shape[0];
        let block = if b == 0 { 0 } else { self.numel() / b };
        let mut data = Vec::with_capacity(self.numel() * n);
        for i in 0..b {
            let example = &self.data[i * block..(i + 1) * block];
            for _ in 0..n {
                data.extend_from_slice(example);
            }
        }
        let mut shape = self.shape.clone();
        shape[0] = b * n;
        Ok(Tensor { data, shape })
    }

    /// Adjoint of [`Tensor::repeat_into_batch`]: sum groups of `n` consecutive
    /// examples, `[b·n, rest..] -> [b, rest..]`.
    pub fn sum_batch_groups(&self, n: usize) -> Result<Tensor<F>> {
        if self.shape.is_empty() || n == 0 || self.shape[0] % n != 0 {
            return Err(Error::ShapeMismatch {
                op: "sum_batch_groups",
                expected: format!("batch axis divisible by {}", n),
                got: format!("{:?}", self.shape),
            });
        }
        let b = self.shape[0] / n;
        let block = if self.shape[0] == 0 {
            0
        } else {
            self.numel() / self.shape[0]
        };
        let mut data = vec![F::zero(); b * block];
        for i in 0..b {
            let out = &mut data[i * block..(i + 1) * block];
            for r in 0..n {
                let src = &self.data[(i * n + r) * block..(i * n + r + 1) * block];
                for t in 0..block {
                    out[t] = out[t] + src[t];
                }
            }
        }
        let mut shape = self.shape.clone();
        shape[0] = b;
        Ok(Tensor { data, shape })
    }

    /// Un-fuse a synthetic axis out of the batch axis, moving it next to the
    /// feature axis: `[b·n, pos.., d] -> [b, pos.., n, d]`.
    pub fn split_from_batch(&self, n: usize) -> Result<Tensor<F>> {
        if self.shape.len() < 2 || n == 0 || self.shape[0] % n != 0 {
            return Err(Error::ShapeMismatch {
                op: "split_from_batch",
                expected: format!("at least 2 axes with batch divisible by {}", n),
                got: format!("{:?}", self.shape),
            });
        }
        let b = self.shape[0] / n;
        let d = self.features();
        let mid = &self.shape[1..self.shape.len() - 1];
        let p: usize = mid.iter().product();
        let mut data = vec![F::zero(); self.numel()];
        for bi in 0..b {
            for pi in 0..p {
                for r in 0..n {
                    let src = ((bi * n + r) * p + pi) * d;
                    let dst = ((bi * p + pi) * n + r) * d;
                    data[dst..dst + d].copy_from_slice(&self.data[src..src + d]);
                }
            }
        }
        let mut shape = Vec::with_capacity(self.shape.len() + 1);
        shape.push(b);
        shape.extend_from_slice(mid);
        shape.push(n);
        shape.push(d);
        Ok(Tensor { data, shape })
    }

    /// Inverse of [`Tensor::split_from_batch`]:
    /// `[b, pos.., n, d] -> [b·n, pos.., d]`.
    pub fn fuse_into_batch(&self, n: usize) -> Result<Tensor<F>> {
        if self.shape.len() < 3 || self.shape[self.shape.len() - 2] != n {
            return Err(Error::ShapeMismatch {
                op: "fuse_into_batch",
                expected: format!("at least 3 axes with a replica axis of {}", n),
                got: format!("{:?}", self.shape),
            });
        }
        let b = self.shape[0];
        let d = self.features();
        let mid = &self.shape[1..self.shape.len() - 2];
        let p: usize = mid.iter().product();
        let mut data = vec![F::zero(); self.numel()];
        for bi in 0..b {
            for pi in 0..p {
                for r in 0..n {
                    let src = ((bi * p + pi) * n + r) * d;
                    let dst = ((bi * n + r) * p + pi) * d;
                    data[dst..dst + d].copy_from_slice(&self.data[src..src + d]);
                }
            }
        }
        let mut shape = Vec::with_capacity(self.shape.len() - 1);
        shape.push(b * n);
        shape.extend_from_slice(mid);
        shape.push(d);
        Ok(Tensor { data, shape })
    }

    /// Slice a range out of the feature axis.
    pub fn slice_features(&self, range: Range<usize>) -> Result<Tensor<F>> {
        let d = self.features();
        if self.shape.is_empty() || d == 0 || range.start > range.end || range.end > d {
            return Err(Error::ShapeMismatch {
                op: "slice_features",
                expected: format!("a range within 0..{}", d),
                got: format!("{}..{}", range.start, range.end),
            });
        }
        let w = range.end - range.start;
        let rows = if d == 0 { 0 } else { self.numel() / d };
        let mut data = Vec::with_capacity(rows * w);
        for r in 0..rows {
            data.extend_from_slice(&self.data[r * d + range.start..r * d + range.end]);
        }
        let mut shape = self.shape.clone();
        let last = shape.len() - 1;
        shape[last] = w;
        Ok(Tensor { data, shape })
    }

    /// Adjoint of [`Tensor::slice_features`]: scatter back into a zero tensor
    /// whose feature axis has `full_width`.
    pub fn pad_features(&self, range: Range<usize>, full_width: usize) -> Result<Tensor<F>> {
        let w = self.features();
        if self.shape.is_empty()
            || w == 0
            || range.start > range.end
            || range.end - range.start != w
            || range.end > full_width
        {
            return Err(Error::ShapeMismatch {
                op: "pad_features",
                expected: format!("a {}-wide range within 0..{}", w, full_width),
                got: format!("{}..{}", range.start, range.end),
            });
        }
        let rows = if w == 0 { 0 } else { self.numel() / w };
        let mut data = vec![F::zero(); rows * full_width];
        for r in 0..rows {
            let dst = r * full_width + range.start;
            data[dst..dst + w].copy_from_slice(&self.data[r * w..(r + 1) * w]);
        }
        let mut shape = self.shape.clone();
        let last = shape.len() - 1;
        shape[last] = full_width;
        Ok(Tensor { data, shape })
    }

    /// Identity seed for the vectorized backward pass: shape `[lead.., n, n]`
    /// with `seed[.., i, j] = δ_ij` tiled over every leading index.
    pub fn identity_seed(lead: &[usize], n: usize) -> Tensor<F> {
        let blocks: usize = lead.iter().product();
        let mut data = vec![F::zero(); blocks * n * n];
        for b in 0..blocks {
            for i in 0..n {
                data[(b * n + i) * n + i] = F::one();
            }
        }
        let mut shape = lead.to_vec();
        shape.push(n);
        shape.push(n);
        Tensor { data, shape }
    }

    /// Single-example slice `[i..i+1]` along the batch axis.
    pub fn slice_batch(&self, i: usize) -> Result<Tensor<F>> {
        let b = self.batch();
        if i >= b {
            return Err(Error::ShapeMismatch {
                op: "slice_batch",
                expected: format!("an index below the batch size {}", b),
                got: format!("{}", i),
            });
        }
        let block = self.numel() / b;
        let data = self.data[i * block..(i + 1) * block].to_vec();
        let mut shape = self.shape.clone();
        shape[0] = 1;
        Ok(Tensor { data, shape })
    }

    /// Concatenate tensors along the batch axis. All trailing axes must match.
    pub fn concat_batch(parts: &[Tensor<F>]) -> Result<Tensor<F>> {
        let first = parts.first().ok_or(Error::ShapeMismatch {
            op: "concat_batch",
            expected: "at least one tensor".to_string(),
            got: "0 tensors".to_string(),
        })?;
        if first.shape.is_empty() {
            return Err(Error::ShapeMismatch {
                op: "concat_batch",
                expected: "tensors with a batch axis".to_string(),
                got: "a scalar tensor".to_string(),
            });
        }
        let tail = &first.shape[1..];
        let mut batch = 0;
        let mut data = Vec::new();
        for part in parts {
            if &part.shape[1..] != tail {
                return Err(Error::ShapeMismatch {
                    op: "concat_batch",
                    expected: format!("trailing axes {:?}", tail),
                    got: format!("{:?}", &part.shape[1..]),
                });
            }
            batch += part.shape[0];
            data.extend_from_slice(&part.data);
        }
        let mut shape = first.shape.clone();
        shape[0] = batch;
        Ok(Tensor { data, shape })
    }
}
