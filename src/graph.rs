//! Recorded-operation autograd collaborator.
//!
//! A deliberately small reverse-mode engine: forward calls append one node
//! per tensor operation, and [`Graph::backward`] runs a single reverse sweep
//! over the recorded nodes with zero-adjoint skipping. Gradients accumulate
//! into tracked leaves and survive until [`Graph::zero_grads`]. The
//! thread-local reverse-mode toggle is managed with the RAII [`GradGuard`].

use std::cell::Cell;
use std::ops::Range;

use crate::error::{Error, Result};
use crate::float::Float;
use crate::hook::{HookCtx, Var};
use crate::tensor::Tensor;

// Thread-local reverse-mode recording toggle. Off by default; scopes that
// need gradients enable it through a guard.
thread_local! {
    static GRAD_ENABLED: Cell<bool> = const { Cell::new(false) };
}

/// Whether reverse-mode recording is enabled on the current thread.
pub fn grad_enabled() -> bool {
    GRAD_ENABLED.with(|cell| cell.get())
}

/// RAII guard over the thread-local reverse-mode toggle. Restores the
/// previous setting on drop, on every exit path.
pub struct GradGuard {
    prev: bool,
}

impl GradGuard {
    /// Set the toggle to `enabled`, returning a guard that restores the
    /// previous setting on drop.
    pub fn new(enabled: bool) -> Self {
        let prev = GRAD_ENABLED.with(|cell| {
            let prev = cell.get();
            cell.set(enabled);
            prev
        });
        GradGuard { prev }
    }

    /// Enable reverse-mode recording for the guard's lifetime.
    pub fn enable() -> Self {
        Self::new(true)
    }
}

impl Drop for GradGuard {
    fn drop(&mut self) {
        GRAD_ENABLED.with(|cell| cell.set(self.prev));
    }
}

/// A recorded operation. Operand handles index earlier nodes, so the node
/// order is already topological.
#[derive(Clone, Debug)]
enum Op {
    Leaf,
    Add { lhs: Var, rhs: Var },
    RepeatIntoBatch { input: Var, n: usize },
    SplitFromBatch { input: Var, n: usize },
    SliceFeatures { input: Var, range: Range<usize>, full_width: usize },
    Linear { input: Var, weight: Var, bias: Var },
    Tanh { input: Var },
}

struct Node<F: Float> {
    value: Tensor<F>,
    op: Op,
    /// Leaves only: whether backward passes accumulate into `grad`.
    tracked: bool,
    grad: Option<Tensor<F>>,
}

/// Append-only graph of recorded tensor operations.
pub struct Graph<F: Float> {
    nodes: Vec<Node<F>>,
}

impl<F: Float> Default for Graph<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> Graph<F> {
    /// Create an empty graph.
    pub fn new() -> Self {
        Graph { nodes: Vec::new() }
    }

    fn push(&mut self, value: Tensor<F>, op: Op, tracked: bool) -> Var {
        let idx = self.nodes.len();
        self.nodes.push(Node {
            value,
            op,
            tracked,
            grad: None,
        });
        Var(idx)
    }

    /// Register a leaf holding `value`. Tracked leaves accumulate gradients
    /// during backward sweeps.
    pub fn leaf(&mut self, value: Tensor<F>, tracked: bool) -> Var {
        self.push(value, Op::Leaf, tracked)
    }

    /// Current value of a node.
    pub fn value(&self, v: Var) -> &Tensor<F> {
        &self.nodes[v.0].value
    }

    /// Record `input·Wᵀ + b` over the feature axis.
    pub fn linear(&mut self, input: Var, weight: Var, bias: Var) -> Result<Var> {
        let value = self
            .value(input)
            .affine(self.value(weight), self.value(bias))?;
        Ok(self.push(value, Op::Linear { input, weight, bias }, false))
    }

    /// Record an elementwise tanh.
    pub fn tanh(&mut self, input: Var) -> Result<Var> {
        let value = self.value(input).tanh();
        Ok(self.push(value, Op::Tanh { input }, false))
    }

    /// Record an elementwise sum.
    pub fn add(&mut self, lhs: Var, rhs: Var) -> Result<Var> {
        let value = self.value(lhs).add(self.value(rhs))?;
        Ok(self.push(value, Op::Add { lhs, rhs }, false))
    }

    /// Record a replication fused into the batch axis.
    pub fn repeat_into_batch(&mut self, input: Var, n: usize) -> Result<Var> {
        let value = self.value(input).repeat_into_batch(n)?;
        Ok(self.push(value, Op::RepeatIntoBatch { input, n }, false))
    }

    /// Record the un-fusing of a synthetic axis out of the batch axis.
    pub fn split_from_batch(&mut self, input: Var, n: usize) -> Result<Var> {
        let value = self.value(input).split_from_batch(n)?;
        Ok(self.push(value, Op::SplitFromBatch { input, n }, false))
    }

    /// Record a slice of the feature axis.
    pub fn slice_features(&mut self, input: Var, range: Range<usize>) -> Result<Var> {
        let full_width = self.value(input).features();
        let value = self.value(input).slice_features(range.clone())?;
        Ok(self.push(
            value,
            Op::SliceFeatures {
                input,
                range,
                full_width,
            },
            false,
        ))
    }

    /// Inject a zero leaf of the given shape. Tracked only while reverse-mode
    /// recording is enabled, so a dropped toggle degrades to an untracked
    /// leaf whose gradient is never populated.
    pub fn zeros_tracked(&mut self, shape: &[usize]) -> Var {
        let tracked = grad_enabled();
        self.leaf(Tensor::zeros(shape), tracked)
    }

    /// Zero every accumulated gradient buffer.
    pub fn zero_grads(&mut self) {
        for node in &mut self.nodes {
            node.grad = None;
        }
    }

    /// Accumulated gradient of a tracked leaf.
    pub fn grad(&self, v: Var) -> Option<&Tensor<F>> {
        self.nodes[v.0].grad.as_ref()
    }

    /// Reverse sweep from `from`, seeded with `seed`.
    ///
    /// Nodes are visited in reverse recording order; nodes whose adjoint was
    /// never touched are skipped. Adjoints reaching tracked leaves accumulate
    /// into their gradient buffers.
    pub fn backward(&mut self, from: Var, seed: Tensor<F>) -> Result<()> {
        if seed.shape != self.nodes[from.0].value.shape {
            return Err(Error::ShapeMismatch {
                op: "backward",
                expected: format!("seed of shape {:?}", self.nodes[from.0].value.shape),
                got: format!("{:?}", seed.shape),
            });
        }

        let mut adjoints: Vec<Option<Tensor<F>>> = (0..self.nodes.len()).map(|_| None).collect();
        adjoints[from.0] = Some(seed);

        for i in (0..self.nodes.len()).rev() {
            let Some(a) = adjoints[i].take() else {
                continue;
            };
            let op = self.nodes[i].op.clone();
            match op {
                Op::Leaf => {
                    let node = &mut self.nodes[i];
                    if node.tracked {
                        accumulate(&mut node.grad, a)?;
                    }
                }
                Op::Add { lhs, rhs } => {
                    accumulate(&mut adjoints[lhs.0], a.clone())?;
                    accumulate(&mut adjoints[rhs.0], a)?;
                }
                Op::RepeatIntoBatch { input, n } => {
                    let d = a.sum_batch_groups(n)?;
                    accumulate(&mut adjoints[input.0], d)?;
                }
                Op::SplitFromBatch { input, n } => {
                    let d = a.fuse_into_batch(n)?;
                    accumulate(&mut adjoints[input.0], d)?;
                }
                Op::SliceFeatures {
                    input,
                    range,
                    full_width,
                } => {
                    let d = a.pad_features(range, full_width)?;
                    accumulate(&mut adjoints[input.0], d)?;
                }
                Op::Linear {
                    input,
                    weight,
                    bias,
                } => {
                    let d_input = a.matmul(self.value(weight))?;
                    accumulate(&mut adjoints[input.0], d_input)?;
                    if self.nodes[weight.0].tracked {
                        let d_weight = Tensor::outer_accum(&a, self.value(input))?;
                        accumulate(&mut adjoints[weight.0], d_weight)?;
                    }
                    if self.nodes[bias.0].tracked {
                        let d_bias = a.sum_leading()?;
                        accumulate(&mut adjoints[bias.0], d_bias)?;
                    }
                }
                Op::Tanh { input } => {
                    let y = &self.nodes[i].value;
                    let data = a
                        .data
                        .iter()
                        .zip(&y.data)
                        .map(|(&ai, &yi)| ai * (F::one() - yi * yi))
                        .collect();
                    let d = Tensor {
                        data,
                        shape: y.shape.clone(),
                    };
                    accumulate(&mut adjoints[input.0], d)?;
                }
            }
        }
        Ok(())
    }
}

fn accumulate<F: Float>(slot: &mut Option<Tensor<F>>, t: Tensor<F>) -> Result<()> {
    match slot {
        None => *slot = Some(t),
        Some(existing) => existing.add_assign(&t)?,
    }
    Ok(())
}

impl<F: Float> HookCtx<F> for Graph<F> {
    fn value(&self, v: Var) -> &Tensor<F> {
        Graph::value(self, v)
    }

    fn zeros_tracked(&mut self, shape: &[usize]) -> Var {
        Graph::zeros_tracked(self, shape)
    }

    fn add(&mut self, lhs: Var, rhs: Var) -> Result<Var> {
        Graph::add(self, lhs, rhs)
    }

    fn repeat_into_batch(&mut self, input: Var, n: usize) -> Result<Var> {
        Graph::repeat_into_batch(self, input, n)
    }

    fn split_from_batch(&mut self, input: Var, n: usize) -> Result<Var> {
        Graph::split_from_batch(self, input, n)
    }

    fn slice_features(&mut self, input: Var, range: Range<usize>) -> Result<Var> {
        Graph::slice_features(self, input, range)
    }

    fn zero_grads(&mut self) {
        Graph::zero_grads(self)
    }

    fn backward(&mut self, from: Var, seed: Tensor<F>) -> Result<()> {
        Graph::backward(self, from, seed)
    }

    fn grad(&self, v: Var) -> Option<&Tensor<F>> {
        Graph::grad(self, v)
    }
}
