//! Reference sequential network with named hook points.
//!
//! A straight stack of layers, each producing one named activation. Every
//! forward pass records onto a fresh [`Graph`], fires any hooks installed at
//! each layer's point in order, and returns the final value. This is the
//! bundled [`HookedNetwork`] implementation used by tests, docs and benches;
//! the attacher and driver only see the trait.

use crate::error::{Error, Result};
use crate::float::Float;
use crate::graph::Graph;
use crate::hook::{ForwardHook, HookHandle, HookPoint, HookedNetwork, Var};
use crate::tensor::Tensor;

/// One step of a sequential network.
pub trait Layer<F: Float> {
    /// Record the layer's forward computation. Parameter leaves are tracked
    /// when `params_tracked` is set.
    fn forward(&self, graph: &mut Graph<F>, input: Var, params_tracked: bool) -> Result<Var>;

    /// Feature width of the layer's output.
    fn out_width(&self) -> usize;
}

/// Affine layer `x ↦ W·x + b` over the feature axis.
pub struct Linear<F: Float> {
    weight: Tensor<F>,
    bias: Tensor<F>,
}

impl<F: Float> Linear<F> {
    /// Build from a `[d_out, d_in]` weight and a `[d_out]` bias.
    pub fn new(weight: Tensor<F>, bias: Tensor<F>) -> Result<Self> {
        if weight.shape.len() != 2 {
            return Err(Error::ShapeMismatch {
                op: "Linear::new",
                expected: "weight [d_out, d_in]".to_string(),
                got: format!("{:?}", weight.shape),
            });
        }
        if bias.shape != [weight.shape[0]] {
            return Err(Error::ShapeMismatch {
                op: "Linear::new",
                expected: format!("bias [{}]", weight.shape[0]),
                got: format!("{:?}", bias.shape),
            });
        }
        Ok(Linear { weight, bias })
    }

    /// Identity layer of the given width: eye weight, zero bias. Handy for
    /// exposing the network input as a named hook point.
    pub fn identity(width: usize) -> Self {
        let mut weight = Tensor::zeros(&[width, width]);
        for i in 0..width {
            weight.data[i * width + i] = F::one();
        }
        Linear {
            weight,
            bias: Tensor::zeros(&[width]),
        }
    }
}

impl<F: Float> Layer<F> for Linear<F> {
    fn forward(&self, graph: &mut Graph<F>, input: Var, params_tracked: bool) -> Result<Var> {
        let weight = graph.leaf(self.weight.clone(), params_tracked);
        let bias = graph.leaf(self.bias.clone(), params_tracked);
        graph.linear(input, weight, bias)
    }

    fn out_width(&self) -> usize {
        self.weight.shape[0]
    }
}

/// Elementwise tanh layer.
pub struct TanhLayer {
    width: usize,
}

impl TanhLayer {
    /// Tanh over a feature axis of the given width.
    pub fn new(width: usize) -> Self {
        TanhLayer { width }
    }
}

impl<F: Float> Layer<F> for TanhLayer {
    fn forward(&self, graph: &mut Graph<F>, input: Var, _params_tracked: bool) -> Result<Var> {
        graph.tanh(input)
    }

    fn out_width(&self) -> usize {
        self.width
    }
}

struct HookEntry<F: Float> {
    handle: HookHandle,
    point: HookPoint,
    hook: ForwardHook<F>,
}

/// Sequential network: named layers, a hook registry, and a parameter
/// gradient-tracking flag.
pub struct Network<F: Float> {
    layers: Vec<(HookPoint, Box<dyn Layer<F>>)>,
    hooks: Vec<HookEntry<F>>,
    params_tracked: bool,
    next_handle: u64,
}

impl<F: Float> Default for Network<F> {
    fn default() -> Self {
        Self::new()
    }
}

impl<F: Float> Network<F> {
    /// Empty network with parameter tracking disabled.
    pub fn new() -> Self {
        Network {
            layers: Vec::new(),
            hooks: Vec::new(),
            params_tracked: false,
            next_handle: 0,
        }
    }

    /// Append a layer whose output is addressable at `point`.
    pub fn with_layer(mut self, point: impl Into<HookPoint>, layer: impl Layer<F> + 'static) -> Self {
        self.layers.push((point.into(), Box::new(layer)));
        self
    }

    fn run(&self, hooks: &mut [HookEntry<F>], input: &Tensor<F>) -> Result<Tensor<F>> {
        let mut graph = Graph::new();
        let mut current = graph.leaf(input.clone(), false);
        for (point, layer) in &self.layers {
            current = layer.forward(&mut graph, current, self.params_tracked)?;
            for entry in hooks.iter_mut() {
                if entry.point == *point {
                    if let Some(replacement) = (entry.hook)(&mut graph, current)? {
                        current = replacement;
                    }
                }
            }
        }
        Ok(graph.value(current).clone())
    }
}

impl<F: Float> HookedNetwork<F> for Network<F> {
    fn install_hook(&mut self, point: &HookPoint, hook: ForwardHook<F>) -> Result<HookHandle> {
        if !self.layers.iter().any(|(p, _)| p == point) {
            return Err(Error::UnknownHookPoint {
                point: point.to_string(),
            });
        }
        let handle = HookHandle(self.next_handle);
        self.next_handle += 1;
        self.hooks.push(HookEntry {
            handle,
            point: point.clone(),
            hook,
        });
        Ok(handle)
    }

    fn remove_hook(&mut self, handle: HookHandle) -> Result<()> {
        match self.hooks.iter().position(|entry| entry.handle == handle) {
            Some(i) => {
                self.hooks.remove(i);
                Ok(())
            }
            None => Err(Error::UnknownHook),
        }
    }

    fn evaluate(&mut self, input: &Tensor<F>) -> Result<Tensor<F>> {
        // The registry is taken out for the duration of the pass so hooks can
        // run with a live graph while the network stays borrowable, and put
        // back on every exit path.
        let mut hooks = std::mem::take(&mut self.hooks);
        let result = self.run(&mut hooks, input);
        self.hooks = hooks;
        result
    }

    fn set_params_tracked(&mut self, tracked: bool) -> bool {
        std::mem::replace(&mut self.params_tracked, tracked)
    }

    fn point_width(&self, point: &HookPoint) -> Result<usize> {
        self.layers
            .iter()
            .find(|(p, _)| p == point)
            .map(|(_, layer)| layer.out_width())
            .ok_or_else(|| Error::UnknownHookPoint {
                point: point.to_string(),
            })
    }
}
