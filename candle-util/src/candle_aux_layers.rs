use candle_core::{Result, Tensor};
use candle_nn::{Activation, Conv2d, Conv2dConfig, Linear, Module, VarBuilder};

/// build a stack of alternating `M` and `A` layers
pub struct StackLayers<M>
where
    M: Module,
{
    module_layers: Vec<M>,
    activation_layers: Vec<Option<Activation>>,
}

impl<M> Module for StackLayers<M>
where
    M: Module,
{
    fn forward(&self, input: &Tensor) -> Result<Tensor> {
        let mut x = input.clone();
        for (module, activation) in self.module_layers.iter().zip(self.activation_layers.iter()) {
            x = module.forward(&x)?;
            if let Some(activation) = activation {
                x = activation.forward(&x)?;
            }
        }
        Ok(x)
    }
}

impl<M> StackLayers<M>
where
    M: Module,
{
    pub fn new() -> Self {
        Self {
            module_layers: Vec::new(),
            activation_layers: Vec::new(),
        }
    }

    /// Appends a layer after all the current layers.
    pub fn push_with_act(&mut self, layer: M, activation: Activation) {
        self.module_layers.push(layer);
        self.activation_layers.push(Some(activation));
    }

    pub fn push(&mut self, layer: M) {
        self.module_layers.push(layer);
        self.activation_layers.push(None);
    }

    pub fn len(&self) -> usize {
        self.module_layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.module_layers.is_empty()
    }
}

impl<M> Default for StackLayers<M>
where
    M: Module,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Slope of the leaky rectifier used after every convolution
pub const LEAKY_RELU_SLOPE: f64 = 0.01;

/// Stride-2 3x3 convolutions, each followed by a leaky ReLU,
/// registered as `{prefix}.{j}`.
///
/// * `in_channels` - channels of the input image
/// * `widths` - output channels of each layer
///
pub fn strided_conv_stack(
    in_channels: usize,
    widths: &[usize],
    vs: VarBuilder,
) -> Result<StackLayers<Conv2d>> {
    let config = Conv2dConfig {
        padding: 1,
        stride: 2,
        ..Default::default()
    };

    let mut stack = StackLayers::<Conv2d>::new();
    let mut prev_dim = in_channels;
    for (j, &next_dim) in widths.iter().enumerate() {
        stack.push_with_act(
            candle_nn::conv2d(prev_dim, next_dim, 3, config, vs.pp(j.to_string()))?,
            Activation::LeakyRelu(LEAKY_RELU_SLOPE),
        );
        prev_dim = next_dim;
    }
    Ok(stack)
}

/// Spatial extent after `num_layers` stride-2, padding-1, 3x3
/// convolutions: each layer maps `s` to `ceil(s / 2)`.
pub fn strided_conv_output_size(size: usize, num_layers: usize) -> usize {
    (0..num_layers).fold(size, |s, _| s.div_ceil(2))
}

/// Fully connected stack `dims[0] -> dims[1] -> ... -> dims[L]`
/// with `hidden_act` after every layer but the last and
/// `output_act` (if any) after the last one.
pub fn linear_stack(
    dims: &[usize],
    hidden_act: Activation,
    output_act: Option<Activation>,
    vs: VarBuilder,
) -> Result<StackLayers<Linear>> {
    if dims.len() < 2 {
        candle_core::bail!("a linear stack needs at least two widths, got {:?}", dims);
    }

    let mut stack = StackLayers::<Linear>::new();
    let num_layers = dims.len() - 1;
    for j in 0..num_layers {
        let layer = candle_nn::linear(dims[j], dims[j + 1], vs.pp(j.to_string()))?;
        let act = if j + 1 < num_layers {
            Some(hidden_act.clone())
        } else {
            output_act.clone()
        };
        match act {
            Some(act) => stack.push_with_act(layer, act),
            None => stack.push(layer),
        }
    }
    Ok(stack)
}
