use crate::candle_aux_layers::{strided_conv_output_size, strided_conv_stack, StackLayers};
use crate::candle_model_traits::EncoderModuleT;
use candle_core::{Result, Tensor};
use candle_nn::{Conv2d, Linear, Module, ModuleT, VarBuilder};

/// Convolutional encoder of square images into a diagonal Gaussian
pub struct ConvEncoder {
    in_channels: usize,
    imsize: usize,
    n_latent: usize,
    conv: StackLayers<Conv2d>,
    z_mean: Linear,
    z_lnvar: Linear,
}

impl EncoderModuleT for ConvEncoder {
    fn forward_t(&self, x_nchw: &Tensor, _train: bool) -> Result<(Tensor, Tensor)> {
        let (_, c, h, w) = x_nchw.dims4()?;
        if c != self.in_channels || h != self.imsize || w != self.imsize {
            candle_core::bail!(
                "encoder expects n x {} x {} x {} images, got {:?}",
                self.in_channels,
                self.imsize,
                self.imsize,
                x_nchw.dims()
            );
        }

        let h_nd = self.conv.forward(x_nchw)?.flatten_from(1)?;
        let z_mean_nk = self.z_mean.forward_t(&h_nd, false)?;
        let z_lnvar_nk = self.z_lnvar.forward_t(&h_nd, false)?;
        Ok((z_mean_nk, z_lnvar_nk))
    }

    fn dim_latent(&self) -> usize {
        self.n_latent
    }
}

impl ConvEncoder {
    /// Will create a new convolutional encoder with these variables:
    ///
    /// * `enc.conv.{}.weight` where {} is the layer index
    /// * `enc.z.mean.weight`
    /// * `enc.z.lnvar.weight`
    ///
    /// * `in_channels` - image channels
    /// * `imsize` - image height and width
    /// * `n_latent` - latent dimension
    /// * `hidden_dims` - output channels of each stride-2 convolution
    pub fn new(
        in_channels: usize,
        imsize: usize,
        n_latent: usize,
        hidden_dims: &[usize],
        vs: VarBuilder,
    ) -> Result<Self> {
        let last_dim = match hidden_dims.last() {
            Some(&d) => d,
            None => candle_core::bail!("the encoder needs at least one convolution"),
        };

        let conv = strided_conv_stack(in_channels, hidden_dims, vs.pp("enc.conv"))?;

        let side = strided_conv_output_size(imsize, hidden_dims.len());
        let d_flat = last_dim * side * side;

        let z_mean = candle_nn::linear(d_flat, n_latent, vs.pp("enc.z.mean"))?;
        let z_lnvar = candle_nn::linear(d_flat, n_latent, vs.pp("enc.z.lnvar"))?;

        Ok(Self {
            in_channels,
            imsize,
            n_latent,
            conv,
            z_mean,
            z_lnvar,
        })
    }
}
