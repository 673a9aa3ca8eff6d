use crate::candle_image_encoder::ConvEncoder;
use crate::candle_interpolation::{interpolate_vectors, InterpolationMode};
use crate::candle_loss_functions::{gaussian_kl_loss, multiscale_recon_loss, ReconLossKind};
use crate::candle_model_traits::*;
use crate::candle_path_decoder::PathDecoder;
use crate::candle_vector_scene::Scene;

use candle_core::{Result, Tensor};
use candle_nn::VarBuilder;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_HIDDEN_DIMS: [usize; 5] = [32, 64, 128, 256, 512];

/// Constructor parameters of [`VectorVae`]
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct VectorVaeConfig {
    pub in_channels: usize,
    pub latent_dim: usize,
    pub hidden_dims: Vec<usize>,
    pub loss_fn: ReconLossKind,
    pub imsize: usize,
    pub paths: usize,
}

impl VectorVaeConfig {
    pub fn new(in_channels: usize, latent_dim: usize) -> Self {
        Self {
            in_channels,
            latent_dim,
            hidden_dims: DEFAULT_HIDDEN_DIMS.to_vec(),
            loss_fn: ReconLossKind::default(),
            imsize: 64,
            paths: 4,
        }
    }

    pub fn to_json_file<P: AsRef<Path>>(&self, file: P) -> anyhow::Result<()> {
        let text = serde_json::to_string_pretty(self)?;
        std::fs::write(file.as_ref(), text)?;
        Ok(())
    }

    pub fn from_json_file<P: AsRef<Path>>(file: P) -> anyhow::Result<Self> {
        let text = std::fs::read_to_string(file.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }
}

/// Image VAE whose decoder draws vector paths
pub struct VectorVae {
    config: VectorVaeConfig,
    encoder: ConvEncoder,
    decoder: PathDecoder,
}

impl VectorVae {
    /// Will register encoder variables under `enc.*` and decoder
    /// variables under `dec.*`
    pub fn new(config: VectorVaeConfig, vs: VarBuilder) -> Result<Self> {
        if config.hidden_dims.is_empty() {
            candle_core::bail!("hidden_dims must not be empty");
        }
        let hidden_last = config.hidden_dims[config.hidden_dims.len() - 1];

        let encoder = ConvEncoder::new(
            config.in_channels,
            config.imsize,
            config.latent_dim,
            &config.hidden_dims,
            vs.clone(),
        )?;

        let decoder = PathDecoder::new(
            config.latent_dim,
            config.imsize,
            config.paths,
            hidden_last,
            vs,
        )?;

        info!(
            "vector VAE: {} x {}^2 -> {} latent -> {} path segments, {:?} loss",
            config.in_channels, config.imsize, config.latent_dim, config.paths, config.loss_fn
        );

        Ok(Self {
            config,
            encoder,
            decoder,
        })
    }

    pub fn config(&self) -> &VectorVaeConfig {
        &self.config
    }

    pub fn decoder(&self) -> &PathDecoder {
        &self.decoder
    }

    /// Control points behind `decode` (n x 3 paths x 2)
    pub fn decode_points(&self, z_nk: &Tensor) -> Result<Tensor> {
        self.decoder.decode_points(z_nk)
    }

    /// Vector scenes behind `decode`, one per row of `z_nk`
    pub fn decode_scenes(&self, z_nk: &Tensor) -> Result<Vec<Scene>> {
        self.decoder.decode_scenes(z_nk)
    }

    /// Walk the latent space from the first image to every image
    ///
    /// * `x_nchw` - images (n x c x h x w)
    /// * `steps` - frames per walk
    /// * `mode` - linear or spherical
    ///
    /// Returns `n` tensors of `steps x 3 x h x w`; walk `i` goes from
    /// the posterior mean of image 0 to that of image `i`.
    pub fn interpolate(
        &self,
        x_nchw: &Tensor,
        steps: usize,
        mode: InterpolationMode,
    ) -> Result<Vec<Tensor>> {
        let (mu_nk, _) = self.encode(x_nchw)?;
        let anchor_k = mu_nk.get(0)?;
        (0..mu_nk.dim(0)?)
            .map(|i| {
                let z_sk = interpolate_vectors(&anchor_k, &mu_nk.get(i)?, steps, mode)?;
                self.decode(&z_sk)
            })
            .collect()
    }
}

impl VaeModelT for VectorVae {
    fn encode(&self, x_nchw: &Tensor) -> Result<(Tensor, Tensor)> {
        self.encoder.forward_t(x_nchw, true)
    }

    fn decode(&self, z_nk: &Tensor) -> Result<Tensor> {
        DecoderModuleT::forward(&self.decoder, z_nk)
    }

    /// KL(N(mu, sigma), N(0, 1)) = log 1/sigma + (sigma^2 + mu^2)/2 - 1/2
    fn loss_function(&self, fwd: &VaeForward, kld_weight: f64) -> Result<VaeLoss> {
        // grey inputs are compared against every drawn channel
        let target = if fwd.input.dim(1)? == 1 {
            fwd.input.broadcast_as(fwd.recons.shape())?.contiguous()?
        } else {
            fwd.input.clone()
        };
        let reconstruction = multiscale_recon_loss(self.config.loss_fn, &fwd.recons, &target)?;
        let kld_loss = gaussian_kl_loss(&fwd.mu, &fwd.log_var)?.mean(0)?;
        let loss = (&reconstruction + (&kld_loss * kld_weight)?)?;
        Ok(VaeLoss {
            loss,
            reconstruction,
            kld: kld_loss.neg()?,
        })
    }

    fn dim_latent(&self) -> usize {
        self.config.latent_dim
    }
}
