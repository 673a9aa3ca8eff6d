use crate::candle_resample::bilinear_resize;
use candle_core::{Result, Tensor};
use serde::{Deserialize, Serialize};

/// KL divergence loss between two Gaussian distributions
///
/// -0.5 * (1 + log(sigma^2) - mu^2 - sigma^2)
///
/// * `z_mean` - mean of Gaussian distribution
/// * `z_lnvar` - log variance of Gaussian distribution
///
pub fn gaussian_kl_loss(z_mean: &Tensor, z_lnvar: &Tensor) -> Result<Tensor> {
    let z_var = z_lnvar.exp()?;
    (z_var - 1. + z_mean.powf(2.)? - z_lnvar)?.sum(z_mean.rank() - 1)? * 0.5
}

/// Mean squared error averaged over every element
///
/// mean_i (recon(i) - target(i))^2
///
pub fn mse_loss(recon: &Tensor, target: &Tensor) -> Result<Tensor> {
    recon.sub(target)?.sqr()?.mean_all()
}

/// log terms of the cross entropy are clamped from below at this value
pub const BCE_LOG_FLOOR: f64 = -100.;

/// `max(log p, BCE_LOG_FLOOR)` with a finite gradient at `p = 0`
fn clamped_log(p: &Tensor) -> Result<Tensor> {
    let is_zero = p.le(0.)?;
    let safe_p = is_zero.where_cond(&p.ones_like()?, p)?;
    let floor = (p.zeros_like()? + BCE_LOG_FLOOR)?;
    is_zero.where_cond(&floor, &safe_p.log()?.clamp(BCE_LOG_FLOOR, 0.)?)
}

/// Binary cross entropy averaged over every element
///
/// -mean_i [ t(i) * log p(i) + (1 - t(i)) * log(1 - p(i)) ]
///
/// Each log is clamped at -100, so a saturated wrong prediction
/// costs 100.
///
/// * `recon` - probabilities in [0, 1]
/// * `target` - targets in [0, 1]
///
pub fn bce_loss(recon: &Tensor, target: &Tensor) -> Result<Tensor> {
    let log_p = clamped_log(recon)?;
    let log_1mp = clamped_log(&recon.affine(-1., 1.)?)?;
    let one_minus_t = target.affine(-1., 1.)?;

    target
        .mul(&log_p)?
        .add(&one_minus_t.mul(&log_1mp)?)?
        .mean_all()?
        .neg()
}

/// Per-pixel reconstruction loss of the image VAE
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ReconLossKind {
    #[serde(alias = "BCE")]
    #[value(alias = "BCE")]
    Bce,
    #[serde(alias = "MSE")]
    #[value(alias = "MSE")]
    #[default]
    Mse,
}

impl ReconLossKind {
    pub fn loss(&self, recon: &Tensor, target: &Tensor) -> Result<Tensor> {
        match self {
            Self::Bce => bce_loss(recon, target),
            Self::Mse => mse_loss(recon, target),
        }
    }
}

/// Extra comparison resolutions: `floor(s * 1.5 / j)` for `j = 2`
const MULTISCALE_DIVISORS: [usize; 1] = [2];

/// Downsampled sizes used by [`multiscale_recon_loss`] for an `h x w`
/// image
pub fn multiscale_sizes(h: usize, w: usize) -> Vec<(usize, usize)> {
    MULTISCALE_DIVISORS
        .iter()
        .map(|&j| ((h * 3) / (2 * j), (w * 3) / (2 * j)))
        .filter(|&(sh, sw)| sh > 0 && sw > 0)
        .collect()
}

/// Reconstruction loss at full resolution plus the same loss after
/// bilinear downsampling of both images
///
/// * `recon_nchw` - reconstruction (n x c x h x w)
/// * `input_nchw` - observed images (n x c x h x w)
///
pub fn multiscale_recon_loss(
    kind: ReconLossKind,
    recon_nchw: &Tensor,
    input_nchw: &Tensor,
) -> Result<Tensor> {
    let (_, _, h, w) = recon_nchw.dims4()?;
    let mut loss = kind.loss(recon_nchw, input_nchw)?;
    for size in multiscale_sizes(h, w) {
        let recon_down = bilinear_resize(recon_nchw, size)?;
        let input_down = bilinear_resize(input_nchw, size)?;
        loss = (loss + kind.loss(&recon_down, &input_down)?)?;
    }
    Ok(loss)
}
