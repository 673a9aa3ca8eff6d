use candle_core::{DType, Result, Tensor};
use serde::{Deserialize, Serialize};

/// How to walk between two latent vectors
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum InterpolationMode {
    /// (1 - t) a + t b
    Linear,
    /// great-circle walk, falls back to linear for (anti)parallel pairs
    Spherical,
}

/// `steps` evenly spaced points of [0, 1]; a single step is `t = 0`
fn unit_steps(steps: usize) -> Vec<f64> {
    match steps {
        0 => vec![],
        1 => vec![0.],
        _ => (0..steps)
            .map(|j| j as f64 / (steps - 1) as f64)
            .collect(),
    }
}

/// Interpolate between two latent vectors
///
/// * `start_k` - first vector (k)
/// * `end_k` - last vector (k)
/// * `steps` - number of vectors returned
/// * `mode` - interpolation path
///
/// Returns `steps x k`; the first row is `start_k` and the last row is
/// `end_k`.
pub fn interpolate_vectors(
    start_k: &Tensor,
    end_k: &Tensor,
    steps: usize,
    mode: InterpolationMode,
) -> Result<Tensor> {
    if start_k.dims() != end_k.dims() || start_k.rank() != 1 {
        candle_core::bail!(
            "interpolation needs two vectors of equal length, got {:?} and {:?}",
            start_k.dims(),
            end_k.dims()
        );
    }
    if steps == 0 {
        candle_core::bail!("interpolation needs at least one step");
    }

    let ts = unit_steps(steps);

    let weights: Vec<(f64, f64)> = match mode {
        InterpolationMode::Linear => ts.iter().map(|&t| (1. - t, t)).collect(),
        InterpolationMode::Spherical => {
            let a = start_k.to_dtype(DType::F64)?;
            let b = end_k.to_dtype(DType::F64)?;
            let dot = (&a * &b)?.sum_all()?.to_scalar::<f64>()?;
            let na = a.sqr()?.sum_all()?.sqrt()?.to_scalar::<f64>()?;
            let nb = b.sqr()?.sum_all()?.sqrt()?.to_scalar::<f64>()?;
            let cos = (dot / (na * nb).max(f64::MIN_POSITIVE)).clamp(-1., 1.);
            let omega = cos.acos();
            let sin_omega = omega.sin();
            if sin_omega.abs() < 1e-6 {
                ts.iter().map(|&t| (1. - t, t)).collect()
            } else {
                ts.iter()
                    .map(|&t| {
                        (
                            ((1. - t) * omega).sin() / sin_omega,
                            (t * omega).sin() / sin_omega,
                        )
                    })
                    .collect()
            }
        }
    };

    let dev = start_k.device();
    let (w0, w1): (Vec<f32>, Vec<f32>) = weights
        .into_iter()
        .map(|(u, v)| (u as f32, v as f32))
        .unzip();
    let w0_s1 = Tensor::from_vec(w0, (steps, 1), dev)?.to_dtype(start_k.dtype())?;
    let w1_s1 = Tensor::from_vec(w1, (steps, 1), dev)?.to_dtype(start_k.dtype())?;

    let a_1k = start_k.unsqueeze(0)?;
    let b_1k = end_k.unsqueeze(0)?;
    w0_s1.broadcast_mul(&a_1k)? + w1_s1.broadcast_mul(&b_1k)?
}
