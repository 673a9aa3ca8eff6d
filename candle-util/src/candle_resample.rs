use candle_core::{Device, Result, Tensor};

/// Interpolation weights of a 1-D linear resize from `n_in` to
/// `n_out` samples (half-pixel centres, corners not aligned).
///
/// Returns `n_out x n_in` row-major weights; every row sums to one.
pub fn linear_resize_weights(n_in: usize, n_out: usize) -> Vec<f32> {
    let mut weights = vec![0f32; n_out * n_in];
    if n_in == 0 {
        return weights;
    }
    let scale = n_in as f64 / n_out as f64;
    for i in 0..n_out {
        let src = ((i as f64 + 0.5) * scale - 0.5).max(0.);
        let i0 = (src.floor() as usize).min(n_in - 1);
        let i1 = if i0 + 1 < n_in { i0 + 1 } else { i0 };
        let lambda = (src - i0 as f64) as f32;
        weights[i * n_in + i0] += 1. - lambda;
        weights[i * n_in + i1] += lambda;
    }
    weights
}

fn resize_matrix(n_in: usize, n_out: usize, device: &Device) -> Result<Tensor> {
    Tensor::from_vec(linear_resize_weights(n_in, n_out), (n_out, n_in), device)
}

/// Bilinear resize of a batch of images
///
/// out = R_h * x * R_w^T, applied to every (n, c) plane, so that
/// gradients flow back to `x_nchw`
///
/// * `x_nchw` - images (n x c x h x w)
/// * `size` - output `(height, width)`
///
pub fn bilinear_resize(x_nchw: &Tensor, size: (usize, usize)) -> Result<Tensor> {
    let (n, c, h, w) = x_nchw.dims4()?;
    let (out_h, out_w) = size;
    if (out_h, out_w) == (h, w) {
        return Ok(x_nchw.clone());
    }

    let dev = x_nchw.device();
    let dtype = x_nchw.dtype();
    let r_hh = resize_matrix(h, out_h, dev)?.to_dtype(dtype)?;
    let r_ww = resize_matrix(w, out_w, dev)?.to_dtype(dtype)?;

    // (n c h) x w  ->  (n c h) x out_w
    let x_rows = x_nchw
        .reshape((n * c * h, w))?
        .matmul(&r_ww.t()?.contiguous()?)?
        .reshape((n * c, h, out_w))?;

    // out_h x h  times  (n c) x h x out_w
    r_hh.unsqueeze(0)?
        .broadcast_as((n * c, out_h, h))?
        .contiguous()?
        .matmul(&x_rows.contiguous()?)?
        .reshape((n, c, out_h, out_w))
}
