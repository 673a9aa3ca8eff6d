//! Differentiable rasterization of vector scenes.
//!
//! Every path is flattened into a polyline by Bernstein weights, and each
//! pixel sub-sample gets a soft coverage from its distance to that
//! polyline. The inside test (ray crossings) carries no gradient; the
//! distance does, so autograd moves the control points.

use crate::candle_vector_scene::{Path, Rgba, Scene};
use candle_core::{DType, Device, Result, Tensor};
use candle_nn::ops;
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Uniform};

const EPS: f64 = 1e-8;

#[derive(Clone, Debug)]
pub struct RenderOptions {
    /// sub-samples per pixel along x
    pub samples_x: usize,
    /// sub-samples per pixel along y
    pub samples_y: usize,
    /// seed of the sub-sample jitter
    pub seed: u64,
    /// width (pixels) of the sigmoid edge transition
    pub softness: f64,
    /// line pieces per curved segment
    pub segment_steps: usize,
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self {
            samples_x: 2,
            samples_y: 2,
            seed: 0,
            softness: 0.5,
            segment_steps: 8,
        }
    }
}

/// Jittered sub-sample positions of a canvas, ordered by row, column,
/// then sub-sample
pub struct SampleGrid {
    width: usize,
    height: usize,
    per_pixel: usize,
    px_s1: Tensor,
    py_s1: Tensor,
}

impl SampleGrid {
    pub fn new(width: usize, height: usize, options: &RenderOptions, device: &Device) -> Result<Self> {
        let (sx_n, sy_n) = (options.samples_x.max(1), options.samples_y.max(1));
        let per_pixel = sx_n * sy_n;
        let ntot = width * height * per_pixel;

        let mut rng = StdRng::seed_from_u64(options.seed);
        let jitter = Uniform::new(0f32, 1f32).map_err(candle_core::Error::wrap)?;
        let mut xs = Vec::with_capacity(ntot);
        let mut ys = Vec::with_capacity(ntot);

        for y in 0..height {
            for x in 0..width {
                for sy in 0..sy_n {
                    for sx in 0..sx_n {
                        let u = jitter.sample(&mut rng);
                        let v = jitter.sample(&mut rng);
                        xs.push(x as f32 + (sx as f32 + u) / sx_n as f32);
                        ys.push(y as f32 + (sy as f32 + v) / sy_n as f32);
                    }
                }
            }
        }

        Ok(Self {
            width,
            height,
            per_pixel,
            px_s1: Tensor::from_vec(xs, (ntot, 1), device)?,
            py_s1: Tensor::from_vec(ys, (ntot, 1), device)?,
        })
    }

    pub fn num_samples(&self) -> usize {
        self.width * self.height * self.per_pixel
    }
}

fn binomial(n: usize, k: usize) -> f32 {
    (0..k).fold(1f32, |acc, i| acc * (n - i) as f32 / (i + 1) as f32)
}

/// Bernstein basis of `degree` at `t = j / steps`, `j = 0 .. steps - 1`
///
/// Returns `steps x (degree + 1)` row-major weights.
pub fn bernstein_basis(degree: usize, steps: usize) -> Vec<f32> {
    let mut basis = Vec::with_capacity(steps * (degree + 1));
    for j in 0..steps {
        let t = j as f32 / steps as f32;
        for i in 0..=degree {
            basis.push(binomial(degree, i) * t.powi(i as i32) * (1. - t).powi((degree - i) as i32));
        }
    }
    basis
}

/// Flatten a path into polyline vertices (v x 2)
///
/// Each segment contributes its points at `t = 0, 1/k, ..., (k-1)/k`
/// where lines use `k = 1` and curves `k = segment_steps`. An open path
/// also gets its final anchor.
pub fn flatten_path(path: &Path, segment_steps: usize) -> Result<Tensor> {
    let points = path.points.to_dtype(DType::F32)?;
    let dev = points.device();
    let steps = segment_steps.max(1);

    let mut pieces = Vec::with_capacity(path.num_segments() + 1);
    for idx in path.segment_point_indices() {
        let degree = idx.len() - 1;
        let k = if degree == 1 { 1 } else { steps };
        let basis = Tensor::from_vec(bernstein_basis(degree, k), (k, degree + 1), dev)?;
        let ctrl = points.index_select(&Tensor::new(idx.as_slice(), dev)?, 0)?;
        pieces.push(basis.matmul(&ctrl)?);
    }

    if !path.is_closed {
        let np = points.dim(0)?;
        pieces.push(points.narrow(0, np - 1, 1)?);
    }
    Tensor::cat(&pieces, 0)
}

/// Edges of a polyline as `(start, end)` pairs, each (e x 2)
fn polyline_edges(verts: &Tensor, close: bool) -> Result<Option<(Tensor, Tensor)>> {
    let nv = verts.dim(0)?;
    if close {
        let next = if nv > 1 {
            Tensor::cat(&[verts.narrow(0, 1, nv - 1)?, verts.narrow(0, 0, 1)?], 0)?
        } else {
            verts.clone()
        };
        Ok(Some((verts.clone(), next)))
    } else if nv > 1 {
        Ok(Some((verts.narrow(0, 0, nv - 1)?, verts.narrow(0, 1, nv - 1)?)))
    } else {
        Ok(None)
    }
}

/// split (e x 2) into two (1 x e) rows
fn coords_1e(xy: &Tensor) -> Result<(Tensor, Tensor)> {
    let x = xy.narrow(1, 0, 1)?.t()?;
    let y = xy.narrow(1, 1, 1)?.t()?;
    Ok((x, y))
}

/// Distance from every sample to the nearest edge (s)
fn min_edge_distance(grid: &SampleGrid, a_e2: &Tensor, b_e2: &Tensor) -> Result<Tensor> {
    let (ax, ay) = coords_1e(a_e2)?;
    let (bx, by) = coords_1e(b_e2)?;

    let dx = (bx - &ax)?;
    let dy = (by - &ay)?;
    let len2 = ((dx.sqr()? + dy.sqr()?)? + EPS)?;

    let wx = grid.px_s1.broadcast_sub(&ax)?;
    let wy = grid.py_s1.broadcast_sub(&ay)?;

    // projection onto each edge, clamped to the segment
    let t = (wx.broadcast_mul(&dx)? + wy.broadcast_mul(&dy)?)?
        .broadcast_div(&len2)?
        .clamp(0., 1.)?;

    let qx = (wx - t.broadcast_mul(&dx)?)?;
    let qy = (wy - t.broadcast_mul(&dy)?)?;

    let d2_s = (qx.sqr()? + qy.sqr()?)?.min(1)?;
    (d2_s + EPS)?.sqrt()
}

/// Signed count of edges crossing the ray from each sample towards +x (s)
fn winding_number(grid: &SampleGrid, a_e2: &Tensor, b_e2: &Tensor) -> Result<Tensor> {
    let (ax, ay) = coords_1e(&a_e2.detach())?;
    let (bx, by) = coords_1e(&b_e2.detach())?;

    let a_above = grid.py_s1.broadcast_sub(&ay)?.lt(0.)?.to_dtype(DType::F32)?;
    let b_above = grid.py_s1.broadcast_sub(&by)?.lt(0.)?.to_dtype(DType::F32)?;
    let dir = (b_above - a_above)?;

    let dy = (&by - &ay)?;
    let dy_safe = (&dy + dy.eq(0.)?.to_dtype(DType::F32)?)?;
    let slope = (bx - &ax)?.div(&dy_safe)?;

    let x_cross = grid
        .py_s1
        .broadcast_sub(&ay)?
        .broadcast_mul(&slope)?
        .broadcast_add(&ax)?;
    let right = x_cross
        .broadcast_sub(&grid.px_s1)?
        .gt(0.)?
        .to_dtype(DType::F32)?;

    (dir * right)?.sum(1)
}

/// 0/1 inside indicator from a winding number
fn inside_indicator(winding_s: &Tensor, even_odd: bool) -> Result<Tensor> {
    if even_odd {
        let half = (winding_s * 0.5)?.floor()?;
        winding_s - (half * 2.)?
    } else {
        winding_s.ne(0.)?.to_dtype(DType::F32)
    }
}

/// Fill and stroke coverage of one path over the grid (s x 1 each)
fn path_coverage(
    path: &Path,
    grid: &SampleGrid,
    options: &RenderOptions,
    even_odd: bool,
) -> Result<(Tensor, Tensor)> {
    let verts = flatten_path(path, options.segment_steps)?;
    let softness = options.softness.max(EPS);

    // a fill always closes the outline
    let (fa, fb) = polyline_edges(&verts, true)?
        .ok_or_else(|| candle_core::Error::Msg("path without vertices".into()))?;
    let fill_dist = min_edge_distance(grid, &fa, &fb)?;
    let inside = inside_indicator(&winding_number(grid, &fa, &fb)?, even_odd)?;
    let sign = inside.affine(2., -1.)?;
    let fill = ops::sigmoid(&((sign * &fill_dist)? / softness)?)?;

    let stroke_dist = if path.is_closed {
        Some(fill_dist)
    } else {
        match polyline_edges(&verts, false)? {
            Some((sa, sb)) => Some(min_edge_distance(grid, &sa, &sb)?),
            None => None,
        }
    };
    let stroke = match stroke_dist {
        Some(d) => ops::sigmoid(&(d.affine(-1., 0.5 * path.stroke_width as f64)? / softness)?)?,
        None => fill.zeros_like()?,
    };

    Ok((fill.unsqueeze(1)?, stroke.unsqueeze(1)?))
}

/// union of coverages: 1 - prod (1 - c)
fn union_coverage(covers: &[Tensor]) -> Result<Option<Tensor>> {
    let mut miss: Option<Tensor> = None;
    for c in covers {
        let m = c.affine(-1., 1.)?;
        miss = Some(match miss {
            Some(prev) => (prev * m)?,
            None => m,
        });
    }
    miss.map(|m| m.affine(-1., 1.)).transpose()
}

/// premultiplied layer (s x 4) of a colour with coverage (s x 1)
fn paint_layer(color: &Rgba, coverage_s1: &Tensor) -> Result<Tensor> {
    let a = color[3];
    let premult = [color[0] * a, color[1] * a, color[2] * a, a];
    let color_14 = Tensor::new(&[premult], coverage_s1.device())?;
    coverage_s1.broadcast_mul(&color_14)
}

/// `src` over `dst`
fn composite_over(src_s4: &Tensor, dst_s4: &Tensor) -> Result<Tensor> {
    let src_alpha = src_s4.narrow(1, 3, 1)?;
    src_s4 + dst_s4.broadcast_mul(&src_alpha.affine(-1., 1.)?)?
}

/// Render a scene on a precomputed sample grid
///
/// Returns premultiplied RGBA (height x width x 4) in [0, 1] on a
/// transparent background; groups are painted in order, fill below
/// stroke.
pub fn render_on_grid(scene: &Scene, grid: &SampleGrid, options: &RenderOptions) -> Result<Tensor> {
    if (grid.width, grid.height) != (scene.canvas_width, scene.canvas_height) {
        candle_core::bail!(
            "sample grid {} x {} does not match canvas {} x {}",
            grid.width,
            grid.height,
            scene.canvas_width,
            scene.canvas_height
        );
    }

    let device = grid.px_s1.device();
    let mut accum = Tensor::zeros((grid.num_samples(), 4), DType::F32, device)?;

    for group in &scene.shape_groups {
        let mut fills = Vec::with_capacity(group.shape_ids.len());
        let mut strokes = Vec::with_capacity(group.shape_ids.len());
        for &id in &group.shape_ids {
            let (fill, stroke) =
                path_coverage(&scene.shapes[id], grid, options, group.use_even_odd_rule)?;
            fills.push(fill);
            strokes.push(stroke);
        }

        if let (Some(color), Some(cov)) = (&group.fill_color, union_coverage(&fills)?) {
            accum = composite_over(&paint_layer(color, &cov)?, &accum)?;
        }
        if let (Some(color), Some(cov)) = (&group.stroke_color, union_coverage(&strokes)?) {
            accum = composite_over(&paint_layer(color, &cov)?, &accum)?;
        }
    }

    accum
        .reshape((grid.height, grid.width, grid.per_pixel, 4))?
        .mean(2)
}

/// Render a scene with `options`
///
/// * `scene` - validated scene
/// * `options` - supersampling, seed and edge softness
///
/// Returns premultiplied RGBA (height x width x 4) in [0, 1].
pub fn render(scene: &Scene, options: &RenderOptions) -> Result<Tensor> {
    let device = scene
        .shapes
        .first()
        .map(|p| p.points.device().clone())
        .unwrap_or(Device::Cpu);
    let grid = SampleGrid::new(scene.canvas_width, scene.canvas_height, options, &device)?;
    render_on_grid(scene, &grid, options)
}
