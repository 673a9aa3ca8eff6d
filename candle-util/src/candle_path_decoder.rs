use crate::candle_aux_layers::{linear_stack, StackLayers};
use crate::candle_model_traits::DecoderModuleT;
use crate::candle_vector_raster::{render_on_grid, RenderOptions, SampleGrid};
use crate::candle_vector_scene::{Path, Scene, ShapeGroup, OPAQUE_WHITE};
use candle_core::{Result, Tensor};
use candle_nn::{Activation, Linear, Module, VarBuilder};
use log::debug;

/// Control points are predicted in [0, 1] and stretched by this
/// factor around the canvas centre, so paths may leave the canvas.
pub const POINT_SPREAD: f64 = 3.;

/// Anchor plus two control points: cubic segments
pub const POINTS_PER_SEGMENT: usize = 3;

/// Sub-samples per pixel (each axis) and jitter seed of the renderer
pub const RENDER_SAMPLES: usize = 2;
pub const RENDER_SEED: u64 = 102;

/// Decoder that predicts the control points of one closed path and
/// renders it
pub struct PathDecoder {
    n_latent: usize,
    imsize: usize,
    n_segments: usize,
    points: StackLayers<Linear>,
    render_options: RenderOptions,
}

impl PathDecoder {
    /// Will create a new path decoder with the following parameters:
    /// * `dec.fc.{}.weight` where {} is the layer index
    ///
    /// The first layer maps the latent to `h`, the last hidden width of
    /// the encoder, followed by `2h, 3h, 4h, 4h, 4h` and the output of
    /// `2 * 3 * n_segments` coordinates.
    pub fn new(
        n_latent: usize,
        imsize: usize,
        n_segments: usize,
        hidden_dim: usize,
        vs: VarBuilder,
    ) -> Result<Self> {
        if n_segments == 0 {
            candle_core::bail!("the decoder needs at least one path segment");
        }

        let h = hidden_dim;
        let dims = [
            n_latent,
            h,
            h * 2,
            h * 3,
            h * 4,
            h * 4,
            h * 4,
            2 * POINTS_PER_SEGMENT * n_segments,
        ];

        // bound spatial extent
        let points = linear_stack(
            &dims,
            Activation::Relu,
            Some(Activation::Sigmoid),
            vs.pp("dec.fc"),
        )?;

        let render_options = RenderOptions {
            samples_x: RENDER_SAMPLES,
            samples_y: RENDER_SAMPLES,
            seed: RENDER_SEED,
            ..Default::default()
        };

        Ok(Self {
            n_latent,
            imsize,
            n_segments,
            points,
            render_options,
        })
    }

    pub fn with_render_options(mut self, render_options: RenderOptions) -> Self {
        self.render_options = render_options;
        self
    }

    pub fn num_points(&self) -> usize {
        POINTS_PER_SEGMENT * self.n_segments
    }

    /// Predicted control points in pixel coordinates (n x 3s x 2)
    pub fn decode_points(&self, z_nk: &Tensor) -> Result<Tensor> {
        let n = z_nk.dim(0)?;
        let unit_nd = self.points.forward(z_nk)?;
        let unit_np2 = unit_nd.reshape((n, self.num_points(), 2))?;

        // ((p - 0.5) * spread + 0.5) * imsize
        let s = self.imsize as f64;
        unit_np2.affine(POINT_SPREAD * s, (0.5 - 0.5 * POINT_SPREAD) * s)
    }

    /// The closed path with white fill and stroke drawn for `points`
    pub fn build_scene(&self, points_p2: Tensor) -> Result<Scene> {
        let path = Path::new(vec![2; self.n_segments], points_p2, true);
        let group = ShapeGroup::new(vec![0], Some(OPAQUE_WHITE), Some(OPAQUE_WHITE));
        Scene::new(self.imsize, self.imsize, vec![path], vec![group])
    }

    /// One scene per row of `z_nk`
    pub fn decode_scenes(&self, z_nk: &Tensor) -> Result<Vec<Scene>> {
        let points_np2 = self.decode_points(z_nk)?;
        (0..points_np2.dim(0)?)
            .map(|k| self.build_scene(points_np2.get(k)?))
            .collect()
    }
}

impl DecoderModuleT for PathDecoder {
    fn forward(&self, z_nk: &Tensor) -> Result<Tensor> {
        let points_np2 = self.decode_points(z_nk)?;
        let n = points_np2.dim(0)?;

        let grid = SampleGrid::new(
            self.imsize,
            self.imsize,
            &self.render_options,
            points_np2.device(),
        )?;

        // process the batch sequentially
        let mut outputs = Vec::with_capacity(n);
        for k in 0..n {
            let scene = self.build_scene(points_np2.get(k)?)?;
            let rgba_hw4 = render_on_grid(&scene, &grid, &self.render_options)?;
            // discard alpha
            let rgb_3hw = rgba_hw4.permute((2, 0, 1))?.narrow(0, 0, 3)?;
            outputs.push(rgb_3hw);
        }
        debug!("rendered {} scenes of {} x {}", n, self.imsize, self.imsize);

        // white background, dark shapes
        Tensor::stack(&outputs, 0)?.affine(-1., 1.)
    }

    fn dim_latent(&self) -> usize {
        self.n_latent
    }
}
