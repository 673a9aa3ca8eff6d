use crate::image_io::*;
use crate::vecvae_common::*;

use candle_core::{Device, Tensor};
use candle_util::candle_interpolation::InterpolationMode;
use candle_util::candle_model_traits::VaeModelT;

use clap::Args;
use std::path::Path;

#[derive(Args, Debug)]
pub struct SampleArgs {
    #[arg(long, short, required = true, help = "Model header ({model}.safetensors)")]
    model: Box<str>,

    #[arg(
        long,
        short,
        required = true,
        help = "Output header",
        long_help = "Output header:\n\
		     - {out}.png (grid of samples)\n\
		     - {out}.{i}.svg (with --svg)\n"
    )]
    out: Box<str>,

    #[arg(short, long, default_value_t = 16, help = "Number of samples")]
    num_samples: usize,

    #[arg(long, default_value_t = 4, help = "Columns of the output grid")]
    ncols: usize,

    #[arg(long, help = "Also write each sampled path as SVG")]
    svg: bool,

    #[arg(long, value_enum, default_value = "cpu", help = "Candle device")]
    device: ComputeDevice,

    #[arg(long, default_value_t = 0, help = "A device for cuda")]
    device_no: usize,

    #[arg(long, short, help = "Verbosity")]
    verbose: bool,
}

/// Decode draws from the prior
pub fn sample_vector_vae(args: &SampleArgs) -> anyhow::Result<()> {
    init_logger(args.verbose);
    mkdir_parent(&args.out)?;

    let dev = args.device.to_device(args.device_no)?;
    let ckpt = Checkpoint::load(&args.model, &dev)?;
    let model = &ckpt.model;

    let z_nk = Tensor::randn(0f32, 1f32, (args.num_samples, model.dim_latent()), &dev)?;
    let x_nchw = model.decode(&z_nk)?;
    save_image_grid(&x_nchw, args.ncols, Path::new(&format!("{}.png", args.out)))?;

    if args.svg {
        for (i, scene) in model.decode_scenes(&z_nk)?.iter().enumerate() {
            let file = format!("{}.{}.svg", args.out, i);
            std::fs::write(&file, scene.to_svg()?)?;
        }
        info!("Wrote {} svg files", args.num_samples);
    }
    Ok(())
}

#[derive(Args, Debug)]
pub struct ReconstructArgs {
    #[arg(required = true, help = "Image directory")]
    image_dir: Box<str>,

    #[arg(long, short, required = true, help = "Model header ({model}.safetensors)")]
    model: Box<str>,

    #[arg(
        long,
        short,
        required = true,
        help = "Output header",
        long_help = "Output header:\n\
		     - {out}.png (inputs on the top row, reconstructions below)\n"
    )]
    out: Box<str>,

    #[arg(
        long,
        help = "Use the posterior mean",
        long_help = "Decode the posterior mean instead of a random draw\n\
		     from the posterior."
    )]
    mean: bool,

    #[arg(long, value_enum, default_value = "cpu", help = "Candle device")]
    device: ComputeDevice,

    #[arg(long, default_value_t = 0, help = "A device for cuda")]
    device_no: usize,

    #[arg(long, short, help = "Verbosity")]
    verbose: bool,
}

pub fn reconstruct_vector_vae(args: &ReconstructArgs) -> anyhow::Result<()> {
    init_logger(args.verbose);
    mkdir_parent(&args.out)?;

    let dev = args.device.to_device(args.device_no)?;
    let ckpt = Checkpoint::load(&args.model, &dev)?;
    let model = &ckpt.model;
    let config = model.config();

    let x_nchw = read_model_inputs(&args.image_dir, config.in_channels, config.imsize, &dev)?;
    let n = x_nchw.dim(0)?;

    let recons_nchw = if args.mean {
        model.decode(&model.encode(&x_nchw)?.0)?
    } else {
        model.generate(&x_nchw)?
    };

    let pairs = Tensor::cat(&[as_rgb(&x_nchw)?, recons_nchw], 0)?;
    save_image_grid(&pairs, n, Path::new(&format!("{}.png", args.out)))?;
    Ok(())
}

#[derive(Args, Debug)]
pub struct InterpolateArgs {
    #[arg(
        required = true,
        help = "Image directory",
        long_help = "Directory of images. Every walk starts at the first\n\
		     image (by file name) and ends at one of the images."
    )]
    image_dir: Box<str>,

    #[arg(long, short, required = true, help = "Model header ({model}.safetensors)")]
    model: Box<str>,

    #[arg(
        long,
        short,
        required = true,
        help = "Output header",
        long_help = "Output header:\n\
		     - {out}.png (one walk per row)\n"
    )]
    out: Box<str>,

    #[arg(long, short, default_value_t = 10, help = "Frames per walk")]
    steps: usize,

    #[arg(
        long,
        value_enum,
        default_value = "linear",
        help = "Interpolation path",
        long_help = "linear: straight line between latent means.\n\
		     spherical: great-circle walk (slerp)."
    )]
    mode: InterpolationMode,

    #[arg(long, value_enum, default_value = "cpu", help = "Candle device")]
    device: ComputeDevice,

    #[arg(long, default_value_t = 0, help = "A device for cuda")]
    device_no: usize,

    #[arg(long, short, help = "Verbosity")]
    verbose: bool,
}

pub fn interpolate_vector_vae(args: &InterpolateArgs) -> anyhow::Result<()> {
    init_logger(args.verbose);
    mkdir_parent(&args.out)?;

    let dev = args.device.to_device(args.device_no)?;
    let ckpt = Checkpoint::load(&args.model, &dev)?;
    let model = &ckpt.model;
    let config = model.config();

    let x_nchw = read_model_inputs(&args.image_dir, config.in_channels, config.imsize, &dev)?;
    let walks = model.interpolate(&x_nchw, args.steps, args.mode)?;
    info!("{} walks of {} frames", walks.len(), args.steps);

    let frames_nchw = Tensor::cat(&walks, 0)?;
    save_image_grid(&frames_nchw, args.steps, Path::new(&format!("{}.png", args.out)))?;
    Ok(())
}

fn read_model_inputs(
    image_dir: &str,
    channels: usize,
    imsize: usize,
    dev: &Device,
) -> anyhow::Result<Tensor> {
    let images = read_image_dir(Path::new(image_dir), channels, imsize)?;
    Ok(Tensor::stack(&images, 0)?.to_device(dev)?)
}

fn as_rgb(x_nchw: &Tensor) -> anyhow::Result<Tensor> {
    Ok(if x_nchw.dim(1)? == 1 {
        x_nchw.repeat((1, 3, 1, 1))?
    } else {
        x_nchw.clone()
    })
}
