use crate::image_io::*;
use crate::vecvae_common::*;

use candle_core::Tensor;
use candle_util::candle_data_loader::ImageData;
use candle_util::candle_inference::TrainConfig;
use candle_util::candle_loss_functions::ReconLossKind;
use candle_util::candle_model_traits::VaeModelT;
use candle_util::candle_vae_inference::train_vae;
use candle_util::candle_vector_vae::{VectorVaeConfig, DEFAULT_HIDDEN_DIMS};

use clap::Args;
use std::path::Path;

#[derive(Args, Debug)]
pub struct TrainArgs {
    #[arg(
        required = true,
        help = "Image directory",
        long_help = "Directory of training images (png, jpg).\n\
		     Every image is resized to `imsize x imsize`."
    )]
    image_dir: Box<str>,

    #[arg(
        long,
        short,
        required = true,
        help = "Output header",
        long_help = "Output header for results:\n\
		     - {out}.safetensors\n\
		     - {out}.config.json\n\
		     - {out}.scores.tsv\n\
		     - {out}.recons.png\n"
    )]
    out: Box<str>,

    #[arg(
        long,
        default_value_t = 3,
        help = "Input channels (1 or 3)",
        long_help = "Number of image channels seen by the encoder.\n\
		     1 reads images as grey, 3 as RGB.\n\
		     The decoder always draws RGB."
    )]
    in_channels: usize,

    #[arg(long, short = 'k', default_value_t = 128, help = "Latent dimension")]
    latent_dim: usize,

    #[arg(
        long,
        value_delimiter(','),
        help = "Encoder conv widths",
        long_help = "Output channels of the strided conv layers (comma-separated).\n\
		     The last one also sets the decoder's hidden width.\n\
		     Default: 32,64,128,256,512"
    )]
    hidden_dims: Option<Vec<usize>>,

    #[arg(
        long,
        value_enum,
        default_value = "mse",
        help = "Reconstruction loss",
        long_help = "Pixel reconstruction loss, applied at full\n\
		     and three-quarter resolution."
    )]
    loss: ReconLossKind,

    #[arg(long, default_value_t = 64, help = "Image side length")]
    imsize: usize,

    #[arg(
        long,
        default_value_t = 4,
        help = "Number of path segments",
        long_help = "Number of cubic segments of the one closed path\n\
		     drawn by the decoder."
    )]
    paths: usize,

    #[arg(long, short = 'i', default_value_t = 100, help = "Training epochs")]
    epochs: usize,

    #[arg(long, default_value_t = 16, help = "Minibatch size")]
    batch_size: usize,

    #[arg(long, default_value_t = 5e-3, help = "Learning rate")]
    learning_rate: f32,

    #[arg(
        long,
        value_enum,
        default_value = "cpu",
        help = "Candle device",
        long_help = "Candle device to use for computation.\n\
		     Options: cpu, cuda, metal."
    )]
    device: ComputeDevice,

    #[arg(
        long,
        default_value_t = 0,
        help = "A device for cuda",
        long_help = "For cuda or metal, we may want to choose a different device."
    )]
    device_no: usize,

    #[arg(
        long,
        default_value_t = 16,
        help = "Reconstructions in the output grid"
    )]
    num_show: usize,

    #[arg(long, short, help = "Verbosity")]
    verbose: bool,
}

pub fn fit_vector_vae(args: &TrainArgs) -> anyhow::Result<()> {
    init_logger(args.verbose);
    mkdir_parent(&args.out)?;

    let dev = args.device.to_device(args.device_no)?;

    // 1. Read images
    let images = read_image_dir(Path::new(&*args.image_dir), args.in_channels, args.imsize)?;
    let mut data = ImageData::new(images)?;

    // 2. Build the encoder and the path decoder
    let config = VectorVaeConfig {
        in_channels: args.in_channels,
        latent_dim: args.latent_dim,
        hidden_dims: args
            .hidden_dims
            .clone()
            .unwrap_or_else(|| DEFAULT_HIDDEN_DIMS.to_vec()),
        loss_fn: args.loss,
        imsize: args.imsize,
        paths: args.paths,
    };
    let ckpt = Checkpoint::init(config, &dev)?;

    // 3. Train and save
    let train_config = TrainConfig {
        learning_rate: args.learning_rate,
        batch_size: args.batch_size,
        num_epochs: args.epochs,
        device: dev.clone(),
        verbose: args.verbose,
        show_progress: true,
    };

    let scores = train_vae(&ckpt.model, &ckpt.parameters, &mut data, &train_config)?;

    ckpt.save(&args.out)?;
    scores.to_tsv(format!("{}.scores.tsv", args.out))?;

    // 4. Draw a few reconstructions next to their inputs
    let x_nchw = data.stacked(&dev)?;
    let nshow = args.num_show.clamp(1, x_nchw.dim(0)?);
    let x_nchw = x_nchw.narrow(0, 0, nshow)?;
    let (mu_nk, _) = ckpt.model.encode(&x_nchw)?;
    let recons_nchw = ckpt.model.decode(&mu_nk)?;

    let shown = if args.in_channels == 1 {
        x_nchw.repeat((1, 3, 1, 1))?
    } else {
        x_nchw
    };
    let pairs = Tensor::cat(&[shown, recons_nchw], 0)?;
    save_image_grid(&pairs, nshow, Path::new(&format!("{}.recons.png", args.out)))?;

    Ok(())
}
