mod fit_vector_vae;
mod generate_vector_vae;
mod image_io;
mod vecvae_common;

use fit_vector_vae::*;
use generate_vector_vae::*;
use vecvae_common::info;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "VECVAE",
    long_about = "Variational autoencoder that draws images with vector paths.\n\
		  The decoder predicts the control points of a closed Bezier path\n\
		  and renders them through a differentiable rasterizer."
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Train a vector VAE on a directory of images",
        long_about = "Train a vector VAE in four stages:\n\
		      (1) Read and resize the images\n\
		      (2) Build the encoder and the path decoder\n\
		      (3) Estimate their parameters via AdamW and save them\n\
		      (4) Draw reconstructions next to their inputs.\n"
    )]
    Train(TrainArgs),

    /// Decode random draws from the prior
    Sample(SampleArgs),

    /// Reconstruct images through the trained model
    Reconstruct(ReconstructArgs),

    #[command(
        about = "Walk the latent space between images",
        long_about = "Encode the images, then decode frames along the line\n\
		      (or great circle) from the first image to each image.\n"
    )]
    Interpolate(InterpolateArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.commands {
        Commands::Train(args) => {
            fit_vector_vae(args)?;
        }
        Commands::Sample(args) => {
            sample_vector_vae(args)?;
        }
        Commands::Reconstruct(args) => {
            reconstruct_vector_vae(args)?;
        }
        Commands::Interpolate(args) => {
            interpolate_vector_vae(args)?;
        }
    }

    info!("Done");
    Ok(())
}
