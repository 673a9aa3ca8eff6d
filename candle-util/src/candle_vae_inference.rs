use crate::candle_data_loader::DataLoader;
use crate::candle_inference::TrainConfig;
use crate::candle_model_traits::VaeModelT;

use candle_nn::{AdamW, Optimizer};
use indicatif::{ProgressBar, ProgressDrawTarget};
use log::info;
use std::io::Write;
use std::path::Path;

/// Per-epoch averages over minibatches
#[derive(Default, Debug, Clone)]
pub struct TrainScores {
    pub loss: Vec<f32>,
    pub reconstruction: Vec<f32>,
    pub kld: Vec<f32>,
}

impl TrainScores {
    pub fn num_epochs(&self) -> usize {
        self.loss.len()
    }

    /// Tab-separated: `epoch loss reconstruction kld`
    pub fn to_tsv<P: AsRef<Path>>(&self, file: P) -> anyhow::Result<()> {
        let mut out = std::io::BufWriter::new(std::fs::File::create(file.as_ref())?);
        writeln!(out, "epoch\tloss\treconstruction\tkld")?;
        for e in 0..self.num_epochs() {
            writeln!(
                out,
                "{}\t{}\t{}\t{}",
                e + 1,
                self.loss[e],
                self.reconstruction[e],
                self.kld[e]
            )?;
        }
        out.flush()?;
        Ok(())
    }
}

/// Train a VAE by AdamW on shuffled minibatches
///
/// * `model` - the model; its variables must live in `variable_map`
/// * `variable_map` - all trainable parameters
/// * `data` - data loader
/// * `train_config` - training configuration
///
pub fn train_vae<Model, DataL>(
    model: &Model,
    variable_map: &candle_nn::VarMap,
    data: &mut DataL,
    train_config: &TrainConfig,
) -> anyhow::Result<TrainScores>
where
    Model: VaeModelT,
    DataL: DataLoader,
{
    if data.num_samples() == 0 {
        anyhow::bail!("no training data");
    }

    let device = &train_config.device;
    let mut adam = AdamW::new_lr(
        variable_map.all_vars(),
        train_config.learning_rate.into(),
    )?;

    let pb = ProgressBar::new(train_config.num_epochs as u64);

    if !train_config.show_progress || train_config.verbose {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }

    let kld_weight = train_config.kld_weight(data.num_samples());
    let mut scores = TrainScores::default();

    info!("Start training VAE...");

    for epoch in 0..train_config.num_epochs {
        data.shuffle_minibatch(train_config.batch_size)?;
        let num_minibatches = data.num_minibatch();

        let mut loss_tot = 0f32;
        let mut recon_tot = 0f32;
        let mut kld_tot = 0f32;

        for b in 0..num_minibatches {
            let x_nchw = data.minibatch_data(b, device)?;
            let fwd = model.forward(&x_nchw)?;
            let losses = model.loss_function(&fwd, kld_weight)?;
            adam.backward_step(&losses.loss)?;

            loss_tot += losses.loss.to_scalar::<f32>()?;
            recon_tot += losses.reconstruction.to_scalar::<f32>()?;
            kld_tot += losses.kld.to_scalar::<f32>()?;
        }

        let denom = num_minibatches.max(1) as f32;
        scores.loss.push(loss_tot / denom);
        scores.reconstruction.push(recon_tot / denom);
        scores.kld.push(kld_tot / denom);
        pb.inc(1);

        if train_config.verbose {
            info!(
                "[{}] loss: {:.6}, reconstruction: {:.6}, KLD: {:.6}",
                epoch + 1,
                loss_tot / denom,
                recon_tot / denom,
                kld_tot / denom
            );
        }
    } // each epoch

    pb.finish_and_clear();
    info!("done model training");
    Ok(scores)
}
