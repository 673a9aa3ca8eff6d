use candle_core::{DType, Device, Result, Tensor};
use candle_nn::{VarBuilder, VarMap};
use candle_util::candle_data_loader::ImageData;
use candle_util::candle_inference::TrainConfig;
use candle_util::candle_interpolation::InterpolationMode;
use candle_util::candle_loss_functions::ReconLossKind;
use candle_util::candle_model_traits::VaeModelT;
use candle_util::candle_vae_inference::train_vae;
use candle_util::candle_vector_vae::{VectorVae, VectorVaeConfig};

const IMSIZE: usize = 16;
const LATENT: usize = 4;

fn small_config(loss_fn: ReconLossKind) -> VectorVaeConfig {
    VectorVaeConfig {
        in_channels: 3,
        latent_dim: LATENT,
        hidden_dims: vec![4, 8],
        loss_fn,
        imsize: IMSIZE,
        paths: 3,
    }
}

fn build(loss_fn: ReconLossKind) -> Result<(VarMap, VectorVae)> {
    let varmap = VarMap::new();
    let vs = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let model = VectorVae::new(small_config(loss_fn), vs)?;
    Ok((varmap, model))
}

fn images(n: usize) -> Result<Tensor> {
    Tensor::rand(0f32, 1f32, (n, 3, IMSIZE, IMSIZE), &Device::Cpu)
}

fn max_abs_diff(a: &Tensor, b: &Tensor) -> Result<f32> {
    (a - b)?.abs()?.max_all()?.to_scalar::<f32>()
}

#[test]
fn forward_shapes() -> Result<()> {
    let (_, model) = build(ReconLossKind::Mse)?;
    let x = images(2)?;
    let fwd = model.forward(&x)?;
    assert_eq!(fwd.recons.dims(), x.dims());
    assert_eq!(fwd.input.dims(), x.dims());
    assert_eq!(fwd.mu.dims(), &[2, LATENT]);
    assert_eq!(fwd.log_var.dims(), &[2, LATENT]);
    Ok(())
}

#[test]
fn rejects_wrong_image_size() -> Result<()> {
    let (_, model) = build(ReconLossKind::Mse)?;
    let x = Tensor::rand(0f32, 1f32, (1, 3, IMSIZE + 1, IMSIZE), &Device::Cpu)?;
    assert!(model.encode(&x).is_err());
    Ok(())
}

#[test]
fn reparameterize_is_stochastic_unless_noise_fixed() -> Result<()> {
    let (_, model) = build(ReconLossKind::Mse)?;
    let dev = Device::Cpu;
    let mu = Tensor::zeros((3, LATENT), DType::F32, &dev)?;
    let lv = Tensor::zeros((3, LATENT), DType::F32, &dev)?;

    let z1 = model.reparameterize(&mu, &lv)?;
    let z2 = model.reparameterize(&mu, &lv)?;
    assert!(max_abs_diff(&z1, &z2)? > 0.);

    let eps = Tensor::randn(0f32, 1f32, (3, LATENT), &dev)?;
    let z3 = model.reparameterize_with_noise(&mu, &lv, &eps)?;
    let z4 = model.reparameterize_with_noise(&mu, &lv, &eps)?;
    assert_eq!(max_abs_diff(&z3, &z4)?, 0.);
    assert_eq!(max_abs_diff(&z3, &eps)?, 0.);
    Ok(())
}

#[test]
fn kld_vanishes_only_at_standard_normal() -> Result<()> {
    let (_, model) = build(ReconLossKind::Mse)?;
    let dev = Device::Cpu;
    let x = images(2)?;
    let mut fwd = model.forward(&x)?;

    fwd.mu = Tensor::zeros((2, LATENT), DType::F32, &dev)?;
    fwd.log_var = Tensor::zeros((2, LATENT), DType::F32, &dev)?;
    let at_prior = model.loss_function(&fwd, 0.5)?;
    assert_eq!(at_prior.kld.to_scalar::<f32>()?, 0.);
    let recon = at_prior.reconstruction.to_scalar::<f32>()?;
    assert!((at_prior.loss.to_scalar::<f32>()? - recon).abs() < 1e-6);

    fwd.mu = Tensor::ones((2, LATENT), DType::F32, &dev)?;
    let off_prior = model.loss_function(&fwd, 0.5)?;
    let kld = off_prior.kld.to_scalar::<f32>()?;
    // KL per row is 0.5 * LATENT, reported negated
    assert!((kld + 0.5 * LATENT as f32).abs() < 1e-5);
    let expected = recon + 0.5 * 0.5 * LATENT as f32;
    assert!((off_prior.loss.to_scalar::<f32>()? - expected).abs() < 1e-4);
    Ok(())
}

#[test]
fn bce_loss_is_finite() -> Result<()> {
    let (_, model) = build(ReconLossKind::Bce)?;
    let fwd = model.forward(&images(2)?)?;
    let loss = model.loss_function(&fwd, 1.)?.loss.to_scalar::<f32>()?;
    assert!(loss.is_finite() && loss > 0.);
    Ok(())
}

#[test]
fn sample_leading_dimension() -> Result<()> {
    let (_, model) = build(ReconLossKind::Mse)?;
    let s = model.sample(5, &Device::Cpu)?;
    assert_eq!(s.dims(), &[5, 3, IMSIZE, IMSIZE]);
    Ok(())
}

#[test]
fn decoded_images_lie_in_unit_interval() -> Result<()> {
    let (_, model) = build(ReconLossKind::Mse)?;
    let z = (Tensor::randn(0f32, 1f32, (4, LATENT), &Device::Cpu)? * 5.)?;
    let x = model.decode(&z)?;
    assert!(x.min_all()?.to_scalar::<f32>()? >= 0.);
    assert!(x.max_all()?.to_scalar::<f32>()? <= 1.);
    Ok(())
}

#[test]
fn decoded_points_and_scenes() -> Result<()> {
    let (_, model) = build(ReconLossKind::Mse)?;
    let z = Tensor::randn(0f32, 1f32, (2, LATENT), &Device::Cpu)?;
    let pts = model.decode_points(&z)?;
    assert_eq!(pts.dims(), &[2, 9, 2]);

    // sigmoid outputs stretched to [-imsize, 2 imsize]
    let s = IMSIZE as f32;
    assert!(pts.min_all()?.to_scalar::<f32>()? >= -s);
    assert!(pts.max_all()?.to_scalar::<f32>()? <= 2. * s);

    let scenes = model.decode_scenes(&z)?;
    assert_eq!(scenes.len(), 2);
    assert_eq!(scenes[0].shapes[0].num_control_points, vec![2, 2, 2]);
    assert!(scenes[1].to_svg()?.contains(" C "));
    Ok(())
}

#[test]
fn generate_reconstructs_input_shape() -> Result<()> {
    let (_, model) = build(ReconLossKind::Mse)?;
    let x = images(3)?;
    assert_eq!(model.generate(&x)?.dims(), x.dims());
    Ok(())
}

#[test]
fn interpolation_walks_from_first_image() -> Result<()> {
    let (_, model) = build(ReconLossKind::Mse)?;
    let x = images(3)?;
    let walks = model.interpolate(&x, 4, InterpolationMode::Linear)?;
    assert_eq!(walks.len(), 3);
    for w in &walks {
        assert_eq!(w.dims(), &[4, 3, IMSIZE, IMSIZE]);
    }
    // every walk starts at the first image's posterior mean
    let first0 = walks[0].get(0)?;
    let first2 = walks[2].get(0)?;
    assert!(max_abs_diff(&first0, &first2)? < 1e-4);

    // walk i ends at the decoded posterior mean of image i
    let (mu, _) = model.encode(&x)?;
    let ends = model.decode(&mu)?;
    assert!(max_abs_diff(&first0, &ends.get(0)?)? < 1e-4);
    for (i, w) in walks.iter().enumerate() {
        let last = w.get(3)?;
        assert!(max_abs_diff(&last, &ends.get(i)?)? < 1e-4, "walk {}", i);
    }

    let spherical = model.interpolate(&x, 2, InterpolationMode::Spherical)?;
    assert_eq!(spherical[1].dims(), &[2, 3, IMSIZE, IMSIZE]);
    Ok(())
}

#[test]
fn loss_backpropagates_to_parameters() -> Result<()> {
    let (varmap, model) = build(ReconLossKind::Mse)?;
    let fwd = model.forward(&images(2)?)?;
    let loss = model.loss_function(&fwd, 0.1)?.loss;
    let grads = loss.backward()?;

    let vars = varmap.all_vars();
    assert!(!vars.is_empty());
    let with_grad = vars
        .iter()
        .filter(|v| grads.get(v.as_tensor()).is_some())
        .count();
    assert_eq!(with_grad, vars.len());
    Ok(())
}

#[test]
fn short_training_run_and_checkpoint() -> anyhow::Result<()> {
    let (varmap, model) = build(ReconLossKind::Mse)?;
    let x = images(5)?;
    let items = (0..5).map(|i| x.get(i)).collect::<Result<Vec<_>>>()?;
    let mut data = ImageData::new(items)?;

    let config = TrainConfig {
        learning_rate: 1e-3,
        batch_size: 2,
        num_epochs: 2,
        device: Device::Cpu,
        verbose: false,
        show_progress: false,
    };
    let scores = train_vae(&model, &varmap, &mut data, &config)?;
    assert_eq!(scores.num_epochs(), 2);
    assert!(scores.loss.iter().all(|l| l.is_finite()));
    assert!(scores.kld.iter().all(|k| *k <= 0.));

    let dir = tempfile::tempdir()?;
    let weights = dir.path().join("model.safetensors");
    let conf_file = dir.path().join("model.config.json");
    varmap.save(&weights)?;
    model.config().to_json_file(&conf_file)?;
    scores.to_tsv(dir.path().join("scores.tsv"))?;

    let conf = VectorVaeConfig::from_json_file(&conf_file)?;
    assert_eq!(&conf, model.config());

    let mut restored_map = VarMap::new();
    let vs = VarBuilder::from_varmap(&restored_map, DType::F32, &Device::Cpu);
    let restored = VectorVae::new(conf, vs)?;
    restored_map.load(&weights)?;

    let z = Tensor::randn(0f32, 1f32, (2, LATENT), &Device::Cpu)?;
    let a = model.decode(&z)?;
    let b = restored.decode(&z)?;
    assert!(max_abs_diff(&a, &b)? < 1e-6);

    let tsv = std::fs::read_to_string(dir.path().join("scores.tsv"))?;
    assert_eq!(tsv.lines().count(), 3);
    Ok(())
}

#[test]
fn grey_input_draws_rgb_and_has_finite_loss() -> Result<()> {
    let varmap = VarMap::new();
    let vs = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let config = VectorVaeConfig {
        in_channels: 1,
        ..small_config(ReconLossKind::Mse)
    };
    let model = VectorVae::new(config, vs)?;

    let x = Tensor::rand(0f32, 1f32, (2, 1, IMSIZE, IMSIZE), &Device::Cpu)?;
    let fwd = model.forward(&x)?;
    assert_eq!(fwd.recons.dims(), &[2, 3, IMSIZE, IMSIZE]);

    let loss = model.loss_function(&fwd, 0.5)?.loss.to_scalar::<f32>()?;
    assert!(loss.is_finite());
    Ok(())
}
