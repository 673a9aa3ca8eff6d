pub use log::info;

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use candle_util::candle_vector_vae::{VectorVae, VectorVaeConfig};
use clap::ValueEnum;

#[derive(ValueEnum, Clone, Debug, PartialEq)]
#[clap(rename_all = "lowercase")]
pub enum ComputeDevice {
    Cpu,
    Cuda,
    Metal,
}

impl ComputeDevice {
    pub fn to_device(&self, device_no: usize) -> anyhow::Result<Device> {
        Ok(match self {
            ComputeDevice::Metal => Device::new_metal(device_no)?,
            ComputeDevice::Cuda => Device::new_cuda(device_no)?,
            _ => Device::Cpu,
        })
    }
}

pub fn weights_file(out: &str) -> String {
    format!("{}.safetensors", out)
}

pub fn config_file(out: &str) -> String {
    format!("{}.config.json", out)
}

/// A model with its variables
pub struct Checkpoint {
    pub parameters: VarMap,
    pub model: VectorVae,
}

impl Checkpoint {
    /// Fresh model with randomly initialised variables
    pub fn init(config: VectorVaeConfig, dev: &Device) -> anyhow::Result<Self> {
        let parameters = VarMap::new();
        let vs = VarBuilder::from_varmap(&parameters, DType::F32, dev);
        let model = VectorVae::new(config, vs)?;
        Ok(Self { parameters, model })
    }

    /// Read `{out}.config.json` and `{out}.safetensors`
    pub fn load(out: &str, dev: &Device) -> anyhow::Result<Self> {
        let config = VectorVaeConfig::from_json_file(config_file(out))?;
        let mut ckpt = Self::init(config, dev)?;
        ckpt.parameters.load(weights_file(out))?;
        info!("Loaded model from {}", weights_file(out));
        Ok(ckpt)
    }

    pub fn save(&self, out: &str) -> anyhow::Result<()> {
        self.model.config().to_json_file(config_file(out))?;
        self.parameters.save(weights_file(out))?;
        info!("Saved model to {}", weights_file(out));
        Ok(())
    }
}

pub fn init_logger(verbose: bool) {
    if verbose {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();
}

/// Create the parent directory of an output prefix
pub fn mkdir_parent(out: &str) -> anyhow::Result<()> {
    if let Some(dir) = std::path::Path::new(out).parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir)?;
        }
    }
    Ok(())
}
