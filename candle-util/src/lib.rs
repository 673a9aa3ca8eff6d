pub mod candle_aux_layers;
pub mod candle_data_loader;
pub mod candle_image_encoder;
pub mod candle_inference;
pub mod candle_interpolation;
pub mod candle_loss_functions;
pub mod candle_model_traits;
pub mod candle_path_decoder;
pub mod candle_resample;
pub mod candle_vae_inference;
pub mod candle_vector_raster;
pub mod candle_vector_scene;
pub mod candle_vector_vae;

pub use candle_core;
pub use candle_nn;
