pub struct TrainConfig {
    pub learning_rate: f32,
    pub batch_size: usize,
    pub num_epochs: usize,
    pub device: candle_core::Device,
    pub verbose: bool,
    pub show_progress: bool,
}

impl TrainConfig {
    /// KL weight of a minibatch: batch size over dataset size
    pub fn kld_weight(&self, num_samples: usize) -> f64 {
        if num_samples == 0 {
            return 0.;
        }
        self.batch_size as f64 / num_samples as f64
    }
}
