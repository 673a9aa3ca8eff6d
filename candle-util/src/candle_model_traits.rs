use candle_core::{Device, Result, Tensor};

pub trait EncoderModuleT {
    /// An encoder that spits out the latent Gaussian parameters
    ///
    /// # Arguments
    /// * `x_nchw` - input images (n x c x h x w)
    /// * `train` - whether to use dropout/batchnorm or not
    ///
    /// # Returns `(z_mean_nk, z_lnvar_nk)`
    /// * `z_mean_nk` - mean of the approximate posterior (n x k)
    /// * `z_lnvar_nk` - log variance of the approximate posterior (n x k)
    fn forward_t(&self, x_nchw: &Tensor, train: bool) -> Result<(Tensor, Tensor)>;

    fn dim_latent(&self) -> usize;
}

pub trait DecoderModuleT {
    /// A decoder that spits out reconstructed images (n x c x h x w)
    fn forward(&self, z_nk: &Tensor) -> Result<Tensor>;

    fn dim_latent(&self) -> usize;
}

/// Everything a forward pass produces
pub struct VaeForward {
    pub recons: Tensor,
    pub input: Tensor,
    pub mu: Tensor,
    pub log_var: Tensor,
}

/// Loss terms of one minibatch; all scalars
pub struct VaeLoss {
    /// reconstruction + kld_weight * KL
    pub loss: Tensor,
    pub reconstruction: Tensor,
    /// negated KL divergence, `<= 0`
    pub kld: Tensor,
}

/// Common interface of image VAEs
pub trait VaeModelT {
    /// `x_nchw -> (mu_nk, log_var_nk)`
    fn encode(&self, x_nchw: &Tensor) -> Result<(Tensor, Tensor)>;

    /// `z_nk -> recons_nchw`
    fn decode(&self, z_nk: &Tensor) -> Result<Tensor>;

    /// * `fwd` - output of [`VaeModelT::forward`]
    /// * `kld_weight` - weight of the KL term, usually batch / dataset size
    fn loss_function(&self, fwd: &VaeForward, kld_weight: f64) -> Result<VaeLoss>;

    fn dim_latent(&self) -> usize;

    /// z = mu + sigma * eps
    /// where eps ~ N(0, 1)
    ///
    /// # Arguments
    /// * `mu` - mean of Gaussian distribution
    /// * `log_var` - log variance of Gaussian distribution
    fn reparameterize(&self, mu: &Tensor, log_var: &Tensor) -> Result<Tensor> {
        let eps = Tensor::randn_like(mu, 0., 1.)?;
        self.reparameterize_with_noise(mu, log_var, &eps)
    }

    /// Same as [`VaeModelT::reparameterize`] with the noise `eps` given
    fn reparameterize_with_noise(&self, mu: &Tensor, log_var: &Tensor, eps: &Tensor) -> Result<Tensor> {
        mu + (log_var * 0.5)?.exp()?.mul(eps)?
    }

    fn forward(&self, x_nchw: &Tensor) -> Result<VaeForward> {
        let (mu, log_var) = self.encode(x_nchw)?;
        let z = self.reparameterize(&mu, &log_var)?;
        Ok(VaeForward {
            recons: self.decode(&z)?,
            input: x_nchw.clone(),
            mu,
            log_var,
        })
    }

    /// Decode `num_samples` draws from the standard normal prior
    fn sample(&self, num_samples: usize, device: &Device) -> Result<Tensor> {
        let z = Tensor::randn(0f32, 1f32, (num_samples, self.dim_latent()), device)?;
        self.decode(&z)
    }

    /// Reconstruct `x_nchw`
    fn generate(&self, x_nchw: &Tensor) -> Result<Tensor> {
        Ok(self.forward(x_nchw)?.recons)
    }
}
