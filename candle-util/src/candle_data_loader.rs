use candle_core::{Device, Tensor};
use rand::prelude::SliceRandom;

/// `DataLoader` for minibatch learning
pub trait DataLoader {
    fn minibatch_data(&self, batch_idx: usize, target_device: &Device) -> anyhow::Result<Tensor>;

    fn num_minibatch(&self) -> usize;

    fn num_samples(&self) -> usize;

    fn shuffle_minibatch(&mut self, batch_size: usize) -> anyhow::Result<()>;
}

///
/// In-memory image data. Each item is a `c x h x w` tensor; a
/// minibatch stacks them into `n x c x h x w`.
///
pub struct ImageData {
    images: Vec<Tensor>,
    minibatches: Minibatches,
}

impl ImageData {
    pub fn new(images: Vec<Tensor>) -> anyhow::Result<Self> {
        if let Some(first) = images.first() {
            let dims = first.dims().to_vec();
            if dims.len() != 3 {
                anyhow::bail!("expected c x h x w images, got {:?}", dims);
            }
            if let Some(other) = images.iter().find(|x| x.dims() != dims.as_slice()) {
                anyhow::bail!("image shapes differ: {:?} vs {:?}", dims, other.dims());
            }
        }

        let samples = (0..images.len()).collect();
        Ok(Self {
            images,
            minibatches: Minibatches {
                samples,
                chunks: vec![],
            },
        })
    }

    /// All images stacked in their original order
    pub fn stacked(&self, target_device: &Device) -> anyhow::Result<Tensor> {
        if self.images.is_empty() {
            anyhow::bail!("no images");
        }
        Ok(Tensor::stack(&self.images, 0)?.to_device(target_device)?)
    }

    pub fn image_dims(&self) -> Option<&[usize]> {
        self.images.first().map(|x| x.dims())
    }
}

impl DataLoader for ImageData {
    fn minibatch_data(&self, batch_idx: usize, target_device: &Device) -> anyhow::Result<Tensor> {
        let chunk = self
            .minibatches
            .chunks
            .get(batch_idx)
            .ok_or_else(|| anyhow::anyhow!("need to shuffle data, or #{} out of range", batch_idx))?;

        let items = chunk
            .iter()
            .map(|&i| self.images[i].clone())
            .collect::<Vec<_>>();

        Ok(Tensor::stack(&items, 0)?.to_device(target_device)?)
    }

    fn num_minibatch(&self) -> usize {
        self.minibatches.chunks.len()
    }

    fn num_samples(&self) -> usize {
        self.minibatches.size()
    }

    fn shuffle_minibatch(&mut self, batch_size: usize) -> anyhow::Result<()> {
        if batch_size == 0 {
            anyhow::bail!("batch size must be positive");
        }
        self.minibatches.shuffle_minibatch(batch_size);
        Ok(())
    }
}

pub struct Minibatches {
    samples: Vec<usize>,
    pub chunks: Vec<Vec<usize>>,
}

impl Minibatches {
    /// Permute samples and cut them into chunks of `batch_size`; the
    /// last chunk keeps the remainder.
    pub fn shuffle_minibatch(&mut self, batch_size: usize) {
        let mut rng = rand::rng();
        self.samples.shuffle(&mut rng);
        self.chunks = self
            .samples
            .chunks(batch_size.max(1))
            .map(|c| c.to_vec())
            .collect();
    }

    pub fn size(&self) -> usize {
        self.samples.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::DType;

    fn images(n: usize) -> Vec<Tensor> {
        (0..n)
            .map(|i| {
                (Tensor::ones((1, 2, 2), DType::F32, &Device::Cpu).unwrap() * i as f64).unwrap()
            })
            .collect()
    }

    #[test]
    fn minibatches_cover_every_image_once() -> anyhow::Result<()> {
        let mut data = ImageData::new(images(7))?;
        data.shuffle_minibatch(3)?;
        assert_eq!(data.num_minibatch(), 3);
        assert_eq!(data.num_samples(), 7);

        let mut seen = vec![];
        for b in 0..data.num_minibatch() {
            let x = data.minibatch_data(b, &Device::Cpu)?;
            assert_eq!(&x.dims()[1..], &[1, 2, 2]);
            for v in x.flatten_from(1)?.max(1)?.to_vec1::<f32>()? {
                seen.push(v as usize);
            }
        }
        seen.sort();
        assert_eq!(seen, (0..7).collect::<Vec<_>>());
        Ok(())
    }

    #[test]
    fn unshuffled_data_has_no_minibatch() -> anyhow::Result<()> {
        let data = ImageData::new(images(2))?;
        assert!(data.minibatch_data(0, &Device::Cpu).is_err());
        Ok(())
    }

    #[test]
    fn rejects_mixed_shapes() {
        let a = Tensor::zeros((1, 2, 2), DType::F32, &Device::Cpu).unwrap();
        let b = Tensor::zeros((1, 3, 3), DType::F32, &Device::Cpu).unwrap();
        assert!(ImageData::new(vec![a, b]).is_err());
    }
}
