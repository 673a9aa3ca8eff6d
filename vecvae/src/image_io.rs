use anyhow::Context;
use candle_core::{DType, Device, Tensor};
use image::imageops::FilterType;
use image::{Rgb, RgbImage};
use indicatif::ParallelProgressIterator;
use log::info;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// Image files directly under `dir`, sorted by name
pub fn list_image_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut files = std::fs::read_dir(dir)
        .with_context(|| format!("reading directory {}", dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                .unwrap_or(false)
        })
        .collect::<Vec<_>>();
    files.sort();
    Ok(files)
}

/// Read one image as a `c x s x s` tensor in [0, 1]
///
/// * `channels` - 1 (luma) or 3 (RGB)
/// * `imsize` - output side length; the image is resized to fit exactly
pub fn read_image_tensor(file: &Path, channels: usize, imsize: usize) -> anyhow::Result<Tensor> {
    let img = image::open(file)
        .with_context(|| format!("decoding {}", file.display()))?
        .resize_exact(imsize as u32, imsize as u32, FilterType::Triangle);

    let hwc: Vec<u8> = match channels {
        1 => img.to_luma8().into_raw(),
        3 => img.to_rgb8().into_raw(),
        _ => anyhow::bail!("only 1 or 3 channels are supported, got {}", channels),
    };

    let data = hwc.into_iter().map(|v| v as f32 / 255.).collect::<Vec<_>>();
    Ok(Tensor::from_vec(data, (imsize, imsize, channels), &Device::Cpu)?
        .permute((2, 0, 1))?
        .contiguous()?)
}

/// Read every image of `dir` in parallel, keeping the file order
pub fn read_image_dir(dir: &Path, channels: usize, imsize: usize) -> anyhow::Result<Vec<Tensor>> {
    let files = list_image_files(dir)?;
    if files.is_empty() {
        anyhow::bail!("no image files in {}", dir.display());
    }
    info!("Reading {} images from {}", files.len(), dir.display());

    let njobs = files.len() as u64;
    files
        .par_iter()
        .progress_count(njobs)
        .map(|f| read_image_tensor(f, channels, imsize))
        .collect()
}

/// `c x h x w` tensor in [0, 1] to an RGB image; one channel is
/// replicated to grey
pub fn tensor_to_rgb_image(x_chw: &Tensor) -> anyhow::Result<RgbImage> {
    let (c, h, w) = x_chw.dims3()?;
    if c != 1 && c != 3 {
        anyhow::bail!("cannot draw a {}-channel image", c);
    }

    let pixels = (x_chw.to_dtype(DType::F32)?.clamp(0., 1.)? * 255.)?
        .round()?
        .to_device(&Device::Cpu)?
        .to_vec3::<f32>()?;

    let mut img = RgbImage::new(w as u32, h as u32);
    for y in 0..h {
        for x in 0..w {
            let v = |ch: usize| pixels[if c == 1 { 0 } else { ch }][y][x] as u8;
            img.put_pixel(x as u32, y as u32, Rgb([v(0), v(1), v(2)]));
        }
    }
    Ok(img)
}

const GRID_PAD: u32 = 2;

/// Tile a batch `n x c x h x w` into one image with `ncols` columns
pub fn save_image_grid(x_nchw: &Tensor, ncols: usize, file: &Path) -> anyhow::Result<()> {
    let (n, _, h, w) = x_nchw.dims4()?;
    if n == 0 {
        anyhow::bail!("nothing to draw");
    }
    let ncols = ncols.clamp(1, n);
    let nrows = n.div_ceil(ncols);
    let (h, w) = (h as u32, w as u32);

    let mut grid = RgbImage::from_pixel(
        ncols as u32 * (w + GRID_PAD) + GRID_PAD,
        nrows as u32 * (h + GRID_PAD) + GRID_PAD,
        Rgb([255, 255, 255]),
    );

    for i in 0..n {
        let tile = tensor_to_rgb_image(&x_nchw.get(i)?)?;
        let x0 = GRID_PAD + (i % ncols) as u32 * (w + GRID_PAD);
        let y0 = GRID_PAD + (i / ncols) as u32 * (h + GRID_PAD);
        image::imageops::replace(&mut grid, &tile, x0 as i64, y0 as i64);
    }

    grid.save(file)
        .with_context(|| format!("writing {}", file.display()))?;
    info!("Wrote {}", file.display());
    Ok(())
}
