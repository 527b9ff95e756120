use crate::config::{DEFAULT_INPUT_SIZE, IMAGENET_MEAN, IMAGENET_STD, Normalization};
use anyhow::Context;
use common::span;
use fast_image_resize::{
    FilterType, PixelType, ResizeAlg, ResizeOptions, Resizer,
    images::{Image, ImageRef},
};
use ndarray::{Array, IxDyn};
use std::path::Path;

/// Turns a decoded image into a `[1, 3, H, W]` tensor.
///
/// Pipeline: force RGB, stretch to `input_size` (no letterbox), scale to
/// `[0, 1]`, optional per-channel normalization, HWC to CHW.
pub struct CpuPreProcessor {
    pub input_size: (u32, u32),
    pub normalization: Normalization,
    resizer: Resizer,
}

impl CpuPreProcessor {
    pub fn new(input_size: (u32, u32), normalization: Normalization) -> Self {
        Self {
            input_size,
            normalization,
            resizer: Resizer::new(),
        }
    }

    /// Decode the image at `path` and preprocess it.
    pub fn preprocess_path(&mut self, path: &Path) -> anyhow::Result<Array<f32, IxDyn>> {
        let _s = span!("preprocess_image");

        let img = image::open(path)
            .with_context(|| format!("Failed to decode image {}", path.display()))?;

        tracing::debug!(
            width = img.width(),
            height = img.height(),
            color = ?img.color(),
            "Decoded image"
        );

        let rgb = img.to_rgb8();
        self.preprocess_from_u8_slice(rgb.as_raw(), rgb.width(), rgb.height())
    }

    /// Preprocess packed RGB8 pixels in HWC order.
    pub fn preprocess_from_u8_slice(
        &mut self,
        pixels: &[u8],
        width: u32,
        height: u32,
    ) -> anyhow::Result<Array<f32, IxDyn>> {
        if width == 0 || height == 0 {
            anyhow::bail!("Image has zero size ({}x{})", width, height);
        }

        let (target_width, target_height) = self.input_size;
        if target_width == 0 || target_height == 0 {
            anyhow::bail!(
                "Target size has a zero dimension ({}x{})",
                target_width,
                target_height
            );
        }

        let expected_size = (width as usize)
            .checked_mul(height as usize)
            .and_then(|n| n.checked_mul(3))
            .with_context(|| format!("Image dimensions {}x{} overflow", width, height))?;
        if pixels.len() != expected_size {
            anyhow::bail!(
                "Buffer size mismatch: expected {} bytes for {}x{} RGB, got {} bytes",
                expected_size,
                width,
                height,
                pixels.len()
            );
        }

        let resized = self.resize(pixels, width, height)?;
        self.to_tensor(&resized)
    }

    fn resize(&mut self, pixels: &[u8], width: u32, height: u32) -> anyhow::Result<Image<'static>> {
        let _s = span!("resize");

        let src = ImageRef::new(width, height, pixels, PixelType::U8x3)?;
        let mut resized = Image::new(self.input_size.0, self.input_size.1, PixelType::U8x3);

        self.resizer.resize(
            &src,
            &mut resized,
            &ResizeOptions::new().resize_alg(ResizeAlg::Convolution(FilterType::Bilinear)),
        )?;

        Ok(resized)
    }

    fn to_tensor(&self, image: &Image) -> anyhow::Result<Array<f32, IxDyn>> {
        let _s = span!("to_tensor");

        let width = image.width() as usize;
        let height = image.height() as usize;
        let spatial = width * height;

        let (mean, std) = match self.normalization {
            Normalization::None => ([0.0; 3], [1.0; 3]),
            Normalization::ImageNet => (IMAGENET_MEAN, IMAGENET_STD),
        };

        let mut output = vec![0.0f32; 3 * spatial];
        let buf = image.buffer();

        for (i, px) in buf.chunks_exact(3).enumerate() {
            for c in 0..3 {
                let v = px[c] as f32 / 255.0;
                output[i + c * spatial] = (v - mean[c]) / std[c];
            }
        }

        Ok(Array::from_shape_vec(
            IxDyn(&[1, 3, height, width]),
            output,
        )?)
    }
}

impl Default for CpuPreProcessor {
    fn default() -> Self {
        Self::new(DEFAULT_INPUT_SIZE, Normalization::None)
    }
}
