use std::borrow::Cow;

use anyhow::Result;
use image::{imageops, GrayImage, RgbImage};
use ndarray::Array4;

use super::types::Matte;

/// Converts frames to model input tensors and model mattes back to frame
/// resolution.
pub struct Preprocessor {
    target_width: u32,
    target_height: u32,
}

impl Preprocessor {
    pub fn new(target_width: u32, target_height: u32) -> Self {
        Self {
            target_width,
            target_height,
        }
    }

    /// Resize to the model size and lay out as a `[1, 3, H, W]` tensor with
    /// channels normalized to [0, 1].
    pub fn preprocess(&self, image: &RgbImage) -> Array4<f32> {
        let _span = tracing::debug_span!("preprocess").entered();

        let resized: Cow<'_, RgbImage> =
            if image.dimensions() == (self.target_width, self.target_height) {
                Cow::Borrowed(image)
            } else {
                Cow::Owned(imageops::resize(
                    image,
                    self.target_width,
                    self.target_height,
                    imageops::FilterType::Lanczos3,
                ))
            };

        let (width, height) = resized.dimensions();
        Array4::from_shape_fn(
            (1, 3, height as usize, width as usize),
            |(_, c, y, x)| resized.get_pixel(x as u32, y as u32)[c] as f32 / 255.0,
        )
    }

    /// Scale a model-resolution matte to `(target_width, target_height)`.
    pub fn postprocess_matte(
        alpha: &[f32],
        matte_width: u32,
        matte_height: u32,
        target_width: u32,
        target_height: u32,
    ) -> Result<Matte> {
        let _span = tracing::debug_span!("postprocess").entered();

        if (matte_width, matte_height) == (target_width, target_height) {
            return Matte::new(target_width, target_height, alpha.to_vec());
        }

        let gray = GrayImage::from_fn(matte_width, matte_height, |x, y| {
            let idx = (y * matte_width + x) as usize;
            let value = alpha.get(idx).copied().unwrap_or(0.0);
            image::Luma([(value * 255.0).clamp(0.0, 255.0) as u8])
        });

        let resized = imageops::resize(
            &gray,
            target_width,
            target_height,
            imageops::FilterType::Lanczos3,
        );

        let values = resized.pixels().map(|p| p[0] as f32 / 255.0).collect();
        Matte::new(target_width, target_height, values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tensor_is_nchw_normalized() {
        let img = RgbImage::from_fn(4, 2, |x, _| image::Rgb([255, 0, x as u8]));
        let t = Preprocessor::new(4, 2).preprocess(&img);
        assert_eq!(t.shape(), &[1, 3, 2, 4]);
        assert_eq!(t[[0, 0, 1, 3]], 1.0);
        assert_eq!(t[[0, 1, 0, 0]], 0.0);
        assert!((t[[0, 2, 0, 3]] - 3.0 / 255.0).abs() < 1e-6);
    }

    #[test]
    fn postprocess_resizes_to_frame() -> Result<()> {
        let matte = Preprocessor::postprocess_matte(&[1.0; 16], 4, 4, 8, 6)?;
        assert_eq!((matte.width, matte.height), (8, 6));
        assert!(matte.alpha.iter().all(|&a| a > 0.99));
        Ok(())
    }
}
