use anyhow::{ensure, Result};
use image::RgbImage;

use crate::raster::Raster;

/// Alpha matte: 0.0 = background, 1.0 = subject, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct Matte {
    pub width: u32,
    pub height: u32,
    pub alpha: Vec<f32>,
}

impl Matte {
    pub fn new(width: u32, height: u32, alpha: Vec<f32>) -> Result<Self> {
        ensure!(
            alpha.len() == (width as usize) * (height as usize),
            "matte has {} values, expected {}x{}",
            alpha.len(),
            width,
            height
        );
        Ok(Self {
            width,
            height,
            alpha,
        })
    }

    /// Write the matte into a mask raster (white, alpha = coverage), resizing
    /// the raster in place if needed.
    pub fn write_mask(&self, mask: &mut Raster) {
        mask.resize(self.width, self.height);
        for (px, &a) in mask.as_bytes_mut().chunks_exact_mut(4).zip(&self.alpha) {
            let a = (a * 255.0).round().clamp(0.0, 255.0) as u8;
            px.copy_from_slice(&[255, 255, 255, a]);
        }
    }
}

/// External segmenter seam.
///
/// Implementations are treated as opaque and fallible: one frame in, one
/// full-resolution matte out. They run on a worker thread, hence `Send`.
pub trait SegmentationModel: Send {
    /// Produce a matte matching the frame's dimensions.
    fn segment(&mut self, frame: &RgbImage) -> Result<Matte>;

    /// Drop temporal state (recurrent models). Called when the source
    /// geometry changes.
    fn reset_state(&mut self) {}

    /// Preferred model input size as (width, height).
    fn input_size(&self) -> (u32, u32);

    /// Release held resources. Called once at teardown.
    fn close(&mut self) {
        self.reset_state();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matte_length_is_checked() {
        assert!(Matte::new(2, 2, vec![0.0; 3]).is_err());
        assert!(Matte::new(2, 2, vec![0.0; 4]).is_ok());
    }

    #[test]
    fn matte_writes_alpha_only_mask() -> Result<()> {
        let matte = Matte::new(2, 1, vec![0.0, 1.0])?;
        let mut mask = Raster::new(5, 5);
        matte.write_mask(&mut mask);
        assert_eq!(mask.dimensions(), (2, 1));
        assert_eq!(mask.alpha(0, 0), 0);
        assert_eq!(mask.alpha(1, 0), 255);
        Ok(())
    }
}
