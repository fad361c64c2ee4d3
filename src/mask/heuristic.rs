//! White-cloth detection by color thresholds followed by a dilation pass.
//!
//! The dilation is O(W·H·k²) for kernel half-width k, which is why the
//! classification buffer is capped at `HeuristicParams::max_work_pixels`:
//! larger sources are downsampled into the work raster first.

use super::{MaskProvider, MaskRequest};
use crate::config::{EffectConfig, HeuristicParams};
use crate::error::PipelineError;
use crate::geometry::SourceGeometry;
use crate::projection;
use crate::raster::Raster;

const OPAQUE: [u8; 4] = [255, 255, 255, 255];
const CLEAR: [u8; 4] = [0, 0, 0, 0];

/// True when the pixel looks like white cloth at the given threshold.
///
/// Any of three rules is enough:
/// bright and unsaturated, all channels high with balanced white, or simply
/// very bright.
#[inline]
pub fn classify_pixel(r: u8, g: u8, b: u8, threshold: f32) -> bool {
    let (rf, gf, bf) = (r as f32, g as f32, b as f32);
    let brightness = (rf + gf + bf) / 3.0;
    let max = r.max(g).max(b) as f32;
    let min = r.min(g).min(b) as f32;
    let saturation = if max > 0.0 { (max - min) / max } else { 0.0 };

    let bright_low_sat = brightness > threshold * 0.75 && saturation < 0.25;

    let floor = threshold * 0.7;
    let whiteish = rf > floor && gf > floor && bf > floor;
    let balanced = (rf - gf).abs() < 40.0 && (gf - bf).abs() < 40.0 && (bf - rf).abs() < 40.0;

    bright_low_sat || (whiteish && balanced) || brightness > threshold + 30.0
}

/// Largest size with the source's aspect ratio that fits `max_pixels`.
pub fn work_dimensions(width: u32, height: u32, max_pixels: u32) -> (u32, u32) {
    let pixels = width as u64 * height as u64;
    if max_pixels == 0 || pixels <= max_pixels as u64 {
        return (width.max(1), height.max(1));
    }
    let factor = (max_pixels as f64 / pixels as f64).sqrt();
    (
        ((width as f64 * factor).floor() as u32).max(1),
        ((height as f64 * factor).floor() as u32).max(1),
    )
}

/// Synchronous color-threshold mask provider.
pub struct HeuristicMask {
    work: Raster,
    classified: Vec<bool>,
    mask: Raster,
    produced: bool,
}

impl HeuristicMask {
    pub fn new() -> Self {
        Self {
            work: Raster::new(1, 1),
            classified: Vec::new(),
            mask: Raster::new(1, 1),
            produced: false,
        }
    }

    /// Opaque set of the classification pass alone, row-major over the
    /// current mask dimensions.
    pub fn classified(&self) -> &[bool] {
        &self.classified
    }

    fn ensure_buffers(&mut self, width: u32, height: u32) {
        if self.work.resize(width, height) {
            tracing::debug!("Heuristic work buffer now {}x{}", width, height);
        }
        self.mask.resize(width, height);
        self.classified.resize((width as usize) * (height as usize), false);
    }

    fn classify(&mut self, threshold: f32) {
        for (flag, px) in self
            .classified
            .iter_mut()
            .zip(self.work.as_bytes().chunks_exact(4))
        {
            *flag = classify_pixel(px[0], px[1], px[2], threshold);
        }
    }

    fn dilate(&mut self, params: &HeuristicParams) {
        let (w, h) = self.mask.dimensions();
        let k = params.kernel_half_width as i64;
        for y in 0..h as i64 {
            for x in 0..w as i64 {
                let idx = (y * w as i64 + x) as usize;
                let opaque = if self.classified[idx] {
                    true
                } else {
                    let (mut hits, mut total) = (0u32, 0u32);
                    for ny in (y - k).max(0)..=(y + k).min(h as i64 - 1) {
                        let row = (ny * w as i64) as usize;
                        for nx in (x - k).max(0)..=(x + k).min(w as i64 - 1) {
                            total += 1;
                            if self.classified[row + nx as usize] {
                                hits += 1;
                            }
                        }
                    }
                    hits as f32 / total as f32 > params.sensitivity
                };
                self.mask
                    .put_pixel(x as u32, y as u32, if opaque { OPAQUE } else { CLEAR });
            }
        }
    }
}

impl Default for HeuristicMask {
    fn default() -> Self {
        Self::new()
    }
}

impl MaskProvider for HeuristicMask {
    fn name(&self) -> &'static str {
        "heuristic"
    }

    fn in_flight(&self) -> bool {
        false
    }

    fn request_mask(
        &mut self,
        frame: &Raster,
        config: &EffectConfig,
    ) -> Result<MaskRequest, PipelineError> {
        let _span = tracing::debug_span!("heuristic_mask").entered();
        let params = &config.heuristic;

        let (fw, fh) = frame.dimensions();
        let (ww, wh) = work_dimensions(fw, fh, params.max_work_pixels);
        self.ensure_buffers(ww, wh);

        if (ww, wh) == (fw, fh) {
            self.work.as_bytes_mut().copy_from_slice(frame.as_bytes());
        } else {
            let placement = projection::stretch((fw, fh), (ww, wh), false);
            projection::draw_copy(frame, &mut self.work, &placement);
        }

        self.classify(params.white_threshold);
        self.dilate(params);
        self.produced = true;
        Ok(MaskRequest::Ready)
    }

    fn current_mask(&self) -> Option<&Raster> {
        self.produced.then_some(&self.mask)
    }

    fn source_changed(&mut self, geometry: SourceGeometry) {
        tracing::debug!(
            "Heuristic mask source now {}x{}",
            geometry.width,
            geometry.height
        );
        self.produced = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> EffectConfig {
        EffectConfig::heuristic()
    }

    #[test]
    fn near_white_is_subject() {
        assert!(classify_pixel(250, 248, 245, 200.0));
    }

    #[test]
    fn dark_blue_is_background() {
        assert!(!classify_pixel(40, 60, 80, 200.0));
    }

    #[test]
    fn very_bright_saturated_pixel_passes_third_rule() {
        // saturation 0.5 fails rule one, imbalance fails rule two
        assert!(!classify_pixel(255, 255, 128, 250.0));
        assert!(classify_pixel(255, 255, 128, 170.0));
    }

    #[test]
    fn work_dimensions_downsample_large_sources() {
        assert_eq!(work_dimensions(640, 480, 640 * 480), (640, 480));
        let (w, h) = work_dimensions(1920, 1080, 640 * 480);
        assert!(w * h <= 640 * 480);
        assert_eq!((w as f32 / h as f32 * 9.0).round(), 16.0);
    }

    #[test]
    fn same_frame_gives_same_mask() -> Result<(), PipelineError> {
        let frame = stripes(24, 16);
        let mut provider = HeuristicMask::new();
        provider.request_mask(&frame, &config())?;
        let first = provider.current_mask().cloned();
        provider.request_mask(&frame, &config())?;
        assert_eq!(first.as_ref(), provider.current_mask());
        Ok(())
    }

    #[test]
    fn dilation_only_adds_opaque_pixels() -> Result<(), PipelineError> {
        let frame = stripes(30, 20);
        let mut provider = HeuristicMask::new();
        provider.request_mask(&frame, &config())?;
        let mask = provider.current_mask().cloned().unwrap_or_else(|| Raster::new(1, 1));
        let classified = provider.classified().to_vec();
        let (w, _) = mask.dimensions();
        let mut grew = 0;
        for (i, &was_opaque) in classified.iter().enumerate() {
            let opaque = mask.alpha(i as u32 % w, i as u32 / w) == 255;
            assert!(!was_opaque || opaque);
            if opaque && !was_opaque {
                grew += 1;
            }
        }
        assert!(grew > 0, "dilation should close the one-pixel gaps");
        Ok(())
    }

    #[test]
    fn isolated_speck_does_not_grow() -> Result<(), PipelineError> {
        let mut frame = Raster::filled(15, 15, [20, 20, 20, 255]);
        frame.put_pixel(7, 7, [255, 255, 255, 255]);
        let mut provider = HeuristicMask::new();
        provider.request_mask(&frame, &config())?;
        let mask = provider.current_mask().map(Raster::opaque_count);
        assert_eq!(mask, Some(1));
        Ok(())
    }

    #[test]
    fn no_mask_before_first_request() {
        assert!(HeuristicMask::new().current_mask().is_none());
    }

    /// White columns with one-pixel dark gaps every third column.
    fn stripes(w: u32, h: u32) -> Raster {
        let mut r = Raster::filled(w, h, [30, 30, 30, 255]);
        for y in 0..h {
            for x in w / 3..w {
                if x % 3 != 0 {
                    r.put_pixel(x, y, [245, 245, 240, 255]);
                }
            }
        }
        r
    }
}
