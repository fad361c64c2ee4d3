use crate::raster::Raster;

/// Logical radius above which the blur is split into several passes.
pub const MULTI_PASS_THRESHOLD: u32 = 12;
pub const MAX_PASSES: u32 = 3;

/// How the mask edge is softened for one composite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatherPlan {
    pub passes: u32,
    /// Gaussian standard deviation of each pass, in device pixels.
    pub radius_px: f32,
}

impl FeatherPlan {
    /// The logical radius is truncated to an integer first. Zero means no
    /// blur at all; up to the threshold one pass of `radius * dpr`; above it
    /// `min(3, radius / 8)` erase passes, each with the mask blurred at
    /// `radius * dpr / passes`.
    pub fn new(blur_radius: f32, dpr: f32) -> Self {
        let base = if blur_radius.is_finite() {
            blur_radius.max(0.0).trunc() as u32
        } else {
            0
        };
        let px = base as f32 * dpr;
        if base == 0 {
            return Self {
                passes: 0,
                radius_px: 0.0,
            };
        }
        if base > MULTI_PASS_THRESHOLD {
            let passes = (base / 8).min(MAX_PASSES);
            return Self {
                passes,
                radius_px: px / passes as f32,
            };
        }
        Self {
            passes: 1,
            radius_px: px,
        }
    }

    pub fn is_sharp(&self) -> bool {
        self.passes == 0
    }
}

/// Box radius such that three successive box blurs approximate a gaussian
/// with the given standard deviation.
pub fn box_radius_for_sigma(sigma: f32) -> usize {
    if !(sigma > 0.0) {
        return 0;
    }
    (((4.0 * sigma * sigma + 1.0).sqrt() - 1.0) / 2.0).round() as usize
}

/// Approximate gaussian blur of the alpha channel only. `scratch` is reused
/// across calls.
pub fn gaussian_blur_alpha(raster: &mut Raster, scratch: &mut Vec<u8>, sigma: f32) {
    let radius = box_radius_for_sigma(sigma);
    if radius == 0 {
        return;
    }
    for _ in 0..3 {
        box_blur_alpha(raster, scratch, radius);
    }
}

/// Separable sliding-window box blur on the alpha channel with clamped edges.
pub fn box_blur_alpha(raster: &mut Raster, scratch: &mut Vec<u8>, radius: usize) {
    let (w, h) = (raster.width() as usize, raster.height() as usize);
    if radius == 0 || w == 0 || h == 0 {
        return;
    }
    scratch.resize(w * h, 0);
    let r = radius as isize;
    let window = (2 * radius + 1) as u32;
    let bytes = raster.as_bytes_mut();

    // Horizontal: raster alpha -> scratch
    for y in 0..h {
        let row = y * w;
        let at = |x: isize| bytes[(row + x.clamp(0, w as isize - 1) as usize) * 4 + 3] as u32;
        let mut sum: u32 = (-r..=r).map(at).sum();
        for x in 0..w as isize {
            scratch[row + x as usize] = ((sum + window / 2) / window) as u8;
            sum = sum + at(x + r + 1) - at(x - r);
        }
    }

    // Vertical: scratch -> raster alpha
    for x in 0..w {
        let at = |y: isize| scratch[y.clamp(0, h as isize - 1) as usize * w + x] as u32;
        let mut sum: u32 = (-r..=r).map(at).sum();
        for y in 0..h as isize {
            bytes[(y as usize * w + x) * 4 + 3] = ((sum + window / 2) / window) as u8;
            sum = sum + at(y + r + 1) - at(y - r);
        }
    }
}
