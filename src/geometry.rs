pub const MIN_DPR: f32 = 1.0;
pub const MAX_DPR: f32 = 3.0;

/// Source dimensions assumed when the video source reports zero.
pub const FALLBACK_SOURCE_SIZE: (u32, u32) = (640, 480);

/// Output size in device pixels, derived from the logical viewport size and
/// the device pixel ratio.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportGeometry {
    pub logical_width: u32,
    pub logical_height: u32,
    pub dpr: f32,
    pub width: u32,
    pub height: u32,
}

impl ViewportGeometry {
    /// DPR is clamped to [1, 3]; non-finite values fall back to 1. Device
    /// dimensions are floored and never drop below 1.
    pub fn new(logical_width: u32, logical_height: u32, dpr: f32) -> Self {
        let dpr = if dpr.is_finite() {
            dpr.clamp(MIN_DPR, MAX_DPR)
        } else {
            MIN_DPR
        };
        if logical_width == 0 || logical_height == 0 {
            tracing::warn!(
                "Degenerate viewport {}x{}, clamping to 1",
                logical_width,
                logical_height
            );
        }
        let logical_width = logical_width.max(1);
        let logical_height = logical_height.max(1);
        Self {
            logical_width,
            logical_height,
            dpr,
            width: ((logical_width as f32 * dpr).floor() as u32).max(1),
            height: ((logical_height as f32 * dpr).floor() as u32).max(1),
        }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}

/// Native resolution of the video source; also the mask's native resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceGeometry {
    pub width: u32,
    pub height: u32,
}

impl SourceGeometry {
    pub fn new(width: u32, height: u32) -> Self {
        if width == 0 || height == 0 {
            tracing::warn!(
                "Source reported {}x{}, assuming {}x{}",
                width,
                height,
                FALLBACK_SOURCE_SIZE.0,
                FALLBACK_SOURCE_SIZE.1
            );
            return Self {
                width: FALLBACK_SOURCE_SIZE.0,
                height: FALLBACK_SOURCE_SIZE.1,
            };
        }
        Self { width, height }
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }
}
