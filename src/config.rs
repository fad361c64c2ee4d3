/// Threshold used when a non-numeric white threshold is supplied.
pub const FALLBACK_WHITE_THRESHOLD: f32 = 180.0;

/// Per-effect settings mutated by the host UI and read once per tick as a
/// snapshot (the struct is `Copy`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EffectConfig {
    pub enabled: bool,
    /// Feather radius in logical pixels, never negative.
    pub blur_radius: f32,
    pub mirror: bool,
    pub heuristic: HeuristicParams,
}

/// White-cloth detector tuning. Only read by the heuristic mask.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HeuristicParams {
    pub white_threshold: f32,
    /// Neighbour ratio above which the dilation pass marks a pixel opaque.
    pub sensitivity: f32,
    /// Dilation kernel half-width (3 gives a 7x7 window).
    pub kernel_half_width: u32,
    /// Classification buffer cap; larger sources are downsampled.
    pub max_work_pixels: u32,
}

impl Default for HeuristicParams {
    fn default() -> Self {
        Self {
            white_threshold: 200.0,
            sensitivity: 0.3,
            kernel_half_width: 3,
            max_work_pixels: 640 * 480,
        }
    }
}

impl EffectConfig {
    /// Defaults for the learned-segmentation effect.
    pub fn learned() -> Self {
        Self {
            enabled: false,
            blur_radius: 24.0,
            mirror: true,
            heuristic: HeuristicParams::default(),
        }
    }

    /// Defaults for the white-cloth effect.
    pub fn heuristic() -> Self {
        Self {
            enabled: false,
            blur_radius: 6.0,
            mirror: true,
            heuristic: HeuristicParams::default(),
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Negative or non-finite radii become 0.
    pub fn set_blur_radius(&mut self, px: f32) {
        self.blur_radius = if px.is_finite() { px.max(0.0) } else { 0.0 };
    }

    /// Non-numeric input floors to 0.
    pub fn set_blur_radius_str(&mut self, raw: &str) {
        self.set_blur_radius(raw.trim().parse().unwrap_or(0.0));
    }

    pub fn set_mirror(&mut self, mirror: bool) {
        self.mirror = mirror;
    }

    pub fn set_white_threshold(&mut self, value: f32) {
        let value = if value.is_finite() {
            value
        } else {
            FALLBACK_WHITE_THRESHOLD
        };
        self.heuristic.white_threshold = value.clamp(0.0, 255.0);
    }

    pub fn set_white_threshold_str(&mut self, raw: &str) {
        self.set_white_threshold(raw.trim().parse().unwrap_or(FALLBACK_WHITE_THRESHOLD));
    }

    pub fn set_sensitivity(&mut self, ratio: f32) {
        if ratio.is_finite() {
            self.heuristic.sensitivity = ratio.clamp(0.0, 1.0);
        }
    }
}

/// Parse a loose boolean the way form inputs are usually coerced.
pub fn coerce_bool(raw: &str) -> bool {
    matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "on" | "yes"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variant_defaults() {
        let learned = EffectConfig::learned();
        assert!(!learned.enabled);
        assert_eq!(learned.blur_radius, 24.0);
        assert!(learned.mirror);

        let heuristic = EffectConfig::heuristic();
        assert_eq!(heuristic.blur_radius, 6.0);
        assert_eq!(heuristic.heuristic.white_threshold, 200.0);
        assert_eq!(heuristic.heuristic.sensitivity, 0.3);
        assert_eq!(heuristic.heuristic.kernel_half_width, 3);
    }

    #[test]
    fn blur_is_coerced_non_negative() {
        let mut c = EffectConfig::learned();
        c.set_blur_radius(-5.0);
        assert_eq!(c.blur_radius, 0.0);
        c.set_blur_radius(f32::INFINITY);
        assert_eq!(c.blur_radius, 0.0);
        c.set_blur_radius_str("abc");
        assert_eq!(c.blur_radius, 0.0);
        c.set_blur_radius_str(" 18 ");
        assert_eq!(c.blur_radius, 18.0);
    }

    #[test]
    fn threshold_is_clamped() {
        let mut c = EffectConfig::heuristic();
        c.set_white_threshold(300.0);
        assert_eq!(c.heuristic.white_threshold, 255.0);
        c.set_white_threshold(-1.0);
        assert_eq!(c.heuristic.white_threshold, 0.0);
        c.set_white_threshold_str("white");
        assert_eq!(c.heuristic.white_threshold, FALLBACK_WHITE_THRESHOLD);
    }

    #[test]
    fn bools_coerce() {
        assert!(coerce_bool("On"));
        assert!(coerce_bool("1"));
        assert!(!coerce_bool("off"));
        assert!(!coerce_bool(""));
    }
}
