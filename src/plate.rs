use crate::geometry::ViewportGeometry;
use crate::projection;
use crate::raster::Raster;

/// Captured clean-plate background at output resolution.
///
/// Stored unmirrored; mirroring happens when the plate is drawn so capture
/// and live view always line up.
pub struct BackgroundPlate {
    raster: Raster,
    ready: bool,
}

impl BackgroundPlate {
    pub fn new() -> Self {
        Self {
            raster: Raster::new(1, 1),
            ready: false,
        }
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    pub fn raster(&self) -> &Raster {
        &self.raster
    }

    /// Project the current frame into the plate. Without a frame there is
    /// nothing to capture yet and this returns false.
    pub fn capture(&mut self, frame: Option<&Raster>, geometry: &ViewportGeometry) -> bool {
        let Some(frame) = frame else {
            tracing::debug!("Background capture requested before the source is ready");
            return false;
        };
        self.raster.resize(geometry.width, geometry.height);
        self.raster.clear();
        let placement = projection::cover(frame.dimensions(), geometry.dimensions(), false);
        projection::draw_copy(frame, &mut self.raster, &placement);
        self.ready = true;
        tracing::info!(
            "Captured background plate at {}x{}",
            geometry.width,
            geometry.height
        );
        true
    }
}

impl Default for BackgroundPlate {
    fn default() -> Self {
        Self::new()
    }
}
