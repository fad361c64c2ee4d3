mod heuristic;
mod learned;

pub use heuristic::{classify_pixel, HeuristicMask};
pub use learned::LearnedMask;

use crate::config::EffectConfig;
use crate::error::PipelineError;
use crate::geometry::SourceGeometry;
use crate::raster::Raster;

/// What happened to a mask request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskRequest {
    /// A new mask was produced synchronously and is now current.
    Ready,
    /// The frame was handed off; the mask arrives on a later `poll`.
    Pending,
    /// A previous request is still outstanding; this frame was dropped.
    Busy,
}

/// Produces the subject mask for the compositor.
///
/// Masks are at the provider's native resolution; the compositor projects
/// them to output resolution. At most one request is outstanding per
/// provider at any time.
pub trait MaskProvider: Send {
    fn name(&self) -> &'static str;

    /// Asynchronous providers are fed frames even before their masks are
    /// drawn, so the first composite already has one.
    fn is_async(&self) -> bool {
        false
    }

    /// Apply completed asynchronous work. Returns true when a newer mask
    /// became current.
    fn poll(&mut self) -> bool {
        false
    }

    /// True while a submitted frame has not resolved yet.
    fn in_flight(&self) -> bool;

    fn request_mask(
        &mut self,
        frame: &Raster,
        config: &EffectConfig,
    ) -> Result<MaskRequest, PipelineError>;

    /// Most recently completed mask, if any.
    fn current_mask(&self) -> Option<&Raster>;

    /// The video source changed resolution.
    fn source_changed(&mut self, _geometry: SourceGeometry) {}

    /// Release external resources. Called once at teardown.
    fn release(&mut self) {}
}
