/// Errors surfaced by the compositing pipeline.
///
/// None of these are fatal to the frame loop on their own: the scheduler
/// degrades to "skip this frame" and tries again on the next one.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// The video source never became ready within the retry window.
    #[error("video source unavailable after {attempts} attempts")]
    SourceUnavailable { attempts: u32 },

    /// The segmentation call failed for one frame.
    #[error("mask provider failure: {0}")]
    MaskProvider(String),

    /// The segmenter worker is no longer running.
    #[error("segmenter worker has shut down")]
    SegmenterGone,

    #[error(transparent)]
    Capture(#[from] anyhow::Error),
}

impl PipelineError {
    pub fn mask_provider(msg: impl Into<String>) -> Self {
        Self::MaskProvider(msg.into())
    }
}
