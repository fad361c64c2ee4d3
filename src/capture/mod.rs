mod v4l_capture;

pub use v4l_capture::WebcamCapture;

use std::thread;
use std::time::Duration;

use anyhow::Result;
use image::RgbImage;

use crate::error::PipelineError;

/// Polls before a source is declared unavailable (~5 s at the default
/// interval).
pub const SOURCE_ATTEMPTS: u32 = 250;
pub const SOURCE_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Trait for camera capture sources
pub trait CaptureSource {
    /// Block until the next frame is available and return it.
    fn capture_frame(&mut self) -> Result<RgbImage>;

    /// Native resolution of delivered frames.
    fn resolution(&self) -> (u32, u32);
}

/// Keep trying to open a source until it succeeds or `attempts` run out.
pub fn open_with_retry<S, F>(
    mut open: F,
    attempts: u32,
    interval: Duration,
) -> Result<S, PipelineError>
where
    F: FnMut() -> Result<S>,
{
    for attempt in 1..=attempts {
        match open() {
            Ok(source) => {
                tracing::debug!("Source opened after {} attempt(s)", attempt);
                return Ok(source);
            }
            Err(e) => {
                tracing::debug!("Source not ready (attempt {}): {:#}", attempt, e);
                if attempt < attempts {
                    thread::sleep(interval);
                }
            }
        }
    }
    Err(PipelineError::SourceUnavailable { attempts })
}
