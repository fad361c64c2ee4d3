use std::time::{Duration, Instant};

use anyhow::{Context, Result};

use crate::capture::CaptureSource;
use crate::error::PipelineError;
use crate::output::OutputSink;
use crate::projection;
use crate::raster::Raster;
use crate::scheduler::{FrameScheduler, TickOutcome};

/// Capture failures tolerated in a row before the loop gives up.
pub const MAX_CONSECUTIVE_CAPTURE_ERRORS: u32 = 30;

const STATS_INTERVAL: u64 = 30;

/// Running per-stage timings.
#[derive(Debug, Default, Clone, Copy)]
pub struct PipelineStats {
    pub frames: u64,
    pub written: u64,
    pub composited: u64,
    pub capture: Duration,
    pub process: Duration,
    pub output: Duration,
}

impl PipelineStats {
    fn average_ms(&self, total: Duration) -> f64 {
        if self.frames == 0 {
            return 0.0;
        }
        total.as_secs_f64() * 1000.0 / self.frames as f64
    }

    fn log(&self) {
        let capture_ms = self.average_ms(self.capture);
        let process_ms = self.average_ms(self.process);
        let output_ms = self.average_ms(self.output);
        let total_ms = capture_ms + process_ms + output_ms;
        let fps = if total_ms > 0.0 { 1000.0 / total_ms } else { 0.0 };

        tracing::info!(
            "Frame {}: capture={:.1}ms, composite={:.1}ms, output={:.1}ms, total={:.1}ms, fps={:.1}",
            self.frames,
            capture_ms,
            process_ms,
            output_ms,
            total_ms,
            fps
        );
    }
}

/// Feed frames from `capture` through `scheduler` into `output` until the
/// scheduler stops, `max_frames` frames were captured, or capture keeps
/// failing.
///
/// Composites are written once their first mask result is in. Until then,
/// and while the effect is disabled, the camera frame is passed through with
/// the same cover fit and mirroring as a composite. Nothing is written while
/// paused.
pub fn run_pipeline<C, O>(
    capture: &mut C,
    output: &mut O,
    scheduler: &mut FrameScheduler,
    max_frames: Option<u64>,
) -> Result<PipelineStats>
where
    C: CaptureSource,
    O: OutputSink,
{
    let mut stats = PipelineStats::default();
    let mut raw = Raster::new(1, 1);
    let mut passthrough = Raster::new(1, 1);
    let mut capture_errors = 0u32;

    tracing::info!(
        "Starting main pipeline loop with {} mask provider",
        scheduler.provider_name()
    );

    while scheduler.is_alive() {
        if max_frames.is_some_and(|max| stats.frames >= max) {
            tracing::info!("Reached frame limit of {}", stats.frames);
            break;
        }

        let capture_start = Instant::now();
        let frame = match capture.capture_frame() {
            Ok(frame) => {
                capture_errors = 0;
                frame
            }
            Err(e) => {
                capture_errors += 1;
                tracing::warn!("Capture failed ({} in a row): {:#}", capture_errors, e);
                if capture_errors >= MAX_CONSECUTIVE_CAPTURE_ERRORS {
                    scheduler.teardown();
                    return Err(PipelineError::Capture(e)).context("Camera stopped delivering frames");
                }
                continue;
            }
        };
        stats.capture += capture_start.elapsed();

        let process_start = Instant::now();
        let outcome = scheduler.on_frame(&frame);
        stats.process += process_start.elapsed();

        let output_start = Instant::now();
        let written = match outcome {
            TickOutcome::Stopped => break,
            TickOutcome::Paused => None,
            TickOutcome::Composited { visible: true, .. } => {
                stats.composited += 1;
                Some(scheduler.output())
            }
            TickOutcome::NotReady
            | TickOutcome::Disabled
            | TickOutcome::Composited { visible: false, .. } => {
                let (w, h) = scheduler.viewport().dimensions();
                raw.copy_from_rgb(&frame);
                passthrough.resize(w, h);
                passthrough.clear();
                let placement =
                    projection::cover(raw.dimensions(), (w, h), scheduler.config().mirror);
                projection::draw_copy(&raw, &mut passthrough, &placement);
                Some(&passthrough)
            }
        };
        if let Some(raster) = written {
            output
                .write_frame(raster)
                .context("Failed to write frame")?;
            stats.written += 1;
        }
        stats.output += output_start.elapsed();

        stats.frames += 1;
        if stats.frames % STATS_INTERVAL == 0 {
            stats.log();
        }
    }

    scheduler.teardown();
    tracing::info!(
        "Pipeline stopped after {} frames ({} composited)",
        stats.frames,
        stats.composited
    );
    Ok(stats)
}
