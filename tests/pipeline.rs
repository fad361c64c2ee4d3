use std::collections::VecDeque;
use std::time::Duration;

use anyhow::Result;
use image::{Rgb, RgbImage};

use cloakfx::capture::{open_with_retry, CaptureSource};
use cloakfx::config::EffectConfig;
use cloakfx::error::PipelineError;
use cloakfx::geometry::{SourceGeometry, ViewportGeometry};
use cloakfx::host::{Control, HostLink};
use cloakfx::mask::HeuristicMask;
use cloakfx::output::OutputSink;
use cloakfx::pipeline::{run_pipeline, MAX_CONSECUTIVE_CAPTURE_ERRORS};
use cloakfx::raster::Raster;
use cloakfx::scheduler::{EffectPhase, FrameScheduler};

const W: u32 = 8;
const H: u32 = 6;
const GREEN: [u8; 3] = [0, 90, 0];
const WHITE: [u8; 3] = [250, 250, 250];

struct ScriptedCamera {
    frames: VecDeque<Result<RgbImage>>,
}

impl ScriptedCamera {
    fn new(frames: impl IntoIterator<Item = RgbImage>) -> Self {
        Self {
            frames: frames.into_iter().map(Ok).collect(),
        }
    }

    fn broken() -> Self {
        Self {
            frames: VecDeque::new(),
        }
    }
}

impl CaptureSource for ScriptedCamera {
    fn capture_frame(&mut self) -> Result<RgbImage> {
        self.frames
            .pop_front()
            .unwrap_or_else(|| Err(anyhow::anyhow!("camera unplugged")))
    }

    fn resolution(&self) -> (u32, u32) {
        (W, H)
    }
}

#[derive(Default)]
struct RecordingSink {
    frames: Vec<Raster>,
}

impl OutputSink for RecordingSink {
    fn write_frame(&mut self, frame: &Raster) -> Result<()> {
        self.frames.push(frame.clone());
        Ok(())
    }

    fn resolution(&self) -> (u32, u32) {
        (W, H)
    }
}

fn solid(rgb: [u8; 3]) -> RgbImage {
    RgbImage::from_pixel(W, H, Rgb(rgb))
}

fn ready_scheduler() -> (FrameScheduler, HostLink) {
    scheduler_with_mirror(false)
}

fn scheduler_with_mirror(mirror: bool) -> (FrameScheduler, HostLink) {
    let mut config = EffectConfig::heuristic();
    config.set_blur_radius(0.0);
    config.set_mirror(mirror);
    let (mut scheduler, link) = FrameScheduler::new(
        Box::new(HeuristicMask::new()),
        config,
        ViewportGeometry::new(W, H, 1.0),
    );
    scheduler.await_source();
    scheduler.source_ready(SourceGeometry::new(W, H));
    (scheduler, link)
}

fn all_pixels(raster: &Raster, rgba: [u8; 4]) -> bool {
    raster.as_bytes().chunks_exact(4).all(|px| px == &rgba[..])
}

#[test]
fn white_cloth_is_replaced_by_captured_plate() {
    let (mut scheduler, link) = ready_scheduler();
    assert!(link.send(Control::CaptureBackground));
    assert!(link.send(Control::Enable));

    let mut camera = ScriptedCamera::new([solid(GREEN), solid(WHITE), solid(WHITE)]);
    let mut sink = RecordingSink::default();
    let stats = run_pipeline(&mut camera, &mut sink, &mut scheduler, Some(3)).unwrap();

    assert_eq!(stats.frames, 3);
    assert_eq!(stats.composited, 3);
    assert_eq!(sink.frames.len(), 3);
    assert!(scheduler.plate().is_ready());
    for frame in &sink.frames {
        assert_eq!(frame.dimensions(), (W, H));
        assert!(all_pixels(frame, [0, 90, 0, 255]));
    }
}

#[test]
fn disabled_effect_passes_camera_through() {
    let (mut scheduler, _link) = ready_scheduler();
    let mut camera = ScriptedCamera::new([solid(WHITE), solid(WHITE)]);
    let mut sink = RecordingSink::default();

    let stats = run_pipeline(&mut camera, &mut sink, &mut scheduler, Some(2)).unwrap();

    assert_eq!(stats.composited, 0);
    assert_eq!(sink.frames.len(), 2);
    assert!(all_pixels(&sink.frames[1], [250, 250, 250, 255]));
}

#[test]
fn passthrough_is_mirrored_and_cover_fit_like_composites() {
    let (mut scheduler, _link) = scheduler_with_mirror(true);
    // twice as wide as the viewport: cover crops the centre columns 4..12
    let wide = RgbImage::from_fn(2 * W, H, |x, _| Rgb([x as u8 * 10, 0, 0]));
    let mut camera = ScriptedCamera::new([wide]);
    let mut sink = RecordingSink::default();

    run_pipeline(&mut camera, &mut sink, &mut scheduler, Some(1)).unwrap();

    let out = &sink.frames[0];
    assert_eq!(out.dimensions(), (W, H));
    for x in 0..W {
        let source_column = (2 * W - W / 2 - 1 - x) as u8;
        assert_eq!(out.pixel(x, 0), [source_column * 10, 0, 0, 255], "x={x}");
    }
}

#[test]
fn enabled_without_plate_shows_live_video() {
    let (mut scheduler, link) = ready_scheduler();
    link.send(Control::Enable);
    let mut camera = ScriptedCamera::new([solid(WHITE)]);
    let mut sink = RecordingSink::default();

    run_pipeline(&mut camera, &mut sink, &mut scheduler, Some(1)).unwrap();

    assert_eq!(sink.frames.len(), 1);
    assert!(all_pixels(&sink.frames[0], [250, 250, 250, 255]));
}

#[test]
fn frame_limit_tears_down() {
    let (mut scheduler, link) = ready_scheduler();
    let mut camera = ScriptedCamera::new((0..5).map(|_| solid(GREEN)));
    let mut sink = RecordingSink::default();

    let stats = run_pipeline(&mut camera, &mut sink, &mut scheduler, Some(2)).unwrap();

    assert_eq!(stats.frames, 2);
    assert_eq!(scheduler.phase(), EffectPhase::TornDown);
    assert!(!scheduler.is_alive());
    assert!(!link.send(Control::Enable));
    assert_eq!(camera.frames.len(), 3);
}

#[test]
fn paused_host_writes_nothing() {
    let (mut scheduler, link) = ready_scheduler();
    link.set_hidden(true);
    let mut camera = ScriptedCamera::new([solid(GREEN), solid(GREEN)]);
    let mut sink = RecordingSink::default();

    let stats = run_pipeline(&mut camera, &mut sink, &mut scheduler, Some(2)).unwrap();

    assert_eq!(stats.frames, 2);
    assert_eq!(stats.written, 0);
    assert!(sink.frames.is_empty());
}

#[test]
fn shutdown_command_stops_the_loop() {
    let (mut scheduler, link) = ready_scheduler();
    link.send(Control::Shutdown);
    let mut camera = ScriptedCamera::new((0..4).map(|_| solid(GREEN)));
    let mut sink = RecordingSink::default();

    let stats = run_pipeline(&mut camera, &mut sink, &mut scheduler, None).unwrap();

    assert_eq!(stats.frames, 0);
    assert!(sink.frames.is_empty());
    assert_eq!(scheduler.phase(), EffectPhase::TornDown);
}

#[test]
fn unavailable_source_leaves_scheduler_awaiting() {
    let (mut scheduler, link) = FrameScheduler::new(
        Box::new(HeuristicMask::new()),
        EffectConfig::heuristic(),
        ViewportGeometry::new(W, H, 1.0),
    );
    scheduler.await_source();

    let opened: Result<ScriptedCamera, PipelineError> =
        open_with_retry(|| anyhow::bail!("no camera"), 3, Duration::ZERO);

    assert!(matches!(
        opened,
        Err(PipelineError::SourceUnavailable { attempts: 3 })
    ));
    assert_eq!(scheduler.phase(), EffectPhase::AwaitingSource);
    assert!(scheduler.is_alive());
    assert!(link.send(Control::Enable));
}

#[test]
fn persistent_capture_failure_is_reported() {
    let (mut scheduler, _link) = ready_scheduler();
    let mut camera = ScriptedCamera::broken();
    let mut sink = RecordingSink::default();

    let err = run_pipeline(&mut camera, &mut sink, &mut scheduler, None).unwrap_err();

    assert!(format!("{err:#}").contains("camera unplugged"));
    assert!(!scheduler.is_alive());
    assert!(sink.frames.is_empty());
    assert!(MAX_CONSECUTIVE_CAPTURE_ERRORS > 1);
}
