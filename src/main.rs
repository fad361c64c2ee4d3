use std::io::{self, BufRead};
use std::thread;

use anyhow::{Context, Result};
use clap::Parser;

use cloakfx::capture::{self, CaptureSource, WebcamCapture};
use cloakfx::config::EffectConfig;
use cloakfx::error::PipelineError;
use cloakfx::geometry::{SourceGeometry, ViewportGeometry};
use cloakfx::host::{Control, HostLink};
use cloakfx::mask::{HeuristicMask, LearnedMask, MaskProvider};
use cloakfx::output::V4L2Output;
use cloakfx::pipeline::run_pipeline;
use cloakfx::scheduler::FrameScheduler;
use cloakfx::segmentation;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Input webcam device index
    #[arg(short, long, default_value_t = 0)]
    input_device: u32,

    /// Output v4l2loopback device path
    #[arg(short, long, default_value = "/dev/video10")]
    output_device: String,

    /// Capture resolution width
    #[arg(long, default_value_t = 1280)]
    capture_width: u32,

    /// Capture resolution height
    #[arg(long, default_value_t = 720)]
    capture_height: u32,

    /// Output width in logical pixels
    #[arg(long, default_value_t = 1280)]
    output_width: u32,

    /// Output height in logical pixels
    #[arg(long, default_value_t = 720)]
    output_height: u32,

    /// Device pixel ratio, clamped to [1, 3]
    #[arg(long, default_value_t = 1.0)]
    dpr: f32,

    /// Path to a RobustVideoMatting ONNX model.
    /// Without it the white-cloth heuristic is used.
    #[arg(long)]
    model: Option<String>,

    /// Start with the effect enabled
    #[arg(long)]
    enabled: bool,

    /// Mask feather radius in logical pixels
    #[arg(long)]
    blur: Option<f32>,

    /// Do not mirror the output
    #[arg(long)]
    no_mirror: bool,

    /// Heuristic brightness threshold (0-255)
    #[arg(long)]
    white_threshold: Option<f32>,

    /// Heuristic dilation neighbour ratio (0-1)
    #[arg(long)]
    sensitivity: Option<f32>,

    /// Stop after this many frames
    #[arg(long)]
    max_frames: Option<u64>,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn effect_config(&self) -> EffectConfig {
        let mut config = if self.model.is_some() {
            EffectConfig::learned()
        } else {
            EffectConfig::heuristic()
        };
        config.set_enabled(self.enabled);
        if let Some(blur) = self.blur {
            config.set_blur_radius(blur);
        }
        if self.no_mirror {
            config.set_mirror(false);
        }
        if let Some(threshold) = self.white_threshold {
            config.set_white_threshold(threshold);
        }
        if let Some(ratio) = self.sensitivity {
            config.set_sensitivity(ratio);
        }
        config
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    tracing::info!("cloakfx starting");
    tracing::info!("Capture: {}x{}", args.capture_width, args.capture_height);
    tracing::info!(
        "Output: {}x{} @ {}x",
        args.output_width,
        args.output_height,
        args.dpr
    );

    let provider: Box<dyn MaskProvider> = match &args.model {
        Some(model_path) => {
            tracing::info!("Loading segmentation model from {}", model_path);
            let model = segmentation::create_default_model(model_path)
                .context("Failed to load segmentation model")?;
            Box::new(LearnedMask::spawn(model).context("Failed to start segmenter")?)
        }
        None => {
            tracing::info!("No model given, using the white-cloth heuristic");
            Box::new(HeuristicMask::new())
        }
    };

    let config = args.effect_config();
    tracing::info!(
        "Effect {} (blur={}, mirror={})",
        if config.enabled { "enabled" } else { "disabled" },
        config.blur_radius,
        config.mirror
    );

    let viewport = ViewportGeometry::new(args.output_width, args.output_height, args.dpr);
    let (mut scheduler, link) = FrameScheduler::new(provider, config, viewport);
    scheduler.await_source();

    let opened = capture::open_with_retry(
        || WebcamCapture::new(args.input_device, args.capture_width, args.capture_height),
        capture::SOURCE_ATTEMPTS,
        capture::SOURCE_POLL_INTERVAL,
    );
    let mut camera = match opened {
        Ok(camera) => camera,
        // The scheduler stays in AwaitingSource; with nothing to drive it the
        // binary exits without writing a frame.
        Err(e @ PipelineError::SourceUnavailable { .. }) => {
            tracing::error!("{} (phase {:?})", e, scheduler.phase());
            return Ok(());
        }
        Err(e) => return Err(e).context("Failed to initialize webcam capture"),
    };

    let (width, height) = camera.resolution();
    scheduler.source_ready(SourceGeometry::new(width, height));

    let (out_width, out_height) = viewport.dimensions();
    let mut output = V4L2Output::new(&args.output_device, out_width, out_height)
        .context("Failed to initialize v4l2loopback output")?;

    spawn_control_reader(link)?;
    tracing::info!("Commands on stdin: enable, disable, toggle, blur <px>, mirror <on|off>, threshold <0-255>, sensitivity <0-1>, capture, quit");

    run_pipeline(&mut camera, &mut output, &mut scheduler, args.max_frames)?;

    Ok(())
}

/// Forward stdin commands to the scheduler until it stops listening.
fn spawn_control_reader(link: HostLink) -> Result<()> {
    thread::Builder::new()
        .name("controls".into())
        .spawn(move || {
            for line in io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                match Control::parse(line) {
                    Some(control) => {
                        if !link.send(control) {
                            break;
                        }
                    }
                    None => tracing::warn!("Unknown command: {}", line),
                }
            }
        })
        .context("Failed to start control reader")?;
    Ok(())
}
