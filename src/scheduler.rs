use image::RgbImage;

use crate::compositor::Compositor;
use crate::config::EffectConfig;
use crate::geometry::{SourceGeometry, ViewportGeometry};
use crate::host::{self, Control, HostEvent, HostInbox, HostLink};
use crate::mask::{MaskProvider, MaskRequest};
use crate::plate::BackgroundPlate;
use crate::raster::Raster;

/// Lifecycle of one effect instance. `TornDown` is permanent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EffectPhase {
    Uninitialized,
    AwaitingSource,
    Ready,
    TornDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineState {
    /// Armed independently of `EffectConfig::enabled`.
    pub subject_replacement_enabled: bool,
    pub first_result_produced: bool,
    pub paused: bool,
    pub alive: bool,
}

impl Default for PipelineState {
    fn default() -> Self {
        Self {
            subject_replacement_enabled: true,
            first_result_produced: false,
            paused: false,
            alive: true,
        }
    }
}

/// Result of offering one video frame to the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Torn down; the caller should stop delivering frames.
    Stopped,
    /// No source geometry yet.
    NotReady,
    /// Host is backgrounded; nothing processed.
    Paused,
    /// Effect disabled; nothing processed.
    Disabled,
    /// A composite was written to the output raster.
    Composited {
        mask: Option<MaskRequest>,
        /// Whether the overlay should be shown yet.
        visible: bool,
    },
}

/// Drives one composite attempt per available video frame.
///
/// The caller delivers frames as the source produces them; the scheduler
/// never queues frames and never blocks on the mask provider. Host events
/// and UI controls are drained at the top of every tick, and the config is
/// snapshotted before compositing.
pub struct FrameScheduler {
    provider: Box<dyn MaskProvider>,
    compositor: Compositor,
    plate: BackgroundPlate,
    config: EffectConfig,
    state: PipelineState,
    phase: EffectPhase,
    viewport: ViewportGeometry,
    source: Option<SourceGeometry>,
    frame: Raster,
    capture_requested: bool,
    inbox: Option<HostInbox>,
}

impl FrameScheduler {
    pub fn new(
        provider: Box<dyn MaskProvider>,
        config: EffectConfig,
        viewport: ViewportGeometry,
    ) -> (Self, HostLink) {
        let (link, inbox) = host::channel();
        let scheduler = Self {
            provider,
            compositor: Compositor::new(&viewport),
            plate: BackgroundPlate::new(),
            config,
            state: PipelineState::default(),
            phase: EffectPhase::Uninitialized,
            viewport,
            source: None,
            frame: Raster::new(1, 1),
            capture_requested: false,
            inbox: Some(inbox),
        };
        (scheduler, link)
    }

    pub fn phase(&self) -> EffectPhase {
        self.phase
    }

    pub fn state(&self) -> PipelineState {
        self.state
    }

    pub fn config(&self) -> &EffectConfig {
        &self.config
    }

    pub fn viewport(&self) -> &ViewportGeometry {
        &self.viewport
    }

    pub fn plate(&self) -> &BackgroundPlate {
        &self.plate
    }

    pub fn compositor(&self) -> &Compositor {
        &self.compositor
    }

    pub fn output(&self) -> &Raster {
        self.compositor.output()
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    pub fn is_alive(&self) -> bool {
        self.state.alive
    }

    /// The caller has started looking for the video source.
    pub fn await_source(&mut self) {
        if self.phase == EffectPhase::Uninitialized {
            self.phase = EffectPhase::AwaitingSource;
        }
    }

    /// Source geometry is known (or changed). Working buffers are resized in
    /// place and the mask provider is told about the new resolution.
    pub fn source_ready(&mut self, geometry: SourceGeometry) {
        if !self.state.alive {
            return;
        }
        if self.source == Some(geometry) && self.phase == EffectPhase::Ready {
            return;
        }
        tracing::info!(
            "Source ready at {}x{} ({} mask)",
            geometry.width,
            geometry.height,
            self.provider.name()
        );
        self.frame.resize(geometry.width, geometry.height);
        if self.source.is_some() {
            self.provider.source_changed(geometry);
        }
        self.source = Some(geometry);
        self.phase = EffectPhase::Ready;
    }

    /// Process one available video frame.
    pub fn on_frame(&mut self, image: &RgbImage) -> TickOutcome {
        if !self.state.alive {
            return TickOutcome::Stopped;
        }
        self.drain_inbox();
        if !self.state.alive {
            return TickOutcome::Stopped;
        }
        if self.phase != EffectPhase::Ready {
            return TickOutcome::NotReady;
        }
        if self.state.paused {
            return TickOutcome::Paused;
        }

        let (w, h) = image.dimensions();
        if w == 0 || h == 0 {
            tracing::warn!("Skipping empty {}x{} frame", w, h);
            return TickOutcome::NotReady;
        }
        if self.source.map(|s| s.dimensions()) != Some((w, h)) {
            self.source_ready(SourceGeometry::new(w, h));
        }
        self.frame.copy_from_rgb(image);
        if std::mem::take(&mut self.capture_requested) {
            self.plate.capture(Some(&self.frame), &self.viewport);
        }

        if self.provider.poll() {
            self.state.first_result_produced = true;
        }
        if !self.config.enabled {
            return TickOutcome::Disabled;
        }

        let config = self.config;
        let replacing = self.state.subject_replacement_enabled && self.plate.is_ready();
        let asynchronous = self.provider.is_async();

        let mask = if replacing || asynchronous {
            match self.provider.request_mask(&self.frame, &config) {
                Ok(request) => Some(request),
                Err(e) => {
                    tracing::warn!("Mask request failed: {}", e);
                    None
                }
            }
        } else {
            None
        };
        if !asynchronous || mask == Some(MaskRequest::Ready) {
            self.state.first_result_produced = true;
        }

        self.compositor.compose(
            &self.frame,
            self.provider.current_mask(),
            &self.plate,
            &config,
            self.state.subject_replacement_enabled,
            &self.viewport,
        );

        TickOutcome::Composited {
            mask,
            visible: self.state.first_result_produced,
        }
    }

    /// Stop for good: no further ticks, mask requests or host callbacks.
    pub fn teardown(&mut self) {
        if !self.state.alive {
            return;
        }
        self.state.alive = false;
        self.phase = EffectPhase::TornDown;
        self.inbox = None;
        self.provider.release();
        tracing::info!("Effect torn down");
    }

    fn drain_inbox(&mut self) {
        let Some(inbox) = &self.inbox else {
            return;
        };
        let events: Vec<HostEvent> = inbox.events.try_iter().collect();
        let controls: Vec<Control> = inbox.controls.try_iter().collect();
        for event in events {
            self.apply_event(event);
        }
        for control in controls {
            if !self.state.alive {
                break;
            }
            self.apply_control(control);
        }
    }

    fn apply_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::Resized { width, height, dpr } => {
                self.viewport = ViewportGeometry::new(width, height, dpr);
                tracing::debug!(
                    "Viewport now {}x{} device pixels",
                    self.viewport.width,
                    self.viewport.height
                );
            }
            HostEvent::VisibilityChanged { hidden } => {
                self.state.paused = hidden;
                tracing::debug!("Paused: {}", hidden);
            }
        }
    }

    fn apply_control(&mut self, control: Control) {
        tracing::debug!("Control: {:?}", control);
        match control {
            Control::Enable => self.config.set_enabled(true),
            Control::Disable => self.config.set_enabled(false),
            Control::ToggleSubjectReplacement => {
                self.state.subject_replacement_enabled = !self.state.subject_replacement_enabled;
            }
            Control::SetBlurRadius(raw) => self.config.set_blur_radius_str(&raw),
            Control::SetMirror(mirror) => self.config.set_mirror(mirror),
            Control::SetWhiteThreshold(raw) => self.config.set_white_threshold_str(&raw),
            Control::SetSensitivity(ratio) => self.config.set_sensitivity(ratio),
            Control::CaptureBackground => {
                if self.phase == EffectPhase::Ready {
                    self.capture_requested = true;
                } else {
                    tracing::debug!("Ignoring capture before the source is ready");
                }
            }
            Control::Shutdown => self.teardown(),
        }
    }
}

impl Drop for FrameScheduler {
    fn drop(&mut self) {
        self.teardown();
    }
}
