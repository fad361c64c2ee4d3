use std::panic::{self, AssertUnwindSafe};
use std::thread::{self, JoinHandle};

use anyhow::{Context, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError, TrySendError};
use image::RgbImage;

use super::{MaskProvider, MaskRequest};
use crate::config::EffectConfig;
use crate::error::PipelineError;
use crate::geometry::SourceGeometry;
use crate::raster::Raster;
use crate::segmentation::{Matte, SegmentationModel};

enum Job {
    /// `reset` clears recurrent state before this frame.
    Segment { seq: u64, frame: RgbImage, reset: bool },
    Reset,
}

struct Done {
    seq: u64,
    result: Result<Matte>,
}

/// Mask provider backed by an external segmenter running on its own thread.
///
/// Frames are submitted one at a time; while a submission is outstanding
/// further frames are dropped, never queued. Failed submissions are logged
/// and leave the last good mask in place.
pub struct LearnedMask {
    jobs: Option<Sender<Job>>,
    results: Receiver<Done>,
    worker: Option<JoinHandle<()>>,
    busy: bool,
    next_seq: u64,
    applied_seq: u64,
    mask: Raster,
    has_mask: bool,
    /// A reset that did not fit in the job slot rides on the next frame.
    pending_reset: bool,
    failures: u64,
}

impl LearnedMask {
    pub fn spawn(model: Box<dyn SegmentationModel>) -> Result<Self> {
        let (job_tx, job_rx) = bounded::<Job>(1);
        let (done_tx, done_rx) = unbounded::<Done>();

        let worker = thread::Builder::new()
            .name("segmenter".into())
            .spawn(move || run_worker(model, job_rx, done_tx))
            .context("Failed to start segmenter thread")?;

        Ok(Self {
            jobs: Some(job_tx),
            results: done_rx,
            worker: Some(worker),
            busy: false,
            next_seq: 0,
            applied_seq: 0,
            mask: Raster::new(1, 1),
            has_mask: false,
            pending_reset: false,
            failures: 0,
        })
    }

    /// Submissions that failed so far.
    pub fn failures(&self) -> u64 {
        self.failures
    }
}

fn run_worker(mut model: Box<dyn SegmentationModel>, jobs: Receiver<Job>, done: Sender<Done>) {
    tracing::debug!("Segmenter worker started");
    while let Ok(job) = jobs.recv() {
        match job {
            Job::Segment { seq, frame, reset } => {
                if reset {
                    model.reset_state();
                }
                let result = panic::catch_unwind(AssertUnwindSafe(|| model.segment(&frame)))
                    .unwrap_or_else(|_| Err(anyhow::anyhow!("segmenter panicked")));
                if done.send(Done { seq, result }).is_err() {
                    break;
                }
            }
            Job::Reset => model.reset_state(),
        }
    }
    model.close();
    tracing::debug!("Segmenter worker stopped");
}

impl MaskProvider for LearnedMask {
    fn name(&self) -> &'static str {
        "learned"
    }

    fn is_async(&self) -> bool {
        true
    }

    fn poll(&mut self) -> bool {
        let mut updated = false;
        loop {
            match self.results.try_recv() {
                Ok(Done { seq, result }) => {
                    self.busy = false;
                    match result {
                        Ok(matte) if seq > self.applied_seq => {
                            matte.write_mask(&mut self.mask);
                            self.applied_seq = seq;
                            self.has_mask = true;
                            updated = true;
                        }
                        Ok(_) => tracing::debug!("Dropping superseded mask {}", seq),
                        Err(e) => {
                            self.failures += 1;
                            let err = PipelineError::mask_provider(format!("frame {seq}: {e:#}"));
                            tracing::warn!("{}", err);
                        }
                    }
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if self.busy {
                        tracing::warn!("Segmenter worker exited with a frame in flight");
                        self.busy = false;
                    }
                    break;
                }
            }
        }
        updated
    }

    fn in_flight(&self) -> bool {
        self.busy
    }

    fn request_mask(
        &mut self,
        frame: &Raster,
        _config: &EffectConfig,
    ) -> Result<MaskRequest, PipelineError> {
        if self.busy {
            return Ok(MaskRequest::Busy);
        }
        let jobs = self.jobs.as_ref().ok_or(PipelineError::SegmenterGone)?;
        let job = Job::Segment {
            seq: self.next_seq + 1,
            frame: frame.to_rgb_image(),
            reset: self.pending_reset,
        };
        match jobs.try_send(job) {
            Ok(()) => {
                self.next_seq += 1;
                self.pending_reset = false;
                self.busy = true;
                Ok(MaskRequest::Pending)
            }
            // a reset is still queued ahead of us
            Err(TrySendError::Full(_)) => Ok(MaskRequest::Busy),
            Err(TrySendError::Disconnected(_)) => Err(PipelineError::SegmenterGone),
        }
    }

    fn current_mask(&self) -> Option<&Raster> {
        self.has_mask.then_some(&self.mask)
    }

    fn source_changed(&mut self, geometry: SourceGeometry) {
        tracing::debug!(
            "Learned mask source now {}x{}, resetting segmenter",
            geometry.width,
            geometry.height
        );
        self.has_mask = false;
        // anything submitted before the change is stale
        self.applied_seq = self.next_seq;
        let Some(jobs) = &self.jobs else {
            return;
        };
        match jobs.try_send(Job::Reset) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => self.pending_reset = true,
            Err(TrySendError::Disconnected(_)) => {
                tracing::warn!("Segmenter worker is gone; reset skipped")
            }
        }
    }

    fn release(&mut self) {
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                tracing::warn!("Segmenter thread panicked during shutdown");
            }
        }
        self.busy = false;
    }
}

impl Drop for LearnedMask {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    /// Blocks every call until the test opens the gate once.
    struct GatedModel {
        gate: Receiver<bool>,
        calls: Arc<AtomicUsize>,
        resets: Arc<AtomicUsize>,
    }

    impl SegmentationModel for GatedModel {
        fn segment(&mut self, frame: &RgbImage) -> Result<Matte> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let succeed = self.gate.recv()?;
            if !succeed {
                anyhow::bail!("model rejected frame");
            }
            let (w, h) = frame.dimensions();
            Matte::new(w, h, vec![1.0; (w * h) as usize])
        }

        fn reset_state(&mut self) {
            self.resets.fetch_add(1, Ordering::SeqCst);
        }

        fn input_size(&self) -> (u32, u32) {
            (8, 8)
        }
    }

    struct PanickingModel;

    impl SegmentationModel for PanickingModel {
        fn segment(&mut self, _frame: &RgbImage) -> Result<Matte> {
            panic!("inference crashed")
        }

        fn input_size(&self) -> (u32, u32) {
            (8, 8)
        }
    }

    fn gated() -> (LearnedMask, Sender<bool>, Arc<AtomicUsize>) {
        let (provider, tx, calls, _) = gated_with_resets();
        (provider, tx, calls)
    }

    fn gated_with_resets() -> (LearnedMask, Sender<bool>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
        let (tx, rx) = unbounded();
        let calls = Arc::new(AtomicUsize::new(0));
        let resets = Arc::new(AtomicUsize::new(0));
        let model = GatedModel {
            gate: rx,
            calls: calls.clone(),
            resets: resets.clone(),
        };
        let provider = LearnedMask::spawn(Box::new(model)).unwrap();
        (provider, tx, calls, resets)
    }

    fn wait_idle(provider: &mut LearnedMask) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        let mut updated = false;
        while provider.in_flight() && Instant::now() < deadline {
            updated |= provider.poll();
            thread::sleep(Duration::from_millis(1));
        }
        updated
    }

    #[test]
    fn second_request_while_busy_is_dropped() {
        let (mut provider, gate, calls) = gated();
        let frame = Raster::filled(4, 3, [10, 10, 10, 255]);
        let config = EffectConfig::learned();

        assert_eq!(provider.request_mask(&frame, &config).unwrap(), MaskRequest::Pending);
        assert!(!provider.poll());
        assert_eq!(provider.request_mask(&frame, &config).unwrap(), MaskRequest::Busy);

        gate.send(true).unwrap();
        assert!(wait_idle(&mut provider));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        let mask = provider.current_mask().unwrap();
        assert_eq!(mask.dimensions(), (4, 3));
        assert_eq!(mask.opaque_count(), 12);
    }

    #[test]
    fn failure_keeps_last_mask() {
        let (mut provider, gate, _) = gated();
        let frame = Raster::filled(2, 2, [0, 0, 0, 255]);
        let config = EffectConfig::learned();

        provider.request_mask(&frame, &config).unwrap();
        gate.send(true).unwrap();
        assert!(wait_idle(&mut provider));
        let before = provider.current_mask().cloned();

        provider.request_mask(&frame, &config).unwrap();
        gate.send(false).unwrap();
        assert!(!wait_idle(&mut provider));
        assert_eq!(provider.failures(), 1);
        assert_eq!(provider.current_mask().cloned(), before);
        assert!(!provider.in_flight());
    }

    #[test]
    fn panic_in_model_is_contained() {
        let mut provider = LearnedMask::spawn(Box::new(PanickingModel)).unwrap();
        let frame = Raster::filled(2, 2, [0, 0, 0, 255]);
        provider.request_mask(&frame, &EffectConfig::learned()).unwrap();
        assert!(!wait_idle(&mut provider));
        assert_eq!(provider.failures(), 1);
        assert!(provider.current_mask().is_none());
    }

    #[test]
    fn source_change_mid_flight_neither_blocks_nor_applies_stale_mask() {
        let (mut provider, gate, calls, resets) = gated_with_resets();
        let frame = Raster::filled(4, 4, [0, 0, 0, 255]);
        let config = EffectConfig::learned();

        provider.request_mask(&frame, &config).unwrap();
        let deadline = Instant::now() + Duration::from_secs(5);
        while calls.load(Ordering::SeqCst) == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
        }

        // worker is blocked inside segment; both calls must return at once
        provider.source_changed(SourceGeometry::new(8, 8));
        provider.source_changed(SourceGeometry::new(16, 16));

        gate.send(true).unwrap();
        assert!(!wait_idle(&mut provider));
        assert!(provider.current_mask().is_none());

        let deadline = Instant::now() + Duration::from_secs(5);
        let mut request = provider.request_mask(&frame, &config).unwrap();
        while request == MaskRequest::Busy && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(1));
            request = provider.request_mask(&frame, &config).unwrap();
        }
        assert_eq!(request, MaskRequest::Pending);

        gate.send(true).unwrap();
        assert!(wait_idle(&mut provider));
        assert!(provider.current_mask().is_some());
        assert_eq!(resets.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn release_stops_worker() {
        let (mut provider, gate, _) = gated();
        drop(gate);
        provider.release();
        let frame = Raster::filled(2, 2, [0, 0, 0, 255]);
        assert!(matches!(
            provider.request_mask(&frame, &EffectConfig::learned()),
            Err(PipelineError::SegmenterGone)
        ));
    }
}
