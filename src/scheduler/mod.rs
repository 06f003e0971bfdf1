mod strategy;

pub use strategy::{AsyncStrategy, Completed, SubmissionStrategy, SyncStrategy};

use crate::capture::SnapshotStore;
use crate::config::{SchedulerMode, WatchConfig};
use crate::error::{Result, WatchError};
use crate::events::{EventBus, WatchEvent};
use crate::frame::{Frame, Preprocessor};
use crate::inference::{Detection, InferenceGateway};
use crate::source::{FrameSource, ReadOutcome, SourceInterrupt};
use crate::tracking::{EventDetector, EventLogWriter, StreamState};
use chrono::Local;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

/// Physical frames each source consumes per tick so all advance the same real time
///
/// Halfway ratios round to even, so 25fps against 10fps advances 2 frames.
pub fn frame_steps(rates: &[f64]) -> Vec<u32> {
    let min_fps = rates
        .iter()
        .copied()
        .filter(|fps| *fps > 0.0)
        .fold(f64::INFINITY, f64::min);

    rates
        .iter()
        .map(|fps| {
            if min_fps.is_finite() && *fps > 0.0 {
                (fps / min_fps).round_ties_even().max(1.0) as u32
            } else {
                1
            }
        })
        .collect()
}

/// Build the submission strategy selected by the configuration
pub fn strategy_for(config: &WatchConfig, preprocessor: &Preprocessor) -> Box<dyn SubmissionStrategy> {
    let timeout = Duration::from_millis(config.scheduler.inference_timeout_ms);
    match config.scheduler.mode {
        SchedulerMode::Async => Box::new(AsyncStrategy::new(timeout)),
        SchedulerMode::Sync => Box::new(
            SyncStrategy::new(timeout)
                .with_motion_filter(config.motion.clone(), preprocessor.resolution()),
        ),
    }
}

/// Summary of a finished run
#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub ticks: u64,
    pub events: usize,
    pub cancelled: bool,
}

/// Drives every source through the detector one tick at a time
pub struct StreamScheduler {
    sources: Vec<FrameSource>,
    states: Vec<StreamState>,
    steps: Vec<u32>,
    gateway: Box<dyn InferenceGateway>,
    strategy: Box<dyn SubmissionStrategy>,
    preprocessor: Preprocessor,
    detector: EventDetector,
    bus: EventBus,
    snapshots: Option<SnapshotStore>,
    read_timeout: Option<Duration>,
    cancel: CancellationToken,
    ticks: u64,
}

impl StreamScheduler {
    pub fn new(
        sources: Vec<FrameSource>,
        gateway: Box<dyn InferenceGateway>,
        strategy: Box<dyn SubmissionStrategy>,
        preprocessor: Preprocessor,
        detector: EventDetector,
        bus: EventBus,
    ) -> Self {
        let rates: Vec<f64> = sources.iter().map(FrameSource::fps).collect();
        let steps = frame_steps(&rates);
        let label_count = detector.labels().len();

        let states = sources
            .iter()
            .map(|source| StreamState::new(source.index(), source.name(), source.fps(), label_count))
            .collect();

        for (source, step) in sources.iter().zip(&steps) {
            info!(
                "Source '{}' advances {} frame(s) per tick at {:.2}fps",
                source.name(),
                step,
                source.fps()
            );
        }

        Self {
            sources,
            states,
            steps,
            gateway,
            strategy,
            preprocessor,
            detector,
            bus,
            snapshots: None,
            read_timeout: None,
            cancel: CancellationToken::new(),
            ticks: 0,
        }
    }

    pub fn with_snapshots(mut self, store: SnapshotStore) -> Self {
        self.snapshots = Some(store);
        self
    }

    /// Bound push-source waits; stale frames are accepted after the timeout
    pub fn with_read_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.read_timeout = timeout;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn steps(&self) -> &[u32] {
        &self.steps
    }

    pub fn states(&self) -> &[StreamState] {
        &self.states
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn strategy_name(&self) -> &'static str {
        self.strategy.name()
    }

    /// Handles that unblock push-source reads from another thread
    pub fn interrupt_handles(&self) -> Vec<SourceInterrupt> {
        self.sources
            .iter()
            .filter_map(FrameSource::interrupt_handle)
            .collect()
    }

    pub fn all_exhausted(&self) -> bool {
        self.states.iter().all(StreamState::is_exhausted)
    }

    /// Tick until every source is exhausted or the run is cancelled, then drain
    pub fn run(&mut self) -> RunSummary {
        info!(
            "Scheduler starting with {} sources in {} mode",
            self.sources.len(),
            self.strategy.name()
        );

        while !self.cancel.is_cancelled() && !self.all_exhausted() {
            self.tick();
        }

        let cancelled = self.cancel.is_cancelled();
        self.drain();

        let summary = RunSummary {
            ticks: self.ticks,
            events: self.states.iter().map(|s| s.events().len()).sum(),
            cancelled,
        };
        info!(
            "Scheduler finished after {} ticks with {} events{}",
            summary.ticks,
            summary.events,
            if cancelled { " (cancelled)" } else { "" }
        );
        summary
    }

    /// One pass over all live sources
    pub fn tick(&mut self) {
        self.ticks += 1;

        for index in 0..self.sources.len() {
            if self.cancel.is_cancelled() {
                break;
            }
            if self.states[index].is_exhausted() {
                continue;
            }

            let Some(frame) = self.next_frame(index) else {
                continue;
            };

            if !self.strategy.should_infer(&frame) {
                continue;
            }
            self.submit(frame);

            if let Some(completed) = self.strategy.retrieve_tick(self.gateway.as_mut()) {
                self.apply(completed);
            }
        }
    }

    fn next_frame(&mut self, index: usize) -> Option<Frame> {
        let source = &mut self.sources[index];
        let previous = source.last_seen();

        match source.advance(self.steps[index], self.read_timeout) {
            Ok(ReadOutcome::Frame { frame, stale }) => {
                if frame.sequence <= previous {
                    trace!("No new frame from '{}' this tick", source.name());
                    return None;
                }
                if stale {
                    debug!(
                        "Using stale frame {} from '{}'",
                        frame.sequence,
                        source.name()
                    );
                }
                Some(frame)
            }
            Ok(ReadOutcome::Pending) => None,
            Ok(ReadOutcome::EndOfStream) => {
                self.exhaust(index);
                None
            }
            Err(e) => {
                warn!("Source '{}' failed: {}", source.name(), e);
                self.exhaust(index);
                None
            }
        }
    }

    fn exhaust(&mut self, index: usize) {
        let state = &mut self.states[index];
        state.mark_exhausted();
        self.bus.publish_lossy(WatchEvent::SourceExhausted {
            source: index,
            source_name: state.name().to_string(),
            timestamp: Local::now(),
        });
    }

    fn submit(&mut self, frame: Frame) {
        let tensor = self.preprocessor.prepare(&frame);
        self.strategy.submit_tick(self.gateway.as_mut(), frame, tensor);
    }

    fn apply(&mut self, completed: Completed) {
        let Completed {
            source,
            frame,
            result,
        } = completed;

        match result {
            Ok(detections) => self.observe(source, &detections, frame.sequence, Some(&frame)),
            Err(e) => {
                // The tick still counts, as one with nothing detected
                self.degrade(source, &e.to_string());
                self.observe(source, &[], frame.sequence, None);
            }
        }
    }

    fn degrade(&mut self, source: usize, reason: &str) {
        self.bus.publish_lossy(WatchEvent::InferenceDegraded {
            source_name: self.states[source].name().to_string(),
            reason: reason.to_string(),
            timestamp: Local::now(),
        });
    }

    /// Run one tick of detections through the debounce and fan out intrusions
    fn observe(
        &mut self,
        source: usize,
        detections: &[Detection],
        frame_index: u64,
        frame: Option<&Frame>,
    ) {
        let Some(state) = self.states.get_mut(source) else {
            warn!("Result for unknown source {}", source);
            return;
        };

        let counts = self.detector.count(detections);
        let now = Local::now();
        let intrusions = self.detector.observe(state, &counts, frame_index, now);
        if intrusions.is_empty() {
            return;
        }

        let Some(frame) = frame else {
            return;
        };
        let counted: Vec<Detection> = self.detector.counted(detections).cloned().collect();

        for intrusion in intrusions {
            if let Some(store) = &self.snapshots {
                if let Err(e) = store.save(state.name(), intrusion.total, &frame.image, &counted) {
                    warn!("Failed to save snapshot: {}", e);
                }
            }

            self.bus.publish_lossy(WatchEvent::intrusion(
                source,
                state.name(),
                &intrusion.label,
                intrusion.increase,
                intrusion.total,
                frame_index,
                frame.image.clone(),
                counted.clone(),
                now,
            ));
        }
    }

    /// Retrieve and apply requests still in flight
    pub fn drain(&mut self) {
        for completed in self.strategy.drain(self.gateway.as_mut()) {
            self.apply(completed);
        }
    }

    /// Stop producers, flush the event log, then release decoders
    ///
    /// Decoders are only released once every producer has been joined. A
    /// flush failure is returned after the release step.
    pub fn shutdown(&mut self, writer: &EventLogWriter) -> Result<()> {
        let mut stopped = true;
        for source in &mut self.sources {
            if let Err(e) = source.stop() {
                warn!("Failed to stop source '{}': {}", source.name(), e);
                stopped = false;
            }
        }

        let flushed = writer.flush(&self.states);

        if stopped {
            for source in &mut self.sources {
                source.release();
            }
            info!("Released {} sources", self.sources.len());
        } else {
            warn!("Skipping decoder release, not every producer stopped");
        }

        flushed.map_err(WatchError::from)?;
        if !stopped {
            return Err(WatchError::system("source producers did not stop cleanly"));
        }
        Ok(())
    }
}
