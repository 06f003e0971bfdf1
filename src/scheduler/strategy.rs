use crate::analyzer::MotionFilter;
use crate::config::MotionConfig;
use crate::error::InferenceError;
use crate::frame::{Frame, Tensor};
use crate::inference::{Detection, InferenceGateway, RequestSlot};
use std::time::Duration;
use tracing::{debug, trace};

/// A finished request together with the frame it was made for
#[derive(Debug)]
pub struct Completed {
    pub source: usize,
    pub frame: Frame,
    pub result: Result<Vec<Detection>, InferenceError>,
}

/// A frame waiting for its result, or for the failure recorded at submission
#[derive(Debug)]
struct Pending {
    frame: Frame,
    failed: Option<InferenceError>,
}

impl Pending {
    fn submit(
        gateway: &mut dyn InferenceGateway,
        slot: RequestSlot,
        frame: Frame,
        tensor: Result<Tensor, InferenceError>,
    ) -> Self {
        let failed = tensor.and_then(|tensor| gateway.submit(slot, tensor)).err();
        if let Some(e) = &failed {
            debug!(
                "Submission of source {} frame {} failed: {}",
                frame.source, frame.sequence, e
            );
        }
        Self { frame, failed }
    }

    fn complete(
        self,
        gateway: &mut dyn InferenceGateway,
        slot: RequestSlot,
        timeout: Duration,
    ) -> Completed {
        let result = match self.failed {
            Some(e) => Err(e),
            None => gateway.wait(slot, timeout),
        };
        Completed {
            source: self.frame.source,
            frame: self.frame,
            result,
        }
    }
}

/// How frames are handed to the gateway and results collected
///
/// The scheduler calls `submit_tick` then `retrieve_tick` once per source
/// visit. Results are attributed through the frame recorded at submission,
/// never through the visit that happens to retrieve them. A frame that could
/// not be prepared or submitted comes back as a failed `Completed` in the
/// same position a real result would have.
pub trait SubmissionStrategy: Send {
    fn name(&self) -> &'static str;

    /// Whether the frame deserves inference at all
    fn should_infer(&mut self, _frame: &Frame) -> bool {
        true
    }

    fn submit_tick(
        &mut self,
        gateway: &mut dyn InferenceGateway,
        frame: Frame,
        tensor: Result<Tensor, InferenceError>,
    );

    fn retrieve_tick(&mut self, gateway: &mut dyn InferenceGateway) -> Option<Completed>;

    /// Collect every request still in flight
    fn drain(&mut self, gateway: &mut dyn InferenceGateway) -> Vec<Completed>;
}

/// Two-slot pipelining: submit into the next slot, retrieve the current one, swap
pub struct AsyncStrategy {
    current: RequestSlot,
    owners: [Option<Pending>; 2],
    timeout: Duration,
}

impl AsyncStrategy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            current: RequestSlot::A,
            owners: [None, None],
            timeout,
        }
    }

    fn collect(&mut self, gateway: &mut dyn InferenceGateway, slot: RequestSlot) -> Option<Completed> {
        let pending = self.owners[slot.index()].take()?;
        let completed = pending.complete(gateway, slot, self.timeout);
        trace!(
            "Slot {} completed for source {} frame {}",
            slot.name(),
            completed.source,
            completed.frame.sequence
        );
        Some(completed)
    }
}

impl SubmissionStrategy for AsyncStrategy {
    fn name(&self) -> &'static str {
        "async"
    }

    fn submit_tick(
        &mut self,
        gateway: &mut dyn InferenceGateway,
        frame: Frame,
        tensor: Result<Tensor, InferenceError>,
    ) {
        let next = self.current.other();
        self.owners[next.index()] = Some(Pending::submit(gateway, next, frame, tensor));
    }

    fn retrieve_tick(&mut self, gateway: &mut dyn InferenceGateway) -> Option<Completed> {
        let slot = self.current;
        self.current = slot.other();
        self.collect(gateway, slot)
    }

    fn drain(&mut self, gateway: &mut dyn InferenceGateway) -> Vec<Completed> {
        let mut completed = Vec::new();
        for _ in 0..2 {
            if let Some(done) = self.retrieve_tick(gateway) {
                completed.push(done);
            }
        }
        debug!("Drained {} pipelined requests", completed.len());
        completed
    }
}

/// One outstanding request, waited on immediately, with an optional motion pre-filter
pub struct SyncStrategy {
    pending: Option<Pending>,
    timeout: Duration,
    motion: Option<MotionConfig>,
    resolution: (u32, u32),
    filters: Vec<Option<MotionFilter>>,
}

impl SyncStrategy {
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: None,
            timeout,
            motion: None,
            resolution: (0, 0),
            filters: Vec::new(),
        }
    }

    /// Skip inference on frames without motion, compared at `resolution`
    pub fn with_motion_filter(mut self, config: MotionConfig, resolution: (u32, u32)) -> Self {
        if config.enabled {
            self.motion = Some(config);
            self.resolution = resolution;
        }
        self
    }
}

impl SubmissionStrategy for SyncStrategy {
    fn name(&self) -> &'static str {
        "sync"
    }

    fn should_infer(&mut self, frame: &Frame) -> bool {
        let Some(config) = &self.motion else {
            return true;
        };

        if self.filters.len() <= frame.source {
            self.filters.resize_with(frame.source + 1, || None);
        }
        let filter = self.filters[frame.source]
            .get_or_insert_with(|| MotionFilter::new(config.clone(), self.resolution));

        let regions = filter.count_regions(&frame.image);
        if regions == 0 {
            trace!(
                "No motion on source {} frame {}, skipping inference",
                frame.source,
                frame.sequence
            );
        }
        regions > 0
    }

    fn submit_tick(
        &mut self,
        gateway: &mut dyn InferenceGateway,
        frame: Frame,
        tensor: Result<Tensor, InferenceError>,
    ) {
        self.pending = Some(Pending::submit(gateway, RequestSlot::A, frame, tensor));
    }

    fn retrieve_tick(&mut self, gateway: &mut dyn InferenceGateway) -> Option<Completed> {
        let pending = self.pending.take()?;
        Some(pending.complete(gateway, RequestSlot::A, self.timeout))
    }

    fn drain(&mut self, gateway: &mut dyn InferenceGateway) -> Vec<Completed> {
        self.retrieve_tick(gateway).into_iter().collect()
    }
}
