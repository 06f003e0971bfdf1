use crate::error::InferenceError;
use crate::frame::Tensor;
use crate::inference::{Detection, Detector, InferenceGateway, RequestSlot, SlotStatus};
use crossbeam::channel::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

type Reply = Result<Vec<Detection>, InferenceError>;

struct Job {
    slot: RequestSlot,
    tensor: Tensor,
    reply: Sender<Reply>,
}

struct InFlight {
    reply: Receiver<Reply>,
    submitted: Instant,
}

/// Runs a synchronous detector on a worker thread behind the two-slot contract
pub struct ThreadedGateway {
    shape: [usize; 4],
    jobs: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    slots: [Option<InFlight>; 2],
}

impl ThreadedGateway {
    pub fn spawn<D: Detector + 'static>(mut detector: D) -> Result<Self, InferenceError> {
        let shape = detector.input_shape();
        let (jobs, queue) = channel::unbounded::<Job>();

        let worker = std::thread::Builder::new()
            .name("inference".to_string())
            .spawn(move || {
                debug!("Inference worker started ({})", detector.name());
                for job in queue {
                    let started = Instant::now();
                    let result = detector.infer(&job.tensor);
                    trace!(
                        "Slot {} inference finished in {:?}",
                        job.slot.name(),
                        started.elapsed()
                    );
                    // The requester may have abandoned the slot after a timeout
                    let _ = job.reply.send(result);
                }
                debug!("Inference worker stopped");
            })
            .map_err(|e| InferenceError::Initialization {
                details: format!("failed to spawn inference worker: {}", e),
            })?;

        Ok(Self {
            shape,
            jobs: Some(jobs),
            worker: Some(worker),
            slots: [None, None],
        })
    }
}

impl InferenceGateway for ThreadedGateway {
    fn input_shape(&self) -> [usize; 4] {
        self.shape
    }

    fn submit(&mut self, slot: RequestSlot, tensor: Tensor) -> Result<(), InferenceError> {
        if tensor.shape != self.shape {
            return Err(InferenceError::ShapeMismatch {
                expected: self.shape,
                actual: tensor.shape,
            });
        }
        if self.slots[slot.index()].is_some() {
            return Err(InferenceError::SlotBusy { slot: slot.name() });
        }

        let jobs = self.jobs.as_ref().ok_or(InferenceError::WorkerStopped)?;
        let (reply, receiver) = channel::bounded(1);
        jobs.send(Job {
            slot,
            tensor,
            reply,
        })
        .map_err(|_| InferenceError::WorkerStopped)?;

        self.slots[slot.index()] = Some(InFlight {
            reply: receiver,
            submitted: Instant::now(),
        });
        Ok(())
    }

    fn poll(&mut self, slot: RequestSlot) -> SlotStatus {
        let entry = &mut self.slots[slot.index()];
        let Some(in_flight) = entry.as_ref() else {
            return SlotStatus::Idle;
        };

        match in_flight.reply.try_recv() {
            Ok(result) => {
                *entry = None;
                match result {
                    Ok(detections) => SlotStatus::Ready(detections),
                    Err(e) => SlotStatus::Failed(e),
                }
            }
            Err(TryRecvError::Empty) => SlotStatus::Pending,
            Err(TryRecvError::Disconnected) => {
                *entry = None;
                SlotStatus::Failed(InferenceError::WorkerStopped)
            }
        }
    }

    fn wait(
        &mut self,
        slot: RequestSlot,
        timeout: Duration,
    ) -> Result<Vec<Detection>, InferenceError> {
        let in_flight = self.slots[slot.index()]
            .take()
            .ok_or(InferenceError::SlotIdle { slot: slot.name() })?;

        let deadline = in_flight.submitted + timeout;
        let remaining = deadline.saturating_duration_since(Instant::now());

        match in_flight.reply.recv_timeout(remaining) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(
                    "Inference request in slot {} timed out after {:?}",
                    slot.name(),
                    timeout
                );
                Err(InferenceError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                })
            }
            Err(RecvTimeoutError::Disconnected) => Err(InferenceError::WorkerStopped),
        }
    }

    fn is_busy(&self, slot: RequestSlot) -> bool {
        self.slots[slot.index()].is_some()
    }
}

impl Drop for ThreadedGateway {
    fn drop(&mut self) {
        // Closing the queue ends the worker loop
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                warn!("Inference worker panicked");
            }
        }
    }
}
