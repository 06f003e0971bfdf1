use crate::error::SourceError;
use crate::frame::Frame;
use crate::source::FrameReader;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tracing::{debug, info, warn};

/// How a consumer waits for a published frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadPolicy {
    /// Block until a frame newer than the last one returned is published
    Fresh,
    /// Return whatever is published right now
    Latest,
    /// Block until `sequence` is published; on timeout return the best frame marked stale
    Until {
        sequence: u64,
        timeout: Option<Duration>,
    },
}

/// Result of a consumer read
#[derive(Debug, Clone)]
pub enum ReadOutcome {
    Frame { frame: Frame, stale: bool },
    /// Nothing has been published yet
    Pending,
    EndOfStream,
}

#[derive(Default)]
struct Published {
    frame: Option<Frame>,
    sequence: u64,
    ended: bool,
}

struct Shared {
    state: Mutex<Published>,
    ready: Condvar,
    running: AtomicBool,
}

impl Shared {
    fn interrupt(&self) {
        self.running.store(false, Ordering::Release);
        // Take the lock so a consumer between its check and its wait cannot miss the wakeup
        let _guard = self.state.lock();
        self.ready.notify_all();
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Cloneable handle that stops a producer from any thread
#[derive(Clone)]
pub struct SourceInterrupt {
    shared: Arc<Shared>,
}

impl SourceInterrupt {
    /// Ask the producer to stop and wake every blocked consumer
    pub fn interrupt(&self) {
        self.shared.interrupt();
    }

    pub fn is_interrupted(&self) -> bool {
        !self.shared.is_running()
    }
}

/// Background thread that keeps the newest decoded frame of a live source
pub struct FreshFrameProducer {
    name: String,
    shared: Arc<Shared>,
    handle: Option<JoinHandle<Box<dyn FrameReader>>>,
}

impl FreshFrameProducer {
    /// Start the producer thread; it owns `reader` until `stop` joins it
    pub fn spawn(
        name: &str,
        source: usize,
        mut reader: Box<dyn FrameReader>,
    ) -> Result<Self, SourceError> {
        let shared = Arc::new(Shared {
            state: Mutex::new(Published::default()),
            ready: Condvar::new(),
            running: AtomicBool::new(true),
        });

        let thread_shared = Arc::clone(&shared);
        let thread_name = name.to_string();
        let handle = std::thread::Builder::new()
            .name(format!("fresh-{}", source))
            .spawn(move || {
                let mut counter = 0u64;

                while thread_shared.is_running() {
                    match reader.read() {
                        Ok(Some(image)) => {
                            counter += 1;
                            let frame = Frame::new(counter, source, image);

                            let mut state = thread_shared.state.lock();
                            state.frame = Some(frame);
                            state.sequence = counter;
                            drop(state);
                            thread_shared.ready.notify_all();
                        }
                        Ok(None) => {
                            info!("Source '{}' reached end of stream", thread_name);
                            break;
                        }
                        Err(e) => {
                            warn!("Source '{}' read failed: {}", thread_name, e);
                            break;
                        }
                    }
                }

                let mut state = thread_shared.state.lock();
                state.ended = true;
                drop(state);
                thread_shared.ready.notify_all();

                debug!(
                    "Producer for '{}' exiting after {} frames",
                    thread_name, counter
                );
                reader
            })
            .map_err(|e| SourceError::Open {
                input: name.to_string(),
                details: format!("failed to spawn producer thread: {}", e),
            })?;

        Ok(Self {
            name: name.to_string(),
            shared,
            handle: Some(handle),
        })
    }

    pub fn interrupt_handle(&self) -> SourceInterrupt {
        SourceInterrupt {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Read on behalf of a consumer whose last returned frame was `last_seen`
    pub fn read(&self, policy: ReadPolicy, last_seen: u64) -> ReadOutcome {
        let shared = &self.shared;
        let mut state = shared.state.lock();

        match policy {
            ReadPolicy::Fresh => {
                shared.ready.wait_while(&mut state, |s| {
                    s.sequence <= last_seen && !s.ended && shared.is_running()
                });

                match &state.frame {
                    Some(frame) if state.sequence > last_seen => ReadOutcome::Frame {
                        frame: frame.clone(),
                        stale: false,
                    },
                    _ => ReadOutcome::EndOfStream,
                }
            }
            ReadPolicy::Latest => match &state.frame {
                Some(frame) if state.sequence > last_seen => ReadOutcome::Frame {
                    frame: frame.clone(),
                    stale: false,
                },
                _ if state.ended || !shared.is_running() => ReadOutcome::EndOfStream,
                Some(frame) => ReadOutcome::Frame {
                    frame: frame.clone(),
                    stale: true,
                },
                None => ReadOutcome::Pending,
            },
            ReadPolicy::Until { sequence, timeout } => {
                let target = sequence.max(1);
                let waiting =
                    |s: &mut Published| s.sequence < target && !s.ended && shared.is_running();

                match timeout {
                    Some(timeout) => {
                        shared.ready.wait_while_for(&mut state, waiting, timeout);
                    }
                    None => shared.ready.wait_while(&mut state, waiting),
                }

                match &state.frame {
                    Some(frame) if state.sequence >= target => ReadOutcome::Frame {
                        frame: frame.clone(),
                        stale: false,
                    },
                    Some(frame) if state.sequence > last_seen => ReadOutcome::Frame {
                        frame: frame.clone(),
                        stale: true,
                    },
                    _ if state.ended || !shared.is_running() => ReadOutcome::EndOfStream,
                    Some(frame) => ReadOutcome::Frame {
                        frame: frame.clone(),
                        stale: true,
                    },
                    None => ReadOutcome::Pending,
                }
            }
        }
    }

    /// Signal the producer and join it, handing back the decoder for release
    pub fn stop(&mut self) -> Result<Box<dyn FrameReader>, SourceError> {
        self.shared.interrupt();

        let handle = self
            .handle
            .take()
            .ok_or_else(|| SourceError::ProducerPanicked {
                name: self.name.clone(),
            })?;

        handle.join().map_err(|_| SourceError::ProducerPanicked {
            name: self.name.clone(),
        })
    }
}

impl Drop for FreshFrameProducer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            self.shared.interrupt();
            if let Ok(mut reader) = handle.join() {
                reader.release();
            }
        }
    }
}
