use crate::config::{SchedulerConfig, SourceConfig};
use crate::error::SourceError;
use crate::frame::Frame;
use crate::source::{
    open_reader, FrameReader, FreshFrameProducer, ReadOutcome, ReadPolicy, SourceDescriptor,
    SourceInterrupt,
};
use std::time::Duration;
use tracing::{debug, info, warn};

enum Backend {
    /// Frames decoded synchronously on the caller's thread
    Pull(Box<dyn FrameReader>),
    /// Frames published by a background producer
    Push(FreshFrameProducer),
    /// Producer joined; decoder waiting for release (None once released)
    Stopped(Option<Box<dyn FrameReader>>),
}

/// One configured capture source and its consumer-side read state
pub struct FrameSource {
    index: usize,
    name: String,
    descriptor: SourceDescriptor,
    fps: f64,
    loop_video: bool,
    backend: Backend,
    /// Last sequence handed to the consumer
    last_seen: u64,
    /// Sequence counter for pull reads
    pull_sequence: u64,
}

impl FrameSource {
    /// Parse the descriptor, open its decoder and start a producer for push sources
    pub fn open(
        index: usize,
        name: String,
        config: &SourceConfig,
        scheduler: &SchedulerConfig,
    ) -> Result<Self, SourceError> {
        let descriptor = SourceDescriptor::parse(&config.input)?;
        let reader = open_reader(&descriptor, config.fps)?;
        let loop_video = config.loop_video.unwrap_or(scheduler.loop_video);

        Self::from_reader(
            index,
            name,
            descriptor,
            reader,
            config.fps,
            scheduler.default_fps,
            loop_video,
        )
    }

    /// Build a source around an already opened decoder
    pub fn from_reader(
        index: usize,
        name: String,
        descriptor: SourceDescriptor,
        reader: Box<dyn FrameReader>,
        fps_override: Option<f64>,
        default_fps: f64,
        loop_video: bool,
    ) -> Result<Self, SourceError> {
        let fps = fps_override
            .or_else(|| reader.fps())
            .filter(|fps| *fps > 0.0)
            .unwrap_or(default_fps);

        let (width, height) = reader.dimensions();
        info!(
            "Source {} '{}' ({}): {}x{} @ {:.2}fps{}",
            index,
            name,
            descriptor,
            width,
            height,
            fps,
            if descriptor.is_push() { ", push" } else { "" }
        );

        if loop_video && descriptor.is_live() {
            debug!("Ignoring loop setting for live source '{}'", name);
        }

        let backend = if descriptor.is_push() {
            Backend::Push(FreshFrameProducer::spawn(&name, index, reader)?)
        } else {
            Backend::Pull(reader)
        };

        Ok(Self {
            index,
            name,
            descriptor,
            fps,
            loop_video,
            backend,
            last_seen: 0,
            pull_sequence: 0,
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Native frame rate used for tick normalisation
    pub fn fps(&self) -> f64 {
        self.fps
    }

    pub fn is_push(&self) -> bool {
        matches!(self.backend, Backend::Push(_))
    }

    /// Sequence of the last frame returned to the consumer
    pub fn last_seen(&self) -> u64 {
        self.last_seen
    }

    /// Handle for interrupting a push producer from another thread
    pub fn interrupt_handle(&self) -> Option<SourceInterrupt> {
        match &self.backend {
            Backend::Push(producer) => Some(producer.interrupt_handle()),
            _ => None,
        }
    }

    /// Read one frame with the given policy
    pub fn read(&mut self, policy: ReadPolicy) -> Result<ReadOutcome, SourceError> {
        let outcome = if matches!(self.backend, Backend::Pull(_)) {
            self.read_pull()?
        } else if let Backend::Push(producer) = &self.backend {
            producer.read(policy, self.last_seen)
        } else {
            ReadOutcome::EndOfStream
        };

        if let ReadOutcome::Frame { frame, .. } = &outcome {
            self.last_seen = self.last_seen.max(frame.sequence);
        }
        Ok(outcome)
    }

    /// Advance by `steps` physical frames and return the last one read
    ///
    /// Pull sources decode and drop the intermediate frames. Push sources wait
    /// until the producer has published `steps` frames past the last one seen,
    /// bounded by `timeout` when given.
    pub fn advance(
        &mut self,
        steps: u32,
        timeout: Option<Duration>,
    ) -> Result<ReadOutcome, SourceError> {
        let steps = steps.max(1);

        if matches!(self.backend, Backend::Push(_)) {
            let policy = if steps == 1 && timeout.is_none() {
                ReadPolicy::Fresh
            } else {
                ReadPolicy::Until {
                    sequence: self.last_seen + steps as u64,
                    timeout,
                }
            };
            return self.read(policy);
        }

        let mut last = None;
        for _ in 0..steps {
            match self.read(ReadPolicy::Fresh)? {
                ReadOutcome::Frame { frame, .. } => last = Some(frame),
                _ => break,
            }
        }

        Ok(match last {
            Some(frame) => ReadOutcome::Frame {
                frame,
                stale: false,
            },
            None => ReadOutcome::EndOfStream,
        })
    }

    fn read_pull(&mut self) -> Result<ReadOutcome, SourceError> {
        let Backend::Pull(reader) = &mut self.backend else {
            return Ok(ReadOutcome::EndOfStream);
        };

        let image = match reader.read()? {
            Some(image) => Some(image),
            None if self.loop_video && !self.descriptor.is_live() => {
                debug!("Source '{}' reached end, rewinding", self.name);
                reader.rewind()?;
                reader.read()?
            }
            None => None,
        };

        Ok(match image {
            Some(image) => {
                self.pull_sequence += 1;
                ReadOutcome::Frame {
                    frame: Frame::new(self.pull_sequence, self.index, image),
                    stale: false,
                }
            }
            None => {
                info!("Source '{}' reached end of stream", self.name);
                ReadOutcome::EndOfStream
            }
        })
    }

    /// Stop the producer thread (signal, then join); pull sources have nothing to stop
    pub fn stop(&mut self) -> Result<(), SourceError> {
        if let Backend::Push(producer) = &mut self.backend {
            debug!("Stopping producer for '{}'", self.name);
            match producer.stop() {
                Ok(reader) => {
                    self.backend = Backend::Stopped(Some(reader));
                }
                Err(e) => {
                    self.backend = Backend::Stopped(None);
                    return Err(e);
                }
            }
        }
        Ok(())
    }

    /// Whether `release` may run without racing a producer thread
    pub fn is_stopped(&self) -> bool {
        !matches!(self.backend, Backend::Push(_))
    }

    /// Release the decoder handle; a running producer is stopped first
    pub fn release(&mut self) {
        if !self.is_stopped() {
            warn!(
                "Releasing source '{}' with a running producer, stopping it first",
                self.name
            );
            if let Err(e) = self.stop() {
                warn!("Failed to stop producer for '{}': {}", self.name, e);
                return;
            }
        }

        match std::mem::replace(&mut self.backend, Backend::Stopped(None)) {
            Backend::Pull(mut reader) | Backend::Stopped(Some(mut reader)) => {
                reader.release();
                debug!("Released decoder for '{}'", self.name);
            }
            Backend::Stopped(None) | Backend::Push(_) => {}
        }
    }
}
