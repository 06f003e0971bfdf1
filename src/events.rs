use crate::error::EventBusError;
use crate::inference::Detection;
use chrono::{DateTime, Local};
use image::RgbImage;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Events published by the scheduler for downstream sinks
#[derive(Debug, Clone)]
pub enum WatchEvent {
    /// A label's confirmed count increased on a source
    IntrusionConfirmed {
        id: Uuid,
        source: usize,
        source_name: String,
        label: String,
        /// Number of newly appeared objects
        increase: u32,
        /// Source total after the increase
        total: u32,
        frame_index: u64,
        /// Frame that triggered the confirmation
        image: Arc<RgbImage>,
        /// Detections counted on that frame
        detections: Vec<Detection>,
        timestamp: DateTime<Local>,
    },
    /// A source ran out of frames or failed permanently
    SourceExhausted {
        source: usize,
        source_name: String,
        timestamp: DateTime<Local>,
    },
    /// An inference request failed or timed out; the tick saw no detections
    InferenceDegraded {
        source_name: String,
        reason: String,
        timestamp: DateTime<Local>,
    },
    /// System shutdown requested
    ShutdownRequested {
        reason: String,
        timestamp: DateTime<Local>,
    },
}

impl WatchEvent {
    #[allow(clippy::too_many_arguments)]
    pub fn intrusion(
        source: usize,
        source_name: &str,
        label: &str,
        increase: u32,
        total: u32,
        frame_index: u64,
        image: Arc<RgbImage>,
        detections: Vec<Detection>,
        timestamp: DateTime<Local>,
    ) -> Self {
        WatchEvent::IntrusionConfirmed {
            id: Uuid::new_v4(),
            source,
            source_name: source_name.to_string(),
            label: label.to_string(),
            increase,
            total,
            frame_index,
            image,
            detections,
            timestamp,
        }
    }

    /// Get the timestamp of the event
    pub fn timestamp(&self) -> DateTime<Local> {
        match self {
            WatchEvent::IntrusionConfirmed { timestamp, .. } => *timestamp,
            WatchEvent::SourceExhausted { timestamp, .. } => *timestamp,
            WatchEvent::InferenceDegraded { timestamp, .. } => *timestamp,
            WatchEvent::ShutdownRequested { timestamp, .. } => *timestamp,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            WatchEvent::IntrusionConfirmed {
                source_name,
                label,
                increase,
                total,
                ..
            } => format!(
                "{} new {} on {} (total {})",
                increase, label, source_name, total
            ),
            WatchEvent::SourceExhausted { source_name, .. } => {
                format!("Source {} exhausted", source_name)
            }
            WatchEvent::InferenceDegraded {
                source_name,
                reason,
                ..
            } => format!("Inference degraded on {}: {}", source_name, reason),
            WatchEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            WatchEvent::IntrusionConfirmed { .. } => "intrusion_confirmed",
            WatchEvent::SourceExhausted { .. } => "source_exhausted",
            WatchEvent::InferenceDegraded { .. } => "inference_degraded",
            WatchEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Broadcast bus between the scheduler and its sinks
///
/// Publishing never blocks, so the scheduler thread can publish without a
/// runtime handle. Slow subscribers lose the oldest events.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<WatchEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers, returning how many received it
    pub fn publish(&self, event: WatchEvent) -> Result<usize, EventBusError> {
        match &event {
            WatchEvent::SourceExhausted { source_name, .. } => {
                info!("Source {} exhausted", source_name);
            }
            WatchEvent::InferenceDegraded {
                source_name,
                reason,
                ..
            } => {
                warn!("Inference degraded on {}: {}", source_name, reason);
            }
            WatchEvent::ShutdownRequested { reason, .. } => {
                info!("Shutdown requested: {}", reason);
            }
            WatchEvent::IntrusionConfirmed { .. } => {
                debug!("Publishing event: {}", event.description());
            }
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    /// Publish, treating "nobody is listening" as a non-event
    pub fn publish_lossy(&self, event: WatchEvent) {
        if let Err(e) = self.publish(event) {
            debug!("Event dropped: {}", e);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    All,
    EventTypes(Vec<&'static str>),
    /// Events concerning the named sources
    Sources(Vec<String>),
    Custom(fn(&WatchEvent) -> bool),
}

impl EventFilter {
    pub fn matches(&self, event: &WatchEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Sources(sources) => match event {
                WatchEvent::IntrusionConfirmed { source_name, .. }
                | WatchEvent::SourceExhausted { source_name, .. }
                | WatchEvent::InferenceDegraded { source_name, .. } => {
                    sources.contains(source_name)
                }
                WatchEvent::ShutdownRequested { .. } => false,
            },
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Named, filtered view of the bus
pub struct EventReceiver {
    receiver: broadcast::Receiver<WatchEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(
        receiver: broadcast::Receiver<WatchEvent>,
        filter: EventFilter,
        name: impl Into<String>,
    ) -> Self {
        Self {
            receiver,
            filter,
            name: name.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Receive the next event that passes the filter
    pub async fn recv(&mut self) -> Result<WatchEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<WatchEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::Lagged { skipped: n });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}
