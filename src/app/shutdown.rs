use super::ShutdownReason;
use crate::events::{EventBus, WatchEvent};
use crate::source::SourceInterrupt;
use chrono::Local;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Requests a shutdown from any thread or task
///
/// Cancels the scheduler loop and interrupts every push-source producer so
/// blocked reads return. Only the first request is recorded.
#[derive(Clone)]
pub struct ShutdownTrigger {
    token: CancellationToken,
    interrupts: Arc<Vec<SourceInterrupt>>,
    bus: EventBus,
    reason: Arc<Mutex<Option<ShutdownReason>>>,
}

impl ShutdownTrigger {
    pub fn new(token: CancellationToken, interrupts: Vec<SourceInterrupt>, bus: EventBus) -> Self {
        Self {
            token,
            interrupts: Arc::new(interrupts),
            bus,
            reason: Arc::new(Mutex::new(None)),
        }
    }

    pub fn trigger(&self, reason: ShutdownReason) {
        {
            let mut recorded = self.reason.lock();
            if recorded.is_some() {
                debug!("Shutdown already requested, ignoring {}", reason);
                return;
            }
            *recorded = Some(reason.clone());
        }

        info!("Shutdown initiated: {}", reason);
        self.token.cancel();
        for interrupt in self.interrupts.iter() {
            interrupt.interrupt();
        }

        self.bus.publish_lossy(WatchEvent::ShutdownRequested {
            reason: reason.to_string(),
            timestamp: Local::now(),
        });
    }

    pub fn is_triggered(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn reason(&self) -> Option<ShutdownReason> {
        self.reason.lock().clone()
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}
