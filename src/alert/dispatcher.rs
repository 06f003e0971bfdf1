use crate::alert::{Alert, AlertSink, LogAlertSink, WebhookAlertSink};
use crate::capture::{annotate, encode_jpeg, CaptionRenderer};
use crate::config::AlertConfig;
use crate::error::{AlertError, EventBusError, Result};
use crate::events::{EventBus, EventFilter, EventReceiver, WatchEvent};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Turns confirmed intrusions into detached alert deliveries
#[derive(Clone)]
pub struct AlertDispatcher {
    renderer: Arc<CaptionRenderer>,
    sinks: Arc<Vec<Arc<dyn AlertSink>>>,
    in_flight: Arc<AtomicUsize>,
}

impl AlertDispatcher {
    pub fn new(renderer: CaptionRenderer, sinks: Vec<Arc<dyn AlertSink>>) -> Self {
        Self {
            renderer: Arc::new(renderer),
            sinks: Arc::new(sinks),
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Log sink always, webhook sink when a URL is configured
    pub fn from_config(config: &AlertConfig) -> Result<Self> {
        let renderer = CaptionRenderer::from_config(config)?;

        let mut sinks: Vec<Arc<dyn AlertSink>> = vec![Arc::new(LogAlertSink)];
        if let Some(url) = &config.webhook_url {
            info!("Alerts will be posted to {}", url);
            sinks.push(Arc::new(WebhookAlertSink::new(url.clone())));
        }

        Ok(Self::new(renderer, sinks))
    }

    /// Number of alerts still being rendered or delivered
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Spawn a detached delivery task for an intrusion event
    ///
    /// Must be called from within a tokio runtime. Returns `None` for events
    /// that do not produce alerts.
    pub fn dispatch(&self, event: WatchEvent) -> Option<JoinHandle<()>> {
        let WatchEvent::IntrusionConfirmed {
            id,
            source_name,
            label,
            increase,
            total,
            image,
            detections,
            timestamp,
            ..
        } = event
        else {
            return None;
        };

        let renderer = self.renderer.clone();
        let sinks = self.sinks.clone();
        let in_flight = self.in_flight.clone();
        in_flight.fetch_add(1, Ordering::AcqRel);

        Some(tokio::spawn(async move {
            let rendered = tokio::task::spawn_blocking(move || {
                let annotated = annotate(&image, &detections);
                let captioned = renderer.render(&annotated, timestamp);
                let message = renderer.caption_text(timestamp);
                encode_jpeg(&captioned).map(|jpeg| (message, jpeg))
            })
            .await
            .map_err(|e| AlertError::Render {
                details: e.to_string(),
            })
            .and_then(|rendered| rendered);

            match rendered {
                Ok((message, jpeg)) => {
                    let alert = Alert {
                        source_name,
                        label,
                        count: increase,
                        total,
                        message,
                        jpeg,
                        timestamp,
                    };
                    for sink in sinks.iter() {
                        match sink.deliver(&alert).await {
                            Ok(()) => debug!("Alert {} delivered via {}", id, sink.sink_name()),
                            Err(e) => warn!(
                                "Alert {} delivery via {} failed: {}",
                                id,
                                sink.sink_name(),
                                e
                            ),
                        }
                    }
                }
                Err(e) => warn!("Alert {} could not be rendered: {}", id, e),
            }

            in_flight.fetch_sub(1, Ordering::AcqRel);
        }))
    }

    /// Listen on the bus until cancelled or the bus closes
    pub fn spawn(self, bus: &EventBus, cancel: CancellationToken) -> JoinHandle<()> {
        let mut receiver = EventReceiver::new(
            bus.subscribe(),
            EventFilter::EventTypes(vec!["intrusion_confirmed"]),
            "alert-dispatcher",
        );

        tokio::spawn(async move {
            info!("Alert dispatcher started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = receiver.recv() => match received {
                        Ok(event) => {
                            // Detached: the listener never waits on delivery
                            let _ = self.dispatch(event);
                        }
                        Err(EventBusError::Lagged { .. }) => continue,
                        Err(_) => break,
                    },
                }
            }

            // Pick up intrusions published just before shutdown
            while let Ok(Some(event)) = receiver.try_recv() {
                let _ = self.dispatch(event);
            }
            info!("Alert dispatcher stopped");
        })
    }

    /// Wait until pending deliveries finish or `timeout` elapses
    pub async fn settle(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.in_flight() > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!("{} alerts still in flight at shutdown", self.in_flight());
                return false;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        true
    }
}
