use super::{RunOutcome, ShutdownReason, ShutdownTrigger, WatchApp};
use crate::error::{Result, WatchError};
use std::time::Duration;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const ALERT_GRACE: Duration = Duration::from_secs(5);

impl WatchApp {
    /// Run until every source is exhausted or a termination signal arrives
    ///
    /// The scheduler runs on a blocking thread. On the way out producers are
    /// stopped, event logs flushed and decoders released, in that order.
    pub async fn run(mut self) -> Result<RunOutcome> {
        let mut scheduler = self
            .scheduler
            .take()
            .ok_or_else(|| WatchError::system("Application already ran"))?;

        let alert_cancel = CancellationToken::new();
        let alert_listener = self
            .alerts
            .clone()
            .map(|dispatcher| dispatcher.spawn(&self.bus, alert_cancel.clone()));

        Self::setup_signal_handlers(self.shutdown.clone());

        info!("Intruder watch is running");
        let writer = self.writer.clone();
        let (summary, shutdown_result) = tokio::task::spawn_blocking(move || {
            let summary = scheduler.run();
            let shutdown_result = scheduler.shutdown(&writer);
            (summary, shutdown_result)
        })
        .await
        .map_err(|e| WatchError::system(format!("scheduler thread failed: {}", e)))?;

        // Lets the signal listeners exit; the recorded reason is left untouched
        self.shutdown.token().cancel();

        // Stop listening only after the scheduler published its last events
        alert_cancel.cancel();
        if let Some(listener) = alert_listener {
            if let Err(e) = listener.await {
                warn!("Alert dispatcher ended abnormally: {}", e);
            }
        }
        if let Some(dispatcher) = self.alerts.clone() {
            dispatcher.settle(ALERT_GRACE).await;
        }

        shutdown_result?;

        let reason = self
            .shutdown
            .reason()
            .unwrap_or(ShutdownReason::EndOfStreams);
        info!(
            "Intruder watch stopped ({}): {} ticks, {} events",
            reason, summary.ticks, summary.events
        );
        Ok(RunOutcome { summary, reason })
    }

    /// Set up signal handlers for graceful shutdown
    fn setup_signal_handlers(shutdown: ShutdownTrigger) {
        // Handle SIGTERM - Unix only
        #[cfg(unix)]
        {
            let shutdown_sigterm = shutdown.clone();
            tokio::spawn(async move {
                let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                    Ok(sigterm) => sigterm,
                    Err(e) => {
                        warn!("Failed to register SIGTERM handler: {}", e);
                        return;
                    }
                };
                tokio::select! {
                    received = sigterm.recv() => {
                        if received.is_some() {
                            info!("Received SIGTERM signal");
                            shutdown_sigterm.trigger(ShutdownReason::Signal("SIGTERM".to_string()));
                        }
                    }
                    _ = shutdown_sigterm.token().cancelled() => {}
                }
            });
        }

        // Handle SIGINT (Ctrl+C) - Cross-platform
        tokio::spawn(async move {
            tokio::select! {
                received = signal::ctrl_c() => {
                    if received.is_ok() {
                        info!("Received SIGINT signal (Ctrl+C)");
                        shutdown.trigger(ShutdownReason::Signal("SIGINT".to_string()));
                    }
                }
                _ = shutdown.token().cancelled() => {}
            }
        });
    }
}
