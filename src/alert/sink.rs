use crate::error::AlertError;
use chrono::{DateTime, Local};
use std::time::Duration;
use tracing::{debug, info};

/// A rendered alert ready for delivery
#[derive(Debug, Clone)]
pub struct Alert {
    pub source_name: String,
    pub label: String,
    /// Number of newly appeared objects
    pub count: u32,
    pub total: u32,
    pub message: String,
    /// Annotated and captioned frame
    pub jpeg: Vec<u8>,
    pub timestamp: DateTime<Local>,
}

/// Destination for intrusion alerts
#[async_trait::async_trait]
pub trait AlertSink: Send + Sync {
    /// Get the name of this sink for logging
    fn sink_name(&self) -> &str;

    async fn deliver(&self, alert: &Alert) -> Result<(), AlertError>;
}

/// Writes alerts to the application log
pub struct LogAlertSink;

#[async_trait::async_trait]
impl AlertSink for LogAlertSink {
    fn sink_name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), AlertError> {
        info!(
            "ALERT {} ({} new {}, total {}, {} byte image)",
            alert.message,
            alert.count,
            alert.label,
            alert.total,
            alert.jpeg.len()
        );
        Ok(())
    }
}

/// Posts the alert image to an HTTP endpoint
pub struct WebhookAlertSink {
    url: String,
    timeout: Duration,
}

impl WebhookAlertSink {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait::async_trait]
impl AlertSink for WebhookAlertSink {
    fn sink_name(&self) -> &str {
        "webhook"
    }

    async fn deliver(&self, alert: &Alert) -> Result<(), AlertError> {
        let url = self.url.clone();
        let timeout = self.timeout;
        let count = alert.count.to_string();
        let message = alert.message.clone();
        let jpeg = alert.jpeg.clone();

        // ureq is blocking
        let status = tokio::task::spawn_blocking(move || {
            ureq::post(&url)
                .timeout(timeout)
                .query("count", &count)
                .query("message", &message)
                .set("Content-Type", "image/jpeg")
                .send_bytes(&jpeg)
                .map(|response| response.status())
                .map_err(|e| AlertError::Delivery {
                    details: e.to_string(),
                })
        })
        .await
        .map_err(|e| AlertError::Delivery {
            details: format!("webhook task failed: {}", e),
        })??;

        debug!("Webhook {} answered {}", self.url, status);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alert() -> Alert {
        Alert {
            source_name: "Front".to_string(),
            label: "person".to_string(),
            count: 1,
            total: 4,
            message: "Intruder detected at 2024-05-01 12:03:44 UTC".to_string(),
            jpeg: vec![0xFF, 0xD8, 0xFF, 0xD9],
            timestamp: Local::now(),
        }
    }

    #[tokio::test]
    async fn test_log_sink_always_succeeds() {
        assert!(LogAlertSink.deliver(&alert()).await.is_ok());
    }

    #[tokio::test]
    async fn test_webhook_failure_is_reported() {
        // Nothing listens on port 9 of localhost
        let sink = WebhookAlertSink::new("http://127.0.0.1:9/alert")
            .with_timeout(Duration::from_millis(500));
        assert_eq!(sink.sink_name(), "webhook");

        let result = sink.deliver(&alert()).await;
        assert!(matches!(result, Err(AlertError::Delivery { .. })));
    }
}
