use thiserror::Error;

#[derive(Error, Debug)]
pub enum WatchError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Missing resource {resource}: {details}")]
    MissingResource { resource: String, details: String },

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Inference error: {0}")]
    Inference(#[from] InferenceError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("Event bus error: {0}")]
    EventBus(#[from] EventBusError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("System error: {message}")]
    System { message: String },
}

/// Frame source errors
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Source '{input}' not found")]
    NotFound { input: String },

    #[error("Failed to open source '{input}': {details}")]
    Open { input: String, details: String },

    #[error("Source '{input}' is not supported: {details}")]
    Unsupported { input: String, details: String },

    #[error("Frame read failed: {details}")]
    Read { details: String },

    #[error("Rewind failed: {details}")]
    Rewind { details: String },

    #[error("Producer thread for '{name}' panicked")]
    ProducerPanicked { name: String },
}

/// Inference gateway errors
#[derive(Error, Debug, Clone)]
pub enum InferenceError {
    #[error("Failed to initialize detector: {details}")]
    Initialization { details: String },

    #[error("Request slot {slot} already has a request in flight")]
    SlotBusy { slot: &'static str },

    #[error("Request slot {slot} has no request in flight")]
    SlotIdle { slot: &'static str },

    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Inference engine failure: {details}")]
    Engine { details: String },

    #[error("Tensor shape mismatch: expected {expected:?}, got {actual:?}")]
    ShapeMismatch { expected: [usize; 4], actual: [usize; 4] },

    #[error("Inference worker has stopped")]
    WorkerStopped,
}

/// Event log persistence errors
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Could not write {path}: {details}")]
    Write { path: String, details: String },

    #[error("Could not read {path}: {details}")]
    Read { path: String, details: String },

    #[error("Could not encode event log: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Could not save snapshot {path}: {details}")]
    Snapshot { path: String, details: String },
}

/// Event bus errors
#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Receiver lagged behind by {skipped} events")]
    Lagged { skipped: u64 },

    #[error("Event bus channel closed")]
    ChannelClosed,
}

/// Alert delivery errors
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Failed to render alert image: {details}")]
    Render { details: String },

    #[error("Alert delivery failed: {details}")]
    Delivery { details: String },
}

/// Coarse failure categories used for the process exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCategory {
    Success,
    Configuration,
    MissingResource,
    Persistence,
    Runtime,
}

impl ExitCategory {
    pub fn exit_code(self) -> i32 {
        match self {
            ExitCategory::Success => 0,
            ExitCategory::Runtime => 1,
            ExitCategory::Configuration => 2,
            ExitCategory::MissingResource => 3,
            ExitCategory::Persistence => 4,
        }
    }
}

impl WatchError {
    pub fn invalid_config<S: Into<String>>(message: S) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    pub fn missing_resource<S: Into<String>>(resource: S, details: S) -> Self {
        Self::MissingResource {
            resource: resource.into(),
            details: details.into(),
        }
    }

    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    /// Map the error onto the failure category reported at exit
    pub fn category(&self) -> ExitCategory {
        match self {
            WatchError::Config(_) | WatchError::InvalidConfig { .. } => ExitCategory::Configuration,
            WatchError::Source(SourceError::NotFound { .. })
            | WatchError::Source(SourceError::Unsupported { .. }) => ExitCategory::Configuration,
            WatchError::MissingResource { .. }
            | WatchError::Source(SourceError::Open { .. })
            | WatchError::Inference(InferenceError::Initialization { .. }) => {
                ExitCategory::MissingResource
            }
            WatchError::Persistence(_) => ExitCategory::Persistence,
            _ => ExitCategory::Runtime,
        }
    }
}

pub type Result<T> = std::result::Result<T, WatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(
            WatchError::invalid_config("no sources").category(),
            ExitCategory::Configuration
        );
        assert_eq!(
            WatchError::from(SourceError::NotFound {
                input: "missing.mp4".to_string()
            })
            .category(),
            ExitCategory::Configuration
        );
        assert_eq!(
            WatchError::from(SourceError::Open {
                input: "rtsp://cam".to_string(),
                details: "refused".to_string()
            })
            .category(),
            ExitCategory::MissingResource
        );
        assert_eq!(
            WatchError::from(InferenceError::Initialization {
                details: "bad model".to_string()
            })
            .category(),
            ExitCategory::MissingResource
        );
        assert_eq!(
            WatchError::from(PersistenceError::Write {
                path: "events.json".to_string(),
                details: "read-only".to_string()
            })
            .category(),
            ExitCategory::Persistence
        );
        assert_eq!(
            WatchError::system("unexpected").category(),
            ExitCategory::Runtime
        );
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            ExitCategory::Success.exit_code(),
            ExitCategory::Runtime.exit_code(),
            ExitCategory::Configuration.exit_code(),
            ExitCategory::MissingResource.exit_code(),
            ExitCategory::Persistence.exit_code(),
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in codes.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
        assert_eq!(ExitCategory::Success.exit_code(), 0);
    }
}
