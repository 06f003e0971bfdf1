pub mod alert;
pub mod analyzer;
pub mod app;
pub mod capture;
pub mod config;
pub mod error;
pub mod events;
pub mod frame;
pub mod inference;
pub mod labels;
pub mod scheduler;
pub mod source;
pub mod tracking;

pub use alert::{Alert, AlertDispatcher, AlertSink, LogAlertSink, WebhookAlertSink};
pub use analyzer::MotionFilter;
pub use app::{RunOutcome, ShutdownReason, ShutdownTrigger, WatchApp};
pub use capture::{CaptionRenderer, SnapshotStore};
pub use config::{ChannelOrder, SchedulerMode, WatchConfig};
pub use error::{ExitCategory, Result, WatchError};
pub use events::{EventBus, EventFilter, EventReceiver, WatchEvent};
pub use frame::{Frame, Preprocessor, Tensor};
pub use inference::{Detection, Detector, InferenceGateway, RequestSlot, ThreadedGateway};
pub use labels::LabelSet;
pub use scheduler::{RunSummary, StreamScheduler, SubmissionStrategy};
pub use source::{FrameReader, FrameSource, SourceDescriptor};
pub use tracking::{Event, EventDetector, EventLogWriter, StreamState};
