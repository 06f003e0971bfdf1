mod detector;
mod event;
mod log;
mod state;

pub use detector::{EventDetector, Intrusion};
pub use event::Event;
pub use log::{DataSummary, EventLogWriter};
pub use state::{LabelPhase, StreamState};
