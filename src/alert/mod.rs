//! Fire-and-forget alert delivery for confirmed intrusions

mod dispatcher;
mod sink;

pub use dispatcher::AlertDispatcher;
pub use sink::{Alert, AlertSink, LogAlertSink, WebhookAlertSink};
