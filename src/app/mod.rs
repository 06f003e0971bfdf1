mod orchestrator;
mod runtime;
mod shutdown;
mod types;

#[cfg(test)]
mod tests;

pub use orchestrator::WatchApp;
pub use shutdown::ShutdownTrigger;
pub use types::{RunOutcome, ShutdownReason};
