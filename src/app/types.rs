use crate::scheduler::RunSummary;

/// Why the run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    /// Every source reached end of stream or failed
    EndOfStreams,
    Signal(String),
    UserRequest,
}

impl std::fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ShutdownReason::EndOfStreams => write!(f, "all streams ended"),
            ShutdownReason::Signal(signal) => write!(f, "received {}", signal),
            ShutdownReason::UserRequest => write!(f, "user request"),
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub summary: RunSummary,
    pub reason: ShutdownReason,
}
