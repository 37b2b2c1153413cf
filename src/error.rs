use thiserror::Error;

/// Errors that stop a broadcast before any message is sent.
///
/// Per-recipient delivery failures never surface here; they are counted in
/// the job result and listed in the report.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BroadcastError {
    #[error("no workers available for broadcasting")]
    NoWorkersAvailable,

    #[error("invalid worker count: {0}")]
    InvalidWorkerCount(usize),

    #[error("broadcast message is empty")]
    EmptyMessage,

    #[error("broadcast message is {len} characters long, the limit is {max}")]
    MessageTooLong { len: usize, max: usize },

    #[error("no pending broadcast for requester {0}")]
    NoPendingRequest(String),

    #[error("pending broadcast for requester {0} has no recipients selected")]
    NoRecipientsSelected(String),
}

impl BroadcastError {
    /// Precondition failures abort the job without partial execution.
    pub fn is_fatal_precondition(&self) -> bool {
        matches!(self, Self::NoWorkersAvailable | Self::InvalidWorkerCount(_))
    }
}
