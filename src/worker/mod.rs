pub mod pool;
pub mod sim;

use crate::job::{Recipient, RecipientId};
use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

pub use pool::WorkerPool;
pub use sim::{Roster, SimOutcome, SimulatedWorker};

/// A transport-level delivery failure as reported by a worker.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SendError {
    /// The platform rejected the request with a numeric error code.
    #[error("platform error {code}: {message}")]
    Platform { code: u32, message: String },

    #[error("{0}")]
    Transport(String),
}

/// Outcome of turning a recipient id into something a worker can send to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution<T> {
    Found(T),
    NotFound,
}

/// One authenticated delivery connection.
///
/// Resolution goes cache, then fetch, then the identity embedded in the
/// recipient record. Implementors normally only provide the three hooks and
/// keep the default `resolve_sendable`.
#[async_trait]
pub trait Worker: Send + Sync {
    type Sendable: Send + Sync + 'static;

    /// Stable identity. Workers with an empty id are refused by the pool.
    fn id(&self) -> &str;

    /// Human-readable name for logs and report footers.
    fn tag(&self) -> String {
        self.id().to_string()
    }

    fn cached(&self, recipient: &RecipientId) -> Option<Self::Sendable>;

    async fn fetch(&self, recipient: &RecipientId) -> Result<Self::Sendable, SendError>;

    fn embedded(&self, _recipient: &Recipient) -> Option<Self::Sendable> {
        None
    }

    async fn resolve_sendable(&self, recipient: &Recipient) -> Resolution<Self::Sendable> {
        if let Some(target) = self.cached(&recipient.id) {
            return Resolution::Found(target);
        }
        match self.fetch(&recipient.id).await {
            Ok(target) => return Resolution::Found(target),
            Err(err) => {
                debug!(
                    "worker {} could not fetch recipient {}: {err}",
                    self.tag(),
                    recipient.id
                );
            }
        }
        match self.embedded(recipient) {
            Some(target) => Resolution::Found(target),
            None => Resolution::NotFound,
        }
    }

    async fn send(&self, target: &Self::Sendable, text: &str) -> Result<(), SendError>;
}
