use super::{SendError, Worker};
use crate::{
    failure::{CODE_CANNOT_MESSAGE_USER, CODE_MISSING_PERMISSIONS, CODE_UNKNOWN_USER},
    job::{Recipient, RecipientId},
};
use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

const ERROR_PREFIX: &str = "error:";

/// Scripted delivery behavior for one recipient.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimOutcome {
    Deliver,
    Closed,
    Denied,
    Missing,
    Error(String),
    /// Not fetchable; delivered through the embedded identity when the
    /// recipient record carries one.
    Unlisted,
}

impl SimOutcome {
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        if let Some(prefix) = s.get(..ERROR_PREFIX.len())
            && prefix.eq_ignore_ascii_case(ERROR_PREFIX)
        {
            return Ok(Self::Error(s[ERROR_PREFIX.len()..].trim().to_string()));
        }
        match s.to_ascii_lowercase().as_str() {
            "" | "ok" => Ok(Self::Deliver),
            "closed" => Ok(Self::Closed),
            "denied" => Ok(Self::Denied),
            "missing" => Ok(Self::Missing),
            "error" => Ok(Self::Error(String::new())),
            "unlisted" => Ok(Self::Unlisted),
            other => Err(anyhow!("unknown outcome: {other}")),
        }
    }
}

/// Recipients to broadcast to plus the outcome each simulated send has.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    pub recipients: Vec<Recipient>,
    pub outcomes: HashMap<RecipientId, SimOutcome>,
}

impl Roster {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading roster: {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("parsing roster: {}", path.display()))
    }

    /// One `id[,display_name[,outcome]]` per line; `#` starts a comment.
    /// A repeated id is skipped, so the first line for an id decides both
    /// its display name and its outcome.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut roster = Roster::default();

        for (lineno, line) in raw.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let mut fields = line.splitn(3, ',').map(str::trim);
            let id = fields.next().unwrap_or_default();
            if id.is_empty() {
                return Err(anyhow!("line {}: empty recipient id", lineno + 1));
            }
            let mut recipient = Recipient::new(id);
            if roster.outcomes.contains_key(&recipient.id) {
                warn!("line {}: duplicate recipient {id} skipped", lineno + 1);
                continue;
            }
            if let Some(name) = fields.next().filter(|n| !n.is_empty()) {
                recipient = recipient.with_display_name(name);
            }
            let outcome = SimOutcome::parse(fields.next().unwrap_or_default())
                .with_context(|| format!("line {}", lineno + 1))?;

            roster.outcomes.insert(recipient.id.clone(), outcome);
            roster.recipients.push(recipient);
        }

        Ok(roster)
    }
}

#[derive(Debug, Clone)]
pub struct SimTarget {
    pub id: RecipientId,
    outcome: SimOutcome,
}

/// In-process worker that follows a roster's scripted outcomes.
pub struct SimulatedWorker {
    id: String,
    tag: String,
    latency: Duration,
    outcomes: Arc<HashMap<RecipientId, SimOutcome>>,
    cache: Mutex<HashMap<RecipientId, SimTarget>>,
    sent: Mutex<Vec<(RecipientId, String)>>,
}

impl SimulatedWorker {
    pub fn new(
        id: impl Into<String>,
        outcomes: Arc<HashMap<RecipientId, SimOutcome>>,
        latency: Duration,
    ) -> Self {
        let id = id.into();
        Self {
            tag: format!("{id}#sim"),
            id,
            latency,
            outcomes,
            cache: Mutex::new(HashMap::new()),
            sent: Mutex::new(Vec::new()),
        }
    }

    /// Builds `count` workers named `sim-1..=sim-count` over one roster.
    pub fn fleet(count: usize, roster: &Roster, latency: Duration) -> Vec<Self> {
        let outcomes = Arc::new(roster.outcomes.clone());
        (1..=count)
            .map(|i| Self::new(format!("sim-{i}"), Arc::clone(&outcomes), latency))
            .collect()
    }

    /// Everything this worker delivered, in send order.
    pub fn sent(&self) -> Vec<(RecipientId, String)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl Worker for SimulatedWorker {
    type Sendable = SimTarget;

    fn id(&self) -> &str {
        &self.id
    }

    fn tag(&self) -> String {
        self.tag.clone()
    }

    fn cached(&self, recipient: &RecipientId) -> Option<SimTarget> {
        self.cache.lock().get(recipient).cloned()
    }

    async fn fetch(&self, recipient: &RecipientId) -> Result<SimTarget, SendError> {
        match self.outcomes.get(recipient) {
            Some(SimOutcome::Missing) | Some(SimOutcome::Unlisted) | None => {
                Err(SendError::Platform {
                    code: CODE_UNKNOWN_USER,
                    message: format!("Unknown User {recipient}"),
                })
            }
            Some(outcome) => {
                let target = SimTarget {
                    id: recipient.clone(),
                    outcome: outcome.clone(),
                };
                self.cache.lock().insert(recipient.clone(), target.clone());
                Ok(target)
            }
        }
    }

    fn embedded(&self, recipient: &Recipient) -> Option<SimTarget> {
        if matches!(self.outcomes.get(&recipient.id), Some(SimOutcome::Missing)) {
            return None;
        }
        recipient.display_name.as_ref().map(|_| SimTarget {
            id: recipient.id.clone(),
            outcome: SimOutcome::Deliver,
        })
    }

    async fn send(&self, target: &SimTarget, text: &str) -> Result<(), SendError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        debug!("{} -> {}", self.tag, target.id);

        match &target.outcome {
            SimOutcome::Deliver | SimOutcome::Unlisted => {
                self.sent.lock().push((target.id.clone(), text.to_string()));
                Ok(())
            }
            SimOutcome::Closed => Err(SendError::Platform {
                code: CODE_CANNOT_MESSAGE_USER,
                message: "Cannot send messages to this user".into(),
            }),
            SimOutcome::Denied => Err(SendError::Platform {
                code: CODE_MISSING_PERMISSIONS,
                message: "Missing Permissions".into(),
            }),
            SimOutcome::Missing => Err(SendError::Platform {
                code: CODE_UNKNOWN_USER,
                message: "Unknown User".into(),
            }),
            SimOutcome::Error(msg) => Err(SendError::Transport(msg.clone())),
        }
    }
}
