use crate::{
    config::Broadcast,
    error::BroadcastError,
    util::{now_rfc3339, preview, sha256_hex},
};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecipientId(String);

impl RecipientId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecipientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A resolved broadcast target.
///
/// `display_name` is the identity bundled with the recipient record by
/// whoever resolved the set. Workers may fall back to it when they cannot
/// look the recipient up themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipient {
    pub id: RecipientId,
    #[serde(default)]
    pub display_name: Option<String>,
}

impl Recipient {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: RecipientId::new(id),
            display_name: None,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Label used in reports and logs.
    pub fn label(&self) -> String {
        match &self.display_name {
            Some(name) => name.clone(),
            None => format!("<@{}>", self.id),
        }
    }
}

/// A confirmed message and its targets, before it becomes a job.
#[derive(Debug, Clone)]
pub struct BroadcastRequest {
    pub message: String,
    pub recipients: Vec<Recipient>,
}

/// Checks a message against the configured length limits.
pub fn validate_message(cfg: &Broadcast, message: &str) -> Result<(), BroadcastError> {
    if message.trim().is_empty() {
        return Err(BroadcastError::EmptyMessage);
    }
    let len = message.chars().count();
    if len > cfg.max_message_len {
        return Err(BroadcastError::MessageTooLong {
            len,
            max: cfg.max_message_len,
        });
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct BroadcastJob {
    pub job_id: String,
    pub message: String,
    pub recipients: Vec<Recipient>,
    pub created_at: String,
    mention_template: String,
}

impl BroadcastJob {
    pub fn new(cfg: &Broadcast, request: BroadcastRequest) -> Result<Self, BroadcastError> {
        validate_message(cfg, &request.message)?;

        let recipients = dedup_recipients(request.recipients);
        let created_at = now_rfc3339();

        let mut fingerprint = format!("{created_at}\n{}\n", request.message);
        for r in &recipients {
            fingerprint.push_str(r.id.as_str());
            fingerprint.push('\n');
        }

        Ok(Self {
            job_id: sha256_hex(fingerprint.as_bytes()),
            message: request.message,
            recipients,
            created_at,
            mention_template: cfg.mention_template.clone(),
        })
    }

    pub fn total(&self) -> usize {
        self.recipients.len()
    }

    pub fn preview(&self, max: usize) -> String {
        preview(&self.message, max)
    }

    /// The text actually delivered to `recipient`.
    pub fn text_for(&self, recipient: &Recipient) -> String {
        if self.mention_template.is_empty() {
            return self.message.clone();
        }
        let mention = self
            .mention_template
            .replace("{id}", recipient.id.as_str());
        format!("{}\n\n{}", self.message, mention)
    }
}

fn dedup_recipients(recipients: Vec<Recipient>) -> Vec<Recipient> {
    let before = recipients.len();
    let mut seen = HashSet::with_capacity(before);
    let out: Vec<Recipient> = recipients
        .into_iter()
        .filter(|r| seen.insert(r.id.clone()))
        .collect();
    if out.len() < before {
        warn!(
            "dropped {} duplicate recipients ({} remain)",
            before - out.len(),
            out.len()
        );
    }
    out
}
