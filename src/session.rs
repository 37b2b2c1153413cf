use crate::{
    config::Broadcast,
    error::BroadcastError,
    job::{BroadcastRequest, Recipient, validate_message},
    util::preview,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::info;

#[derive(Debug, Clone)]
struct Pending {
    message: String,
    recipients: Option<Vec<Recipient>>,
}

/// Broadcasts waiting for their requester to pick targets and confirm.
///
/// One pending request per requester; staging a new message replaces the
/// old one.
pub struct PendingBroadcasts {
    cfg: Broadcast,
    pending: Mutex<HashMap<String, Pending>>,
}

impl PendingBroadcasts {
    pub fn new(cfg: &Broadcast) -> Self {
        Self {
            cfg: cfg.clone(),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Stores `message` for `requester` and returns its preview.
    pub fn stage(&self, requester: &str, message: &str) -> Result<String, BroadcastError> {
        validate_message(&self.cfg, message)?;
        self.pending.lock().insert(
            requester.to_string(),
            Pending {
                message: message.to_string(),
                recipients: None,
            },
        );
        info!("broadcast staged by {requester}");
        Ok(preview(message, self.cfg.preview_len))
    }

    pub fn select_targets(
        &self,
        requester: &str,
        recipients: Vec<Recipient>,
    ) -> Result<usize, BroadcastError> {
        let mut pending = self.pending.lock();
        let entry = pending
            .get_mut(requester)
            .ok_or_else(|| BroadcastError::NoPendingRequest(requester.to_string()))?;
        let count = recipients.len();
        entry.recipients = Some(recipients);
        info!("{requester} selected {count} recipients");
        Ok(count)
    }

    /// Removes the pending request and hands it over for dispatch.
    pub fn confirm(&self, requester: &str) -> Result<BroadcastRequest, BroadcastError> {
        let mut pending = self.pending.lock();
        let entry = pending
            .get(requester)
            .ok_or_else(|| BroadcastError::NoPendingRequest(requester.to_string()))?;
        if entry.recipients.is_none() {
            return Err(BroadcastError::NoRecipientsSelected(requester.to_string()));
        }

        let entry = pending
            .remove(requester)
            .ok_or_else(|| BroadcastError::NoPendingRequest(requester.to_string()))?;
        let recipients = entry.recipients.unwrap_or_default();
        info!(
            "broadcast confirmed by {requester} to {} recipients",
            recipients.len()
        );
        Ok(BroadcastRequest {
            message: entry.message,
            recipients,
        })
    }

    pub fn cancel(&self, requester: &str) -> bool {
        let removed = self.pending.lock().remove(requester).is_some();
        if removed {
            info!("broadcast canceled by {requester}");
        }
        removed
    }

    pub fn is_pending(&self, requester: &str) -> bool {
        self.pending.lock().contains_key(requester)
    }
}
