use crate::{job::Recipient, util::truncate_chars, worker::SendError};
use serde::{Deserialize, Serialize};
use std::fmt;

pub const CODE_UNKNOWN_USER: u32 = 10003;
pub const CODE_CANNOT_MESSAGE_USER: u32 = 50007;
pub const CODE_MISSING_PERMISSIONS: u32 = 50013;

const UNKNOWN_ERROR: &str = "Unknown error occurred";

/// Why a single delivery failed. Raw transport errors are logged, never
/// shown; only this category (and a truncated message for transient
/// errors) reaches the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    RecipientUnreachable,
    PermissionDenied,
    RecipientNotFound,
    TransientError(String),
}

impl FailureReason {
    pub fn classify(err: &SendError, max_len: usize) -> Self {
        match err {
            SendError::Platform { code, .. } if *code == CODE_CANNOT_MESSAGE_USER => {
                Self::RecipientUnreachable
            }
            SendError::Platform { code, .. } if *code == CODE_MISSING_PERMISSIONS => {
                Self::PermissionDenied
            }
            SendError::Platform { code, .. } if *code == CODE_UNKNOWN_USER => {
                Self::RecipientNotFound
            }
            SendError::Platform { message, .. } | SendError::Transport(message) => {
                if message.trim().is_empty() {
                    Self::TransientError(UNKNOWN_ERROR.to_string())
                } else {
                    Self::TransientError(truncate_chars(message, max_len).to_string())
                }
            }
        }
    }

    pub fn category(&self) -> &'static str {
        match self {
            Self::RecipientUnreachable => "recipient_unreachable",
            Self::PermissionDenied => "permission_denied",
            Self::RecipientNotFound => "recipient_not_found",
            Self::TransientError(_) => "transient_error",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RecipientUnreachable => f.write_str("DMs are closed"),
            Self::PermissionDenied => f.write_str("Missing permissions"),
            Self::RecipientNotFound => f.write_str("Unknown user"),
            Self::TransientError(msg) => f.write_str(msg),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub recipient: Recipient,
    pub reason: FailureReason,
}
