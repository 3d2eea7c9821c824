//! Core types for transfer items.
//!
//! This module defines the per-item lifecycle state, the error taxonomy
//! surfaced to callers, and the identifier newtypes used across the crate.

use serde::{Deserialize, Serialize};

/// Caller-assigned identifier for a transfer item.
///
/// Ids are assigned before submission (typically by the server issuing the
/// destination endpoint), unique within a batch, and immutable.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemId(pub String);

impl std::fmt::Display for ItemId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for ItemId {
    fn from(s: String) -> Self {
        ItemId(s)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        ItemId(s.to_string())
    }
}

impl std::ops::Deref for ItemId {
    type Target = str;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Opaque payload category tag.
///
/// The coordinator never interprets categories; they exist so completion
/// policies can distinguish required payloads from optional ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Category(pub String);

impl From<String> for Category {
    fn from(s: String) -> Self {
        Category(s)
    }
}

impl From<&str> for Category {
    fn from(s: &str) -> Self {
        Category(s.to_string())
    }
}

/// Opaque destination endpoint a transfer writes to (e.g. a signed URL).
///
/// Replaceable mid-batch: a credential refresh rebinds destinations without
/// touching item state.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Destination(pub String);

impl Destination {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Destination {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for Destination {
    fn from(s: String) -> Self {
        Destination(s)
    }
}

impl From<&str> for Destination {
    fn from(s: &str) -> Self {
        Destination(s.to_string())
    }
}

// ============================================================================
// Lifecycle state
// ============================================================================

/// Lifecycle state of a transfer item.
///
/// ```text
/// queued ──> active ──> {success, failed, canceled, expired}
///   │                        failed ──retry──> queued
///   └──cancel──> canceled   expired ──rebind──> queued
/// ```
///
/// `success` and `canceled` are terminal with no outgoing transitions;
/// `failed` and `expired` are terminal unless explicitly retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransferStatus {
    Queued,
    Active,
    Success,
    Failed,
    Canceled,
    Expired,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Queued => "queued",
            TransferStatus::Active => "active",
            TransferStatus::Success => "success",
            TransferStatus::Failed => "failed",
            TransferStatus::Canceled => "canceled",
            TransferStatus::Expired => "expired",
        }
    }

    /// Check if this status is terminal (the item is no longer queued or
    /// moving bytes). `failed` and `expired` are terminal but retryable.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Success
                | TransferStatus::Failed
                | TransferStatus::Canceled
                | TransferStatus::Expired
        )
    }

    /// Check if this status allows an explicit retry.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferStatus::Failed | TransferStatus::Expired)
    }
}

impl std::fmt::Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for TransferStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(TransferStatus::Queued),
            "active" => Ok(TransferStatus::Active),
            "success" => Ok(TransferStatus::Success),
            "failed" => Ok(TransferStatus::Failed),
            "canceled" => Ok(TransferStatus::Canceled),
            "expired" => Ok(TransferStatus::Expired),
            _ => Err(format!("Invalid transfer status: {}", s)),
        }
    }
}

// ============================================================================
// Error taxonomy
// ============================================================================

/// Classified failure kind for a transfer.
///
/// This is the vocabulary the coordinator reasons about; it determines which
/// terminal state an item lands in and whether a plain `retry` can recover
/// it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Network-level failure with no response from the remote.
    #[serde(rename = "TRANSPORT_ERROR")]
    Transport,
    /// The remote rejected the transfer (5xx-equivalent).
    #[serde(rename = "SERVER_ERROR")]
    Server,
    /// The remote rejected the credentials (401-equivalent). Distinct from
    /// session expiry: the session itself may still be valid.
    #[serde(rename = "UNAUTHORIZED")]
    Unauthorized,
    /// The remote signaled that the coordinating session or signed endpoint
    /// has expired.
    #[serde(rename = "EXPIRED_SESSION")]
    ExpiredSession,
    /// Locally requested cancellation, observed by the transport.
    #[serde(rename = "CANCELED")]
    Canceled,
    /// Unclassified failure.
    #[serde(rename = "UNKNOWN")]
    Unknown,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Transport => "TRANSPORT_ERROR",
            ErrorKind::Server => "SERVER_ERROR",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::ExpiredSession => "EXPIRED_SESSION",
            ErrorKind::Canceled => "CANCELED",
            ErrorKind::Unknown => "UNKNOWN",
        }
    }

    /// Returns true if a plain `retry` can recover from this kind.
    ///
    /// `ExpiredSession` requires a session refresh and new destinations
    /// first; `Canceled` is never auto-retried.
    pub fn is_retriable(&self) -> bool {
        match self {
            ErrorKind::Transport => true,
            ErrorKind::Server => true,
            ErrorKind::Unauthorized => true,
            ErrorKind::Unknown => true,
            ErrorKind::ExpiredSession => false,
            ErrorKind::Canceled => false,
        }
    }

    /// Caller-presentable default message for this kind.
    pub fn message(&self) -> &'static str {
        match self {
            ErrorKind::Transport => {
                "Network error during transfer. Check your connection and try again."
            }
            ErrorKind::Server => "The server rejected the transfer. Try again later.",
            ErrorKind::Unauthorized => "Not authorized to transfer to this destination.",
            ErrorKind::ExpiredSession => "Session expired. Refresh to continue.",
            ErrorKind::Canceled => "Transfer canceled.",
            ErrorKind::Unknown => "The transfer failed unexpectedly.",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// Items
// ============================================================================

/// A transfer item as observed by callers.
///
/// Items are created in `queued` at submission, mutated only through
/// coordinator-owned transitions, and removed only by explicit caller action.
#[derive(Debug, Clone, Serialize)]
pub struct TransferItem {
    pub id: ItemId,
    pub category: Category,
    pub status: TransferStatus,
    /// Percentage of bytes transferred, 0-100. Monotonically non-decreasing
    /// within a single active episode; reset to 0 on re-queue.
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl TransferItem {
    pub(crate) fn new(id: ItemId, category: Category) -> Self {
        Self {
            id,
            category,
            status: TransferStatus::Queued,
            progress: 0,
            error_kind: None,
            error_message: None,
        }
    }

    /// Re-queue for another attempt: progress and error fields reset.
    pub(crate) fn reset_for_retry(&mut self) {
        self.status = TransferStatus::Queued;
        self.progress = 0;
        self.error_kind = None;
        self.error_message = None;
    }

    /// Force into the expired state with the standard session-expiry error.
    pub(crate) fn mark_expired(&mut self) {
        self.status = TransferStatus::Expired;
        self.error_kind = Some(ErrorKind::ExpiredSession);
        self.error_message = Some(ErrorKind::ExpiredSession.message().to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_round_trips_through_str() {
        for status in [
            TransferStatus::Queued,
            TransferStatus::Active,
            TransferStatus::Success,
            TransferStatus::Failed,
            TransferStatus::Canceled,
            TransferStatus::Expired,
        ] {
            let parsed: TransferStatus = status.as_str().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("uploading".parse::<TransferStatus>().is_err());
    }

    #[test]
    fn terminal_and_retryable_states() {
        assert!(!TransferStatus::Queued.is_terminal());
        assert!(!TransferStatus::Active.is_terminal());
        assert!(TransferStatus::Success.is_terminal());
        assert!(TransferStatus::Canceled.is_terminal());
        assert!(TransferStatus::Failed.is_retryable());
        assert!(TransferStatus::Expired.is_retryable());
        assert!(!TransferStatus::Success.is_retryable());
        assert!(!TransferStatus::Canceled.is_retryable());
    }

    #[test]
    fn only_local_failures_are_retriable() {
        assert!(ErrorKind::Transport.is_retriable());
        assert!(ErrorKind::Server.is_retriable());
        assert!(ErrorKind::Unauthorized.is_retriable());
        assert!(ErrorKind::Unknown.is_retriable());
        assert!(!ErrorKind::ExpiredSession.is_retriable());
        assert!(!ErrorKind::Canceled.is_retriable());
    }

    #[test]
    fn error_kind_serializes_as_wire_code() {
        assert_eq!(
            serde_json::to_string(&ErrorKind::Transport).unwrap(),
            r#""TRANSPORT_ERROR""#
        );
        assert_eq!(
            serde_json::from_str::<ErrorKind>(r#""EXPIRED_SESSION""#).unwrap(),
            ErrorKind::ExpiredSession
        );
    }

    #[test]
    fn reset_for_retry_clears_error_fields() {
        let mut item = TransferItem::new(ItemId::from("f1"), Category::from("image"));
        item.status = TransferStatus::Failed;
        item.progress = 40;
        item.error_kind = Some(ErrorKind::Server);
        item.error_message = Some("boom".to_string());

        item.reset_for_retry();

        assert_eq!(item.status, TransferStatus::Queued);
        assert_eq!(item.progress, 0);
        assert!(item.error_kind.is_none());
        assert!(item.error_message.is_none());
    }
}
