//! Derived batch state and the pluggable completion policy.
//!
//! Nothing in this module is stored: a [`BatchSnapshot`] is computed from the
//! item list on demand, and completion is whatever policy the caller
//! injected. Which categories must succeed for a batch to count as done is
//! business policy, not concurrency design.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::item::{Category, TransferItem, TransferStatus};
use crate::session::SessionGuard;

/// Decides when a batch counts as complete.
///
/// Evaluated by the coordinator after every terminal transition; the
/// completion callback fires once per transition into the complete state.
#[derive(Clone)]
pub struct CompletionPolicy(Arc<dyn Fn(&[TransferItem]) -> bool + Send + Sync>);

impl CompletionPolicy {
    /// Complete when every item succeeded. Empty batches are not complete.
    pub fn all_succeeded() -> Self {
        Self::custom(|items| {
            !items.is_empty() && items.iter().all(|i| i.status == TransferStatus::Success)
        })
    }

    /// Complete when every item reached a terminal state, whatever the mix
    /// of outcomes. Empty batches are not complete.
    pub fn all_terminal() -> Self {
        Self::custom(|items| !items.is_empty() && items.iter().all(|i| i.status.is_terminal()))
    }

    /// Complete once any item of the given category succeeds, even if other
    /// items are still pending or failed.
    pub fn required_category(category: impl Into<Category>) -> Self {
        let category = category.into();
        Self::custom(move |items| {
            items
                .iter()
                .any(|i| i.category == category && i.status == TransferStatus::Success)
        })
    }

    pub fn custom(f: impl Fn(&[TransferItem]) -> bool + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn evaluate(&self, items: &[TransferItem]) -> bool {
        (self.0)(items)
    }
}

impl Default for CompletionPolicy {
    fn default() -> Self {
        Self::all_succeeded()
    }
}

impl fmt::Debug for CompletionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("CompletionPolicy(..)")
    }
}

/// Point-in-time view of the whole batch.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSnapshot {
    pub items: Vec<TransferItem>,
    pub session_id: Option<String>,
    pub session_expires_at: Option<DateTime<Utc>>,
    pub active_count: usize,
    pub queued_count: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub canceled_count: usize,
    pub expired_count: usize,
    /// Mean of per-item progress, 0-100. Zero for an empty batch.
    pub overall_progress: u8,
    pub is_uploading: bool,
    pub is_complete: bool,
}

impl BatchSnapshot {
    pub(crate) fn compute(
        items: &[TransferItem],
        session: &SessionGuard,
        policy: &CompletionPolicy,
    ) -> Self {
        let count = |status: TransferStatus| items.iter().filter(|i| i.status == status).count();

        let active_count = count(TransferStatus::Active);
        let overall_progress = if items.is_empty() {
            0
        } else {
            let total: u64 = items.iter().map(|i| u64::from(i.progress)).sum();
            (total / items.len() as u64) as u8
        };

        Self {
            items: items.to_vec(),
            session_id: session.session_id().map(str::to_string),
            session_expires_at: session.expires_at(),
            active_count,
            queued_count: count(TransferStatus::Queued),
            success_count: count(TransferStatus::Success),
            failed_count: count(TransferStatus::Failed),
            canceled_count: count(TransferStatus::Canceled),
            expired_count: count(TransferStatus::Expired),
            overall_progress,
            is_uploading: active_count > 0,
            is_complete: policy.evaluate(items),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::ItemId;

    fn item(id: &str, category: &str, status: TransferStatus, progress: u8) -> TransferItem {
        let mut item = TransferItem::new(ItemId::from(id), Category::from(category));
        item.status = status;
        item.progress = progress;
        item
    }

    #[test]
    fn all_succeeded_requires_every_item() {
        let policy = CompletionPolicy::all_succeeded();
        assert!(!policy.evaluate(&[]));

        let mixed = [
            item("f1", "doc", TransferStatus::Success, 100),
            item("f2", "doc", TransferStatus::Failed, 10),
        ];
        assert!(!policy.evaluate(&mixed));

        let done = [
            item("f1", "doc", TransferStatus::Success, 100),
            item("f2", "doc", TransferStatus::Success, 100),
        ];
        assert!(policy.evaluate(&done));
    }

    #[test]
    fn all_terminal_accepts_mixed_outcomes() {
        let policy = CompletionPolicy::all_terminal();
        let mixed = [
            item("f1", "doc", TransferStatus::Success, 100),
            item("f2", "doc", TransferStatus::Canceled, 0),
            item("f3", "doc", TransferStatus::Failed, 30),
        ];
        assert!(policy.evaluate(&mixed));

        let pending = [item("f1", "doc", TransferStatus::Queued, 0)];
        assert!(!policy.evaluate(&pending));
    }

    #[test]
    fn required_category_ignores_other_items() {
        let policy = CompletionPolicy::required_category("instruction");
        let items = [
            item("f1", "instruction", TransferStatus::Success, 100),
            item("f2", "image", TransferStatus::Failed, 0),
            item("f3", "image", TransferStatus::Queued, 0),
        ];
        assert!(policy.evaluate(&items));

        let not_yet = [
            item("f1", "instruction", TransferStatus::Active, 60),
            item("f2", "image", TransferStatus::Success, 100),
        ];
        assert!(!policy.evaluate(&not_yet));
    }

    #[test]
    fn snapshot_derives_counts_and_progress() {
        let items = [
            item("f1", "doc", TransferStatus::Success, 100),
            item("f2", "doc", TransferStatus::Active, 50),
            item("f3", "doc", TransferStatus::Queued, 0),
            item("f4", "doc", TransferStatus::Expired, 0),
        ];
        let snapshot =
            BatchSnapshot::compute(&items, &SessionGuard::new(), &CompletionPolicy::default());

        assert_eq!(snapshot.active_count, 1);
        assert_eq!(snapshot.queued_count, 1);
        assert_eq!(snapshot.success_count, 1);
        assert_eq!(snapshot.expired_count, 1);
        assert_eq!(snapshot.overall_progress, 37);
        assert!(snapshot.is_uploading);
        assert!(!snapshot.is_complete);
    }

    #[test]
    fn snapshot_serializes_for_hosts() {
        let items = [item("f1", "doc", TransferStatus::Success, 100)];
        let snapshot = BatchSnapshot::compute(
            &items,
            &SessionGuard::new(),
            &CompletionPolicy::all_succeeded(),
        );

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["items"][0]["status"], "success");
        assert_eq!(json["is_complete"], true);
        assert_eq!(json["overall_progress"], 100);
    }
}
