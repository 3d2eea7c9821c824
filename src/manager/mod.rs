//! The transfer coordinator.
//!
//! [`TransferManager`] owns all batch state and is its sole mutator: every
//! public operation and every executor completion is a discrete, serialized
//! transition executed under one lock. The lock is never held across an
//! await, and caller callbacks never run under it. True parallelism exists
//! only inside the [`Transport`]; admitted transfers run as spawned tasks
//! whose only way back into batch state is through the coordinator's
//! transition methods.

mod executor;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use metrics::counter;
use parking_lot::Mutex;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::batch::{BatchSnapshot, CompletionPolicy};
use crate::item::{Category, Destination, ErrorKind, ItemId, TransferItem, TransferStatus};
use crate::resources::ResourceTracker;
use crate::session::SessionGuard;
use crate::transport::Transport;

/// Callback fired when the batch's completion policy becomes satisfied.
pub type CompleteFn = Arc<dyn Fn(BatchSnapshot) + Send + Sync>;
/// Callback fired when an item fails with a locally recoverable error.
pub type ErrorFn = Arc<dyn Fn(&ItemId, ErrorKind) + Send + Sync>;
/// Callback fired when the session is detected as expired.
pub type SessionExpiredFn = Arc<dyn Fn() + Send + Sync>;
/// Callback fired when an item's resource must be reacquired by the caller.
pub type NeedsReselectFn = Arc<dyn Fn(&ItemId) + Send + Sync>;

/// Caller-supplied notification hooks. All default to no-ops.
#[derive(Clone, Default)]
pub struct TransferCallbacks {
    pub on_complete: Option<CompleteFn>,
    pub on_error: Option<ErrorFn>,
    pub on_session_expired: Option<SessionExpiredFn>,
    pub on_needs_reselect: Option<NeedsReselectFn>,
}

impl TransferCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_complete(mut self, f: impl Fn(BatchSnapshot) + Send + Sync + 'static) -> Self {
        self.on_complete = Some(Arc::new(f));
        self
    }

    pub fn on_error(mut self, f: impl Fn(&ItemId, ErrorKind) + Send + Sync + 'static) -> Self {
        self.on_error = Some(Arc::new(f));
        self
    }

    pub fn on_session_expired(mut self, f: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_session_expired = Some(Arc::new(f));
        self
    }

    pub fn on_needs_reselect(mut self, f: impl Fn(&ItemId) + Send + Sync + 'static) -> Self {
        self.on_needs_reselect = Some(Arc::new(f));
        self
    }
}

/// Configuration for the coordinator.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Maximum number of simultaneously active transfers.
    pub concurrency: usize,
    /// Clock-skew buffer applied to session expiry checks.
    pub expiry_buffer: chrono::Duration,
    /// Batch completion policy.
    pub completion: CompletionPolicy,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            expiry_buffer: chrono::Duration::seconds(30),
            completion: CompletionPolicy::default(),
        }
    }
}

/// A new item to enqueue, binding its id to a resource and destination.
pub struct NewTransfer<R> {
    pub id: ItemId,
    pub category: Category,
    pub destination: Destination,
    pub resource: R,
}

/// An item restored from a previous run. Its resource must be re-bound and
/// its destination refreshed before it can transfer again.
#[derive(Debug, Clone, Deserialize)]
pub struct RestoredTransfer {
    pub id: ItemId,
    pub category: Category,
    pub destination: Destination,
}

/// A destination rebind supplied after a session refresh.
#[derive(Debug, Clone, Deserialize)]
pub struct DestinationUpdate {
    pub id: ItemId,
    pub destination: Destination,
}

/// Deferred callback invocation, collected under the lock and fired after
/// it is released so callbacks can safely call back into the coordinator.
enum Effect {
    Complete(BatchSnapshot),
    Error(ItemId, ErrorKind),
    SessionExpired,
    NeedsReselect(ItemId),
}

/// Everything an admitted transfer needs to run.
pub(crate) struct Launch<R> {
    pub id: ItemId,
    pub destination: Destination,
    pub resource: R,
    pub cancel: CancellationToken,
}

struct Inner<R> {
    /// Insertion order is admission order.
    items: Vec<TransferItem>,
    tracker: ResourceTracker<R>,
    session: SessionGuard,
    active: usize,
    /// Latch so `on_complete` fires once per transition into complete.
    completion_fired: bool,
}

/// Coordinates concurrent transfers against an opaque [`Transport`].
///
/// One manager instance owns exactly one batch. Admission is FIFO by
/// submission order up to the configured ceiling; completion order is
/// whatever the transport's timing produces. Must be used from within a
/// tokio runtime: admitted transfers are spawned tasks.
///
/// # Example
/// ```ignore
/// let manager = Arc::new(TransferManager::new(Arc::new(HttpTransport::new())));
/// manager.add_files(vec![NewTransfer {
///     id: "f1".into(),
///     category: "document".into(),
///     destination: signed_url.into(),
///     resource: payload,
/// }]);
/// manager.start_uploads();
/// ```
pub struct TransferManager<T: Transport> {
    transport: Arc<T>,
    config: ManagerConfig,
    callbacks: TransferCallbacks,
    inner: Mutex<Inner<T::Resource>>,
}

impl<T: Transport> TransferManager<T> {
    pub fn new(transport: Arc<T>) -> Self {
        Self {
            transport,
            config: ManagerConfig::default(),
            callbacks: TransferCallbacks::default(),
            inner: Mutex::new(Inner {
                items: Vec::new(),
                tracker: ResourceTracker::new(),
                session: SessionGuard::new(),
                active: 0,
                completion_fired: false,
            }),
        }
    }

    pub fn with_config(mut self, config: ManagerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_callbacks(mut self, callbacks: TransferCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }

    // ------------------------------------------------------------------
    // Submission
    // ------------------------------------------------------------------

    /// Enqueue new items, binding each id to its resource and destination.
    ///
    /// Items enter `queued`; nothing starts until [`start_uploads`] is
    /// called. Duplicate ids are skipped.
    ///
    /// [`start_uploads`]: TransferManager::start_uploads
    pub fn add_files(&self, files: Vec<NewTransfer<T::Resource>>) {
        let mut inner = self.inner.lock();
        let mut added = 0;
        for file in files {
            if inner.items.iter().any(|i| i.id == file.id) {
                tracing::warn!(item_id = %file.id, "duplicate item id, skipping");
                continue;
            }
            inner
                .tracker
                .insert(file.id.clone(), file.destination, Some(file.resource));
            inner.items.push(TransferItem::new(file.id, file.category));
            added += 1;
        }
        inner.completion_fired = false;
        tracing::info!(count = added, "items added to queue");
    }

    /// Re-insert items from a previous run without their resources.
    ///
    /// Restored items enter `expired` (their session and destinations are
    /// presumed stale) and surface through [`items_needing_reselect`] until
    /// a resource is re-bound via [`bind_resource`] and destinations are
    /// refreshed via [`update_file_urls`].
    ///
    /// [`items_needing_reselect`]: TransferManager::items_needing_reselect
    /// [`bind_resource`]: TransferManager::bind_resource
    /// [`update_file_urls`]: TransferManager::update_file_urls
    pub fn restore_items(&self, restored: Vec<RestoredTransfer>) {
        let mut inner = self.inner.lock();
        let mut count = 0;
        for entry in restored {
            if inner.items.iter().any(|i| i.id == entry.id) {
                tracing::warn!(item_id = %entry.id, "duplicate item id, skipping restore");
                continue;
            }
            inner
                .tracker
                .insert(entry.id.clone(), entry.destination, None);
            let mut item = TransferItem::new(entry.id, entry.category);
            item.mark_expired();
            inner.items.push(item);
            count += 1;
        }
        inner.completion_fired = false;
        tracing::info!(count, "items restored from previous run");
    }

    /// Attach a reacquired resource to an existing item. Returns `false`
    /// for unknown ids.
    pub fn bind_resource(&self, id: &ItemId, resource: T::Resource) -> bool {
        let mut inner = self.inner.lock();
        let bound = inner.tracker.bind_resource(id, resource);
        if bound {
            tracing::info!(item_id = %id, "resource re-bound");
        } else {
            tracing::warn!(item_id = %id, "cannot bind resource for unknown item");
        }
        bound
    }

    // ------------------------------------------------------------------
    // Starting and stopping
    // ------------------------------------------------------------------

    /// Start transferring queued items, up to the concurrency ceiling.
    ///
    /// If the session is already expired this transfers nothing: every
    /// non-terminal item is forced to `expired`, the session-expired
    /// callback fires, and `false` is returned.
    pub fn start_uploads(self: &Arc<Self>) -> bool {
        let mut effects = Vec::new();
        let (started, launches) = {
            let mut inner = self.inner.lock();
            if inner.session.is_expired(self.config.expiry_buffer) {
                tracing::warn!("cannot start transfers, session expired");
                self.force_expire_locked(&mut inner, false, &mut effects);
                (false, Vec::new())
            } else {
                tracing::info!("starting transfers");
                (true, self.admit_locked(&mut inner))
            }
        };
        self.spawn_launches(launches);
        self.fire(effects);
        started
    }

    /// Request cancellation of a single item.
    ///
    /// An `active` item has its token signaled and remains active until the
    /// transport observes the signal; a `queued` item is canceled directly
    /// without ever contacting the transport. Terminal items are untouched.
    pub fn cancel(self: &Arc<Self>, id: &ItemId) {
        let mut effects = Vec::new();
        let launches = {
            let mut inner = self.inner.lock();
            let Some(idx) = inner.items.iter().position(|i| i.id == *id) else {
                tracing::warn!(item_id = %id, "cannot cancel unknown item");
                return;
            };
            match inner.items[idx].status {
                TransferStatus::Active => {
                    if let Some(token) = inner.tracker.cancel_token(id) {
                        token.cancel();
                        tracing::info!(item_id = %id, "cancellation requested");
                    }
                    Vec::new()
                }
                TransferStatus::Queued => {
                    inner.items[idx].status = TransferStatus::Canceled;
                    tracing::info!(item_id = %id, "queued item canceled");
                    self.post_transition_locked(&mut inner, &mut effects)
                }
                _ => Vec::new(),
            }
        };
        self.spawn_launches(launches);
        self.fire(effects);
    }

    /// Request cancellation of every non-terminal item.
    pub fn cancel_all(self: &Arc<Self>) {
        tracing::info!("canceling all transfers");
        let mut effects = Vec::new();
        let launches = {
            let mut inner = self.inner.lock();
            for idx in 0..inner.items.len() {
                match inner.items[idx].status {
                    TransferStatus::Active => {
                        let id = inner.items[idx].id.clone();
                        if let Some(token) = inner.tracker.cancel_token(&id) {
                            token.cancel();
                        }
                    }
                    TransferStatus::Queued => {
                        inner.items[idx].status = TransferStatus::Canceled;
                    }
                    _ => {}
                }
            }
            self.post_transition_locked(&mut inner, &mut effects)
        };
        self.spawn_launches(launches);
        self.fire(effects);
    }

    /// Cancel everything, then drop all items, bindings, and the session.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        for item in &inner.items {
            if item.status == TransferStatus::Active
                && let Some(token) = inner.tracker.cancel_token(&item.id)
            {
                token.cancel();
            }
        }
        inner.items.clear();
        inner.tracker.clear();
        inner.session.clear();
        inner.active = 0;
        inner.completion_fired = false;
        tracing::info!("cleared all transfers");
    }

    /// Cancel then drop a single item and its binding.
    pub fn remove(self: &Arc<Self>, id: &ItemId) {
        let mut effects = Vec::new();
        let launches = {
            let mut inner = self.inner.lock();
            let Some(idx) = inner.items.iter().position(|i| i.id == *id) else {
                return;
            };
            if inner.items[idx].status == TransferStatus::Active {
                if let Some(token) = inner.tracker.cancel_token(id) {
                    token.cancel();
                }
                inner.active -= 1;
            }
            inner.items.remove(idx);
            inner.tracker.remove(id);
            tracing::info!(item_id = %id, "item removed");
            self.post_transition_locked(&mut inner, &mut effects)
        };
        self.spawn_launches(launches);
        self.fire(effects);
    }

    // ------------------------------------------------------------------
    // Retry / recovery
    // ------------------------------------------------------------------

    /// Retry a failed or expired item.
    ///
    /// Preconditions, in order: the session must not be expired (otherwise
    /// the item is forced to `expired` and the session-expired callback
    /// fires), and the item's resource must still be available (otherwise
    /// the needs-reselect callback fires). Returns `false` without state
    /// change for items in any other status.
    pub fn retry(self: &Arc<Self>, id: &ItemId) -> bool {
        let mut effects = Vec::new();
        let (retried, launches) = {
            let mut inner = self.inner.lock();
            let Some(idx) = inner.items.iter().position(|i| i.id == *id) else {
                tracing::warn!(item_id = %id, "cannot retry unknown item");
                return false;
            };
            if !inner.items[idx].status.is_retryable() {
                tracing::debug!(
                    item_id = %id,
                    status = inner.items[idx].status.as_str(),
                    "item is not retryable"
                );
                return false;
            }
            if inner.session.is_expired(self.config.expiry_buffer) {
                tracing::warn!(item_id = %id, "cannot retry, session expired");
                inner.items[idx].mark_expired();
                effects.push(Effect::SessionExpired);
                (false, Vec::new())
            } else if !inner.tracker.has_resource(id) {
                tracing::warn!(item_id = %id, "resource unavailable, needs reselect");
                effects.push(Effect::NeedsReselect(id.clone()));
                (false, Vec::new())
            } else {
                tracing::info!(item_id = %id, "retrying transfer");
                counter!("gantry_retries_total").increment(1);
                inner.items[idx].reset_for_retry();
                inner.completion_fired = false;
                let launches = self.post_transition_locked(&mut inner, &mut effects);
                (true, launches)
            }
        };
        self.spawn_launches(launches);
        self.fire(effects);
        retried
    }

    /// Retry every failed or expired item, applying the same preconditions
    /// as [`retry`](TransferManager::retry) independently per item.
    ///
    /// Returns the ids whose resources are unavailable (so the caller can
    /// prompt for reacquisition); every item that passed is re-queued.
    pub fn retry_all(self: &Arc<Self>) -> Vec<ItemId> {
        let mut effects = Vec::new();
        let (needs_reselect, launches) = {
            let mut inner = self.inner.lock();
            if inner.session.is_expired(self.config.expiry_buffer) {
                tracing::warn!("cannot retry, session expired");
                for item in inner.items.iter_mut().filter(|i| i.status.is_retryable()) {
                    item.mark_expired();
                }
                effects.push(Effect::SessionExpired);
                (Vec::new(), Vec::new())
            } else {
                let mut needs_reselect = Vec::new();
                let mut requeued: u64 = 0;
                for idx in 0..inner.items.len() {
                    if !inner.items[idx].status.is_retryable() {
                        continue;
                    }
                    let id = inner.items[idx].id.clone();
                    if !inner.tracker.has_resource(&id) {
                        effects.push(Effect::NeedsReselect(id.clone()));
                        needs_reselect.push(id);
                        continue;
                    }
                    inner.items[idx].reset_for_retry();
                    requeued += 1;
                }
                tracing::info!(requeued, "retrying failed transfers");
                if !needs_reselect.is_empty() {
                    tracing::warn!(count = needs_reselect.len(), "items need re-selection");
                }
                if requeued > 0 {
                    counter!("gantry_retries_total").increment(requeued);
                    inner.completion_fired = false;
                }
                let launches = self.post_transition_locked(&mut inner, &mut effects);
                (needs_reselect, launches)
            }
        };
        self.spawn_launches(launches);
        self.fire(effects);
        needs_reselect
    }

    // ------------------------------------------------------------------
    // Session
    // ------------------------------------------------------------------

    /// Record the transfer session, replacing any previous one.
    pub fn set_session(&self, session_id: impl Into<String>, expires_at: DateTime<Utc>) {
        self.inner.lock().session.set(session_id, expires_at);
    }

    /// Local TTL check with the configured clock-skew buffer.
    pub fn is_session_expired(&self) -> bool {
        self.is_session_expired_with(self.config.expiry_buffer)
    }

    /// Local TTL check with an explicit buffer.
    pub fn is_session_expired_with(&self, buffer: chrono::Duration) -> bool {
        self.inner.lock().session.is_expired(buffer)
    }

    /// Force every item not already in `success` or `canceled` into
    /// `expired` and fire the session-expired callback once.
    ///
    /// Active items have their cancellation tokens signaled so their
    /// transports stop; their slots are released immediately and the late
    /// outcomes are discarded.
    pub fn mark_expired_files(self: &Arc<Self>) {
        tracing::info!("marking non-complete items as expired");
        let mut effects = Vec::new();
        let launches = {
            let mut inner = self.inner.lock();
            self.force_expire_locked(&mut inner, true, &mut effects);
            self.post_transition_locked(&mut inner, &mut effects)
        };
        self.spawn_launches(launches);
        self.fire(effects);
    }

    /// Rebind destinations after a session refresh.
    ///
    /// Expired items whose destination was rebound return to `queued` with
    /// progress and error fields reset. Nothing is admitted: the caller
    /// makes the resume step explicit by calling
    /// [`start_uploads`](TransferManager::start_uploads) again.
    pub fn update_file_urls(&self, updates: Vec<DestinationUpdate>) {
        let mut inner = self.inner.lock();
        tracing::info!(count = updates.len(), "updating destinations after refresh");
        let mut requeued = 0;
        for update in updates {
            if !inner.tracker.rebind(&update.id, update.destination) {
                tracing::warn!(item_id = %update.id, "cannot rebind unknown item");
                continue;
            }
            if let Some(item) = inner.items.iter_mut().find(|i| i.id == update.id)
                && item.status == TransferStatus::Expired
            {
                item.reset_for_retry();
                requeued += 1;
            }
        }
        if requeued > 0 {
            inner.completion_fired = false;
            tracing::info!(requeued, "expired items re-queued");
        }
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    pub fn get_item(&self, id: &ItemId) -> Option<TransferItem> {
        self.inner.lock().items.iter().find(|i| i.id == *id).cloned()
    }

    /// Capability query: is the item's resumability resource available?
    pub fn has_resource(&self, id: &ItemId) -> bool {
        self.inner.lock().tracker.has_resource(id)
    }

    /// Ids of retryable items whose resources must be reacquired first.
    pub fn items_needing_reselect(&self) -> Vec<ItemId> {
        let inner = self.inner.lock();
        inner
            .items
            .iter()
            .filter(|i| i.status.is_retryable() && !inner.tracker.has_resource(&i.id))
            .map(|i| i.id.clone())
            .collect()
    }

    pub fn is_uploading(&self) -> bool {
        self.inner.lock().active > 0
    }

    pub fn is_complete(&self) -> bool {
        let inner = self.inner.lock();
        self.config.completion.evaluate(&inner.items)
    }

    /// Point-in-time view of the whole batch.
    pub fn snapshot(&self) -> BatchSnapshot {
        let inner = self.inner.lock();
        self.snapshot_locked(&inner)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    pub(crate) fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// Record a raw progress event for an active item.
    pub(crate) fn record_progress(&self, id: &ItemId, loaded: u64, total: u64) {
        if total == 0 {
            return;
        }
        let pct = ((loaded as f64 / total as f64) * 100.0).round().min(100.0) as u8;
        let mut inner = self.inner.lock();
        if let Some(item) = inner.items.iter_mut().find(|i| i.id == *id)
            && item.status == TransferStatus::Active
            && pct > item.progress
        {
            item.progress = pct;
        }
    }

    /// Terminal bookkeeping for one transfer: release the slot, transition
    /// the item, re-admit, and evaluate completion. Runs on every executor
    /// exit.
    pub(crate) fn finish_transfer(
        self: &Arc<Self>,
        id: &ItemId,
        result: Result<(), crate::error::TransportError>,
    ) {
        let mut effects = Vec::new();
        let launches = {
            let mut inner = self.inner.lock();
            let Some(idx) = inner.items.iter().position(|i| i.id == *id) else {
                tracing::debug!(item_id = %id, "transfer finished for a removed item");
                return;
            };
            if inner.items[idx].status != TransferStatus::Active {
                // A forced transition (session expiry, removal) already
                // released this slot; the late outcome is discarded.
                tracing::debug!(
                    item_id = %id,
                    status = inner.items[idx].status.as_str(),
                    "discarding late transfer outcome"
                );
                return;
            }
            inner.tracker.take_cancel(id);
            inner.active -= 1;

            match result {
                Ok(()) => {
                    inner.items[idx].status = TransferStatus::Success;
                    inner.items[idx].progress = 100;
                    counter!("gantry_transfers_total", "outcome" => "success").increment(1);
                    tracing::info!(item_id = %id, "transfer complete");
                }
                Err(err) => {
                    let kind = err.kind();
                    counter!("gantry_transfers_total", "outcome" => kind.as_str()).increment(1);
                    match kind {
                        ErrorKind::Canceled => {
                            inner.items[idx].status = TransferStatus::Canceled;
                            tracing::info!(item_id = %id, "transfer canceled");
                        }
                        ErrorKind::ExpiredSession => {
                            inner.items[idx].mark_expired();
                            tracing::warn!(item_id = %id, error = %err, "session expired mid-transfer");
                            effects.push(Effect::SessionExpired);
                        }
                        kind => {
                            inner.items[idx].status = TransferStatus::Failed;
                            inner.items[idx].error_kind = Some(kind);
                            inner.items[idx].error_message = Some(kind.message().to_string());
                            tracing::warn!(
                                item_id = %id,
                                error_kind = kind.as_str(),
                                error = %err,
                                "transfer failed"
                            );
                            effects.push(Effect::Error(id.clone(), kind));
                        }
                    }
                }
            }

            self.post_transition_locked(&mut inner, &mut effects)
        };
        self.spawn_launches(launches);
        self.fire(effects);
    }

    /// Admit queued items into free slots, FIFO by insertion order.
    ///
    /// Admission only reads from `queued`, so an item can never be admitted
    /// twice concurrently. Queued items with no bound resource are skipped;
    /// they surface through the needs-reselect query.
    fn admit_locked(&self, inner: &mut Inner<T::Resource>) -> Vec<Launch<T::Resource>> {
        let slots = self.config.concurrency.saturating_sub(inner.active);
        if slots == 0 {
            return Vec::new();
        }
        let mut launches = Vec::new();
        for idx in 0..inner.items.len() {
            if launches.len() == slots {
                break;
            }
            if inner.items[idx].status != TransferStatus::Queued {
                continue;
            }
            let id = inner.items[idx].id.clone();
            let Some(resource) = inner.tracker.resource(&id) else {
                tracing::warn!(item_id = %id, "queued item has no resource, skipping admission");
                continue;
            };
            let Some(destination) = inner.tracker.destination(&id) else {
                continue;
            };
            let cancel = CancellationToken::new();
            inner.tracker.set_cancel(&id, cancel.clone());
            inner.items[idx].status = TransferStatus::Active;
            inner.items[idx].progress = 0;
            inner.active += 1;
            tracing::debug!(item_id = %id, "transfer admitted");
            launches.push(Launch {
                id,
                destination,
                resource,
                cancel,
            });
        }
        launches
    }

    /// Runs after any set of transitions: admit queued work into free slots,
    /// then evaluate batch completion once no transfers remain active.
    fn post_transition_locked(
        &self,
        inner: &mut Inner<T::Resource>,
        effects: &mut Vec<Effect>,
    ) -> Vec<Launch<T::Resource>> {
        let launches = self.admit_locked(inner);
        if inner.active == 0
            && !inner.completion_fired
            && self.config.completion.evaluate(&inner.items)
        {
            inner.completion_fired = true;
            tracing::info!("batch complete");
            effects.push(Effect::Complete(self.snapshot_locked(inner)));
        }
        launches
    }

    /// Force items into `expired`. Non-terminal items are always included;
    /// `include_failed` additionally sweeps `failed` items. Fires the
    /// session-expired callback exactly once per call.
    fn force_expire_locked(
        &self,
        inner: &mut Inner<T::Resource>,
        include_failed: bool,
        effects: &mut Vec<Effect>,
    ) {
        for idx in 0..inner.items.len() {
            match inner.items[idx].status {
                TransferStatus::Queued => inner.items[idx].mark_expired(),
                TransferStatus::Active => {
                    let id = inner.items[idx].id.clone();
                    if let Some(token) = inner.tracker.take_cancel(&id) {
                        token.cancel();
                    }
                    inner.active -= 1;
                    inner.items[idx].mark_expired();
                }
                TransferStatus::Failed if include_failed => inner.items[idx].mark_expired(),
                _ => {}
            }
        }
        effects.push(Effect::SessionExpired);
    }

    fn snapshot_locked(&self, inner: &Inner<T::Resource>) -> BatchSnapshot {
        BatchSnapshot::compute(&inner.items, &inner.session, &self.config.completion)
    }

    fn spawn_launches(self: &Arc<Self>, launches: Vec<Launch<T::Resource>>) {
        for launch in launches {
            tokio::spawn(executor::run(self.clone(), launch));
        }
    }

    fn fire(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Complete(snapshot) => {
                    if let Some(f) = &self.callbacks.on_complete {
                        f(snapshot);
                    }
                }
                Effect::Error(id, kind) => {
                    if let Some(f) = &self.callbacks.on_error {
                        f(&id, kind);
                    }
                }
                Effect::SessionExpired => {
                    if let Some(f) = &self.callbacks.on_session_expired {
                        f();
                    }
                }
                Effect::NeedsReselect(id) => {
                    if let Some(f) = &self.callbacks.on_needs_reselect {
                        f(&id);
                    }
                }
            }
        }
    }
}
