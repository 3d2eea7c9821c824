//! Session expiry, retry preconditions, and interrupted-batch recovery.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;

use gantry::{
    DestinationUpdate, ErrorKind, ItemId, ManagerConfig, MockTransport, NewTransfer,
    RestoredTransfer, TransferCallbacks, TransferManager, TransferStatus, TransportError,
};

fn dest(id: &str) -> String {
    format!("https://storage.example.com/u/{}", id)
}

fn refreshed_dest(id: &str) -> String {
    format!("https://storage.example.com/refreshed/{}", id)
}

fn new_transfer(id: &str, category: &str) -> NewTransfer<Bytes> {
    NewTransfer {
        id: id.into(),
        category: category.into(),
        destination: dest(id).into(),
        resource: Bytes::from_static(b"payload"),
    }
}

fn manager_with(
    mock: &MockTransport,
    config: ManagerConfig,
    callbacks: TransferCallbacks,
) -> Arc<TransferManager<MockTransport>> {
    Arc::new(
        TransferManager::new(Arc::new(mock.clone()))
            .with_config(config)
            .with_callbacks(callbacks),
    )
}

fn status_of(manager: &TransferManager<MockTransport>, id: &str) -> TransferStatus {
    manager
        .get_item(&ItemId::from(id))
        .expect("item should exist")
        .status
}

async fn wait_until(mut cond: impl FnMut() -> bool, what: &str) {
    let start = tokio::time::Instant::now();
    let timeout = Duration::from_secs(2);
    while start.elapsed() < timeout {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {}", what);
}

#[test_log::test(tokio::test)]
async fn expired_session_blocks_start_without_contacting_transport() {
    let mock = MockTransport::new();
    let expiries = Arc::new(AtomicUsize::new(0));
    let expiries_sink = expiries.clone();
    let callbacks = TransferCallbacks::new().on_session_expired(move || {
        expiries_sink.fetch_add(1, Ordering::SeqCst);
    });

    let manager = manager_with(&mock, ManagerConfig::default(), callbacks);
    manager.add_files(vec![new_transfer("f1", "document"), new_transfer("f2", "document")]);
    manager.set_session("sess-1", Utc::now() - chrono::Duration::minutes(1));

    assert!(manager.is_session_expired());
    assert!(!manager.start_uploads());

    // Every non-terminal item was forced to expired, the callback fired
    // exactly once, and the transport was never contacted.
    for id in ["f1", "f2"] {
        let item = manager.get_item(&ItemId::from(id)).unwrap();
        assert_eq!(item.status, TransferStatus::Expired);
        assert_eq!(item.error_kind, Some(ErrorKind::ExpiredSession));
        assert!(item.error_message.is_some());
    }
    assert_eq!(expiries.load(Ordering::SeqCst), 1);
    assert_eq!(mock.call_count(), 0);
}

#[test_log::test(tokio::test)]
async fn session_expiry_buffer_is_applied() {
    let mock = MockTransport::new();
    let manager = manager_with(&mock, ManagerConfig::default(), TransferCallbacks::new());

    // Ten seconds out: inside the default 30s buffer, outside a zero buffer.
    manager.set_session("sess-1", Utc::now() + chrono::Duration::seconds(10));
    assert!(manager.is_session_expired());
    assert!(!manager.is_session_expired_with(chrono::Duration::zero()));

    // No session at all means no expiry policy.
    manager.clear();
    assert!(!manager.is_session_expired());
}

#[test_log::test(tokio::test)]
async fn transport_expiry_signal_marks_item_expired() {
    let mock = MockTransport::new();
    // Expired signed endpoints are rejected with 403.
    mock.add_outcome(&dest("f1"), Err(TransportError::with_status(403, "expired")));

    let expiries = Arc::new(AtomicUsize::new(0));
    let errors = Arc::new(AtomicUsize::new(0));
    let expiries_sink = expiries.clone();
    let errors_sink = errors.clone();
    let callbacks = TransferCallbacks::new()
        .on_session_expired(move || {
            expiries_sink.fetch_add(1, Ordering::SeqCst);
        })
        .on_error(move |_, _| {
            errors_sink.fetch_add(1, Ordering::SeqCst);
        });

    let manager = manager_with(&mock, ManagerConfig::default(), callbacks);
    manager.add_files(vec![new_transfer("f1", "document")]);
    assert!(manager.start_uploads());

    wait_until(
        || status_of(&manager, "f1") == TransferStatus::Expired,
        "f1 expired",
    )
    .await;
    assert_eq!(expiries.load(Ordering::SeqCst), 1);
    // Session expiry fires its own callback, not the generic error one.
    assert_eq!(errors.load(Ordering::SeqCst), 0);
}

#[test_log::test(tokio::test)]
async fn mark_expired_preserves_completed_work_and_stops_active_transfers() {
    let mock = MockTransport::new();
    mock.add_outcome(&dest("f1"), Ok(()));
    let _gate = mock.add_outcome_with_trigger(&dest("f2"), Ok(()));

    let expiries = Arc::new(AtomicUsize::new(0));
    let expiries_sink = expiries.clone();
    let callbacks = TransferCallbacks::new().on_session_expired(move || {
        expiries_sink.fetch_add(1, Ordering::SeqCst);
    });

    // Ceiling of one keeps f3 queued while f2 is in flight.
    let config = ManagerConfig {
        concurrency: 1,
        ..Default::default()
    };
    let manager = manager_with(&mock, config, callbacks);
    manager.add_files(vec![new_transfer("f1", "document")]);
    assert!(manager.start_uploads());
    wait_until(
        || status_of(&manager, "f1") == TransferStatus::Success,
        "f1 done",
    )
    .await;

    manager.add_files(vec![new_transfer("f2", "document"), new_transfer("f3", "document")]);
    assert!(manager.start_uploads());
    wait_until(|| mock.in_flight_count() == 1, "f2 in flight").await;

    manager.mark_expired_files();

    // f1 keeps its success; f2 (active) and f3 (queued) are forced to
    // expired, f2's slot released immediately and its transport stopped.
    assert_eq!(status_of(&manager, "f1"), TransferStatus::Success);
    assert_eq!(status_of(&manager, "f2"), TransferStatus::Expired);
    assert_eq!(status_of(&manager, "f3"), TransferStatus::Expired);
    assert_eq!(expiries.load(Ordering::SeqCst), 1);
    assert!(!manager.is_uploading());

    wait_until(|| mock.in_flight_count() == 0, "f2 transport stopped").await;
    // The late canceled outcome is discarded, not recorded as canceled.
    assert_eq!(status_of(&manager, "f2"), TransferStatus::Expired);
}

#[test_log::test(tokio::test)]
async fn recovery_round_trip_requires_explicit_restart() {
    let mock = MockTransport::new();
    mock.add_outcome(&refreshed_dest("f1"), Ok(()));
    mock.add_outcome(&refreshed_dest("f2"), Ok(()));

    let manager = manager_with(&mock, ManagerConfig::default(), TransferCallbacks::new());
    manager.add_files(vec![new_transfer("f1", "document"), new_transfer("f2", "document")]);

    manager.mark_expired_files();
    for id in ["f1", "f2"] {
        assert_eq!(status_of(&manager, id), TransferStatus::Expired);
    }

    // New destinations re-queue the expired items with clean state...
    manager.update_file_urls(vec![
        DestinationUpdate {
            id: "f1".into(),
            destination: refreshed_dest("f1").into(),
        },
        DestinationUpdate {
            id: "f2".into(),
            destination: refreshed_dest("f2").into(),
        },
    ]);
    for id in ["f1", "f2"] {
        let item = manager.get_item(&ItemId::from(id)).unwrap();
        assert_eq!(item.status, TransferStatus::Queued);
        assert_eq!(item.progress, 0);
        assert!(item.error_kind.is_none());
        assert!(item.error_message.is_none());
    }

    // ...but nothing becomes active until the caller restarts.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!manager.is_uploading());
    assert_eq!(mock.call_count(), 0);

    assert!(manager.start_uploads());
    wait_until(|| manager.snapshot().success_count == 2, "resumed batch done").await;

    // The refreshed destinations were the ones contacted.
    let destinations: Vec<_> = mock.get_calls().iter().map(|c| c.destination.clone()).collect();
    assert!(destinations.contains(&refreshed_dest("f1")));
    assert!(destinations.contains(&refreshed_dest("f2")));
}

#[test_log::test(tokio::test)]
async fn retry_is_a_no_op_outside_failed_and_expired() {
    let mock = MockTransport::new();
    let _gate = mock.add_outcome_with_trigger(&dest("f1"), Ok(()));

    let config = ManagerConfig {
        concurrency: 1,
        ..Default::default()
    };
    let manager = manager_with(&mock, config, TransferCallbacks::new());
    manager.add_files(vec![new_transfer("f1", "document"), new_transfer("f2", "document")]);
    assert!(manager.start_uploads());
    wait_until(|| mock.in_flight_count() == 1, "f1 in flight").await;

    // Active, queued, and unknown items are not retryable.
    assert!(!manager.retry(&ItemId::from("f1")));
    assert_eq!(status_of(&manager, "f1"), TransferStatus::Active);
    assert!(!manager.retry(&ItemId::from("f2")));
    assert_eq!(status_of(&manager, "f2"), TransferStatus::Queued);
    assert!(!manager.retry(&ItemId::from("missing")));
}

#[test_log::test(tokio::test)]
async fn retry_with_expired_session_forces_item_expired() {
    let mock = MockTransport::new();
    mock.add_outcome(&dest("f1"), Err(TransportError::with_status(500, "boom")));

    let expiries = Arc::new(AtomicUsize::new(0));
    let expiries_sink = expiries.clone();
    let callbacks = TransferCallbacks::new().on_session_expired(move || {
        expiries_sink.fetch_add(1, Ordering::SeqCst);
    });

    let manager = manager_with(&mock, ManagerConfig::default(), callbacks);
    manager.add_files(vec![new_transfer("f1", "document")]);
    assert!(manager.start_uploads());
    wait_until(
        || status_of(&manager, "f1") == TransferStatus::Failed,
        "f1 failed",
    )
    .await;

    manager.set_session("sess-1", Utc::now() - chrono::Duration::minutes(1));
    assert!(!manager.retry(&ItemId::from("f1")));
    assert_eq!(status_of(&manager, "f1"), TransferStatus::Expired);
    assert_eq!(expiries.load(Ordering::SeqCst), 1);
    assert_eq!(mock.call_count(), 1);
}

#[test_log::test(tokio::test)]
async fn restored_items_need_reselect_then_recover() {
    let mock = MockTransport::new();
    mock.add_outcome(&refreshed_dest("f1"), Ok(()));

    let reselects: Arc<Mutex<Vec<ItemId>>> = Arc::new(Mutex::new(Vec::new()));
    let reselects_sink = reselects.clone();
    let callbacks =
        TransferCallbacks::new().on_needs_reselect(move |id| reselects_sink.lock().push(id.clone()));

    let manager = manager_with(&mock, ManagerConfig::default(), callbacks);
    manager.restore_items(vec![RestoredTransfer {
        id: "f1".into(),
        category: "document".into(),
        destination: dest("f1").into(),
    }]);

    // Restored without a resource: expired, flagged for re-selection.
    assert_eq!(status_of(&manager, "f1"), TransferStatus::Expired);
    assert!(!manager.has_resource(&ItemId::from("f1")));
    assert_eq!(manager.items_needing_reselect(), vec![ItemId::from("f1")]);

    // Retry refuses until the resource is reacquired.
    assert!(!manager.retry(&ItemId::from("f1")));
    assert_eq!(reselects.lock().clone(), vec![ItemId::from("f1")]);
    assert_eq!(status_of(&manager, "f1"), TransferStatus::Expired);

    // Reacquire the resource, refresh the destination, restart.
    assert!(manager.bind_resource(&ItemId::from("f1"), Bytes::from_static(b"payload")));
    assert!(manager.items_needing_reselect().is_empty());
    manager.update_file_urls(vec![DestinationUpdate {
        id: "f1".into(),
        destination: refreshed_dest("f1").into(),
    }]);
    assert_eq!(status_of(&manager, "f1"), TransferStatus::Queued);

    assert!(manager.start_uploads());
    wait_until(
        || status_of(&manager, "f1") == TransferStatus::Success,
        "restored item transferred",
    )
    .await;
}

#[test_log::test(tokio::test)]
async fn retry_all_requeues_what_it_can_and_reports_the_rest() {
    let mock = MockTransport::new();
    mock.add_outcome(&dest("f1"), Err(TransportError::with_status(503, "busy")));
    mock.add_outcome(&dest("f1"), Ok(()));

    let manager = manager_with(&mock, ManagerConfig::default(), TransferCallbacks::new());
    manager.add_files(vec![new_transfer("f1", "document")]);
    manager.restore_items(vec![RestoredTransfer {
        id: "f2".into(),
        category: "document".into(),
        destination: dest("f2").into(),
    }]);

    assert!(manager.start_uploads());
    wait_until(
        || status_of(&manager, "f1") == TransferStatus::Failed,
        "f1 failed",
    )
    .await;

    // f1 has its resource and is re-queued; f2 lost its resource and is
    // reported back for reacquisition.
    let needs_reselect = manager.retry_all();
    assert_eq!(needs_reselect, vec![ItemId::from("f2")]);
    assert_eq!(status_of(&manager, "f2"), TransferStatus::Expired);

    wait_until(
        || status_of(&manager, "f1") == TransferStatus::Success,
        "f1 retried to success",
    )
    .await;
}

#[test_log::test(tokio::test)]
async fn retry_all_with_expired_session_expires_retryable_items() {
    let mock = MockTransport::new();
    mock.add_outcome(&dest("f1"), Err(TransportError::with_status(500, "boom")));

    let expiries = Arc::new(AtomicUsize::new(0));
    let expiries_sink = expiries.clone();
    let callbacks = TransferCallbacks::new().on_session_expired(move || {
        expiries_sink.fetch_add(1, Ordering::SeqCst);
    });

    let manager = manager_with(&mock, ManagerConfig::default(), callbacks);
    manager.add_files(vec![new_transfer("f1", "document")]);
    assert!(manager.start_uploads());
    wait_until(
        || status_of(&manager, "f1") == TransferStatus::Failed,
        "f1 failed",
    )
    .await;

    manager.set_session("sess-1", Utc::now() - chrono::Duration::minutes(1));
    assert!(manager.retry_all().is_empty());
    assert_eq!(status_of(&manager, "f1"), TransferStatus::Expired);
    assert_eq!(expiries.load(Ordering::SeqCst), 1);
    // Only the original attempt reached the transport.
    assert_eq!(mock.call_count(), 1);
}
