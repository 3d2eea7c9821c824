//! Per-item transfer driver.

use std::sync::Arc;

use crate::transport::{ProgressFn, Transport};

use super::{Launch, TransferManager};

/// Run one admitted transfer to completion and report the outcome back to
/// the coordinator.
///
/// Progress events are translated into integer percentages by the
/// coordinator; the teardown path (slot release, re-admission, completion
/// evaluation) runs on every exit, success or error.
pub(super) async fn run<T: Transport>(
    manager: Arc<TransferManager<T>>,
    launch: Launch<T::Resource>,
) {
    let Launch {
        id,
        destination,
        resource,
        cancel,
    } = launch;

    tracing::info!(item_id = %id, destination = %destination, "starting transfer");

    let on_progress: ProgressFn = {
        let manager = manager.clone();
        let id = id.clone();
        Arc::new(move |loaded, total| manager.record_progress(&id, loaded, total))
    };

    let result = manager
        .transport()
        .transfer(&destination, &resource, on_progress, cancel)
        .await;

    manager.finish_transfer(&id, result);
}
