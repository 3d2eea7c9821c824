//! Transport abstraction for moving bytes to a destination.
//!
//! The coordinator does not know how bytes move; it only needs this
//! contract and a deterministic error vocabulary. The trait abstracts the
//! actual transfer mechanism, enabling testability with mock
//! implementations.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::TransportError;
use crate::item::Destination;

/// Raw progress observer: `(bytes_transferred, bytes_total)`.
pub type ProgressFn = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// Trait for executing a single outbound transfer.
///
/// Implementations report raw progress through `on_progress`, must observe
/// `cancel` and surface a canceled-classified error once it fires, and
/// classify failures via [`TransportError`]. Cancellation is cooperative:
/// signaling the token only raises intent, and the transfer counts as
/// canceled when the implementation returns.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Resumability resource required to (re)attempt a transfer.
    type Resource: Clone + Send + Sync + 'static;

    /// Move the resource's bytes to the destination.
    async fn transfer(
        &self,
        destination: &Destination,
        resource: &Self::Resource,
        on_progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<(), TransportError>;
}

// ============================================================================
// Production implementation using reqwest
// ============================================================================

const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Production transport: HTTP `PUT` of an in-memory payload to the
/// destination URL (a pre-signed URL or equivalent).
///
/// The body is streamed in chunks so progress surfaces while the connection
/// drains it.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    chunk_size: usize,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    type Resource = Bytes;

    #[tracing::instrument(skip(self, resource, on_progress, cancel), fields(destination = %destination, len = resource.len()))]
    async fn transfer(
        &self,
        destination: &Destination,
        resource: &Self::Resource,
        on_progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<(), TransportError> {
        let total = resource.len() as u64;

        let mut chunks = Vec::with_capacity(resource.len() / self.chunk_size + 1);
        let mut offset = 0;
        while offset < resource.len() {
            let end = (offset + self.chunk_size).min(resource.len());
            chunks.push(resource.slice(offset..end));
            offset = end;
        }

        // Progress fires as the connection pulls each chunk off the stream.
        let mut sent = 0u64;
        let body_chunks = chunks.into_iter().map(move |chunk| {
            sent += chunk.len() as u64;
            on_progress(sent, total);
            Ok::<Bytes, std::convert::Infallible>(chunk)
        });

        let request = self
            .client
            .put(destination.as_str())
            .header(reqwest::header::CONTENT_LENGTH, total)
            .body(reqwest::Body::wrap_stream(futures_util::stream::iter(
                body_chunks,
            )))
            .send();

        let response = tokio::select! {
            _ = cancel.cancelled() => {
                tracing::debug!("transfer canceled while in flight");
                return Err(TransportError::canceled());
            }
            result = request => result.map_err(|e| {
                tracing::warn!(error = %e, "transfer request failed");
                TransportError::new(format!("transfer request failed: {}", e))
            })?,
        };

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(status = status.as_u16(), "destination rejected transfer");
            return Err(TransportError::with_status(
                status.as_u16(),
                format!("destination rejected transfer: {} - {}", status, body),
            ));
        }

        tracing::info!(bytes = total, "transfer completed");
        Ok(())
    }
}

// ============================================================================
// Test/mock implementation
// ============================================================================

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::Mutex;
use tokio::sync::oneshot;

/// Mock transport for testing.
///
/// Outcomes are queued per destination in FIFO order. An outcome can be
/// gated on a trigger so tests control exactly when each transfer finishes,
/// and can script raw progress events delivered before completion.
///
/// # Example
/// ```ignore
/// let mock = MockTransport::new();
/// mock.add_outcome("https://storage.example.com/u/f1", Ok(()));
/// let trigger = mock.add_outcome_with_trigger("https://storage.example.com/u/f2", Ok(()));
/// // ... f2 stays in flight until:
/// trigger.send(()).unwrap();
/// ```
#[derive(Clone, Default)]
pub struct MockTransport {
    outcomes: Arc<Mutex<HashMap<String, Vec<MockOutcome>>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    in_flight: Arc<AtomicUsize>,
}

struct MockOutcome {
    result: Result<(), TransportError>,
    progress: Vec<(u64, u64)>,
    trigger: Option<oneshot::Receiver<()>>,
}

/// Record of a call made to the mock transport.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub destination: String,
    pub len: usize,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue an outcome for a destination. Multiple outcomes for the same
    /// destination are consumed in FIFO order.
    pub fn add_outcome(&self, destination: &str, result: Result<(), TransportError>) {
        self.outcomes
            .lock()
            .entry(destination.to_string())
            .or_default()
            .push(MockOutcome {
                result,
                progress: Vec::new(),
                trigger: None,
            });
    }

    /// Queue an outcome that stays in flight until the returned sender is
    /// triggered (or dropped).
    pub fn add_outcome_with_trigger(
        &self,
        destination: &str,
        result: Result<(), TransportError>,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.outcomes
            .lock()
            .entry(destination.to_string())
            .or_default()
            .push(MockOutcome {
                result,
                progress: Vec::new(),
                trigger: Some(rx),
            });
        tx
    }

    /// Queue an outcome that delivers the given raw `(loaded, total)` events
    /// before completing.
    pub fn add_outcome_with_progress(
        &self,
        destination: &str,
        progress: Vec<(u64, u64)>,
        result: Result<(), TransportError>,
    ) {
        self.outcomes
            .lock()
            .entry(destination.to_string())
            .or_default()
            .push(MockOutcome {
                result,
                progress,
                trigger: None,
            });
    }

    /// Queue a trigger-gated outcome that delivers the given raw progress
    /// events before waiting on the trigger.
    pub fn add_outcome_with_progress_and_trigger(
        &self,
        destination: &str,
        progress: Vec<(u64, u64)>,
        result: Result<(), TransportError>,
    ) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.outcomes
            .lock()
            .entry(destination.to_string())
            .or_default()
            .push(MockOutcome {
                result,
                progress,
                trigger: Some(rx),
            });
        tx
    }

    /// Get all calls that have been made to this mock transport.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Number of transfers currently executing. Useful for asserting the
    /// concurrency ceiling and observing cancellation.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    type Resource = Bytes;

    async fn transfer(
        &self,
        destination: &Destination,
        resource: &Self::Resource,
        on_progress: ProgressFn,
        cancel: CancellationToken,
    ) -> Result<(), TransportError> {
        self.in_flight.fetch_add(1, Ordering::SeqCst);

        // Decrements even if the future is dropped mid-flight.
        let _guard = InFlightGuard {
            in_flight: self.in_flight.clone(),
        };

        self.calls.lock().push(MockCall {
            destination: destination.as_str().to_string(),
            len: resource.len(),
        });

        let outcome = {
            let mut outcomes = self.outcomes.lock();
            match outcomes.get_mut(destination.as_str()) {
                Some(queue) if !queue.is_empty() => Some(queue.remove(0)),
                _ => None,
            }
        };

        let Some(outcome) = outcome else {
            return Err(TransportError::new(format!(
                "no mock outcome configured for {}",
                destination
            )));
        };

        for (loaded, total) in outcome.progress {
            on_progress(loaded, total);
        }

        if let Some(trigger) = outcome.trigger {
            tokio::select! {
                _ = cancel.cancelled() => return Err(TransportError::canceled()),
                _ = trigger => {}
            }
        }

        outcome.result
    }
}

/// Guard that decrements the in-flight counter when dropped, so the count
/// stays accurate when a transfer future is dropped or panics.
struct InFlightGuard {
    in_flight: Arc<AtomicUsize>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}
