//! Concurrent transfer coordination with lifecycle tracking, cooperative
//! cancellation, retry, and session-expiry recovery.
//!
//! This crate coordinates simultaneous outbound transfers against an opaque
//! [`Transport`]: it enforces a concurrency ceiling, admits queued items in
//! FIFO submission order, tracks per-item state and progress, cancels
//! cooperatively, retries failed items, and re-arms expired items once the
//! caller refreshes credentials, all without losing already-completed work.
//!
//! The byte transport itself, credential issuance, and content validation
//! are external collaborators; the coordinator only consumes the
//! [`Transport`] contract and its error vocabulary.

pub mod batch;
pub mod error;
pub mod item;
pub mod manager;
mod resources;
pub mod session;
pub mod transport;

// Re-export commonly used types
pub use batch::{BatchSnapshot, CompletionPolicy};
pub use error::TransportError;
pub use item::{Category, Destination, ErrorKind, ItemId, TransferItem, TransferStatus};
pub use manager::{
    DestinationUpdate, ManagerConfig, NewTransfer, RestoredTransfer, TransferCallbacks,
    TransferManager,
};
pub use session::SessionGuard;
pub use transport::{HttpTransport, MockCall, MockTransport, ProgressFn, Transport};
