//! Per-item resource bindings.
//!
//! The tracker owns the `id -> {resource, destination, cancellation token}`
//! association for every item in the batch. It is only ever touched through
//! coordinator methods: inserted by submission, destination-rebound on
//! credential refresh, removed on explicit caller action. Admission and the
//! executor read it, never mutate it.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use crate::item::{Destination, ItemId};

/// Binding for a single item.
pub(crate) struct Binding<R> {
    /// Resumability resource required to (re)attempt the transfer. `None`
    /// when the resource became unavailable independently of coordinator
    /// state (restored batch, revoked handle) and must be reacquired.
    pub resource: Option<R>,
    pub destination: Destination,
    /// Present only while the item is active.
    pub cancel: Option<CancellationToken>,
}

pub(crate) struct ResourceTracker<R> {
    bindings: HashMap<ItemId, Binding<R>>,
}

impl<R: Clone> ResourceTracker<R> {
    pub fn new() -> Self {
        Self {
            bindings: HashMap::new(),
        }
    }

    pub fn insert(&mut self, id: ItemId, destination: Destination, resource: Option<R>) {
        self.bindings.insert(
            id,
            Binding {
                resource,
                destination,
                cancel: None,
            },
        );
    }

    pub fn remove(&mut self, id: &ItemId) {
        self.bindings.remove(id);
    }

    pub fn clear(&mut self) {
        self.bindings.clear();
    }

    /// Capability query: can this item's transfer be (re)attempted?
    pub fn has_resource(&self, id: &ItemId) -> bool {
        self.bindings
            .get(id)
            .is_some_and(|b| b.resource.is_some())
    }

    pub fn resource(&self, id: &ItemId) -> Option<R> {
        self.bindings.get(id).and_then(|b| b.resource.clone())
    }

    pub fn destination(&self, id: &ItemId) -> Option<Destination> {
        self.bindings.get(id).map(|b| b.destination.clone())
    }

    /// Replace the destination endpoint, keeping resource and token intact.
    pub fn rebind(&mut self, id: &ItemId, destination: Destination) -> bool {
        match self.bindings.get_mut(id) {
            Some(binding) => {
                binding.destination = destination;
                true
            }
            None => false,
        }
    }

    /// Attach a reacquired resource to an existing binding.
    pub fn bind_resource(&mut self, id: &ItemId, resource: R) -> bool {
        match self.bindings.get_mut(id) {
            Some(binding) => {
                binding.resource = Some(resource);
                true
            }
            None => false,
        }
    }

    pub fn set_cancel(&mut self, id: &ItemId, token: CancellationToken) {
        if let Some(binding) = self.bindings.get_mut(id) {
            binding.cancel = Some(token);
        }
    }

    pub fn take_cancel(&mut self, id: &ItemId) -> Option<CancellationToken> {
        self.bindings.get_mut(id).and_then(|b| b.cancel.take())
    }

    pub fn cancel_token(&self, id: &ItemId) -> Option<CancellationToken> {
        self.bindings.get(id).and_then(|b| b.cancel.clone())
    }
}
