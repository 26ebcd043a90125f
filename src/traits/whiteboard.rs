// Copyright (c) 2025 Steve Wagner (ciroque@live.com)
// SPDX-License-Identifier: MIT

//! Contract of the transient event data store ("whiteboard").
//!
//! The whiteboard partitions the transient store into one isolated slot per
//! event in flight; the scheduler allocates a store when it accepts an event
//! and frees it at sign-off. Per-slot isolation is what makes cross-slot
//! locking unnecessary in the algorithm bodies.

use std::sync::Mutex;

pub trait Whiteboard: Send + Sync {
    /// Number of event stores the whiteboard was partitioned into. The
    /// scheduler sizes its slot pool to this.
    fn store_count(&self) -> usize;

    /// Activate the given store for the calling context.
    fn select_store(&self, store: usize);

    /// Drop all data products held by the store.
    fn clear_store(&self, store: usize);

    /// Claim a free store for the given event. Returns the store index, or
    /// `None` when every store is taken.
    fn allocate_store(&self, event_number: u64) -> Option<usize>;

    /// Return a store to the free pool.
    fn free_store(&self, store: usize);
}

/// A minimal in-process whiteboard: tracks store occupancy only. Suitable
/// for tests and for the demo driver, where algorithms keep their products
/// in their own state.
pub struct InMemoryWhiteboard {
    stores: Mutex<Vec<Option<u64>>>,
}

impl InMemoryWhiteboard {
    pub fn new(store_count: usize) -> Self {
        Self {
            stores: Mutex::new(vec![None; store_count]),
        }
    }

    /// Event currently held by a store, if any.
    pub fn occupant(&self, store: usize) -> Option<u64> {
        let stores = self.stores.lock().unwrap_or_else(|e| e.into_inner());
        stores.get(store).copied().flatten()
    }
}

impl Whiteboard for InMemoryWhiteboard {
    fn store_count(&self) -> usize {
        let stores = self.stores.lock().unwrap_or_else(|e| e.into_inner());
        stores.len()
    }

    fn select_store(&self, _store: usize) {}

    fn clear_store(&self, _store: usize) {}

    fn allocate_store(&self, event_number: u64) -> Option<usize> {
        let mut stores = self.stores.lock().unwrap_or_else(|e| e.into_inner());
        let free = stores.iter().position(|s| s.is_none())?;
        stores[free] = Some(event_number);
        Some(free)
    }

    fn free_store(&self, store: usize) {
        let mut stores = self.stores.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(entry) = stores.get_mut(store) {
            *entry = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_and_release() {
        let wb = InMemoryWhiteboard::new(2);
        let a = wb.allocate_store(10).unwrap();
        let b = wb.allocate_store(11).unwrap();
        assert_ne!(a, b);
        assert!(wb.allocate_store(12).is_none());

        wb.free_store(a);
        assert_eq!(wb.allocate_store(12), Some(a));
        assert_eq!(wb.occupant(a), Some(12));
    }
}
