//! Shared control tables.
//!
//! Small typed tables visible to both the classifier fast path and the
//! control surface: the live configuration slot, the replaceable policy
//! slots, and the queue-steering registry. Fast-path reads are lock-free;
//! the steering registry is control-plane only.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use arc_swap::{ArcSwap, Guard};

use crate::config::Config;
use crate::memory::SteerTx;

/// The live configuration slot.
///
/// Writers install a whole new snapshot with a pointer swap; the classifier
/// loads one consistent snapshot per packet and never observes a torn value.
pub struct ConfigSlot {
    inner: ArcSwap<Config>,
}

impl ConfigSlot {
    pub fn new(config: Config) -> Self {
        ConfigSlot {
            inner: ArcSwap::from_pointee(config),
        }
    }

    /// Lock-free snapshot load, safe from the classifier context.
    #[inline]
    pub fn load(&self) -> Guard<Arc<Config>> {
        self.inner.load()
    }

    /// Atomically installs a new snapshot.
    pub fn store(&self, config: Config) {
        self.inner.store(Arc::new(config));
    }
}

/// An atomically replaceable policy implementation.
pub struct PolicySlot<P: ?Sized> {
    inner: ArcSwap<Box<P>>,
}

impl<P: ?Sized> PolicySlot<P> {
    pub fn new(policy: Box<P>) -> Self {
        PolicySlot {
            inner: ArcSwap::from_pointee(policy),
        }
    }

    #[inline]
    pub fn load(&self) -> Arc<Box<P>> {
        self.inner.load_full()
    }

    pub fn store(&self, policy: Box<P>) {
        self.inner.store(Arc::new(policy));
    }
}

/// Control-plane registry mapping an RX queue to its steering handle.
///
/// Populated at init, drained at start when each handle moves into its
/// classifier thread; rings stay single-producer by construction.
pub(crate) struct SteerTable {
    entries: Mutex<HashMap<u32, SteerTx>>,
}

impl SteerTable {
    pub fn new() -> Self {
        SteerTable {
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn set(&self, queue_id: u32, tx: SteerTx) {
        self.entries.lock().unwrap().insert(queue_id, tx);
    }

    pub fn unset(&self, queue_id: u32) -> Option<SteerTx> {
        self.entries.lock().unwrap().remove(&queue_id)
    }

    /// Removes and returns the handle for `queue_id`, falling back to
    /// `fallback` when the queue has no dedicated registration.
    pub fn take(&self, queue_id: u32, fallback: u32) -> Option<SteerTx> {
        let mut entries = self.entries.lock().unwrap();
        entries
            .remove(&queue_id)
            .or_else(|| entries.remove(&fallback))
    }

    /// Runs `f` against the registered handle for `queue_id`, if any.
    pub fn with<R>(&self, queue_id: u32, f: impl FnOnce(&mut SteerTx) -> R) -> Option<R> {
        self.entries.lock().unwrap().get_mut(&queue_id).map(f)
    }
}
