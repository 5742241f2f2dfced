//! The subscription store: a single mutex-guarded map from identifier to
//! subscription entry. This is the only shared mutable state in the
//! gateway — every mutation to an entry's subscriber list happens while
//! holding this lock.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::identifier::Identifier;
use crate::model::StatusEvent;

pub struct Subscriber {
    pub out: mpsc::Sender<StatusEvent>,
    pub cancel: CancellationToken,
}

pub struct Entry {
    pub worker_cancel: CancellationToken,
    pub subscribers: Vec<Subscriber>,
}

impl Entry {
    pub fn new(worker_cancel: CancellationToken, first: Subscriber) -> Self {
        Self {
            worker_cancel,
            subscribers: vec![first],
        }
    }
}

#[derive(Default)]
pub struct StoreInner {
    entries: HashMap<Identifier, Entry>,
    quiesced: bool,
}

pub struct Store {
    inner: Mutex<StoreInner>,
}

pub enum GetOrCreate<'a> {
    /// The store is shutting down; no entry was created or reused.
    Quiescing,
    /// An entry already existed; the subscriber was attached to it.
    Existed,
    /// A fresh entry was installed; caller must spawn its worker and pump.
    Created(&'a mut Entry),
}

impl Store {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(StoreInner::default()),
        }
    }

    /// Acquire the single store lock. Holding the returned guard is the
    /// entire critical section — dropping it is the only way to release it,
    /// which keeps entry/exit symmetric everywhere callers use the store.
    pub fn lock(&self) -> MutexGuard<'_, StoreInner> {
        self.inner.lock().expect("subscription store mutex poisoned")
    }

    pub fn get_or_create<'a>(
        guard: &'a mut MutexGuard<'_, StoreInner>,
        id: Identifier,
        build_worker_cancel: impl FnOnce() -> CancellationToken,
        subscriber: Subscriber,
    ) -> GetOrCreate<'a> {
        if guard.quiesced {
            return GetOrCreate::Quiescing;
        }

        if let Some(entry) = guard.entries.get_mut(&id) {
            entry.subscribers.push(subscriber);
            return GetOrCreate::Existed;
        }

        let entry = Entry::new(build_worker_cancel(), subscriber);
        guard.entries.insert(id, entry);
        GetOrCreate::Created(guard.entries.get_mut(&id).expect("just inserted"))
    }

    pub fn get_mut<'a>(
        guard: &'a mut MutexGuard<'_, StoreInner>,
        id: &Identifier,
    ) -> Option<&'a mut Entry> {
        guard.entries.get_mut(id)
    }

    /// Removes the entry for `id`. The caller still holds `guard` and is
    /// responsible for dropping it (ending the critical section) when done —
    /// this function never releases the lock itself.
    pub fn delete_locked(guard: &mut MutexGuard<'_, StoreInner>, id: &Identifier) {
        guard.entries.remove(id);
    }

    /// Marks the store permanently unusable and returns every worker's
    /// cancellation token so the caller can tear them all down.
    pub fn quiesce_and_drain(&self) -> Vec<CancellationToken> {
        let mut guard = self.lock();
        guard.quiesced = true;
        guard
            .entries
            .drain()
            .map(|(_, entry)| entry.worker_cancel)
            .collect()
    }

    pub fn is_quiesced(&self) -> bool {
        self.lock().quiesced
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}
