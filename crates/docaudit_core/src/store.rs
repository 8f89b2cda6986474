//! Shared context store: narrow `(get, subscribe, update)` cells.
//!
//! Concurrent transfers race to mutate the same upload collection, so writers
//! never hand in a finished value computed from an older snapshot. They pass a
//! closure that receives the current value and returns the next one; the read
//! and the write happen under one lock.
//!
//! Listeners see values in write order. Each write is queued under the value
//! lock, and a single writer at a time drains the queue to the listeners.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::identity::Identity;
use crate::uploads::UploadSet;

pub type SubscriptionId = u64;

type Listener<T> = Arc<dyn Fn(&T) + Send + Sync>;

struct Slot<T> {
    value: T,
    pending: VecDeque<T>,
    draining: bool,
}

struct Inner<T> {
    value: Mutex<Slot<T>>,
    listeners: Mutex<Vec<(SubscriptionId, Listener<T>)>>,
    next_subscription: AtomicU64,
}

/// A cloneable handle to one shared value.
pub struct Store<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for Store<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Default + Clone> Default for Store<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

fn lock<U>(mutex: &Mutex<U>) -> MutexGuard<'_, U> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl<T: Clone> Store<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(Inner {
                value: Mutex::new(Slot {
                    value,
                    pending: VecDeque::new(),
                    draining: false,
                }),
                listeners: Mutex::new(Vec::new()),
                next_subscription: AtomicU64::new(1),
            }),
        }
    }

    /// Snapshot of the current value.
    pub fn get(&self) -> T {
        lock(&self.inner.value).value.clone()
    }

    /// Read-then-write as one step. Returns the new value.
    pub fn update<F>(&self, mutator: F) -> T
    where
        F: FnOnce(T) -> T,
    {
        let (next, drain) = {
            let mut slot = lock(&self.inner.value);
            let next = mutator(slot.value.clone());
            slot.value = next.clone();
            slot.pending.push_back(next.clone());
            let drain = !slot.draining;
            slot.draining = true;
            (next, drain)
        };
        if drain {
            self.drain();
        }
        next
    }

    /// Blind overwrite, for values that do not depend on the previous one.
    pub fn set(&self, value: T) {
        self.update(|_| value);
    }

    /// Registers a listener invoked with every new value.
    pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.next_subscription.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.listeners).push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut listeners = lock(&self.inner.listeners);
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    /// Delivers queued values in order. Writes made meanwhile, including
    /// from listeners, join the queue instead of notifying on their own.
    fn drain(&self) {
        loop {
            let value = {
                let mut slot = lock(&self.inner.value);
                match slot.pending.pop_front() {
                    Some(value) => value,
                    None => {
                        slot.draining = false;
                        return;
                    }
                }
            };
            self.notify(&value);
        }
    }

    fn notify(&self, value: &T) {
        // Listeners run outside the value lock so they may read or update the store.
        let listeners: Vec<Listener<T>> = lock(&self.inner.listeners)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(value);
        }
    }
}

/// Process-wide, view-independent state: who is signed in and which files exist.
#[derive(Clone, Default)]
pub struct ContextStore {
    pub identity: Store<Option<Identity>>,
    pub files: Store<UploadSet>,
}

impl ContextStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subject of the active identity, if any.
    pub fn subject(&self) -> Option<String> {
        self.identity.get().map(|identity| identity.subject)
    }

    /// Names of stored files, used as context for queries and audits.
    pub fn stored_file_names(&self) -> Vec<String> {
        self.files.get().stored_names()
    }

    /// Tears down per-session state on logout or unmount.
    pub fn reset(&self) {
        self.identity.set(None);
        self.files.set(UploadSet::new());
    }
}
