//! Key/value storage shared by every open tab, with change notifications.
//!
//! Mirrors browser local storage: a write from one tab is visible to all of
//! them, and every *other* tab receives a `StorageEvent` for it.
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use client_logging::{client_debug, client_error};
use tokio::sync::broadcast;

use crate::persist::{PersistError, StateFile};

pub type TabId = u64;

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub origin: TabId,
    pub key: String,
    /// `None` when the key was removed.
    pub new_value: Option<String>,
}

pub struct SharedStorage {
    items: Mutex<BTreeMap<String, String>>,
    events: broadcast::Sender<StorageEvent>,
    backing: Option<StateFile>,
    next_tab: AtomicU64,
}

impl SharedStorage {
    pub fn in_memory() -> Arc<Self> {
        Arc::new(Self::with_items(BTreeMap::new(), None))
    }

    /// Storage persisted to a `ron` file; a missing file starts empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Arc<Self>, PersistError> {
        let file = StateFile::new(path);
        let items: BTreeMap<String, String> = file.load()?;
        client_debug!("loaded {} storage keys from {:?}", items.len(), file.path());
        Ok(Arc::new(Self::with_items(items, Some(file))))
    }

    fn with_items(items: BTreeMap<String, String>, backing: Option<StateFile>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            items: Mutex::new(items),
            events,
            backing,
            next_tab: AtomicU64::new(1),
        }
    }

    /// Opens a new tab view onto this storage.
    pub fn tab(self: &Arc<Self>) -> StorageTab {
        StorageTab {
            id: self.next_tab.fetch_add(1, Ordering::Relaxed),
            shared: Arc::clone(self),
        }
    }

    fn items(&self) -> MutexGuard<'_, BTreeMap<String, String>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, origin: TabId, key: &str, value: Option<String>) {
        {
            let mut items = self.items();
            let changed = match &value {
                Some(v) => items.insert(key.to_string(), v.clone()).as_ref() != Some(v),
                None => items.remove(key).is_some(),
            };
            if !changed {
                return;
            }
            if let Some(file) = &self.backing {
                if let Err(err) = file.save(&*items) {
                    client_error!("failed to persist storage to {:?}: {}", file.path(), err);
                }
            }
        }
        // No receivers is fine: nobody else is listening yet.
        let _ = self.events.send(StorageEvent {
            origin,
            key: key.to_string(),
            new_value: value,
        });
    }
}

/// One tab's handle on the shared storage.
#[derive(Clone)]
pub struct StorageTab {
    id: TabId,
    shared: Arc<SharedStorage>,
}

impl StorageTab {
    pub fn id(&self) -> TabId {
        self.id
    }

    pub fn get_item(&self, key: &str) -> Option<String> {
        self.shared.items().get(key).cloned()
    }

    pub fn set_item(&self, key: &str, value: impl Into<String>) {
        self.shared.write(self.id, key, Some(value.into()));
    }

    pub fn remove_item(&self, key: &str) {
        self.shared.write(self.id, key, None);
    }

    pub fn keys_with_prefix(&self, prefix: &str) -> Vec<String> {
        self.shared
            .items()
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect()
    }

    /// Change notifications caused by other tabs.
    pub fn subscribe(&self) -> StorageEvents {
        StorageEvents {
            rx: self.shared.events.subscribe(),
            tab: self.id,
        }
    }
}

pub struct StorageEvents {
    rx: broadcast::Receiver<StorageEvent>,
    tab: TabId,
}

impl StorageEvents {
    /// Next event from another tab; `None` once the storage is gone.
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) if event.origin == self.tab => continue,
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    client_debug!("storage listener skipped {} events", skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
