//! Process-wide, per-document state shared by every session.
//!
//! Entries are created on first reference. Each document gets its own lock,
//! so writers to different documents never contend beyond the short map
//! lookup. With a capacity set, the least recently touched document is
//! evicted when a new one would exceed it. Entries someone still holds a
//! handle to are never evicted, so a write through that handle cannot land
//! on a detached entry.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::DocumentRef;

pub struct DocumentRegistry<T> {
    capacity: Option<usize>,
    inner: Mutex<RegistryInner<T>>,
}

struct RegistryInner<T> {
    entries: HashMap<DocumentRef, Slot<T>>,
    clock: u64,
}

struct Slot<T> {
    value: Arc<Mutex<T>>,
    last_used: u64,
}

impl<T: Default> DocumentRegistry<T> {
    pub fn new() -> Self {
        Self::with_capacity(None)
    }

    pub fn with_capacity(capacity: Option<usize>) -> Self {
        Self {
            capacity: capacity.filter(|&c| c > 0),
            inner: Mutex::new(RegistryInner {
                entries: HashMap::new(),
                clock: 0,
            }),
        }
    }

    /// Returns the entry for `doc`, creating an empty one on first reference.
    pub fn entry(&self, doc: &DocumentRef) -> Arc<Mutex<T>> {
        let mut inner = self.inner.lock();
        inner.clock += 1;
        let now = inner.clock;

        if let Some(slot) = inner.entries.get_mut(doc) {
            slot.last_used = now;
            return Arc::clone(&slot.value);
        }

        let value = Arc::new(Mutex::new(T::default()));
        inner.entries.insert(
            doc.clone(),
            Slot {
                value: Arc::clone(&value),
                last_used: now,
            },
        );

        if let Some(capacity) = self.capacity {
            while inner.entries.len() > capacity {
                let oldest = inner
                    .entries
                    .iter()
                    .filter(|(key, slot)| *key != doc && Arc::strong_count(&slot.value) == 1)
                    .min_by_key(|(_, slot)| slot.last_used)
                    .map(|(key, _)| key.clone());
                match oldest {
                    Some(key) => {
                        debug!(document = %key, "evicting registry entry");
                        inner.entries.remove(&key);
                    }
                    None => break,
                }
            }
        }

        value
    }

    /// Returns the entry for `doc` without creating one.
    pub fn get(&self, doc: &DocumentRef) -> Option<Arc<Mutex<T>>> {
        let mut inner = self.inner.lock();
        inner.clock += 1;
        let now = inner.clock;
        inner.entries.get_mut(doc).map(|slot| {
            slot.last_used = now;
            Arc::clone(&slot.value)
        })
    }

    /// Runs `f` while holding the document's lock.
    pub fn update<R>(&self, doc: &DocumentRef, f: impl FnOnce(&mut T) -> R) -> R {
        let entry = self.entry(doc);
        let mut guard = entry.lock();
        f(&mut *guard)
    }

    pub fn read<R>(&self, doc: &DocumentRef, f: impl FnOnce(&T) -> R) -> Option<R> {
        let entry = self.get(doc)?;
        let guard = entry.lock();
        Some(f(&*guard))
    }

    pub fn remove(&self, doc: &DocumentRef) -> bool {
        self.inner.lock().entries.remove(doc).is_some()
    }

    pub fn contains(&self, doc: &DocumentRef) -> bool {
        self.inner.lock().entries.contains_key(doc)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Default> Default for DocumentRegistry<T> {
    fn default() -> Self {
        Self::new()
    }
}
