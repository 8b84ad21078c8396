//! Shared evaluation cache for one collaboration.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;

use crate::listener::ListenerRef;

/// Cell identity across collaborating workbooks.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Collaborator index assigned by the environment.
    pub book_index: usize,
    pub sheet: String,
    pub row: u32,
    pub col: u32,
}

impl CacheKey {
    pub fn new(book_index: usize, sheet: impl Into<String>, row: u32, col: u32) -> Self {
        Self {
            book_index,
            sheet: sheet.into(),
            row,
            col,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CachedValue {
    Empty,
    Number(f64),
    Text(String),
    Boolean(bool),
    /// Error code as rendered in a cell, e.g. `#REF!`.
    Error(String),
}

/// One cache per collaboration, built fresh by every setup.
///
/// The owning environment holds the only strong handle; members see it
/// through `Weak` references and keep the environment itself alive.
pub struct EvaluationCache {
    entries: Mutex<FxHashMap<CacheKey, CachedValue>>,
    entries_cap: usize,
    listener: Option<ListenerRef>,
}

impl EvaluationCache {
    pub fn new(listener: Option<ListenerRef>, entries_cap: usize) -> Self {
        Self {
            entries: Mutex::new(FxHashMap::default()),
            entries_cap: entries_cap.max(1),
            listener,
        }
    }

    pub fn listener(&self) -> Option<&ListenerRef> {
        self.listener.as_ref()
    }

    pub fn capacity(&self) -> usize {
        self.entries_cap
    }

    pub fn get(&self, key: &CacheKey) -> Option<CachedValue> {
        let entries = self.entries.lock();
        let found = entries.get(key).cloned();
        if let Some(listener) = &self.listener {
            if found.is_some() {
                listener.on_cache_hit(key);
            } else {
                listener.on_cache_miss(key);
            }
        }
        found
    }

    pub fn insert(&self, key: CacheKey, value: CachedValue) {
        let mut entries = self.entries.lock();
        // At capacity: drop an arbitrary entry to make room.
        if entries.len() >= self.entries_cap
            && !entries.contains_key(&key)
            && let Some(victim) = entries.keys().next().cloned()
        {
            entries.remove(&victim);
        }
        if let Some(listener) = &self.listener {
            listener.on_cache_insert(&key);
        }
        entries.insert(key, value);
    }

    /// Returns whether an entry was present.
    pub fn invalidate(&self, key: &CacheKey) -> bool {
        let mut entries = self.entries.lock();
        let removed = entries.remove(key).is_some();
        if let Some(listener) = &self.listener {
            listener.on_invalidate(key);
        }
        removed
    }

    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        let evicted = entries.len();
        entries.clear();
        if let Some(listener) = &self.listener {
            listener.on_cache_cleared(evicted);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl std::fmt::Debug for EvaluationCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationCache")
            .field("len", &self.len())
            .field("entries_cap", &self.entries_cap)
            .field("has_listener", &self.listener.is_some())
            .finish()
    }
}
