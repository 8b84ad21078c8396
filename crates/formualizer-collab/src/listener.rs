use std::sync::Arc;

use crate::cache::CacheKey;

/// Passive observer of shared-cache activity.
///
/// Every hook defaults to a no-op so implementors only override what they
/// care about. Hooks run while the cache lock is held; they must not call
/// back into the cache.
pub trait EvaluationListener: Send + Sync {
    fn on_cache_hit(&self, _key: &CacheKey) {}
    fn on_cache_miss(&self, _key: &CacheKey) {}
    fn on_cache_insert(&self, _key: &CacheKey) {}
    fn on_invalidate(&self, _key: &CacheKey) {}
    fn on_cache_cleared(&self, _evicted: usize) {}
}

pub type ListenerRef = Arc<dyn EvaluationListener>;

/// Identity comparison of two optional listeners.
///
/// Two distinct listener objects are different even when they would behave
/// identically; `None` only matches `None`.
pub fn same_listener(a: Option<&ListenerRef>, b: Option<&ListenerRef>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b)),
        _ => false,
    }
}
