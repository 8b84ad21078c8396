/// Settings shared by every environment a context builds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CollabConfig {
    /// Upper bound on entries held by each collaboration's shared cache.
    pub cache_capacity: usize,
}

impl Default for CollabConfig {
    fn default() -> Self {
        Self {
            cache_capacity: 65_536,
        }
    }
}

impl CollabConfig {
    pub fn bounded(cache_capacity: usize) -> Self {
        Self { cache_capacity }
    }
}
