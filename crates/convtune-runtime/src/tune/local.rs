use super::{AutotuneKey, TuneCache, TuneCacheResult};
use core::{fmt::Display, hash::Hash};
use hashbrown::HashMap;

/// A local tuner keeps the tuning results of one kind of operation, split by an id (usually the
/// client id, so every accelerator context tunes on its own).
///
/// It is meant to be declared as a static with [local_tuner].
pub struct LocalTuner<AK: AutotuneKey, ID> {
    state: spin::RwLock<Option<HashMap<ID, TuneCache<AK>>>>,
    name: &'static str,
}

/// Create a local tuner with the provided name.
#[macro_export]
macro_rules! local_tuner {
    ($name:expr) => {
        LocalTuner::new(concat!(module_path!(), "-", $name))
    };
    () => {
        LocalTuner::new(module_path!())
    };
}

pub use local_tuner;

impl<AK: AutotuneKey, ID: Hash + PartialEq + Eq + Clone + Display> LocalTuner<AK, ID> {
    /// Create a new local tuner.
    pub const fn new(name: &'static str) -> Self {
        Self {
            state: spin::RwLock::new(None),
            name,
        }
    }

    /// Return the autotune result given a key.
    pub fn fastest(&self, id: &ID, key: &AK) -> TuneCacheResult {
        if let Some(state) = self.state.read().as_ref() {
            if let Some(cache) = state.get(id) {
                return cache.fastest(key);
            }
        }

        TuneCacheResult::Miss
    }

    /// Register the fastest index found for `key`.
    pub fn register(&self, id: &ID, key: AK, fastest_index: usize) {
        log::info!(
            "{} - fastest index for {key} on {id} is {fastest_index}",
            self.name.replace("::", "-")
        );

        let mut state = self.state.write();
        let map = state.get_or_insert_with(Default::default);
        map.entry(id.clone())
            .or_insert_with(TuneCache::new)
            .cache_insert(key, fastest_index);
    }
}
