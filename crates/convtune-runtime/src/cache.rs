use crate::{id::KernelId, kernel::CompiledKernel};
use hashbrown::HashMap;

/// Registry of compiled kernels, keyed by [kernel id](KernelId).
///
/// Entries are never evicted. Inserting an id that is already present keeps the first entry, so
/// two racing compilations of the same kernel converge on a single registered kernel.
#[derive(Debug)]
pub struct KernelCache<K> {
    kernels: spin::RwLock<HashMap<KernelId, CompiledKernel<K>>>,
}

impl<K> Default for KernelCache<K> {
    fn default() -> Self {
        Self {
            kernels: spin::RwLock::new(HashMap::new()),
        }
    }
}

impl<K: Clone> KernelCache<K> {
    /// Lookup a compiled kernel.
    pub fn get(&self, id: &KernelId) -> Option<CompiledKernel<K>> {
        self.kernels.read().get(id).cloned()
    }

    /// Register a compiled kernel unless one is already registered for the same id.
    ///
    /// Returns the registered kernel, which is the previous one when present.
    pub fn insert_if_absent(&self, id: KernelId, kernel: CompiledKernel<K>) -> CompiledKernel<K> {
        let mut kernels = self.kernels.write();
        kernels.entry(id).or_insert(kernel).clone()
    }

    /// Whether a kernel is registered for the id.
    pub fn contains(&self, id: &KernelId) -> bool {
        self.kernels.read().contains_key(id)
    }

    /// Number of registered kernels.
    pub fn len(&self) -> usize {
        self.kernels.read().len()
    }

    /// Whether no kernel was registered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
