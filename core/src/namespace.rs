//! Namespace registry (§4.1): "a global registry... map from namespace ->
//! DM". Each namespace owns one [`DataModel`], created on first touch and
//! torn down explicitly — there is no reference counting here, the
//! embedding module (whatever creates and destroys network namespaces)
//! calls `remove` when it knows the namespace is gone.

use alloc::sync::Arc;

use hashbrown::HashMap;
use ripc_sync::fast_mutex::FastMutex;

use crate::config::CoreConfig;
use crate::control_device::NamespaceId;
use crate::dm::DataModel;
use crate::error::{CoreError, CoreResult};

pub struct Namespaces {
    table: FastMutex<HashMap<NamespaceId, Arc<DataModel>>>,
}

impl Namespaces {
    pub fn new() -> Self {
        Self {
            table: FastMutex::new(HashMap::new()),
        }
    }

    /// Returns the namespace's [`DataModel`], creating it with `config` if
    /// this is the first reference.
    pub fn get_or_create(&self, namespace: NamespaceId, config: CoreConfig) -> Arc<DataModel> {
        let mut guard = self.table.lock();
        guard
            .entry(namespace)
            .or_insert_with(|| Arc::new(DataModel::new(namespace, config)))
            .clone()
    }

    pub fn get(&self, namespace: NamespaceId) -> CoreResult<Arc<DataModel>> {
        self.table
            .lock()
            .get(&namespace)
            .cloned()
            .ok_or(CoreError::NotFound)
    }

    /// Drops the namespace's `DataModel`. Any `Arc` clones already handed
    /// out to in-flight callers keep it alive until they finish.
    pub fn remove(&self, namespace: NamespaceId) {
        self.table.lock().remove(&namespace);
    }

    pub fn len(&self) -> usize {
        self.table.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for Namespaces {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_or_create_returns_the_same_data_model_on_repeat_calls() {
        let ns = Namespaces::new();
        let a = ns.get_or_create(1, CoreConfig::default());
        let b = ns.get_or_create(1, CoreConfig::default());
        assert_eq!(Arc::as_ptr(&a), Arc::as_ptr(&b));
    }

    #[test]
    fn get_on_an_unknown_namespace_fails_with_not_found() {
        let ns = Namespaces::new();
        assert_eq!(ns.get(7).unwrap_err(), CoreError::NotFound);
    }

    #[test]
    fn remove_drops_the_entry() {
        let ns = Namespaces::new();
        ns.get_or_create(2, CoreConfig::default());
        assert_eq!(ns.len(), 1);
        ns.remove(2);
        assert!(ns.is_empty());
    }
}
