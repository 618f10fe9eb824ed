//! Global data store: the latest known value of every stream.
//!
//! The dispatcher is the only writer. Mounted widgets read through the
//! [`StreamSource`] trait on their own polling cadence; the store never calls
//! back into them, so a failing or removed widget cannot stall message
//! processing.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use telemetry_types::{GlobalDataTree, ModuleMap, StreamId, StreamValue};

/// Read-only view of stream values handed to widgets.
pub trait StreamSource: Send + Sync {
    fn get(&self, module_id: &str, stream_name: &str) -> Option<StreamValue>;
}

#[derive(Default)]
struct StoreInner {
    tree: GlobalDataTree,
    catalog: ModuleMap,
}

/// Shared handle to the process-wide value tree.
#[derive(Clone, Default)]
pub struct DataStore {
    inner: Arc<RwLock<StoreInner>>,
}

impl DataStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the whole tree. Nothing of the previous state survives.
    pub fn replace_all(&self, tree: GlobalDataTree) {
        self.write().tree = tree;
    }

    /// Overwrites the given streams of one module, leaving its other streams untouched.
    pub fn merge_module_streams(&self, module_id: &str, partial: HashMap<String, StreamValue>) {
        let mut inner = self.write();
        let module = inner.tree.data.entry(module_id.to_string()).or_default();
        for (stream_name, value) in partial {
            module.streams.insert(stream_name, value);
        }
    }

    /// Copy of the current tree.
    pub fn snapshot(&self) -> GlobalDataTree {
        self.read().tree.clone()
    }

    /// Value of a stream by its composite id, as shown when a stream is selected in the catalog.
    pub fn preview(&self, stream_id: &StreamId) -> Option<StreamValue> {
        self.get(stream_id.module_id(), stream_id.stream_name())
    }

    pub fn set_catalog(&self, catalog: ModuleMap) {
        self.write().catalog = catalog;
    }

    pub fn catalog(&self) -> ModuleMap {
        self.read().catalog.clone()
    }

    /// Flattened, sorted `module.stream` ids from the active-stream catalog.
    ///
    /// Entries that do not form a valid id are skipped.
    pub fn stream_ids(&self) -> Vec<StreamId> {
        flatten_catalog(&self.read().catalog)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, StoreInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, StoreInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl StreamSource for DataStore {
    fn get(&self, module_id: &str, stream_name: &str) -> Option<StreamValue> {
        self.read().tree.get(module_id, stream_name).cloned()
    }
}

pub(crate) fn flatten_catalog(catalog: &ModuleMap) -> Vec<StreamId> {
    let mut ids: Vec<StreamId> = catalog
        .iter()
        .flat_map(|(module_id, module)| {
            module
                .streams
                .keys()
                .filter_map(move |name| StreamId::new(module_id.clone(), name.clone()).ok())
        })
        .collect();
    ids.sort();
    ids
}
