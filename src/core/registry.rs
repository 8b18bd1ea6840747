//! Instance registry - Ordered list of instances, written through to disk

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info, warn};

use super::instance::Instance;
use crate::persistence::{JsonStore, StoreError};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to persist instance registry: {0}")]
    Persist(#[from] StoreError),
}

/// Persistent, ordered registry of instances
///
/// Every mutation rewrites the whole file. Indices are positional and shift
/// after a removal, so callers re-resolve their selection after mutating.
pub struct InstanceRegistry {
    store: JsonStore<Vec<Instance>>,
    instances: Vec<Instance>,
    load_warning: Option<String>,
}

impl InstanceRegistry {
    /// Open the registry, loading whatever is on disk
    ///
    /// A missing or corrupt file yields an empty registry; the problem is
    /// logged and kept in [`InstanceRegistry::load_warning`].
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let store = JsonStore::new(path);
        let (instances, load_warning) = Self::load_from(&store);
        info!(
            "Loaded {} instance(s) from {:?}",
            instances.len(),
            store.path()
        );
        Self {
            store,
            instances,
            load_warning,
        }
    }

    fn load_from(store: &JsonStore<Vec<Instance>>) -> (Vec<Instance>, Option<String>) {
        match store.load() {
            Ok(Some(instances)) => (instances, None),
            Ok(None) => (Vec::new(), None),
            Err(e) => {
                warn!("Ignoring unreadable instance registry: {}", e);
                (Vec::new(), Some(e.to_string()))
            }
        }
    }

    /// Re-read the backing file, replacing the in-memory list
    pub fn load(&mut self) -> &[Instance] {
        let (instances, load_warning) = Self::load_from(&self.store);
        self.instances = instances;
        self.load_warning = load_warning;
        &self.instances
    }

    /// Overwrite the backing file with the given list
    ///
    /// The in-memory list only changes once the write succeeded.
    pub fn save(&mut self, instances: Vec<Instance>) -> Result<(), RegistryError> {
        self.store.save(&instances)?;
        self.instances = instances;
        Ok(())
    }

    /// Append an instance and persist
    pub fn add(
        &mut self,
        name: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Result<usize, RegistryError> {
        let instance = Instance::new(name, path);
        info!("Registering instance '{}' at {:?}", instance.name, instance.path);
        let mut instances = self.instances.clone();
        instances.push(instance);
        self.save(instances)?;
        Ok(self.instances.len() - 1)
    }

    /// Remove the instance at `index` and persist
    ///
    /// Out-of-range indices are ignored and return `Ok(None)`.
    pub fn remove_at(&mut self, index: usize) -> Result<Option<Instance>, RegistryError> {
        if index >= self.instances.len() {
            debug!("Ignoring removal of out-of-range index {}", index);
            return Ok(None);
        }
        let mut instances = self.instances.clone();
        let removed = instances.remove(index);
        self.save(instances)?;
        info!("Removed instance '{}'", removed.name);
        Ok(Some(removed))
    }

    /// Copy of the instance at `index`
    pub fn get(&self, index: usize) -> Option<Instance> {
        self.instances.get(index).cloned()
    }

    pub fn instances(&self) -> &[Instance] {
        &self.instances
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn path(&self) -> &Path {
        self.store.path()
    }

    /// Problem encountered by the last load, if any
    pub fn load_warning(&self) -> Option<&str> {
        self.load_warning.as_deref()
    }
}
