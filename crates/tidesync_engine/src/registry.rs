//! Entity registry.
//!
//! The registry is the declared set of entity types to synchronize. Order
//! matters: sequential entities run in registration order, which is how
//! dependencies are expressed ("accounts" before "transactions").

use crate::error::{SyncError, SyncResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tidesync_store::StoragePath;

/// How an entity is scheduled within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncMode {
    /// Runs alone, in registration order, before any concurrent entity.
    Sequential,
    /// Runs independently of other concurrent entities, possibly in parallel.
    Concurrent,
}

/// A registered entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityDescriptor {
    name: String,
    storage_path: StoragePath,
    mode: SyncMode,
}

impl EntityDescriptor {
    /// Creates a descriptor.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] if the name is blank.
    pub fn new(
        name: impl Into<String>,
        storage_path: StoragePath,
        mode: SyncMode,
    ) -> SyncResult<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(SyncError::configuration("entity name must not be empty"));
        }
        Ok(Self {
            name,
            storage_path,
            mode,
        })
    }

    /// Entity name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Where the entity's records live in the local store.
    pub fn storage_path(&self) -> &StoragePath {
        &self.storage_path
    }

    /// Scheduling mode.
    pub fn mode(&self) -> SyncMode {
        self.mode
    }

    /// Returns true for [`SyncMode::Sequential`].
    pub fn is_sequential(&self) -> bool {
        self.mode == SyncMode::Sequential
    }
}

/// The declared set of entity types, in registration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityRegistry {
    entries: Vec<EntityDescriptor>,
}

impl EntityRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an entity, replacing any descriptor with the same name.
    ///
    /// A replaced descriptor keeps its original position.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::Configuration`] if the name is blank, the
    /// storage path is invalid, or the path already belongs to another
    /// entity.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        storage_path: &str,
        mode: SyncMode,
    ) -> SyncResult<()> {
        let storage_path = StoragePath::new(storage_path)
            .map_err(|e| SyncError::configuration(e.to_string()))?;
        self.register_descriptor(EntityDescriptor::new(name, storage_path, mode)?)
    }

    /// Registers an already-built descriptor.
    ///
    /// Each storage path belongs to exactly one entity; the registry is left
    /// unchanged if `descriptor` would share one.
    pub fn register_descriptor(&mut self, descriptor: EntityDescriptor) -> SyncResult<()> {
        if let Some(owner) = self.entries.iter().find(|entry| {
            entry.name != descriptor.name && entry.storage_path == descriptor.storage_path
        }) {
            return Err(SyncError::configuration(format!(
                "storage path '{}' of '{}' is already used by '{}'",
                descriptor.storage_path, descriptor.name, owner.name
            )));
        }
        match self
            .entries
            .iter_mut()
            .find(|entry| entry.name == descriptor.name)
        {
            Some(existing) => *existing = descriptor,
            None => self.entries.push(descriptor),
        }
        Ok(())
    }

    /// Builder form of [`register`](Self::register).
    pub fn with(
        mut self,
        name: impl Into<String>,
        storage_path: &str,
        mode: SyncMode,
    ) -> SyncResult<Self> {
        self.register(name, storage_path, mode)?;
        Ok(self)
    }

    /// Sequential descriptors in registration order.
    pub fn sequential_entities(&self) -> impl Iterator<Item = &EntityDescriptor> + '_ {
        self.entries.iter().filter(|entry| entry.is_sequential())
    }

    /// Concurrent descriptors. Callers must not rely on their order.
    pub fn concurrent_entities(&self) -> impl Iterator<Item = &EntityDescriptor> + '_ {
        self.entries.iter().filter(|entry| !entry.is_sequential())
    }

    /// Looks up a descriptor by name.
    pub fn get(&self, name: &str) -> Option<&EntityDescriptor> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// All descriptors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &EntityDescriptor> + '_ {
        self.entries.iter()
    }

    /// Number of registered entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One entry of a [`RegistryManifest`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Entity name.
    pub name: String,
    /// Storage path; defaults to the entity name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_path: Option<String>,
    /// Scheduling mode.
    pub mode: SyncMode,
}

/// Serializable description of a registry.
///
/// ```json
/// { "entities": [
///     { "name": "accounts", "mode": "sequential" },
///     { "name": "tags", "storage_path": "meta/tags", "mode": "concurrent" }
/// ] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryManifest {
    /// Entities in registration order.
    pub entities: Vec<ManifestEntry>,
}

impl RegistryManifest {
    /// Parses a manifest from JSON bytes.
    pub fn from_json(bytes: &[u8]) -> SyncResult<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| SyncError::configuration(format!("invalid registry manifest: {}", e)))
    }

    /// Reads a manifest from a JSON file.
    pub fn from_file(path: &Path) -> SyncResult<Self> {
        let bytes = std::fs::read(path).map_err(|e| {
            SyncError::configuration(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_json(&bytes)
    }

    /// Builds the registry described by the manifest.
    pub fn into_registry(self) -> SyncResult<EntityRegistry> {
        let mut registry = EntityRegistry::new();
        for entry in self.entities {
            let path = entry.storage_path.unwrap_or_else(|| entry.name.clone());
            registry.register(entry.name, &path, entry.mode)?;
        }
        Ok(registry)
    }
}

impl From<&EntityRegistry> for RegistryManifest {
    fn from(registry: &EntityRegistry) -> Self {
        Self {
            entities: registry
                .iter()
                .map(|d| ManifestEntry {
                    name: d.name().to_string(),
                    storage_path: Some(d.storage_path().to_string()),
                    mode: d.mode(),
                })
                .collect(),
        }
    }
}
