//! Serialization registry
//!
//! Bidirectional map from a stable 128-bit type id to a
//! `{class, serializer}` pair.
//!
//! # Thread Safety
//!
//! - Lookups are lock-free reads against two `DashMap` indices
//! - `register`/`unregister` are serialized through one monitor, which also
//!   owns the reference counts
//!
//! Registration happens at startup or plugin load; lookup happens for every
//! object encoded, so the read path never takes the monitor.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let registry = SerializationRegistry::new();
//! registry.register(NODE_ID, TypeKey::of::<Node>(), Arc::new(NodeSerializer))?;
//!
//! let info = registry.info_by_id(&NODE_ID)?;
//! ```

use crate::error::{Result, SerializationError};
use crate::serializer::{Serializer, TypeKey};
use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::any::TypeId;
use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

/// Registered type information.
pub struct SerializationInfo {
    id: Uuid,
    class: TypeKey,
    serializer: Arc<dyn Serializer>,
}

impl SerializationInfo {
    /// Create a new info record
    pub fn new(id: Uuid, class: TypeKey, serializer: Arc<dyn Serializer>) -> Self {
        SerializationInfo {
            id,
            class,
            serializer,
        }
    }

    /// Stable type id written to the wire
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Class this id maps to
    pub fn class(&self) -> TypeKey {
        self.class
    }

    /// Serializer for this type
    pub fn serializer(&self) -> &Arc<dyn Serializer> {
        &self.serializer
    }
}

impl fmt::Debug for SerializationInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializationInfo")
            .field("id", &self.id)
            .field("class", &self.class)
            .finish()
    }
}

/// Source of type information outside the registry's own maps.
pub trait SerializationRegistryExtension: Send + Sync {
    /// Find info by type id
    fn find_info_by_id(&self, id: &Uuid) -> Option<Arc<SerializationInfo>>;

    /// Find info by class
    fn find_info_by_class(&self, class: TypeId) -> Option<Arc<SerializationInfo>>;
}

/// Ordered chain of extensions; the first match wins.
#[derive(Default)]
pub struct CompositeSerializationRegistryExtension {
    extensions: Vec<Arc<dyn SerializationRegistryExtension>>,
}

impl CompositeSerializationRegistryExtension {
    /// Create a chain from an ordered list
    pub fn new(extensions: Vec<Arc<dyn SerializationRegistryExtension>>) -> Self {
        CompositeSerializationRegistryExtension { extensions }
    }

    /// Append an extension to the end of the chain
    pub fn push(&mut self, extension: Arc<dyn SerializationRegistryExtension>) {
        self.extensions.push(extension);
    }
}

impl SerializationRegistryExtension for CompositeSerializationRegistryExtension {
    fn find_info_by_id(&self, id: &Uuid) -> Option<Arc<SerializationInfo>> {
        self.extensions.iter().find_map(|e| e.find_info_by_id(id))
    }

    fn find_info_by_class(&self, class: TypeId) -> Option<Arc<SerializationInfo>> {
        self.extensions.iter().find_map(|e| e.find_info_by_class(class))
    }
}

/// Registration glue implemented by collaborators that contribute types.
pub trait SerializationRegistrar {
    /// Register this collaborator's types
    fn register(&self, registry: &SerializationRegistry) -> Result<()>;

    /// Unregister this collaborator's types
    fn unregister(&self, registry: &SerializationRegistry) -> Result<()>;
}

/// Thread-safe type registry.
pub struct SerializationRegistry {
    by_id: DashMap<Uuid, Arc<SerializationInfo>>,
    by_class: DashMap<TypeId, Arc<SerializationInfo>>,
    /// Mutation monitor: reference counts per registered id
    ref_counts: Mutex<FxHashMap<Uuid, usize>>,
    extension: Option<Arc<dyn SerializationRegistryExtension>>,
}

impl SerializationRegistry {
    /// Create an empty registry without extensions
    pub fn new() -> Self {
        SerializationRegistry {
            by_id: DashMap::new(),
            by_class: DashMap::new(),
            ref_counts: Mutex::new(FxHashMap::default()),
            extension: None,
        }
    }

    /// Create an empty registry consulting `extension` before its own maps
    pub fn with_extension(extension: Arc<dyn SerializationRegistryExtension>) -> Self {
        SerializationRegistry {
            extension: Some(extension),
            ..Self::new()
        }
    }

    /// Register `serializer` for `class` under `id`.
    ///
    /// Re-registering the same id/class pair increments a reference count.
    pub fn register(
        &self,
        id: Uuid,
        class: TypeKey,
        serializer: Arc<dyn Serializer>,
    ) -> Result<()> {
        let mut ref_counts = self.ref_counts.lock();

        if let Some(existing) = self.by_id.get(&id) {
            if existing.class() != class {
                return Err(SerializationError::invalid_argument(format!(
                    "id {} is registered for {:?}, cannot register {:?}",
                    id,
                    existing.class(),
                    class
                )));
            }
            *ref_counts.entry(id).or_insert(0) += 1;
            tracing::debug!(%id, class = class.name(), "serializer registration count incremented");
            return Ok(());
        }

        if let Some(existing) = self.by_class.get(&class.type_id()) {
            return Err(SerializationError::invalid_argument(format!(
                "{:?} is already registered under id {}, cannot register under {}",
                class,
                existing.id(),
                id
            )));
        }

        let info = Arc::new(SerializationInfo::new(id, class, serializer));
        self.by_id.insert(id, info.clone());
        self.by_class.insert(class.type_id(), info);
        ref_counts.insert(id, 1);
        tracing::debug!(%id, class = class.name(), "serializer registered");
        Ok(())
    }

    /// Drop one registration of `id`; the entry is removed at zero.
    pub fn unregister(&self, id: &Uuid) -> Result<()> {
        let mut ref_counts = self.ref_counts.lock();

        let count = ref_counts.get_mut(id).ok_or_else(|| {
            SerializationError::invalid_argument(format!("id {} is not registered", id))
        })?;
        *count -= 1;
        if *count > 0 {
            return Ok(());
        }

        ref_counts.remove(id);
        if let Some((_, info)) = self.by_id.remove(id) {
            self.by_class.remove(&info.class().type_id());
            tracing::debug!(%id, class = info.class().name(), "serializer unregistered");
        }
        Ok(())
    }

    /// Let a collaborator register its types
    pub fn register_from(&self, registrar: &dyn SerializationRegistrar) -> Result<()> {
        registrar.register(self)
    }

    /// Let a collaborator unregister its types
    pub fn unregister_from(&self, registrar: &dyn SerializationRegistrar) -> Result<()> {
        registrar.unregister(self)
    }

    /// Look up type information by id
    pub fn info_by_id(&self, id: &Uuid) -> Result<Arc<SerializationInfo>> {
        if let Some(info) = self.extension.as_ref().and_then(|e| e.find_info_by_id(id)) {
            return Ok(info);
        }
        self.by_id
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                SerializationError::invalid_argument(format!(
                    "serialization info is not found for id {}",
                    id
                ))
            })
    }

    /// Look up type information by class
    pub fn info_by_class(&self, class: TypeId) -> Result<Arc<SerializationInfo>> {
        if let Some(info) = self.extension.as_ref().and_then(|e| e.find_info_by_class(class)) {
            return Ok(info);
        }
        self.by_class
            .get(&class)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                SerializationError::invalid_argument(format!(
                    "serialization info is not found for class {:?}",
                    class
                ))
            })
    }

    /// Check if `id` is registered directly (extensions are not consulted)
    pub fn is_registered(&self, id: &Uuid) -> bool {
        self.by_id.contains_key(id)
    }

    /// Current reference count of `id`
    pub fn ref_count(&self, id: &Uuid) -> usize {
        self.ref_counts.lock().get(id).copied().unwrap_or(0)
    }

    /// Number of directly registered types
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Check if no types are registered directly
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl Default for SerializationRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for SerializationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializationRegistry")
            .field("registered", &self.by_id.len())
            .field("has_extension", &self.extension.is_some())
            .finish()
    }
}
