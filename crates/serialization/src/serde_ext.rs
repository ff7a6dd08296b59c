//! Serde fallback for types without a hand-written serializer
//!
//! Any `T: Serialize + DeserializeOwned` can be enrolled at runtime. Its id
//! is a UUIDv5 of the type name and its body is a bincode payload written
//! as one length-prefixed byte array.
//!
//! Type names are not guaranteed stable across compiler versions, so the
//! fallback suits transient streams better than long-lived storage.

use crate::deserialization::Deserialization;
use crate::error::{Result, SerializationError};
use crate::registry::{SerializationInfo, SerializationRegistryExtension};
use crate::serialization::Serialization;
use crate::serializer::{downcast, ObjectRef, Serializer, TypeKey};
use dashmap::DashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::marker::PhantomData;
use std::rc::Rc;
use std::sync::Arc;
use uuid::Uuid;

/// Namespace for fallback type ids
const SERDE_NAMESPACE: Uuid = Uuid::from_u128(0x6c0b_21a4_37f1_4f7e_9a52_1d3e_8f00_5e11);

struct SerdeSerializer<T>(PhantomData<fn() -> T>);

impl<T> Serializer for SerdeSerializer<T>
where
    T: Serialize + DeserializeOwned + 'static,
{
    fn serialize(&self, serialization: &mut Serialization, object: &dyn Any) -> Result<()> {
        let value = downcast::<T>(object)?;
        let bytes = bincode::serialize(value)
            .map_err(|e| SerializationError::Encoding(e.to_string()))?;
        serialization.write_byte_array(Some(&bytes))
    }

    fn deserialize(&self, deserialization: &mut Deserialization, _id: Uuid) -> Result<ObjectRef> {
        let bytes = deserialization.read_byte_array()?.ok_or_else(|| {
            SerializationError::unsupported_format(format!(
                "missing serde payload for {}",
                std::any::type_name::<T>()
            ))
        })?;
        let value: T = bincode::deserialize(&bytes)
            .map_err(|e| SerializationError::Encoding(e.to_string()))?;
        Ok(Rc::new(value))
    }
}

/// Registry extension resolving serde-enrolled types.
#[derive(Default)]
pub struct SerdeRegistryExtension {
    by_id: DashMap<Uuid, Arc<SerializationInfo>>,
    by_class: DashMap<TypeId, Arc<SerializationInfo>>,
}

impl SerdeRegistryExtension {
    /// Create an empty extension
    pub fn new() -> Self {
        Self::default()
    }

    /// Fallback id of `T`
    pub fn id_of<T: Any>() -> Uuid {
        Uuid::new_v5(&SERDE_NAMESPACE, std::any::type_name::<T>().as_bytes())
    }

    /// Enroll `T`; enrolling twice is a no-op. Returns the type's id.
    pub fn register<T>(&self) -> Uuid
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        let id = Self::id_of::<T>();
        if self.by_id.contains_key(&id) {
            return id;
        }

        let info = Arc::new(SerializationInfo::new(
            id,
            TypeKey::of::<T>(),
            Arc::new(SerdeSerializer::<T>(PhantomData)),
        ));
        self.by_class.insert(TypeId::of::<T>(), info.clone());
        self.by_id.insert(id, info);
        tracing::debug!(%id, class = std::any::type_name::<T>(), "serde fallback enrolled");
        id
    }

    /// Number of enrolled types
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    /// Check if nothing is enrolled
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }
}

impl SerializationRegistryExtension for SerdeRegistryExtension {
    fn find_info_by_id(&self, id: &Uuid) -> Option<Arc<SerializationInfo>> {
        self.by_id.get(id).map(|entry| entry.value().clone())
    }

    fn find_info_by_class(&self, class: TypeId) -> Option<Arc<SerializationInfo>> {
        self.by_class.get(&class).map(|entry| entry.value().clone())
    }
}
