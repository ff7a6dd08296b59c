//! Serializer capability and type identity

use crate::deserialization::Deserialization;
use crate::error::{Result, SerializationError};
use crate::serialization::Serialization;
use std::any::{Any, TypeId};
use std::fmt;
use std::rc::Rc;
use uuid::Uuid;

/// Shared handle to a node of an object graph.
///
/// Identity is the address of the `Rc` allocation, so two handles to the
/// same allocation are the same object.
pub type ObjectRef = Rc<dyn Any>;

/// Runtime class of a serializable type.
#[derive(Clone, Copy)]
pub struct TypeKey {
    type_id: TypeId,
    name: &'static str,
}

impl TypeKey {
    /// Key for `T`
    pub fn of<T: Any>() -> Self {
        TypeKey {
            type_id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// The `TypeId` this key compares by
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Type name, for diagnostics
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for TypeKey {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for TypeKey {}

impl std::hash::Hash for TypeKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for TypeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Encoder/decoder for one or more registered types.
///
/// A single serializer may be registered under several ids for different
/// classes; `deserialize` receives the id that was matched so it can
/// dispatch internally.
pub trait Serializer: Send + Sync {
    /// Write the body of `object`.
    ///
    /// Nested objects are written with the `write_object` family so that
    /// identity and type numbering stay consistent.
    fn serialize(&self, serialization: &mut Serialization, object: &dyn Any) -> Result<()>;

    /// Read the body of an object registered under `id`.
    ///
    /// A decoder whose fields may point back at the object being decoded
    /// must allocate the object first and call
    /// [`Deserialization::publish_reference`] before reading those fields.
    fn deserialize(&self, deserialization: &mut Deserialization, id: Uuid) -> Result<ObjectRef>;
}

/// Downcast a serializer argument to its concrete type.
pub fn downcast<T: Any>(object: &dyn Any) -> Result<&T> {
    object.downcast_ref::<T>().ok_or_else(|| {
        SerializationError::invalid_argument(format!(
            "serializer expected {}",
            std::any::type_name::<T>()
        ))
    })
}
