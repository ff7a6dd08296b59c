//! Object Graph Test Suite
//!
//! Encodes and decodes object graphs through the `Tessera` facade: stream
//! headers, schema versions flowing through type tags, registry reference
//! counting and the serde fallback.
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test --test object_graph
//! ```

use std::any::Any;
use std::rc::Rc;
use std::sync::Arc;

use tessera::prelude::*;
use tessera::serialization::Result as SerializationResult;
use uuid::Uuid;

// Test modules
pub mod compatibility;
pub mod registry;

// =============================================================================
// SHARED TEST UTILITIES
// =============================================================================

/// Stream magic used by the suite
pub const MAGIC: u32 = 0x1717;

/// Stable id of `TestObject`
pub const TEST_OBJECT_ID: Uuid = Uuid::from_u128(0x7e57_0b1e_c700_4000_8000_0000_0000_0001);

/// Two-field record; `value2` was added in schema version 1.
#[derive(Debug, Clone, PartialEq)]
pub struct TestObject {
    pub value: String,
    pub value2: String,
}

impl TestObject {
    pub fn sample() -> Self {
        TestObject {
            value: "test".to_string(),
            value2: "test2".to_string(),
        }
    }
}

/// Writes both fields and tags them as version 1.
pub struct TestObjectSerializer;

impl Serializer for TestObjectSerializer {
    fn serialize(&self, out: &mut Serialization, object: &dyn Any) -> SerializationResult<()> {
        let object = downcast::<TestObject>(object)?;
        out.set_version(1);
        out.write_string(Some(&object.value))?;
        out.write_string(Some(&object.value2))
    }

    fn deserialize(&self, input: &mut Deserialization, _id: Uuid) -> SerializationResult<ObjectRef> {
        let value = input.read_string()?.unwrap_or_default();
        let value2 = if input.version() >= 1 {
            input.read_string()?.unwrap_or_default()
        } else {
            String::from("<missing>")
        };
        Ok(Rc::new(TestObject { value, value2 }))
    }
}

/// Schema 0: only `value`.
pub struct LegacyTestObjectSerializer;

impl Serializer for LegacyTestObjectSerializer {
    fn serialize(&self, out: &mut Serialization, object: &dyn Any) -> SerializationResult<()> {
        let object = downcast::<TestObject>(object)?;
        out.write_string(Some(&object.value))
    }

    fn deserialize(&self, input: &mut Deserialization, _id: Uuid) -> SerializationResult<ObjectRef> {
        let value = input.read_string()?.unwrap_or_default();
        Ok(Rc::new(TestObject {
            value,
            value2: String::new(),
        }))
    }
}

/// Open an ephemeral database with `TestObject` registered
pub fn create_db(serializer: Arc<dyn Serializer>) -> Tessera {
    let db = Tessera::ephemeral().expect("ephemeral database");
    db.registry()
        .register(TEST_OBJECT_ID, TypeKey::of::<TestObject>(), serializer)
        .expect("register TestObject");
    db
}

/// Encode `object` as an untagged record under the suite's header
pub fn encode_typed(db: &Tessera, object: &TestObject, stream_version: u32) -> Vec<u8> {
    let object: ObjectRef = Rc::new(object.clone());
    let mut out = db.serialization_with_header(MAGIC, stream_version);
    out.write_typed_object(Some(&object)).unwrap();
    out.finish().unwrap()
}
