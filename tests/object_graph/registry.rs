//! Registry and serde fallback tests

use crate::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, PartialEq)]
struct Other;

#[test]
fn registration_is_reference_counted() {
    let db = create_db(Arc::new(TestObjectSerializer));
    let registry = db.registry();
    registry
        .register(TEST_OBJECT_ID, TypeKey::of::<TestObject>(), Arc::new(TestObjectSerializer))
        .unwrap();
    assert_eq!(registry.ref_count(&TEST_OBJECT_ID), 2);

    registry.unregister(&TEST_OBJECT_ID).unwrap();
    assert!(registry.is_registered(&TEST_OBJECT_ID));
    registry.unregister(&TEST_OBJECT_ID).unwrap();
    assert!(!registry.is_registered(&TEST_OBJECT_ID));
}

#[test]
fn conflicting_registrations_are_invalid_arguments() {
    let db = create_db(Arc::new(TestObjectSerializer));
    let registry = db.registry();

    let other_class = registry
        .register(TEST_OBJECT_ID, TypeKey::of::<Other>(), Arc::new(TestObjectSerializer))
        .unwrap_err();
    assert!(Error::from(other_class).is_invalid_argument());

    let other_id = registry
        .register(Uuid::from_u128(99), TypeKey::of::<TestObject>(), Arc::new(TestObjectSerializer))
        .unwrap_err();
    assert!(Error::from(other_id).is_invalid_argument());
}

#[test]
fn unregistered_type_cannot_be_written() {
    let db = Tessera::ephemeral().unwrap();
    let object: ObjectRef = Rc::new(TestObject::sample());
    let mut out = db.serialization();
    let err = Error::from(out.write_object(Some(&object)).unwrap_err());
    assert!(err.is_invalid_argument());
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Settings {
    name: String,
    limits: Vec<u32>,
}

#[test]
fn serde_types_round_trip_through_the_fallback() {
    let fallback = Arc::new(SerdeRegistryExtension::new());
    fallback.register::<Settings>();
    let registry = Arc::new(SerializationRegistry::with_extension(fallback));
    let db = Tessera::builder().registry(registry).open().unwrap();

    let settings = Settings {
        name: "pages".into(),
        limits: vec![1, 2, 3],
    };
    let shared: ObjectRef = Rc::new(settings.clone());
    let mut out = db.serialization();
    out.write_object(Some(&shared)).unwrap();
    out.write_object(Some(&shared)).unwrap();
    let bytes = out.finish().unwrap();

    let mut input = db.deserialization(bytes);
    let first = input.read_object_as::<Settings>().unwrap().unwrap();
    let second = input.read_object_as::<Settings>().unwrap().unwrap();
    assert_eq!(*first, settings);
    assert!(Rc::ptr_eq(&first, &second));
}
