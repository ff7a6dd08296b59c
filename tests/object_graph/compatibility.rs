//! Stream header and schema version tests

use crate::*;
use tessera::serialization::SerializationError;

#[test]
fn typed_object_round_trips_through_header() {
    let db = create_db(Arc::new(TestObjectSerializer));
    let bytes = encode_typed(&db, &TestObject::sample(), 2);

    let mut input = db.deserialization_with_header(bytes, MAGIC, 1, 2).unwrap();
    assert_eq!(input.stream_version(), Some(2));
    let decoded = input.read_typed_object_as::<TestObject>().unwrap().unwrap();
    assert_eq!(*decoded, TestObject::sample());
    assert_eq!(input.available(), 0);
}

#[test]
fn version_tag_reaches_a_reader_with_another_registry() {
    let writer = create_db(Arc::new(TestObjectSerializer));
    let bytes = encode_typed(&writer, &TestObject::sample(), 2);

    // Separate registry, same id and serializer shape
    let reader = create_db(Arc::new(TestObjectSerializer));
    let mut input = reader.deserialization_with_header(bytes, MAGIC, 1, 2).unwrap();
    let decoded = input.read_typed_object_as::<TestObject>().unwrap().unwrap();
    assert_eq!(decoded.value2, "test2");
}

#[test]
fn legacy_stream_gets_default_for_new_field() {
    let writer = create_db(Arc::new(LegacyTestObjectSerializer));
    let bytes = encode_typed(&writer, &TestObject::sample(), 1);

    let reader = create_db(Arc::new(TestObjectSerializer));
    let mut input = reader.deserialization_with_header(bytes, MAGIC, 1, 2).unwrap();
    let decoded = input.read_typed_object_as::<TestObject>().unwrap().unwrap();
    assert_eq!(decoded.value, "test");
    assert_eq!(decoded.value2, "<missing>");
}

#[test]
fn legacy_reader_skips_new_field() {
    let writer = create_db(Arc::new(TestObjectSerializer));
    let first = TestObject::sample();
    let second = TestObject {
        value: "next".into(),
        value2: "ignored".into(),
    };
    let mut out = writer.serialization();
    out.write_object(Some(&(Rc::new(first) as ObjectRef))).unwrap();
    out.write_object(Some(&(Rc::new(second) as ObjectRef))).unwrap();
    let bytes = out.finish().unwrap();

    let reader = create_db(Arc::new(LegacyTestObjectSerializer));
    let mut input = reader.deserialization(bytes);
    let a = input.read_object_as::<TestObject>().unwrap().unwrap();
    let b = input.read_object_as::<TestObject>().unwrap().unwrap();
    assert_eq!(a.value, "test");
    assert_eq!(b.value, "next");
    assert_eq!(input.available(), 0);
}

#[test]
fn stream_version_outside_range_is_rejected() {
    let db = create_db(Arc::new(TestObjectSerializer));
    let bytes = encode_typed(&db, &TestObject::sample(), 3);

    let err = db
        .deserialization_with_header(bytes, MAGIC, 1, 2)
        .unwrap_err();
    assert!(matches!(
        err,
        Error::Serialization(SerializationError::IncompatibleStreamVersion {
            version: 3,
            min: 1,
            max: 2
        })
    ));
}

#[test]
fn wrong_magic_is_corruption() {
    let db = create_db(Arc::new(TestObjectSerializer));
    let bytes = encode_typed(&db, &TestObject::sample(), 2);

    let err = db
        .deserialization_with_header(bytes, MAGIC + 1, 1, 2)
        .unwrap_err();
    assert!(err.is_corruption());
}

#[test]
fn truncated_stream_is_corruption() {
    let db = create_db(Arc::new(TestObjectSerializer));
    let mut bytes = encode_typed(&db, &TestObject::sample(), 2);
    bytes.truncate(bytes.len() - 3);

    let mut input = db.deserialization_with_header(bytes, MAGIC, 1, 2).unwrap();
    let err = Error::from(input.read_typed_object_as::<TestObject>().unwrap_err());
    assert!(err.is_corruption());
}
