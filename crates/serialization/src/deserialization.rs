//! Object-graph reader
//!
//! Mirror of [`Serialization`](crate::Serialization). Type tags and
//! refIds are numbered in encounter order, exactly as the writer assigned
//! them, so both sides agree without any table in the stream.
//!
//! Body lengths make decoding tolerant in one direction: a reader that
//! consumes less than the declared body skips the remainder, a reader that
//! consumes more fails with [`SerializationError::EndOfObject`].

use crate::data::{DataDeserialization, Extensions};
use crate::error::{Result, SerializationError};
use crate::record::{
    object_kind, Frame, NULL, OBJECT_TYPEID, OBJECT_UUID, PRESERVE_IDENTITY_FLAG, REFERENCE,
    REGION,
};
use crate::registry::{SerializationInfo, SerializationRegistry};
use crate::serializer::{ObjectRef, TypeKey};
use crate::stream::ByteInputStream;
use crate::varint::read_var_int;
use std::any::Any;
use std::rc::Rc;
use std::sync::Arc;
use uuid::Uuid;

struct ReadSession {
    /// Session typeId -> info, in encounter order
    types: Vec<Arc<SerializationInfo>>,
    /// RefId -> object; `None` until the object is published
    references: Vec<Option<ObjectRef>>,
    frame: Frame,
}

impl ReadSession {
    fn new() -> Self {
        ReadSession {
            types: Vec::new(),
            references: Vec::new(),
            frame: Frame::root(false),
        }
    }
}

struct OpenRegion {
    outer: ReadSession,
    extensions: Extensions,
    start: usize,
    length: usize,
}

/// Object-graph decoding session.
pub struct Deserialization {
    data: DataDeserialization,
    registry: Arc<SerializationRegistry>,
    session: ReadSession,
    region: Option<OpenRegion>,
    stream_version: Option<u32>,
}

impl Deserialization {
    /// Create a session reading from `stream`
    pub fn new(registry: Arc<SerializationRegistry>, stream: ByteInputStream) -> Self {
        Deserialization {
            data: DataDeserialization::new(stream),
            registry,
            session: ReadSession::new(),
            region: None,
            stream_version: None,
        }
    }

    /// Create a session over an owned buffer
    pub fn from_bytes(registry: Arc<SerializationRegistry>, bytes: Vec<u8>) -> Self {
        Self::new(registry, ByteInputStream::new(bytes))
    }

    /// Create a session and validate the magic/version stream header.
    ///
    /// The header version must lie in `[min_version, max_version]`.
    pub fn with_header(
        registry: Arc<SerializationRegistry>,
        stream: ByteInputStream,
        magic: u32,
        min_version: u32,
        max_version: u32,
    ) -> Result<Self> {
        let mut deserialization = Self::new(registry, stream);

        let found = deserialization.data.read_int()? as u32;
        if found != magic {
            return Err(SerializationError::unsupported_format(format!(
                "stream magic 0x{:08X} does not match expected 0x{:08X}",
                found, magic
            )));
        }

        let version = deserialization.data.read_int()? as u32;
        if version < min_version || version > max_version {
            return Err(SerializationError::IncompatibleStreamVersion {
                version,
                min: min_version,
                max: max_version,
            });
        }

        deserialization.stream_version = Some(version);
        Ok(deserialization)
    }

    /// Version from the stream header, if one was read
    pub fn stream_version(&self) -> Option<u32> {
        self.stream_version
    }

    /// Version tag of the object currently being read
    pub fn version(&self) -> u8 {
        self.session.frame.version
    }

    /// Registry this session resolves serializers from
    pub fn registry(&self) -> &Arc<SerializationRegistry> {
        &self.registry
    }

    /// Side-channel extensions of the current session or region
    pub fn extensions(&self) -> &Extensions {
        self.data.extensions()
    }

    /// Side-channel extensions, mutably
    pub fn extensions_mut(&mut self) -> &mut Extensions {
        self.data.extensions_mut()
    }

    /// Attach a side-channel value under `id`
    pub fn set_extension<T: Any>(&mut self, id: Uuid, value: T) {
        self.data.extensions_mut().set(id, value);
    }

    /// Side-channel value under `id`, if present with type `T`
    pub fn extension<T: Any>(&self, id: &Uuid) -> Option<&T> {
        self.data.extensions().get(id)
    }

    /// Side-channel value under `id`, mutably
    pub fn extension_mut<T: Any>(&mut self, id: &Uuid) -> Option<&mut T> {
        self.data.extensions_mut().get_mut(id)
    }

    /// Detach the side-channel value under `id`
    pub fn remove_extension(&mut self, id: &Uuid) -> Option<Box<dyn Any>> {
        self.data.extensions_mut().remove(id)
    }

    /// Current read position
    pub fn position(&self) -> usize {
        self.data.position()
    }

    /// Bytes left in the stream
    pub fn available(&self) -> usize {
        self.data.available()
    }

    /// Finish the session and return the stream
    pub fn into_stream(self) -> ByteInputStream {
        self.data.into_stream()
    }

    // ========================================================================
    // Objects
    // ========================================================================

    /// Read a nullable object written with `write_object`
    pub fn read_object(&mut self) -> Result<Option<ObjectRef>> {
        self.read_object_impl(None)
    }

    /// Read a nullable object, accepting an untagged record of `class`
    pub fn read_typed_object(&mut self, class: TypeKey) -> Result<Option<ObjectRef>> {
        self.read_object_impl(Some(class))
    }

    /// Read a nullable object and downcast it to `T`
    pub fn read_object_as<T: Any>(&mut self) -> Result<Option<Rc<T>>> {
        self.read_object()?.map(downcast_rc::<T>).transpose()
    }

    /// Read a nullable object of class `T`, tagged or not, and downcast it
    pub fn read_typed_object_as<T: Any>(&mut self) -> Result<Option<Rc<T>>> {
        self.read_typed_object(TypeKey::of::<T>())?
            .map(downcast_rc::<T>)
            .transpose()
    }

    /// Make the object being decoded visible to back-references.
    ///
    /// Must be called before reading any field that may refer back to the
    /// object. Has no effect if the object was written without identity.
    pub fn publish_reference(&mut self, object: &ObjectRef) {
        if let Some(ref_id) = self.session.frame.current_ref_id {
            if let Some(slot) = self.session.references.get_mut(ref_id as usize) {
                *slot = Some(Rc::clone(object));
            }
        }
    }

    fn read_object_impl(&mut self, class: Option<TypeKey>) -> Result<Option<ObjectRef>> {
        let record = self.data.read_byte()?;
        if record == NULL {
            return Ok(None);
        }
        if record == REFERENCE {
            return self.read_reference().map(Some);
        }

        let info = match object_kind(record)? {
            OBJECT_UUID => {
                let id = self.data.read_uuid()?;
                let info = self.registry.info_by_id(&id)?;
                self.session.types.push(info.clone());
                info
            }
            OBJECT_TYPEID => {
                let type_id = read_var_int(&mut self.data)?;
                self.session
                    .types
                    .get(type_id as usize)
                    .cloned()
                    .ok_or_else(|| {
                        SerializationError::unsupported_format(format!(
                            "type id {} is used before it is defined",
                            type_id
                        ))
                    })?
            }
            _ => {
                let class = class.ok_or_else(|| {
                    SerializationError::unsupported_format(
                        "untagged object record read without an expected class",
                    )
                })?;
                self.registry.info_by_class(class.type_id())?
            }
        };

        let ref_id = if record & PRESERVE_IDENTITY_FLAG != 0 {
            self.session.references.push(None);
            Some((self.session.references.len() - 1) as u32)
        } else {
            None
        };

        let version = self.data.read_byte()?;
        let declared = self.data.read_int()? as u32 as usize;
        if declared > self.data.available() {
            return Err(SerializationError::EndOfStream);
        }
        let start = self.data.position();
        let region_open = self.region.is_some();

        self.session.frame.push(ref_id, ref_id.is_some());
        self.session.frame.version = version;
        let result = info.serializer().deserialize(self, info.id());
        if self.region.is_some() != region_open {
            return Err(SerializationError::invalid_state(format!(
                "deserializer of {:?} left a region unbalanced",
                info.class()
            )));
        }
        self.session.frame.pop();
        let object = result?;

        let consumed = self.data.position() - start;
        if consumed > declared {
            return Err(SerializationError::EndOfObject {
                type_name: info.class().name().to_string(),
                declared,
                consumed,
            });
        }
        if consumed < declared {
            tracing::trace!(
                class = info.class().name(),
                skipped = declared - consumed,
                "skipping unread object fields"
            );
            self.data.skip(declared - consumed);
        }

        if let Some(ref_id) = ref_id {
            self.session.references[ref_id as usize] = Some(Rc::clone(&object));
        }
        Ok(Some(object))
    }

    fn read_reference(&mut self) -> Result<ObjectRef> {
        let ref_id = read_var_int(&mut self.data)?;
        match self.session.references.get(ref_id as usize) {
            Some(Some(object)) => Ok(Rc::clone(object)),
            Some(None) => Err(SerializationError::invalid_state(format!(
                "reference {} points to an object that is not published yet",
                ref_id
            ))),
            None => Err(SerializationError::unsupported_format(format!(
                "reference {} is not defined",
                ref_id
            ))),
        }
    }

    // ========================================================================
    // Regions
    // ========================================================================

    /// Enter a region written with `begin_write_region`/`write_region`
    pub fn begin_read_region(&mut self) -> Result<()> {
        if self.region.is_some() {
            return Err(SerializationError::invalid_state("read region is already started"));
        }

        let record = self.data.read_byte()?;
        if record != REGION {
            return Err(SerializationError::unsupported_format(format!(
                "expected region record, found 0x{:02X}",
                record
            )));
        }
        let length = self.data.read_int()? as u32 as usize;
        if length > self.data.available() {
            return Err(SerializationError::EndOfStream);
        }

        let outer = std::mem::replace(&mut self.session, ReadSession::new());
        let extensions = self.data.take_extensions();
        self.region = Some(OpenRegion {
            outer,
            extensions,
            start: self.data.position(),
            length,
        });
        Ok(())
    }

    /// Leave the current region, skipping whatever was not read
    pub fn end_read_region(&mut self) -> Result<()> {
        if self.session.frame.depth() != 0 {
            return Err(SerializationError::invalid_state(
                "read region cannot be ended inside a nested object",
            ));
        }
        let region = self
            .region
            .take()
            .ok_or_else(|| SerializationError::invalid_state("read region is not started"))?;

        let consumed = self.data.position() - region.start;
        if consumed > region.length {
            return Err(SerializationError::EndOfRegion {
                declared: region.length,
                consumed,
            });
        }
        self.data.skip(region.length - consumed);

        self.session = region.outer;
        self.data.restore_extensions(region.extensions);
        Ok(())
    }

    /// Read a region's raw bytes without decoding them
    pub fn read_region(&mut self) -> Result<Option<Vec<u8>>> {
        match self.data.read_byte()? {
            NULL => Ok(None),
            REGION => {
                let length = self.data.read_int()? as u32 as usize;
                self.data.read_raw(length).map(Some)
            }
            record => Err(SerializationError::unsupported_format(format!(
                "expected region record, found 0x{:02X}",
                record
            ))),
        }
    }

    // ========================================================================
    // Primitives
    // ========================================================================

    /// Read a boolean
    pub fn read_bool(&mut self) -> Result<bool> {
        self.data.read_bool()
    }

    /// Read one byte
    pub fn read_byte(&mut self) -> Result<u8> {
        self.data.read_byte()
    }

    /// Read a 2-byte character
    pub fn read_char(&mut self) -> Result<char> {
        self.data.read_char()
    }

    /// Read a 2-byte integer
    pub fn read_short(&mut self) -> Result<i16> {
        self.data.read_short()
    }

    /// Read a 4-byte integer
    pub fn read_int(&mut self) -> Result<i32> {
        self.data.read_int()
    }

    /// Read an 8-byte integer
    pub fn read_long(&mut self) -> Result<i64> {
        self.data.read_long()
    }

    /// Read a 4-byte float
    pub fn read_float(&mut self) -> Result<f32> {
        self.data.read_float()
    }

    /// Read an 8-byte float
    pub fn read_double(&mut self) -> Result<f64> {
        self.data.read_double()
    }

    /// Read a UUID
    pub fn read_uuid(&mut self) -> Result<Uuid> {
        self.data.read_uuid()
    }

    /// Read a nullable byte array
    pub fn read_byte_array(&mut self) -> Result<Option<Vec<u8>>> {
        self.data.read_byte_array()
    }

    /// Read a nullable string
    pub fn read_string(&mut self) -> Result<Option<String>> {
        self.data.read_string()
    }

    /// Skip up to `n` bytes, returning how many were skipped
    pub fn skip(&mut self, n: usize) -> usize {
        self.data.skip(n)
    }

    /// Primitive codec, for the varint helpers
    pub fn data_mut(&mut self) -> &mut DataDeserialization {
        &mut self.data
    }
}

fn downcast_rc<T: Any>(object: ObjectRef) -> Result<Rc<T>> {
    object.downcast::<T>().map_err(|_| {
        SerializationError::invalid_argument(format!(
            "decoded object is not a {}",
            std::any::type_name::<T>()
        ))
    })
}

impl std::fmt::Debug for Deserialization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Deserialization")
            .field("position", &self.data.position())
            .field("types", &self.session.types.len())
            .field("references", &self.session.references.len())
            .field("in_region", &self.region.is_some())
            .field("stream_version", &self.stream_version)
            .finish()
    }
}
