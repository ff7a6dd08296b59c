//! Object-graph writer
//!
//! Encodes object graphs on top of the primitive codec and the registry:
//!
//! - Identity preservation: an object already written in this session is
//!   encoded as a back-reference to its refId
//! - Type tagging: the first occurrence of a type writes its UUID, later
//!   occurrences write a compact session-local typeId
//! - Per-object framing: a version byte and a body length are reserved
//!   before the body and patched afterwards, so readers can skip unknown
//!   trailing fields
//! - Regions: length-framed sub-streams with fresh type/identity numbering
//!
//! # Thread Safety
//!
//! A session is single-threaded (`ObjectRef` is an `Rc`). Independent
//! sessions share nothing but the registry.

use crate::data::{DataSerialization, Extensions};
use crate::error::{Result, SerializationError};
use crate::record::{
    Frame, NULL, OBJECT, OBJECT_HEADER_SIZE, OBJECT_TYPEID, OBJECT_UUID, PRESERVE_IDENTITY_FLAG,
    REFERENCE, REGION, REGION_HEADER_SIZE,
};
use crate::registry::SerializationRegistry;
use crate::serializer::{ObjectRef, TypeKey};
use crate::stream::ByteOutputStream;
use crate::varint::write_var_int;
use rustc_hash::FxHashMap;
use std::any::{Any, TypeId};
use std::rc::Rc;
use std::sync::Arc;
use uuid::Uuid;

/// Per-session (or per-region) numbering state.
struct WriteSession {
    /// Runtime class -> session typeId
    types: FxHashMap<TypeId, u32>,
    /// Object address -> refId
    references: FxHashMap<usize, u32>,
    /// Keeps enrolled objects alive so their addresses are not reused
    retained: Vec<ObjectRef>,
    frame: Frame,
}

impl WriteSession {
    fn new(preserve_identity: bool) -> Self {
        WriteSession {
            types: FxHashMap::default(),
            references: FxHashMap::default(),
            retained: Vec::new(),
            frame: Frame::root(preserve_identity),
        }
    }
}

/// Enclosing state saved while a region is being written.
struct OpenRegion {
    outer: WriteSession,
    extensions: Extensions,
    header: usize,
    start: usize,
}

/// How the type of an object is tagged on the wire.
#[derive(Clone, Copy)]
enum Tagging {
    /// UUID on first use, typeId afterwards
    Tagged,
    /// No tag; the serializer is looked up by this class (or the runtime class)
    Typed(Option<TypeKey>),
}

fn object_key(object: &ObjectRef) -> usize {
    Rc::as_ptr(object) as *const () as usize
}

/// Object-graph encoding session.
pub struct Serialization {
    data: DataSerialization,
    registry: Arc<SerializationRegistry>,
    session: WriteSession,
    region: Option<OpenRegion>,
    default_preserve_identity: bool,
}

impl Serialization {
    /// Create a session over a fresh stream, preserving identity by default
    pub fn new(registry: Arc<SerializationRegistry>) -> Self {
        Self::with_stream(registry, ByteOutputStream::new())
    }

    /// Create a session appending to `stream`
    pub fn with_stream(registry: Arc<SerializationRegistry>, stream: ByteOutputStream) -> Self {
        Serialization {
            data: DataSerialization::with_stream(stream),
            registry,
            session: WriteSession::new(true),
            region: None,
            default_preserve_identity: true,
        }
    }

    /// Create a session and write a magic/version stream header
    pub fn with_header(
        registry: Arc<SerializationRegistry>,
        stream: ByteOutputStream,
        magic: u32,
        version: u32,
    ) -> Self {
        let mut serialization = Self::with_stream(registry, stream);
        serialization.data.write_int(magic as i32);
        serialization.data.write_int(version as i32);
        serialization
    }

    /// Set the session-wide identity mode.
    ///
    /// Applies to the top level and is inherited by nested objects unless
    /// overridden.
    pub fn set_preserve_identity(&mut self, preserve_identity: bool) {
        self.default_preserve_identity = preserve_identity;
        self.session.frame.preserve_identity = preserve_identity;
    }

    /// Override the identity mode for the rest of the current frame
    pub fn frame_preserve_identity(&mut self, preserve_identity: bool) {
        self.session.frame.preserve_identity = preserve_identity;
    }

    /// Identity mode of the current frame
    pub fn preserve_identity(&self) -> bool {
        self.session.frame.preserve_identity
    }

    /// Tag the object currently being written with a schema version
    pub fn set_version(&mut self, version: u8) {
        self.session.frame.version = version;
    }

    /// Version tag of the object currently being written
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

    /// Underlying stream
    pub fn stream(&self) -> &ByteOutputStream {
        self.data.stream()
    }

    /// Bytes written so far
    pub fn as_bytes(&self) -> &[u8] {
        self.data.stream().as_slice()
    }

    /// Finish the session and return the stream
    pub fn into_stream(self) -> Result<ByteOutputStream> {
        if self.region.is_some() {
            return Err(SerializationError::invalid_state(
                "region is still open at end of serialization",
            ));
        }
        Ok(self.data.into_stream())
    }

    /// Finish the session and return the written bytes
    pub fn finish(self) -> Result<Vec<u8>> {
        Ok(self.into_stream()?.into_bytes())
    }

    // ========================================================================
    // Objects
    // ========================================================================

    /// Write a nullable object using the current frame's identity mode
    pub fn write_object(&mut self, object: Option<&ObjectRef>) -> Result<()> {
        let preserve_identity = self.session.frame.preserve_identity;
        self.write_object_impl(object, preserve_identity, Tagging::Tagged)
    }

    /// Write a nullable object with an explicit identity mode for this object only
    pub fn write_object_with_identity(
        &mut self,
        object: Option<&ObjectRef>,
        preserve_identity: bool,
    ) -> Result<()> {
        self.write_object_impl(object, preserve_identity, Tagging::Tagged)
    }

    /// Write a nullable object without a type tag.
    ///
    /// The reader must supply the class; the serializer is resolved from the
    /// object's runtime class.
    pub fn write_typed_object(&mut self, object: Option<&ObjectRef>) -> Result<()> {
        let preserve_identity = self.session.frame.preserve_identity;
        self.write_object_impl(object, preserve_identity, Tagging::Typed(None))
    }

    /// Write a nullable object without a type tag, resolving the serializer by `class`
    pub fn write_typed_object_as(&mut self, object: Option<&ObjectRef>, class: TypeKey) -> Result<()> {
        let preserve_identity = self.session.frame.preserve_identity;
        self.write_object_impl(object, preserve_identity, Tagging::Typed(Some(class)))
    }

    fn write_object_impl(
        &mut self,
        object: Option<&ObjectRef>,
        preserve_identity: bool,
        tagging: Tagging,
    ) -> Result<()> {
        let object = match object {
            None => {
                self.data.write_byte(NULL);
                return Ok(());
            }
            Some(object) => object,
        };

        if preserve_identity {
            if let Some(&ref_id) = self.session.references.get(&object_key(object)) {
                self.data.write_byte(REFERENCE);
                write_var_int(&mut self.data, ref_id);
                return Ok(());
            }
        }

        let runtime_class = Any::type_id(object.as_ref());
        let info = match tagging {
            Tagging::Tagged => self.registry.info_by_class(runtime_class)?,
            Tagging::Typed(class) => self
                .registry
                .info_by_class(class.map_or(runtime_class, |c| c.type_id()))?,
        };

        let mut record = 0u8;
        let mut ref_id = None;
        if preserve_identity {
            let id = self.session.retained.len() as u32;
            self.session.references.insert(object_key(object), id);
            self.session.retained.push(Rc::clone(object));
            record |= PRESERVE_IDENTITY_FLAG;
            ref_id = Some(id);
        }

        match tagging {
            Tagging::Typed(_) => self.data.write_byte(record | OBJECT),
            Tagging::Tagged => match self.session.types.get(&runtime_class) {
                Some(&type_id) => {
                    self.data.write_byte(record | OBJECT_TYPEID);
                    write_var_int(&mut self.data, type_id);
                }
                None => {
                    let type_id = self.session.types.len() as u32;
                    self.session.types.insert(runtime_class, type_id);
                    self.data.write_byte(record | OBJECT_UUID);
                    self.data.write_uuid(&info.id());
                }
            },
        }

        let header = self.data.stream_mut().grow(OBJECT_HEADER_SIZE);
        let start = self.data.stream().length();
        let region_open = self.region.is_some();

        self.session.frame.push(ref_id, preserve_identity);
        let result = info.serializer().serialize(self, object.as_ref());
        if self.region.is_some() != region_open {
            return Err(SerializationError::invalid_state(format!(
                "serializer of {:?} left a region unbalanced",
                info.class()
            )));
        }
        let version = self.session.frame.pop();
        result?;

        let length = self.data.stream().length() - start;
        let length = u32::try_from(length).map_err(|_| {
            SerializationError::invalid_argument(format!(
                "body of {:?} is too large: {} bytes",
                info.class(),
                length
            ))
        })?;
        let mut patch = [0u8; OBJECT_HEADER_SIZE];
        patch[0] = version;
        patch[1..].copy_from_slice(&length.to_le_bytes());
        self.data.stream_mut().patch(header, &patch)
    }

    // ========================================================================
    // Regions
    // ========================================================================

    /// Start a length-framed region with fresh session state
    pub fn begin_write_region(&mut self) -> Result<()> {
        if self.region.is_some() {
            return Err(SerializationError::invalid_state(
                "write region is already started",
            ));
        }

        self.data.write_byte(REGION);
        let header = self.data.stream_mut().grow(REGION_HEADER_SIZE);
        let start = self.data.stream().length();
        let outer = std::mem::replace(
            &mut self.session,
            WriteSession::new(self.default_preserve_identity),
        );
        let extensions = self.data.take_extensions();

        self.region = Some(OpenRegion {
            outer,
            extensions,
            header,
            start,
        });
        tracing::trace!(offset = start, "write region started");
        Ok(())
    }

    /// Close the current region and restore the enclosing session state
    pub fn end_write_region(&mut self) -> Result<()> {
        if self.region.is_none() {
            return Err(SerializationError::invalid_state("write region is not started"));
        }
        if self.session.frame.depth() != 0 {
            return Err(SerializationError::invalid_state(
                "write region cannot be ended inside a nested object",
            ));
        }
        let region = match self.region.take() {
            Some(region) => region,
            None => return Err(SerializationError::invalid_state("write region is not started")),
        };

        let length = self.data.stream().length() - region.start;
        let patched = match u32::try_from(length) {
            Ok(length) => self
                .data
                .stream_mut()
                .patch(region.header, &length.to_le_bytes()),
            Err(_) => Err(SerializationError::invalid_argument(format!(
                "region is too large: {} bytes",
                length
            ))),
        };

        // The enclosing session comes back whether or not the frame was patched
        self.session = region.outer;
        self.data.restore_extensions(region.extensions);
        patched?;
        tracing::trace!(length, "write region ended");
        Ok(())
    }

    /// Write pre-encoded region contents as a region record
    pub fn write_region(&mut self, region: Option<&[u8]>) -> Result<()> {
        match region {
            None => self.data.write_byte(NULL),
            Some(bytes) => {
                let length = u32::try_from(bytes.len()).map_err(|_| {
                    SerializationError::invalid_argument(format!(
                        "region is too large: {} bytes",
                        bytes.len()
                    ))
                })?;
                self.data.write_byte(REGION);
                self.data.write_raw(&length.to_le_bytes());
                self.data.write_raw(bytes);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Primitives
    // ========================================================================

    /// Write a boolean
    pub fn write_bool(&mut self, value: bool) {
        self.data.write_bool(value);
    }

    /// Write one byte
    pub fn write_byte(&mut self, value: u8) {
        self.data.write_byte(value);
    }

    /// Write a 2-byte character
    pub fn write_char(&mut self, value: char) -> Result<()> {
        self.data.write_char(value)
    }

    /// Write a 2-byte integer
    pub fn write_short(&mut self, value: i16) {
        self.data.write_short(value);
    }

    /// Write a 4-byte integer
    pub fn write_int(&mut self, value: i32) {
        self.data.write_int(value);
    }

    /// Write an 8-byte integer
    pub fn write_long(&mut self, value: i64) {
        self.data.write_long(value);
    }

    /// Write a 4-byte float
    pub fn write_float(&mut self, value: f32) {
        self.data.write_float(value);
    }

    /// Write an 8-byte float
    pub fn write_double(&mut self, value: f64) {
        self.data.write_double(value);
    }

    /// Write a UUID
    pub fn write_uuid(&mut self, value: &Uuid) {
        self.data.write_uuid(value);
    }

    /// Write a nullable byte array
    pub fn write_byte_array(&mut self, value: Option<&[u8]>) -> Result<()> {
        self.data.write_byte_array(value)
    }

    /// Write a nullable string
    pub fn write_string(&mut self, value: Option<&str>) -> Result<()> {
        self.data.write_string(value)
    }

    /// Primitive codec, for the varint helpers
    pub fn data_mut(&mut self) -> &mut DataSerialization {
        &mut self.data
    }
}

impl std::fmt::Debug for Serialization {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Serialization")
            .field("length", &self.data.stream().length())
            .field("types", &self.session.types.len())
            .field("references", &self.session.retained.len())
            .field("in_region", &self.region.is_some())
            .finish()
    }
}
