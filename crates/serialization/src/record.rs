//! Record-type header bits and frame stack shared by both session sides
//!
//! # Object layout
//!
//! ```text
//! ┌──────────────┬──────────────────────────┬─────────┬─────────────┬──────┐
//! │ record (1)   │ refId | UUID | typeId    │ ver (1) │ length (4)  │ body │
//! └──────────────┴──────────────────────────┴─────────┴─────────────┴──────┘
//! ```
//!
//! A back-reference is the record byte followed by its varint refId only.
//! A region is the record byte, a 4-byte length, and the region contents.

use crate::error::{Result, SerializationError};

/// Null object
pub const NULL: u8 = 0x00;
/// Back-reference to an already written object
pub const REFERENCE: u8 = 0x01;
/// Object tagged with its full 128-bit type id
pub const OBJECT_UUID: u8 = 0x02;
/// Object tagged with a session-local type id
pub const OBJECT_TYPEID: u8 = 0x04;
/// Object with no type tag; the reader supplies the class
pub const OBJECT: u8 = 0x08;
/// The object participates in identity preservation
pub const PRESERVE_IDENTITY_FLAG: u8 = 0x10;
/// A length-framed region follows
pub const REGION: u8 = 0x20;

/// Version byte plus 4-byte body length
pub const OBJECT_HEADER_SIZE: usize = 5;
/// 4-byte region length
pub const REGION_HEADER_SIZE: usize = 4;

/// Validate an object record byte and return its type-tag kind.
pub(crate) fn object_kind(record: u8) -> Result<u8> {
    let kind = record & !PRESERVE_IDENTITY_FLAG;
    match kind {
        OBJECT_UUID | OBJECT_TYPEID | OBJECT => Ok(kind),
        _ => Err(SerializationError::unsupported_format(format!(
            "invalid record type 0x{:02X}",
            record
        ))),
    }
}

/// Per-nesting-level context.
///
/// Each push captures the previous frame as its parent; pop restores it.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub version: u8,
    pub preserve_identity: bool,
    pub current_ref_id: Option<u32>,
    parent: Option<Box<Frame>>,
}

impl Frame {
    pub fn root(preserve_identity: bool) -> Self {
        Frame {
            version: 0,
            preserve_identity,
            current_ref_id: None,
            parent: None,
        }
    }

    /// Enter a nested object whose writes use `preserve_identity`
    pub fn push(&mut self, current_ref_id: Option<u32>, preserve_identity: bool) {
        let child = Frame {
            version: 0,
            preserve_identity,
            current_ref_id,
            parent: None,
        };
        let parent = std::mem::replace(self, child);
        self.parent = Some(Box::new(parent));
    }

    /// Leave the current object and return its version tag
    pub fn pop(&mut self) -> u8 {
        let version = self.version;
        if let Some(parent) = self.parent.take() {
            *self = *parent;
        }
        version
    }

    pub fn depth(&self) -> usize {
        let mut depth = 0;
        let mut frame = self;
        while let Some(parent) = frame.parent.as_deref() {
            depth += 1;
            frame = parent;
        }
        depth
    }
}
