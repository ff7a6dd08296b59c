//! Batch checkpoint record
//!
//! After validation and after every unfinished step, a checkpointed batch
//! writes its progress to the page store. On the next run with the same
//! checkpoint id, the batch resumes from that state instead of validating
//! again.
//!
//! # Layout
//!
//! ```text
//! ┌──────────────┬──────────────┬─────────────┬───────────────────┬──────────┐
//! │ Magic (4)    │ Batch id (16)│ Length (4)  │ State (variable)  │ CRC32 (4)│
//! └──────────────┴──────────────┴─────────────┴───────────────────┴──────────┘
//! ```
//!
//! Integers are little-endian. The CRC covers everything before it.

use crate::error::{RawDatabaseError, Result};
use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use crc32fast::Hasher;
use uuid::Uuid;

/// Magic bytes: "TCBP" on disk
pub const CHECKPOINT_MAGIC: u32 = 0x5042_4354;

const HEADER_SIZE: usize = 4 + 16 + 4;
const TRAILER_SIZE: usize = 4;

/// Saved progress of one batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Checkpoint {
    /// Batch that wrote the state
    pub batch_id: Uuid,
    /// Bytes produced by the batch's `save_state`
    pub state: Vec<u8>,
}

impl Checkpoint {
    /// Create a checkpoint
    pub fn new(batch_id: Uuid, state: Vec<u8>) -> Self {
        Checkpoint { batch_id, state }
    }

    /// Encode with header and checksum
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let length = u32::try_from(self.state.len()).map_err(|_| {
            RawDatabaseError::invalid_argument("checkpoint state exceeds 4 GiB")
        })?;
        let mut bytes = Vec::with_capacity(HEADER_SIZE + self.state.len() + TRAILER_SIZE);
        bytes.write_u32::<LittleEndian>(CHECKPOINT_MAGIC)?;
        bytes.extend_from_slice(self.batch_id.as_bytes());
        bytes.write_u32::<LittleEndian>(length)?;
        bytes.extend_from_slice(&self.state);

        let mut hasher = Hasher::new();
        hasher.update(&bytes);
        bytes.write_u32::<LittleEndian>(hasher.finalize())?;
        Ok(bytes)
    }

    /// Decode and verify
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE + TRAILER_SIZE {
            return Err(RawDatabaseError::Corruption(format!(
                "checkpoint is {} bytes, shorter than its framing",
                bytes.len()
            )));
        }
        let magic = LittleEndian::read_u32(&bytes[0..4]);
        if magic != CHECKPOINT_MAGIC {
            return Err(RawDatabaseError::Corruption(format!(
                "bad checkpoint magic {:#010x}",
                magic
            )));
        }
        let length = LittleEndian::read_u32(&bytes[20..24]) as usize;
        if bytes.len() != HEADER_SIZE + length + TRAILER_SIZE {
            return Err(RawDatabaseError::Corruption(format!(
                "checkpoint declares {} state bytes but holds {}",
                length,
                bytes.len() - HEADER_SIZE - TRAILER_SIZE
            )));
        }

        let body_end = HEADER_SIZE + length;
        let stored = LittleEndian::read_u32(&bytes[body_end..]);
        let mut hasher = Hasher::new();
        hasher.update(&bytes[..body_end]);
        let computed = hasher.finalize();
        if stored != computed {
            return Err(RawDatabaseError::Corruption(format!(
                "checkpoint checksum mismatch: stored {:#010x}, computed {:#010x}",
                stored, computed
            )));
        }

        let mut id = [0u8; 16];
        id.copy_from_slice(&bytes[4..20]);
        Ok(Checkpoint {
            batch_id: Uuid::from_bytes(id),
            state: bytes[HEADER_SIZE..body_end].to_vec(),
        })
    }
}
