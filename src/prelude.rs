//! Convenient imports for Tessera.
//!
//! ```ignore
//! use tessera::prelude::*;
//!
//! let db = Tessera::ephemeral()?;
//! db.transaction(&mut my_operation)?;
//! ```

// Main entry point
pub use crate::database::{Tessera, TesseraBuilder};

// Error handling
pub use crate::error::{Error, Result};

// Object serialization
pub use tessera_serialization::{
    downcast, DataDeserialization, DataSerialization, Deserialization, ObjectRef,
    SerdeRegistryExtension, Serialization, SerializationRegistry, SerializationRegistryExtension,
    Serializer, TypeKey,
};

// Raw database
pub use tessera_rawdb::{
    BatchLock, LockType, OperationOptions, RawBatchControl, RawBatchOperation, RawDatabase,
    RawDatabaseConfig, RawOperation, RawPageData, RawTransaction, ReadRegion, WriteRegion,
};
