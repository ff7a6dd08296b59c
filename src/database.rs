//! Main entry point for Tessera.
//!
//! This module provides the `Tessera` struct, which pairs a serialization
//! registry with a raw page database so operations and batch checkpoints
//! encode objects with the same type ids.

use crate::error::Result;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tessera_rawdb::{
    FilePageStore, MemoryPageStore, OperationContext, PageStore, RawBatchOperation, RawDatabase,
    RawDatabaseConfig, RawOperation, SystemTimeService, TimeService,
};
use tessera_serialization::{
    ByteInputStream, ByteOutputStream, Deserialization, Serialization, SerializationRegistry,
};

/// A serialization registry and the database that shares it.
///
/// Create one with [`Tessera::open`], [`Tessera::ephemeral`] or
/// [`Tessera::builder`].
///
/// # Example
///
/// ```ignore
/// use tessera::prelude::*;
///
/// let db = Tessera::open("./pages")?;
/// db.registry().register(POINT_ID, TypeKey::of::<Point>(), Arc::new(PointSerializer))?;
/// db.transaction(&mut InsertPoint::new(point))?;
/// db.flush()?;
/// ```
pub struct Tessera {
    registry: Arc<SerializationRegistry>,
    database: Arc<RawDatabase>,
    path: Option<PathBuf>,
}

impl Tessera {
    /// Open a database stored in `path` with default settings
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::builder().path(path).open()
    }

    /// Open a database held in process memory.
    ///
    /// Nothing touches the disk and all pages are lost on drop.
    pub fn ephemeral() -> Result<Self> {
        Self::builder().open()
    }

    /// Create a builder for database configuration
    pub fn builder() -> TesseraBuilder {
        TesseraBuilder::new()
    }

    /// Registry shared by sessions and the database
    pub fn registry(&self) -> &Arc<SerializationRegistry> {
        &self.registry
    }

    /// Underlying page database
    pub fn database(&self) -> &Arc<RawDatabase> {
        &self.database
    }

    /// Directory holding the data files, `None` when ephemeral
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Check if the database was opened without a directory
    pub fn is_ephemeral(&self) -> bool {
        self.path.is_none()
    }

    /// Start an encoding session over the shared registry
    pub fn serialization(&self) -> Serialization {
        Serialization::new(self.registry.clone())
    }

    /// Start an encoding session that begins with a stream header
    pub fn serialization_with_header(&self, magic: u32, version: u32) -> Serialization {
        Serialization::with_header(self.registry.clone(), ByteOutputStream::new(), magic, version)
    }

    /// Start a decoding session over `bytes`
    pub fn deserialization(&self, bytes: Vec<u8>) -> Deserialization {
        Deserialization::from_bytes(self.registry.clone(), bytes)
    }

    /// Start a decoding session that checks the stream header first
    pub fn deserialization_with_header(
        &self,
        bytes: Vec<u8>,
        magic: u32,
        min_version: u32,
        max_version: u32,
    ) -> Result<Deserialization> {
        Ok(Deserialization::with_header(
            self.registry.clone(),
            ByteInputStream::new(bytes),
            magic,
            min_version,
            max_version,
        )?)
    }

    /// Run one operation in its own transaction
    pub fn transaction(&self, operation: &mut dyn RawOperation) -> Result<()> {
        Ok(self.database.transaction(operation)?)
    }

    /// Run a batch to completion
    pub fn transaction_batch(&self, batch: &mut dyn RawBatchOperation) -> Result<()> {
        Ok(self.database.transaction_batch(batch)?)
    }

    /// Write every cached change to the page store and sync it
    pub fn flush(&self) -> Result<()> {
        Ok(self.database.flush()?)
    }
}

impl std::fmt::Debug for Tessera {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tessera")
            .field("path", &self.path)
            .field("database", &self.database)
            .finish()
    }
}

/// Builder for [`Tessera`].
///
/// # Example
///
/// ```ignore
/// // Directory store with a custom page size
/// let db = Tessera::builder()
///     .path("./pages")
///     .page_size(8192)
///     .open()?;
///
/// // Settings from a TOML file, pages in memory
/// let db = Tessera::builder()
///     .config_file("tessera.toml")?
///     .open()?;
/// ```
pub struct TesseraBuilder {
    config: RawDatabaseConfig,
    path: Option<PathBuf>,
    store: Option<Arc<dyn PageStore>>,
    registry: Option<Arc<SerializationRegistry>>,
    time: Option<Arc<dyn TimeService>>,
}

impl TesseraBuilder {
    /// Create a builder with default settings
    pub fn new() -> Self {
        Self {
            config: RawDatabaseConfig::default(),
            path: None,
            store: None,
            registry: None,
            time: None,
        }
    }

    /// Store pages in files under `path`
    pub fn path(mut self, path: impl AsRef<Path>) -> Self {
        self.path = Some(path.as_ref().to_path_buf());
        self
    }

    /// Use an existing page store.
    ///
    /// Takes precedence over [`path`](Self::path).
    pub fn store(mut self, store: Arc<dyn PageStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Replace the whole engine configuration
    pub fn config(mut self, config: RawDatabaseConfig) -> Self {
        self.config = config;
        self
    }

    /// Load the engine configuration from a TOML file
    pub fn config_file(mut self, path: impl AsRef<Path>) -> Result<Self> {
        self.config = RawDatabaseConfig::from_file(path.as_ref())?;
        Ok(self)
    }

    /// Page size in bytes
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.config.page_size = page_size;
        self
    }

    /// Clean pages kept cached before eviction
    pub fn max_cached_pages(mut self, max_cached_pages: usize) -> Self {
        self.config.max_cached_pages = max_cached_pages;
        self
    }

    /// Share an existing registry instead of creating an empty one
    pub fn registry(mut self, registry: Arc<SerializationRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    /// Clock handed to operations
    pub fn time_service(mut self, time: Arc<dyn TimeService>) -> Self {
        self.time = Some(time);
        self
    }

    /// Open the database
    pub fn open(self) -> Result<Tessera> {
        let store: Arc<dyn PageStore> = match (self.store, &self.path) {
            (Some(store), _) => store,
            (None, Some(path)) => Arc::new(FilePageStore::open(path)?),
            (None, None) => Arc::new(MemoryPageStore::new()),
        };
        let registry = self
            .registry
            .unwrap_or_else(|| Arc::new(SerializationRegistry::new()));
        let time = self
            .time
            .unwrap_or_else(|| Arc::new(SystemTimeService) as Arc<dyn TimeService>);
        let context = OperationContext::new(time, registry.clone());
        let database = RawDatabase::open_with_context(self.config, store, context)?;
        Ok(Tessera {
            registry,
            database: Arc::new(database),
            path: self.path,
        })
    }
}

impl Default for TesseraBuilder {
    fn default() -> Self {
        Self::new()
    }
}
