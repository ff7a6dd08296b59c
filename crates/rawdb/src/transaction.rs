//! Transactions over the page cache
//!
//! - Read-only transactions share the cache through a read guard. Pages
//!   that are not cached are loaded into a transaction-local map.
//! - Read-write transactions own the cache exclusively and keep an undo
//!   image of every page, payload, file and page count they change.
//!   Dropping an uncompleted read-write transaction rolls it back, so a
//!   panicking operation leaves the cache as it found it.

use crate::error::{RawDatabaseError, Result};
use crate::operation::{OperationOptions, TransactionState};
use crate::page::{PageCache, PageKey, RawPageData};
use crate::region::{check, ReadRegion, WriteRegion};
use crate::store::PageStore;
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use rustc_hash::{FxHashMap, FxHashSet};
use std::any::Any;
use std::collections::HashMap;

/// Transaction handle passed to operations.
pub trait RawTransaction {
    /// Check if the transaction can only read
    fn is_read_only(&self) -> bool;

    /// Check if the transaction has committed or rolled back
    fn is_completed(&self) -> bool;

    /// Current lifecycle state
    fn state(&self) -> TransactionState;

    /// Start time in milliseconds since the Unix epoch
    fn start_time(&self) -> u64;

    /// Scratch values shared by the operations of this transaction
    fn parameters(&mut self) -> &mut HashMap<String, Box<dyn Any>>;

    /// Page size in bytes
    fn page_size(&self) -> usize;

    /// Bind data file `file_index`, creating it if it does not exist.
    ///
    /// Creating requires a read-write transaction.
    fn bind_file(&mut self, file_index: u32, name: Option<&str>) -> Result<()>;

    /// Check if data file `file_index` exists
    fn is_file_bound(&self, file_index: u32) -> bool;

    /// Name the data file was created with
    fn file_name(&self, file_index: u32) -> Result<Option<String>>;

    /// Number of pages in the data file
    fn page_count(&self, file_index: u32) -> Result<u64>;

    /// Read `length` bytes at `offset` of a page
    fn read_region(
        &mut self,
        file_index: u32,
        page_index: u64,
        offset: usize,
        length: usize,
    ) -> Result<ReadRegion<'_>>;

    /// Write access to `length` bytes at `offset` of a page.
    ///
    /// Addressing a page past the end of the file extends it with zeroed
    /// pages.
    fn write_region(
        &mut self,
        file_index: u32,
        page_index: u64,
        offset: usize,
        length: usize,
    ) -> Result<WriteRegion<'_>>;

    /// Payload attached to a page (read-write transactions only)
    fn page_data(
        &mut self,
        file_index: u32,
        page_index: u64,
    ) -> Result<Option<&mut (dyn RawPageData + 'static)>>;

    /// Attach or clear a page payload (read-write transactions only)
    fn set_page_data(
        &mut self,
        file_index: u32,
        page_index: u64,
        data: Option<Box<dyn RawPageData>>,
    ) -> Result<()>;
}

pub(crate) struct TransactionCore {
    state: TransactionState,
    start_time: u64,
    parameters: HashMap<String, Box<dyn Any>>,
}

impl TransactionCore {
    pub fn new(start_time: u64) -> Self {
        TransactionCore {
            state: TransactionState::Created,
            start_time,
            parameters: HashMap::new(),
        }
    }
}

/// Engine-side control over a transaction's lifecycle
pub(crate) trait TransactionControl: RawTransaction {
    fn set_state(&mut self, state: TransactionState);

    /// Make changes visible; durable options also write them to the store
    fn commit(&mut self) -> Result<()>;

    /// Discard changes
    fn rollback(&mut self);
}

// ============================================================================
// Read-only
// ============================================================================

pub(crate) struct ReadTransaction<'a> {
    core: TransactionCore,
    cache: RwLockReadGuard<'a, PageCache>,
    store: &'a dyn PageStore,
    local: FxHashMap<PageKey, Box<[u8]>>,
}

impl<'a> ReadTransaction<'a> {
    pub fn new(
        cache: RwLockReadGuard<'a, PageCache>,
        store: &'a dyn PageStore,
        start_time: u64,
    ) -> Self {
        ReadTransaction {
            core: TransactionCore::new(start_time),
            cache,
            store,
            local: FxHashMap::default(),
        }
    }

    fn page(&mut self, key: PageKey) -> Result<&[u8]> {
        self.cache.check_page(key)?;
        if let Some(page) = self.cache.cached(&key) {
            return Ok(&page.data[..]);
        }
        if !self.local.contains_key(&key) {
            let data = self.cache.read_from_store(self.store, key)?;
            self.local.insert(key, data);
        }
        self.local
            .get(&key)
            .map(|data| &data[..])
            .ok_or_else(|| RawDatabaseError::invalid_state("loaded page vanished"))
    }
}

impl TransactionControl for ReadTransaction<'_> {
    fn set_state(&mut self, state: TransactionState) {
        self.core.state = state;
    }

    fn commit(&mut self) -> Result<()> {
        self.core.state = TransactionState::Committed;
        Ok(())
    }

    fn rollback(&mut self) {
        self.core.state = TransactionState::RolledBack;
    }
}

impl RawTransaction for ReadTransaction<'_> {
    fn is_read_only(&self) -> bool {
        true
    }

    fn is_completed(&self) -> bool {
        self.core.state.is_completed()
    }

    fn state(&self) -> TransactionState {
        self.core.state
    }

    fn start_time(&self) -> u64 {
        self.core.start_time
    }

    fn parameters(&mut self) -> &mut HashMap<String, Box<dyn Any>> {
        &mut self.core.parameters
    }

    fn page_size(&self) -> usize {
        self.cache.page_size()
    }

    fn bind_file(&mut self, file_index: u32, _name: Option<&str>) -> Result<()> {
        if self.cache.files.contains_key(&file_index) {
            return Ok(());
        }
        Err(RawDatabaseError::invalid_state(format!(
            "data file {} cannot be created in a read-only transaction",
            file_index
        )))
    }

    fn is_file_bound(&self, file_index: u32) -> bool {
        self.cache.files.contains_key(&file_index)
    }

    fn file_name(&self, file_index: u32) -> Result<Option<String>> {
        Ok(self.cache.file(file_index)?.name.clone())
    }

    fn page_count(&self, file_index: u32) -> Result<u64> {
        Ok(self.cache.file(file_index)?.page_count)
    }

    fn read_region(
        &mut self,
        file_index: u32,
        page_index: u64,
        offset: usize,
        length: usize,
    ) -> Result<ReadRegion<'_>> {
        let data = self.page((file_index, page_index))?;
        ReadRegion::new(data).sub_region(offset, length)
    }

    fn write_region(&mut self, _: u32, _: u64, _: usize, _: usize) -> Result<WriteRegion<'_>> {
        Err(RawDatabaseError::invalid_state(
            "write access in a read-only transaction",
        ))
    }

    fn page_data(&mut self, _: u32, _: u64) -> Result<Option<&mut (dyn RawPageData + 'static)>> {
        Err(RawDatabaseError::invalid_state(
            "page data requires a read-write transaction",
        ))
    }

    fn set_page_data(&mut self, _: u32, _: u64, _: Option<Box<dyn RawPageData>>) -> Result<()> {
        Err(RawDatabaseError::invalid_state(
            "page data requires a read-write transaction",
        ))
    }
}

// ============================================================================
// Read-write
// ============================================================================

enum PageUndo {
    /// Page did not exist before this transaction
    Created,
    /// Page content and dirty flag before the first write
    Modified { data: Box<[u8]>, dirty: bool },
}

pub(crate) struct WriteTransaction<'a> {
    core: TransactionCore,
    options: OperationOptions,
    cache: RwLockWriteGuard<'a, PageCache>,
    store: &'a dyn PageStore,
    undo: FxHashMap<PageKey, PageUndo>,
    payload_undo: FxHashMap<PageKey, Option<Box<dyn RawPageData>>>,
    created_files: Vec<u32>,
    page_counts: FxHashMap<u32, u64>,
    touched: FxHashSet<PageKey>,
}

impl<'a> WriteTransaction<'a> {
    pub fn new(
        cache: RwLockWriteGuard<'a, PageCache>,
        store: &'a dyn PageStore,
        options: OperationOptions,
        start_time: u64,
    ) -> Self {
        WriteTransaction {
            core: TransactionCore::new(start_time),
            options,
            cache,
            store,
            undo: FxHashMap::default(),
            payload_undo: FxHashMap::default(),
            created_files: Vec::new(),
            page_counts: FxHashMap::default(),
            touched: FxHashSet::default(),
        }
    }

    fn page(&mut self, key: PageKey) -> Result<&[u8]> {
        self.cache.check_page(key)?;
        let store = self.store;
        Ok(&self.cache.ensure_cached(store, key)?.data[..])
    }

    fn extend(&mut self, file_index: u32, page_index: u64) -> Result<()> {
        let page_count = self.cache.file(file_index)?.page_count;
        if page_index < page_count {
            return Ok(());
        }
        self.page_counts.entry(file_index).or_insert(page_count);
        for index in page_count..=page_index {
            let key = (file_index, index);
            self.cache.insert_new(key);
            self.undo.insert(key, PageUndo::Created);
            self.touched.insert(key);
        }
        if let Some(file) = self.cache.files.get_mut(&file_index) {
            file.page_count = page_index + 1;
        }
        Ok(())
    }

    fn page_mut(&mut self, key: PageKey) -> Result<&mut [u8]> {
        self.extend(key.0, key.1)?;
        let store = self.store;
        let page = self.cache.ensure_cached(store, key)?;
        if !self.undo.contains_key(&key) {
            self.undo.insert(
                key,
                PageUndo::Modified {
                    data: page.data.clone(),
                    dirty: page.dirty,
                },
            );
        }
        page.dirty = true;
        self.touched.insert(key);
        Ok(&mut page.data[..])
    }
}

impl TransactionControl for WriteTransaction<'_> {
    fn set_state(&mut self, state: TransactionState) {
        self.core.state = state;
    }

    fn commit(&mut self) -> Result<()> {
        let cache = &mut *self.cache;
        for key in self.touched.drain() {
            if let Some(payload) = cache.pages.get_mut(&key).and_then(|p| p.payload.as_mut()) {
                payload.on_committed();
            }
        }
        self.undo.clear();
        self.payload_undo.clear();
        self.created_files.clear();
        self.page_counts.clear();
        self.core.state = TransactionState::Committed;

        let persisted = if self.options.is_durable() {
            cache.persist(self.store, self.options.is_flush())
        } else {
            Ok(0)
        };
        cache.evict();

        match persisted {
            Ok(pages) => {
                let durable = self.options.is_durable();
                tracing::trace!(pages, durable, "transaction committed");
                Ok(())
            }
            Err(e) => {
                tracing::error!(
                    error = %e,
                    "durable commit failed; changes stay cached until the next flush"
                );
                Err(e)
            }
        }
    }

    /// Restores every page, payload, file and page count this transaction changed
    fn rollback(&mut self) {
        if self.core.state.is_completed() {
            return;
        }
        let cache = &mut *self.cache;

        for (key, previous) in self.payload_undo.drain() {
            if let Some(page) = cache.pages.get_mut(&key) {
                if let Some(mut discarded) = std::mem::replace(&mut page.payload, previous) {
                    discarded.on_rolled_back();
                }
            }
        }
        for key in self.touched.drain() {
            if let Some(payload) = cache.pages.get_mut(&key).and_then(|p| p.payload.as_mut()) {
                payload.on_rolled_back();
            }
        }
        for (key, undo) in self.undo.drain() {
            match undo {
                PageUndo::Created => {
                    cache.pages.remove(&key);
                }
                PageUndo::Modified { data, dirty } => {
                    if let Some(page) = cache.pages.get_mut(&key) {
                        page.data = data;
                        page.dirty = dirty;
                    }
                }
            }
        }
        for (index, page_count) in self.page_counts.drain() {
            if let Some(file) = cache.files.get_mut(&index) {
                file.page_count = page_count;
            }
        }
        for index in self.created_files.drain(..) {
            cache.files.remove(&index);
            cache.unsaved_files.remove(&index);
        }

        self.core.state = TransactionState::RolledBack;
        tracing::trace!("transaction rolled back");
    }
}

impl Drop for WriteTransaction<'_> {
    fn drop(&mut self) {
        if !self.core.state.is_completed() {
            self.rollback();
        }
    }
}

impl RawTransaction for WriteTransaction<'_> {
    fn is_read_only(&self) -> bool {
        false
    }

    fn is_completed(&self) -> bool {
        self.core.state.is_completed()
    }

    fn state(&self) -> TransactionState {
        self.core.state
    }

    fn start_time(&self) -> u64 {
        self.core.start_time
    }

    fn parameters(&mut self) -> &mut HashMap<String, Box<dyn Any>> {
        &mut self.core.parameters
    }

    fn page_size(&self) -> usize {
        self.cache.page_size()
    }

    fn bind_file(&mut self, file_index: u32, name: Option<&str>) -> Result<()> {
        if self.cache.files.contains_key(&file_index) {
            return Ok(());
        }
        self.cache.files.insert(
            file_index,
            crate::page::FileState {
                name: name.map(str::to_string),
                page_count: 0,
            },
        );
        self.cache.unsaved_files.insert(file_index);
        self.created_files.push(file_index);
        tracing::debug!(file = file_index, ?name, "data file bound");
        Ok(())
    }

    fn is_file_bound(&self, file_index: u32) -> bool {
        self.cache.files.contains_key(&file_index)
    }

    fn file_name(&self, file_index: u32) -> Result<Option<String>> {
        Ok(self.cache.file(file_index)?.name.clone())
    }

    fn page_count(&self, file_index: u32) -> Result<u64> {
        Ok(self.cache.file(file_index)?.page_count)
    }

    fn read_region(
        &mut self,
        file_index: u32,
        page_index: u64,
        offset: usize,
        length: usize,
    ) -> Result<ReadRegion<'_>> {
        let data = self.page((file_index, page_index))?;
        ReadRegion::new(data).sub_region(offset, length)
    }

    fn write_region(
        &mut self,
        file_index: u32,
        page_index: u64,
        offset: usize,
        length: usize,
    ) -> Result<WriteRegion<'_>> {
        let range = check(self.cache.page_size(), offset, length)?;
        let data = self.page_mut((file_index, page_index))?;
        Ok(WriteRegion::new(&mut data[range]))
    }

    fn page_data(
        &mut self,
        file_index: u32,
        page_index: u64,
    ) -> Result<Option<&mut (dyn RawPageData + 'static)>> {
        let key = (file_index, page_index);
        self.cache.check_page(key)?;
        self.touched.insert(key);
        let store = self.store;
        let page = self.cache.ensure_cached(store, key)?;
        match page.payload.as_mut() {
            Some(payload) => Ok(Some(&mut **payload)),
            None => Ok(None),
        }
    }

    fn set_page_data(
        &mut self,
        file_index: u32,
        page_index: u64,
        data: Option<Box<dyn RawPageData>>,
    ) -> Result<()> {
        let key = (file_index, page_index);
        self.cache.check_page(key)?;
        let store = self.store;
        let page = self.cache.ensure_cached(store, key)?;
        let previous = std::mem::replace(&mut page.payload, data);
        self.payload_undo.entry(key).or_insert(previous);
        self.touched.insert(key);
        Ok(())
    }
}
