//! Page cache
//!
//! Holds bound data files and the pages loaded from (or created for) them.
//! Dirty pages stay cached until they reach the page store; clean pages are
//! evicted least-recently-used first once the cache exceeds its limit.

use crate::error::{RawDatabaseError, Result};
use crate::store::PageStore;
use rustc_hash::{FxHashMap, FxHashSet};
use std::any::Any;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// User payload attached to a cached page.
///
/// Lives as long as the page stays cached.
pub trait RawPageData: Send + Sync {
    /// The transaction that touched the page committed
    fn on_committed(&mut self) {}

    /// The transaction that touched the page rolled back
    fn on_rolled_back(&mut self) {}

    /// The page is being evicted from the cache
    fn on_unloaded(&mut self) {}

    /// Concrete payload, for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Concrete payload, mutably
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// `(file index, page index)`
pub(crate) type PageKey = (u32, u64);

pub(crate) struct CachedPage {
    pub data: Box<[u8]>,
    pub dirty: bool,
    pub last_access: AtomicU64,
    pub payload: Option<Box<dyn RawPageData>>,
}

impl CachedPage {
    fn new(data: Box<[u8]>, dirty: bool, tick: u64) -> Self {
        CachedPage {
            data,
            dirty,
            last_access: AtomicU64::new(tick),
            payload: None,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct FileState {
    pub name: Option<String>,
    pub page_count: u64,
}

pub(crate) struct PageCache {
    page_size: usize,
    max_cached_pages: usize,
    pub files: BTreeMap<u32, FileState>,
    pub pages: FxHashMap<PageKey, CachedPage>,
    /// Files created in memory but not yet written to the store
    pub unsaved_files: FxHashSet<u32>,
    tick: AtomicU64,
}

impl PageCache {
    /// Build the cache from the files a store already holds
    pub fn load(store: &dyn PageStore, page_size: usize, max_cached_pages: usize) -> Result<Self> {
        let mut files = BTreeMap::new();
        for file in store.list_files()? {
            let page_count = (file.length + page_size as u64 - 1) / page_size as u64;
            files.insert(
                file.index,
                FileState {
                    name: file.name,
                    page_count,
                },
            );
        }
        Ok(PageCache {
            page_size,
            max_cached_pages,
            files,
            pages: FxHashMap::default(),
            unsaved_files: FxHashSet::default(),
            tick: AtomicU64::new(0),
        })
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn file(&self, index: u32) -> Result<&FileState> {
        self.files.get(&index).ok_or_else(|| {
            RawDatabaseError::invalid_argument(format!("data file {} is not bound", index))
        })
    }

    /// Ensure `key` addresses an existing page
    pub fn check_page(&self, key: PageKey) -> Result<()> {
        let file = self.file(key.0)?;
        if key.1 >= file.page_count {
            return Err(RawDatabaseError::invalid_argument(format!(
                "page {} is beyond the end of data file {} ({} pages)",
                key.1, key.0, file.page_count
            )));
        }
        Ok(())
    }

    /// Cached page, touching its LRU tick
    pub fn cached(&self, key: &PageKey) -> Option<&CachedPage> {
        let page = self.pages.get(key)?;
        page.last_access.store(self.next_tick(), Ordering::Relaxed);
        Some(page)
    }

    /// Read page bytes from the store without caching them
    pub fn read_from_store(&self, store: &dyn PageStore, key: PageKey) -> Result<Box<[u8]>> {
        let mut data = vec![0u8; self.page_size].into_boxed_slice();
        if !self.unsaved_files.contains(&key.0) {
            store.read_page(key.0, key.1, &mut data)?;
        }
        tracing::trace!(file = key.0, page = key.1, "page loaded");
        Ok(data)
    }

    /// Load `key` into the cache if it is not there yet
    pub fn ensure_cached(&mut self, store: &dyn PageStore, key: PageKey) -> Result<&mut CachedPage> {
        if !self.pages.contains_key(&key) {
            let data = self.read_from_store(store, key)?;
            let tick = self.next_tick();
            self.pages.insert(key, CachedPage::new(data, false, tick));
        }
        let tick = self.next_tick();
        match self.pages.get_mut(&key) {
            Some(page) => {
                *page.last_access.get_mut() = tick;
                Ok(page)
            }
            None => Err(RawDatabaseError::invalid_state("cached page vanished")),
        }
    }

    /// Insert a fresh zeroed dirty page
    pub fn insert_new(&mut self, key: PageKey) {
        let tick = self.next_tick();
        let data = vec![0u8; self.page_size].into_boxed_slice();
        self.pages.insert(key, CachedPage::new(data, true, tick));
    }

    /// Write unsaved files and dirty pages to the store
    pub fn persist(&mut self, store: &dyn PageStore, sync: bool) -> Result<usize> {
        let mut created: Vec<u32> = self.unsaved_files.iter().copied().collect();
        created.sort_unstable();
        for index in created {
            let name = self.files.get(&index).and_then(|f| f.name.clone());
            store.create_file(index, name.as_deref())?;
            self.unsaved_files.remove(&index);
        }

        let mut dirty: Vec<PageKey> = self
            .pages
            .iter()
            .filter(|(_, page)| page.dirty)
            .map(|(key, _)| *key)
            .collect();
        dirty.sort_unstable();
        for key in &dirty {
            if let Some(page) = self.pages.get_mut(key) {
                store.write_page(key.0, key.1, &page.data)?;
                page.dirty = false;
            }
        }

        if sync {
            store.sync()?;
        }
        tracing::trace!(pages = dirty.len(), sync, "dirty pages persisted");
        Ok(dirty.len())
    }

    /// Evict clean pages beyond the cache limit, oldest first
    pub fn evict(&mut self) -> usize {
        if self.pages.len() <= self.max_cached_pages {
            return 0;
        }
        let mut clean: Vec<(u64, PageKey)> = self
            .pages
            .iter()
            .filter(|(_, page)| !page.dirty)
            .map(|(key, page)| (page.last_access.load(Ordering::Relaxed), *key))
            .collect();
        clean.sort_unstable();

        let excess = self.pages.len() - self.max_cached_pages;
        let mut evicted = 0;
        for (_, key) in clean.into_iter().take(excess) {
            if let Some(mut page) = self.pages.remove(&key) {
                if let Some(payload) = page.payload.as_mut() {
                    payload.on_unloaded();
                }
                evicted += 1;
            }
        }
        if evicted > 0 {
            tracing::trace!(evicted, cached = self.pages.len(), "pages evicted");
        }
        evicted
    }

    #[cfg(test)]
    pub fn dirty_count(&self) -> usize {
        self.pages.values().filter(|p| p.dirty).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryPageStore;

    struct Counter {
        unloaded: std::sync::Arc<AtomicU64>,
    }

    impl RawPageData for Counter {
        fn on_unloaded(&mut self) {
            self.unloaded.fetch_add(1, Ordering::SeqCst);
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    #[test]
    fn test_load_computes_page_counts() {
        let store = MemoryPageStore::new();
        store.create_file(0, Some("a")).unwrap();
        store.write_page(0, 0, &[1u8; 512]).unwrap();
        store.write_page(0, 2, &[1u8; 512]).unwrap();
        let cache = PageCache::load(&store, 512, 8).unwrap();
        assert_eq!(cache.file(0).unwrap().page_count, 3);
        assert!(cache.check_page((0, 2)).is_ok());
        assert!(cache.check_page((0, 3)).is_err());
        assert!(cache.file(1).is_err());
    }

    #[test]
    fn test_persist_writes_unsaved_files_and_dirty_pages() {
        let store = MemoryPageStore::new();
        let mut cache = PageCache::load(&store, 512, 8).unwrap();
        cache.files.insert(
            4,
            FileState {
                name: Some("x".into()),
                page_count: 1,
            },
        );
        cache.unsaved_files.insert(4);
        cache.insert_new((4, 0));
        cache.pages.get_mut(&(4, 0)).unwrap().data[0] = 9;

        assert_eq!(cache.persist(&store, true).unwrap(), 1);
        assert_eq!(cache.dirty_count(), 0);
        assert!(cache.unsaved_files.is_empty());
        assert_eq!(store.sync_count(), 1);

        let mut buf = [0u8; 512];
        store.read_page(4, 0, &mut buf).unwrap();
        assert_eq!(buf[0], 9);
    }

    #[test]
    fn test_evict_keeps_dirty_and_recent_pages() {
        let store = MemoryPageStore::new();
        store.create_file(0, None).unwrap();
        let unloaded = std::sync::Arc::new(AtomicU64::new(0));
        let mut cache = PageCache::load(&store, 512, 2).unwrap();
        if let Some(file) = cache.files.get_mut(&0) {
            file.page_count = 4;
        }

        cache.ensure_cached(&store, (0, 0)).unwrap().payload = Some(Box::new(Counter {
            unloaded: unloaded.clone(),
        }));
        cache.ensure_cached(&store, (0, 1)).unwrap();
        cache.insert_new((0, 2));
        cache.ensure_cached(&store, (0, 3)).unwrap();
        assert!(cache.cached(&(0, 1)).is_some());

        assert_eq!(cache.evict(), 2);
        assert!(cache.pages.contains_key(&(0, 2)));
        assert!(cache.pages.contains_key(&(0, 1)));
        assert!(!cache.pages.contains_key(&(0, 0)));
        assert_eq!(unloaded.load(Ordering::SeqCst), 1);
    }
}
