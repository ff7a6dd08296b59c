//! Page stores
//!
//! A page store is the persistent side of the page cache. It addresses data
//! files by index and pages by `page_index * page_size`, and also holds the
//! single batch checkpoint blob.
//!
//! # Implementations
//!
//! - [`MemoryPageStore`]: process memory; shareable between database
//!   instances to simulate restarts
//! - [`FilePageStore`]: one `{index:08}.dat` file per data file in a
//!   directory, with an optional `{index:08}.name` sidecar

use crate::error::{RawDatabaseError, Result};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

/// Data file as seen by the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredFile {
    /// File index
    pub index: u32,
    /// Optional file name
    pub name: Option<String>,
    /// Persisted length in bytes
    pub length: u64,
}

/// Persistent page storage.
pub trait PageStore: Send + Sync {
    /// All persisted data files, ordered by index
    fn list_files(&self) -> Result<Vec<StoredFile>>;

    /// Create an empty data file; existing files are left untouched
    fn create_file(&self, index: u32, name: Option<&str>) -> Result<()>;

    /// Fill `buf` from page `page_index`; bytes past the end read as zero
    fn read_page(&self, index: u32, page_index: u64, buf: &mut [u8]) -> Result<()>;

    /// Write `data` as page `page_index`, extending the file as needed
    fn write_page(&self, index: u32, page_index: u64, data: &[u8]) -> Result<()>;

    /// Make written pages durable
    fn sync(&self) -> Result<()>;

    /// Replace the checkpoint blob
    fn save_checkpoint(&self, data: &[u8]) -> Result<()>;

    /// Current checkpoint blob
    fn load_checkpoint(&self) -> Result<Option<Vec<u8>>>;

    /// Delete the checkpoint blob, if any
    fn remove_checkpoint(&self) -> Result<()>;
}

fn page_offset(page_index: u64, page_size: usize) -> Result<u64> {
    page_index.checked_mul(page_size as u64).ok_or_else(|| {
        RawDatabaseError::invalid_argument(format!("page index {} is out of range", page_index))
    })
}

// ============================================================================
// Memory store
// ============================================================================

#[derive(Default)]
struct MemoryFile {
    name: Option<String>,
    data: Vec<u8>,
}

#[derive(Default)]
struct MemoryState {
    files: BTreeMap<u32, MemoryFile>,
    checkpoint: Option<Vec<u8>>,
}

/// In-memory page store.
#[derive(Default)]
pub struct MemoryPageStore {
    state: Mutex<MemoryState>,
    syncs: AtomicU64,
    page_writes: AtomicU64,
}

impl MemoryPageStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `sync` calls so far
    pub fn sync_count(&self) -> u64 {
        self.syncs.load(Ordering::Acquire)
    }

    /// Number of page writes so far
    pub fn page_write_count(&self) -> u64 {
        self.page_writes.load(Ordering::Acquire)
    }
}

impl PageStore for MemoryPageStore {
    fn list_files(&self) -> Result<Vec<StoredFile>> {
        let state = self.state.lock();
        Ok(state
            .files
            .iter()
            .map(|(&index, file)| StoredFile {
                index,
                name: file.name.clone(),
                length: file.data.len() as u64,
            })
            .collect())
    }

    fn create_file(&self, index: u32, name: Option<&str>) -> Result<()> {
        let mut state = self.state.lock();
        state.files.entry(index).or_insert_with(|| MemoryFile {
            name: name.map(str::to_string),
            data: Vec::new(),
        });
        Ok(())
    }

    fn read_page(&self, index: u32, page_index: u64, buf: &mut [u8]) -> Result<()> {
        let state = self.state.lock();
        let file = state.files.get(&index).ok_or_else(|| {
            RawDatabaseError::invalid_argument(format!("data file {} does not exist", index))
        })?;
        let start = page_offset(page_index, buf.len())? as usize;
        buf.fill(0);
        if start < file.data.len() {
            let end = (start + buf.len()).min(file.data.len());
            buf[..end - start].copy_from_slice(&file.data[start..end]);
        }
        Ok(())
    }

    fn write_page(&self, index: u32, page_index: u64, data: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        let file = state.files.get_mut(&index).ok_or_else(|| {
            RawDatabaseError::invalid_argument(format!("data file {} does not exist", index))
        })?;
        let start = page_offset(page_index, data.len())? as usize;
        let end = start + data.len();
        if file.data.len() < end {
            file.data.resize(end, 0);
        }
        file.data[start..end].copy_from_slice(data);
        self.page_writes.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn sync(&self) -> Result<()> {
        self.syncs.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    fn save_checkpoint(&self, data: &[u8]) -> Result<()> {
        self.state.lock().checkpoint = Some(data.to_vec());
        Ok(())
    }

    fn load_checkpoint(&self) -> Result<Option<Vec<u8>>> {
        Ok(self.state.lock().checkpoint.clone())
    }

    fn remove_checkpoint(&self) -> Result<()> {
        self.state.lock().checkpoint = None;
        Ok(())
    }
}

impl std::fmt::Debug for MemoryPageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("MemoryPageStore")
            .field("files", &state.files.len())
            .field("has_checkpoint", &state.checkpoint.is_some())
            .finish()
    }
}

// ============================================================================
// File store
// ============================================================================

const DATA_EXTENSION: &str = "dat";
const NAME_EXTENSION: &str = "name";
const CHECKPOINT_FILE: &str = "batch.checkpoint";
const CHECKPOINT_TEMP_FILE: &str = "batch.checkpoint.tmp";

/// Directory-backed page store.
#[derive(Debug)]
pub struct FilePageStore {
    dir: PathBuf,
    handles: Mutex<FxHashMap<u32, File>>,
}

impl FilePageStore {
    /// Open (creating if needed) a store rooted at `dir`
    pub fn open(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        tracing::debug!(path = %dir.display(), "file page store opened");
        Ok(FilePageStore {
            dir,
            handles: Mutex::new(FxHashMap::default()),
        })
    }

    /// Store directory
    pub fn path(&self) -> &Path {
        &self.dir
    }

    fn data_path(&self, index: u32) -> PathBuf {
        self.dir.join(format!("{:08}.{}", index, DATA_EXTENSION))
    }

    fn name_path(&self, index: u32) -> PathBuf {
        self.dir.join(format!("{:08}.{}", index, NAME_EXTENSION))
    }

    fn with_handle<T>(&self, index: u32, f: impl FnOnce(&mut File) -> Result<T>) -> Result<T> {
        let mut handles = self.handles.lock();
        if !handles.contains_key(&index) {
            let path = self.data_path(index);
            if !path.exists() {
                return Err(RawDatabaseError::invalid_argument(format!(
                    "data file {} does not exist",
                    index
                )));
            }
            let file = OpenOptions::new().read(true).write(true).open(&path)?;
            handles.insert(index, file);
        }
        match handles.get_mut(&index) {
            Some(file) => f(file),
            None => Err(RawDatabaseError::invalid_state("data file handle vanished")),
        }
    }
}

impl PageStore for FilePageStore {
    fn list_files(&self) -> Result<Vec<StoredFile>> {
        let mut files = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(DATA_EXTENSION) {
                continue;
            }
            let index = match path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u32>().ok())
            {
                Some(index) => index,
                None => continue,
            };
            let name = match fs::read_to_string(self.name_path(index)) {
                Ok(name) => Some(name),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
                Err(e) => return Err(e.into()),
            };
            files.push(StoredFile {
                index,
                name,
                length: fs::metadata(&path)?.len(),
            });
        }
        files.sort_by_key(|f| f.index);
        Ok(files)
    }

    fn create_file(&self, index: u32, name: Option<&str>) -> Result<()> {
        let path = self.data_path(index);
        if path.exists() {
            return Ok(());
        }
        if let Some(name) = name {
            fs::write(self.name_path(index), name)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(&path)?;
        self.handles.lock().insert(index, file);
        tracing::debug!(index, ?name, "data file created");
        Ok(())
    }

    fn read_page(&self, index: u32, page_index: u64, buf: &mut [u8]) -> Result<()> {
        let offset = page_offset(page_index, buf.len())?;
        self.with_handle(index, |file| {
            buf.fill(0);
            let length = file.metadata()?.len();
            if offset >= length {
                return Ok(());
            }
            file.seek(SeekFrom::Start(offset))?;
            let available = ((length - offset) as usize).min(buf.len());
            file.read_exact(&mut buf[..available])?;
            Ok(())
        })
    }

    fn write_page(&self, index: u32, page_index: u64, data: &[u8]) -> Result<()> {
        let offset = page_offset(page_index, data.len())?;
        self.with_handle(index, |file| {
            file.seek(SeekFrom::Start(offset))?;
            file.write_all(data)?;
            Ok(())
        })
    }

    fn sync(&self) -> Result<()> {
        let handles = self.handles.lock();
        for file in handles.values() {
            file.sync_data()?;
        }
        Ok(())
    }

    fn save_checkpoint(&self, data: &[u8]) -> Result<()> {
        let temp = self.dir.join(CHECKPOINT_TEMP_FILE);
        {
            let mut file = File::create(&temp)?;
            file.write_all(data)?;
            file.sync_all()?;
        }
        fs::rename(&temp, self.dir.join(CHECKPOINT_FILE))?;
        Ok(())
    }

    fn load_checkpoint(&self) -> Result<Option<Vec<u8>>> {
        match fs::read(self.dir.join(CHECKPOINT_FILE)) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn remove_checkpoint(&self) -> Result<()> {
        match fs::remove_file(self.dir.join(CHECKPOINT_FILE)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
