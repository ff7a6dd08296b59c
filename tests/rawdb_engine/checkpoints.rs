//! Batch checkpoint and resume tests

use crate::*;
use serde::{Deserialize, Serialize};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::rc::Rc;
use tessera::serialization::Result as SerializationResult;
use uuid::Uuid;

const IMPORT_ID: Uuid = Uuid::from_u128(0x1a2b_3c4d_0000_4000_8000_0000_0000_0042);

/// Progress persisted between steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
struct Progress {
    next_page: u64,
}

/// Writes `page + 100` into pages `0..pages` of file 1, one page per step.
struct ImportBatch {
    id: Uuid,
    pages: u64,
    options: OperationOptions,
    progress: Progress,
    crash_on_page: Option<u64>,
    validations: u32,
    resumed: bool,
}

impl ImportBatch {
    fn new(id: Uuid, pages: u64) -> Self {
        ImportBatch {
            id,
            pages,
            options: OperationOptions::DURABLE,
            progress: Progress::default(),
            crash_on_page: None,
            validations: 0,
            resumed: false,
        }
    }
}

impl RawBatchOperation for ImportBatch {
    fn options(&self) -> OperationOptions {
        self.options
    }

    fn validate(&mut self, transaction: &mut dyn RawTransaction) -> RawResult<()> {
        self.validations += 1;
        transaction.bind_file(1, Some("import"))
    }

    fn run(
        &mut self,
        transaction: &mut dyn RawTransaction,
        _control: &dyn RawBatchControl,
    ) -> RawResult<bool> {
        let page = self.progress.next_page;
        if self.crash_on_page == Some(page) {
            panic!("simulated crash on page {}", page);
        }
        transaction
            .write_region(1, page, 0, 8)?
            .write_long(0, page as i64 + 100)?;
        self.progress.next_page += 1;
        Ok(self.progress.next_page >= self.pages)
    }

    fn checkpoint_id(&self) -> Option<Uuid> {
        Some(self.id)
    }

    fn save_state(&self, serialization: &mut Serialization) -> SerializationResult<()> {
        let progress: ObjectRef = Rc::new(self.progress.clone());
        serialization.write_object(Some(&progress))
    }

    fn load_state(&mut self, deserialization: &mut Deserialization) -> SerializationResult<()> {
        if let Some(progress) = deserialization.read_object_as::<Progress>()? {
            self.progress = (*progress).clone();
        }
        self.resumed = true;
        Ok(())
    }
}

fn open_with_progress_type(store: Arc<MemoryPageStore>) -> Tessera {
    let fallback = Arc::new(SerdeRegistryExtension::new());
    fallback.register::<Progress>();
    Tessera::builder()
        .store(store)
        .config(test_config())
        .registry(Arc::new(SerializationRegistry::with_extension(fallback)))
        .open()
        .unwrap()
}

fn read_import(db: &Tessera, page: u64) -> Option<i64> {
    let mut found = None;
    let mut op = FnOperation::read(|tx: &mut dyn RawTransaction| {
        if tx.is_file_bound(1) && tx.page_count(1)? > page {
            found = Some(tx.read_region(1, page, 0, 8)?.read_long(0)?);
        }
        Ok(())
    });
    db.transaction(&mut op).unwrap();
    found
}

#[test]
fn checkpointed_batch_resumes_after_crash() {
    let store = Arc::new(MemoryPageStore::new());
    {
        let db = open_with_progress_type(store.clone());
        let mut batch = ImportBatch::new(IMPORT_ID, 5);
        batch.crash_on_page = Some(3);
        let crashed = catch_unwind(AssertUnwindSafe(|| db.transaction_batch(&mut batch)));
        assert!(crashed.is_err());
        assert_eq!(db.database().pending_checkpoint().unwrap(), Some(IMPORT_ID));
    }

    // Restart on the same store
    let db = open_with_progress_type(store);
    assert_eq!(read_import(&db, 2), Some(102));
    assert_eq!(read_import(&db, 3), None);

    let mut batch = ImportBatch::new(IMPORT_ID, 5);
    db.transaction_batch(&mut batch).unwrap();
    assert!(batch.resumed);
    assert_eq!(batch.validations, 0);
    for page in 0..5 {
        assert_eq!(read_import(&db, page), Some(page as i64 + 100));
    }
    assert_eq!(db.database().pending_checkpoint().unwrap(), None);
}

#[test]
fn cached_only_steps_are_persisted_before_checkpoint() {
    let store = Arc::new(MemoryPageStore::new());
    {
        let db = open_with_progress_type(store.clone());
        let mut batch = ImportBatch::new(IMPORT_ID, 3);
        batch.options = OperationOptions::NONE;
        batch.crash_on_page = Some(1);
        let crashed = catch_unwind(AssertUnwindSafe(|| db.transaction_batch(&mut batch)));
        assert!(crashed.is_err());
    }

    // The checkpoint never runs ahead of the store
    let db = open_with_progress_type(store);
    assert_eq!(read_import(&db, 0), Some(100));

    let mut batch = ImportBatch::new(IMPORT_ID, 3);
    batch.options = OperationOptions::NONE;
    db.transaction_batch(&mut batch).unwrap();
    assert!(batch.resumed);
    assert_eq!(batch.validations, 0);
    for page in 0..3 {
        assert_eq!(read_import(&db, page), Some(page as i64 + 100));
    }
    assert_eq!(db.database().pending_checkpoint().unwrap(), None);
}

#[test]
fn checkpoint_of_another_batch_is_ignored() {
    let store = Arc::new(MemoryPageStore::new());
    let db = open_with_progress_type(store);
    let mut crashing = ImportBatch::new(IMPORT_ID, 5);
    crashing.crash_on_page = Some(1);
    let crashed = catch_unwind(AssertUnwindSafe(|| db.transaction_batch(&mut crashing)));
    assert!(crashed.is_err());

    let mut other = ImportBatch::new(Uuid::from_u128(7), 2);
    db.transaction_batch(&mut other).unwrap();
    assert!(!other.resumed);
    assert_eq!(other.validations, 1);
}

#[test]
fn corrupted_checkpoint_is_reported() {
    let store = Arc::new(MemoryPageStore::new());
    store.save_checkpoint(b"not a checkpoint").unwrap();
    let db = open_with_progress_type(store);

    let mut batch = ImportBatch::new(IMPORT_ID, 1);
    let err = db.transaction_batch(&mut batch).unwrap_err();
    assert!(err.is_corruption());
    assert_eq!(batch.validations, 0);
}

#[test]
fn completed_batch_leaves_no_checkpoint() {
    let store = Arc::new(MemoryPageStore::new());
    let db = open_with_progress_type(store.clone());
    let mut batch = ImportBatch::new(IMPORT_ID, 3);
    db.transaction_batch(&mut batch).unwrap();

    assert_eq!(batch.validations, 1);
    assert!(store.load_checkpoint().unwrap().is_none());
    // Durable steps reached the store
    assert!(store.page_write_count() >= 3);
}
