//! Raw Database Engine Test Suite
//!
//! Drives the page database through the `Tessera` facade: transaction
//! commit and rollback, durability across reopen, batch scheduling against
//! ordinary transactions, checkpoint resume and the file-backed store.
//!
//! ## Running Tests
//!
//! ```bash
//! # Run all engine tests
//! cargo test --test rawdb_engine
//!
//! # Run batch scheduling tests only
//! cargo test --test rawdb_engine batches::
//! ```

use std::sync::Arc;

use tessera::prelude::*;
use tessera::rawdb::{MemoryPageStore, PageStore, RawDatabaseError, Result as RawResult};

// Test modules
pub mod batches;
pub mod checkpoints;
pub mod file_store;
pub mod transactions;

// =============================================================================
// SHARED TEST UTILITIES
// =============================================================================

/// Small pages and short batch slices
pub fn test_config() -> RawDatabaseConfig {
    RawDatabaseConfig {
        page_size: 512,
        max_cached_pages: 64,
        batch_run_period_ms: 20,
        batch_yield_timeout_ms: 20,
    }
}

/// Open a database over `store`
pub fn open_on(store: Arc<dyn PageStore>, config: RawDatabaseConfig) -> Tessera {
    Tessera::builder()
        .store(store)
        .config(config)
        .open()
        .expect("open database")
}

/// Open a database over a fresh memory store
pub fn create_db() -> (Tessera, Arc<MemoryPageStore>) {
    let store = Arc::new(MemoryPageStore::new());
    (open_on(store.clone(), test_config()), store)
}

/// Operation built from a closure
pub struct FnOperation<F> {
    pub options: OperationOptions,
    pub predicates: Option<Vec<String>>,
    pub body: F,
}

impl<F> FnOperation<F>
where
    F: FnMut(&mut dyn RawTransaction) -> RawResult<()>,
{
    pub fn write(body: F) -> Self {
        FnOperation {
            options: OperationOptions::NONE,
            predicates: None,
            body,
        }
    }

    pub fn read(body: F) -> Self {
        FnOperation {
            options: OperationOptions::READ_ONLY,
            predicates: None,
            body,
        }
    }

    pub fn with_options(mut self, options: OperationOptions) -> Self {
        self.options = self.options | options;
        self
    }

    pub fn with_predicates(mut self, predicates: &[&str]) -> Self {
        self.predicates = Some(predicates.iter().map(|p| p.to_string()).collect());
        self
    }
}

impl<F> RawOperation for FnOperation<F>
where
    F: FnMut(&mut dyn RawTransaction) -> RawResult<()>,
{
    fn options(&self) -> OperationOptions {
        self.options
    }

    fn batch_lock_predicates(&self) -> Option<Vec<String>> {
        self.predicates.clone()
    }

    fn run(&mut self, transaction: &mut dyn RawTransaction) -> RawResult<()> {
        (self.body)(transaction)
    }
}

/// Write `value` at the start of page `page` of file 0, creating the file
pub fn write_value(db: &Tessera, page: u64, value: i64, options: OperationOptions) {
    let mut op = FnOperation::write(|tx: &mut dyn RawTransaction| {
        tx.bind_file(0, Some("values"))?;
        tx.write_region(0, page, 0, 8)?.write_long(0, value)
    })
    .with_options(options);
    db.transaction(&mut op).expect("write value");
}

/// Value at the start of page `page` of file 0, `None` if the page does not exist
pub fn read_value(db: &Tessera, page: u64) -> Option<i64> {
    let mut found = None;
    let mut op = FnOperation::read(|tx: &mut dyn RawTransaction| {
        if !tx.is_file_bound(0) || tx.page_count(0)? <= page {
            return Ok(());
        }
        found = Some(tx.read_region(0, page, 0, 8)?.read_long(0)?);
        Ok(())
    });
    db.transaction(&mut op).expect("read value");
    found
}
