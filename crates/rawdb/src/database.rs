//! Reference engine
//!
//! `RawDatabase` drives operations through transactions over a page cache
//! backed by a [`PageStore`]:
//!
//! - read-only transactions share the cache
//! - read-write transactions and batch steps hold it exclusively
//! - the lock manager keeps ordinary transactions out of
//!   the way of an active batch according to its lock predicates
//!
//! # Example
//!
//! ```ignore
//! let db = RawDatabase::open(config, Arc::new(MemoryPageStore::new()), registry)?;
//! db.transaction(&mut my_operation)?;
//! db.transaction_batch(&mut my_batch)?;
//! ```

use crate::batch::RawBatchOperation;
use crate::checkpoint::Checkpoint;
use crate::config::RawDatabaseConfig;
use crate::context::{OperationContext, SystemTimeService};
use crate::error::Result;
use crate::lock::{LockManager, StepControl};
use crate::operation::{OperationOptions, RawOperation, TransactionState};
use crate::page::PageCache;
use crate::store::PageStore;
use crate::transaction::{ReadTransaction, TransactionControl, WriteTransaction};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tessera_serialization::{Deserialization, Serialization, SerializationRegistry};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Page-oriented transactional database.
pub struct RawDatabase {
    config: RawDatabaseConfig,
    store: Arc<dyn PageStore>,
    cache: RwLock<PageCache>,
    locks: LockManager,
    /// Serializes batches
    batch_gate: Mutex<()>,
    context: OperationContext,
}

impl RawDatabase {
    /// Open a database over `store`, using the system clock
    pub fn open(
        config: RawDatabaseConfig,
        store: Arc<dyn PageStore>,
        registry: Arc<SerializationRegistry>,
    ) -> Result<Self> {
        let context = OperationContext::new(Arc::new(SystemTimeService), registry);
        Self::open_with_context(config, store, context)
    }

    /// Open a database with explicit operation services
    pub fn open_with_context(
        config: RawDatabaseConfig,
        store: Arc<dyn PageStore>,
        context: OperationContext,
    ) -> Result<Self> {
        config.validate()?;
        let cache = PageCache::load(store.as_ref(), config.page_size, config.max_cached_pages)?;
        info!(
            files = cache.files.len(),
            page_size = config.page_size,
            max_cached_pages = config.max_cached_pages,
            "raw database opened"
        );
        Ok(RawDatabase {
            config,
            store,
            cache: RwLock::new(cache),
            locks: LockManager::new(),
            batch_gate: Mutex::new(()),
            context,
        })
    }

    /// Configuration the database was opened with
    pub fn config(&self) -> &RawDatabaseConfig {
        &self.config
    }

    /// Services shared with operations
    pub fn context(&self) -> &OperationContext {
        &self.context
    }

    /// Run one operation in its own transaction
    pub fn transaction(&self, operation: &mut dyn RawOperation) -> Result<()> {
        self.transaction_all(&mut [operation])
    }

    /// Run `operations` in order inside one transaction.
    ///
    /// The transaction is read-only when every operation is. Lock
    /// predicates are the union of the operations' predicates; one
    /// operation without predicates makes the whole transaction
    /// conflict with every batch lock.
    pub fn transaction_all(&self, operations: &mut [&mut dyn RawOperation]) -> Result<()> {
        if operations.is_empty() {
            return Ok(());
        }

        let mut options = OperationOptions::NONE;
        let mut read_only = true;
        let mut predicates = Some(Vec::new());
        for operation in operations.iter() {
            let operation_options = operation.options();
            read_only &= operation_options.is_read_only();
            options = options | operation_options;
            predicates = match (predicates, operation.batch_lock_predicates()) {
                (Some(mut all), Some(own)) => {
                    all.extend(own);
                    Some(all)
                }
                _ => None,
            };
        }

        let mut admission = self.locks.enter_transaction(predicates, read_only);
        let start_time = self.context.current_time();
        if read_only {
            let mut transaction =
                ReadTransaction::new(self.cache.read(), self.store.as_ref(), start_time);
            admission.started();
            execute(&mut transaction, operations)
        } else {
            let mut transaction = WriteTransaction::new(
                self.cache.write(),
                self.store.as_ref(),
                options,
                start_time,
            );
            admission.started();
            execute(&mut transaction, operations)
        }
    }

    /// Run a batch to completion.
    ///
    /// Validation runs once, unless the batch resumes from a checkpoint.
    /// Batches with a checkpoint id commit validation and every step
    /// durably before the checkpoint is saved. Only a validation error is returned as a failure; step errors end
    /// the batch as completed (see [`crate::batch`]).
    pub fn transaction_batch(&self, batch: &mut dyn RawBatchOperation) -> Result<()> {
        let _gate = self.batch_gate.lock();
        batch.set_context(&self.context);

        let checkpoint_id = batch.checkpoint_id();
        // A checkpoint may only describe progress the store already holds
        let options = match checkpoint_id {
            Some(_) => batch.options() | OperationOptions::DURABLE,
            None => batch.options(),
        };
        let resumed = match checkpoint_id {
            Some(id) => self.load_checkpoint(id, batch)?,
            None => false,
        };

        let _active = self.locks.activate_batch(batch.locks());
        if resumed {
            info!(checkpoint = ?checkpoint_id, "batch resumed from checkpoint");
        } else {
            info!(checkpoint = ?checkpoint_id, "batch started");
            self.validate_batch(batch, options)?;
            if let Some(id) = checkpoint_id {
                self.save_checkpoint(id, batch)?;
            }
        }

        let mut steps = 0u64;
        loop {
            let completed = self.run_step(batch, options)?;
            steps += 1;
            if completed {
                if checkpoint_id.is_some() {
                    self.store.remove_checkpoint()?;
                }
                info!(steps, "batch finished");
                return Ok(());
            }
            if let Some(id) = checkpoint_id {
                self.save_checkpoint(id, batch)?;
            }
            self.locks
                .resume_batch(batch.locks(), self.config.batch_yield_timeout());
        }
    }

    /// Write every dirty page to the store and sync it
    pub fn flush(&self) -> Result<()> {
        let mut cache = self.cache.write();
        let pages = cache.persist(self.store.as_ref(), true)?;
        cache.evict();
        debug!(pages, "raw database flushed");
        Ok(())
    }

    /// Batch id of the checkpoint left in the store, if any
    pub fn pending_checkpoint(&self) -> Result<Option<Uuid>> {
        match self.store.load_checkpoint()? {
            Some(bytes) => Ok(Some(Checkpoint::from_bytes(&bytes)?.batch_id)),
            None => Ok(None),
        }
    }

    fn validate_batch(
        &self,
        batch: &mut dyn RawBatchOperation,
        options: OperationOptions,
    ) -> Result<()> {
        let mut transaction = WriteTransaction::new(
            self.cache.write(),
            self.store.as_ref(),
            options,
            self.context.current_time(),
        );
        transaction.set_state(TransactionState::Validating);
        match batch.validate(&mut transaction) {
            Ok(()) => {
                transaction.set_state(TransactionState::Committing);
                transaction.commit()
            }
            Err(e) => {
                batch.on_before_rolled_back();
                transaction.rollback();
                batch.on_rolled_back();
                info!(error = %e, "batch rejected by validation");
                Err(e)
            }
        }
    }

    fn run_step(
        &self,
        batch: &mut dyn RawBatchOperation,
        options: OperationOptions,
    ) -> Result<bool> {
        let mut transaction = WriteTransaction::new(
            self.cache.write(),
            self.store.as_ref(),
            options,
            self.context.current_time(),
        );
        transaction.set_state(TransactionState::Running);
        let control = StepControl::new(&self.locks, self.config.batch_run_period());
        let completed = match batch.run(&mut transaction, &control) {
            Ok(completed) => completed,
            Err(e) => {
                warn!(error = %e, "batch step failed, treating it as the final step");
                true
            }
        };

        transaction.set_state(TransactionState::Committing);
        batch.on_before_committed(completed);
        let committed = transaction.commit();
        drop(transaction);
        batch.on_committed(completed);
        committed?;
        Ok(completed)
    }

    fn load_checkpoint(&self, id: Uuid, batch: &mut dyn RawBatchOperation) -> Result<bool> {
        let bytes = match self.store.load_checkpoint()? {
            Some(bytes) => bytes,
            None => return Ok(false),
        };
        let checkpoint = Checkpoint::from_bytes(&bytes)?;
        if checkpoint.batch_id != id {
            warn!(
                stored = %checkpoint.batch_id,
                batch = %id,
                "ignoring checkpoint written by another batch"
            );
            return Ok(false);
        }
        let mut deserialization =
            Deserialization::from_bytes(self.context.registry().clone(), checkpoint.state);
        batch.load_state(&mut deserialization)?;
        Ok(true)
    }

    fn save_checkpoint(&self, id: Uuid, batch: &dyn RawBatchOperation) -> Result<()> {
        let mut serialization = Serialization::new(self.context.registry().clone());
        batch.save_state(&mut serialization)?;
        let checkpoint = Checkpoint::new(id, serialization.finish()?);
        self.store.save_checkpoint(&checkpoint.to_bytes()?)?;
        debug!(batch = %id, bytes = checkpoint.state.len(), "batch checkpoint saved");
        Ok(())
    }
}

impl std::fmt::Debug for RawDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawDatabase")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Drive `operations` through the state machine, then commit or roll back
fn execute<T: TransactionControl>(
    transaction: &mut T,
    operations: &mut [&mut dyn RawOperation],
) -> Result<()> {
    match run_operations(transaction, operations) {
        Ok(()) => {
            transaction.set_state(TransactionState::Committing);
            for operation in operations.iter_mut() {
                operation.on_before_committed();
            }
            let committed = transaction.commit();
            for operation in operations.iter_mut() {
                operation.on_committed();
            }
            committed
        }
        Err(e) => {
            for operation in operations.iter_mut() {
                operation.on_before_rolled_back();
            }
            transaction.rollback();
            for operation in operations.iter_mut() {
                operation.on_rolled_back();
            }
            debug!(error = %e, "transaction rolled back");
            Err(e)
        }
    }
}

fn run_operations<T: TransactionControl>(
    transaction: &mut T,
    operations: &mut [&mut dyn RawOperation],
) -> Result<()> {
    transaction.set_state(TransactionState::BeforeStarted);
    for operation in operations.iter_mut() {
        operation.on_before_started(transaction)?;
    }
    transaction.set_state(TransactionState::Running);
    for operation in operations.iter_mut() {
        operation.run(transaction)?;
    }
    if !transaction.is_read_only() {
        transaction.set_state(TransactionState::Validating);
        for operation in operations.iter_mut() {
            operation.validate(transaction)?;
        }
    }
    Ok(())
}
