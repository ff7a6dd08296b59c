//! Batch operation contract and lock predicates
//!
//! A batch validates once, then runs as a sequence of steps, each in its
//! own read-write transaction. While it is active, its locks keep
//! conflicting ordinary transactions waiting; `can_continue` tells a step
//! when it should return so queued transactions get a turn.
//!
//! # Step errors
//!
//! An error returned by a run step does NOT roll anything back: it is
//! logged and treated as the final, successful step. Only `validate` can
//! reject a batch. Batches that need to survive failures should checkpoint
//! their progress (`checkpoint_id`/`save_state`/`load_state`).

use crate::context::OperationContext;
use crate::error::Result;
use crate::operation::OperationOptions;
use crate::transaction::RawTransaction;
use tessera_serialization::{Deserialization, Serialization};
use uuid::Uuid;

/// Check if two predicates overlap: one is a prefix of the other.
pub fn predicates_conflict(a: &str, b: &str) -> bool {
    a.starts_with(b) || b.starts_with(a)
}

/// Batch lock mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockType {
    /// Blocks matching read-write transactions only
    Shared,
    /// Blocks every matching transaction
    Exclusive,
}

/// Lock held by an active batch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BatchLock {
    predicate: String,
    lock_type: LockType,
}

impl BatchLock {
    /// Create a lock
    pub fn new(predicate: impl Into<String>, lock_type: LockType) -> Self {
        BatchLock {
            predicate: predicate.into(),
            lock_type,
        }
    }

    /// Shared lock on `predicate`
    pub fn shared(predicate: impl Into<String>) -> Self {
        Self::new(predicate, LockType::Shared)
    }

    /// Exclusive lock on `predicate`
    pub fn exclusive(predicate: impl Into<String>) -> Self {
        Self::new(predicate, LockType::Exclusive)
    }

    /// Locked predicate
    pub fn predicate(&self) -> &str {
        &self.predicate
    }

    /// Lock mode
    pub fn lock_type(&self) -> LockType {
        self.lock_type
    }

    /// Check if this lock blocks a transaction with the given predicates.
    ///
    /// `None` predicates match everything.
    pub fn blocks(&self, predicates: Option<&[String]>, read_only: bool) -> bool {
        if self.lock_type == LockType::Shared && read_only {
            return false;
        }
        match predicates {
            None => true,
            Some(predicates) => predicates
                .iter()
                .any(|p| predicates_conflict(&self.predicate, p)),
        }
    }
}

/// Cooperative scheduling hint handed to each run step.
pub trait RawBatchControl {
    /// `false` once the step has used its time slice or transactions are queued
    fn can_continue(&self) -> bool;
}

/// A long-running operation executed as a sequence of steps.
pub trait RawBatchOperation {
    /// Option flags applied to every step transaction
    fn options(&self) -> OperationOptions {
        OperationOptions::NONE
    }

    /// Locks held while the batch is active; re-queried between steps.
    ///
    /// The default exclusive lock on the empty predicate blocks everything.
    fn locks(&self) -> Vec<BatchLock> {
        vec![BatchLock::exclusive("")]
    }

    /// Receive the database context before anything runs
    fn set_context(&mut self, _context: &OperationContext) {}

    /// Runs once, exclusively; an error aborts the batch
    fn validate(&mut self, _transaction: &mut dyn RawTransaction) -> Result<()> {
        Ok(())
    }

    /// One step; returns `true` when the batch is done.
    ///
    /// An error is treated as completion (see module docs).
    fn run(
        &mut self,
        transaction: &mut dyn RawTransaction,
        control: &dyn RawBatchControl,
    ) -> Result<bool>;

    /// Called before each step commits
    fn on_before_committed(&mut self, _completed: bool) {}

    /// Called after each step commits
    fn on_committed(&mut self, _completed: bool) {}

    /// Called before a failed validation is rolled back
    fn on_before_rolled_back(&mut self) {}

    /// Called after a failed validation is rolled back
    fn on_rolled_back(&mut self) {}

    /// Identity of this batch's persisted progress; `None` disables checkpoints.
    ///
    /// With an id, every step transaction is durable regardless of `options`.
    fn checkpoint_id(&self) -> Option<Uuid> {
        None
    }

    /// Write progress needed to resume after a restart
    fn save_state(&self, _serialization: &mut Serialization) -> tessera_serialization::Result<()> {
        Ok(())
    }

    /// Restore progress written by `save_state`
    fn load_state(
        &mut self,
        _deserialization: &mut Deserialization,
    ) -> tessera_serialization::Result<()> {
        Ok(())
    }
}
