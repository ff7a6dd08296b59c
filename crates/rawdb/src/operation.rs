//! Ordinary operation contract
//!
//! An operation is driven through one transaction:
//!
//! ```text
//! Created → BeforeStarted → Running ─┬──────────────┬→ Committing → Committed
//!                                    └→ Validating ─┘   (read-write only)
//!             any error before Committed ──────────────→ RolledBack
//! ```

use crate::error::Result;
use crate::transaction::RawTransaction;
use std::fmt;
use std::ops::BitOr;

/// Operation option flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct OperationOptions(u32);

impl OperationOptions {
    /// Read-write, cached commit
    pub const NONE: OperationOptions = OperationOptions(0);
    /// The operation never writes
    pub const READ_ONLY: OperationOptions = OperationOptions(1);
    /// Commit writes dirty pages to the page store
    pub const DURABLE: OperationOptions = OperationOptions(2);
    /// Durable commit also syncs the page store
    pub const FLUSH: OperationOptions = OperationOptions(4);

    /// Raw flag bits
    pub fn bits(self) -> u32 {
        self.0
    }

    /// Check if every flag of `other` is set
    pub fn contains(self, other: OperationOptions) -> bool {
        self.0 & other.0 == other.0
    }

    /// Shortcut for `contains(READ_ONLY)`
    pub fn is_read_only(self) -> bool {
        self.contains(Self::READ_ONLY)
    }

    /// Pages must reach the store at commit; `FLUSH` implies `DURABLE`
    pub fn is_durable(self) -> bool {
        self.0 & (Self::DURABLE.0 | Self::FLUSH.0) != 0
    }

    /// Shortcut for `contains(FLUSH)`
    pub fn is_flush(self) -> bool {
        self.contains(Self::FLUSH)
    }
}

impl BitOr for OperationOptions {
    type Output = OperationOptions;

    fn bitor(self, rhs: OperationOptions) -> OperationOptions {
        OperationOptions(self.0 | rhs.0)
    }
}

impl fmt::Debug for OperationOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = Vec::new();
        if self.is_read_only() {
            names.push("READ_ONLY");
        }
        if self.contains(Self::DURABLE) {
            names.push("DURABLE");
        }
        if self.is_flush() {
            names.push("FLUSH");
        }
        if names.is_empty() {
            names.push("NONE");
        }
        write!(f, "OperationOptions({})", names.join(" | "))
    }
}

/// Transaction lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionState {
    /// Not yet started
    Created,
    /// `on_before_started` callbacks are running
    BeforeStarted,
    /// `run` is executing
    Running,
    /// `validate` is executing (read-write only)
    Validating,
    /// Commit callbacks and page persistence
    Committing,
    /// Changes are visible
    Committed,
    /// Changes were discarded
    RolledBack,
}

impl TransactionState {
    /// Check if the transaction has finished either way
    pub fn is_completed(self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::RolledBack)
    }
}

/// A unit of work executed inside one transaction.
///
/// Errors from `on_before_started`, `run` or `validate` roll the
/// transaction back and are returned to the caller.
pub trait RawOperation {
    /// Option flags
    fn options(&self) -> OperationOptions {
        OperationOptions::NONE
    }

    /// Estimated cost, in pages touched
    fn size(&self) -> usize {
        1
    }

    /// Lock predicates checked against active batch locks.
    ///
    /// `None` conflicts with every batch lock.
    fn batch_lock_predicates(&self) -> Option<Vec<String>> {
        None
    }

    /// Called once the transaction is open, before `run`
    fn on_before_started(&mut self, _transaction: &mut dyn RawTransaction) -> Result<()> {
        Ok(())
    }

    /// Operation body
    fn run(&mut self, transaction: &mut dyn RawTransaction) -> Result<()>;

    /// Last chance to reject a read-write transaction
    fn validate(&mut self, _transaction: &mut dyn RawTransaction) -> Result<()> {
        Ok(())
    }

    /// Called before changes are committed
    fn on_before_committed(&mut self) {}

    /// Called after changes are committed
    fn on_committed(&mut self) {}

    /// Called before changes are rolled back
    fn on_before_rolled_back(&mut self) {}

    /// Called after changes are rolled back
    fn on_rolled_back(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags() {
        let options = OperationOptions::READ_ONLY | OperationOptions::FLUSH;
        assert!(options.is_read_only());
        assert!(options.is_flush());
        assert!(options.is_durable());
        assert!(!options.contains(OperationOptions::DURABLE));
        assert!(OperationOptions::NONE.contains(OperationOptions::NONE));
        assert_eq!(options.bits(), 5);
    }

    #[test]
    fn test_debug_lists_flags() {
        assert_eq!(
            format!("{:?}", OperationOptions::DURABLE | OperationOptions::READ_ONLY),
            "OperationOptions(READ_ONLY | DURABLE)"
        );
        assert_eq!(format!("{:?}", OperationOptions::default()), "OperationOptions(NONE)");
    }

    #[test]
    fn test_completed_states() {
        assert!(TransactionState::Committed.is_completed());
        assert!(TransactionState::RolledBack.is_completed());
        assert!(!TransactionState::Validating.is_completed());
    }
}
