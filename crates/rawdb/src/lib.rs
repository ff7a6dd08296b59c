//! Raw transactional page database for tessera
//!
//! This crate defines the operation contract and ships a reference engine:
//! - RawOperation: unit of work driven through one transaction
//! - RawBatchOperation: long-running work split into cooperative steps
//! - RawTransaction: page-addressed access to bound data files
//! - ReadRegion/WriteRegion: typed little-endian views into a page
//! - RawDatabase: page cache, batch scheduler and checkpointing
//! - PageStore: persistence backends (memory, directory of files)
//!
//! # Lock predicates
//!
//! Two predicates conflict when one is a prefix of the other. An active
//! batch's `Shared` locks block conflicting read-write transactions only;
//! `Exclusive` locks block every conflicting transaction.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod checkpoint;
pub mod config;
pub mod context;
pub mod database;
pub mod error;
mod lock;
pub mod operation;
pub mod page;
pub mod region;
pub mod store;
pub mod transaction;

pub use batch::{predicates_conflict, BatchLock, LockType, RawBatchControl, RawBatchOperation};
pub use checkpoint::Checkpoint;
pub use config::RawDatabaseConfig;
pub use context::{ManualTimeService, OperationContext, SystemTimeService, TimeService};
pub use database::RawDatabase;
pub use error::{RawDatabaseError, Result};
pub use operation::{OperationOptions, RawOperation, TransactionState};
pub use page::RawPageData;
pub use region::{ReadRegion, WriteRegion};
pub use store::{FilePageStore, MemoryPageStore, PageStore, StoredFile};
pub use transaction::RawTransaction;
