//! # Tessera
//!
//! Object-graph serialization and raw transactional page storage.
//!
//! Tessera bundles two layers that share one type registry:
//!
//! - **serialization**: identity-preserving, versioned binary encoding of
//!   object graphs with skippable bodies and regions
//! - **rawdb**: page-level transactions over data files, with long-running
//!   batch operations that share time with ordinary transactions under
//!   prefix-matched lock predicates
//!
//! ## Quick Start
//!
//! ```ignore
//! use tessera::prelude::*;
//!
//! // Open a database
//! let db = Tessera::open("./pages")?;
//!
//! // Register a serializer
//! db.registry().register(POINT_ID, TypeKey::of::<Point>(), Arc::new(PointSerializer))?;
//!
//! // Encode an object graph
//! let mut session = db.serialization_with_header(0x1717, 2);
//! session.write_object(Some(&point))?;
//! let bytes = session.finish()?;
//!
//! // Run an operation
//! db.transaction(&mut StorePoint::new(bytes))?;
//! db.flush()?;
//! ```
//!
//! ## Crates
//!
//! The layers are re-exported as [`serialization`] and [`rawdb`] for
//! access beyond the prelude.

#![warn(missing_docs)]
#![warn(clippy::all)]

mod database;
pub mod error;
pub mod prelude;

pub use database::{Tessera, TesseraBuilder};
pub use error::{Error, Result};

/// Object serialization protocol
pub use tessera_serialization as serialization;

/// Raw transactional page database
pub use tessera_rawdb as rawdb;
