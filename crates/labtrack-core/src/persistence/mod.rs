//! Persistence layer for labtrack records
//!
//! Provides the canonical record store, held in memory and optionally
//! mirrored to a single JSON document on disk.

mod snapshot;
mod store;

pub use snapshot::{Backend, Snapshot};
pub use store::{Record, RecordStore};
