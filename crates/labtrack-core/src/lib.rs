//! Labtrack Core - shared record model for the lab work tracker
//!
//! This crate provides the pieces shared by the record store service and the
//! client sync layer:
//!
//! - **Kind**: the four collections (tasks, metal tests, work closures,
//!   document tracking) and their per-collection configuration
//! - **Record**: typed records with their create drafts and partial updates
//! - **Status**: the overdue rule, effective status, document transitions
//! - **Calendar**: the calendar projection rebuilt from three collections
//! - **Stats**: per-user task statistics and task filters
//! - **Persistence**: the canonical record store, in memory or JSON-file-backed
//! - **Config**: service and client configuration
//!
//! # Data flow
//!
//! ```text
//! client write → status derived → service create/update → store commit
//!                                                        ↓
//! client cache ← poll/list ←───────────────────────── canonical records
//!      ↓
//! calendar projection (full rebuild)
//! ```

pub mod calendar;
pub mod config;
pub mod error;
pub mod kind;
pub mod persistence;
pub mod record;
pub mod stats;
pub mod status;
pub mod timestamp;

pub use calendar::{CalendarEvent, CalendarProjection, EventType, StatusCounts};
pub use config::{ConfigError, ServerConfig, StorageConfig, SyncConfig};
pub use error::{ErrorCategory, PersistenceError, Result, StoreError};
pub use kind::{KindSpec, RecordKind, StatusRule};
pub use persistence::{Backend, Record, RecordStore, Snapshot};
pub use record::{
    DocumentTracking, DocumentTrackingUpdate, MetalTracking, MetalTrackingUpdate,
    NewDocumentTracking, NewMetalTracking, NewTask, NewWorkClosure, Priority, Task, TaskUpdate,
    TestType, TrackedRecord, WorkClosure, WorkClosureUpdate,
};
pub use stats::{TaskFilter, UserStats};
pub use status::{derive_status, effective_status, DocumentStatus, Status};
