//! Labtrack Client - data-sync layer for the record store service
//!
//! - [`SyncStore`]: cached collections, subscriptions, shared polling,
//!   calendar projection, status derivation before writes
//! - [`RecordApi`]: the transport seam, implemented by [`HttpApi`] (reqwest)
//!   and [`LocalApi`] (an in-process store)
//! - [`SessionStore`]: the persisted signed-in user and user directory
//!
//! ```no_run
//! use labtrack_client::SyncStore;
//! use labtrack_core::SyncConfig;
//!
//! # async fn run() -> Result<(), labtrack_client::SyncError> {
//! let store = SyncStore::connect(SyncConfig::default())?;
//! let _subscription = store
//!     .subscribe_to_tasks(|tasks| println!("{} tasks", tasks.len()))
//!     .await;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod error;
pub mod http;
pub mod session;
pub mod store;

pub use api::{LocalApi, RecordApi};
pub use error::SyncError;
pub use http::HttpApi;
pub use session::{
    default_users, CredentialCheck, DirectoryCheck, SessionState, SessionStore, User,
    CURRENT_SESSION_VERSION,
};
pub use store::{Subscription, SyncStore};
