//! rcsel Common Library
//!
//! Data model and database side of the rcsel suite: loading the stored
//! values of a REDCap record, and confirming audit-log entries after the
//! browser side has written through the UI. Nothing here writes to REDCap.

pub mod audit;
pub mod db;
pub mod error;
pub mod mysql;
pub mod record;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use audit::{LogMatch, LogVerifier, DEFAULT_SCAN_LIMIT};
pub use db::SqliteStore;
pub use error::{Error, Result};
pub use store::{connect, connect_or_unavailable, RedcapStore, UnavailableStore};
pub use types::*;

/// rcsel version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
