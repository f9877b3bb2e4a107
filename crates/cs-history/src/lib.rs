//! Snapshot history for ContentServer.
//!
//! Every successfully loaded snapshot is appended to a store under a
//! timestamped key, and mirrored to a mutable *current* entry. On startup, or
//! after a failed update, the current entry is replayed to republish a
//! consistent state without contacting upstream.
//!
//! # Storage Backends
//!
//! All backends implement the [`Storage`] trait:
//!
//! - [`FsStorage`] -- one file per key inside a directory
//! - [`InMemoryStorage`] -- `BTreeMap`-based store for tests and embedding
//!
//! # Key Layout
//!
//! - `<prefix>-<timestamp>.json` for each historical snapshot
//! - `<prefix>-current.json` for the latest one
//!
//! Timestamps are fixed-width RFC 3339 with nanoseconds in UTC, so keys sort
//! chronologically.

pub mod error;
pub mod fs;
pub mod history;
pub mod memory;
pub mod traits;

pub use error::{HistoryError, HistoryResult, StorageError, StorageResult};
pub use fs::FsStorage;
pub use history::{History, HistoryConfig};
pub use memory::InMemoryStorage;
pub use traits::Storage;
