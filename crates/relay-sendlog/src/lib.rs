//! # relay-sendlog
//!
//! Append-only audit log of every send attempt, persisted as one JSON document.
//!
//! - `entry`: log record types and the read-side views
//! - `identity`: stable entry ids (dedup identity)
//! - `sanitize`: bounding and allow-listing of request/response fields
//! - `store`: the file-backed log (append, query, clear)
//! - `backfill`: reconstructing missing reminder entries from WhatsApp history

pub mod backfill;
pub mod entry;
pub mod identity;
pub mod sanitize;
pub mod store;

pub use backfill::{reconcile, BackfillOptions, BackfillReport};
pub use entry::{LogEntry, LogQuery, LogRecord, LogRequest, LogResponse, LogType, SentMessageView};
pub use store::LogStore;
