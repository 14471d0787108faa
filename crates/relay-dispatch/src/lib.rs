//! # relay-dispatch
//!
//! Everything that sends: bulk campaigns, single API sends, and the daily
//! task reminder run. Each attempt is recorded in the send log.

pub mod bulk;
pub mod reminder;
pub mod single;

pub use bulk::{BulkDispatcher, BulkRequest, BulkSendResult, RecipientError, NOT_ON_WHATSAPP};
pub use reminder::{
    format_task_reminder, task_source_from_config, ApiTaskSource, ReminderRunner, RunResult,
    SqlTaskSource, TaskError,
};
pub use single::{DirectSender, SendOutcome};
