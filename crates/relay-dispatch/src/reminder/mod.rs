//! Daily task reminders: data sources, formatting and the run itself.

mod api;
mod format;
mod runner;
mod sql;

pub use api::ApiTaskSource;
pub use format::format_task_reminder;
pub use runner::{ReminderRunner, RunResult, TaskError};
pub use sql::SqlTaskSource;

use relay_core::{
    config::{ReminderSourceKind, RemindersConfig},
    error::RelayError,
    traits::TaskSource,
};
use std::sync::Arc;

/// Build the configured task source.
pub async fn task_source_from_config(
    config: &RemindersConfig,
) -> Result<Arc<dyn TaskSource>, RelayError> {
    match config.source {
        ReminderSourceKind::Database => {
            if config.database_url.trim().is_empty() {
                return Err(RelayError::Config(
                    "reminders.database_url is required for the database source".into(),
                ));
            }
            Ok(Arc::new(SqlTaskSource::connect(&config.database_url).await?))
        }
        ReminderSourceKind::Api => Ok(Arc::new(ApiTaskSource::new(
            &config.api_url,
            &config.api_token,
        )?)),
    }
}
