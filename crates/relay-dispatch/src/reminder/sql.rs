//! Direct-query task source over the project database (SQLite via sqlx).
//!
//! Expected tables: `tasks` (with a nullable `reminder_sent_on` date),
//! `users`, `lists` and `projects`.

use async_trait::async_trait;
use chrono::NaiveDate;
use relay_core::{error::RelayError, message::DueTask, traits::TaskSource};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::{debug, info};

const DUE_TASKS_SQL: &str = "\
    SELECT t.id, t.description, t.status, t.percentage, t.type, \
           t.start_date, t.end_date, l.title, p.title, u.name, u.phone \
    FROM tasks t \
    JOIN users u ON u.id = t.assigned_to \
    LEFT JOIN lists l ON l.id = t.list_id \
    LEFT JOIN projects p ON p.id = l.project_id \
    WHERE date(t.start_date) <= date(?) \
      AND date(t.end_date) >= date(?) \
      AND u.phone IS NOT NULL AND trim(u.phone) <> '' \
      AND (? = 0 OR t.reminder_sent_on IS NULL OR t.reminder_sent_on <> ?) \
    ORDER BY t.id";

type TaskRow = (
    i64,
    Option<String>,
    Option<String>,
    Option<f64>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    String,
);

fn into_task(row: TaskRow) -> DueTask {
    let (id, description, status, percentage, task_type, start_date, end_date, list, project, name, phone) =
        row;
    DueTask {
        id,
        description,
        status,
        percentage,
        task_type,
        start_date,
        end_date,
        list_title: list,
        project_title: project,
        assignee_name: name,
        assignee_phone: phone,
    }
}

pub struct SqlTaskSource {
    pool: SqlitePool,
}

impl SqlTaskSource {
    /// Connect to an existing database. The file is never created.
    pub async fn connect(url: &str) -> Result<Self, RelayError> {
        let opts = SqliteConnectOptions::from_str(url)
            .map_err(|e| RelayError::Config(format!("invalid reminders.database_url: {e}")))?
            .create_if_missing(false);

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(opts)
            .await
            .map_err(|e| RelayError::Source(format!("failed to connect to task database: {e}")))?;

        info!("Task database connected");
        Ok(Self::from_pool(pool))
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TaskSource for SqlTaskSource {
    fn name(&self) -> &str {
        "database"
    }

    async fn due_tasks(
        &self,
        date: NaiveDate,
        only_unmarked: bool,
    ) -> Result<Vec<DueTask>, RelayError> {
        let day = date.format("%Y-%m-%d").to_string();
        let rows: Vec<TaskRow> = sqlx::query_as(DUE_TASKS_SQL)
            .bind(&day)
            .bind(&day)
            .bind(only_unmarked)
            .bind(&day)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| RelayError::Source(format!("due task query failed: {e}")))?;

        debug!("task database: {} tasks due on {day}", rows.len());
        Ok(rows.into_iter().map(into_task).collect())
    }

    async fn mark_sent(&self, task_id: i64, date: NaiveDate) -> Result<(), RelayError> {
        sqlx::query("UPDATE tasks SET reminder_sent_on = ? WHERE id = ?")
            .bind(date.format("%Y-%m-%d").to_string())
            .bind(task_id)
            .execute(&self.pool)
            .await
            .map_err(|e| RelayError::Source(format!("failed to mark task {task_id}: {e}")))?;
        Ok(())
    }
}
