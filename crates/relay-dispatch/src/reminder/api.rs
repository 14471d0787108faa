//! Task source backed by a remote HTTP API.

use async_trait::async_trait;
use chrono::NaiveDate;
use relay_core::{error::RelayError, message::DueTask, traits::TaskSource};
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// The API answers either with a bare array or with `{"tasks": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum DueTasksResponse {
    List(Vec<DueTask>),
    Wrapped { tasks: Vec<DueTask> },
}

/// `GET {base_url}/tasks/due?date=YYYY-MM-DD`, bearer-authenticated.
///
/// The remote side owns "already reminded" bookkeeping, so `mark_sent` is a no-op.
pub struct ApiTaskSource {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiTaskSource {
    pub fn new(base_url: &str, token: &str) -> Result<Self, RelayError> {
        if base_url.trim().is_empty() {
            return Err(RelayError::Config("reminders.api_url is required".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RelayError::Config(format!("failed to build tasks http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            token: Some(token.to_string()).filter(|t| !t.is_empty()),
        })
    }
}

#[async_trait]
impl TaskSource for ApiTaskSource {
    fn name(&self) -> &str {
        "api"
    }

    async fn due_tasks(
        &self,
        date: NaiveDate,
        _only_unmarked: bool,
    ) -> Result<Vec<DueTask>, RelayError> {
        let day = date.format("%Y-%m-%d").to_string();
        let mut req = self
            .http
            .get(format!("{}/tasks/due", self.base_url))
            .query(&[("date", day.as_str())]);
        if let Some(ref token) = self.token {
            req = req.bearer_auth(token);
        }

        let resp = req
            .send()
            .await
            .map_err(|e| RelayError::Source(format!("tasks api request failed: {e}")))?;
        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(RelayError::Source(format!("tasks api returned {status}: {body}")));
        }

        let parsed: DueTasksResponse = resp
            .json()
            .await
            .map_err(|e| RelayError::Source(format!("tasks api returned invalid json: {e}")))?;
        let tasks = match parsed {
            DueTasksResponse::List(tasks) | DueTasksResponse::Wrapped { tasks } => tasks,
        };

        let due: Vec<DueTask> = tasks
            .into_iter()
            .filter(|t| !t.assignee_phone.trim().is_empty())
            .collect();
        debug!("tasks api: {} tasks due on {day}", due.len());
        Ok(due)
    }
}
