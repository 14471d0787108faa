//! CLI client for a running relay.
//!
//! Status, backfill and manual reminder runs need the live WhatsApp session
//! and the process that owns the send log, so the CLI asks the server.

use anyhow::{bail, Context};
use chrono::NaiveDate;
use relay_core::config::ApiConfig;
use serde_json::Value;
use std::time::Duration;

pub struct RemoteRelay {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl RemoteRelay {
    pub fn from_config(config: &ApiConfig) -> anyhow::Result<Self> {
        let host = match config.host.as_str() {
            "0.0.0.0" | "" => "127.0.0.1",
            "::" => "::1",
            h => h,
        };
        let host = if host.contains(':') {
            format!("[{host}]")
        } else {
            host.to_string()
        };
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(600))
            .build()?;
        Ok(Self {
            http,
            base_url: format!("http://{host}:{}", config.port),
            token: Some(config.api_key.clone()).filter(|k| !k.is_empty()),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn call(&self, req: reqwest::RequestBuilder) -> anyhow::Result<Value> {
        let req = match self.token {
            Some(ref token) => req.bearer_auth(token),
            None => req,
        };
        let resp = req
            .send()
            .await
            .with_context(|| format!("relay not reachable at {}", self.base_url))?;
        let status = resp.status();
        let body: Value = resp.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            bail!("relay returned {status}: {body}");
        }
        Ok(body)
    }

    /// `GET /api/status`
    pub async fn status(&self) -> anyhow::Result<Value> {
        self.call(self.http.get(format!("{}/api/status", self.base_url)))
            .await
    }

    /// `POST /api/logs/backfill` with optional overrides.
    pub async fn backfill(
        &self,
        since_days: Option<i64>,
        limit_per_chat: Option<usize>,
        max_chats: Option<usize>,
    ) -> anyhow::Result<Value> {
        let mut query: Vec<(&str, String)> = Vec::new();
        if let Some(v) = since_days {
            query.push(("sinceDays", v.to_string()));
        }
        if let Some(v) = limit_per_chat {
            query.push(("limitPerChat", v.to_string()));
        }
        if let Some(v) = max_chats {
            query.push(("maxChats", v.to_string()));
        }
        self.call(
            self.http
                .post(format!("{}/api/logs/backfill", self.base_url))
                .query(&query),
        )
        .await
    }

    /// `POST /api/reminders/run`, today in the relay timezone unless `date` is given.
    pub async fn run_reminders(&self, date: Option<NaiveDate>) -> anyhow::Result<Value> {
        let mut req = self
            .http
            .post(format!("{}/api/reminders/run", self.base_url));
        if let Some(d) = date {
            req = req.query(&[("date", d.format("%Y-%m-%d").to_string())]);
        }
        self.call(req).await
    }
}
