//! File-backed send log.
//!
//! The whole collection lives in one JSON array that is rewritten on every
//! append (temp file + rename). Appends from this process are serialized by an
//! async mutex; several processes sharing one file are not coordinated and can
//! lose each other's writes.


use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use relay_core::{
    config::{Config, MessageMode},
    error::RelayError,
};
use serde_json::Value;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::entry::{LogEntry, LogQuery, LogRecord, LogType, SentMessageView};
use crate::identity::{entry_id, IdentityInput};
use crate::sanitize::{sanitize_request, sanitize_response};

/// Deduplicated, size-bounded send log.
#[derive(Clone)]
pub struct LogStore {
    path: PathBuf,
    max_logs: usize,
    dedup: bool,
    mode: MessageMode,
    tz: Tz,
    write_lock: Arc<Mutex<()>>,
}

impl LogStore {
    pub fn new(path: impl Into<PathBuf>, max_logs: usize, dedup: bool, mode: MessageMode, tz: Tz) -> Self {
        Self {
            path: path.into(),
            max_logs: max_logs.max(1),
            dedup,
            mode,
            tz,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn from_config(config: &Config) -> Result<Self, RelayError> {
        let store = Self::new(
            config.sendlog_path(),
            config.sendlog.max_logs,
            config.sendlog.dedup,
            config.sendlog.message_mode,
            config.timezone()?,
        );
        info!(
            "Send log at {} (max {}, mode {})",
            store.path.display(),
            store.max_logs,
            store.mode.as_str()
        );
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn timezone(&self) -> Tz {
        self.tz
    }

    pub fn message_mode(&self) -> MessageMode {
        self.mode
    }

    pub fn max_logs(&self) -> usize {
        self.max_logs
    }

    /// Sanitize a record and assign its identity, without persisting it.
    pub fn build_entry(&self, record: LogRecord, now: DateTime<Utc>) -> LogEntry {
        let timestamp = now.with_timezone(&self.tz).fixed_offset();
        let date = record.date.unwrap_or_else(|| timestamp.date_naive());
        let (request, message) = sanitize_request(&record.request, self.mode);
        let response = sanitize_response(record.response.as_ref());

        let id = entry_id(&IdentityInput {
            kind: record.kind,
            date,
            to: request.to.as_deref(),
            tag: request.source.as_deref().or(request.endpoint.as_deref()),
            message: &message,
            error: record.error.as_deref(),
            message_id: response.message_id.as_deref(),
        });

        LogEntry {
            id,
            timestamp,
            kind: record.kind,
            date,
            request,
            response,
            error: record.error,
            backfill_id: None,
        }
    }

    /// Append one entry. Never fails the caller: I/O problems are logged and
    /// yield `None`. A duplicate (same id, dedup on) returns the stored entry.
    pub async fn append(&self, record: LogRecord) -> Option<LogEntry> {
        self.append_at(record, Utc::now()).await
    }

    pub async fn append_at(&self, record: LogRecord, now: DateTime<Utc>) -> Option<LogEntry> {
        let entry = self.build_entry(record, now);
        let result = self
            .update(|entries| {
                if self.dedup {
                    if let Some(existing) = entries.iter().find(|e| e.id == entry.id) {
                        debug!("send log: duplicate {} ({}) skipped", entry.id, entry.kind.as_str());
                        return existing.clone();
                    }
                }
                entries.push(entry.clone());
                entry
            })
            .await;

        match result {
            Ok(entry) => Some(entry),
            Err(e) => {
                error!("send log append failed: {e}");
                None
            }
        }
    }

    /// Load, modify and persist the collection under the write lock.
    ///
    /// The collection is truncated to the newest `max_logs` entries before it
    /// is written back.
    pub(crate) async fn update<R>(
        &self,
        f: impl FnOnce(&mut Vec<LogEntry>) -> R,
    ) -> Result<R, RelayError> {
        let _guard = self.write_lock.lock().await;
        let mut entries = self.load().await?;
        let out = f(&mut entries);
        if entries.len() > self.max_logs {
            let excess = entries.len() - self.max_logs;
            entries.drain(..excess);
        }
        self.persist(&entries).await?;
        Ok(out)
    }

    /// Entries matching `query`, most recent first.
    pub async fn query(&self, query: &LogQuery) -> Vec<LogEntry> {
        let entries = match self.load().await {
            Ok(entries) => entries,
            Err(e) => {
                error!("send log read failed: {e}");
                return Vec::new();
            }
        };

        let matching = entries.into_iter().rev().filter(|e| {
            query.kind.map_or(true, |kind| e.kind == kind)
                && query
                    .date
                    .map_or(true, |date| e.timestamp.with_timezone(&self.tz).date_naive() == date)
        });

        match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }

    /// Successful sends as display views, most recent first.
    pub async fn sent_messages(&self, limit: Option<usize>) -> Vec<SentMessageView> {
        let query = LogQuery {
            kind: Some(LogType::ReminderSuccess),
            date: None,
            limit,
        };
        self.query(&query)
            .await
            .iter()
            .map(|e| SentMessageView::from_entry(e, &self.tz))
            .collect()
    }

    /// Every stored entry, oldest first.
    pub async fn entries(&self) -> Vec<LogEntry> {
        self.load().await.unwrap_or_else(|e| {
            error!("send log read failed: {e}");
            Vec::new()
        })
    }

    pub async fn len(&self) -> usize {
        self.entries().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Delete the backing file. `false` when there was nothing to delete.
    pub async fn clear(&self) -> bool {
        let _guard = self.write_lock.lock().await;
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => {
                info!("send log cleared ({})", self.path.display());
                true
            }
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                error!("send log clear failed: {e}");
                false
            }
        }
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "send_logs.json".into());
        name.push(suffix);
        self.path.with_file_name(name)
    }

    /// Read the collection. A missing file is empty; an unparseable one is
    /// copied aside to `*.corrupt` and treated as empty.
    async fn load(&self) -> Result<Vec<LogEntry>, RelayError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(RelayError::Store(format!(
                    "failed to read {}: {e}",
                    self.path.display()
                )))
            }
        };
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }

        let items = match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Array(items)) => items,
            Ok(_) => {
                self.quarantine("top-level value is not an array").await;
                return Ok(Vec::new());
            }
            Err(e) => {
                self.quarantine(&e.to_string()).await;
                return Ok(Vec::new());
            }
        };

        let total = items.len();
        let entries: Vec<LogEntry> = items
            .into_iter()
            .filter_map(|item| serde_json::from_value(item).ok())
            .collect();
        if entries.len() < total {
            warn!(
                "send log: skipped {} malformed entries in {}",
                total - entries.len(),
                self.path.display()
            );
        }
        Ok(entries)
    }

    async fn quarantine(&self, reason: &str) {
        let backup = self.sibling(".corrupt");
        warn!(
            "send log {} is corrupt ({reason}); treating as empty, backup at {}",
            self.path.display(),
            backup.display()
        );
        if let Err(e) = tokio::fs::copy(&self.path, &backup).await {
            error!("send log backup failed: {e}");
        }
    }

    async fn persist(&self, entries: &[LogEntry]) -> Result<(), RelayError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RelayError::Store(format!("failed to create log dir: {e}")))?;
        }

        let body = serde_json::to_vec_pretty(entries)?;
        let tmp = self.sibling(".tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| RelayError::Store(format!("failed to write {}: {e}", tmp.display())))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| RelayError::Store(format!("failed to replace {}: {e}", self.path.display())))?;
        Ok(())
    }
}
