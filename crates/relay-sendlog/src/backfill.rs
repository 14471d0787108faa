//! Backfill: rebuild missing reminder entries from WhatsApp history.
//!
//! Reminders can reach WhatsApp without a matching log entry (log file lost,
//! cleared, or written by another process). The reconciler scans the client's
//! own sent messages, recognizes reminders with a [`ReminderMatcher`], and
//! inserts the ones the log does not already know about.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use relay_core::{
    config::BackfillConfig,
    error::RelayError,
    message::{ChatSummary, HistoricalMessage},
    phone::phone_from_jid,
    traits::{ReminderMatcher, WhatsAppClient},
};
use serde::Serialize;
use serde_json::json;
use std::collections::HashSet;
use tracing::{info, warn};

use crate::entry::{LogEntry, LogRecord, LogType};
use crate::identity::backfill_id;
use crate::store::LogStore;

/// Scan limits for one reconciliation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackfillOptions {
    pub since_days: i64,
    pub limit_per_chat: usize,
    pub max_chats: usize,
}

impl Default for BackfillOptions {
    fn default() -> Self {
        Self::from(&BackfillConfig::default())
    }
}

impl From<&BackfillConfig> for BackfillOptions {
    fn from(config: &BackfillConfig) -> Self {
        Self {
            since_days: config.since_days,
            limit_per_chat: config.limit_per_chat,
            max_chats: config.max_chats,
        }
    }
}

/// Outcome of one reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BackfillReport {
    pub scanned_chats: usize,
    pub scanned_messages: usize,
    pub matched_reminders: usize,
    pub inserted: usize,
    pub total_logs_after: usize,
}

/// One-to-one chats only.
fn is_direct_chat(chat: &ChatSummary) -> bool {
    !chat.is_group && !chat.id.ends_with("@g.us") && !chat.id.starts_with("status@")
}

fn is_delivered_outgoing(msg: &HistoricalMessage, cutoff: i64) -> bool {
    msg.from_me && !msg.is_revoked() && !msg.is_status && msg.ack >= 1 && msg.timestamp >= cutoff
}

pub async fn reconcile(
    store: &LogStore,
    client: &dyn WhatsAppClient,
    matcher: &dyn ReminderMatcher,
    opts: BackfillOptions,
) -> Result<BackfillReport, RelayError> {
    reconcile_at(store, client, matcher, opts, Utc::now()).await
}

/// Reconcile against a fixed "now". Chat listing failures abort; per-chat
/// history failures are logged and skipped.
pub async fn reconcile_at(
    store: &LogStore,
    client: &dyn WhatsAppClient,
    matcher: &dyn ReminderMatcher,
    opts: BackfillOptions,
    now: DateTime<Utc>,
) -> Result<BackfillReport, RelayError> {
    let mut report = BackfillReport::default();
    let cutoff = (now - Duration::days(opts.since_days.max(0))).timestamp();

    let chats = client.get_chats().await?;
    let mut candidates = Vec::new();

    for chat in chats.iter().filter(|c| is_direct_chat(c)).take(opts.max_chats) {
        report.scanned_chats += 1;

        let messages = match client.fetch_messages(&chat.id, opts.limit_per_chat).await {
            Ok(messages) => messages,
            Err(e) => {
                warn!("backfill: skipping chat {}: {e}", chat.id);
                continue;
            }
        };
        report.scanned_messages += messages.len();

        let phone = phone_from_jid(&chat.id);
        for msg in messages {
            if !is_delivered_outgoing(&msg, cutoff) || !matcher.looks_like_reminder(&msg.body) {
                continue;
            }
            let Some(sent_at) = DateTime::from_timestamp(msg.timestamp, 0) else {
                continue;
            };
            report.matched_reminders += 1;
            candidates.push(backfill_entry(store, &chat.id, &phone, msg, sent_at));
        }
    }

    let max_logs = store.max_logs();
    let (inserted, total_after) = store
        .update(|entries| {
            let mut known: HashSet<String> = entries
                .iter()
                .flat_map(|e| std::iter::once(e.id.clone()).chain(e.backfill_id.clone()))
                .collect();

            let mut inserted = 0;
            for entry in candidates {
                let bid = entry.backfill_id.clone().unwrap_or_default();
                if known.contains(&entry.id) || known.contains(&bid) {
                    continue;
                }
                known.insert(entry.id.clone());
                known.insert(bid);
                entries.push(entry);
                inserted += 1;
            }

            if inserted > 0 {
                entries.sort_by_key(|e| e.timestamp);
            }
            (inserted, entries.len().min(max_logs))
        })
        .await?;

    report.inserted = inserted;
    report.total_logs_after = total_after;
    info!(
        "backfill: {} chats, {} messages, {} reminders, {} inserted",
        report.scanned_chats, report.scanned_messages, report.matched_reminders, report.inserted
    );
    Ok(report)
}

fn backfill_entry(
    store: &LogStore,
    chat_id: &str,
    phone: &str,
    msg: HistoricalMessage,
    sent_at: DateTime<Utc>,
) -> LogEntry {
    let iso = sent_at.to_rfc3339_opts(SecondsFormat::Millis, true);
    let bid = backfill_id(phone, &iso, &msg.body);
    let message_id = msg.id.filter(|id| !id.trim().is_empty());

    let mut response = json!({"success": true, "jid": chat_id});
    if let Some(ref id) = message_id {
        response["messageId"] = json!(id);
    }

    let record = LogRecord::new(LogType::ReminderSuccess)
        .field("to", phone)
        .field("message", msg.body)
        .field("source", "backfill")
        .with_response(response);

    let mut entry = store.build_entry(record, sent_at);
    if message_id.is_none() {
        entry.id = bid.clone();
    }
    entry.backfill_id = Some(bid);
    entry
}
