//! Relay assembly and lifecycle.

use crate::api::{self, ApiState};
use crate::scheduler;
use chrono::NaiveTime;
use chrono_tz::Tz;
use relay_channels::{ConnectionManager, TemplateClient, WhatsAppBridge};
use relay_core::{
    config::Config,
    phone::PhoneNormalizer,
    traits::{MarkerMatcher, TemplateRenderer, WhatsAppClient},
};
use relay_dispatch::{task_source_from_config, BulkDispatcher, DirectSender, ReminderRunner};
use relay_sendlog::{BackfillOptions, LogStore};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::info;

/// Fully wired relay: API state plus the reminder schedule.
pub struct Relay {
    config: Config,
    state: ApiState,
    tz: Tz,
    send_at: Option<NaiveTime>,
}

impl Relay {
    /// Wire every component from a validated config.
    pub async fn build(config: Config) -> anyhow::Result<Self> {
        let tz = config.timezone()?;
        let connection = Arc::new(ConnectionManager::new());
        let client: Arc<dyn WhatsAppClient> =
            Arc::new(WhatsAppBridge::new(&config.whatsapp, connection.clone())?);

        let store = LogStore::from_config(&config)?;
        info!(
            "send log: {} (max {}, message mode {})",
            store.path().display(),
            store.max_logs(),
            store.message_mode().as_str()
        );

        let normalizer = PhoneNormalizer::from_config(&config.whatsapp);
        let bulk = Arc::new(BulkDispatcher::new(
            client.clone(),
            store.clone(),
            normalizer.clone(),
            Duration::from_millis(config.bulk.inter_send_delay_ms),
        ));
        let sender = DirectSender::new(client.clone(), store.clone(), normalizer.clone());

        let renderer: Option<Arc<dyn TemplateRenderer>> = TemplateClient::from_config(&config.templates)?
            .map(|c| Arc::new(c) as Arc<dyn TemplateRenderer>);

        let (runner, send_at) = if config.reminders.enabled {
            let source = task_source_from_config(&config.reminders).await?;
            info!("reminders: enabled, source {}", source.name());
            let runner = ReminderRunner::new(
                client.clone(),
                source,
                store.clone(),
                normalizer,
                config.reminders.only_send_unmarked,
                Duration::from_millis(config.reminders.inter_send_delay_ms),
            );
            (Some(Arc::new(runner)), Some(config.send_at()?))
        } else {
            (None, None)
        };

        let state = ApiState {
            api_key: api::api_key(&config.api),
            uptime: Instant::now(),
            connection,
            client,
            store,
            bulk,
            sender,
            renderer,
            runner,
            matcher: Arc::new(MarkerMatcher::default()),
            backfill: BackfillOptions::from(&config.backfill),
        };

        Ok(Self {
            config,
            state,
            tz,
            send_at,
        })
    }

    /// Serve the API and the reminder schedule until Ctrl-C.
    pub async fn run(self) -> anyhow::Result<()> {
        info!(
            "{} running | api: {}:{} | auth: {} | reminders: {} | templates: {}",
            self.config.relay.name,
            self.config.api.host,
            self.config.api.port,
            if self.state.api_key.is_some() {
                "enforced"
            } else {
                "disabled"
            },
            match self.send_at {
                Some(t) => t.format("%H:%M").to_string(),
                None => "off".to_string(),
            },
            if self.state.renderer.is_some() {
                "on"
            } else {
                "off"
            },
        );

        let api_cfg = self.config.api.clone();
        let api_state = self.state.clone();
        let api_handle = tokio::spawn(async move {
            api::serve(api_cfg, api_state).await;
        });

        let sched_handle = match (self.state.runner.clone(), self.send_at) {
            (Some(runner), Some(send_at)) => {
                let tz = self.tz;
                let poll_secs = self.config.reminders.poll_interval_secs;
                Some(tokio::spawn(async move {
                    scheduler::reminder_loop(runner, tz, send_at, poll_secs).await;
                }))
            }
            _ => None,
        };

        tokio::signal::ctrl_c().await?;
        info!("Received shutdown signal");
        shutdown(&api_handle, &sched_handle);
        Ok(())
    }
}

/// Abort background tasks. Log writes complete under the store lock or not at all.
fn shutdown(api: &JoinHandle<()>, scheduler: &Option<JoinHandle<()>>) {
    api.abort();
    if let Some(h) = scheduler {
        h.abort();
    }
    info!("Shutdown complete");
}
