mod api;
mod relay;
mod remote;
mod scheduler;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use relay_core::config::{self, Config};
use remote::RemoteRelay;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(
    name = "wa-relay",
    version,
    about = "WhatsApp messaging relay: bulk sends, daily task reminders, send log"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to config file.
    #[arg(short, long, default_value = "config.toml")]
    config: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the relay (API server and reminder schedule).
    Start,
    /// Show the WhatsApp connection status of a running relay.
    Status,
    /// Rebuild missing reminder log entries from WhatsApp history.
    Backfill {
        /// How far back to scan.
        #[arg(long)]
        since_days: Option<i64>,
        /// Most recent messages read per chat.
        #[arg(long)]
        limit_per_chat: Option<usize>,
        /// Chats scanned at most.
        #[arg(long)]
        max_chats: Option<usize>,
    },
    /// Run the task reminders now.
    Remind {
        /// Day to run for (YYYY-MM-DD). Defaults to today in the relay timezone.
        #[arg(long)]
        date: Option<NaiveDate>,
    },
}

/// Stdout plus a daily rolling file under `<data_dir>/logs`.
///
/// `RUST_LOG` wins over `relay.log_level`. Keep the guard alive for the
/// lifetime of the process or buffered file output is lost.
fn init_tracing(cfg: &Config) -> anyhow::Result<WorkerGuard> {
    let logs_dir = cfg.logs_dir();
    std::fs::create_dir_all(&logs_dir)?;
    let file = tracing_appender::rolling::daily(&logs_dir, "wa-relay.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file);

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.relay.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .with(fmt::layer().with_writer(file_writer).with_ansi(false))
        .init();

    Ok(guard)
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    let mut cfg = config::load(path)?;
    cfg.apply_env_overrides();
    cfg.validate()?;
    Ok(cfg)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let cfg = load_config(&cli.config)?;

    match cli.command {
        Commands::Start => {
            let _guard = init_tracing(&cfg)?;
            println!("wa-relay — starting...");
            let relay = relay::Relay::build(cfg).await?;
            relay.run().await?;
        }
        Commands::Status => {
            let remote = RemoteRelay::from_config(&cfg.api)?;
            println!("wa-relay — Status Check\n");
            println!("Config: {}", cli.config);
            println!("Relay:  {}", remote.base_url());
            println!();

            let status = remote.status().await?;
            let connection = &status["connection"];
            println!(
                "  whatsapp:  {}",
                connection["state"].as_str().unwrap_or("unknown")
            );
            if let Some(reason) = connection["reason"].as_str() {
                println!("  reason:    {reason}");
            }
            if status["qrPngBase64"].is_string() {
                println!("  pairing:   QR pending (scan it from the bridge or /api/status)");
            }
            println!(
                "  reminders: {}",
                if status["reminders"] == true {
                    "enabled"
                } else {
                    "disabled"
                }
            );
            println!(
                "  templates: {}",
                if status["templates"] == true {
                    "configured"
                } else {
                    "not configured"
                }
            );
        }
        Commands::Backfill {
            since_days,
            limit_per_chat,
            max_chats,
        } => {
            let remote = RemoteRelay::from_config(&cfg.api)?;
            let report = remote
                .backfill(since_days, limit_per_chat, max_chats)
                .await?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Commands::Remind { date } => {
            let remote = RemoteRelay::from_config(&cfg.api)?;
            let result = remote.run_reminders(date).await?;
            println!("{}", serde_json::to_string_pretty(&result)?);
            if result["ok"] == false {
                anyhow::bail!("reminder run did not complete");
            }
        }
    }

    Ok(())
}
