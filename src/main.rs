use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;

use mailroom::campaign::CampaignScheduler;
use mailroom::config::MailroomConfig;
use mailroom::dispatch::DispatchEngine;
use mailroom::http::{self, AppState};
use mailroom::pool::AccountPool;
use mailroom::quota;
use mailroom::relay::Relay;
use mailroom::sink::{LogSink, TracingSink};
use mailroom::store::{CampaignStore, LibSqlStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing: console plus a daily-rolling diagnostic file.
    let log_dir = std::env::var("MAILROOM_LOG_DIR").unwrap_or_else(|_| "./logs".to_string());
    let file_appender = tracing_appender::rolling::daily(&log_dir, "mailroom.log");
    let (file_writer, _appender_guard) = tracing_appender::non_blocking(file_appender);
    {
        use tracing_subscriber::layer::SubscriberExt;
        use tracing_subscriber::util::SubscriberInitExt;
        tracing_subscriber::registry()
            .with(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(file_writer),
            )
            .init();
    }

    let config = MailroomConfig::from_env().context("Invalid configuration")?;

    eprintln!("📮 Mailroom v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   SMTP host: {}", config.accounts.smtp_host);
    eprintln!("   API: http://0.0.0.0:{}/api", config.http_port);

    // ── Account pool + relay ────────────────────────────────────────────
    let pool = AccountPool::from_config(&config.accounts);
    eprintln!("   Accounts: {} registered", pool.len());

    let relay = match &config.relay {
        Some(relay_config) => match Relay::from_config(relay_config) {
            Ok(relay) => {
                eprintln!("   Relay: enabled ({})", relay_config.host);
                Some(relay)
            }
            Err(e) => {
                tracing::warn!(error = %e, "Relay configured but unusable; continuing without it");
                None
            }
        },
        None => {
            eprintln!("   Relay: disabled");
            None
        }
    };

    // ── Dispatch engine ─────────────────────────────────────────────────
    let engine = Arc::new(DispatchEngine::new(
        pool,
        relay,
        Arc::new(TracingSink) as Arc<dyn LogSink>,
    ));

    // ── Daily quota reset ───────────────────────────────────────────────
    let schedule = cron::Schedule::from_str(&config.reset_schedule)
        .with_context(|| format!("Invalid reset schedule: {}", config.reset_schedule))?;
    let _reset_handle = quota::spawn_daily_reset(Arc::clone(engine.tracker()), schedule);
    eprintln!("   Quota reset: {}", config.reset_schedule);

    // ── Campaign store + scheduler ──────────────────────────────────────
    let store: Arc<dyn CampaignStore> = Arc::new(
        LibSqlStore::new_local(Path::new(&config.db_path))
            .await
            .with_context(|| format!("Failed to open campaign store at {}", config.db_path))?,
    );
    eprintln!("   Database: {}\n", config.db_path);

    let scheduler = CampaignScheduler::new(Arc::clone(&engine), store);

    // ── HTTP surface ────────────────────────────────────────────────────
    let app = http::api_routes(AppState {
        engine,
        scheduler,
        bulk_delay: Duration::from_millis(config.bulk_delay_ms),
    });

    let listener = tokio::net::TcpListener::bind(("0.0.0.0", config.http_port))
        .await
        .with_context(|| format!("Failed to bind port {}", config.http_port))?;
    tracing::info!(port = config.http_port, "Mailroom API started");
    axum::serve(listener, app).await.context("Server error")?;

    Ok(())
}
