//! cleargate-router: polls the event store and dispatches matching
//! subscriptions to the workflow execution engine.

mod engine;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::sync::broadcast;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use cleargate_event_router::{CredentialSealer, EventPipelineBuilder, RouterConfig};
use cleargate_storage_oss::{
    SeaOrmCredentialVault, SeaOrmEventStore, SeaOrmSubscriptionStore, SeaOrmWorkflowSource,
};

use crate::engine::HttpExecutionEngine;

/// Command-line arguments.
#[derive(Parser, Debug)]
#[command(name = "cleargate-router")]
#[command(about = "Routes emitted events to subscribed workflows")]
#[command(version)]
struct Args {
    /// Database holding events, subscriptions and workflows.
    #[arg(long, env = "CLEARGATE_DATABASE_URL", default_value = "sqlite://cleargate.db?mode=rwc")]
    database_url: String,

    /// Base URL of the workflow execution engine.
    #[arg(long, env = "CLEARGATE_ENGINE_URL")]
    engine_url: String,

    /// Delay between router cycles.
    #[arg(long, env = "CLEARGATE_POLL_INTERVAL_MS", default_value_t = 5_000)]
    poll_interval_ms: u64,

    /// Claims older than this are returned to pending.
    #[arg(long, env = "CLEARGATE_STALE_THRESHOLD_MINUTES", default_value_t = 5)]
    stale_threshold_minutes: i64,

    /// Events claimed per cycle.
    #[arg(long, env = "CLEARGATE_CLAIM_BATCH_SIZE", default_value_t = 10)]
    claim_batch_size: usize,

    /// Stale claims reset per cycle.
    #[arg(long, env = "CLEARGATE_RECLAIM_BATCH_SIZE", default_value_t = 10)]
    reclaim_batch_size: usize,

    /// Per-dispatch timeout. Unset means wait for the engine.
    #[arg(long, env = "CLEARGATE_DISPATCH_TIMEOUT_MS")]
    dispatch_timeout_ms: Option<u64>,

    /// Base64 32-byte key for unsealing stored execution credentials.
    #[arg(long, env = "CLEARGATE_CREDENTIAL_KEY", hide_env_values = true)]
    credential_key: Option<String>,

    /// Skip running migrations at startup.
    #[arg(long, env = "CLEARGATE_SKIP_MIGRATIONS")]
    skip_migrations: bool,

    /// Log filter directives, e.g. `info` or `cleargate_event_router=debug`.
    #[arg(long, env = "RUST_LOG", default_value = "info")]
    log_level: String,

    /// Emit logs as JSON.
    #[arg(long, env = "CLEARGATE_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn router_config(&self) -> RouterConfig {
        RouterConfig {
            poll_interval_ms: self.poll_interval_ms,
            stale_threshold_minutes: self.stale_threshold_minutes,
            reclaim_batch_size: self.reclaim_batch_size,
            claim_batch_size: self.claim_batch_size,
            dispatch_timeout_ms: self.dispatch_timeout_ms,
            ..RouterConfig::default()
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_json);

    tracing::info!("starting cleargate-router v{}", env!("CARGO_PKG_VERSION"));

    let db = Arc::new(
        cleargate_storage_oss::connect(&args.database_url)
            .await
            .context("connecting to database")?,
    );
    if !args.skip_migrations {
        cleargate_storage_oss::run_migrations(&db)
            .await
            .context("running migrations")?;
    }

    // The engine's own timeout is a backstop; the router enforces the
    // configured dispatch timeout.
    let engine = HttpExecutionEngine::new(
        &args.engine_url,
        args.dispatch_timeout_ms
            .map(|ms| Duration::from_millis(ms.saturating_mul(2))),
    )
    .context("building HTTP client")?;

    let mut builder = EventPipelineBuilder::new()
        .event_documents(Arc::new(SeaOrmEventStore::new(db.clone())))
        .subscription_documents(Arc::new(SeaOrmSubscriptionStore::new(db.clone())))
        .workflow_source(Arc::new(SeaOrmWorkflowSource::new(db.clone())))
        .execution_engine(Arc::new(engine))
        .router_config(args.router_config());
    match args.credential_key.as_deref() {
        Some(key) => {
            let sealer = CredentialSealer::from_base64(key).context("parsing credential key")?;
            builder = builder
                .credential_sealer(sealer)
                .credential_vault(Arc::new(SeaOrmCredentialVault::new(db.clone())));
        }
        None => tracing::warn!("no credential key, executions will run without credentials"),
    }
    let pipeline = builder.build().context("building event pipeline")?;

    let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
    let task = pipeline.router_task().spawn(shutdown_rx);

    shutdown_signal().await;
    tracing::info!("shutdown requested, finishing current cycle");
    // A send error means the task already exited.
    let _ = shutdown_tx.send(());

    let stats = task.await.context("router task panicked")?;
    tracing::info!(
        cycles = stats.cycles,
        failed_cycles = stats.failed_cycles,
        "router stopped"
    );
    Ok(())
}

/// `RUST_LOG` reaches this through the `--log-level` env binding only.
fn log_filter(log_level: &str) -> EnvFilter {
    EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"))
}

fn init_tracing(log_level: &str, json: bool) {
    let registry = tracing_subscriber::registry().with(log_filter(log_level));
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn args_map_onto_router_config() {
        let args = Args::try_parse_from([
            "cleargate-router",
            "--engine-url",
            "http://engine:8080",
            "--claim-batch-size",
            "25",
            "--dispatch-timeout-ms",
            "1500",
        ])
        .unwrap();
        let config = args.router_config();
        assert_eq!(config.claim_batch_size, 25);
        assert_eq!(config.reclaim_batch_size, 10);
        assert_eq!(config.dispatch_timeout_ms, Some(1500));
        assert_eq!(config.poll_interval_ms, 5_000);
    }

    #[test]
    fn log_level_flag_drives_the_filter() {
        let args = Args::try_parse_from([
            "cleargate-router",
            "--engine-url",
            "http://engine:8080",
            "--log-level",
            "cleargate_event_router=debug,warn",
        ])
        .unwrap();
        assert_eq!(args.log_level, "cleargate_event_router=debug,warn");
        assert_eq!(
            log_filter(&args.log_level).max_level_hint(),
            Some(LevelFilter::DEBUG)
        );
        assert_eq!(log_filter("warn").max_level_hint(), Some(LevelFilter::WARN));
        // unparsable directives fall back to info
        assert_eq!(
            log_filter("cleargate=bogus").max_level_hint(),
            Some(LevelFilter::INFO)
        );
    }

    #[test]
    fn engine_url_is_required() {
        // Only fails when the env fallback is unset too.
        if std::env::var_os("CLEARGATE_ENGINE_URL").is_none() {
            assert!(Args::try_parse_from(["cleargate-router"]).is_err());
        }
    }
}
