use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use towtruck_dispatch::{DispatchConfig, DispatchService, PgDispatchStore};
use towtruck_events::{EventBus, EventPersistence};
use towtruck_worker::config::WorkerConfig;
use towtruck_worker::notifications::AssignmentNotifier;
use towtruck_worker::shutdown::Running;
use towtruck_worker::trigger::TriggerListener;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "towtruck_worker=debug,towtruck_dispatch=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = WorkerConfig::from_env().context("Invalid worker configuration")?;
    let dispatch_config = DispatchConfig::from_env().context("Invalid dispatch configuration")?;
    tracing::info!(
        channel = %config.trigger_channel,
        commit_retries = dispatch_config.commit_retries,
        commit_timeout_ms = dispatch_config.commit_timeout.as_millis() as u64,
        "Loaded dispatcher configuration",
    );

    // --- Database ---
    let pool = towtruck_db::create_pool(&config.database_url, config.db_max_connections)
        .await
        .context("Failed to connect to database")?;
    tracing::info!("Database connection pool created");

    towtruck_db::health_check(&pool)
        .await
        .context("Database health check failed")?;

    towtruck_db::run_migrations(&pool)
        .await
        .context("Failed to run database migrations")?;
    tracing::info!("Database migrations applied");

    // --- Event bus ---
    let event_bus = Arc::new(EventBus::default());
    let persistence_handle = tokio::spawn(EventPersistence::run(pool.clone(), event_bus.subscribe()));
    let notifier_handle = tokio::spawn(AssignmentNotifier::run(event_bus.subscribe()));
    tracing::info!("Event services started (persistence, assignment notifier)");

    // --- Dispatch ---
    let store = Arc::new(PgDispatchStore::new(pool.clone()));
    let service = Arc::new(DispatchService::new(store, Arc::clone(&event_bus), dispatch_config));
    service
        .recover()
        .await
        .context("Failed to rebuild dispatch state")?;

    // --- Trigger listener ---
    let cancel = CancellationToken::new();
    let listener = TriggerListener::new(pool.clone(), config.trigger_channel.clone(), Arc::clone(&service));
    let listener_cancel = cancel.clone();
    let listener_handle = tokio::spawn(async move { listener.run(listener_cancel).await });

    let running = Running {
        pool,
        service,
        event_bus,
        cancel,
        listener: listener_handle,
        persistence: persistence_handle,
        notifier: notifier_handle,
    };
    running
        .until_stopped(shutdown_signal(), Duration::from_secs(config.shutdown_timeout_secs))
        .await
}

/// Wait for SIGINT (Ctrl-C) or, on Unix, SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl-C handler");
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
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl-C, starting graceful shutdown"),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown"),
    }
}
