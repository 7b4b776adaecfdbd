mod config;
mod handler;

use std::sync::Arc;

use queue_core::WorkerRuntime;
use queue_postgres::PgJobStore;
use sqlx::postgres::PgPoolOptions;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info};

use crate::config::WorkerConfig;
use crate::handler::LoggingJobHandler;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(std::env::var("RUST_LOG").unwrap_or_else(|_| "queue_worker=info".to_string()))
        .init();

    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            error!("failed to read worker config: {err}");
            std::process::exit(1);
        }
    };

    let pool = match PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
    {
        Ok(pool) => pool,
        Err(err) => {
            error!("failed to connect to postgres: {err}");
            std::process::exit(1);
        }
    };

    let store = PgJobStore::new(pool);
    if let Err(err) = store.run_migrations().await {
        error!("failed to apply migrations: {err}");
        std::process::exit(1);
    }

    let runtime = WorkerRuntime::new(Arc::new(store), config.worker_id.clone());
    let handler = Arc::new(LoggingJobHandler);
    let (stop_tx, stop_rx) = watch::channel(false);

    info!(worker_id = %runtime.worker_id(), "worker starting");

    tokio::spawn(async move {
        shutdown_signal().await;
        info!("shutdown signal received, telling worker to stop after its current job");
        let _ = stop_tx.send(true);
    });

    // Awaited directly, not raced in a select!, so a job already in
    // flight when the signal arrives is allowed to finish (§4.4
    // "Shutdown").
    runtime.run(handler, stop_rx).await;
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install sigterm handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
