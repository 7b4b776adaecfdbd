mod config;
mod errors;
mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use queue_postgres::PgJobStore;
use queue_rate_redis::RedisRateGate;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::config::ApiConfig;
use crate::routes::AppState;

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "queue_api=info,axum=info".to_string()),
        )
        .init();

    let config = ApiConfig::from_env().expect("configuration should be valid");

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(&config.database_url)
        .await
        .expect("database connection should succeed");

    let store = PgJobStore::new(pool);
    store
        .run_migrations()
        .await
        .expect("migrations should apply");

    let rate_gate = RedisRateGate::connect(&config.redis_url)
        .await
        .expect("redis connection should succeed");

    let state = Arc::new(AppState {
        store: Arc::new(store),
        rate_gate: Arc::new(rate_gate),
    });

    let app = Router::new()
        .route("/api/v1/jobs", post(routes::submit_job).get(routes::list_jobs))
        .route("/api/v1/jobs/{job_id}", get(routes::get_job))
        .route("/api/v1/metrics", get(routes::get_metrics))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .expect("bind should succeed");

    info!(addr = %config.bind_addr, "queue api listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("server should run");
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
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

    info!("shutdown signal received, draining connections");
}
