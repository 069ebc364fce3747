//! Roster Server - Main entry point

use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use roster_common::logging::{init_logging, LogConfig};
use serde_json::json;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::{future::IntoFuture, net::SocketAddr, sync::Arc, time::Duration};
use tokio::sync::Notify;
use tracing::{info, warn};

use roster_server::{
    config::Config,
    create_router,
    ingest::{ImporterRegistry, IngestionPipeline, PasswordHasher, PgRecordStore},
    jobs::PgJobStore,
    queue::{ConnectionManager, JobPublisher},
    shutdown::{drain_within, shutdown_signal},
    worker::Worker,
    AppState,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Defaults for this binary; environment variables take precedence
    let log_config = LogConfig::builder()
        .log_file_prefix("roster-server")
        .filter_directives("roster_server=debug,tower_http=debug,sqlx=info,lapin=info")
        .build()
        .merge_env()?;

    let _log_guard = init_logging(&log_config)?;

    info!("Starting Roster Server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let db_pool = PgPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .acquire_timeout(Duration::from_secs(config.database.connect_timeout_secs))
        .connect(&config.database.url)
        .await?;

    info!("Database connection pool established");

    sqlx::migrate!("../../migrations")
        .run(&db_pool)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;

    info!("Database migrations completed");

    let records = Arc::new(PgRecordStore::new(Arc::new(db_pool.clone())));
    let jobs = Arc::new(PgJobStore::new(db_pool.clone()));
    let registry = Arc::new(ImporterRegistry::standard(PasswordHasher::new(
        config.ingest.password_hash_cost,
    )));
    let pipeline = IngestionPipeline::new(records).with_batch_size(config.ingest.batch_size);

    let broker = Arc::new(ConnectionManager::new(
        config.queue.uri.clone(),
        config.queue.reconnect_policy(),
    ));
    let _supervisor = broker.spawn_supervisor();
    let publisher = JobPublisher::new(broker.clone());

    if config.worker.enabled {
        let worker = Arc::new(Worker::new(
            pipeline.clone(),
            registry.clone(),
            jobs.clone(),
            config.queue.max_retries,
        ));
        match worker.start(broker.clone()).await {
            Ok(()) => info!("Import worker subscribed to all entity queues"),
            Err(e) => warn!(error = %e, "Import worker could not subscribe yet, retrying in the background"),
        }
    } else {
        info!("Import worker is disabled (WORKER_ENABLED=false)");
    }

    let state = AppState {
        registry,
        pipeline,
        jobs,
        publisher,
    };

    let app = create_router(state, &config.cors).merge(health_routes(db_pool));

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    let signalled = Arc::new(Notify::new());
    let server = axum::serve(listener, app)
        .with_graceful_shutdown({
            let signalled = Arc::clone(&signalled);
            async move {
                shutdown_signal().await;
                signalled.notify_one();
            }
        })
        .into_future();
    let drain_limit = Duration::from_secs(config.server.shutdown_timeout_secs);
    if let Some(result) = drain_within(server, &signalled, drain_limit).await {
        result?;
    }

    broker.shutdown().await;
    info!("Server shut down gracefully");

    Ok(())
}

fn health_routes(db: PgPool) -> Router {
    Router::new().route("/health", get(health_check)).with_state(db)
}

/// Health check handler
async fn health_check(State(db): State<PgPool>) -> Result<Response, StatusCode> {
    match sqlx::query("SELECT 1").fetch_one(&db).await {
        Ok(_) => Ok((
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "database": "connected"
            })),
        )
            .into_response()),
        Err(e) => {
            tracing::error!("Database health check failed: {:?}", e);
            Err(StatusCode::SERVICE_UNAVAILABLE)
        },
    }
}
