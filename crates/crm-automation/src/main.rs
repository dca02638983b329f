//! CRM Automation Server
//!
//! Serves the workflow automation API and runs the job loop that executes
//! workflow steps.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crm_automation::{
    config::{AppConfig, DatabaseConfig, StoreBackend},
    db::{create_pool, schema::ensure_schema, DbPool, PgStore},
    engine::StepDispatcher,
    handlers,
    scheduler::{JobRunner, TokioScheduler},
    state::AppState,
    steps::create_default_registry,
    store::{MemoryStore, Repositories},
};

/// Initialize tracing/logging.
fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,crm_automation=debug,tower_http=debug".into());

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Wire the storage ports for the configured backend.
///
/// With Postgres, definitions, runs and the audit trail are durable. CRM
/// entities stay on the in-memory store until the host application provides
/// its own repositories.
async fn build_repositories(config: &AppConfig) -> anyhow::Result<(Repositories, Option<DbPool>)> {
    let memory = Arc::new(MemoryStore::new());
    let mut repos = Repositories::in_memory(memory);

    match config.store {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store, runs will not survive a restart");
            Ok((repos, None))
        }
        StoreBackend::Postgres => {
            let db_config = DatabaseConfig::from_env().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to load database config, using defaults");
                DatabaseConfig::default()
            });

            let pool = create_pool(&db_config).await?;
            ensure_schema(&pool).await?;

            let pg = Arc::new(PgStore::new(pool.clone()));
            repos.definitions = pg.clone();
            repos.runs = pg.clone();
            repos.audit = pg;
            Ok((repos, Some(pool)))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    dotenvy::dotenv().ok();

    // Load configuration
    let app_config = AppConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Failed to load app config, using defaults: {}", e);
        AppConfig::default()
    });

    init_tracing(app_config.log_json);

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "Starting CRM Automation server"
    );

    tracing::info!(
        host = %app_config.host,
        port = app_config.port,
        debug = app_config.debug,
        store = ?app_config.store,
        worker_concurrency = app_config.worker_concurrency,
        "Configuration loaded"
    );

    let (repos, db_pool) = build_repositories(&app_config).await?;

    // Job loop
    let (scheduler, jobs) = TokioScheduler::channel();
    let scheduler = Arc::new(scheduler);
    let registry = Arc::new(create_default_registry(&repos));
    let dispatcher = Arc::new(StepDispatcher::new(
        repos.clone(),
        registry,
        scheduler.clone(),
    ));

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let runner = JobRunner::new(jobs, dispatcher, app_config.worker_concurrency);
    let runner_handle = tokio::spawn(runner.run(async move {
        let _ = stop_rx.await;
    }));

    // Create application state
    let state = AppState::new(app_config.clone(), repos, scheduler, db_pool);

    if let Some(path) = &app_config.definitions_path {
        state.definitions.load_file(path).await?;
    }

    // Build the router
    let app = handlers::build_router(state);

    // Bind to address
    let addr: SocketAddr = app_config.bind_address().parse()?;
    let listener = TcpListener::bind(addr).await?;

    tracing::info!(address = %addr, "Server listening");

    // Run the server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let _ = stop_tx.send(());
    if let Err(e) = runner_handle.await {
        tracing::error!(error = %e, "Job runner task failed");
    }

    tracing::info!("Server shutdown complete");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
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
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, starting graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
