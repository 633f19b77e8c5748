use std::sync::Arc;

use core_cbv::common::logging::DEFAULT_SERVER_LOG_SETTINGS;
use core_cbv::{GitFetcher, get_api_base_url, get_db_pool, setup_logging};
use data_model_cbv::store::{JobStore, PgJobStore};
use worker_cbv::{CoordinatorSettings, JobCoordinator};

use api_cbv::{AppState, routes};

#[tokio::main]
async fn main() {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    setup_logging(DEFAULT_SERVER_LOG_SETTINGS);

    let store: Arc<dyn JobStore> = Arc::new(PgJobStore::new(get_db_pool().await));
    let settings = CoordinatorSettings::from_env();
    tracing::info!(
        "Workspaces under {}, max {} concurrent jobs, accepted hosts: {}",
        settings.workspace_root.display(),
        settings.max_concurrency,
        settings.allowed_hosts.join(", ")
    );
    let coordinator = JobCoordinator::new(store, Arc::new(GitFetcher::default()), settings);

    match coordinator.recover().await {
        Ok(report) => tracing::info!(
            "Startup recovery: {} leftover workspaces removed, {} interrupted jobs failed",
            report.workspaces_removed,
            report.jobs_failed
        ),
        Err(e) => panic!("Startup recovery failed: {}", e),
    }

    let app = routes::router().with_state(AppState::new(coordinator));

    let addr = get_api_base_url().expect("Invalid HOST or PORT");

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => panic!("Failed to bind to address {}: {}", addr, e),
    };
    tracing::info!("Listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");
}

/// Resolves on ctrl-c, or SIGTERM on unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Cannot listen for ctrl-c: {}", e);
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
                tracing::error!("Cannot listen for SIGTERM: {}", e);
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
    tracing::info!("Shutting down");
}
