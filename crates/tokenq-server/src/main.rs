#![doc = include_str!("../README.md")]

mod server;

use clap::Parser;
use server::config::{CliArgs, ServerConfig};
use server::reminder::reminder_loop;
use server::service::{router, state::AppState};
use server::telemetry::init_telemetry;
use tokenq::SqliteStore;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;

// Using mimalloc for better performance under contention, especially in musl
// environments.
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load from .env
    let _ = dotenvy::dotenv();
    let args = CliArgs::parse();
    let config = ServerConfig::try_from(args)?;

    let providers = init_telemetry()?;

    let store = SqliteStore::connect(&config.database_url, config.store).await?;
    if config.uses_dev_secret() {
        tracing::warn!("JWT_SECRET is not set; using the development secret");
    }

    let state = AppState::new(store.clone(), &config);
    let shutdown = CancellationToken::new();

    let reminders = config.reminder_interval.map(|every| {
        tokio::spawn(reminder_loop(
            store.clone(),
            state.notifier.clone(),
            every,
            shutdown.clone(),
        ))
    });

    let listener = TcpListener::bind(&config.server_addr).await?;
    log_startup_info(&config);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await?;

    // The signal handler cancels the token; make sure it is cancelled if the
    // server stopped for any other reason.
    shutdown.cancel();
    if let Some(task) = reminders {
        if tokio::time::timeout(config.shutdown_timeout, task).await.is_err() {
            tracing::warn!("reminder task did not stop in time");
        }
    }

    store.close().await;
    tracing::info!("Service shut down successfully");
    providers.shutdown();
    Ok(())
}

fn log_startup_info(config: &ServerConfig) {
    if cfg!(debug_assertions) {
        tracing::info!(
            "Starting token service on {} with database {} (reminders: {:?})",
            config.server_addr,
            config.database_url,
            config.reminder_interval
        );
    } else {
        tracing::info!("Starting token service on {}", config.server_addr);
    }
}

async fn shutdown_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    tokio::select! {
        () = ctrl_c => tracing::info!("Received Ctrl+C signal"),
        () = terminate => tracing::info!("Received SIGTERM signal"),
    }

    tracing::info!("Shutdown signal received, terminating gracefully...");
    shutdown.cancel();
}
