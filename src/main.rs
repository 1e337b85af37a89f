//! IssueTrack sync daemon.
//!
//! Restores the saved session, keeps the push channel connected and the
//! query cache coherent until interrupted. Without a session it polls
//! storage until `issuetrack login` saves one.

use tracing_subscriber::{EnvFilter, fmt};

use issuetrack_client::Client;
use issuetrack_core::config::AppConfig;
use issuetrack_core::error::AppError;

#[tokio::main]
async fn main() {
    let config = match load_configuration() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Sync daemon error: {}", e);
        std::process::exit(1);
    }
}

/// Load configuration for the environment named by `ISSUETRACK_ENV`
fn load_configuration() -> Result<AppConfig, AppError> {
    let env = std::env::var("ISSUETRACK_ENV").unwrap_or_else(|_| "development".to_string());
    AppConfig::load(&env)
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

async fn run(config: AppConfig) -> Result<(), AppError> {
    tracing::info!(
        base_url = %config.api.base_url,
        realtime = config.realtime.enabled,
        "Starting issuetrack-sync v{}",
        env!("CARGO_PKG_VERSION")
    );

    let poll = config.session.restore_poll();
    let client = Client::from_config(config)?;
    client.start();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        match client.restore().await {
            Ok(Some(_)) => {}
            Ok(None) => tracing::warn!(
                poll_seconds = poll.as_secs(),
                "No saved session; run `issuetrack login` to start syncing"
            ),
            Err(e) => tracing::warn!(error = %e, "Failed to read saved session"),
        }

        let session = tokio::select! {
            () = &mut shutdown => break,
            session = client.wait_for_session(poll) => session,
        };
        let who = session
            .user
            .as_ref()
            .map(|u| u.username.clone())
            .unwrap_or_else(|| "unknown user".to_string());
        tracing::info!(session_id = %session.id, user = %who, "Syncing");

        tokio::select! {
            () = &mut shutdown => break,
            () = client.session_ended() => {
                tracing::warn!(session_id = %session.id, "Session ended");
            }
        }
    }

    tracing::info!("Shutdown signal received, stopping...");

    let metrics = client.realtime().metrics();
    tracing::info!(
        frames_received = metrics.frames_received,
        frames_dispatched = metrics.frames_dispatched,
        reconnects = metrics.reconnect_attempts,
        "Realtime totals"
    );
    client.shutdown().await;

    tracing::info!("issuetrack-sync stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
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
                tracing::error!("Failed to install SIGTERM handler: {}", e);
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
