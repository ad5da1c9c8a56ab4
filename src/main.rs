use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;

use roomcast::cli::{Cli, Command};
use roomcast::config::Settings;
use roomcast::server::{create_app, AppState};
use roomcast::shutdown::{GracefulShutdown, ShutdownConfig};
use roomcast::tasks::HeartbeatTask;
use roomcast::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::InitConfig { path } => {
            let written = Settings::write_default_file(&path)
                .with_context(|| format!("failed to write {}", path.display()))?;
            if written {
                println!("Wrote default config to {}", path.display());
            } else {
                println!("{} already exists, leaving it untouched", path.display());
            }
            Ok(())
        }
        Command::Start {
            mode,
            port,
            config_dir,
        } => {
            let mut settings = Settings::load(&config_dir, mode.into())
                .with_context(|| format!("failed to load config from {}", config_dir.display()))?;
            if let Some(port) = port {
                settings.server.port = port;
            }
            run(settings).await
        }
    }
}

async fn run(settings: Settings) -> Result<()> {
    // Held until the end of main so buffered spans get flushed
    let _telemetry = init_telemetry(&settings.otel)?;
    tracing::info!("Configuration loaded");

    let state = AppState::new(settings);
    let settings = state.settings.clone();
    tracing::info!("Application state initialized");

    let heartbeat_handle = settings.websocket.heartbeat_interval().map(|interval| {
        let task = HeartbeatTask::new(
            interval,
            state.registry.clone(),
            state.shutdown_tx.subscribe(),
        );
        tokio::spawn(task.run())
    });

    let shutdown = GracefulShutdown::with_config(
        state.registry.clone(),
        state.shutdown_tx.clone(),
        ShutdownConfig {
            drain_timeout: Duration::from_secs(settings.shutdown.drain_timeout_secs),
        },
    );

    let app = create_app(state);

    let addr = settings.server_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal_handler(shutdown))
        .await?;

    if let Some(handle) = heartbeat_handle {
        let _ = handle.await;
    }

    tracing::info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal_handler(shutdown: GracefulShutdown) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let reason = tokio::select! {
        _ = ctrl_c => "ctrl-c",
        _ = terminate => "terminate",
    };
    tracing::info!(reason, "Initiating graceful shutdown");

    shutdown.execute(reason).await;
}
