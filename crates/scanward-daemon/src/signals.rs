//! Signal handling: graceful shutdown and power-state pause/resume.

use scanward_core::{Coordinator, ScanCommand};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Wait for shutdown signal (Ctrl+C, SIGTERM or explicit shutdown)
pub async fn wait_for_shutdown(mut shutdown_rx: broadcast::Receiver<()>) {
    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT");
        }
        _ = shutdown_rx.recv() => {
            tracing::info!("Received shutdown command");
        }
        _ = wait_for_sigterm() => {
            tracing::info!("Received SIGTERM");
        }
    }
}

/// Wait for SIGTERM signal
#[cfg(unix)]
async fn wait_for_sigterm() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            sigterm.recv().await;
        }
        Err(e) => {
            tracing::warn!(error = %e, "Failed to register SIGTERM handler");
            std::future::pending::<()>().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_sigterm() {
    // On non-Unix platforms, just wait forever
    std::future::pending::<()>().await;
}

/// Forward power-state signals to the coordinator: SIGUSR1 pauses scanning,
/// SIGUSR2 resumes it.
#[cfg(unix)]
pub async fn forward_power_signals(coordinator: Arc<Coordinator>) {
    use tokio::signal::unix::{signal, SignalKind};

    let (mut pause, mut resume) = match (
        signal(SignalKind::user_defined1()),
        signal(SignalKind::user_defined2()),
    ) {
        (Ok(pause), Ok(resume)) => (pause, resume),
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!(error = %e, "Failed to register power signal handlers");
            return;
        }
    };

    loop {
        let command = tokio::select! {
            Some(()) = pause.recv() => ScanCommand::Pause,
            Some(()) = resume.recv() => ScanCommand::Resume,
            else => break,
        };

        match coordinator.handle(command.clone()) {
            Ok(dispatch) => tracing::info!(%command, ?dispatch, "Power signal"),
            Err(e) => tracing::warn!(%command, error = %e, "Power signal not delivered"),
        }
    }
}

#[cfg(not(unix))]
pub async fn forward_power_signals(_coordinator: Arc<Coordinator>) {
    std::future::pending::<()>().await;
}
