//! Shutdown signal handling
//!
//! The orchestrator owns a root [`CancellationToken`]; every component
//! observes a child of it. This module provides the signal waiter that
//! triggers cancellation.

use tracing::info;

pub use tokio_util::sync::CancellationToken;

/// Wait for a shutdown signal (Ctrl+C or SIGTERM).
pub async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("received Ctrl+C signal");
        }
        _ = terminate => {
            info!("received SIGTERM signal");
        }
    }
}
