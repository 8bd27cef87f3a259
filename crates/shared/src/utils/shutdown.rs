use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Waits for ctrl-c and cancels the root scope; every long-lived component
/// derives a child token from it.
pub async fn shutdown_signal(token: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {e}");
        return;
    }

    info!("🛑 Shutdown signal received, cancelling root scope");
    token.cancel();
}
