use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Cancels `cancelation` on ctrl-c. Returns as soon as the token is cancelled for any reason, so
/// it can be joined with the other engine loops.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received ctrl-c, shutting down");
            cancelation.cancel();
        },
        _ = cancelation.cancelled() => (),
    };
}
