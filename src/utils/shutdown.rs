use tokio::select;
use tokio_util::sync::CancellationToken;

/// Cancels `cancelation` once the process receives ctrl-c. Returns early if something else
/// cancels it first.
pub async fn detect_shutdown(cancelation: CancellationToken) {
    select! {
        _ = cancelation.cancelled() => {},
        _ = tokio::signal::ctrl_c() => {
            cancelation.cancel();
        },
    };
}
