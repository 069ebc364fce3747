//! Graceful shutdown
//!
//! [`shutdown_signal`] resolves on Ctrl+C or SIGTERM. [`drain_within`] lets
//! the server finish in-flight requests, but only for a bounded time once
//! the signal has fired.

use std::future::Future;
use std::time::Duration;
use tokio::signal;
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// Resolves when the process is asked to stop
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }
}

/// Run `server` to completion, or give up `limit` after `signalled` fires
///
/// Returns `None` when the drain was cut short.
pub async fn drain_within<F: Future>(server: F, signalled: &Notify, limit: Duration) -> Option<F::Output> {
    tokio::pin!(server);

    tokio::select! {
        output = &mut server => Some(output),
        _ = async {
            signalled.notified().await;
            tokio::time::sleep(limit).await;
        } => {
            warn!(limit_secs = limit.as_secs(), "Connections still open at shutdown deadline, closing anyway");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_server_finishing_on_its_own_is_not_cut_short() {
        let signalled = Notify::new();
        let server = async {
            tokio::time::sleep(Duration::from_secs(2)).await;
            "done"
        };

        let output = drain_within(server, &signalled, Duration::from_secs(10)).await;

        assert_eq!(output, Some("done"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_is_bounded_after_signal() {
        let signalled = Notify::new();
        signalled.notify_one();
        let started = tokio::time::Instant::now();

        let output = drain_within(std::future::pending::<()>(), &signalled, Duration::from_secs(3)).await;

        assert_eq!(output, None);
        assert!(started.elapsed() >= Duration::from_secs(3));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_deadline_without_signal() {
        let signalled = Notify::new();
        let server = async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            1
        };

        assert_eq!(drain_within(server, &signalled, Duration::from_secs(1)).await, Some(1));
    }
}
