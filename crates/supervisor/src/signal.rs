//! Shutdown helpers shared by supervised tasks.

use std::future::Future;
use std::time::Duration;

use tokio::signal;
use tokio::sync::watch;
use tokio::time::error::Elapsed;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
///
/// If a handler cannot be installed the failure is logged and that signal
/// is never reported.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        match signal::ctrl_c().await {
            Ok(()) => {}
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGINT handler");
                std::future::pending::<()>().await;
            }
        }
    };

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

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

/// Resolves once `shutdown` turns true or its sender is dropped.
pub async fn cancelled(mut shutdown: watch::Receiver<bool>) {
    // wait_for only errors when the sender is gone, which also means stop
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Drives `task` to completion, allowing it at most `grace` once `shutdown`
/// has turned true.
pub async fn drain_within<F>(
    task: F,
    shutdown: watch::Receiver<bool>,
    grace: Duration,
) -> Result<F::Output, Elapsed>
where
    F: Future,
{
    tokio::pin!(task);
    tokio::select! {
        output = &mut task => Ok(output),
        () = cancelled(shutdown) => tokio::time::timeout(grace, task).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_cancelled_resolves_on_true() {
        let (tx, rx) = watch::channel(false);
        let waiter = tokio::spawn(cancelled(rx));

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!waiter.is_finished());

        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_resolves_on_dropped_sender() {
        let (tx, rx) = watch::channel(false);
        drop(tx);
        tokio::time::timeout(Duration::from_secs(1), cancelled(rx))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_cancelled_resolves_immediately_when_already_true() {
        let (_tx, rx) = watch::channel(true);
        tokio::time::timeout(Duration::from_secs(1), cancelled(rx))
            .await
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_within_finishes_in_time() {
        let (tx, rx) = watch::channel(false);
        let task_rx = rx.clone();
        let task = async move {
            cancelled(task_rx).await;
            tokio::time::sleep(Duration::from_secs(1)).await;
            "drained"
        };
        tx.send(true).unwrap();

        let output = drain_within(task, rx, Duration::from_secs(5)).await;
        assert_eq!(output.unwrap(), "drained");
    }

    #[tokio::test(start_paused = true)]
    async fn test_drain_within_gives_up_after_grace() {
        let (tx, rx) = watch::channel(false);
        let stuck = std::future::pending::<()>();
        tx.send(true).unwrap();

        assert!(drain_within(stuck, rx, Duration::from_secs(5)).await.is_err());
    }

    #[tokio::test]
    async fn test_drain_within_without_shutdown() {
        let (_tx, rx) = watch::channel(false);
        let output = drain_within(async { 7 }, rx, Duration::from_secs(5)).await;
        assert_eq!(output.unwrap(), 7);
    }
}
