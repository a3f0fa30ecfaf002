//! Stopping the dispatcher.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use towtruck_db::DbPool;
use towtruck_dispatch::DispatchService;
use towtruck_events::EventBus;

/// The running process: shared handles plus its background tasks.
pub struct Running {
    pub pool: DbPool,
    pub service: Arc<DispatchService>,
    pub event_bus: Arc<EventBus>,
    pub cancel: CancellationToken,
    pub listener: JoinHandle<Result<(), sqlx::Error>>,
    pub persistence: JoinHandle<()>,
    pub notifier: JoinHandle<()>,
}

impl Running {
    /// Run until `signal` fires or the trigger listener stops on its own,
    /// then shut down.
    ///
    /// Both paths drain the event services and close the pool; a failed
    /// listener is returned as the error afterwards.
    pub async fn until_stopped(self, signal: impl Future<Output = ()>, grace: Duration) -> anyhow::Result<()> {
        let Running {
            pool,
            service,
            event_bus,
            cancel,
            mut listener,
            persistence,
            notifier,
        } = self;

        let stopped_early = tokio::select! {
            _ = signal => None,
            result = &mut listener => {
                tracing::error!("Trigger listener stopped unexpectedly");
                Some(result)
            }
        };

        tracing::info!("Shutting down dispatcher");
        cancel.cancel();
        let listener_result = match stopped_early {
            Some(result) => Some(result),
            None => tokio::time::timeout(grace, listener).await.ok(),
        };
        let listener_failure = match listener_result {
            Some(Ok(Ok(()))) => None,
            Some(Ok(Err(e))) => {
                tracing::error!(error = %e, "Trigger listener exited with an error");
                Some(anyhow::Error::new(e).context("Trigger listener failed"))
            }
            Some(Err(e)) => {
                tracing::error!(error = %e, "Trigger listener panicked");
                Some(anyhow::Error::new(e).context("Trigger listener panicked"))
            }
            None => {
                tracing::warn!("Trigger listener did not stop in time");
                None
            }
        };

        // Dropping the last bus handles closes the channel and stops the
        // persistence and notifier loops.
        drop(service);
        drop(event_bus);
        if tokio::time::timeout(grace, persistence).await.is_err() {
            tracing::warn!("Event persistence did not stop in time");
        }
        if tokio::time::timeout(grace, notifier).await.is_err() {
            tracing::warn!("Assignment notifier did not stop in time");
        }
        tracing::info!("Event services shut down");

        pool.close().await;
        tracing::info!("Graceful shutdown complete");
        listener_failure.map_or(Ok(()), Err)
    }
}
