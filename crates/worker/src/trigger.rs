//! Inbound dispatch triggers.
//!
//! Other components announce changes with `NOTIFY <channel>, '<json>'`.
//! [`TriggerListener`] receives those notifications, decodes each payload
//! into a [`TriggerMessage`] and applies it to the [`DispatchService`].
//! Triggers are applied one at a time in arrival order.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sqlx::postgres::PgListener;
use tokio_util::sync::CancellationToken;
use towtruck_core::accident::AccidentStatus;
use towtruck_core::error::CoreError;
use towtruck_core::types::DbId;
use towtruck_db::DbPool;
use towtruck_dispatch::{Assignment, DispatchService};

/// Pause before polling again after the listener connection failed.
const RECONNECT_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, thiserror::Error)]
pub enum TriggerError {
    #[error("Malformed trigger payload: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error(transparent)]
    Dispatch(#[from] CoreError),
}

/// One inbound trigger, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TriggerMessage {
    AccidentReported { station_id: DbId, accident_id: DbId },
    DriverRegistered { station_id: DbId, driver_id: DbId },
    StatusChanged { accident_id: DbId, status: AccidentStatus },
    AccidentDeleted { accident_id: DbId },
    StationCreated { station_id: DbId },
    StationRemoved { station_id: DbId },
}

impl TriggerMessage {
    pub fn parse(payload: &str) -> Result<Self, TriggerError> {
        Ok(serde_json::from_str(payload)?)
    }

    /// Apply this trigger. Returns the assignment it produced, if any.
    pub async fn apply(&self, service: &DispatchService) -> Result<Option<Assignment>, CoreError> {
        match *self {
            TriggerMessage::AccidentReported {
                station_id,
                accident_id,
            } => service.on_accident_reported(station_id, accident_id).await,
            TriggerMessage::DriverRegistered {
                station_id,
                driver_id,
            } => service.on_driver_registered(station_id, driver_id).await,
            TriggerMessage::StatusChanged {
                accident_id,
                status,
            } => Ok(service.on_status_changed(accident_id, status).await?.assignment),
            TriggerMessage::AccidentDeleted { accident_id } => {
                service.on_accident_deleted(accident_id).await
            }
            TriggerMessage::StationCreated { station_id } => {
                service.register_station(station_id).await?;
                Ok(None)
            }
            TriggerMessage::StationRemoved { station_id } => {
                service.remove_station(station_id).await?;
                Ok(None)
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            TriggerMessage::AccidentReported { .. } => "accident_reported",
            TriggerMessage::DriverRegistered { .. } => "driver_registered",
            TriggerMessage::StatusChanged { .. } => "status_changed",
            TriggerMessage::AccidentDeleted { .. } => "accident_deleted",
            TriggerMessage::StationCreated { .. } => "station_created",
            TriggerMessage::StationRemoved { .. } => "station_removed",
        }
    }
}

/// Decode and apply one raw payload.
pub async fn handle_payload(
    service: &DispatchService,
    payload: &str,
) -> Result<Option<Assignment>, TriggerError> {
    let message = TriggerMessage::parse(payload)?;
    tracing::debug!(kind = message.kind(), "Trigger received");
    Ok(message.apply(service).await?)
}

/// Long-lived task feeding `LISTEN` notifications to the dispatch service.
pub struct TriggerListener {
    pool: DbPool,
    channel: String,
    service: Arc<DispatchService>,
}

impl TriggerListener {
    pub fn new(pool: DbPool, channel: impl Into<String>, service: Arc<DispatchService>) -> Self {
        Self {
            pool,
            channel: channel.into(),
            service,
        }
    }

    /// Run until the cancellation token is triggered.
    ///
    /// Fails only if the initial `LISTEN` cannot be established; later
    /// connection errors are logged and the listener keeps going.
    pub async fn run(self, cancel: CancellationToken) -> Result<(), sqlx::Error> {
        let mut listener = PgListener::connect_with(&self.pool).await?;
        listener.listen(&self.channel).await?;
        tracing::info!(channel = %self.channel, "Trigger listener started");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Trigger listener shutting down");
                    break;
                }
                notification = listener.recv() => match notification {
                    Ok(notification) => self.handle(notification.payload()).await,
                    Err(e) => {
                        tracing::error!(error = %e, "Trigger listener connection failed");
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                },
            }
        }
        Ok(())
    }

    async fn handle(&self, payload: &str) {
        match handle_payload(&self.service, payload).await {
            Ok(Some(assignment)) => {
                tracing::debug!(
                    station_id = assignment.station_id,
                    accident_id = assignment.accident_id,
                    driver_id = assignment.driver_id,
                    "Trigger produced an assignment",
                );
            }
            Ok(None) => {}
            Err(TriggerError::Malformed(e)) => {
                tracing::warn!(error = %e, payload, "Ignoring malformed trigger");
            }
            Err(TriggerError::Dispatch(e)) if e.is_retryable() => {
                tracing::error!(error = %e, payload, "Trigger failed on a store error, state rolled back");
            }
            Err(TriggerError::Dispatch(e)) => {
                tracing::warn!(error = %e, payload, "Trigger rejected");
            }
        }
    }
}
