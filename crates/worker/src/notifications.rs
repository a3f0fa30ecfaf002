//! Outbound sink for committed assignments.
//!
//! Subscribes to the event bus and reports every `accident.assigned` event.
//! The dispatch path never waits on it.

use tokio::sync::broadcast;
use towtruck_events::{event_types, DispatchEvent};

pub struct AssignmentNotifier;

impl AssignmentNotifier {
    /// Run until the event bus is closed.
    pub async fn run(mut receiver: broadcast::Receiver<DispatchEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) if event.event_type == event_types::ACCIDENT_ASSIGNED => {
                    tracing::info!(
                        station_id = ?event.station_id,
                        accident_id = ?event.accident_id,
                        driver_id = ?event.driver_id,
                        "Driver dispatched",
                    );
                }
                Ok(event) if event.event_type == event_types::DRIVER_RELEASED => {
                    tracing::info!(
                        station_id = ?event.station_id,
                        driver_id = ?event.driver_id,
                        "Driver back in service",
                    );
                }
                Ok(_) => {}
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    tracing::warn!(skipped = n, "Assignment notifier lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
