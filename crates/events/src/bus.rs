//! In-process event bus backed by a `tokio::sync::broadcast` channel.
//!
//! [`EventBus`] is shared via `Arc<EventBus>`. Publishing is fire-and-forget:
//! nothing in the dispatch path waits on a subscriber.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use towtruck_core::audit::FieldChange;
use towtruck_core::types::DbId;

/// Event type names, matching the `event_types` seed data.
pub mod event_types {
    pub const ACCIDENT_ASSIGNED: &str = "accident.assigned";
    pub const ACCIDENT_STATUS_CHANGED: &str = "accident.status_changed";
    pub const ACCIDENT_DELETED: &str = "accident.deleted";
    pub const DRIVER_REGISTERED: &str = "driver.registered";
    pub const DRIVER_RELEASED: &str = "driver.released";
}

// ---------------------------------------------------------------------------
// DispatchEvent
// ---------------------------------------------------------------------------

/// Something that happened to a station, accident or driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchEvent {
    /// Dot-separated event name, e.g. `"accident.assigned"`.
    pub event_type: String,
    pub station_id: Option<DbId>,
    pub accident_id: Option<DbId>,
    pub driver_id: Option<DbId>,
    /// Field-level changes committed together with this event.
    pub changes: Vec<FieldChange>,
    /// Free-form JSON payload carrying event-specific data.
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl DispatchEvent {
    pub fn new(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            station_id: None,
            accident_id: None,
            driver_id: None,
            changes: Vec::new(),
            payload: serde_json::Value::Object(Default::default()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_station(mut self, station_id: DbId) -> Self {
        self.station_id = Some(station_id);
        self
    }

    pub fn with_accident(mut self, accident_id: DbId) -> Self {
        self.accident_id = Some(accident_id);
        self
    }

    pub fn with_driver(mut self, driver_id: DbId) -> Self {
        self.driver_id = Some(driver_id);
        self
    }

    pub fn with_changes(mut self, changes: Vec<FieldChange>) -> Self {
        self.changes.extend(changes);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default buffer capacity for the broadcast channel.
const DEFAULT_CAPACITY: usize = 1024;

/// In-process fan-out event bus.
///
/// # Usage
///
/// ```rust
/// use towtruck_events::bus::{event_types, DispatchEvent, EventBus};
///
/// let bus = EventBus::default();
/// let mut rx = bus.subscribe();
///
/// bus.publish(DispatchEvent::new(event_types::ACCIDENT_ASSIGNED).with_accident(7));
/// ```
pub struct EventBus {
    sender: broadcast::Sender<DispatchEvent>,
}

impl EventBus {
    /// Create a bus with a specific channel capacity.
    ///
    /// When the buffer is full the oldest un-consumed messages are dropped
    /// and slow receivers observe `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all current subscribers.
    ///
    /// With no subscribers the event is dropped.
    pub fn publish(&self, event: DispatchEvent) {
        // SendError only means there are zero receivers.
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DispatchEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
