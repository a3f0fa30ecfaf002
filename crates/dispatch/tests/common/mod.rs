#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use towtruck_core::types::DbId;
use towtruck_dispatch::{DispatchConfig, DispatchService, MemoryStore};
use towtruck_events::EventBus;

/// Short retry budget so failure paths finish quickly.
pub fn test_config() -> DispatchConfig {
    DispatchConfig {
        commit_retries: 1,
        retry_backoff: Duration::from_millis(1),
        commit_timeout: Duration::from_millis(500),
    }
}

/// A dispatch service over an in-memory store.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub events: Arc<EventBus>,
    pub service: DispatchService,
    hq: DbId,
}

pub fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    let events = Arc::new(EventBus::default());
    let service = DispatchService::new(store.clone(), events.clone(), test_config());
    let hq = store
        .add_account("hq", towtruck_core::driver::UserKind::HqEmployee, None)
        .id;
    Harness {
        store,
        events,
        service,
        hq,
    }
}

impl Harness {
    /// Create a station in the store and start dispatching for it.
    pub async fn station(&self, name: &str) -> DbId {
        let id = self.store.add_station(name, "Depot Rd").id;
        self.service.register_station(id).await.unwrap();
        id
    }

    /// Create an off-duty driver account with no station.
    pub fn driver(&self, username: &str) -> DbId {
        self.store.add_driver(username, None).id
    }

    /// Create a reported accident in the store without queueing it.
    pub fn accident(&self, station_id: DbId) -> DbId {
        self.store
            .report_accident(station_id, self.hq, "collision")
            .id
    }

    pub fn assigned_to(&self, accident_id: DbId) -> Option<DbId> {
        self.store.accident(accident_id).and_then(|a| a.assigned_to)
    }

    pub fn on_duty(&self, driver_id: DbId) -> bool {
        self.store.driver(driver_id).is_some_and(|d| d.on_duty)
    }
}
