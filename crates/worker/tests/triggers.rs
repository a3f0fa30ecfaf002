//! Trigger payloads applied to an in-memory dispatch service.

use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use towtruck_core::driver::UserKind;
use towtruck_core::error::CoreError;
use towtruck_dispatch::{DispatchConfig, DispatchService, MemoryStore};
use towtruck_events::EventBus;
use towtruck_worker::trigger::{handle_payload, TriggerError};

fn service() -> (Arc<MemoryStore>, DispatchService) {
    let store = Arc::new(MemoryStore::new());
    let config = DispatchConfig {
        commit_retries: 0,
        retry_backoff: Duration::from_millis(1),
        commit_timeout: Duration::from_millis(500),
    };
    let service = DispatchService::new(store.clone(), Arc::new(EventBus::default()), config);
    (store, service)
}

#[tokio::test]
async fn trigger_sequence_drives_a_full_dispatch() {
    let (store, service) = service();
    let station = store.add_station("North", "Depot Rd").id;
    let hq = store.add_account("hq", UserKind::HqEmployee, None).id;
    let driver = store.add_driver("dave", None).id;
    let accident = store.report_accident(station, hq, "jackknifed trailer").id;

    let created = format!(r#"{{"kind":"station_created","station_id":{station}}}"#);
    assert_matches!(handle_payload(&service, &created).await, Ok(None));

    let reported = format!(r#"{{"kind":"accident_reported","station_id":{station},"accident_id":{accident}}}"#);
    assert_matches!(handle_payload(&service, &reported).await, Ok(None));

    let registered = format!(r#"{{"kind":"driver_registered","station_id":{station},"driver_id":{driver}}}"#);
    let assignment = handle_payload(&service, &registered).await.unwrap().unwrap();
    assert_eq!((assignment.accident_id, assignment.driver_id), (accident, driver));

    for status in ["ON_THE_WAY", "PICKED_UP", "COMPLETED"] {
        let changed = format!(r#"{{"kind":"status_changed","accident_id":{accident},"status":"{status}"}}"#);
        handle_payload(&service, &changed).await.unwrap();
    }
    assert!(!store.driver(driver).unwrap().on_duty);

    let removed = format!(r#"{{"kind":"station_removed","station_id":{station}}}"#);
    assert_matches!(handle_payload(&service, &removed).await, Ok(None));
    assert!(!service.registry().contains(station));
}

#[tokio::test]
async fn rejected_trigger_surfaces_the_dispatch_error() {
    let (store, service) = service();
    let station = store.add_station("North", "").id;
    service.register_station(station).await.unwrap();

    let payload = r#"{"kind":"accident_reported","station_id":1,"accident_id":404}"#;
    assert_matches!(
        handle_payload(&service, payload).await,
        Err(TriggerError::Dispatch(CoreError::NotFound { entity: "Accident", id: 404 }))
    );
}

#[tokio::test]
async fn garbage_payload_is_malformed() {
    let (_, service) = service();
    assert_matches!(
        handle_payload(&service, "not json").await,
        Err(TriggerError::Malformed(_))
    );
}
