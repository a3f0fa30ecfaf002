//! Rebuilding dispatch state from the store and removing stations.

mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, Utc};
use towtruck_core::accident::AccidentStatus;
use towtruck_core::error::CoreError;
use towtruck_dispatch::{DispatchService, MemoryStore, RecoveryReport};
use towtruck_events::EventBus;

use common::{harness, test_config};

#[tokio::test]
async fn recover_rebuilds_queues_oldest_first_and_matches() {
    let store = Arc::new(MemoryStore::new());
    let north = store.add_station("North", "").id;
    let south = store.add_station("South", "").id;

    let mut newer = store.report_accident(north, 0, "newer");
    let mut older = store.report_accident(north, 0, "older");
    older.date_reported = Utc::now() - Duration::minutes(30);
    newer.date_reported = Utc::now() - Duration::minutes(5);
    store.put_accident(older.clone());
    store.put_accident(newer.clone());
    let closed = {
        let mut a = store.report_accident(north, 0, "closed");
        a.status = AccidentStatus::Completed;
        store.put_accident(a.clone());
        a
    };

    let busy = {
        let mut d = store.add_driver("busy", Some(north));
        d.on_duty = true;
        store.put_driver(d.clone());
        d
    };
    let idle = store.add_driver("idle", Some(north));
    let elsewhere = store.add_driver("elsewhere", Some(south));

    let service = DispatchService::new(store.clone(), Arc::new(EventBus::default()), test_config());
    let report = service.recover().await.unwrap();

    assert_eq!(
        report,
        RecoveryReport {
            stations: 2,
            queued: 2,
            available: 2,
            on_duty: 1,
            assignments: 1,
        }
    );
    assert_eq!(store.accident(older.id).unwrap().assigned_to, Some(idle.id));
    assert_eq!(store.accident(newer.id).unwrap().assigned_to, None);
    assert_eq!(store.accident(closed.id).unwrap().assigned_to, None);

    let snapshot = service.station_snapshot(north).await.unwrap();
    assert_eq!(snapshot.queued, vec![newer.id]);
    assert_eq!(snapshot.on_duty, vec![busy.id.min(idle.id), busy.id.max(idle.id)]);
    assert_eq!(service.station_snapshot(south).await.unwrap().available, vec![elsewhere.id]);
}

#[tokio::test]
async fn recover_skips_hq_accounts() {
    let store = Arc::new(MemoryStore::new());
    let station = store.add_station("North", "").id;
    store.add_account("boss", towtruck_core::driver::UserKind::HqEmployee, Some(station));

    let service = DispatchService::new(store.clone(), Arc::new(EventBus::default()), test_config());
    let report = service.recover().await.unwrap();

    assert_eq!(report.available, 0);
    assert!(service.station_snapshot(station).await.unwrap().available.is_empty());
}

#[tokio::test]
async fn busy_station_cannot_be_removed() {
    let h = harness();
    let station = h.station("North").await;
    let accident = h.accident(station);
    h.service.on_accident_reported(station, accident).await.unwrap();

    assert_matches!(h.service.remove_station(station).await, Err(CoreError::Conflict(_)));
    assert!(h.service.registry().contains(station));
}

#[tokio::test]
async fn station_with_driver_on_duty_cannot_be_removed() {
    let h = harness();
    let station = h.station("North").await;
    h.service.on_driver_registered(station, h.driver("dave")).await.unwrap();
    h.service.on_accident_reported(station, h.accident(station)).await.unwrap();

    assert_matches!(h.service.remove_station(station).await, Err(CoreError::Conflict(_)));
}

#[tokio::test]
async fn idle_station_is_removed_and_drivers_detached() {
    let h = harness();
    let station = h.station("North").await;
    let driver = h.driver("dave");
    h.service.on_driver_registered(station, driver).await.unwrap();

    h.service.remove_station(station).await.unwrap();

    assert!(!h.service.registry().contains(station));
    assert_eq!(h.service.registry().station_of_driver(driver), None);
    assert_eq!(h.store.driver(driver).unwrap().station_id, None);
    assert_matches!(
        h.service.station_snapshot(station).await,
        Err(CoreError::NotFound { entity: "Station", .. })
    );

    // The detached driver can join another station.
    let other = h.station("South").await;
    h.service.on_driver_registered(other, driver).await.unwrap();
    assert_eq!(h.service.station_snapshot(other).await.unwrap().available, vec![driver]);
}

#[tokio::test]
async fn registering_an_unknown_station_fails() {
    let h = harness();
    assert_matches!(
        h.service.register_station(77).await,
        Err(CoreError::NotFound { entity: "Station", id: 77 })
    );
}

#[tokio::test]
async fn station_with_only_closed_accidents_is_removed_with_its_history() {
    let h = harness();
    let station = h.station("North").await;
    let driver = h.driver("dave");
    h.service.on_driver_registered(station, driver).await.unwrap();
    let accident = h.accident(station);
    h.service.on_accident_reported(station, accident).await.unwrap();
    h.service
        .on_status_changed(accident, AccidentStatus::Completed)
        .await
        .unwrap();

    h.service.remove_station(station).await.unwrap();

    assert_eq!(h.store.accident(accident), None);
    assert_eq!(h.store.driver(driver).unwrap().station_id, None);
}
