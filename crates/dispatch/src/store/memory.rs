//! In-memory [`DispatchStore`] for tests and local runs.
//!
//! Writes can be made to fail on demand so rollback paths can be driven
//! without a database.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Utc;
use towtruck_core::accident::{Accident, AccidentStatus};
use towtruck_core::driver::{Driver, UserKind};
use towtruck_core::error::CoreError;
use towtruck_core::station::Station;
use towtruck_core::types::DbId;

use super::DispatchStore;

#[derive(Default)]
struct Tables {
    next_id: DbId,
    stations: BTreeMap<DbId, Station>,
    accidents: BTreeMap<DbId, Accident>,
    drivers: BTreeMap<DbId, Driver>,
}

impl Tables {
    fn allocate_id(&mut self) -> DbId {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    failing_accident_saves: AtomicU32,
    failing_driver_saves: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn tables(&self) -> MutexGuard<'_, Tables> {
        self.tables.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_station(&self, name: &str, location: &str) -> Station {
        let mut tables = self.tables();
        let station = Station {
            id: tables.allocate_id(),
            name: name.to_string(),
            location: location.to_string(),
        };
        tables.stations.insert(station.id, station.clone());
        station
    }

    /// Create an off-duty driver account, optionally attached to a station.
    pub fn add_driver(&self, username: &str, station_id: Option<DbId>) -> Driver {
        self.add_account(username, UserKind::Driver, station_id)
    }

    pub fn add_account(&self, username: &str, kind: UserKind, station_id: Option<DbId>) -> Driver {
        let mut tables = self.tables();
        let driver = Driver {
            id: tables.allocate_id(),
            username: username.to_string(),
            kind,
            station_id,
            on_duty: false,
        };
        tables.drivers.insert(driver.id, driver.clone());
        driver
    }

    /// Insert a freshly reported, unassigned accident.
    pub fn report_accident(&self, station_id: DbId, reported_by: DbId, description: &str) -> Accident {
        let mut tables = self.tables();
        let accident = Accident {
            id: tables.allocate_id(),
            reported_by,
            description: description.to_string(),
            location: String::new(),
            station_id,
            assigned_to: None,
            date_reported: Utc::now(),
            date_assigned: None,
            status: AccidentStatus::Reported,
        };
        tables.accidents.insert(accident.id, accident.clone());
        accident
    }

    /// Overwrite or insert an accident row as-is.
    pub fn put_accident(&self, accident: Accident) {
        self.tables().accidents.insert(accident.id, accident);
    }

    /// Overwrite or insert a driver row as-is.
    pub fn put_driver(&self, driver: Driver) {
        self.tables().drivers.insert(driver.id, driver);
    }

    /// Remove an accident row behind the dispatcher's back.
    pub fn drop_accident(&self, accident_id: DbId) -> Option<Accident> {
        self.tables().accidents.remove(&accident_id)
    }

    /// Remove a driver row behind the dispatcher's back.
    pub fn drop_driver(&self, driver_id: DbId) -> Option<Driver> {
        self.tables().drivers.remove(&driver_id)
    }

    pub fn accident(&self, accident_id: DbId) -> Option<Accident> {
        self.tables().accidents.get(&accident_id).cloned()
    }

    pub fn driver(&self, driver_id: DbId) -> Option<Driver> {
        self.tables().drivers.get(&driver_id).cloned()
    }

    /// Make the next `n` accident writes fail with a persistence error.
    pub fn fail_accident_saves(&self, n: u32) {
        self.failing_accident_saves.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` driver writes fail with a persistence error.
    pub fn fail_driver_saves(&self, n: u32) {
        self.failing_driver_saves.store(n, Ordering::SeqCst);
    }

    fn injected_failure(counter: &AtomicU32, what: &str) -> Result<(), CoreError> {
        let tripped = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            return Err(CoreError::Persistence(format!("injected {what} write failure")));
        }
        Ok(())
    }
}

#[async_trait]
impl DispatchStore for MemoryStore {
    async fn load_station(&self, station_id: DbId) -> Result<Station, CoreError> {
        self.tables()
            .stations
            .get(&station_id)
            .cloned()
            .ok_or(CoreError::NotFound {
                entity: "Station",
                id: station_id,
            })
    }

    async fn list_stations(&self) -> Result<Vec<Station>, CoreError> {
        Ok(self.tables().stations.values().cloned().collect())
    }

    async fn delete_station(&self, station_id: DbId) -> Result<(), CoreError> {
        let mut tables = self.tables();
        if tables.stations.remove(&station_id).is_none() {
            return Err(CoreError::NotFound {
                entity: "Station",
                id: station_id,
            });
        }
        for driver in tables.drivers.values_mut() {
            if driver.station_id == Some(station_id) {
                driver.station_id = None;
            }
        }
        tables.accidents.retain(|_, accident| accident.station_id != station_id);
        Ok(())
    }

    async fn load_accident(&self, accident_id: DbId) -> Result<Accident, CoreError> {
        self.accident(accident_id).ok_or(CoreError::NotFound {
            entity: "Accident",
            id: accident_id,
        })
    }

    async fn save_accident(&self, accident: &Accident) -> Result<(), CoreError> {
        Self::injected_failure(&self.failing_accident_saves, "accident")?;
        let mut tables = self.tables();
        let slot = tables
            .accidents
            .get_mut(&accident.id)
            .ok_or(CoreError::NotFound {
                entity: "Accident",
                id: accident.id,
            })?;
        *slot = accident.clone();
        Ok(())
    }

    async fn delete_accident(&self, accident_id: DbId) -> Result<(), CoreError> {
        self.tables()
            .accidents
            .remove(&accident_id)
            .map(|_| ())
            .ok_or(CoreError::NotFound {
                entity: "Accident",
                id: accident_id,
            })
    }

    async fn list_backlog(&self, station_id: DbId) -> Result<Vec<Accident>, CoreError> {
        let mut backlog: Vec<Accident> = self
            .tables()
            .accidents
            .values()
            .filter(|a| a.station_id == station_id && a.is_queueable())
            .cloned()
            .collect();
        backlog.sort_by_key(|a| (a.date_reported, a.id));
        Ok(backlog)
    }

    async fn load_driver(&self, driver_id: DbId) -> Result<Driver, CoreError> {
        self.driver(driver_id).ok_or(CoreError::NotFound {
            entity: "Driver",
            id: driver_id,
        })
    }

    async fn save_driver(&self, driver: &Driver) -> Result<(), CoreError> {
        Self::injected_failure(&self.failing_driver_saves, "driver")?;
        let mut tables = self.tables();
        let slot = tables
            .drivers
            .get_mut(&driver.id)
            .ok_or(CoreError::NotFound {
                entity: "Driver",
                id: driver.id,
            })?;
        slot.station_id = driver.station_id;
        slot.on_duty = driver.on_duty;
        Ok(())
    }

    async fn list_station_drivers(&self, station_id: DbId) -> Result<Vec<Driver>, CoreError> {
        Ok(self
            .tables()
            .drivers
            .values()
            .filter(|d| d.kind == UserKind::Driver && d.station_id == Some(station_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn backlog_is_oldest_first_and_skips_assigned() {
        let store = MemoryStore::new();
        let station = store.add_station("North", "");
        let first = store.report_accident(station.id, 1, "first");
        let mut taken = store.report_accident(station.id, 1, "taken");
        let last = store.report_accident(station.id, 1, "last");
        taken.assign(99, Utc::now());
        store.put_accident(taken);

        let ids: Vec<DbId> = store
            .list_backlog(station.id)
            .await
            .unwrap()
            .into_iter()
            .map(|a| a.id)
            .collect();
        assert_eq!(ids, vec![first.id, last.id]);
    }

    #[tokio::test]
    async fn injected_failures_are_consumed() {
        let store = MemoryStore::new();
        let station = store.add_station("North", "");
        let mut driver = store.add_driver("dave", Some(station.id));
        driver.on_duty = true;

        store.fail_driver_saves(1);
        assert_matches!(store.save_driver(&driver).await, Err(CoreError::Persistence(_)));
        assert!(store.save_driver(&driver).await.is_ok());
        assert!(store.driver(driver.id).unwrap().on_duty);
    }

    #[tokio::test]
    async fn deleting_station_detaches_drivers_and_drops_history() {
        let store = MemoryStore::new();
        let station = store.add_station("North", "");
        let other = store.add_station("South", "");
        let driver = store.add_driver("dave", Some(station.id));
        let mut closed = store.report_accident(station.id, 1, "closed");
        closed.status = AccidentStatus::Completed;
        store.put_accident(closed.clone());
        let elsewhere = store.report_accident(other.id, 1, "elsewhere");

        store.delete_station(station.id).await.unwrap();

        assert_eq!(store.driver(driver.id).unwrap().station_id, None);
        assert_eq!(store.accident(closed.id), None);
        assert!(store.accident(elsewhere.id).is_some());
        assert_matches!(
            store.load_station(station.id).await,
            Err(CoreError::NotFound { entity: "Station", .. })
        );
    }
}
