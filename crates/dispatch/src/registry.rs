//! Per-station dispatch state.
//!
//! Each station owns a [`StationQueue`] and a [`DriverPool`] behind one
//! `tokio::sync::Mutex`, so dequeuing an accident, taking a driver and
//! committing the pair happen inside a single critical section. Stations
//! never share a lock: work at one station does not wait on another.
//!
//! Two global indexes sit next to the station map:
//!
//! - `accident -> station` for every accident that is queued or in the
//!   middle of a commit. An accident appears here at most once, which is
//!   what keeps it out of two queues at the same time.
//! - `driver -> station` for every driver in some pool.
//!
//! Both indexes are plain `std::sync::Mutex` maps, locked only for
//! single lookups or inserts and never across an `.await`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};

use serde::Serialize;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use towtruck_core::driver_pool::DriverPool;
use towtruck_core::error::CoreError;
use towtruck_core::station_queue::StationQueue;
use towtruck_core::types::DbId;

struct StationState {
    queue: StationQueue,
    pool: DriverPool,
    /// Set when the station is removed; holders of a stale handle must not
    /// keep mutating it.
    retired: bool,
}

impl StationState {
    fn new(station_id: DbId) -> Self {
        Self {
            queue: StationQueue::new(),
            pool: DriverPool::new(station_id),
            retired: false,
        }
    }
}

/// Point-in-time view of one station.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StationSnapshot {
    pub station_id: DbId,
    /// Queued accidents, head first.
    pub queued: Vec<DbId>,
    pub available: Vec<DbId>,
    pub on_duty: Vec<DbId>,
}

#[derive(Default)]
pub struct StationRegistry {
    stations: RwLock<HashMap<DbId, Arc<AsyncMutex<StationState>>>>,
    accident_index: Mutex<HashMap<DbId, DbId>>,
    driver_index: Mutex<HashMap<DbId, DbId>>,
}

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Report a broken internal invariant. Panics in debug builds; in release
/// builds the operation is rejected and the condition logged.
fn invariant_violation(message: String) -> CoreError {
    tracing::error!(%message, "Dispatch invariant violated");
    debug_assert!(false, "{message}");
    CoreError::Internal(message)
}

impl StationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    // -- station lifecycle --------------------------------------------------

    /// Start tracking a station. Returns `false` if it was already tracked.
    pub fn register(&self, station_id: DbId) -> bool {
        let mut stations = self.stations.write().unwrap_or_else(PoisonError::into_inner);
        if stations.contains_key(&station_id) {
            return false;
        }
        stations.insert(station_id, Arc::new(AsyncMutex::new(StationState::new(station_id))));
        true
    }

    pub fn contains(&self, station_id: DbId) -> bool {
        self.stations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&station_id)
    }

    /// Stop tracking a station.
    ///
    /// Fails with [`CoreError::Conflict`] while accidents are queued there or
    /// any of its drivers is on duty. Idle drivers are detached.
    pub async fn retire(&self, station_id: DbId) -> Result<Vec<DbId>, CoreError> {
        let mut station = self.lock(station_id).await?;

        if !station.state.queue.is_empty() {
            return Err(CoreError::Conflict(format!(
                "station {station_id} still has {} queued accidents",
                station.state.queue.len()
            )));
        }
        let on_duty = station.state.pool.on_duty();
        if !on_duty.is_empty() {
            return Err(CoreError::Conflict(format!(
                "station {station_id} still has drivers on duty: {on_duty:?}"
            )));
        }

        let detached = station.state.pool.available();
        {
            let mut drivers = guard(&self.driver_index);
            for driver_id in &detached {
                drivers.remove(driver_id);
            }
        }
        station.state.retired = true;
        drop(station);

        self.stations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&station_id);
        Ok(detached)
    }

    // -- locking ------------------------------------------------------------

    /// Acquire a station's lock.
    pub async fn lock(&self, station_id: DbId) -> Result<StationGuard<'_>, CoreError> {
        let not_found = CoreError::NotFound {
            entity: "Station",
            id: station_id,
        };
        let handle = self
            .stations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&station_id)
            .cloned()
            .ok_or_else(|| not_found.clone())?;

        let state = handle.lock_owned().await;
        if state.retired {
            return Err(not_found);
        }
        Ok(StationGuard {
            station_id,
            state,
            registry: self,
        })
    }

    // -- lookups --------------------------------------------------------------

    /// Station an accident is queued (or being committed) at.
    pub fn station_of_accident(&self, accident_id: DbId) -> Option<DbId> {
        guard(&self.accident_index).get(&accident_id).copied()
    }

    /// Station whose pool a driver belongs to.
    pub fn station_of_driver(&self, driver_id: DbId) -> Option<DbId> {
        guard(&self.driver_index).get(&driver_id).copied()
    }

    pub async fn snapshot(&self, station_id: DbId) -> Result<StationSnapshot, CoreError> {
        Ok(self.lock(station_id).await?.snapshot())
    }

    // -- queue operations ---------------------------------------------------

    pub async fn enqueue(&self, station_id: DbId, accident_id: DbId) -> Result<(), CoreError> {
        self.lock(station_id).await?.enqueue(accident_id)
    }

    pub async fn dequeue_next(&self, station_id: DbId) -> Result<Option<DbId>, CoreError> {
        Ok(self.lock(station_id).await?.dequeue_next())
    }

    /// Remove an accident from whichever queue holds it.
    /// Returns `false` if it was not queued anywhere.
    pub async fn remove(&self, accident_id: DbId) -> Result<bool, CoreError> {
        let Some(station_id) = self.station_of_accident(accident_id) else {
            return Ok(false);
        };
        Ok(self.lock(station_id).await?.remove(accident_id))
    }

    // -- driver operations --------------------------------------------------

    /// Make a driver available at `station_id`, detaching it from any other
    /// station first. Returns `Ok(false)` if it was already available here.
    pub async fn mark_available(&self, station_id: DbId, driver_id: DbId) -> Result<bool, CoreError> {
        self.withdraw_elsewhere(station_id, driver_id).await?;
        self.lock(station_id).await?.mark_available(driver_id)
    }

    pub async fn take_any(&self, station_id: DbId) -> Result<Option<DbId>, CoreError> {
        Ok(self.lock(station_id).await?.take_any())
    }

    pub async fn release(&self, station_id: DbId, driver_id: DbId) -> Result<(), CoreError> {
        self.lock(station_id).await?.release(driver_id)
    }

    /// Detach an off-duty driver from whatever station other than
    /// `station_id` currently holds it. Returns the station it left.
    ///
    /// Fails with [`CoreError::AlreadyOnDuty`] if the driver is working an
    /// accident at that station.
    pub async fn withdraw_elsewhere(
        &self,
        station_id: DbId,
        driver_id: DbId,
    ) -> Result<Option<DbId>, CoreError> {
        let Some(previous) = self.station_of_driver(driver_id).filter(|&s| s != station_id) else {
            return Ok(None);
        };
        match self.lock(previous).await {
            Ok(mut old) => old.withdraw(driver_id)?,
            // Retired in the meantime; the index entry is already gone.
            Err(CoreError::NotFound { .. }) => {}
            Err(e) => return Err(e),
        }
        Ok(Some(previous))
    }
}

/// Exclusive access to one station's queue and pool.
///
/// Every method keeps the global indexes in step with the station state.
pub struct StationGuard<'a> {
    station_id: DbId,
    state: OwnedMutexGuard<StationState>,
    registry: &'a StationRegistry,
}

impl std::fmt::Debug for StationGuard<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StationGuard")
            .field("station_id", &self.station_id)
            .finish_non_exhaustive()
    }
}

impl StationGuard<'_> {
    pub fn station_id(&self) -> DbId {
        self.station_id
    }

    /// Both a queued accident and an available driver exist.
    pub fn has_work(&self) -> bool {
        !self.state.queue.is_empty() && self.state.pool.has_available()
    }

    pub fn queue_len(&self) -> usize {
        self.state.queue.len()
    }

    /// Whether the accident is waiting in this station's queue.
    pub fn is_queued(&self, accident_id: DbId) -> bool {
        self.state.queue.contains(accident_id)
    }

    pub fn snapshot(&self) -> StationSnapshot {
        StationSnapshot {
            station_id: self.station_id,
            queued: self.state.queue.snapshot(),
            available: self.state.pool.available(),
            on_duty: self.state.pool.on_duty(),
        }
    }

    // -- queue ----------------------------------------------------------------

    /// Append an accident to this station's queue.
    ///
    /// Fails with [`CoreError::DuplicateEntry`] if the accident is queued or
    /// being committed at any station.
    pub fn enqueue(&mut self, accident_id: DbId) -> Result<(), CoreError> {
        let mut index = guard(&self.registry.accident_index);
        if index.contains_key(&accident_id) {
            return Err(CoreError::DuplicateEntry { accident_id });
        }
        if self.state.queue.enqueue(accident_id).is_err() {
            return Err(invariant_violation(format!(
                "accident {accident_id} queued at station {} but missing from the index",
                self.station_id
            )));
        }
        index.insert(accident_id, self.station_id);
        Ok(())
    }

    /// Pop the head accident and forget it entirely.
    pub fn dequeue_next(&mut self) -> Option<DbId> {
        let accident_id = self.claim_next()?;
        self.settle(accident_id);
        Some(accident_id)
    }

    /// Pop the head accident but keep it indexed, so it cannot be queued
    /// anywhere else until [`settle`](Self::settle) or
    /// [`unclaim`](Self::unclaim).
    pub fn claim_next(&mut self) -> Option<DbId> {
        self.state.queue.dequeue_next()
    }

    /// Finish a claim: the accident leaves the index.
    pub fn settle(&mut self, accident_id: DbId) {
        guard(&self.registry.accident_index).remove(&accident_id);
    }

    /// Undo a claim: the accident returns to the head of the queue.
    pub fn unclaim(&mut self, accident_id: DbId) -> Result<(), CoreError> {
        let indexed = guard(&self.registry.accident_index).get(&accident_id).copied();
        if indexed != Some(self.station_id) {
            return Err(invariant_violation(format!(
                "claimed accident {accident_id} is indexed at {indexed:?}, expected station {}",
                self.station_id
            )));
        }
        self.state
            .queue
            .requeue_front(accident_id)
            .map_err(|_| invariant_violation(format!("claimed accident {accident_id} is still queued")))
    }

    /// Remove a queued accident. Returns `false` if it was not queued here.
    pub fn remove(&mut self, accident_id: DbId) -> bool {
        if !self.state.queue.remove(accident_id) {
            return false;
        }
        self.settle(accident_id);
        true
    }

    // -- pool -----------------------------------------------------------------

    /// Add a driver to this station's available set.
    ///
    /// The driver must not belong to another station; use
    /// [`StationRegistry::withdraw_elsewhere`] first when re-homing.
    pub fn mark_available(&mut self, driver_id: DbId) -> Result<bool, CoreError> {
        let mut index = guard(&self.registry.driver_index);
        if let Some(&other) = index.get(&driver_id) {
            if other != self.station_id {
                return Err(CoreError::Conflict(format!(
                    "driver {driver_id} is still registered to station {other}"
                )));
            }
        }
        let added = self.state.pool.mark_available(driver_id)?;
        index.insert(driver_id, self.station_id);
        Ok(added)
    }

    /// Record a driver already working an accident at this station.
    pub fn mark_on_duty(&mut self, driver_id: DbId) -> Result<(), CoreError> {
        let mut index = guard(&self.registry.driver_index);
        if let Some(&other) = index.get(&driver_id) {
            if other != self.station_id {
                return Err(CoreError::Conflict(format!(
                    "driver {driver_id} is still registered to station {other}"
                )));
            }
        }
        self.state.pool.mark_on_duty(driver_id);
        index.insert(driver_id, self.station_id);
        Ok(())
    }

    /// Take the lowest-id available driver and put it on duty.
    pub fn take_any(&mut self) -> Option<DbId> {
        self.state.pool.take_any()
    }

    /// Return an on-duty driver to the available set.
    pub fn release(&mut self, driver_id: DbId) -> Result<(), CoreError> {
        self.state.pool.release(driver_id)
    }

    /// Detach an off-duty driver from this station.
    pub fn withdraw(&mut self, driver_id: DbId) -> Result<(), CoreError> {
        self.state.pool.withdraw(driver_id)?;
        self.drop_index_entry(driver_id);
        Ok(())
    }

    /// Drop a driver whatever its duty state. Returns whether it was known.
    pub fn forget_driver(&mut self, driver_id: DbId) -> bool {
        let known = self.state.pool.forget(driver_id);
        self.drop_index_entry(driver_id);
        known
    }

    fn drop_index_entry(&self, driver_id: DbId) {
        let mut index = guard(&self.registry.driver_index);
        if index.get(&driver_id) == Some(&self.station_id) {
            index.remove(&driver_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn registry_with(stations: &[DbId]) -> StationRegistry {
        let registry = StationRegistry::new();
        for &id in stations {
            registry.register(id);
        }
        registry
    }

    #[tokio::test]
    async fn accident_cannot_sit_in_two_queues() {
        let registry = registry_with(&[1, 2]);
        registry.enqueue(1, 10).await.unwrap();

        assert_matches!(
            registry.enqueue(2, 10).await,
            Err(CoreError::DuplicateEntry { accident_id: 10 })
        );
        assert_matches!(
            registry.enqueue(1, 10).await,
            Err(CoreError::DuplicateEntry { accident_id: 10 })
        );
        assert_eq!(registry.station_of_accident(10), Some(1));
    }

    #[tokio::test]
    async fn dequeue_is_fifo_and_clears_index() {
        let registry = registry_with(&[1]);
        for id in [3, 1, 2] {
            registry.enqueue(1, id).await.unwrap();
        }

        assert_eq!(registry.dequeue_next(1).await.unwrap(), Some(3));
        assert_eq!(registry.station_of_accident(3), None);
        assert_eq!(registry.dequeue_next(1).await.unwrap(), Some(1));
        assert_eq!(registry.dequeue_next(1).await.unwrap(), Some(2));
        assert_eq!(registry.dequeue_next(1).await.unwrap(), None);
    }

    #[tokio::test]
    async fn claimed_accident_blocks_requeue_elsewhere() {
        let registry = registry_with(&[1, 2]);
        registry.enqueue(1, 10).await.unwrap();

        let mut station = registry.lock(1).await.unwrap();
        assert_eq!(station.claim_next(), Some(10));
        drop(station);

        assert_matches!(registry.enqueue(2, 10).await, Err(CoreError::DuplicateEntry { .. }));

        let mut station = registry.lock(1).await.unwrap();
        station.unclaim(10).unwrap();
        assert_eq!(station.snapshot().queued, vec![10]);
    }

    #[tokio::test]
    async fn remove_finds_the_owning_station() {
        let registry = registry_with(&[1, 2]);
        registry.enqueue(2, 7).await.unwrap();

        assert!(registry.remove(7).await.unwrap());
        assert!(!registry.remove(7).await.unwrap());
        assert_eq!(registry.snapshot(2).await.unwrap().queued, Vec::<DbId>::new());
    }

    #[tokio::test]
    async fn unknown_station_is_not_found() {
        let registry = registry_with(&[1]);
        assert_matches!(
            registry.enqueue(9, 1).await,
            Err(CoreError::NotFound { entity: "Station", id: 9 })
        );
    }

    #[tokio::test]
    async fn re_homing_moves_an_idle_driver() {
        let registry = registry_with(&[1, 2]);
        registry.mark_available(1, 5).await.unwrap();

        assert_eq!(registry.mark_available(2, 5).await, Ok(true));

        assert_eq!(registry.station_of_driver(5), Some(2));
        assert!(registry.snapshot(1).await.unwrap().available.is_empty());
        assert_eq!(registry.snapshot(2).await.unwrap().available, vec![5]);
    }

    #[tokio::test]
    async fn re_homing_an_on_duty_driver_fails() {
        let registry = registry_with(&[1, 2]);
        registry.mark_available(1, 5).await.unwrap();
        assert_eq!(registry.take_any(1).await.unwrap(), Some(5));

        assert_matches!(
            registry.mark_available(2, 5).await,
            Err(CoreError::AlreadyOnDuty { driver_id: 5 })
        );
        assert_eq!(registry.station_of_driver(5), Some(1));
    }

    #[tokio::test]
    async fn release_of_foreign_driver_is_rejected() {
        let registry = registry_with(&[1, 2]);
        registry.mark_available(1, 5).await.unwrap();

        assert_matches!(
            registry.release(2, 5).await,
            Err(CoreError::NotRegistered { driver_id: 5, station_id: 2 })
        );
    }

    #[tokio::test]
    async fn retire_requires_idle_station() {
        let registry = registry_with(&[1]);
        registry.enqueue(1, 10).await.unwrap();
        registry.mark_available(1, 5).await.unwrap();

        assert_matches!(registry.retire(1).await, Err(CoreError::Conflict(_)));

        registry.remove(10).await.unwrap();
        assert_eq!(registry.retire(1).await.unwrap(), vec![5]);
        assert!(!registry.contains(1));
        assert_eq!(registry.station_of_driver(5), None);
        assert_matches!(registry.lock(1).await, Err(CoreError::NotFound { .. }));
    }

    #[tokio::test]
    async fn stations_do_not_block_each_other() {
        let registry = registry_with(&[1, 2]);
        let _held = registry.lock(1).await.unwrap();

        let other = tokio::time::timeout(std::time::Duration::from_millis(100), registry.lock(2)).await;
        assert!(other.is_ok(), "station 2 should not wait on station 1");
    }
}
