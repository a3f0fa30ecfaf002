//! Inbound dispatch triggers.
//!
//! [`DispatchService`] is the single entry point the trigger listener
//! talks to. Each operation resolves the owning station, takes that
//! station's lock, applies the change to the store and the in-memory
//! state, and runs the matcher before releasing the lock when the change
//! could have produced a new pairing.

use std::sync::Arc;

use serde::Serialize;
use towtruck_core::accident::{state_machine, Accident, AccidentStatus};
use towtruck_core::audit::{deleted, diff, FieldChange};
use towtruck_core::driver::Driver;
use towtruck_core::error::CoreError;
use towtruck_core::types::DbId;
use towtruck_events::bus::{event_types, DispatchEvent, EventBus};

use crate::config::DispatchConfig;
use crate::matcher::{Assignment, Matcher};
use crate::registry::{StationGuard, StationRegistry, StationSnapshot};
use crate::retry::{bounded, timed};
use crate::store::DispatchStore;

/// Result of a status update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusChange {
    /// The accident as stored after the update.
    pub accident: Accident,
    /// `false` when the accident already had the requested status.
    pub changed: bool,
    /// Driver returned to the available set by this update.
    pub released_driver: Option<DbId>,
    /// Pairing made with the freed driver.
    pub assignment: Option<Assignment>,
}

/// Counts from rebuilding in-memory state at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RecoveryReport {
    pub stations: usize,
    pub queued: usize,
    pub available: usize,
    pub on_duty: usize,
    pub assignments: usize,
}

pub struct DispatchService {
    registry: Arc<StationRegistry>,
    matcher: Matcher,
    store: Arc<dyn DispatchStore>,
    events: Arc<EventBus>,
    config: DispatchConfig,
}

impl DispatchService {
    pub fn new(store: Arc<dyn DispatchStore>, events: Arc<EventBus>, config: DispatchConfig) -> Self {
        let registry = Arc::new(StationRegistry::new());
        let matcher = Matcher::new(registry.clone(), store.clone(), events.clone(), config.clone());
        Self {
            registry,
            matcher,
            store,
            events,
            config,
        }
    }

    pub fn registry(&self) -> &StationRegistry {
        &self.registry
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    // -----------------------------------------------------------------------
    // Stations
    // -----------------------------------------------------------------------

    /// Start dispatching for a station that exists in the store.
    pub async fn register_station(&self, station_id: DbId) -> Result<bool, CoreError> {
        self.store.load_station(station_id).await?;
        let added = self.registry.register(station_id);
        if added {
            tracing::info!(station_id, "Station registered");
        }
        Ok(added)
    }

    /// Stop dispatching for a station and delete it.
    ///
    /// Rejected with [`CoreError::Conflict`] while accidents are queued
    /// there or any of its drivers is on duty.
    pub async fn remove_station(&self, station_id: DbId) -> Result<(), CoreError> {
        let detached = self.registry.retire(station_id).await?;
        if let Err(e) = bounded(&self.config, "delete_station", || self.store.delete_station(station_id)).await {
            // The station is still in the store; resume dispatching for it.
            self.registry.register(station_id);
            if let Ok(mut station) = self.registry.lock(station_id).await {
                for driver_id in detached {
                    if let Err(restore) = station.mark_available(driver_id) {
                        tracing::warn!(station_id, driver_id, error = %restore, "Could not restore driver");
                    }
                }
            }
            return Err(e);
        }
        tracing::info!(station_id, detached = detached.len(), "Station removed");
        Ok(())
    }

    pub async fn station_snapshot(&self, station_id: DbId) -> Result<StationSnapshot, CoreError> {
        self.registry.snapshot(station_id).await
    }

    // -----------------------------------------------------------------------
    // Accident reported
    // -----------------------------------------------------------------------

    /// Queue a newly reported accident at its station and try to match it.
    ///
    /// If the follow-up match fails to commit, the accident stays queued and
    /// the error is returned; [`Matcher::try_match`] retries it.
    pub async fn on_accident_reported(
        &self,
        station_id: DbId,
        accident_id: DbId,
    ) -> Result<Option<Assignment>, CoreError> {
        let accident = self.store.load_accident(accident_id).await?;
        if accident.station_id != station_id {
            return Err(CoreError::Validation(format!(
                "accident {accident_id} belongs to station {}, not {station_id}",
                accident.station_id
            )));
        }
        if !accident.is_queueable() {
            return Err(CoreError::Conflict(format!(
                "accident {accident_id} is {} and cannot be queued",
                if accident.assigned_to.is_some() {
                    "already assigned".to_string()
                } else {
                    accident.status.to_string()
                }
            )));
        }

        let mut station = self.registry.lock(station_id).await?;
        station.enqueue(accident_id)?;
        tracing::info!(
            station_id,
            accident_id,
            queue_len = station.queue_len(),
            "Accident queued",
        );
        self.matcher.match_locked(&mut station).await
    }

    // -----------------------------------------------------------------------
    // Driver registered
    // -----------------------------------------------------------------------

    /// Attach an off-duty driver to a station and try to match it.
    ///
    /// A driver registered elsewhere is moved. Registering an on-duty driver
    /// fails with [`CoreError::AlreadyOnDuty`].
    pub async fn on_driver_registered(
        &self,
        station_id: DbId,
        driver_id: DbId,
    ) -> Result<Option<Assignment>, CoreError> {
        if !self.registry.contains(station_id) {
            return Err(CoreError::NotFound {
                entity: "Station",
                id: station_id,
            });
        }

        let driver = self.store.load_driver(driver_id).await?;
        driver.ensure_dispatchable()?;
        if driver.on_duty {
            return Err(CoreError::AlreadyOnDuty { driver_id });
        }

        // Out of every pool from here on, so no station can match it while
        // the new link is written.
        let previous = self.registry.withdraw_elsewhere(station_id, driver_id).await?;

        let mut moved = driver.clone();
        moved.station_id = Some(station_id);
        if moved != driver {
            if let Err(e) = bounded(&self.config, "save_driver", || self.store.save_driver(&moved)).await {
                if let Some(previous) = previous {
                    self.restore_driver(previous, driver_id).await;
                }
                return Err(e);
            }
            self.events.publish(
                DispatchEvent::new(event_types::DRIVER_REGISTERED)
                    .with_station(station_id)
                    .with_driver(driver_id)
                    .with_changes(diff::<Driver>(&driver, &moved)),
            );
        }

        let mut station = self.registry.lock(station_id).await?;
        let added = station.mark_available(driver_id)?;
        tracing::info!(station_id, driver_id, added, from = ?previous, "Driver available");
        self.matcher.match_locked(&mut station).await
    }

    async fn restore_driver(&self, station_id: DbId, driver_id: DbId) {
        let restored = match self.registry.lock(station_id).await {
            Ok(mut station) => station.mark_available(driver_id).map(|_| ()),
            Err(e) => Err(e),
        };
        if let Err(e) = restored {
            tracing::warn!(station_id, driver_id, error = %e, "Could not return driver to its station");
        }
    }

    // -----------------------------------------------------------------------
    // Status changed
    // -----------------------------------------------------------------------

    /// Move an accident to `new_status`.
    ///
    /// Setting the status it already has is a no-op. Completing an accident
    /// frees its driver and immediately offers that driver to the queue.
    pub async fn on_status_changed(
        &self,
        accident_id: DbId,
        new_status: AccidentStatus,
    ) -> Result<StatusChange, CoreError> {
        let station_id = self.store.load_accident(accident_id).await?.station_id;
        let mut station = self.registry.lock(station_id).await?;
        // Re-read under the lock; a match may have landed in between.
        let accident = timed(&self.config, "load_accident", self.store.load_accident(accident_id)).await?;
        // Still waiting in the queue: any driver on the row is left over from
        // an aborted commit and does not count.
        let queued = station.is_queued(accident_id);

        if !state_machine::validate_transition(accident.status, new_status)? {
            tracing::debug!(accident_id, status = %new_status, "Status unchanged");
            let assignment = if new_status == AccidentStatus::Completed {
                self.matcher.match_locked(&mut station).await?
            } else {
                None
            };
            return Ok(StatusChange {
                accident,
                changed: false,
                released_driver: None,
                assignment,
            });
        }
        if state_machine::requires_driver(new_status) && (queued || accident.assigned_to.is_none()) {
            return Err(CoreError::Validation(format!(
                "accident {accident_id} has no driver and cannot become {new_status}"
            )));
        }

        let mut updated = accident.clone();
        updated.status = new_status;
        bounded(&self.config, "save_accident", || self.store.save_accident(&updated)).await?;
        let mut changes = diff::<Accident>(&accident, &updated);

        let mut released_driver = None;
        if new_status.is_terminal() {
            if queued {
                // Cancelled while still waiting.
                station.remove(accident_id);
            } else if let Some(driver_id) = accident.assigned_to {
                match self.free_driver(&mut station, driver_id).await {
                    Ok(driver_changes) => {
                        changes.extend(driver_changes);
                        released_driver = Some(driver_id);
                    }
                    Err(e) => {
                        self.undo_status(&accident).await;
                        return Err(e);
                    }
                }
            }
        }

        tracing::info!(
            station_id,
            accident_id,
            from = %accident.status,
            to = %new_status,
            released_driver = ?released_driver,
            "Accident status changed",
        );
        self.events.publish(
            DispatchEvent::new(event_types::ACCIDENT_STATUS_CHANGED)
                .with_station(station_id)
                .with_accident(accident_id)
                .with_changes(changes)
                .with_payload(serde_json::json!({
                    "from": accident.status,
                    "to": new_status,
                })),
        );
        if let Some(driver_id) = released_driver {
            self.events.publish(
                DispatchEvent::new(event_types::DRIVER_RELEASED)
                    .with_station(station_id)
                    .with_accident(accident_id)
                    .with_driver(driver_id),
            );
        }

        let assignment = if new_status.is_terminal() {
            self.matcher.match_locked(&mut station).await?
        } else {
            None
        };

        Ok(StatusChange {
            accident: updated,
            changed: true,
            released_driver,
            assignment,
        })
    }

    async fn undo_status(&self, original: &Accident) {
        if let Err(e) = bounded(&self.config, "restore_accident", || self.store.save_accident(original)).await {
            tracing::error!(accident_id = original.id, error = %e, "Failed to restore accident status");
        }
    }

    // -----------------------------------------------------------------------
    // Accident deleted
    // -----------------------------------------------------------------------

    /// Delete an accident. A queued accident leaves its queue; an assigned
    /// one frees its driver, who is offered to the queue straight away.
    pub async fn on_accident_deleted(&self, accident_id: DbId) -> Result<Option<Assignment>, CoreError> {
        let station_id = self.store.load_accident(accident_id).await?.station_id;
        let mut station = self.registry.lock(station_id).await?;
        let accident = timed(&self.config, "load_accident", self.store.load_accident(accident_id)).await?;
        let queued = station.is_queued(accident_id);

        let mut changes = Vec::new();
        let mut released_driver = None;
        if let Some(driver_id) = accident.assigned_to.filter(|_| accident.holds_driver() && !queued) {
            changes.extend(self.free_driver(&mut station, driver_id).await?);
            released_driver = Some(driver_id);
        }

        if let Err(e) = bounded(&self.config, "delete_accident", || self.store.delete_accident(accident_id)).await {
            if let Some(driver_id) = released_driver {
                self.rebind_driver(&mut station, driver_id).await;
            }
            return Err(e);
        }
        let dequeued = station.remove(accident_id);
        changes.extend(deleted::<Accident>(&accident));

        tracing::info!(
            station_id,
            accident_id,
            dequeued,
            released_driver = ?released_driver,
            "Accident deleted",
        );
        self.events.publish(
            DispatchEvent::new(event_types::ACCIDENT_DELETED)
                .with_station(station_id)
                .with_accident(accident_id)
                .with_changes(changes),
        );

        if released_driver.is_some() {
            return self.matcher.match_locked(&mut station).await;
        }
        Ok(None)
    }

    // -----------------------------------------------------------------------
    // Driver release helpers
    // -----------------------------------------------------------------------

    /// Put an on-duty driver back in service at the station being held.
    async fn free_driver(
        &self,
        station: &mut StationGuard<'_>,
        driver_id: DbId,
    ) -> Result<Vec<FieldChange>, CoreError> {
        let station_id = station.station_id();
        let driver = match timed(&self.config, "load_driver", self.store.load_driver(driver_id)).await {
            Ok(driver) => driver,
            Err(CoreError::NotFound { .. }) => {
                station.forget_driver(driver_id);
                tracing::warn!(station_id, driver_id, "Released driver no longer exists");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };

        let mut off = driver.clone();
        off.on_duty = false;
        if driver.on_duty {
            bounded(&self.config, "save_driver", || self.store.save_driver(&off)).await?;
        }

        if driver.station_id == Some(station_id) {
            match station.release(driver_id) {
                Ok(()) => {}
                Err(CoreError::NotRegistered { .. }) => {
                    station.mark_available(driver_id)?;
                }
                Err(e) => return Err(e),
            }
        } else {
            station.forget_driver(driver_id);
            tracing::warn!(
                station_id,
                driver_id,
                driver_station = ?driver.station_id,
                "Released driver is no longer attached to this station",
            );
        }
        Ok(diff::<Driver>(&driver, &off))
    }

    /// Undo [`free_driver`](Self::free_driver) after the owning write failed.
    async fn rebind_driver(&self, station: &mut StationGuard<'_>, driver_id: DbId) {
        let restored = match timed(&self.config, "load_driver", self.store.load_driver(driver_id)).await {
            Ok(mut driver) => {
                driver.on_duty = true;
                bounded(&self.config, "save_driver", || self.store.save_driver(&driver)).await
            }
            Err(e) => Err(e),
        };
        match restored {
            Ok(()) => {
                if let Err(e) = station.mark_on_duty(driver_id) {
                    tracing::error!(driver_id, error = %e, "Failed to restore driver duty state");
                }
            }
            Err(e) => tracing::error!(driver_id, error = %e, "Failed to restore driver duty state"),
        }
    }

    // -----------------------------------------------------------------------
    // Recovery
    // -----------------------------------------------------------------------

    /// Rebuild queues and pools from the store, then match whatever can be
    /// matched.
    ///
    /// Queues are refilled oldest report first. Per-station failures are
    /// logged and do not stop the other stations.
    pub async fn recover(&self) -> Result<RecoveryReport, CoreError> {
        let stations = self.store.list_stations().await?;
        let mut report = RecoveryReport {
            stations: stations.len(),
            ..RecoveryReport::default()
        };

        for station in &stations {
            self.registry.register(station.id);
            if let Err(e) = self.recover_station(station.id, &mut report).await {
                tracing::error!(station_id = station.id, error = %e, "Failed to recover station");
            }
        }

        for station in &stations {
            match self.matcher.drain(station.id).await {
                Ok(made) => report.assignments += made.len(),
                Err(e) => {
                    tracing::error!(station_id = station.id, error = %e, "Initial matching failed");
                }
            }
        }

        tracing::info!(
            stations = report.stations,
            queued = report.queued,
            available = report.available,
            on_duty = report.on_duty,
            assignments = report.assignments,
            "Dispatch state recovered",
        );
        Ok(report)
    }

    async fn recover_station(&self, station_id: DbId, report: &mut RecoveryReport) -> Result<(), CoreError> {
        let backlog = self.store.list_backlog(station_id).await?;
        let drivers = self.store.list_station_drivers(station_id).await?;

        let mut station = self.registry.lock(station_id).await?;
        for accident in backlog {
            match station.enqueue(accident.id) {
                Ok(()) => report.queued += 1,
                Err(CoreError::DuplicateEntry { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        for driver in drivers {
            if driver.on_duty {
                station.mark_on_duty(driver.id)?;
                report.on_duty += 1;
            } else if station.mark_available(driver.id)? {
                report.available += 1;
            }
        }
        Ok(())
    }
}
