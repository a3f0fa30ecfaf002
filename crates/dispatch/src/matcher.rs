//! Pairs queued accidents with available drivers.
//!
//! A match holds the station lock from dequeue to commit:
//!
//! 1. claim the head accident and take the lowest-id available driver;
//! 2. re-read both from the store and discard either one if it went stale;
//! 3. write the accident (`assigned_to`, `date_assigned`), then the driver
//!    (`on_duty = true`), each through [`bounded`];
//! 4. on any write failure, put the accident back at the head of the queue,
//!    return the driver to the available set and write back both original
//!    rows.
//!
//! Stale entries are logged and dropped, and the loop moves on to the next
//! candidate, so one bad row never wedges a station.
//!
//! The in-memory queue and pool decide who is waiting. A queued accident
//! whose row still names a driver, or an available driver whose row is
//! still on duty, can only be left over from an aborted commit whose
//! write-back also failed; the next commit overwrites those fields instead
//! of discarding the entry.

use std::sync::Arc;

use chrono::Utc;
use serde::Serialize;
use towtruck_core::accident::{Accident, AccidentStatus};
use towtruck_core::audit::{diff, FieldChange};
use towtruck_core::driver::Driver;
use towtruck_core::error::CoreError;
use towtruck_core::types::{DbId, Timestamp};
use towtruck_events::bus::{event_types, DispatchEvent, EventBus};

use crate::config::DispatchConfig;
use crate::registry::{StationGuard, StationRegistry};
use crate::retry::{bounded, timed};
use crate::store::DispatchStore;

/// A committed accident/driver pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Assignment {
    pub station_id: DbId,
    pub accident_id: DbId,
    pub driver_id: DbId,
    pub assigned_at: Timestamp,
}

/// Outcome of one commit attempt.
enum Commit {
    Paired(Assignment, Vec<FieldChange>),
    StaleAccident(&'static str),
    StaleDriver(&'static str),
}

pub struct Matcher {
    registry: Arc<StationRegistry>,
    store: Arc<dyn DispatchStore>,
    events: Arc<EventBus>,
    config: DispatchConfig,
}

impl Matcher {
    pub fn new(
        registry: Arc<StationRegistry>,
        store: Arc<dyn DispatchStore>,
        events: Arc<EventBus>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            registry,
            store,
            events,
            config,
        }
    }

    /// Try to pair one accident with one driver at `station_id`.
    ///
    /// Returns `Ok(None)` without touching the store when the station has
    /// no queued accident or no available driver. On a persistence failure
    /// the station is left exactly as it was and the error is returned.
    pub async fn try_match(&self, station_id: DbId) -> Result<Option<Assignment>, CoreError> {
        let mut station = self.registry.lock(station_id).await?;
        self.match_locked(&mut station).await
    }

    /// Keep matching until the station runs out of accidents or drivers.
    pub async fn drain(&self, station_id: DbId) -> Result<Vec<Assignment>, CoreError> {
        let mut station = self.registry.lock(station_id).await?;
        let mut made = Vec::new();
        while let Some(assignment) = self.match_locked(&mut station).await? {
            made.push(assignment);
        }
        Ok(made)
    }

    /// [`try_match`](Self::try_match) for a caller already holding the lock.
    pub(crate) async fn match_locked(
        &self,
        station: &mut StationGuard<'_>,
    ) -> Result<Option<Assignment>, CoreError> {
        let station_id = station.station_id();

        // Every stale iteration drops an accident or a driver for good.
        loop {
            if !station.has_work() {
                return Ok(None);
            }
            let Some(accident_id) = station.claim_next() else {
                return Ok(None);
            };
            let Some(driver_id) = station.take_any() else {
                station.unclaim(accident_id)?;
                return Ok(None);
            };

            match self.commit(station_id, accident_id, driver_id).await {
                Ok(Commit::Paired(assignment, changes)) => {
                    station.settle(accident_id);
                    tracing::info!(
                        station_id,
                        accident_id,
                        driver_id,
                        queue_remaining = station.queue_len(),
                        "Accident assigned",
                    );
                    self.events.publish(
                        DispatchEvent::new(event_types::ACCIDENT_ASSIGNED)
                            .with_station(station_id)
                            .with_accident(accident_id)
                            .with_driver(driver_id)
                            .with_changes(changes)
                            .with_payload(serde_json::json!({
                                "assigned_at": assignment.assigned_at,
                            })),
                    );
                    return Ok(Some(assignment));
                }
                Ok(Commit::StaleAccident(reason)) => {
                    station.settle(accident_id);
                    station.release(driver_id)?;
                    tracing::warn!(station_id, accident_id, reason, "Discarding stale queue entry");
                }
                Ok(Commit::StaleDriver(reason)) => {
                    station.forget_driver(driver_id);
                    station.unclaim(accident_id)?;
                    tracing::warn!(station_id, driver_id, reason, "Discarding stale driver");
                }
                Err(e) => {
                    station.unclaim(accident_id)?;
                    station.release(driver_id)?;
                    tracing::error!(
                        station_id,
                        accident_id,
                        driver_id,
                        error = %e,
                        "Assignment commit failed, rolled back",
                    );
                    return Err(e);
                }
            }
        }
    }

    async fn commit(
        &self,
        station_id: DbId,
        accident_id: DbId,
        driver_id: DbId,
    ) -> Result<Commit, CoreError> {
        let accident = match timed(&self.config, "load_accident", self.store.load_accident(accident_id)).await {
            Ok(accident) => accident,
            Err(CoreError::NotFound { .. }) => {
                return Ok(Commit::StaleAccident("accident no longer exists"))
            }
            Err(e) => return Err(e),
        };
        if accident.station_id != station_id {
            return Ok(Commit::StaleAccident("accident moved to another station"));
        }
        if accident.status != AccidentStatus::Reported {
            return Ok(Commit::StaleAccident("accident is already in progress or closed"));
        }
        if let Some(previous) = accident.assigned_to {
            tracing::warn!(
                station_id,
                accident_id,
                previous_driver = previous,
                "Overwriting driver left on a queued accident by an aborted commit",
            );
        }

        let driver = match timed(&self.config, "load_driver", self.store.load_driver(driver_id)).await {
            Ok(driver) => driver,
            Err(CoreError::NotFound { .. }) => {
                return Ok(Commit::StaleDriver("driver no longer exists"))
            }
            Err(e) => return Err(e),
        };
        if driver.station_id != Some(station_id) {
            return Ok(Commit::StaleDriver("driver left the station"));
        }
        if !driver.is_assignable() {
            tracing::warn!(
                station_id,
                driver_id,
                "Overwriting duty flag left on an available driver by an aborted commit",
            );
        }

        let assigned_at = Utc::now();
        let mut assigned = accident.clone();
        assigned.assign(driver_id, assigned_at);
        let mut busy = driver.clone();
        busy.on_duty = true;

        // A failed write may still have landed, so both rows are written back
        // on either failure.
        if let Err(e) = bounded(&self.config, "save_accident", || self.store.save_accident(&assigned)).await {
            self.write_back(&accident, &driver).await;
            return Err(e);
        }
        if let Err(e) = bounded(&self.config, "save_driver", || self.store.save_driver(&busy)).await {
            self.write_back(&accident, &driver).await;
            return Err(e);
        }

        let mut changes = diff::<Accident>(&accident, &assigned);
        changes.extend(diff::<Driver>(&driver, &busy));

        Ok(Commit::Paired(
            Assignment {
                station_id,
                accident_id,
                driver_id,
                assigned_at,
            },
            changes,
        ))
    }

    /// Write back the pre-assignment rows after a failed commit.
    ///
    /// Anything this fails to restore is overwritten by the next commit
    /// that picks up the requeued accident or the released driver.
    async fn write_back(&self, accident: &Accident, driver: &Driver) {
        if let Err(e) = bounded(&self.config, "restore_accident", || self.store.save_accident(accident)).await {
            tracing::error!(
                accident_id = accident.id,
                error = %e,
                "Failed to restore accident after aborted assignment",
            );
        }
        if let Err(e) = bounded(&self.config, "restore_driver", || self.store.save_driver(driver)).await {
            tracing::error!(
                driver_id = driver.id,
                error = %e,
                "Failed to restore driver after aborted assignment",
            );
        }
    }
}
