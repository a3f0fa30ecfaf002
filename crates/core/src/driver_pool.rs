//! Drivers attached to one station, split into available and on-duty.
//!
//! Selection is lowest driver id first, so match outcomes are reproducible.

use std::collections::BTreeSet;

use crate::error::CoreError;
use crate::types::DbId;

#[derive(Debug, Default, Clone)]
pub struct DriverPool {
    station_id: DbId,
    available: BTreeSet<DbId>,
    on_duty: BTreeSet<DbId>,
}

impl DriverPool {
    pub fn new(station_id: DbId) -> Self {
        Self {
            station_id,
            ..Self::default()
        }
    }

    /// Add a driver to the available set.
    ///
    /// Returns `Ok(false)` if the driver was already available.
    pub fn mark_available(&mut self, driver_id: DbId) -> Result<bool, CoreError> {
        if self.on_duty.contains(&driver_id) {
            return Err(CoreError::AlreadyOnDuty { driver_id });
        }
        Ok(self.available.insert(driver_id))
    }

    /// Record a driver that is already bound to an open accident.
    /// Only used when rebuilding state from the store.
    pub fn mark_on_duty(&mut self, driver_id: DbId) {
        self.available.remove(&driver_id);
        self.on_duty.insert(driver_id);
    }

    /// Take the lowest-id available driver and move it on duty.
    pub fn take_any(&mut self) -> Option<DbId> {
        let driver_id = self.available.pop_first()?;
        self.on_duty.insert(driver_id);
        Some(driver_id)
    }

    /// Return an on-duty driver to the available set.
    pub fn release(&mut self, driver_id: DbId) -> Result<(), CoreError> {
        if self.on_duty.remove(&driver_id) {
            self.available.insert(driver_id);
            return Ok(());
        }
        if self.available.contains(&driver_id) {
            // Already available: releasing twice is harmless.
            return Ok(());
        }
        Err(CoreError::NotRegistered {
            driver_id,
            station_id: self.station_id,
        })
    }

    /// Detach an off-duty driver from this station.
    pub fn withdraw(&mut self, driver_id: DbId) -> Result<(), CoreError> {
        if self.on_duty.contains(&driver_id) {
            return Err(CoreError::AlreadyOnDuty { driver_id });
        }
        if !self.available.remove(&driver_id) {
            return Err(CoreError::NotRegistered {
                driver_id,
                station_id: self.station_id,
            });
        }
        Ok(())
    }

    /// Drop a driver regardless of duty state. Returns whether it was known.
    pub fn forget(&mut self, driver_id: DbId) -> bool {
        let was_available = self.available.remove(&driver_id);
        let was_on_duty = self.on_duty.remove(&driver_id);
        was_available || was_on_duty
    }

    pub fn is_member(&self, driver_id: DbId) -> bool {
        self.available.contains(&driver_id) || self.on_duty.contains(&driver_id)
    }

    pub fn is_on_duty(&self, driver_id: DbId) -> bool {
        self.on_duty.contains(&driver_id)
    }

    pub fn has_available(&self) -> bool {
        !self.available.is_empty()
    }

    pub fn available(&self) -> Vec<DbId> {
        self.available.iter().copied().collect()
    }

    pub fn on_duty(&self) -> Vec<DbId> {
        self.on_duty.iter().copied().collect()
    }
}
