//! Persistence seam for the dispatch subsystem.
//!
//! Dispatch logic only sees [`DispatchStore`]. Production wires in
//! [`postgres::PgDispatchStore`]; tests use [`memory::MemoryStore`].

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use towtruck_core::accident::Accident;
use towtruck_core::driver::Driver;
use towtruck_core::error::CoreError;
use towtruck_core::station::Station;
use towtruck_core::types::DbId;

/// Durable records the matcher and lifecycle read and write.
///
/// Lookups of missing rows return [`CoreError::NotFound`]; infrastructure
/// failures return [`CoreError::Persistence`].
#[async_trait]
pub trait DispatchStore: Send + Sync {
    async fn load_station(&self, station_id: DbId) -> Result<Station, CoreError>;

    async fn list_stations(&self) -> Result<Vec<Station>, CoreError>;

    /// Remove a station. Its drivers lose their station link and its
    /// accidents are deleted with it.
    async fn delete_station(&self, station_id: DbId) -> Result<(), CoreError>;

    async fn load_accident(&self, accident_id: DbId) -> Result<Accident, CoreError>;

    /// Overwrite the stored accident with `accident`.
    async fn save_accident(&self, accident: &Accident) -> Result<(), CoreError>;

    async fn delete_accident(&self, accident_id: DbId) -> Result<(), CoreError>;

    /// Unassigned `REPORTED` accidents of a station, oldest first.
    async fn list_backlog(&self, station_id: DbId) -> Result<Vec<Accident>, CoreError>;

    async fn load_driver(&self, driver_id: DbId) -> Result<Driver, CoreError>;

    /// Overwrite the stored station link and duty flag of `driver`.
    async fn save_driver(&self, driver: &Driver) -> Result<(), CoreError>;

    /// Driver accounts attached to a station, lowest id first.
    async fn list_station_drivers(&self, station_id: DbId) -> Result<Vec<Driver>, CoreError>;
}
