//! [`DispatchStore`] backed by the PostgreSQL repositories.

use async_trait::async_trait;
use towtruck_core::accident::Accident;
use towtruck_core::driver::Driver;
use towtruck_core::error::CoreError;
use towtruck_core::station::Station;
use towtruck_core::types::DbId;
use towtruck_db::repositories::{AccidentRepo, DriverRepo, StationRepo};
use towtruck_db::DbPool;

use super::DispatchStore;

pub struct PgDispatchStore {
    pool: DbPool,
}

impl PgDispatchStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }
}

fn persistence(err: sqlx::Error) -> CoreError {
    CoreError::Persistence(err.to_string())
}

#[async_trait]
impl DispatchStore for PgDispatchStore {
    async fn load_station(&self, station_id: DbId) -> Result<Station, CoreError> {
        StationRepo::find_by_id(&self.pool, station_id)
            .await
            .map_err(persistence)?
            .map(Station::from)
            .ok_or(CoreError::NotFound {
                entity: "Station",
                id: station_id,
            })
    }

    async fn list_stations(&self) -> Result<Vec<Station>, CoreError> {
        let rows = StationRepo::list(&self.pool).await.map_err(persistence)?;
        Ok(rows.into_iter().map(Station::from).collect())
    }

    async fn delete_station(&self, station_id: DbId) -> Result<(), CoreError> {
        // Drivers are detached (SET NULL); the station's accidents cascade.
        let deleted = StationRepo::delete(&self.pool, station_id)
            .await
            .map_err(persistence)?;
        if !deleted {
            return Err(CoreError::NotFound {
                entity: "Station",
                id: station_id,
            });
        }
        Ok(())
    }

    async fn load_accident(&self, accident_id: DbId) -> Result<Accident, CoreError> {
        AccidentRepo::find_by_id(&self.pool, accident_id)
            .await
            .map_err(persistence)?
            .ok_or(CoreError::NotFound {
                entity: "Accident",
                id: accident_id,
            })?
            .into_domain()
    }

    async fn save_accident(&self, accident: &Accident) -> Result<(), CoreError> {
        AccidentRepo::update(&self.pool, accident)
            .await
            .map_err(persistence)?
            .ok_or(CoreError::NotFound {
                entity: "Accident",
                id: accident.id,
            })?;
        Ok(())
    }

    async fn delete_accident(&self, accident_id: DbId) -> Result<(), CoreError> {
        let deleted = AccidentRepo::delete(&self.pool, accident_id)
            .await
            .map_err(persistence)?;
        if !deleted {
            return Err(CoreError::NotFound {
                entity: "Accident",
                id: accident_id,
            });
        }
        Ok(())
    }

    async fn list_backlog(&self, station_id: DbId) -> Result<Vec<Accident>, CoreError> {
        AccidentRepo::list_backlog(&self.pool, station_id)
            .await
            .map_err(persistence)?
            .into_iter()
            .map(|row| row.into_domain())
            .collect()
    }

    async fn load_driver(&self, driver_id: DbId) -> Result<Driver, CoreError> {
        DriverRepo::find_by_id(&self.pool, driver_id)
            .await
            .map_err(persistence)?
            .ok_or(CoreError::NotFound {
                entity: "Driver",
                id: driver_id,
            })?
            .into_domain()
    }

    async fn save_driver(&self, driver: &Driver) -> Result<(), CoreError> {
        DriverRepo::update(&self.pool, driver)
            .await
            .map_err(persistence)?
            .ok_or(CoreError::NotFound {
                entity: "Driver",
                id: driver.id,
            })?;
        Ok(())
    }

    async fn list_station_drivers(&self, station_id: DbId) -> Result<Vec<Driver>, CoreError> {
        DriverRepo::list_by_station(&self.pool, station_id)
            .await
            .map_err(persistence)?
            .into_iter()
            .map(|row| row.into_domain())
            .collect()
    }
}
