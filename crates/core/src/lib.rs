//! Domain primitives for the tow-truck dispatch backend.
//!
//! This crate has zero internal dependencies so it can be shared by the
//! database layer, the dispatch service and any CLI tooling.

pub mod accident;
pub mod audit;
pub mod driver;
pub mod driver_pool;
pub mod error;
pub mod hashing;
pub mod station;
pub mod station_queue;
pub mod types;
