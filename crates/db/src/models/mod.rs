//! Row models for the dispatch tables.

pub mod accident;
pub mod audit;
pub mod driver;
pub mod event;
pub mod station;
