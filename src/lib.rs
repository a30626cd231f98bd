//! Survey discharge import.
//!
//! Reconciles field survey discharge measurements with the water master
//! data table: deduplicates, fills the days between visits and persists
//! everything for a district in one transaction.

pub mod config;
pub mod db;
pub mod error;
pub mod import;
pub mod ingest;
pub mod interpolate;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod points;
pub mod store;
pub mod tracker;

pub use error::{ImportError, PersistError, SourceError, StoreError};
pub use import::ImportCoordinator;
pub use model::{DeviceType, ImportResult, Measurement, MeasurementWithDeviceType};
