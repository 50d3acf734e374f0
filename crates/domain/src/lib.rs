//! Domain layer shared by the picshare API, storage and billing crates:
//! environment configuration, the data model, storage contracts and the
//! business services that sit between HTTP handlers and persistence.

mod config;
pub mod model;
pub mod services;
pub mod storage;

pub use config::*;
pub use services::telemetry::*;
