//! Shared building blocks for the nodo orchestration daemon.
//!
//! - [`config`] - TOML configuration with appliance defaults
//! - [`types`] - connectivity, telemetry, storage and sync domain types
//! - [`shutdown`] - cooperative cancellation for the periodic loops

pub mod config;
pub mod shutdown;
pub mod types;
