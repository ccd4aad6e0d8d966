//! Appliance orchestration daemon.
//!
//! The [`daemon::Daemon`] wires a [`connectivity::ConnectivityMonitor`], a
//! [`hardware::TelemetryCollector`] and a [`dispatcher::Dispatcher`] around a
//! shared notification bus. Privileged work is delegated to the
//! [`workers`] and reported back asynchronously.

pub mod backlight;
pub mod connectivity;
pub mod daemon;
pub mod dispatcher;
pub mod hardware;
pub mod metrics;
pub mod sync_info;
pub mod workers;
