//! Boundary between the daemon core and its single local caller (the UI).
//!
//! - [`protocol`] - command, reply and notification shapes
//! - [`event_bus`] - fan-out of notifications to subscribers
//! - [`ipc`] - request/response envelopes and the [`ipc::CommandHandler`] seam
//!
//! The bus transport itself (D-Bus, socket) plugs in on top of [`ipc`].

pub mod event_bus;
pub mod ipc;
pub mod protocol;
