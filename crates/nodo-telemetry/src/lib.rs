//! Logging bootstrap for the nodo daemon.
//!
//! Wraps `tracing-subscriber` so the binary and tests install the same
//! formatter, either human-readable or JSON (for journald shipping).

pub mod logging;
