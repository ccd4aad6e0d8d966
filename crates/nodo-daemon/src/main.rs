//! nodo daemon: connectivity, telemetry, sync status and command dispatch
//! for the appliance UI.

use anyhow::{Context, Result};
use nodo_core::config::Config;
use nodo_daemon::daemon::Daemon;
use nodo_telemetry::logging::{self, LogFormat};
use tracing::{debug, info, warn};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let (config, load_error) = match Config::load() {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };

    logging::init(
        "nodo-daemon",
        &config.general.log_level,
        LogFormat::from_config(&config.general.log_format),
    );
    if let Some(e) = load_error {
        warn!(error = %e, "failed to load config, using defaults");
    }
    info!(version = env!("CARGO_PKG_VERSION"), "nodo daemon starting");

    let daemon = Daemon::new(config).context("failed to build daemon")?;
    let shutdown = daemon.shutdown_handle();

    // Wire ctrl-c to trigger graceful shutdown.
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            return;
        }
        info!("ctrl-c received, initiating shutdown");
        shutdown.trigger();
    });

    let notifications = daemon.event_bus().subscribe();
    tokio::spawn(async move {
        while let Ok(notification) = notifications.recv_async().await {
            debug!(kind = notification.kind(), "notification");
        }
    });

    daemon.run().await
}
