use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use nodo_bridge::event_bus::EventBus;
use nodo_bridge::ipc::IpcHandler;
use nodo_core::config::Config;
use nodo_core::shutdown::ShutdownSignal;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::backlight::Backlight;
use crate::connectivity::{ConnectivityMonitor, NetworkProbe, PingPeriods, ReachabilityProbe};
use crate::dispatcher::{Dispatcher, DispatcherDeps};
use crate::hardware::TelemetryCollector;
use crate::metrics::{MetricSource, SysfsMetrics};
use crate::sync_info::SyncStatusPoller;
use crate::workers::{process, SystemControl, WorkerEvent, WorkerSender, Workers};

/// Run first-boot setup if `marker` exists, then remove the marker.
///
/// Returns `true` when setup was attempted. The marker is removed even if
/// setup failed so it never runs twice.
pub async fn run_first_boot(marker: &Path, system: &dyn SystemControl) -> bool {
    if !tokio::fs::try_exists(marker).await.unwrap_or(false) {
        debug!(marker = %marker.display(), "no first-boot marker");
        return false;
    }
    info!(marker = %marker.display(), "first boot detected, running setup");
    match system.first_boot_setup().await {
        Ok(()) => info!("first-boot setup complete"),
        Err(e) => warn!(error = %e, "first-boot setup failed"),
    }
    if let Err(e) = tokio::fs::remove_file(marker).await {
        warn!(marker = %marker.display(), error = %e, "failed to remove first-boot marker");
    }
    true
}

/// Composition root: owns the periodic loops, the dispatcher and the worker
/// result queue.
pub struct Daemon {
    config: Config,
    event_bus: EventBus,
    shutdown: ShutdownSignal,
    dispatcher: Arc<Dispatcher>,
    monitor: ConnectivityMonitor,
    collector: TelemetryCollector,
    workers: Workers,
    events_tx: WorkerSender,
    events_rx: flume::Receiver<WorkerEvent>,
}

impl Daemon {
    /// Build a daemon backed by the real network probe, sysfs readers and
    /// process workers.
    pub fn new(config: Config) -> Result<Self> {
        let probe = Arc::new(NetworkProbe::from_config(&config.daemon));
        let metrics = Arc::new(SysfsMetrics::from_config(&config.paths));
        let workers = process::from_config(&config);
        Self::with_components(config, probe, metrics, workers)
    }

    pub fn with_components(
        config: Config,
        probe: Arc<dyn ReachabilityProbe>,
        metrics: Arc<dyn MetricSource>,
        workers: Workers,
    ) -> Result<Self> {
        let event_bus = EventBus::new();
        let (events_tx, events_rx) = flume::unbounded();

        let monitor = ConnectivityMonitor::new(probe, PingPeriods::from_config(&config.daemon));
        let collector = TelemetryCollector::new(
            Arc::clone(&metrics),
            config.paths.blockchain_mount.clone(),
            config.paths.system_mount.clone(),
            config.daemon.hardware_status_period(),
        );
        let sync = SyncStatusPoller::from_config(&config.sync, event_bus.clone())
            .context("failed to build sync status client")?;
        let backlight = Backlight::new(
            config.paths.backlight_file.clone(),
            config.display.max_backlight,
            config.display.initial_backlight,
        );

        let dispatcher = Arc::new(Dispatcher::new(DispatcherDeps {
            workers: workers.clone(),
            bus: event_bus.clone(),
            events: events_tx.clone(),
            connectivity: monitor.handle(),
            backlight,
            metrics,
            blockchain_mount: config.paths.blockchain_mount.clone(),
            sync,
        }));

        Ok(Self {
            config,
            event_bus,
            shutdown: ShutdownSignal::new(),
            dispatcher,
            monitor,
            collector,
            workers,
            events_tx,
            events_rx,
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn dispatcher(&self) -> Arc<Dispatcher> {
        Arc::clone(&self.dispatcher)
    }

    /// JSON envelope handler for whichever transport carries UI requests.
    pub fn ipc_handler(&self) -> IpcHandler<Arc<Dispatcher>> {
        IpcHandler::new(self.dispatcher(), self.event_bus.clone())
    }

    /// Queue for input workers (power button, recovery key) that raise
    /// events on their own.
    pub fn worker_sender(&self) -> WorkerSender {
        self.events_tx.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Run until the shutdown signal fires.
    pub async fn run(self) -> Result<()> {
        let Daemon {
            config,
            event_bus,
            shutdown,
            dispatcher,
            monitor,
            collector,
            workers,
            events_tx,
            events_rx,
        } = self;
        // Keep one sender alive so the queue never reports disconnection.
        let _events_tx = events_tx;

        info!(
            hardware_ms = config.daemon.hardware_status_period_ms,
            service_ms = config.daemon.service_status_period_ms,
            rpc_url = %config.sync.rpc_url,
            "daemon starting"
        );

        let monitor_handle = tokio::spawn(monitor.run(event_bus.clone(), shutdown.subscribe()));
        let collector_handle =
            tokio::spawn(collector.run(event_bus.clone(), shutdown.subscribe()));

        let marker = config.paths.first_boot_marker.clone();
        let system = Arc::clone(&workers.system);
        tokio::spawn(async move {
            run_first_boot(&marker, system.as_ref()).await;
        });

        let mut service_sweep = tokio::time::interval(config.daemon.service_status_period());
        service_sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stop = shutdown.subscribe();

        loop {
            tokio::select! {
                _ = stop.cancelled() => break,
                event = events_rx.recv_async() => match event {
                    Ok(event) => dispatcher.on_worker_event(event),
                    Err(_) => break,
                },
                _ = service_sweep.tick() => {
                    dispatcher.request_service_report();
                }
            }
        }

        info!("daemon stopping");
        if let Err(e) = monitor_handle.await {
            warn!(error = %e, "connectivity monitor task failed");
        }
        if let Err(e) = collector_handle.await {
            warn!(error = %e, "telemetry collector task failed");
        }
        info!("daemon stopped");
        Ok(())
    }
}
