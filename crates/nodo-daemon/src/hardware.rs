use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use nodo_bridge::event_bus::EventBus;
use nodo_bridge::protocol::Notification;
use nodo_core::shutdown::ShutdownListener;
use nodo_core::types::{CpuSample, TelemetrySnapshot};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::metrics::MetricSource;

/// Value used for any metric whose reader failed.
pub const SENTINEL: f64 = 0.0;

/// Samples every metric reader on a fixed period and publishes one
/// [`TelemetrySnapshot`] per tick.
///
/// The previous CPU sample is the only state carried between ticks.
pub struct TelemetryCollector {
    source: Arc<dyn MetricSource>,
    blockchain_mount: PathBuf,
    system_mount: PathBuf,
    period: Duration,
    prev_cpu: Option<CpuSample>,
}

impl TelemetryCollector {
    pub fn new(
        source: Arc<dyn MetricSource>,
        blockchain_mount: impl Into<PathBuf>,
        system_mount: impl Into<PathBuf>,
        period: Duration,
    ) -> Self {
        Self {
            source,
            blockchain_mount: blockchain_mount.into(),
            system_mount: system_mount.into(),
            period,
            prev_cpu: None,
        }
    }

    /// CPU busy percentage since the previous call, updating the stored
    /// sample. The first call (or a failed read) yields the sentinel.
    fn cpu_usage(&mut self) -> f64 {
        let Some(sample) = self.source.cpu_sample() else {
            return SENTINEL;
        };
        let usage = self
            .prev_cpu
            .map(|prev| sample.usage_since(&prev))
            .unwrap_or(SENTINEL);
        self.prev_cpu = Some(sample);
        usage
    }

    /// Invoke every reader once and assemble a snapshot.
    pub fn collect(&mut self) -> TelemetrySnapshot {
        let cpu_usage = self.cpu_usage();
        let src = &self.source;
        let memory = src.memory();
        let gpu_freq = src.gpu_frequencies();
        let blockchain = src.storage(&self.blockchain_mount);
        let system = src.storage(&self.system_mount);

        TelemetrySnapshot {
            cpu_usage,
            average_cpu_freq_mhz: src.average_cpu_freq_mhz().unwrap_or(SENTINEL),
            ram_usage: memory.map(|m| m.used_percent).unwrap_or(SENTINEL),
            total_ram_gib: memory.map(|m| m.total_gib).unwrap_or(SENTINEL),
            cpu_temperature: src.cpu_temperature().unwrap_or(SENTINEL),
            blockchain_storage_used_gib: blockchain.map(|s| s.used_gib()).unwrap_or(SENTINEL),
            blockchain_storage_total_gib: blockchain.map(|s| s.total_gib()).unwrap_or(SENTINEL),
            system_storage_used_gib: system.map(|s| s.used_gib()).unwrap_or(SENTINEL),
            system_storage_total_gib: system.map(|s| s.total_gib()).unwrap_or(SENTINEL),
            gpu_usage: src.gpu_usage().unwrap_or(SENTINEL),
            gpu_min_freq_mhz: gpu_freq.map(|g| g.min_mhz).unwrap_or(SENTINEL),
            gpu_max_freq_mhz: gpu_freq.map(|g| g.max_mhz).unwrap_or(SENTINEL),
            gpu_current_freq_mhz: gpu_freq.map(|g| g.current_mhz).unwrap_or(SENTINEL),
            collected_at: Utc::now(),
        }
    }

    /// Collect and publish until shutdown.
    pub async fn run(mut self, bus: EventBus, mut shutdown: ShutdownListener) {
        let mut interval = tokio::time::interval(self.period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        // Prime the CPU delta and consume the immediate first tick so the
        // first published snapshot already has a real CPU figure.
        interval.tick().await;
        self.cpu_usage();

        info!(period_ms = self.period.as_millis() as u64, "telemetry collector started");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let snapshot = self.collect();
                    debug!(
                        cpu = snapshot.cpu_usage,
                        ram = snapshot.ram_usage,
                        temp = snapshot.cpu_temperature,
                        "hardware status collected"
                    );
                    bus.publish(Notification::HardwareStatusReady(snapshot));
                }
            }
        }
        info!("telemetry collector stopped");
    }
}
