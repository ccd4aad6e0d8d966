use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ConnectivityState
// ---------------------------------------------------------------------------

/// Network reachability as seen by the connectivity monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityState {
    /// No probe has completed since startup.
    #[default]
    Waiting,
    Connected,
    NoInternet,
    Disconnected,
}

impl ConnectivityState {
    /// Ordinal code exposed over IPC.
    pub fn code(self) -> i32 {
        match self {
            ConnectivityState::Waiting => 0,
            ConnectivityState::Connected => 1,
            ConnectivityState::NoInternet => 2,
            ConnectivityState::Disconnected => 3,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(ConnectivityState::Waiting),
            1 => Some(ConnectivityState::Connected),
            2 => Some(ConnectivityState::NoInternet),
            3 => Some(ConnectivityState::Disconnected),
            _ => None,
        }
    }

    pub fn is_connected(self) -> bool {
        self == ConnectivityState::Connected
    }
}

impl std::fmt::Display for ConnectivityState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityState::Waiting => write!(f, "waiting"),
            ConnectivityState::Connected => write!(f, "connected"),
            ConnectivityState::NoInternet => write!(f, "no_internet"),
            ConnectivityState::Disconnected => write!(f, "disconnected"),
        }
    }
}

// ---------------------------------------------------------------------------
// TelemetrySnapshot
// ---------------------------------------------------------------------------

/// One atomic bundle of device health metrics.
///
/// Any reader that failed during collection contributes `0.0`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub cpu_usage: f64,
    pub average_cpu_freq_mhz: f64,
    pub ram_usage: f64,
    pub total_ram_gib: f64,
    pub cpu_temperature: f64,
    pub blockchain_storage_used_gib: f64,
    pub blockchain_storage_total_gib: f64,
    pub system_storage_used_gib: f64,
    pub system_storage_total_gib: f64,
    pub gpu_usage: f64,
    pub gpu_min_freq_mhz: f64,
    pub gpu_max_freq_mhz: f64,
    pub gpu_current_freq_mhz: f64,
    pub collected_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// CPU sampling
// ---------------------------------------------------------------------------

/// Aggregate CPU jiffy counters from one `/proc/stat` read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CpuSample {
    pub idle: u64,
    pub total: u64,
}

impl CpuSample {
    pub fn new(idle: u64, total: u64) -> Self {
        Self { idle, total }
    }

    /// Busy percentage between `prev` and `self`.
    ///
    /// Returns 0 when no time elapsed or the counters went backwards.
    pub fn usage_since(&self, prev: &CpuSample) -> f64 {
        let total_delta = self.total.saturating_sub(prev.total);
        let idle_delta = self.idle.saturating_sub(prev.idle);
        if total_delta == 0 || idle_delta > total_delta {
            return 0.0;
        }
        (total_delta - idle_delta) as f64 / total_delta as f64 * 100.0
    }
}

// ---------------------------------------------------------------------------
// Storage
// ---------------------------------------------------------------------------

/// Used and total bytes of a mounted filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageUsage {
    pub used_bytes: u64,
    pub total_bytes: u64,
}

const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

impl StorageUsage {
    pub fn used_gib(&self) -> f64 {
        self.used_bytes as f64 / GIB
    }

    pub fn total_gib(&self) -> f64 {
        self.total_bytes as f64 / GIB
    }

    pub fn used_fraction(&self) -> Option<f64> {
        if self.total_bytes == 0 {
            None
        } else {
            Some(self.used_bytes as f64 / self.total_bytes as f64)
        }
    }
}

/// Health of the blockchain volume, reported as an integer code over IPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageStatus {
    Ok,
    Low,
    Full,
    Missing,
}

impl StorageStatus {
    pub const LOW_THRESHOLD: f64 = 0.90;
    pub const FULL_THRESHOLD: f64 = 0.98;

    /// Classify a storage reading. `None` means the volume could not be read.
    pub fn classify(usage: Option<StorageUsage>) -> Self {
        match usage.and_then(|u| u.used_fraction()) {
            None => StorageStatus::Missing,
            Some(f) if f >= Self::FULL_THRESHOLD => StorageStatus::Full,
            Some(f) if f >= Self::LOW_THRESHOLD => StorageStatus::Low,
            Some(_) => StorageStatus::Ok,
        }
    }

    pub fn code(self) -> i32 {
        match self {
            StorageStatus::Ok => 0,
            StorageStatus::Low => 1,
            StorageStatus::Full => 2,
            StorageStatus::Missing => 3,
        }
    }
}

// ---------------------------------------------------------------------------
// SyncInfo
// ---------------------------------------------------------------------------

/// Blockchain sync progress reported by the local node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SyncInfo {
    pub height: u64,
    pub target_height: u64,
}

impl SyncInfo {
    pub fn new(height: u64, target_height: u64) -> Self {
        Self {
            height,
            target_height,
        }
    }

    /// Sync progress in whole percent, rounded down.
    ///
    /// A zero target means the node knows of no higher chain tip and is
    /// reported as fully synced.
    pub fn percentage(&self) -> u32 {
        if self.target_height == 0 {
            return 100;
        }
        let pct = u128::from(self.height) * 100 / u128::from(self.target_height);
        u32::try_from(pct).unwrap_or(u32::MAX)
    }
}
