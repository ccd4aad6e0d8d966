use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "NODO_CONFIG";

/// Top-level configuration loaded from `<config_dir>/nodo/daemon.toml`.
///
/// Every section is optional; missing keys fall back to the appliance
/// defaults so a fresh box runs with an empty (or absent) file.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub lws: LwsConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub services: ServicesConfig,
}

impl Config {
    /// Load config from `$NODO_CONFIG` or the default path, falling back to
    /// defaults when the file does not exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(path)
        } else {
            let cfg = Config::default();
            cfg.validate()?;
            Ok(cfg)
        }
    }

    /// Load from a specific path.
    pub fn load_from(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        let text = std::fs::read_to_string(&path).map_err(|e| ConfigError::Io(e.to_string()))?;
        let cfg: Config = toml::from_str(&text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize config to TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        self.validate()?;
        toml::to_string_pretty(self).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Semantic validation for settings that are not fully expressible via type checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.general.validate()?;
        self.daemon.validate()?;
        self.sync.validate()?;
        self.display.validate()?;
        self.services.validate()?;
        Ok(())
    }

    /// Resolved location of the config file.
    pub fn default_path() -> PathBuf {
        if let Ok(p) = std::env::var(CONFIG_ENV) {
            if !p.is_empty() {
                return PathBuf::from(p);
            }
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("/etc"))
            .join("nodo")
            .join("daemon.toml")
    }
}

// ---------------------------------------------------------------------------
// Error
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("io: {0}")]
    Io(String),
    #[error("parse: {0}")]
    Parse(String),
    #[error("validation: {0}")]
    Validation(String),
}

// ---------------------------------------------------------------------------
// Section structs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// `"text"` or `"json"`.
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl GeneralConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        match self.log_format.trim() {
            "text" | "json" => Ok(()),
            other => Err(ConfigError::Validation(format!(
                "general.log_format '{other}' must be 'text' or 'json'"
            ))),
        }
    }
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}

/// Loop cadences and the reachability probe target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonConfig {
    #[serde(default = "default_ping_connected_ms")]
    pub ping_period_connected_ms: u64,
    #[serde(default = "default_ping_not_connected_ms")]
    pub ping_period_not_connected_ms: u64,
    /// `host:port` the probe opens a TCP connection to.
    #[serde(default = "default_probe_target")]
    pub probe_target: String,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
    #[serde(default = "default_hardware_status_ms")]
    pub hardware_status_period_ms: u64,
    #[serde(default = "default_service_status_ms")]
    pub service_status_period_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            ping_period_connected_ms: default_ping_connected_ms(),
            ping_period_not_connected_ms: default_ping_not_connected_ms(),
            probe_target: default_probe_target(),
            probe_timeout_ms: default_probe_timeout_ms(),
            hardware_status_period_ms: default_hardware_status_ms(),
            service_status_period_ms: default_service_status_ms(),
        }
    }
}

impl DaemonConfig {
    pub fn ping_period_connected(&self) -> Duration {
        Duration::from_millis(self.ping_period_connected_ms)
    }

    pub fn ping_period_not_connected(&self) -> Duration {
        Duration::from_millis(self.ping_period_not_connected_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn hardware_status_period(&self) -> Duration {
        Duration::from_millis(self.hardware_status_period_ms)
    }

    pub fn service_status_period(&self) -> Duration {
        Duration::from_millis(self.service_status_period_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let periods = [
            ("ping_period_connected_ms", self.ping_period_connected_ms),
            ("ping_period_not_connected_ms", self.ping_period_not_connected_ms),
            ("probe_timeout_ms", self.probe_timeout_ms),
            ("hardware_status_period_ms", self.hardware_status_period_ms),
            ("service_status_period_ms", self.service_status_period_ms),
        ];
        for (name, value) in periods {
            if value == 0 {
                return Err(ConfigError::Validation(format!(
                    "daemon.{name} must be greater than zero"
                )));
            }
        }
        // A probe slower than the fast cadence would stall the core loop.
        if self.probe_timeout_ms > self.ping_period_not_connected_ms {
            return Err(ConfigError::Validation(
                "daemon.probe_timeout_ms must not exceed daemon.ping_period_not_connected_ms"
                    .to_string(),
            ));
        }
        if self.probe_target.trim().is_empty() {
            return Err(ConfigError::Validation(
                "daemon.probe_target must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_ping_connected_ms() -> u64 {
    7_000
}
fn default_ping_not_connected_ms() -> u64 {
    3_000
}
fn default_probe_target() -> String {
    "1.1.1.1:53".into()
}
fn default_probe_timeout_ms() -> u64 {
    2_000
}
fn default_hardware_status_ms() -> u64 {
    1_000
}
fn default_service_status_ms() -> u64 {
    10_000
}

/// Local monerod JSON-RPC endpoint used for sync progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "default_rpc_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            request_timeout_ms: default_rpc_timeout_ms(),
        }
    }
}

impl SyncConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.rpc_url.starts_with("http://") && !self.rpc_url.starts_with("https://") {
            return Err(ConfigError::Validation(format!(
                "sync.rpc_url '{}' must be an http(s) URL",
                self.rpc_url
            )));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::Validation(
                "sync.request_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:18081/json_rpc".into()
}
fn default_rpc_timeout_ms() -> u64 {
    5_000
}

/// Filesystem locations consumed by the daemon and its workers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    #[serde(default = "default_first_boot_marker")]
    pub first_boot_marker: PathBuf,
    #[serde(default = "default_backlight_file")]
    pub backlight_file: PathBuf,
    #[serde(default = "default_blockchain_mount")]
    pub blockchain_mount: PathBuf,
    #[serde(default = "default_system_mount")]
    pub system_mount: PathBuf,
    #[serde(default = "default_gpu_devfreq_dir")]
    pub gpu_devfreq_dir: PathBuf,
    #[serde(default = "default_recovery_script")]
    pub recovery_script: PathBuf,
    #[serde(default = "default_update_script")]
    pub update_script: PathBuf,
    #[serde(default = "default_factory_reset_script")]
    pub factory_reset_script: PathBuf,
    #[serde(default = "default_first_boot_script")]
    pub first_boot_script: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            first_boot_marker: default_first_boot_marker(),
            backlight_file: default_backlight_file(),
            blockchain_mount: default_blockchain_mount(),
            system_mount: default_system_mount(),
            gpu_devfreq_dir: default_gpu_devfreq_dir(),
            recovery_script: default_recovery_script(),
            update_script: default_update_script(),
            factory_reset_script: default_factory_reset_script(),
            first_boot_script: default_first_boot_script(),
        }
    }
}

fn default_first_boot_marker() -> PathBuf {
    PathBuf::from("/root/nododaemonfirstboot")
}
fn default_backlight_file() -> PathBuf {
    PathBuf::from("/sys/class/backlight/backlight/brightness")
}
fn default_blockchain_mount() -> PathBuf {
    PathBuf::from("/media/monero")
}
fn default_system_mount() -> PathBuf {
    PathBuf::from("/")
}
fn default_gpu_devfreq_dir() -> PathBuf {
    PathBuf::from("/sys/class/devfreq/fb000000.gpu")
}
fn default_recovery_script() -> PathBuf {
    PathBuf::from("/home/nodo/recovery/recovery.sh")
}
fn default_update_script() -> PathBuf {
    PathBuf::from("/home/nodo/update-all.sh")
}
fn default_factory_reset_script() -> PathBuf {
    PathBuf::from("/home/nodo/recovery/factory-reset.sh")
}
fn default_first_boot_script() -> PathBuf {
    PathBuf::from("/home/nodo/setup-domains.sh")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisplayConfig {
    #[serde(default = "default_max_backlight")]
    pub max_backlight: i32,
    #[serde(default = "default_initial_backlight")]
    pub initial_backlight: i32,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            max_backlight: default_max_backlight(),
            initial_backlight: default_initial_backlight(),
        }
    }
}

impl DisplayConfig {
    /// An initial level above the maximum is clamped, not rejected.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_backlight <= 0 {
            return Err(ConfigError::Validation(format!(
                "display.max_backlight {} must be greater than zero",
                self.max_backlight
            )));
        }
        if self.initial_backlight < 0 {
            return Err(ConfigError::Validation(format!(
                "display.initial_backlight {} must not be negative",
                self.initial_backlight
            )));
        }
        Ok(())
    }
}

fn default_max_backlight() -> i32 {
    255
}
fn default_initial_backlight() -> i32 {
    180
}

/// monero-lws admin tooling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LwsConfig {
    #[serde(default = "default_lws_admin")]
    pub admin_binary: PathBuf,
    #[serde(default = "default_lws_db")]
    pub db_path: PathBuf,
}

impl Default for LwsConfig {
    fn default() -> Self {
        Self {
            admin_binary: default_lws_admin(),
            db_path: default_lws_db(),
        }
    }
}

fn default_lws_admin() -> PathBuf {
    PathBuf::from("/home/nodo/monero-lws/build/src/monero-lws-admin")
}
fn default_lws_db() -> PathBuf {
    PathBuf::from("/home/nodo/.bitmonero/light_wallet_server")
}

/// Account whose password the UI manages.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    #[serde(default = "default_auth_user")]
    pub user: String,
    /// Helper that verifies the old password (stdin line 1) and sets the new
    /// one (stdin line 2). Exit code 1 means the old password was wrong.
    #[serde(default = "default_change_helper")]
    pub change_helper: PathBuf,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            user: default_auth_user(),
            change_helper: default_change_helper(),
        }
    }
}

fn default_auth_user() -> String {
    "nodo".into()
}
fn default_change_helper() -> PathBuf {
    PathBuf::from("/home/nodo/scripts/change-password.sh")
}

/// systemd units included in the periodic service status sweep.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicesConfig {
    #[serde(default = "default_watched_services")]
    pub watched: Vec<String>,
}

impl Default for ServicesConfig {
    fn default() -> Self {
        Self {
            watched: default_watched_services(),
        }
    }
}

impl ServicesConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if let Some(bad) = self.watched.iter().find(|s| s.trim().is_empty()) {
            return Err(ConfigError::Validation(format!(
                "services.watched contains an empty unit name ({bad:?})"
            )));
        }
        Ok(())
    }
}

fn default_watched_services() -> Vec<String> {
    ["monerod", "monero-lws", "block-explorer", "tor", "i2pd", "xmrig"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}
