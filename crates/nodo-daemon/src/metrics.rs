//! Raw device metric readers.
//!
//! Every reader returns `None` when its source is missing or unparseable;
//! the collector substitutes the sentinel so a cycle is never skipped.

use std::path::{Path, PathBuf};

use nodo_core::config::PathsConfig;
use nodo_core::types::{CpuSample, StorageUsage};

/// Memory usage as reported by `/proc/meminfo`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MemoryUsage {
    pub used_percent: f64,
    pub total_gib: f64,
}

/// GPU devfreq clocks in MHz.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpuFrequencies {
    pub min_mhz: f64,
    pub max_mhz: f64,
    pub current_mhz: f64,
}

/// Synchronous, side-effect-free metric readers.
pub trait MetricSource: Send + Sync {
    fn cpu_sample(&self) -> Option<CpuSample>;
    fn average_cpu_freq_mhz(&self) -> Option<f64>;
    fn memory(&self) -> Option<MemoryUsage>;
    fn cpu_temperature(&self) -> Option<f64>;
    fn gpu_usage(&self) -> Option<f64>;
    fn gpu_frequencies(&self) -> Option<GpuFrequencies>;
    fn storage(&self, mount: &Path) -> Option<StorageUsage>;
}

/// Linux procfs/sysfs implementation.
#[derive(Debug, Clone)]
pub struct SysfsMetrics {
    proc_root: PathBuf,
    sys_root: PathBuf,
    gpu_devfreq: PathBuf,
}

impl SysfsMetrics {
    pub fn new(
        proc_root: impl Into<PathBuf>,
        sys_root: impl Into<PathBuf>,
        gpu_devfreq: impl Into<PathBuf>,
    ) -> Self {
        Self {
            proc_root: proc_root.into(),
            sys_root: sys_root.into(),
            gpu_devfreq: gpu_devfreq.into(),
        }
    }

    pub fn from_config(paths: &PathsConfig) -> Self {
        Self::new("/proc", "/sys", paths.gpu_devfreq_dir.clone())
    }

    fn read(path: &Path) -> Option<String> {
        std::fs::read_to_string(path).ok()
    }

    fn read_number(path: &Path) -> Option<f64> {
        Self::read(path)?.trim().parse().ok()
    }
}

impl MetricSource for SysfsMetrics {
    fn cpu_sample(&self) -> Option<CpuSample> {
        parse_proc_stat(&Self::read(&self.proc_root.join("stat"))?)
    }

    fn average_cpu_freq_mhz(&self) -> Option<f64> {
        let cpu_dir = self.sys_root.join("devices/system/cpu");
        let mut freqs = Vec::new();
        for entry in std::fs::read_dir(cpu_dir).ok()?.flatten() {
            let name = entry.file_name();
            let name = name.to_string_lossy();
            let is_core = name
                .strip_prefix("cpu")
                .is_some_and(|n| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()));
            if !is_core {
                continue;
            }
            // scaling_cur_freq is in kHz.
            if let Some(khz) = Self::read_number(&entry.path().join("cpufreq/scaling_cur_freq")) {
                freqs.push(khz / 1000.0);
            }
        }
        if freqs.is_empty() {
            None
        } else {
            Some(freqs.iter().sum::<f64>() / freqs.len() as f64)
        }
    }

    fn memory(&self) -> Option<MemoryUsage> {
        parse_meminfo(&Self::read(&self.proc_root.join("meminfo"))?)
    }

    fn cpu_temperature(&self) -> Option<f64> {
        let millideg =
            Self::read_number(&self.sys_root.join("class/thermal/thermal_zone0/temp"))?;
        Some(millideg / 1000.0)
    }

    fn gpu_usage(&self) -> Option<f64> {
        parse_devfreq_load(&Self::read(&self.gpu_devfreq.join("load"))?)
    }

    fn gpu_frequencies(&self) -> Option<GpuFrequencies> {
        let mhz = |file: &str| Self::read_number(&self.gpu_devfreq.join(file)).map(|hz| hz / 1e6);
        Some(GpuFrequencies {
            min_mhz: mhz("min_freq")?,
            max_mhz: mhz("max_freq")?,
            current_mhz: mhz("cur_freq")?,
        })
    }

    fn storage(&self, mount: &Path) -> Option<StorageUsage> {
        statvfs_usage(mount)
    }
}

/// Parse the aggregate `cpu` line of `/proc/stat`.
///
/// Idle time is `idle + iowait`; total is the sum of all columns.
pub fn parse_proc_stat(text: &str) -> Option<CpuSample> {
    let line = text.lines().find(|l| l.starts_with("cpu "))?;
    let vals: Vec<u64> = line
        .split_whitespace()
        .skip(1)
        .filter_map(|s| s.parse().ok())
        .collect();
    if vals.len() < 4 {
        return None;
    }
    let idle = vals[3] + vals.get(4).copied().unwrap_or(0);
    let total = vals.iter().sum();
    Some(CpuSample::new(idle, total))
}

/// Parse `/proc/meminfo`, using `MemAvailable` for the free figure.
pub fn parse_meminfo(text: &str) -> Option<MemoryUsage> {
    let field = |key: &str| -> Option<u64> {
        text.lines()
            .find(|l| l.starts_with(key))?
            .split_whitespace()
            .nth(1)?
            .parse()
            .ok()
    };
    let total_kb = field("MemTotal:")?;
    let avail_kb = field("MemAvailable:")?;
    if total_kb == 0 {
        return None;
    }
    let used_kb = total_kb.saturating_sub(avail_kb);
    Some(MemoryUsage {
        used_percent: used_kb as f64 / total_kb as f64 * 100.0,
        total_gib: total_kb as f64 / (1024.0 * 1024.0),
    })
}

/// Parse a devfreq `load` file, e.g. `37@800000000Hz`.
pub fn parse_devfreq_load(text: &str) -> Option<f64> {
    text.trim().split('@').next()?.trim().parse().ok()
}

fn statvfs_usage(path: &Path) -> Option<StorageUsage> {
    use std::ffi::CString;
    use std::os::unix::ffi::OsStrExt;

    let c_path = CString::new(path.as_os_str().as_bytes()).ok()?;
    // SAFETY: statvfs is plain old data; zeroed is a valid initial value.
    let mut st: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: c_path is NUL-terminated and st is a valid out pointer.
    let rc = unsafe { libc::statvfs(c_path.as_ptr(), &mut st) };
    if rc != 0 {
        return None;
    }
    let frsize = st.f_frsize as u64;
    let total = st.f_blocks as u64 * frsize;
    let free = st.f_bfree as u64 * frsize;
    Some(StorageUsage {
        used_bytes: total.saturating_sub(free),
        total_bytes: total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn proc_stat_counts_iowait_as_idle() {
        let text = "cpu  100 0 50 800 50 0 0 0 0 0\ncpu0 50 0 25 400 25 0 0 0 0 0\n";
        let s = parse_proc_stat(text).unwrap();
        assert_eq!(s.idle, 850);
        assert_eq!(s.total, 1000);
    }

    #[test]
    fn proc_stat_without_aggregate_line() {
        assert!(parse_proc_stat("intr 1 2 3\n").is_none());
        assert!(parse_proc_stat("cpu  1 2\n").is_none());
    }

    #[test]
    fn meminfo_used_percent() {
        let text = "MemTotal:       8000000 kB\nMemFree:        1000000 kB\nMemAvailable:   6000000 kB\n";
        let m = parse_meminfo(text).unwrap();
        assert!((m.used_percent - 25.0).abs() < 1e-9);
        assert!(m.total_gib > 7.6 && m.total_gib < 7.7);
    }

    #[test]
    fn meminfo_missing_available() {
        assert!(parse_meminfo("MemTotal: 100 kB\n").is_none());
    }

    #[test]
    fn devfreq_load_formats() {
        assert_eq!(parse_devfreq_load("37@800000000Hz\n"), Some(37.0));
        assert_eq!(parse_devfreq_load("12"), Some(12.0));
        assert_eq!(parse_devfreq_load("busy"), None);
    }

    #[test]
    fn statvfs_on_root_reports_capacity() {
        let usage = statvfs_usage(Path::new("/")).expect("root is mounted");
        assert!(usage.total_bytes > 0);
        assert!(usage.used_bytes <= usage.total_bytes);
    }

    #[test]
    fn statvfs_on_missing_path() {
        assert!(statvfs_usage(Path::new("/definitely/not/here")).is_none());
    }
}
