#![allow(dead_code)]

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nodo_bridge::protocol::Notification;
use nodo_core::types::{CpuSample, StorageUsage};
use nodo_daemon::metrics::{GpuFrequencies, MemoryUsage, MetricSource};
use nodo_daemon::workers::{
    Authenticator, LwsBackend, RecoveryWorker, ServiceManager, ServiceOperation, SystemControl,
    WorkerError, WorkerEvent, WorkerSender, Workers,
};

/// Records every worker call and answers from canned results.
#[derive(Default)]
pub struct FakeWorkers {
    pub calls: Mutex<Vec<String>>,
    pub fail: Mutex<bool>,
    pub recovery_delay: Mutex<Duration>,
    pub status_delay: Mutex<Duration>,
    pub accounts: Mutex<String>,
    pub requests: Mutex<String>,
}

impl FakeWorkers {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            accounts: Mutex::new(r#"{"active":[]}"#.to_string()),
            requests: Mutex::new(r#"{"create":[]}"#.to_string()),
            ..Default::default()
        })
    }

    pub fn failing() -> Arc<Self> {
        let w = Self::new();
        *w.fail.lock().unwrap() = true;
        w
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) -> Result<(), WorkerError> {
        self.calls.lock().unwrap().push(call.into());
        if *self.fail.lock().unwrap() {
            Err(WorkerError::Failed {
                program: "fake".into(),
                code: Some(1),
                stderr: "boom".into(),
            })
        } else {
            Ok(())
        }
    }

    pub fn workers(self: &Arc<Self>) -> Workers {
        Workers {
            recovery: self.clone(),
            services: self.clone(),
            system: self.clone(),
            auth: self.clone(),
            lws: self.clone(),
        }
    }
}

#[async_trait]
impl RecoveryWorker for FakeWorkers {
    async fn run_recovery(
        &self,
        recover_fs: bool,
        rsync_blockchain: bool,
        progress: WorkerSender,
    ) -> Result<(), WorkerError> {
        let delay = *self.recovery_delay.lock().unwrap();
        let _ = progress.send(WorkerEvent::RecoveryProgress("checking filesystem".into()));
        tokio::time::sleep(delay).await;
        self.record(format!("recovery {recover_fs} {rsync_blockchain}"))
    }
}

#[async_trait]
impl ServiceManager for FakeWorkers {
    async fn change(&self, operation: ServiceOperation, service: &str) -> Result<String, WorkerError> {
        self.record(format!("systemctl {operation} {service}"))?;
        Ok(format!("{service} {operation} ok"))
    }

    async fn status_report(&self) -> Result<String, WorkerError> {
        self.record("status")?;
        let delay = *self.status_delay.lock().unwrap();
        tokio::time::sleep(delay).await;
        Ok(r#"{"monerod":"active"}"#.to_string())
    }
}

#[async_trait]
impl SystemControl for FakeWorkers {
    async fn restart(&self) -> Result<(), WorkerError> {
        self.record("reboot")
    }
    async fn shutdown(&self) -> Result<(), WorkerError> {
        self.record("poweroff")
    }
    async fn update(&self) -> Result<(), WorkerError> {
        self.record("update")
    }
    async fn factory_reset(&self) -> Result<(), WorkerError> {
        self.record("factory_reset")
    }
    async fn first_boot_setup(&self) -> Result<(), WorkerError> {
        self.record("first_boot")
    }
}

#[async_trait]
impl Authenticator for FakeWorkers {
    async fn set_password(&self, _password: &str) -> Result<(), WorkerError> {
        self.record("set_password")
    }

    async fn change_password(&self, old: &str, _new: &str) -> Result<(), WorkerError> {
        self.record("change_password")?;
        if old == "correct" {
            Ok(())
        } else {
            Err(WorkerError::Rejected("wrong password".into()))
        }
    }
}

#[async_trait]
impl LwsBackend for FakeWorkers {
    async fn add_account(&self, address: &str, _private_key: &str) -> Result<(), WorkerError> {
        self.record(format!("add_account {address}"))
    }
    async fn delete_account(&self, address: &str) -> Result<(), WorkerError> {
        self.record(format!("delete_account {address}"))
    }
    async fn set_account_active(&self, address: &str, active: bool) -> Result<(), WorkerError> {
        self.record(format!("set_active {address} {active}"))
    }
    async fn rescan(&self, address: &str, height: u64) -> Result<(), WorkerError> {
        self.record(format!("rescan {address} {height}"))
    }
    async fn accept_requests(&self, addresses: &[String]) -> Result<(), WorkerError> {
        self.record(format!("accept {}", addresses.join(",")))
    }
    async fn reject_request(&self, address: &str) -> Result<(), WorkerError> {
        self.record(format!("reject {address}"))
    }
    async fn list_accounts(&self) -> Result<String, WorkerError> {
        self.record("list_accounts")?;
        Ok(self.accounts.lock().unwrap().clone())
    }
    async fn list_requests(&self) -> Result<String, WorkerError> {
        self.record("list_requests")?;
        Ok(self.requests.lock().unwrap().clone())
    }
}

/// Metric source with fixed values. `None` fields model failing readers.
#[derive(Default)]
pub struct FakeMetrics {
    pub cpu: Mutex<Vec<CpuSample>>,
    pub memory: Option<MemoryUsage>,
    pub temperature: Option<f64>,
    pub storage: Mutex<Option<StorageUsage>>,
}

impl FakeMetrics {
    pub fn with_storage(usage: Option<StorageUsage>) -> Arc<Self> {
        Arc::new(Self {
            storage: Mutex::new(usage),
            ..Default::default()
        })
    }
}

impl MetricSource for FakeMetrics {
    fn cpu_sample(&self) -> Option<CpuSample> {
        let mut samples = self.cpu.lock().unwrap();
        if samples.is_empty() {
            None
        } else {
            Some(samples.remove(0))
        }
    }
    fn average_cpu_freq_mhz(&self) -> Option<f64> {
        None
    }
    fn memory(&self) -> Option<MemoryUsage> {
        self.memory
    }
    fn cpu_temperature(&self) -> Option<f64> {
        self.temperature
    }
    fn gpu_usage(&self) -> Option<f64> {
        None
    }
    fn gpu_frequencies(&self) -> Option<GpuFrequencies> {
        None
    }
    fn storage(&self, _mount: &Path) -> Option<StorageUsage> {
        *self.storage.lock().unwrap()
    }
}

/// Wait for the first notification matching `pred`, failing after 2s.
pub async fn wait_for<F>(rx: &flume::Receiver<Notification>, mut pred: F) -> Notification
where
    F: FnMut(&Notification) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let n = rx.recv_async().await.expect("bus closed");
            if pred(&n) {
                return n;
            }
        }
    })
    .await
    .expect("timed out waiting for notification")
}
