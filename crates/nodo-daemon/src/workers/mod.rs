//! Narrow interfaces to the subsystems that do the privileged work.
//!
//! The dispatcher calls these from spawned tasks and never awaits them on
//! the caller's path. Results flow back as [`WorkerEvent`]s over a flume
//! queue that the daemon loop drains.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;

pub mod process;

/// Sending half of the worker result queue.
pub type WorkerSender = flume::Sender<WorkerEvent>;

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum WorkerError {
    #[error("failed to launch {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("{program} exited with status {code:?}: {stderr}")]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The worker understood the request and refused it.
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Result of delegated work, delivered to the daemon loop.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerEvent {
    RecoveryProgress(String),
    RecoveryFinished {
        success: bool,
    },
    ServiceChanged {
        operation: ServiceOperation,
        service: String,
        result: Result<String, String>,
    },
    ServiceReport(String),
    UpdateFinished {
        success: bool,
    },
    FactoryResetFinished {
        success: bool,
    },
    PasswordStatus(PasswordStatus),
    LwsAccountAdded,
    LwsAccounts(String),
    LwsRequests(String),
    LwsFailed {
        operation: &'static str,
        message: String,
    },

    // Raised by input workers rather than by a dispatched command.
    UpdateRequested,
    FactoryResetRequested,
    PowerButtonPressed,
    PowerButtonReleased,
}

/// Outcome code carried by the password-change-status notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordStatus {
    Changed,
    WrongPassword,
    Error,
}

impl PasswordStatus {
    pub fn code(self) -> i32 {
        match self {
            PasswordStatus::Changed => 0,
            PasswordStatus::WrongPassword => 1,
            PasswordStatus::Error => 2,
        }
    }

    pub fn from_result(result: &Result<(), WorkerError>) -> Self {
        match result {
            Ok(()) => PasswordStatus::Changed,
            Err(WorkerError::Rejected(_)) => PasswordStatus::WrongPassword,
            Err(_) => PasswordStatus::Error,
        }
    }
}

/// systemd verbs the UI may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceOperation {
    Start,
    Stop,
    Restart,
    Enable,
    Disable,
}

impl ServiceOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            ServiceOperation::Start => "start",
            ServiceOperation::Stop => "stop",
            ServiceOperation::Restart => "restart",
            ServiceOperation::Enable => "enable",
            ServiceOperation::Disable => "disable",
        }
    }
}

impl FromStr for ServiceOperation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "start" => Ok(ServiceOperation::Start),
            "stop" => Ok(ServiceOperation::Stop),
            "restart" => Ok(ServiceOperation::Restart),
            "enable" => Ok(ServiceOperation::Enable),
            "disable" => Ok(ServiceOperation::Disable),
            other => Err(format!("unknown service operation '{other}'")),
        }
    }
}

impl std::fmt::Display for ServiceOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[async_trait]
pub trait RecoveryWorker: Send + Sync {
    /// Run recovery to completion, reporting progress lines on `progress`.
    async fn run_recovery(
        &self,
        recover_fs: bool,
        rsync_blockchain: bool,
        progress: WorkerSender,
    ) -> Result<(), WorkerError>;
}

#[async_trait]
pub trait ServiceManager: Send + Sync {
    async fn change(&self, operation: ServiceOperation, service: &str) -> Result<String, WorkerError>;

    /// Status of every watched service, as a JSON object text.
    async fn status_report(&self) -> Result<String, WorkerError>;
}

/// OS-level lifecycle operations.
#[async_trait]
pub trait SystemControl: Send + Sync {
    async fn restart(&self) -> Result<(), WorkerError>;
    async fn shutdown(&self) -> Result<(), WorkerError>;
    async fn update(&self) -> Result<(), WorkerError>;
    async fn factory_reset(&self) -> Result<(), WorkerError>;
    async fn first_boot_setup(&self) -> Result<(), WorkerError>;
}

#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn set_password(&self, password: &str) -> Result<(), WorkerError>;

    /// Returns [`WorkerError::Rejected`] when `old` does not match.
    async fn change_password(&self, old: &str, new: &str) -> Result<(), WorkerError>;
}

/// Light-wallet-server account and request administration.
#[async_trait]
pub trait LwsBackend: Send + Sync {
    async fn add_account(&self, address: &str, private_key: &str) -> Result<(), WorkerError>;
    async fn delete_account(&self, address: &str) -> Result<(), WorkerError>;
    async fn set_account_active(&self, address: &str, active: bool) -> Result<(), WorkerError>;
    async fn rescan(&self, address: &str, height: u64) -> Result<(), WorkerError>;
    async fn accept_requests(&self, addresses: &[String]) -> Result<(), WorkerError>;
    async fn reject_request(&self, address: &str) -> Result<(), WorkerError>;
    async fn list_accounts(&self) -> Result<String, WorkerError>;
    async fn list_requests(&self) -> Result<String, WorkerError>;
}

/// The full set of workers the dispatcher fans out to.
#[derive(Clone)]
pub struct Workers {
    pub recovery: Arc<dyn RecoveryWorker>,
    pub services: Arc<dyn ServiceManager>,
    pub system: Arc<dyn SystemControl>,
    pub auth: Arc<dyn Authenticator>,
    pub lws: Arc<dyn LwsBackend>,
}
