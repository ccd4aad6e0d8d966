use nodo_core::types::{ConnectivityState, TelemetrySnapshot};
use serde::{Deserialize, Serialize};

/// Requests accepted from the UI.
///
/// Payloads may carry secrets (passwords, LWS view keys). Log
/// [`Command::name`] rather than the value.
#[derive(Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
#[serde(rename_all = "snake_case")]
pub enum Command {
    StartRecovery {
        recover_fs: bool,
        rsync_blockchain: bool,
    },
    ChangeServiceStatus {
        operation: String,
        service: String,
    },
    Restart,
    Update,
    Shutdown,
    SetBacklightLevel {
        level: i32,
    },
    GetBacklightLevel,
    SetPassword {
        password: String,
    },
    ChangePassword {
        old_password: String,
        new_password: String,
    },
    GetBlockchainStorageStatus,
    FactoryResetApproved,
    GetConnectionStatus,
    StartSyncStatusUpdate,
    GetSyncPercentage,

    // Light-wallet-server
    LwsAddAccount {
        address: String,
        private_key: String,
    },
    LwsDeleteAccount {
        address: String,
    },
    LwsReactivateAccount {
        address: String,
    },
    LwsDeactivateAccount {
        address: String,
    },
    LwsRescan {
        address: String,
        height: String,
    },
    LwsAcceptAllRequests {
        requests: String,
    },
    LwsAcceptRequest {
        address: String,
    },
    LwsRejectRequest {
        address: String,
    },
    LwsGetAccountList,
    LwsGetRequestList,
    LwsListAccounts,
    LwsListRequests,
}

impl Command {
    /// Stable, secret-free name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Command::StartRecovery { .. } => "start_recovery",
            Command::ChangeServiceStatus { .. } => "change_service_status",
            Command::Restart => "restart",
            Command::Update => "update",
            Command::Shutdown => "shutdown",
            Command::SetBacklightLevel { .. } => "set_backlight_level",
            Command::GetBacklightLevel => "get_backlight_level",
            Command::SetPassword { .. } => "set_password",
            Command::ChangePassword { .. } => "change_password",
            Command::GetBlockchainStorageStatus => "get_blockchain_storage_status",
            Command::FactoryResetApproved => "factory_reset_approved",
            Command::GetConnectionStatus => "get_connection_status",
            Command::StartSyncStatusUpdate => "start_sync_status_update",
            Command::GetSyncPercentage => "get_sync_percentage",
            Command::LwsAddAccount { .. } => "lws_add_account",
            Command::LwsDeleteAccount { .. } => "lws_delete_account",
            Command::LwsReactivateAccount { .. } => "lws_reactivate_account",
            Command::LwsDeactivateAccount { .. } => "lws_deactivate_account",
            Command::LwsRescan { .. } => "lws_rescan",
            Command::LwsAcceptAllRequests { .. } => "lws_accept_all_requests",
            Command::LwsAcceptRequest { .. } => "lws_accept_request",
            Command::LwsRejectRequest { .. } => "lws_reject_request",
            Command::LwsGetAccountList => "lws_get_account_list",
            Command::LwsGetRequestList => "lws_get_request_list",
            Command::LwsListAccounts => "lws_list_accounts",
            Command::LwsListRequests => "lws_list_requests",
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Command").field(&self.name()).finish()
    }
}

/// Immediate answer to a [`Command`]. Outcomes of delegated work arrive
/// later as [`Notification`]s.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    /// Request was forwarded (or applied locally) and returns nothing.
    Accepted,
    Value(i32),
    Text(String),
    /// Request failed a type or range check and was not forwarded.
    Rejected { reason: String },
}

impl Reply {
    pub fn rejected(reason: impl Into<String>) -> Self {
        Reply::Rejected {
            reason: reason.into(),
        }
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, Reply::Rejected { .. })
    }
}

/// Fire-and-forget events pushed to the UI.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", content = "payload")]
#[serde(rename_all = "snake_case")]
pub enum Notification {
    ConnectivityChanged {
        state: ConnectivityState,
    },
    HardwareStatusReady(TelemetrySnapshot),
    SyncStatusReady {
        height: u64,
        target_height: u64,
        percentage: u32,
    },
    SyncStatusFailed {
        reason: String,
    },

    RecoveryProgress {
        message: String,
    },
    RecoveryCompleted {
        success: bool,
    },
    ServiceStatusReady {
        operation: String,
        service: String,
        success: bool,
        message: String,
    },
    ServiceManagerStatus {
        message: String,
    },
    PasswordChangeStatus {
        code: i32,
    },

    RestartStarted,
    ShutdownStarted,
    UpdateRequested,
    UpdateStarted,
    UpdateCompleted {
        success: bool,
    },
    FactoryResetRequested,
    FactoryResetStarted,
    FactoryResetCompleted {
        success: bool,
    },
    PowerButtonPressed,
    PowerButtonReleased,

    LwsAccountAdded,
    LwsListAccountsCompleted,
    LwsListRequestsCompleted,
    LwsOperationFailed {
        operation: String,
        message: String,
    },
}

impl Notification {
    /// Event name as exposed on the bus.
    pub fn kind(&self) -> &'static str {
        match self {
            Notification::ConnectivityChanged { .. } => "connectivity_changed",
            Notification::HardwareStatusReady(_) => "hardware_status_ready",
            Notification::SyncStatusReady { .. } => "sync_status_ready",
            Notification::SyncStatusFailed { .. } => "sync_status_failed",
            Notification::RecoveryProgress { .. } => "recovery_progress",
            Notification::RecoveryCompleted { .. } => "recovery_completed",
            Notification::ServiceStatusReady { .. } => "service_status_ready",
            Notification::ServiceManagerStatus { .. } => "service_manager_status",
            Notification::PasswordChangeStatus { .. } => "password_change_status",
            Notification::RestartStarted => "restart_started",
            Notification::ShutdownStarted => "shutdown_started",
            Notification::UpdateRequested => "update_requested",
            Notification::UpdateStarted => "update_started",
            Notification::UpdateCompleted { .. } => "update_completed",
            Notification::FactoryResetRequested => "factory_reset_requested",
            Notification::FactoryResetStarted => "factory_reset_started",
            Notification::FactoryResetCompleted { .. } => "factory_reset_completed",
            Notification::PowerButtonPressed => "power_button_pressed",
            Notification::PowerButtonReleased => "power_button_released",
            Notification::LwsAccountAdded => "lws_account_added",
            Notification::LwsListAccountsCompleted => "lws_list_accounts_completed",
            Notification::LwsListRequestsCompleted => "lws_list_requests_completed",
            Notification::LwsOperationFailed { .. } => "lws_operation_failed",
        }
    }
}
