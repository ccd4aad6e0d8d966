//! Single entry point for UI commands.
//!
//! Local operations (backlight, storage status, connection status, cached
//! lists) answer directly. Everything else is handed to a worker on a
//! spawned task; the outcome comes back as a [`WorkerEvent`] and is turned
//! into a [`Notification`] by [`Dispatcher::on_worker_event`].

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use nodo_bridge::event_bus::EventBus;
use nodo_bridge::ipc::CommandHandler;
use nodo_bridge::protocol::{Command, Notification, Reply};
use nodo_core::types::StorageStatus;
use tracing::{debug, info, warn};

use crate::backlight::{Backlight, BacklightError};
use crate::connectivity::ConnectivityHandle;
use crate::metrics::MetricSource;
use crate::sync_info::SyncStatusPoller;
use crate::workers::{
    LwsBackend, PasswordStatus, ServiceOperation, WorkerEvent, WorkerSender, Workers,
};

/// Contract violations, answered synchronously and never forwarded.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("{0}")]
    UnknownOperation(String),
    #[error("service name is empty")]
    EmptyService,
    #[error("address is empty")]
    EmptyAddress,
    #[error("rescan height '{0}' is not a block number")]
    InvalidHeight(String),
    #[error("no request addresses given")]
    NoRequests,
    #[error("recovery already running")]
    RecoveryRunning,
    #[error(transparent)]
    Backlight(#[from] BacklightError),
}

/// Everything the dispatcher needs from the composition root.
pub struct DispatcherDeps {
    pub workers: Workers,
    pub bus: EventBus,
    pub events: WorkerSender,
    pub connectivity: ConnectivityHandle,
    pub backlight: Backlight,
    pub metrics: Arc<dyn MetricSource>,
    pub blockchain_mount: PathBuf,
    pub sync: SyncStatusPoller,
}

/// Decrements the in-flight counter when a delegated task ends.
struct InFlight(Arc<AtomicUsize>);

impl InFlight {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(counter))
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Clears a busy flag however the owning task ends.
struct FlagGuard(Arc<AtomicBool>);

impl Drop for FlagGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

fn emit(events: &WorkerSender, event: WorkerEvent) {
    if events.send(event).is_err() {
        debug!("worker event queue closed");
    }
}

fn lws_failed(operation: &'static str, err: impl std::fmt::Display) -> WorkerEvent {
    WorkerEvent::LwsFailed {
        operation,
        message: err.to_string(),
    }
}

async fn refresh_accounts(lws: &dyn LwsBackend, events: &WorkerSender) {
    let event = match lws.list_accounts().await {
        Ok(text) => WorkerEvent::LwsAccounts(text),
        Err(e) => lws_failed("list_accounts", e),
    };
    emit(events, event);
}

async fn refresh_requests(lws: &dyn LwsBackend, events: &WorkerSender) {
    let event = match lws.list_requests().await {
        Ok(text) => WorkerEvent::LwsRequests(text),
        Err(e) => lws_failed("list_requests", e),
    };
    emit(events, event);
}

fn non_empty(address: &str) -> Result<String, DispatchError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(DispatchError::EmptyAddress);
    }
    Ok(address.to_string())
}

/// Accepts a JSON array of addresses or a comma/whitespace separated list.
pub fn parse_request_list(requests: &str) -> Vec<String> {
    let parsed = serde_json::from_str::<Vec<String>>(requests).unwrap_or_else(|_| {
        requests
            .split(|c: char| c == ',' || c.is_whitespace())
            .map(str::to_string)
            .collect()
    });
    parsed
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

pub struct Dispatcher {
    workers: Workers,
    bus: EventBus,
    events: WorkerSender,
    connectivity: ConnectivityHandle,
    backlight: Backlight,
    metrics: Arc<dyn MetricSource>,
    blockchain_mount: PathBuf,
    sync: SyncStatusPoller,
    account_list: Mutex<String>,
    request_list: Mutex<String>,
    in_flight: Arc<AtomicUsize>,
    recovery_running: Arc<AtomicBool>,
    report_running: Arc<AtomicBool>,
}

impl Dispatcher {
    pub fn new(deps: DispatcherDeps) -> Self {
        Self {
            workers: deps.workers,
            bus: deps.bus,
            events: deps.events,
            connectivity: deps.connectivity,
            backlight: deps.backlight,
            metrics: deps.metrics,
            blockchain_mount: deps.blockchain_mount,
            sync: deps.sync,
            account_list: Mutex::new(String::new()),
            request_list: Mutex::new(String::new()),
            in_flight: Arc::new(AtomicUsize::new(0)),
            recovery_running: Arc::new(AtomicBool::new(false)),
            report_running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Number of delegated worker calls that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn sync_poller(&self) -> &SyncStatusPoller {
        &self.sync
    }

    /// Run `work` on its own task. Must be called inside a tokio runtime.
    fn delegate<F, Fut>(&self, operation: &'static str, work: F)
    where
        F: FnOnce(Workers, WorkerSender) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let guard = InFlight::enter(&self.in_flight);
        let fut = work(self.workers.clone(), self.events.clone());
        tokio::spawn(async move {
            let _guard = guard;
            fut.await;
            debug!(operation, "worker call finished");
        });
    }

    // -- recovery ----------------------------------------------------------

    pub fn start_recovery(&self, recover_fs: bool, rsync_blockchain: bool) -> Result<(), DispatchError> {
        if self.recovery_running.swap(true, Ordering::SeqCst) {
            return Err(DispatchError::RecoveryRunning);
        }
        let running = FlagGuard(Arc::clone(&self.recovery_running));
        info!(recover_fs, rsync_blockchain, "recovery requested");
        self.delegate("start_recovery", move |w, events| async move {
            let _running = running;
            let result = w
                .recovery
                .run_recovery(recover_fs, rsync_blockchain, events.clone())
                .await;
            if let Err(e) = &result {
                warn!(error = %e, "recovery failed");
            }
            emit(&events, WorkerEvent::RecoveryFinished { success: result.is_ok() });
        });
        Ok(())
    }

    pub fn is_recovery_running(&self) -> bool {
        self.recovery_running.load(Ordering::SeqCst)
    }

    // -- services ----------------------------------------------------------

    pub fn change_service_status(&self, operation: &str, service: &str) -> Result<(), DispatchError> {
        let operation: ServiceOperation =
            operation.parse().map_err(DispatchError::UnknownOperation)?;
        let service = service.trim();
        if service.is_empty() {
            return Err(DispatchError::EmptyService);
        }
        let service = service.to_string();
        info!(%operation, %service, "service change requested");
        self.delegate("change_service_status", move |w, events| async move {
            let result = w
                .services
                .change(operation, &service)
                .await
                .map_err(|e| e.to_string());
            emit(
                &events,
                WorkerEvent::ServiceChanged {
                    operation,
                    service,
                    result,
                },
            );
        });
        Ok(())
    }

    /// Ask the service manager for a status sweep. Returns false, without
    /// starting another, while the previous sweep is still outstanding.
    pub fn request_service_report(&self) -> bool {
        if self.report_running.swap(true, Ordering::SeqCst) {
            debug!("service status sweep still running, skipping");
            return false;
        }
        let running = FlagGuard(Arc::clone(&self.report_running));
        self.delegate("service_status_report", move |w, events| async move {
            let _running = running;
            match w.services.status_report().await {
                Ok(report) => emit(&events, WorkerEvent::ServiceReport(report)),
                Err(e) => warn!(error = %e, "service status sweep failed"),
            }
        });
        true
    }

    // -- system lifecycle --------------------------------------------------

    pub fn restart(&self) {
        self.bus.publish(Notification::RestartStarted);
        self.delegate("restart", |w, _| async move {
            if let Err(e) = w.system.restart().await {
                warn!(error = %e, "restart failed");
            }
        });
    }

    pub fn shutdown(&self) {
        self.bus.publish(Notification::ShutdownStarted);
        self.delegate("shutdown", |w, _| async move {
            if let Err(e) = w.system.shutdown().await {
                warn!(error = %e, "poweroff failed");
            }
        });
    }

    pub fn update(&self) {
        self.bus.publish(Notification::UpdateStarted);
        self.delegate("update", |w, events| async move {
            let result = w.system.update().await;
            if let Err(e) = &result {
                warn!(error = %e, "update failed");
            }
            emit(&events, WorkerEvent::UpdateFinished { success: result.is_ok() });
        });
    }

    pub fn factory_reset_approved(&self) {
        self.bus.publish(Notification::FactoryResetStarted);
        self.delegate("factory_reset", |w, events| async move {
            let result = w.system.factory_reset().await;
            if let Err(e) = &result {
                warn!(error = %e, "factory reset failed");
            }
            emit(&events, WorkerEvent::FactoryResetFinished { success: result.is_ok() });
        });
    }

    // -- display -----------------------------------------------------------

    pub fn set_backlight_level(&self, level: i32) -> Result<(), DispatchError> {
        self.backlight.set(level)?;
        Ok(())
    }

    pub fn get_backlight_level(&self) -> i32 {
        self.backlight.get()
    }

    // -- passwords ---------------------------------------------------------

    pub fn set_password(&self, password: String) {
        self.delegate("set_password", move |w, events| async move {
            let result = w.auth.set_password(&password).await;
            emit(&events, WorkerEvent::PasswordStatus(PasswordStatus::from_result(&result)));
        });
    }

    pub fn change_password(&self, old_password: String, new_password: String) {
        self.delegate("change_password", move |w, events| async move {
            let result = w.auth.change_password(&old_password, &new_password).await;
            emit(&events, WorkerEvent::PasswordStatus(PasswordStatus::from_result(&result)));
        });
    }

    // -- status queries ----------------------------------------------------

    /// Read blockchain storage now and classify it.
    pub fn get_blockchain_storage_status(&self) -> i32 {
        StorageStatus::classify(self.metrics.storage(&self.blockchain_mount)).code()
    }

    pub fn get_connection_status(&self) -> i32 {
        self.connectivity.code()
    }

    pub fn start_sync_status_update(&self) {
        self.sync.start_sync_status_update();
    }

    pub fn get_sync_percentage(&self) -> u32 {
        self.sync.sync_percentage()
    }

    // -- light wallet server ------------------------------------------------

    pub fn add_account(&self, address: &str, private_key: String) -> Result<(), DispatchError> {
        let address = non_empty(address)?;
        self.delegate("lws_add_account", move |w, events| async move {
            match w.lws.add_account(&address, &private_key).await {
                Ok(()) => {
                    emit(&events, WorkerEvent::LwsAccountAdded);
                    refresh_accounts(w.lws.as_ref(), &events).await;
                }
                Err(e) => emit(&events, lws_failed("add_account", e)),
            }
        });
        Ok(())
    }

    pub fn delete_account(&self, address: &str) -> Result<(), DispatchError> {
        let address = non_empty(address)?;
        self.delegate("lws_delete_account", move |w, events| async move {
            match w.lws.delete_account(&address).await {
                Ok(()) => refresh_accounts(w.lws.as_ref(), &events).await,
                Err(e) => emit(&events, lws_failed("delete_account", e)),
            }
        });
        Ok(())
    }

    pub fn reactivate_account(&self, address: &str) -> Result<(), DispatchError> {
        self.set_account_active(address, true)
    }

    pub fn deactivate_account(&self, address: &str) -> Result<(), DispatchError> {
        self.set_account_active(address, false)
    }

    fn set_account_active(&self, address: &str, active: bool) -> Result<(), DispatchError> {
        let address = non_empty(address)?;
        let operation = if active {
            "reactivate_account"
        } else {
            "deactivate_account"
        };
        self.delegate(operation, move |w, events| async move {
            match w.lws.set_account_active(&address, active).await {
                Ok(()) => refresh_accounts(w.lws.as_ref(), &events).await,
                Err(e) => emit(&events, lws_failed(operation, e)),
            }
        });
        Ok(())
    }

    pub fn rescan(&self, address: &str, height: &str) -> Result<(), DispatchError> {
        let address = non_empty(address)?;
        let height: u64 = height
            .trim()
            .parse()
            .map_err(|_| DispatchError::InvalidHeight(height.to_string()))?;
        self.delegate("lws_rescan", move |w, events| async move {
            match w.lws.rescan(&address, height).await {
                Ok(()) => refresh_accounts(w.lws.as_ref(), &events).await,
                Err(e) => emit(&events, lws_failed("rescan", e)),
            }
        });
        Ok(())
    }

    pub fn accept_all_requests(&self, requests: &str) -> Result<(), DispatchError> {
        let addresses = parse_request_list(requests);
        if addresses.is_empty() {
            return Err(DispatchError::NoRequests);
        }
        self.delegate("lws_accept_all_requests", move |w, events| async move {
            match w.lws.accept_requests(&addresses).await {
                Ok(()) => {
                    refresh_requests(w.lws.as_ref(), &events).await;
                    refresh_accounts(w.lws.as_ref(), &events).await;
                }
                Err(e) => emit(&events, lws_failed("accept_all_requests", e)),
            }
        });
        Ok(())
    }

    pub fn accept_request(&self, address: &str) -> Result<(), DispatchError> {
        let address = non_empty(address)?;
        self.delegate("lws_accept_request", move |w, events| async move {
            match w.lws.accept_requests(std::slice::from_ref(&address)).await {
                Ok(()) => {
                    refresh_requests(w.lws.as_ref(), &events).await;
                    refresh_accounts(w.lws.as_ref(), &events).await;
                }
                Err(e) => emit(&events, lws_failed("accept_request", e)),
            }
        });
        Ok(())
    }

    pub fn reject_request(&self, address: &str) -> Result<(), DispatchError> {
        let address = non_empty(address)?;
        self.delegate("lws_reject_request", move |w, events| async move {
            match w.lws.reject_request(&address).await {
                Ok(()) => refresh_requests(w.lws.as_ref(), &events).await,
                Err(e) => emit(&events, lws_failed("reject_request", e)),
            }
        });
        Ok(())
    }

    /// Last account list reported by the wallet server.
    pub fn get_account_list(&self) -> String {
        self.account_list
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Last request list reported by the wallet server.
    pub fn get_request_list(&self) -> String {
        self.request_list
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn list_accounts(&self) {
        self.delegate("lws_list_accounts", |w, events| async move {
            refresh_accounts(w.lws.as_ref(), &events).await;
        });
    }

    pub fn list_requests(&self) {
        self.delegate("lws_list_requests", |w, events| async move {
            refresh_requests(w.lws.as_ref(), &events).await;
        });
    }

    // -- worker results ------------------------------------------------------

    /// Turn a worker result into its notification, updating local caches.
    pub fn on_worker_event(&self, event: WorkerEvent) {
        let notification = match event {
            WorkerEvent::RecoveryProgress(message) => Notification::RecoveryProgress { message },
            WorkerEvent::RecoveryFinished { success } => Notification::RecoveryCompleted { success },
            WorkerEvent::ServiceChanged {
                operation,
                service,
                result,
            } => {
                let (success, message) = match result {
                    Ok(msg) => (true, msg),
                    Err(msg) => (false, msg),
                };
                Notification::ServiceStatusReady {
                    operation: operation.as_str().to_string(),
                    service,
                    success,
                    message,
                }
            }
            WorkerEvent::ServiceReport(message) => Notification::ServiceManagerStatus { message },
            WorkerEvent::UpdateFinished { success } => Notification::UpdateCompleted { success },
            WorkerEvent::FactoryResetFinished { success } => {
                Notification::FactoryResetCompleted { success }
            }
            WorkerEvent::PasswordStatus(status) => Notification::PasswordChangeStatus {
                code: status.code(),
            },
            WorkerEvent::LwsAccountAdded => Notification::LwsAccountAdded,
            WorkerEvent::LwsAccounts(text) => {
                *self.account_list.lock().unwrap_or_else(|e| e.into_inner()) = text;
                Notification::LwsListAccountsCompleted
            }
            WorkerEvent::LwsRequests(text) => {
                *self.request_list.lock().unwrap_or_else(|e| e.into_inner()) = text;
                Notification::LwsListRequestsCompleted
            }
            WorkerEvent::LwsFailed { operation, message } => {
                warn!(operation, %message, "wallet server operation failed");
                Notification::LwsOperationFailed {
                    operation: operation.to_string(),
                    message,
                }
            }
            WorkerEvent::UpdateRequested => Notification::UpdateRequested,
            WorkerEvent::FactoryResetRequested => Notification::FactoryResetRequested,
            WorkerEvent::PowerButtonPressed => Notification::PowerButtonPressed,
            WorkerEvent::PowerButtonReleased => Notification::PowerButtonReleased,
        };
        debug!(kind = notification.kind(), "publishing worker result");
        self.bus.publish(notification);
    }
}

fn accepted(result: Result<(), DispatchError>) -> Reply {
    match result {
        Ok(()) => Reply::Accepted,
        Err(e) => Reply::rejected(e.to_string()),
    }
}

#[async_trait]
impl CommandHandler for Dispatcher {
    async fn handle(&self, command: Command) -> Reply {
        debug!(command = command.name(), "dispatching");
        match command {
            Command::StartRecovery {
                recover_fs,
                rsync_blockchain,
            } => accepted(self.start_recovery(recover_fs, rsync_blockchain)),
            Command::ChangeServiceStatus { operation, service } => {
                accepted(self.change_service_status(&operation, &service))
            }
            Command::Restart => {
                self.restart();
                Reply::Accepted
            }
            Command::Update => {
                self.update();
                Reply::Accepted
            }
            Command::Shutdown => {
                self.shutdown();
                Reply::Accepted
            }
            Command::SetBacklightLevel { level } => accepted(self.set_backlight_level(level)),
            Command::GetBacklightLevel => Reply::Value(self.get_backlight_level()),
            Command::SetPassword { password } => {
                self.set_password(password);
                Reply::Accepted
            }
            Command::ChangePassword {
                old_password,
                new_password,
            } => {
                self.change_password(old_password, new_password);
                Reply::Accepted
            }
            Command::GetBlockchainStorageStatus => {
                Reply::Value(self.get_blockchain_storage_status())
            }
            Command::FactoryResetApproved => {
                self.factory_reset_approved();
                Reply::Accepted
            }
            Command::GetConnectionStatus => Reply::Value(self.get_connection_status()),
            Command::StartSyncStatusUpdate => {
                self.start_sync_status_update();
                Reply::Accepted
            }
            Command::GetSyncPercentage => {
                Reply::Value(i32::try_from(self.get_sync_percentage()).unwrap_or(i32::MAX))
            }
            Command::LwsAddAccount {
                address,
                private_key,
            } => accepted(self.add_account(&address, private_key)),
            Command::LwsDeleteAccount { address } => accepted(self.delete_account(&address)),
            Command::LwsReactivateAccount { address } => {
                accepted(self.reactivate_account(&address))
            }
            Command::LwsDeactivateAccount { address } => {
                accepted(self.deactivate_account(&address))
            }
            Command::LwsRescan { address, height } => accepted(self.rescan(&address, &height)),
            Command::LwsAcceptAllRequests { requests } => {
                accepted(self.accept_all_requests(&requests))
            }
            Command::LwsAcceptRequest { address } => accepted(self.accept_request(&address)),
            Command::LwsRejectRequest { address } => accepted(self.reject_request(&address)),
            Command::LwsGetAccountList => Reply::Text(self.get_account_list()),
            Command::LwsGetRequestList => Reply::Text(self.get_request_list()),
            Command::LwsListAccounts => {
                self.list_accounts();
                Reply::Accepted
            }
            Command::LwsListRequests => {
                self.list_requests();
                Reply::Accepted
            }
        }
    }
}
