//! Workers that drive external programs (`systemctl`, shell scripts,
//! `chpasswd`, `monero-lws-admin`).

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Output, Stdio};
use std::sync::Arc;

use async_trait::async_trait;
use nodo_core::config::Config;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use super::{
    Authenticator, LwsBackend, RecoveryWorker, ServiceManager, ServiceOperation, SystemControl,
    WorkerError, WorkerEvent, WorkerSender, Workers,
};

fn program_name(program: &OsStr) -> String {
    program.to_string_lossy().into_owned()
}

/// Run `program args...`, optionally feeding `stdin`, and capture output
/// without inspecting the exit status.
async fn capture<S: AsRef<OsStr>>(
    program: impl AsRef<OsStr>,
    args: &[S],
    stdin: Option<&str>,
) -> Result<Output, WorkerError> {
    let program = program.as_ref();
    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(if stdin.is_some() { Stdio::piped() } else { Stdio::null() })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let spawn_err = |e: std::io::Error| WorkerError::Spawn {
        program: program_name(program),
        reason: e.to_string(),
    };
    let mut child = cmd.spawn().map_err(spawn_err)?;
    if let (Some(input), Some(mut pipe)) = (stdin, child.stdin.take()) {
        pipe.write_all(input.as_bytes()).await.map_err(spawn_err)?;
        // Dropping the pipe closes stdin so the child sees EOF.
    }
    child.wait_with_output().await.map_err(spawn_err)
}

/// Like [`capture`] but a non-zero exit is an error. Returns trimmed stdout.
async fn run_checked<S: AsRef<OsStr>>(
    program: impl AsRef<OsStr>,
    args: &[S],
    stdin: Option<&str>,
) -> Result<String, WorkerError> {
    let program = program.as_ref();
    let output = capture(program, args, stdin).await?;
    if output.status.success() {
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    } else {
        Err(WorkerError::Failed {
            program: program_name(program),
            code: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Recovery
// ---------------------------------------------------------------------------

/// Runs the recovery script, streaming each stdout line as progress.
pub struct ScriptRecovery {
    script: PathBuf,
}

impl ScriptRecovery {
    pub fn new(script: impl Into<PathBuf>) -> Self {
        Self {
            script: script.into(),
        }
    }
}

#[async_trait]
impl RecoveryWorker for ScriptRecovery {
    async fn run_recovery(
        &self,
        recover_fs: bool,
        rsync_blockchain: bool,
        progress: WorkerSender,
    ) -> Result<(), WorkerError> {
        let mut args = Vec::new();
        if recover_fs {
            args.push("--recover-fs");
        }
        if rsync_blockchain {
            args.push("--rsync-blockchain");
        }
        info!(script = %self.script.display(), ?args, "starting recovery");

        let spawn_err = |e: std::io::Error| WorkerError::Spawn {
            program: self.script.display().to_string(),
            reason: e.to_string(),
        };
        let mut child = Command::new(&self.script)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(spawn_err)?;

        // Both pipes are drained together; a full stderr pipe would block the
        // child before it closes stdout.
        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let stream_progress = async {
            let Some(stdout) = stdout else { return };
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if progress.send(WorkerEvent::RecoveryProgress(line)).is_err() {
                    debug!("recovery progress receiver gone");
                }
            }
        };
        let collect_stderr = async {
            let mut buf = Vec::new();
            if let Some(mut stderr) = stderr {
                if let Err(e) = stderr.read_to_end(&mut buf).await {
                    debug!(error = %e, "failed to read recovery stderr");
                }
            }
            buf
        };
        let ((), stderr) = tokio::join!(stream_progress, collect_stderr);

        let status = child.wait().await.map_err(spawn_err)?;
        if status.success() {
            Ok(())
        } else {
            Err(WorkerError::Failed {
                program: self.script.display().to_string(),
                code: status.code(),
                stderr: String::from_utf8_lossy(&stderr).trim().to_string(),
            })
        }
    }
}

// ---------------------------------------------------------------------------
// systemd
// ---------------------------------------------------------------------------

pub struct SystemdServices {
    watched: Vec<String>,
}

impl SystemdServices {
    pub fn new(watched: Vec<String>) -> Self {
        Self { watched }
    }
}

/// Pair `systemctl is-active` output lines with the queried unit names.
pub fn status_report_json(units: &[String], is_active_stdout: &str) -> String {
    let mut states: Vec<&str> = is_active_stdout.lines().map(str::trim).collect();
    states.resize(units.len(), "unknown");
    let map: serde_json::Map<String, serde_json::Value> = units
        .iter()
        .zip(states)
        .map(|(unit, state)| (unit.clone(), serde_json::Value::from(state)))
        .collect();
    serde_json::Value::Object(map).to_string()
}

#[async_trait]
impl ServiceManager for SystemdServices {
    async fn change(&self, operation: ServiceOperation, service: &str) -> Result<String, WorkerError> {
        run_checked("systemctl", &[operation.as_str(), service], None).await?;
        Ok(format!("{service} {operation} ok"))
    }

    async fn status_report(&self) -> Result<String, WorkerError> {
        let mut args = vec!["is-active".to_string()];
        args.extend(self.watched.iter().cloned());
        // is-active exits non-zero when any unit is down; the lines still hold.
        let output = capture("systemctl", &args, None).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(status_report_json(&self.watched, &stdout))
    }
}

pub struct SystemCommands {
    update_script: PathBuf,
    factory_reset_script: PathBuf,
    first_boot_script: PathBuf,
}

impl SystemCommands {
    pub fn new(
        update_script: impl Into<PathBuf>,
        factory_reset_script: impl Into<PathBuf>,
        first_boot_script: impl Into<PathBuf>,
    ) -> Self {
        Self {
            update_script: update_script.into(),
            factory_reset_script: factory_reset_script.into(),
            first_boot_script: first_boot_script.into(),
        }
    }

    async fn script(path: &Path) -> Result<(), WorkerError> {
        let no_args: [&str; 0] = [];
        run_checked(path, &no_args, None).await.map(|_| ())
    }
}

#[async_trait]
impl SystemControl for SystemCommands {
    async fn restart(&self) -> Result<(), WorkerError> {
        run_checked("systemctl", &["reboot"], None).await.map(|_| ())
    }

    async fn shutdown(&self) -> Result<(), WorkerError> {
        run_checked("systemctl", &["poweroff"], None).await.map(|_| ())
    }

    async fn update(&self) -> Result<(), WorkerError> {
        Self::script(&self.update_script).await
    }

    async fn factory_reset(&self) -> Result<(), WorkerError> {
        Self::script(&self.factory_reset_script).await
    }

    async fn first_boot_setup(&self) -> Result<(), WorkerError> {
        Self::script(&self.first_boot_script).await
    }
}

// ---------------------------------------------------------------------------
// Passwords
// ---------------------------------------------------------------------------

pub struct ShellAuthenticator {
    user: String,
    change_helper: PathBuf,
}

impl ShellAuthenticator {
    pub fn new(user: impl Into<String>, change_helper: impl Into<PathBuf>) -> Self {
        Self {
            user: user.into(),
            change_helper: change_helper.into(),
        }
    }
}

#[async_trait]
impl Authenticator for ShellAuthenticator {
    async fn set_password(&self, password: &str) -> Result<(), WorkerError> {
        let no_args: [&str; 0] = [];
        let line = format!("{}:{}\n", self.user, password);
        run_checked("chpasswd", &no_args, Some(&line)).await.map(|_| ())
    }

    async fn change_password(&self, old: &str, new: &str) -> Result<(), WorkerError> {
        let input = format!("{old}\n{new}\n");
        match run_checked(&self.change_helper, &[self.user.as_str()], Some(&input)).await {
            Ok(_) => Ok(()),
            Err(WorkerError::Failed { code: Some(1), .. }) => {
                Err(WorkerError::Rejected("current password does not match".to_string()))
            }
            Err(e) => Err(e),
        }
    }
}

// ---------------------------------------------------------------------------
// monero-lws
// ---------------------------------------------------------------------------

/// Drives `monero-lws-admin` against the server's database.
pub struct LwsAdmin {
    binary: PathBuf,
    db_path: PathBuf,
}

impl LwsAdmin {
    pub fn new(binary: impl Into<PathBuf>, db_path: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            db_path: db_path.into(),
        }
    }

    async fn admin(&self, args: &[&str]) -> Result<String, WorkerError> {
        let db = self.db_path.to_string_lossy().into_owned();
        let mut full = vec!["--db-path", db.as_str()];
        full.extend_from_slice(args);
        run_checked(&self.binary, &full, None).await
    }
}

#[async_trait]
impl LwsBackend for LwsAdmin {
    async fn add_account(&self, address: &str, private_key: &str) -> Result<(), WorkerError> {
        self.admin(&["add_account", address, private_key]).await.map(|_| ())
    }

    async fn delete_account(&self, address: &str) -> Result<(), WorkerError> {
        self.admin(&["modify_account_status", "hidden", address])
            .await
            .map(|_| ())
    }

    async fn set_account_active(&self, address: &str, active: bool) -> Result<(), WorkerError> {
        let status = if active { "active" } else { "inactive" };
        self.admin(&["modify_account_status", status, address])
            .await
            .map(|_| ())
    }

    async fn rescan(&self, address: &str, height: u64) -> Result<(), WorkerError> {
        let height = height.to_string();
        self.admin(&["rescan", height.as_str(), address]).await.map(|_| ())
    }

    async fn accept_requests(&self, addresses: &[String]) -> Result<(), WorkerError> {
        let mut args = vec!["accept_requests", "create"];
        args.extend(addresses.iter().map(String::as_str));
        self.admin(&args).await.map(|_| ())
    }

    async fn reject_request(&self, address: &str) -> Result<(), WorkerError> {
        self.admin(&["reject_requests", "create", address])
            .await
            .map(|_| ())
    }

    async fn list_accounts(&self) -> Result<String, WorkerError> {
        self.admin(&["list_accounts"]).await
    }

    async fn list_requests(&self) -> Result<String, WorkerError> {
        self.admin(&["list_requests"]).await
    }
}

/// Build the process-backed worker set from config.
pub fn from_config(config: &Config) -> Workers {
    let paths = &config.paths;
    if !config.lws.admin_binary.exists() {
        warn!(path = %config.lws.admin_binary.display(), "monero-lws-admin not found");
    }
    Workers {
        recovery: Arc::new(ScriptRecovery::new(paths.recovery_script.clone())),
        services: Arc::new(SystemdServices::new(config.services.watched.clone())),
        system: Arc::new(SystemCommands::new(
            paths.update_script.clone(),
            paths.factory_reset_script.clone(),
            paths.first_boot_script.clone(),
        )),
        auth: Arc::new(ShellAuthenticator::new(
            config.auth.user.clone(),
            config.auth.change_helper.clone(),
        )),
        lws: Arc::new(LwsAdmin::new(
            config.lws.admin_binary.clone(),
            config.lws.db_path.clone(),
        )),
    }
}
