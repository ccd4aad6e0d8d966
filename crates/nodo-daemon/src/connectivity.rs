use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use nodo_bridge::event_bus::EventBus;
use nodo_bridge::protocol::Notification;
use nodo_core::config::DaemonConfig;
use nodo_core::shutdown::ShutdownListener;
use nodo_core::types::ConnectivityState;
use tokio::sync::watch;
use tracing::{debug, info};

/// A network check used to classify connectivity.
///
/// The two halves are separate so a failing reachability check can still be
/// told apart from a box with no usable interface.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Whether at least one non-loopback interface is up.
    fn interface_up(&self) -> bool;

    /// Try to reach the outside world. Any error counts as unreachable.
    async fn reach(&self) -> std::io::Result<()>;
}

/// Probe backed by `/sys/class/net` and a TCP connect with timeout.
pub struct NetworkProbe {
    target: String,
    timeout: Duration,
    sys_net: PathBuf,
}

impl NetworkProbe {
    pub fn new(target: impl Into<String>, timeout: Duration) -> Self {
        Self {
            target: target.into(),
            timeout,
            sys_net: PathBuf::from("/sys/class/net"),
        }
    }

    pub fn from_config(cfg: &DaemonConfig) -> Self {
        Self::new(cfg.probe_target.clone(), cfg.probe_timeout())
    }

    /// Read interface state from another sysfs tree (tests, containers).
    pub fn with_sys_net(mut self, dir: impl Into<PathBuf>) -> Self {
        self.sys_net = dir.into();
        self
    }
}

#[async_trait]
impl ReachabilityProbe for NetworkProbe {
    fn interface_up(&self) -> bool {
        let Ok(entries) = std::fs::read_dir(&self.sys_net) else {
            return false;
        };
        entries.flatten().any(|entry| {
            if entry.file_name() == "lo" {
                return false;
            }
            std::fs::read_to_string(entry.path().join("operstate"))
                .map(|s| s.trim() == "up")
                .unwrap_or(false)
        })
    }

    async fn reach(&self) -> std::io::Result<()> {
        match tokio::time::timeout(self.timeout, tokio::net::TcpStream::connect(&self.target)).await
        {
            Ok(conn) => conn.map(|_| ()),
            Err(_) => Err(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("no answer from {} within {:?}", self.target, self.timeout),
            )),
        }
    }
}

/// Polling cadence keyed on the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PingPeriods {
    pub connected: Duration,
    pub not_connected: Duration,
}

impl PingPeriods {
    pub fn from_config(cfg: &DaemonConfig) -> Self {
        Self {
            connected: cfg.ping_period_connected(),
            not_connected: cfg.ping_period_not_connected(),
        }
    }

    pub fn for_state(&self, state: ConnectivityState) -> Duration {
        if state.is_connected() {
            self.connected
        } else {
            self.not_connected
        }
    }
}

impl Default for PingPeriods {
    fn default() -> Self {
        Self {
            connected: Duration::from_secs(7),
            not_connected: Duration::from_secs(3),
        }
    }
}

/// Result of one probe cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick {
    pub state: ConnectivityState,
    pub changed: bool,
    pub next_delay: Duration,
}

/// Read-only view of the monitor's state.
#[derive(Debug, Clone)]
pub struct ConnectivityHandle {
    rx: watch::Receiver<ConnectivityState>,
}

impl ConnectivityHandle {
    pub fn current(&self) -> ConnectivityState {
        *self.rx.borrow()
    }

    pub fn code(&self) -> i32 {
        self.current().code()
    }
}

/// Owns the connectivity state machine and its adaptive probe loop.
///
/// The monitor is the only writer of the state; everyone else reads it
/// through a [`ConnectivityHandle`].
pub struct ConnectivityMonitor {
    probe: Arc<dyn ReachabilityProbe>,
    periods: PingPeriods,
    state: watch::Sender<ConnectivityState>,
}

impl ConnectivityMonitor {
    pub fn new(probe: Arc<dyn ReachabilityProbe>, periods: PingPeriods) -> Self {
        let (state, _) = watch::channel(ConnectivityState::Waiting);
        Self {
            probe,
            periods,
            state,
        }
    }

    pub fn handle(&self) -> ConnectivityHandle {
        ConnectivityHandle {
            rx: self.state.subscribe(),
        }
    }

    pub fn state(&self) -> ConnectivityState {
        *self.state.borrow()
    }

    async fn classify(&self) -> ConnectivityState {
        if !self.probe.interface_up() {
            return ConnectivityState::Disconnected;
        }
        match self.probe.reach().await {
            Ok(()) => ConnectivityState::Connected,
            Err(e) => {
                debug!(error = %e, "reachability probe failed");
                ConnectivityState::NoInternet
            }
        }
    }

    /// Run one probe, store the resulting state and compute the next delay.
    pub async fn tick(&mut self) -> Tick {
        let next = self.classify().await;
        let changed = self.state.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        Tick {
            state: next,
            changed,
            next_delay: self.periods.for_state(next),
        }
    }

    /// Probe until shutdown, publishing a notification on every transition.
    pub async fn run(mut self, bus: EventBus, mut shutdown: ShutdownListener) {
        info!(
            connected_ms = self.periods.connected.as_millis() as u64,
            not_connected_ms = self.periods.not_connected.as_millis() as u64,
            "connectivity monitor started"
        );
        loop {
            let tick = tokio::select! {
                _ = shutdown.cancelled() => break,
                tick = self.tick() => tick,
            };
            if tick.changed {
                info!(state = %tick.state, "connectivity changed");
                bus.publish(Notification::ConnectivityChanged { state: tick.state });
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(tick.next_delay) => {}
            }
        }
        info!("connectivity monitor stopped");
    }
}
