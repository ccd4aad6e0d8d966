use std::collections::VecDeque;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use nodo_bridge::event_bus::EventBus;
use nodo_bridge::protocol::Notification;
use nodo_core::config::DaemonConfig;
use nodo_core::shutdown::ShutdownSignal;
use nodo_core::types::ConnectivityState;
use nodo_daemon::connectivity::{
    ConnectivityMonitor, NetworkProbe, PingPeriods, ReachabilityProbe,
};

/// Probe that replays a script of outcomes, then repeats the last one.
struct ScriptedProbe {
    interface_up: AtomicBool,
    outcomes: Mutex<VecDeque<bool>>,
    last: Mutex<bool>,
}

impl ScriptedProbe {
    fn new(interface_up: bool, outcomes: &[bool]) -> Arc<Self> {
        Arc::new(Self {
            interface_up: AtomicBool::new(interface_up),
            outcomes: Mutex::new(outcomes.iter().copied().collect()),
            last: Mutex::new(false),
        })
    }
}

#[async_trait]
impl ReachabilityProbe for ScriptedProbe {
    fn interface_up(&self) -> bool {
        self.interface_up.load(Ordering::SeqCst)
    }

    async fn reach(&self) -> io::Result<()> {
        let ok = match self.outcomes.lock().unwrap().pop_front() {
            Some(ok) => {
                *self.last.lock().unwrap() = ok;
                ok
            }
            None => *self.last.lock().unwrap(),
        };
        if ok {
            Ok(())
        } else {
            Err(io::Error::new(io::ErrorKind::ConnectionRefused, "unreachable"))
        }
    }
}

fn fast_periods() -> PingPeriods {
    PingPeriods {
        connected: Duration::from_millis(5),
        not_connected: Duration::from_millis(5),
    }
}

#[tokio::test]
async fn starts_waiting() {
    let monitor = ConnectivityMonitor::new(ScriptedProbe::new(true, &[]), PingPeriods::default());
    assert_eq!(monitor.state(), ConnectivityState::Waiting);
    assert_eq!(monitor.handle().code(), 0);
}

#[tokio::test]
async fn reachable_is_connected_with_long_period() {
    let mut monitor = ConnectivityMonitor::new(ScriptedProbe::new(true, &[true]), PingPeriods::default());
    let tick = monitor.tick().await;
    assert_eq!(tick.state, ConnectivityState::Connected);
    assert!(tick.changed);
    assert_eq!(tick.next_delay, Duration::from_secs(7));
}

#[tokio::test]
async fn unreachable_is_no_internet_with_short_period() {
    let mut monitor =
        ConnectivityMonitor::new(ScriptedProbe::new(true, &[false]), PingPeriods::default());
    let tick = monitor.tick().await;
    assert_eq!(tick.state, ConnectivityState::NoInternet);
    assert_eq!(tick.next_delay, Duration::from_secs(3));
}

#[tokio::test]
async fn no_interface_is_disconnected() {
    let mut monitor =
        ConnectivityMonitor::new(ScriptedProbe::new(false, &[true]), PingPeriods::default());
    let tick = monitor.tick().await;
    assert_eq!(tick.state, ConnectivityState::Disconnected);
    assert_eq!(tick.next_delay, Duration::from_secs(3));
}

#[tokio::test]
async fn identical_outcomes_change_state_once() {
    let mut monitor = ConnectivityMonitor::new(
        ScriptedProbe::new(true, &[true, true, true, false]),
        PingPeriods::default(),
    );
    let changes: Vec<bool> = {
        let mut v = Vec::new();
        for _ in 0..4 {
            v.push(monitor.tick().await.changed);
        }
        v
    };
    assert_eq!(changes, vec![true, false, false, true]);
    assert_eq!(monitor.state(), ConnectivityState::NoInternet);
}

#[tokio::test]
async fn handle_tracks_monitor_state() {
    let mut monitor = ConnectivityMonitor::new(ScriptedProbe::new(true, &[true]), PingPeriods::default());
    let handle = monitor.handle();
    monitor.tick().await;
    assert_eq!(handle.current(), ConnectivityState::Connected);
    assert_eq!(handle.code(), 1);
}

#[tokio::test]
async fn run_publishes_only_transitions() {
    let probe = ScriptedProbe::new(true, &[true, true, true, false, false]);
    let monitor = ConnectivityMonitor::new(probe, fast_periods());
    let handle = monitor.handle();
    let bus = EventBus::new();
    let rx = bus.subscribe();
    let shutdown = ShutdownSignal::new();

    let task = tokio::spawn(monitor.run(bus.clone(), shutdown.subscribe()));

    // Script ends on `false`, which then repeats.
    tokio::time::timeout(Duration::from_secs(2), async {
        while handle.current() != ConnectivityState::NoInternet {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("monitor should reach NoInternet");
    tokio::time::sleep(Duration::from_millis(30)).await;

    shutdown.trigger();
    tokio::time::timeout(Duration::from_secs(1), task)
        .await
        .expect("monitor should stop")
        .unwrap();

    let states: Vec<ConnectivityState> = rx
        .drain()
        .filter_map(|n| match n {
            Notification::ConnectivityChanged { state } => Some(state),
            _ => None,
        })
        .collect();
    assert_eq!(
        states,
        vec![ConnectivityState::Connected, ConnectivityState::NoInternet]
    );
}

#[tokio::test]
async fn monitor_stops_promptly_during_long_sleep() {
    let monitor = ConnectivityMonitor::new(ScriptedProbe::new(true, &[true]), PingPeriods::default());
    let shutdown = ShutdownSignal::new();
    let task = tokio::spawn(monitor.run(EventBus::new(), shutdown.subscribe()));
    tokio::time::sleep(Duration::from_millis(20)).await;
    shutdown.trigger();
    tokio::time::timeout(Duration::from_millis(500), task)
        .await
        .expect("monitor should not wait out the 7s period")
        .unwrap();
}

#[test]
fn periods_follow_config() {
    let cfg = DaemonConfig {
        ping_period_connected_ms: 10_000,
        ping_period_not_connected_ms: 1_000,
        ..Default::default()
    };
    let periods = PingPeriods::from_config(&cfg);
    assert_eq!(periods.for_state(ConnectivityState::Connected), Duration::from_secs(10));
    assert_eq!(periods.for_state(ConnectivityState::Waiting), Duration::from_secs(1));
    assert_eq!(periods.for_state(ConnectivityState::Disconnected), Duration::from_secs(1));
}

// ---------------------------------------------------------------------------
// NetworkProbe
// ---------------------------------------------------------------------------

fn sys_net_fixture(name: &str, ifaces: &[(&str, &str)]) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("nodo-sysnet-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    for (iface, state) in ifaces {
        let path = dir.join(iface);
        std::fs::create_dir_all(&path).unwrap();
        std::fs::write(path.join("operstate"), format!("{state}\n")).unwrap();
    }
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

#[test]
fn loopback_alone_is_not_an_interface() {
    let dir = sys_net_fixture("lo", &[("lo", "unknown"), ("eth0", "down")]);
    let probe = NetworkProbe::new("127.0.0.1:1", Duration::from_millis(100)).with_sys_net(&dir);
    assert!(!probe.interface_up());
    std::fs::remove_dir_all(dir).ok();
}

#[test]
fn any_up_interface_counts() {
    let dir = sys_net_fixture("up", &[("eth0", "down"), ("wlan0", "up")]);
    let probe = NetworkProbe::new("127.0.0.1:1", Duration::from_millis(100)).with_sys_net(&dir);
    assert!(probe.interface_up());
    std::fs::remove_dir_all(dir).ok();
}

#[tokio::test]
async fn reach_succeeds_against_listener() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let probe = NetworkProbe::new(addr.to_string(), Duration::from_secs(1));
    probe.reach().await.expect("listener should accept");
}

#[tokio::test]
async fn reach_fails_when_nothing_listens() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let probe = NetworkProbe::new(addr.to_string(), Duration::from_secs(1));
    assert!(probe.reach().await.is_err());
}
