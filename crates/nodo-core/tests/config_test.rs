use std::time::Duration;

use nodo_core::config::Config;

#[test]
fn default_config() {
    let cfg = Config::default();
    assert_eq!(cfg.general.log_level, "info");
    assert_eq!(cfg.general.log_format, "text");
    assert_eq!(cfg.daemon.ping_period_connected(), Duration::from_secs(7));
    assert_eq!(cfg.daemon.ping_period_not_connected(), Duration::from_secs(3));
    assert_eq!(cfg.daemon.hardware_status_period(), Duration::from_secs(1));
    assert_eq!(cfg.sync.rpc_url, "http://127.0.0.1:18081/json_rpc");
    assert_eq!(
        cfg.paths.first_boot_marker.to_str(),
        Some("/root/nododaemonfirstboot")
    );
    assert_eq!(cfg.display.max_backlight, 255);
    cfg.validate().expect("defaults validate");
}

#[test]
fn config_roundtrip() {
    let cfg = Config::default();
    let toml_str = cfg.to_toml().expect("serialize to toml");
    assert!(toml_str.contains("json_rpc"));

    let parsed: Config = toml::from_str(&toml_str).expect("parse toml back");
    assert_eq!(parsed.sync.rpc_url, cfg.sync.rpc_url);
    assert_eq!(
        parsed.daemon.ping_period_connected_ms,
        cfg.daemon.ping_period_connected_ms
    );
    assert_eq!(parsed.paths.backlight_file, cfg.paths.backlight_file);
    parsed.validate().expect("config validates");
}

#[test]
fn config_partial_toml() {
    let partial = r#"
[daemon]
ping_period_connected_ms = 10000

[sync]
rpc_url = "http://10.0.0.2:18081/json_rpc"
"#;
    let cfg: Config = toml::from_str(partial).expect("parse partial");
    assert_eq!(cfg.daemon.ping_period_connected_ms, 10_000);
    assert_eq!(cfg.sync.rpc_url, "http://10.0.0.2:18081/json_rpc");
    // defaults should fill in the rest
    assert_eq!(cfg.daemon.ping_period_not_connected_ms, 3_000);
    assert_eq!(cfg.general.log_level, "info");
    cfg.validate().expect("config validates");
}

#[test]
fn zero_period_fails_validation() {
    let mut cfg = Config::default();
    cfg.daemon.hardware_status_period_ms = 0;
    let err = cfg.validate().expect_err("validation should fail");
    assert!(err.to_string().contains("hardware_status_period_ms"));
}

#[test]
fn probe_timeout_longer_than_fast_cadence_fails_validation() {
    let mut cfg = Config::default();
    cfg.daemon.probe_timeout_ms = 5_000;
    let err = cfg.validate().expect_err("validation should fail");
    assert!(err.to_string().contains("probe_timeout_ms"));
}

#[test]
fn non_http_rpc_url_fails_validation() {
    let mut cfg = Config::default();
    cfg.sync.rpc_url = "127.0.0.1:18081".to_string();
    let err = cfg.validate().expect_err("validation should fail");
    assert!(err.to_string().contains("rpc_url"));
}

#[test]
fn unknown_log_format_fails_validation() {
    let mut cfg = Config::default();
    cfg.general.log_format = "xml".to_string();
    assert!(cfg.validate().is_err());
}

#[test]
fn load_from_file() {
    let dir = std::env::temp_dir().join(format!("nodo-config-{}", std::process::id()));
    std::fs::create_dir_all(&dir).expect("create temp dir");
    let path = dir.join("daemon.toml");
    std::fs::write(&path, "[display]\nmax_backlight = 100\n").expect("write config");

    let cfg = Config::load_from(&path).expect("load config");
    assert_eq!(cfg.display.max_backlight, 100);

    std::fs::remove_dir_all(&dir).ok();
}

#[test]
fn load_from_missing_file_is_io_error() {
    let err = Config::load_from("/nonexistent/nodo/daemon.toml").expect_err("should fail");
    assert!(err.to_string().starts_with("io:"));
}

#[test]
fn non_positive_max_backlight_fails_validation() {
    let mut cfg = Config::default();
    cfg.display.max_backlight = -1;
    let err = cfg.validate().expect_err("validation should fail");
    assert!(err.to_string().contains("max_backlight"));

    cfg.display.max_backlight = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn negative_initial_backlight_fails_validation() {
    let mut cfg = Config::default();
    cfg.display.initial_backlight = -5;
    let err = cfg.validate().expect_err("validation should fail");
    assert!(err.to_string().contains("initial_backlight"));
}
