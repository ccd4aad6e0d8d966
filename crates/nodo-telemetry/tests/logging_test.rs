use nodo_telemetry::logging::{self, LogFormat};

#[test]
fn test_init_logging_human() {
    // Should not panic; second call is a safe no-op.
    logging::init_logging("test-service", "debug");
    logging::init_logging("test-service", "info");

    tracing::info!(key = "value", "human-readable log line");
}

#[test]
fn test_init_logging_json() {
    // The global subscriber may already be set by another test; this is a no-op then.
    logging::init_logging_json("test-service-json", "info");

    tracing::info!(key = "value", "json log line");
}

#[test]
fn test_init_dispatches_by_format() {
    logging::init("dispatch-test", "warn", LogFormat::Json);
    logging::init("dispatch-test", "warn", LogFormat::Text);
}

#[test]
fn test_log_format_from_config() {
    assert_eq!(LogFormat::from_config("json"), LogFormat::Json);
    assert_eq!(LogFormat::from_config(" JSON "), LogFormat::Json);
    assert_eq!(LogFormat::from_config("text"), LogFormat::Text);
    assert_eq!(LogFormat::from_config(""), LogFormat::Text);
}
