use ar_core::config::GeneralConfig;
use ar_telemetry::logging;

#[test]
fn test_init_logging_human() {
    // Second call is a no-op.
    logging::init_logging("test-service", "debug");
    logging::init_logging("test-service", "info");

    tracing::info!(key = "value", "human-readable log line");
}

#[test]
fn test_init_logging_json() {
    // Whichever test runs first owns the global subscriber.
    logging::init_logging_json("test-service-json", "info");

    tracing::info!(key = "value", "json log line");
}

#[test]
fn test_init_from_config_both_formats() {
    let mut general = GeneralConfig::default();
    logging::init_from_config("config-test", &general);

    general.log_format = "json".into();
    general.log_level = "ar_agents=debug,warn".into();
    logging::init_from_config("config-test", &general);
}

#[tokio::test]
async fn test_logging_inside_async_context() {
    logging::init_logging("async-test", "warn");
    let handle = tokio::spawn(async {
        tracing::warn!(task = "spawned", "log from a spawned task");
        1
    });
    assert_eq!(handle.await.unwrap(), 1);
}
