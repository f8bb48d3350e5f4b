use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use plate_sentinel::config::SentinelConfig;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SENTINEL_CONFIG",
        "SENTINEL_STREAM_URL",
        "SENTINEL_REPORT_ENDPOINT",
        "SENTINEL_FRAME_SKIP",
        "SENTINEL_CONFIRM_THRESHOLD",
        "SENTINEL_WINDOW_SECS",
        "SENTINEL_COOLDOWN_SECS",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn defaults_load_without_any_environment() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = SentinelConfig::load().expect("load defaults");

    assert_eq!(cfg.stream.locator, "stub://front_gate");
    assert_eq!(cfg.frame_skip, 2);
    assert_eq!(cfg.aggregator.confirm_threshold, 3);
    assert_eq!(cfg.aggregator.window, Duration::from_secs(5));
    assert!(cfg.reporting.endpoint.is_none());

    clear_env();
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "stream": {
            "locator": "http://192.168.1.27/stream",
            "read_timeout_ms": 3000,
            "mirror": true
        },
        "scheduler": {
            "frame_skip": 4
        },
        "recognition": {
            "confidence_floor": 0.4,
            "upscale_factor": 3
        },
        "normalizer": {
            "keep_prefix": false
        },
        "aggregator": {
            "confirm_threshold": 5,
            "window_secs": 8
        },
        "reporting": {
            "endpoint": "http://collector.lan:5000/api/detect",
            "max_attempts": 3
        }
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("SENTINEL_CONFIG", file.path());
    std::env::set_var("SENTINEL_CONFIRM_THRESHOLD", "2");
    std::env::set_var("SENTINEL_COOLDOWN_SECS", "60");

    let cfg = SentinelConfig::load().expect("load config");

    assert_eq!(cfg.stream.locator, "http://192.168.1.27/stream");
    assert_eq!(cfg.stream.read_timeout, Duration::from_millis(3000));
    assert!(cfg.stream.mirror);
    assert_eq!(cfg.frame_skip, 4);
    assert_eq!(cfg.recognition.confidence_floor, 0.4);
    assert_eq!(cfg.recognition.upscale_factor, 3);
    assert!(!cfg.keep_prefix);
    // Env wins over the file.
    assert_eq!(cfg.aggregator.confirm_threshold, 2);
    assert_eq!(cfg.aggregator.window, Duration::from_secs(8));
    assert_eq!(cfg.aggregator.cooldown, Duration::from_secs(60));
    assert_eq!(
        cfg.reporting.endpoint.as_deref(),
        Some("http://collector.lan:5000/api/detect")
    );
    assert_eq!(cfg.reporting.max_attempts, 3);

    clear_env();
}

#[test]
fn invalid_values_are_rejected_at_load() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SENTINEL_FRAME_SKIP", "0");
    assert!(SentinelConfig::load().is_err());

    std::env::set_var("SENTINEL_FRAME_SKIP", "not-a-number");
    assert!(SentinelConfig::load().is_err());

    clear_env();
}

#[test]
fn malformed_config_file_is_rejected() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, b"{ not json }").expect("write config");
    std::env::set_var("SENTINEL_CONFIG", file.path());

    assert!(SentinelConfig::load().is_err());

    clear_env();
}
