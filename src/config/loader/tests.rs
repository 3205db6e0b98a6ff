use super::*;
use std::collections::HashMap;
use tempfile::TempDir;

fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn test_missing_file_yields_defaults() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("absent.json");
    let config = load_config_with(Some(path.as_path()), &env(&[])).unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_partial_file_keeps_other_defaults() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.json");
    fs::write(&path, r#"{"retry": {"maxAttempts": 5}}"#).unwrap();

    let config = load_config_with(Some(path.as_path()), &env(&[])).unwrap();
    assert_eq!(config.retry.max_attempts, 5);
    assert_eq!(config.retry.base_delay_ms, 1000);
    assert_eq!(config.circuit_breaker.failure_threshold, 5);
}

#[test]
fn test_test_profile_from_env() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("absent.json");
    let config = load_config_with(Some(path.as_path()), &env(&[(ENV_PROFILE, "TEST")])).unwrap();
    assert_eq!(config.retry.max_attempts, 2);
    assert_eq!(config.retry.base_delay_ms, 10);
    assert_eq!(config.circuit_breaker.cool_down_ms, 100);
}

#[test]
fn test_file_layers_over_test_profile() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.json");
    fs::write(&path, r#"{"retry": {"timeoutMs": 50}}"#).unwrap();

    let config = load_config_with(Some(path.as_path()), &env(&[(ENV_PROFILE, "test")])).unwrap();
    assert_eq!(config.retry.timeout_ms, 50);
    assert_eq!(config.retry.max_attempts, 2);
}

#[test]
fn test_numeric_overrides_win() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.json");
    fs::write(&path, r#"{"retry": {"maxAttempts": 5}}"#).unwrap();

    let config = load_config_with(
        Some(path.as_path()),
        &env(&[
            ("HAULGUARD_RETRY_MAX_ATTEMPTS", "7"),
            ("HAULGUARD_RETRY_TIMEOUT_MS", " 2500 "),
        ]),
    )
    .unwrap();
    assert_eq!(config.retry.max_attempts, 7);
    assert_eq!(config.retry.timeout_ms, 2500);
}

#[test]
fn test_unparseable_override_is_ignored() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("absent.json");
    let config = load_config_with(
        Some(path.as_path()),
        &env(&[("HAULGUARD_RETRY_BASE_DELAY_MS", "soon")]),
    )
    .unwrap();
    assert_eq!(config.retry.base_delay_ms, 1000);
}

#[test]
fn test_invalid_values_fail_validation() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.json");
    fs::write(&path, r#"{"retry": {"maxAttempts": 0}}"#).unwrap();

    let err = load_config_with(Some(path.as_path()), &env(&[])).unwrap_err();
    assert!(format!("{:#}", err).contains("maxAttempts"));
}

#[test]
fn test_malformed_json_reports_path() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.json");
    fs::write(&path, "{not json").unwrap();

    let err = load_config_with(Some(path.as_path()), &env(&[])).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config JSON"));
}

#[test]
fn test_merge_json_recurses_into_objects() {
    let base = serde_json::json!({"a": {"x": 1, "y": 2}, "b": 3});
    let patch = serde_json::json!({"a": {"y": 20}, "c": 4});
    let merged = merge_json(base, patch);
    assert_eq!(merged, serde_json::json!({"a": {"x": 1, "y": 20}, "b": 3, "c": 4}));
}

#[test]
fn test_numeric_env_vars_listed() {
    assert!(NUMERIC_ENV_VARS.contains(&"HAULGUARD_RETRY_MAX_ATTEMPTS"));
    assert_eq!(NUMERIC_ENV_VARS.len(), 4);
}
