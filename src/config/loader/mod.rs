use crate::config::Config;
use crate::utils::get_haulguard_home;
use anyhow::{Context, Result};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Selects a named settings profile (`test` is the only one recognized).
pub const ENV_PROFILE: &str = "HAULGUARD_ENV";

macro_rules! define_numeric_overrides {
    ($( $env:literal => $($path:ident).+ : $ty:ty );* $(;)?) => {
        /// Env vars that can override numeric settings.
        pub const NUMERIC_ENV_VARS: &[&str] = &[$($env),*];

        fn apply_numeric_overrides(config: &mut Config, lookup: &dyn Fn(&str) -> Option<String>) {
            $(
                if let Some(raw) = lookup($env).filter(|v| !v.trim().is_empty()) {
                    match raw.trim().parse::<$ty>() {
                        Ok(val) => {
                            debug!("{} overrides {}", $env, stringify!($($path).+));
                            config.$($path).+ = val;
                        }
                        Err(_) => warn!("ignoring {}={:?}: not a valid number", $env, raw),
                    }
                }
            )*
        }
    };
}

define_numeric_overrides! {
    "HAULGUARD_RETRY_MAX_ATTEMPTS"  => retry.max_attempts: u32;
    "HAULGUARD_RETRY_BASE_DELAY_MS" => retry.base_delay_ms: u64;
    "HAULGUARD_RETRY_MAX_DELAY_MS"  => retry.max_delay_ms: u64;
    "HAULGUARD_RETRY_TIMEOUT_MS"    => retry.timeout_ms: u64;
}

pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_haulguard_home()?.join("config.json"))
}

/// Load config from `config_path` (or the default location), apply
/// environment overrides and validate. A missing file yields defaults.
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    load_config_with(config_path, &|key| std::env::var(key).ok())
}

pub(crate) fn load_config_with(
    config_path: Option<&Path>,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<Config> {
    let default_path = get_config_path().unwrap_or_else(|_| PathBuf::from("config.json"));
    let path = config_path.unwrap_or(default_path.as_path());

    let mut config = if path.exists() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;
        let data: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config JSON from {}", path.display()))?;
        let base = if is_test_profile(lookup) {
            serde_json::to_value(Config::test_profile())?
        } else {
            serde_json::to_value(Config::default())?
        };
        serde_json::from_value(merge_json(base, data))
            .with_context(|| "Failed to deserialize config")?
    } else {
        debug!("no config at {}, using defaults", path.display());
        if is_test_profile(lookup) {
            Config::test_profile()
        } else {
            Config::default()
        }
    };

    apply_numeric_overrides(&mut config, lookup);

    config
        .validate()
        .with_context(|| "Configuration validation failed")?;
    Ok(config)
}

fn is_test_profile(lookup: &dyn Fn(&str) -> Option<String>) -> bool {
    lookup(ENV_PROFILE).is_some_and(|v| v.eq_ignore_ascii_case("test"))
}

/// Overlay `patch` onto `base`, recursing into objects so a file that sets
/// only `retry.maxAttempts` keeps the profile's other retry values.
fn merge_json(base: Value, patch: Value) -> Value {
    match (base, patch) {
        (Value::Object(mut base_map), Value::Object(patch_map)) => {
            for (key, patch_val) in patch_map {
                let merged = match base_map.remove(&key) {
                    Some(base_val) => merge_json(base_val, patch_val),
                    None => patch_val,
                };
                base_map.insert(key, merged);
            }
            Value::Object(base_map)
        }
        (_, patch) => patch,
    }
}

#[cfg(test)]
mod tests;
