use crate::config::FallbackConfig;
use chrono::{DateTime, Utc};
use moka::sync::Cache;
use serde::Serialize;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;
use tracing::debug;

pub const DEFAULT_VARIANT: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FallbackSource {
    /// A live payload stored earlier and still within the staleness threshold.
    Cache,
    /// A bundled representative payload.
    Static,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallbackPayload {
    pub data: Value,
    pub source: FallbackSource,
    #[serde(rename = "cachedAt", skip_serializing_if = "Option::is_none")]
    pub cached_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone)]
struct CachedEntry {
    data: Value,
    cached_at: DateTime<Utc>,
}

/// Resolves substitute payloads for resources whose live call failed.
///
/// Cached payloads expire after `stale_after_secs`; expired entries read as
/// absent. Static payloads are consulted only when nothing usable is cached
/// and mock data is enabled.
pub struct FallbackManager {
    config: FallbackConfig,
    cache: Cache<String, CachedEntry>,
    static_data: RwLock<HashMap<String, HashMap<String, Value>>>,
}

impl FallbackManager {
    pub fn new(config: FallbackConfig) -> Self {
        let stale_after = Duration::from_secs(config.stale_after_secs);
        Self::with_stale_after(config, stale_after)
    }

    /// Like `new` but with an explicit staleness threshold, for sub-second
    /// thresholds the config cannot express.
    pub fn with_stale_after(config: FallbackConfig, stale_after: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(config.max_cached_entries)
            .time_to_live(stale_after)
            .build();
        Self {
            config,
            cache,
            static_data: RwLock::new(builtin_payloads()),
        }
    }

    fn cache_key(key: &str, variant: &str) -> String {
        format!("{}::{}", key, variant)
    }

    /// Remember a live payload for later fallback use.
    pub fn store(&self, key: &str, variant: &str, data: Value) {
        if !self.config.enable_cache {
            return;
        }
        self.cache.insert(
            Self::cache_key(key, variant),
            CachedEntry {
                data,
                cached_at: Utc::now(),
            },
        );
    }

    /// Add or replace a bundled payload.
    pub fn register_static(&self, key: &str, variant: &str, data: Value) {
        let mut statics = self
            .static_data
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        statics
            .entry(key.to_string())
            .or_default()
            .insert(variant.to_string(), data);
    }

    pub fn get_fallback_data(&self, key: &str, variant: &str) -> Option<FallbackPayload> {
        if self.config.enable_cache
            && let Some(entry) = self.cache.get(&Self::cache_key(key, variant))
        {
            debug!(key, variant, cached_at = %entry.cached_at, "serving cached fallback");
            metrics::counter!("haulguard_fallback_served_total", "source" => "cache").increment(1);
            return Some(FallbackPayload {
                data: entry.data,
                source: FallbackSource::Cache,
                cached_at: Some(entry.cached_at),
            });
        }

        if self.config.enable_mock_data {
            let statics = self
                .static_data
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if let Some(data) = statics.get(key).and_then(|variants| {
                variants
                    .get(variant)
                    .or_else(|| variants.get(DEFAULT_VARIANT))
            }) {
                debug!(key, variant, "serving static fallback");
                metrics::counter!("haulguard_fallback_served_total", "source" => "static")
                    .increment(1);
                return Some(FallbackPayload {
                    data: data.clone(),
                    source: FallbackSource::Static,
                    cached_at: None,
                });
            }
        }

        debug!(key, variant, "no fallback available");
        None
    }

    pub fn invalidate(&self, key: &str, variant: &str) {
        self.cache.invalidate(&Self::cache_key(key, variant));
    }

    pub fn clear(&self) {
        self.cache.invalidate_all();
    }
}

/// Representative payloads for the dashboard resources that must render
/// something even when the backend is down.
fn builtin_payloads() -> HashMap<String, HashMap<String, Value>> {
    let mut payloads: HashMap<String, HashMap<String, Value>> = HashMap::new();
    let mut add = |key: &str, variant: &str, data: Value| {
        payloads
            .entry(key.to_string())
            .or_default()
            .insert(variant.to_string(), data);
    };

    add(
        "moderationStats",
        DEFAULT_VARIANT,
        json!({
            "pendingListings": 0,
            "pendingCompanies": 0,
            "flaggedRatings": 0,
            "resolvedToday": 0,
            "isFallback": true,
        }),
    );
    add(
        "userStats",
        DEFAULT_VARIANT,
        json!({
            "totalUsers": 0,
            "activeUsers": 0,
            "newUsersThisWeek": 0,
            "isFallback": true,
        }),
    );
    add(
        "userStats",
        "admin",
        json!({
            "totalUsers": 0,
            "activeUsers": 0,
            "newUsersThisWeek": 0,
            "suspendedUsers": 0,
            "pendingVerifications": 0,
            "isFallback": true,
        }),
    );
    add(
        "systemHealth",
        DEFAULT_VARIANT,
        json!({
            "status": "unknown",
            "api": "unreachable",
            "database": "unknown",
            "lastChecked": null,
            "isFallback": true,
        }),
    );

    payloads
}
