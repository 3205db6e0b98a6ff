#![allow(dead_code)]

use haulguard::ErrorContext;
use haulguard::config::Config;
use serde_json::Value;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Short delays and timeouts so retries finish quickly against a local
/// mock server.
pub fn fast_config() -> Config {
    let mut config = Config::test_profile();
    config.retry.base_delay_ms = 5;
    config.retry.max_delay_ms = 20;
    config.retry.timeout_ms = 500;
    config
}

pub fn context(endpoint: &str, fallback_key: &str) -> ErrorContext {
    ErrorContext::new(endpoint, "IntegrationTest").with_fallback(fallback_key, "default")
}

/// Serve `status` with a JSON body on `route`, at most `times` times.
pub async fn mount_json(server: &MockServer, route: &str, status: u16, body: Value, times: u64) {
    Mock::given(method("GET"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(status).set_body_json(body))
        .up_to_n_times(times)
        .mount(server)
        .await;
}

pub async fn request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map_or(0, |requests| requests.len())
}
