pub mod loader;
pub mod schema;

pub use loader::{ENV_PROFILE, NUMERIC_ENV_VARS, get_config_path, load_config};
pub use schema::{
    AlertRule, CircuitBreakerConfig, Config, FallbackConfig, HandlerConfig, RetryConfig,
};
