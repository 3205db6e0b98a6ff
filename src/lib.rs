#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::uninlined_format_args)]
// Delay and window arithmetic moves between u64 millis, f64 and i64 seconds
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::module_name_repetitions)]

pub mod alerts;
pub mod auth;
pub mod circuit_breaker;
pub mod classifier;
pub mod cli;
pub mod client;
pub mod config;
pub mod errors;
pub mod fallback;
pub mod handler;
pub mod http;
pub mod retry;
pub mod storage;
pub(crate) mod utils;
pub mod validator;

pub use classifier::{ApiError, ApiErrorType, ErrorSeverity, RawFailure, classify};
pub use client::ResilientClient;
pub use errors::HaulguardError;
pub use handler::{ApiErrorHandler, ErrorContext, ErrorResponse};
pub use retry::RetryController;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
