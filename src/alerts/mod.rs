use crate::classifier::ApiErrorType;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::{debug, error};

/// Structured alert for the observability collaborator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    #[serde(rename = "type")]
    pub error_type: ApiErrorType,
    pub message: String,
    pub endpoint: String,
    pub component: String,
    pub timestamp: DateTime<Utc>,
}

/// Fire-and-forget alert sink. Implementations must not block or panic.
pub trait AlertSink: Send + Sync {
    fn emit(&self, alert: Alert);
}

/// Writes alerts to the log at error level.
pub struct TracingAlertSink;

impl AlertSink for TracingAlertSink {
    fn emit(&self, alert: Alert) {
        error!(
            error_type = %alert.error_type,
            endpoint = %alert.endpoint,
            component = %alert.component,
            timestamp = %alert.timestamp,
            "alert: {}",
            alert.message
        );
    }
}

/// Forwards alerts over a bounded channel; alerts are dropped when the
/// receiver lags or is gone.
pub struct ChannelAlertSink {
    tx: mpsc::Sender<Alert>,
}

impl ChannelAlertSink {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Alert>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

impl AlertSink for ChannelAlertSink {
    fn emit(&self, alert: Alert) {
        if let Err(e) = self.tx.try_send(alert) {
            debug!("dropping alert: {}", e);
        }
    }
}
