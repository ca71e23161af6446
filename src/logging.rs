/// Structured log events
///
/// One JSON object per line, so audit pipelines can pick ledger events out of
/// the regular log stream.
use serde_json::{json, Value};

use crate::common_utils::get_current_timestamp_ms;

/// Structured log event builder
///
/// Usage:
/// ```
/// use captable::logging::LogEvent;
///
/// let log_value = LogEvent::new("POSTING_COMMITTED")
///     .field("issuer_id", 7)
///     .field("legs", 3)
///     .service("ledger")
///     .build();
///
/// log::info!("{}", log_value);
/// ```
pub struct LogEvent {
    fields: serde_json::Map<String, Value>,
}

impl LogEvent {
    /// Create a new log event with the given event name
    pub fn new(event: &str) -> Self {
        let mut fields = serde_json::Map::new();
        fields.insert("event".to_string(), json!(event));
        fields.insert("timestamp_ms".to_string(), json!(get_current_timestamp_ms()));

        Self { fields }
    }

    /// Add a field to the log event
    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Add service name
    pub fn service(mut self, service: &str) -> Self {
        self.fields.insert("service".to_string(), json!(service));
        self
    }

    /// Build the final JSON value
    pub fn build(self) -> Value {
        Value::Object(self.fields)
    }
}

#[macro_export]
macro_rules! log_cache_degraded {
    ($issuer_id:expr, $shareholder_id:expr, $security_id:expr, $reason:expr) => {
        log::warn!(
            "{}",
            $crate::logging::LogEvent::new("CACHE_REFRESH_FAILED")
                .field("issuer_id", $issuer_id)
                .field("shareholder_id", $shareholder_id)
                .field("security_id", $security_id)
                .field("reason", $reason)
                .service("ledger")
                .build()
        );
    };
}

#[macro_export]
macro_rules! log_posting_rejected {
    ($posting:expr, $issuer_id:expr, $err:expr) => {
        log::info!(
            "{}",
            $crate::logging::LogEvent::new("POSTING_REJECTED")
                .field("posting", $posting)
                .field("issuer_id", $issuer_id)
                .field("code", $err.error_code())
                .field("reason", $err.to_string())
                .service("ledger")
                .build()
        );
    };
}
