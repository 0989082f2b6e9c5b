//! Audit logging infrastructure.
//!
//! Every classified failure is recorded exactly once as an [`AuditEvent`].
//! Logging is fire-and-forget: [`AuditLogger::log`] cannot fail, so the audit
//! sink never affects the outcome of a refresh cycle.

mod codes;

pub use codes::{AuditCode, AuditSeverity};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Counter for generating unique event IDs.
static EVENT_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Generate a unique event ID using timestamp and counter.
fn generate_event_id(timestamp: &DateTime<Utc>) -> [u8; 16] {
    let ts = timestamp.timestamp_micros() as u64;
    let counter = EVENT_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut id = [0u8; 16];
    id[0..8].copy_from_slice(&ts.to_be_bytes());
    id[8..16].copy_from_slice(&counter.to_be_bytes());
    id
}

/// An audit event with metadata.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    /// Unique event ID.
    pub id: [u8; 16],
    /// When the event was recorded.
    pub timestamp: DateTime<Utc>,
    /// Refresh cycle that produced the event.
    pub cycle_id: String,
    /// Message code.
    pub code: AuditCode,
    /// Operation in progress when the failure occurred.
    pub operation: String,
    /// Description of what went wrong.
    pub message: String,
    /// Underlying cause, if any.
    pub cause: Option<String>,
}

impl AuditEvent {
    /// Create a new audit event.
    pub fn new(
        cycle_id: impl Into<String>,
        code: AuditCode,
        operation: impl Into<String>,
        cause: Option<String>,
    ) -> Self {
        let timestamp = Utc::now();
        let operation = operation.into();
        Self {
            id: generate_event_id(&timestamp),
            timestamp,
            cycle_id: cycle_id.into(),
            message: code.describe(&operation),
            code,
            operation,
            cause,
        }
    }

    /// Severity of the event.
    pub fn severity(&self) -> AuditSeverity {
        self.code.severity()
    }

    /// Format the event as a log line.
    pub fn to_log_line(&self) -> String {
        let mut line = format!(
            "{} id={} cycle={} {} {} op={} msg={:?}",
            self.timestamp.to_rfc3339(),
            hex::encode(self.id),
            self.cycle_id,
            self.severity(),
            self.code,
            self.operation,
            self.message
        );
        if let Some(cause) = &self.cause {
            line.push_str(&format!(" cause={:?}", cause));
        }
        line
    }
}

/// Trait for audit log backends.
pub trait AuditLogger: Send + Sync {
    /// Log an audit event.
    fn log(&self, event: AuditEvent);

    /// Flush any buffered events.
    fn flush(&self) -> Result<(), AuditError>;
}

/// Audit logging error.
#[derive(Debug, thiserror::Error)]
#[error("audit error: {0}")]
pub struct AuditError(pub String);

/// In-memory audit logger for testing.
#[derive(Debug, Default, Clone)]
pub struct MemoryAuditLogger {
    events: Arc<Mutex<Vec<AuditEvent>>>,
}

impl MemoryAuditLogger {
    /// Create a new memory logger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all logged events.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().clone()
    }

    /// Codes of all logged events, in order.
    pub fn codes(&self) -> Vec<AuditCode> {
        self.events.lock().iter().map(|e| e.code).collect()
    }

    /// Clear all events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Get event count.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Check if empty.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }
}

impl AuditLogger for MemoryAuditLogger {
    fn log(&self, event: AuditEvent) {
        self.events.lock().push(event);
    }

    fn flush(&self) -> Result<(), AuditError> {
        Ok(())
    }
}

/// No-op audit logger that discards all events.
#[derive(Debug, Default)]
pub struct NullAuditLogger;

impl AuditLogger for NullAuditLogger {
    fn log(&self, _event: AuditEvent) {}

    fn flush(&self) -> Result<(), AuditError> {
        Ok(())
    }
}

/// Audit logger that forwards events to `tracing` under the `audit` target.
#[derive(Debug, Default)]
pub struct TracingAuditLogger;

impl AuditLogger for TracingAuditLogger {
    fn log(&self, event: AuditEvent) {
        let id = hex::encode(event.id);
        match event.severity() {
            AuditSeverity::Info => tracing::info!(
                target: "audit",
                id = %id,
                cycle = %event.cycle_id,
                code = %event.code,
                operation = %event.operation,
                cause = ?event.cause,
                "{}",
                event.message
            ),
            AuditSeverity::Warning => tracing::warn!(
                target: "audit",
                id = %id,
                cycle = %event.cycle_id,
                code = %event.code,
                operation = %event.operation,
                cause = ?event.cause,
                "{}",
                event.message
            ),
            AuditSeverity::Error | AuditSeverity::Exception => tracing::error!(
                target: "audit",
                id = %id,
                cycle = %event.cycle_id,
                code = %event.code,
                operation = %event.operation,
                cause = ?event.cause,
                "{}",
                event.message
            ),
        }
    }

    fn flush(&self) -> Result<(), AuditError> {
        Ok(())
    }
}
