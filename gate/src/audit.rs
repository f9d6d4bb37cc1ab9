//! Durable audit sinks.
//!
//! KV key layout for events:
//!
//! ```text
//! sec:{ts_ns:020}:{seq:06}   → JSON SecurityEvent
//! ```
//!
//! The nanosecond timestamp is zero-padded so lexicographic key order is
//! insertion order; the per-process sequence counter breaks same-instant
//! ties.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use rollcall_kv::KVStore;
use thiserror::Error;
use tracing::warn;

use crate::event::SecurityEvent;

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("audit: sink unavailable: {0}")]
    Sink(String),

    #[error("audit: encode failed: {0}")]
    Encode(String),
}

/// Append-only destination for audit events.
///
/// Implementations must preserve insertion order on read. They do not need
/// to be durable against crashes mid-append; the gate's retry buffer
/// re-delivers anything that failed.
pub trait AuditSink: Send + Sync {
    fn append(&self, event: &SecurityEvent) -> Result<(), AuditError>;

    /// Events with `timestamp >= cutoff`, oldest first.
    fn read_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<SecurityEvent>, AuditError>;
}

/// KV key for an audit event.
pub fn event_key(ts_ns: i64, seq: u64) -> String {
    format!("sec:{ts_ns:020}:{seq:06}")
}

/// Prefix for scanning all audit events.
pub fn event_prefix() -> &'static str {
    "sec:"
}

/// Audit sink over a [`KVStore`].
pub struct KvAuditSink {
    store: Arc<dyn KVStore>,
    seq: AtomicU64,
}

impl KvAuditSink {
    pub fn new(store: Arc<dyn KVStore>) -> Self {
        Self {
            store,
            seq: AtomicU64::new(0),
        }
    }
}

impl AuditSink for KvAuditSink {
    fn append(&self, event: &SecurityEvent) -> Result<(), AuditError> {
        let ts_ns = event
            .timestamp
            .timestamp_nanos_opt()
            .unwrap_or(i64::MAX);
        let seq = self.seq.fetch_add(1, Ordering::Relaxed);
        let value = serde_json::to_vec(event).map_err(|e| AuditError::Encode(e.to_string()))?;
        self.store
            .set(&event_key(ts_ns, seq), &value)
            .map_err(|e| AuditError::Sink(e.to_string()))
    }

    fn read_since(&self, cutoff: DateTime<Utc>) -> Result<Vec<SecurityEvent>, AuditError> {
        let entries = self
            .store
            .scan(event_prefix())
            .map_err(|e| AuditError::Sink(e.to_string()))?;
        let mut events = Vec::with_capacity(entries.len());
        for (key, value) in entries {
            match serde_json::from_slice::<SecurityEvent>(&value) {
                Ok(ev) if ev.timestamp >= cutoff => events.push(ev),
                Ok(_) => {}
                Err(e) => warn!("audit: skipping unreadable event at {key}: {e}"),
            }
        }
        Ok(events)
    }
}
