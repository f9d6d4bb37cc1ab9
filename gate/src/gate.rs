//! The security gate: per-identity failure windows, rate-limit marks and
//! the event log.
//!
//! Failure counters and rate-limit marks are in-process state: purely
//! derived, rebuildable from the audit trail, and a stated single-instance
//! assumption — a multi-instance deployment replaces them with a shared
//! counter service rather than patching this struct.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::audit::AuditSink;
use crate::clock::Clock;
use crate::event::{EventKind, SecurityEvent};

/// Gate policy knobs.
#[derive(Debug, Clone)]
pub struct GateConfig {
    /// Failures inside the window that trigger lockout (default: 3).
    pub lockout_threshold: usize,
    /// Trailing window over which failures count (default: 1 hour).
    pub failure_window: Duration,
    /// Cool-down after a rate-limit mark (default: 300 s).
    pub rate_limit_window: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            lockout_threshold: 3,
            failure_window: Duration::hours(1),
            rate_limit_window: Duration::seconds(300),
        }
    }
}

/// Stateful security checks plus the audit log.
pub struct SecurityGate {
    cfg: GateConfig,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn AuditSink>,
    /// Failure timestamps per identity, pruned lazily on each check.
    failures: Mutex<HashMap<String, Vec<DateTime<Utc>>>>,
    /// Last-applied rate-limit mark per key.
    marks: Mutex<HashMap<String, DateTime<Utc>>>,
    /// Events not yet accepted by the sink. Never dropped; retried on the
    /// next log call and readable through [`SecurityGate::events_since`].
    pending: Mutex<VecDeque<SecurityEvent>>,
}

impl SecurityGate {
    pub fn new(cfg: GateConfig, clock: Arc<dyn Clock>, sink: Arc<dyn AuditSink>) -> Self {
        Self {
            cfg,
            clock,
            sink,
            failures: Mutex::new(HashMap::new()),
            marks: Mutex::new(HashMap::new()),
            pending: Mutex::new(VecDeque::new()),
        }
    }

    pub fn config(&self) -> &GateConfig {
        &self.cfg
    }

    /// True when the identity has accumulated enough recent failures to be
    /// locked out. Prunes expired failures as a side effect.
    pub fn check_suspicious(&self, identity: &str) -> bool {
        let now = self.clock.now();
        let mut failures = self.failures.lock();
        let Some(window) = failures.get_mut(identity) else {
            return false;
        };
        window.retain(|&t| now - t < self.cfg.failure_window);
        window.len() >= self.cfg.lockout_threshold
    }

    /// Time until the lockout clears, assuming no further failures.
    /// `None` when the identity is not locked.
    pub fn lockout_remaining(&self, identity: &str) -> Option<Duration> {
        let now = self.clock.now();
        let mut failures = self.failures.lock();
        let window = failures.get_mut(identity)?;
        window.retain(|&t| now - t < self.cfg.failure_window);
        if window.len() < self.cfg.lockout_threshold {
            return None;
        }
        // The lockout clears when enough old failures age out to drop the
        // count below the threshold.
        let mut sorted = window.clone();
        sorted.sort();
        let pivot = sorted[sorted.len() - self.cfg.lockout_threshold];
        Some(pivot + self.cfg.failure_window - now)
    }

    /// Records one failed verification attempt for the identity.
    pub fn record_failed_attempt(&self, identity: &str) {
        let now = self.clock.now();
        self.failures
            .lock()
            .entry(identity.to_string())
            .or_default()
            .push(now);
    }

    /// True when the key is currently allowed (not inside a cool-down).
    pub fn check_rate_limit(&self, key: &str) -> bool {
        let now = self.clock.now();
        match self.marks.lock().get(key) {
            Some(&mark) => now - mark >= self.cfg.rate_limit_window,
            None => true,
        }
    }

    /// Marks the key, starting its cool-down window.
    pub fn apply_rate_limit(&self, key: &str) {
        let now = self.clock.now();
        self.marks.lock().insert(key.to_string(), now);
    }

    /// Remaining cool-down for a blocked key; `None` when not blocked.
    pub fn retry_after(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now();
        let marks = self.marks.lock();
        let &mark = marks.get(key)?;
        let elapsed = now - mark;
        if elapsed >= self.cfg.rate_limit_window {
            return None;
        }
        Some(self.cfg.rate_limit_window - elapsed)
    }

    /// Appends one audit event.
    ///
    /// The event lands in the in-memory pending queue first and is flushed
    /// to the sink along with anything an earlier outage left behind. A
    /// sink failure keeps the event queued; nothing is ever dropped.
    pub fn log_event(
        &self,
        kind: EventKind,
        identity: Option<&str>,
        details: impl Into<String>,
        source_addr: Option<&str>,
    ) {
        let event = SecurityEvent {
            timestamp: self.clock.now(),
            kind,
            identity: identity.map(str::to_string),
            details: details.into(),
            source_addr: source_addr.map(str::to_string),
        };
        debug!(
            "security event {} identity={} details={}",
            event.kind,
            event.identity.as_deref().unwrap_or("-"),
            event.details
        );

        let mut pending = self.pending.lock();
        pending.push_back(event);
        while let Some(front) = pending.front() {
            match self.sink.append(front) {
                Ok(()) => {
                    pending.pop_front();
                }
                Err(e) => {
                    warn!(
                        "audit sink unavailable, retaining {} event(s): {e}",
                        pending.len()
                    );
                    break;
                }
            }
        }
    }

    /// Ordered events since the cutoff: everything the sink has, plus any
    /// still waiting in the pending queue.
    pub fn events_since(&self, cutoff: DateTime<Utc>) -> Vec<SecurityEvent> {
        let mut events = match self.sink.read_since(cutoff) {
            Ok(evs) => evs,
            Err(e) => {
                warn!("audit sink read failed: {e}");
                Vec::new()
            }
        };
        for ev in self.pending.lock().iter() {
            if ev.timestamp >= cutoff {
                events.push(ev.clone());
            }
        }
        events
    }

    /// Number of events awaiting sink delivery.
    pub fn pending_events(&self) -> usize {
        self.pending.lock().len()
    }
}
