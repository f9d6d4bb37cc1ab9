//! Security gate for the verification pipeline.
//!
//! Tracks failed verification attempts per identity over a sliding window
//! (lockout), enforces per-key cool-downs (rate limiting), and keeps the
//! append-only audit trail every operation outcome writes into. The audit
//! trail is the system's forensic record: events are buffered in memory
//! and retried until the durable sink accepts them, never dropped.

mod audit;
mod clock;
mod event;
mod gate;

pub use audit::{AuditError, AuditSink, KvAuditSink, event_key, event_prefix};
pub use clock::{Clock, ManualClock, SystemClock};
pub use event::{EventKind, SecurityEvent};
pub use gate::{GateConfig, SecurityGate};
