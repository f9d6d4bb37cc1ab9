//! KV key layout for the attendance service.
//!
//! ```text
//! tpl:{identity}           → JSON VoiceTemplate
//! att:{date}:{identity}    → JSON AttendanceEntry
//! sec:{ts_ns}:{seq}        → JSON SecurityEvent (managed by the gate)
//! ```
//!
//! Dates render as ISO `YYYY-MM-DD`, so scanning `att:{date}:` lists one
//! day and key order within a day is identity order.

use chrono::NaiveDate;

/// KV key for an identity's voice template. Format: `tpl:{identity}`
pub fn template_key(identity: &str) -> String {
    format!("tpl:{identity}")
}

/// Prefix for listing all templates.
pub fn template_prefix() -> &'static str {
    "tpl:"
}

/// KV key for one (identity, day) attendance entry.
/// Format: `att:{date}:{identity}`
pub fn attendance_key(date: NaiveDate, identity: &str) -> String {
    format!("att:{date}:{identity}")
}

/// Prefix for listing one day's attendance entries.
pub fn attendance_prefix(date: NaiveDate) -> String {
    format!("att:{date}:")
}

/// Rate-limit key throttling attendance attempts for an identity.
pub fn rate_limit_key(identity: &str) -> String {
    format!("attendance:{identity}")
}
