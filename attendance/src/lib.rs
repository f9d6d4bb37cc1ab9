//! Voice-verified attendance: enrollment, verification and the daily
//! ledger, glued to the security gate.
//!
//! # Control flow
//!
//! ```text
//! enroll:           lookup → decode/validate/extract → archive → persist
//! verify:           lookup → lockout gate → extract → score → bookkeeping
//! mark_attendance:  rate limit → verify → conditional ledger insert
//! ```
//!
//! Every stage short-circuits with a typed [`Rejection`] the caller
//! surfaces verbatim, and every outcome — success or not — writes exactly
//! one audit event per state transition. Persistence goes through
//! [`rollcall_kv::KVStore`]; uniqueness invariants (one template per
//! identity, one ledger entry per identity and day) are conditional
//! inserts at the storage layer, backed up by per-identity locking in the
//! service.

mod archive;
mod config;
mod keys;
mod service;
mod store;
mod types;

pub use archive::{ArchiveError, SampleArchiver, SamplePurpose};
pub use config::ServiceConfig;
pub use keys::{attendance_key, attendance_prefix, rate_limit_key, template_key, template_prefix};
pub use service::AttendanceService;
pub use store::{AttendanceStore, StoreError, TemplateStore};
pub use types::{
    AttendanceEntry, EnrollOutcome, MarkOutcome, Rejection, VERIFICATION_METHOD, VerifyOutcome,
    VoiceTemplate,
};
