//! Persisted records and operation outcomes.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use rollcall_audio::AudioError;
use rollcall_voiceprint::VoiceprintError;

use crate::store::StoreError;

/// Verification method tag stamped on ledger entries.
pub const VERIFICATION_METHOD: &str = "voiceprint_v2";

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Stored reference signature for one enrolled identity.
///
/// Created once at enrollment and immutable afterwards except for the
/// verification bookkeeping fields. Removed only by explicit
/// administrative action, which is outside this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceTemplate {
    pub identity: String,
    pub display_name: String,
    /// Layout version of `features`; templates from another version are
    /// rejected at verification, never re-scored.
    pub feature_version: u32,
    pub features: Vec<f32>,
    pub enrolled_at: DateTime<Utc>,
    pub verification_count: u64,
    pub last_verified_at: Option<DateTime<Utc>>,
}

/// One (identity, day) ledger row. Immutable once written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceEntry {
    pub identity: String,
    pub display_name: String,
    pub date: NaiveDate,
    pub timestamp: DateTime<Utc>,
    pub similarity: f64,
    pub method: String,
    /// Archived raw-sample locator, when an archiver was configured and
    /// the upload succeeded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Rejections
// ---------------------------------------------------------------------------

/// Every way an operation can conclude without success.
///
/// These are expected outcomes, not errors: each renders a human-readable
/// refusal, security refusals carry their remaining cool-down, and none of
/// them leak whether the underlying biometric comparison would have
/// passed.
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    // -- input: recoverable by resubmitting better audio --
    DurationOutOfRange { seconds: f64, min: f64, max: f64 },
    SilentOrTooQuiet,
    NoVoiceContentDetected,
    UnsupportedOrCorruptAudio { detail: String },

    // -- integrity: configuration drift or a logic bug --
    DimensionMismatch { expected: usize, got: usize },
    TemplateVersionMismatch { stored: u32, current: u32 },
    IdentityNotFound,

    // -- security: intentional, time-bounded refusals --
    AccountLocked { retry_after_secs: i64 },
    TooManyAttempts { retry_after_secs: i64 },

    // -- expected business outcomes --
    DuplicateEnrollment,
    AlreadyMarked { date: NaiveDate },
    LowSimilarity { similarity: f64, threshold: f64 },

    // -- resource: transient, retry with backoff --
    StoreUnavailable { detail: String },
}

impl Rejection {
    /// Whether this outcome counts toward the identity's lockout window.
    /// Only genuine verification failures do; refusals the gate itself
    /// issued and transient store trouble never do.
    pub fn counts_as_failed_attempt(&self) -> bool {
        matches!(
            self,
            Self::DurationOutOfRange { .. }
                | Self::SilentOrTooQuiet
                | Self::NoVoiceContentDetected
                | Self::UnsupportedOrCorruptAudio { .. }
                | Self::DimensionMismatch { .. }
                | Self::TemplateVersionMismatch { .. }
                | Self::LowSimilarity { .. }
        )
    }

    /// Whether the caller may retry unchanged input after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreUnavailable { .. })
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DurationOutOfRange { seconds, min, max } => write!(
                f,
                "audio duration {seconds:.2}s outside allowed range {min:.1}s..{max:.1}s"
            ),
            Self::SilentOrTooQuiet => write!(f, "audio appears to be silent or too quiet"),
            Self::NoVoiceContentDetected => {
                write!(f, "audio doesn't appear to contain human voice")
            }
            Self::UnsupportedOrCorruptAudio { detail } => {
                write!(f, "could not decode audio: {detail}")
            }
            Self::DimensionMismatch { expected, got } => write!(
                f,
                "stored template has {expected} components but extraction produced {got}"
            ),
            Self::TemplateVersionMismatch { stored, current } => write!(
                f,
                "stored template uses feature version {stored}, current is {current}"
            ),
            Self::IdentityNotFound => write!(f, "identity is not enrolled"),
            Self::AccountLocked { retry_after_secs } => write!(
                f,
                "account temporarily locked after repeated failures; retry in {retry_after_secs}s"
            ),
            Self::TooManyAttempts { retry_after_secs } => write!(
                f,
                "too many attendance attempts; retry in {retry_after_secs}s"
            ),
            Self::DuplicateEnrollment => write!(f, "identity is already enrolled"),
            Self::AlreadyMarked { date } => {
                write!(f, "attendance already marked for {date}")
            }
            Self::LowSimilarity { similarity, .. } => {
                write!(f, "voice verification failed (confidence {similarity:.2})")
            }
            Self::StoreUnavailable { detail } => {
                write!(f, "storage temporarily unavailable: {detail}")
            }
        }
    }
}

impl From<VoiceprintError> for Rejection {
    fn from(e: VoiceprintError) -> Self {
        match e {
            VoiceprintError::DurationOutOfRange { seconds, min, max } => {
                Self::DurationOutOfRange { seconds, min, max }
            }
            VoiceprintError::SilentOrTooQuiet => Self::SilentOrTooQuiet,
            VoiceprintError::NoVoiceContentDetected => Self::NoVoiceContentDetected,
            VoiceprintError::DimensionMismatch { expected, got } => {
                Self::DimensionMismatch { expected, got }
            }
        }
    }
}

impl From<AudioError> for Rejection {
    fn from(e: AudioError) -> Self {
        Self::UnsupportedOrCorruptAudio {
            detail: e.to_string(),
        }
    }
}

impl From<StoreError> for Rejection {
    fn from(e: StoreError) -> Self {
        Self::StoreUnavailable {
            detail: e.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Operation outcomes
// ---------------------------------------------------------------------------

/// Result of [`crate::AttendanceService::enroll`].
#[derive(Debug, Clone, PartialEq)]
pub enum EnrollOutcome {
    Enrolled {
        identity: String,
        display_name: String,
        sample_url: Option<String>,
    },
    Rejected(Rejection),
}

impl EnrollOutcome {
    pub fn success(&self) -> bool {
        matches!(self, Self::Enrolled { .. })
    }

    pub fn message(&self) -> String {
        match self {
            Self::Enrolled { display_name, .. } => {
                format!("{display_name} enrolled successfully")
            }
            Self::Rejected(r) => format!("enrollment failed: {r}"),
        }
    }
}

/// Result of [`crate::AttendanceService::verify`].
#[derive(Debug, Clone, PartialEq)]
pub enum VerifyOutcome {
    Accepted {
        identity: String,
        display_name: String,
        similarity: f64,
    },
    Rejected(Rejection),
}

impl VerifyOutcome {
    pub fn success(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }

    pub fn message(&self) -> String {
        match self {
            Self::Accepted {
                display_name,
                similarity,
                ..
            } => format!("voice verified for {display_name} (confidence {similarity:.2})"),
            Self::Rejected(r) => format!("verification failed: {r}"),
        }
    }
}

/// Result of [`crate::AttendanceService::mark_attendance`].
#[derive(Debug, Clone, PartialEq)]
pub enum MarkOutcome {
    Recorded(AttendanceEntry),
    Rejected(Rejection),
}

impl MarkOutcome {
    pub fn success(&self) -> bool {
        matches!(self, Self::Recorded(_))
    }

    /// Similarity score, when the pipeline got far enough to compute one.
    pub fn similarity(&self) -> Option<f64> {
        match self {
            Self::Recorded(entry) => Some(entry.similarity),
            Self::Rejected(Rejection::LowSimilarity { similarity, .. }) => Some(*similarity),
            Self::Rejected(_) => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::Recorded(entry) => {
                format!("attendance marked for {}", entry.display_name)
            }
            Self::Rejected(r) => format!("attendance not marked: {r}"),
        }
    }
}
