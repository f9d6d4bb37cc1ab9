//! Audit event records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// What happened. Serialized in SCREAMING_SNAKE form; the set grows as new
/// state transitions become worth auditing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventKind {
    DuplicateEnrollmentAttempt,
    EnrollmentFeatureExtractionFailed,
    SuccessfulEnrollment,
    VerificationUnknownIdentity,
    SuspiciousActivityDetected,
    VerificationFeatureExtractionFailed,
    FeatureDimensionMismatch,
    SuccessfulVerification,
    FailedVerification,
    RateLimitExceeded,
    DuplicateAttendanceAttempt,
    SuccessfulAttendance,
    StoreUnavailable,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DuplicateEnrollmentAttempt => f.write_str("DUPLICATE_ENROLLMENT_ATTEMPT"),
            Self::EnrollmentFeatureExtractionFailed => {
                f.write_str("ENROLLMENT_FEATURE_EXTRACTION_FAILED")
            }
            Self::SuccessfulEnrollment => f.write_str("SUCCESSFUL_ENROLLMENT"),
            Self::VerificationUnknownIdentity => f.write_str("VERIFICATION_UNKNOWN_IDENTITY"),
            Self::SuspiciousActivityDetected => f.write_str("SUSPICIOUS_ACTIVITY_DETECTED"),
            Self::VerificationFeatureExtractionFailed => {
                f.write_str("VERIFICATION_FEATURE_EXTRACTION_FAILED")
            }
            Self::FeatureDimensionMismatch => f.write_str("FEATURE_DIMENSION_MISMATCH"),
            Self::SuccessfulVerification => f.write_str("SUCCESSFUL_VERIFICATION"),
            Self::FailedVerification => f.write_str("FAILED_VERIFICATION"),
            Self::RateLimitExceeded => f.write_str("RATE_LIMIT_EXCEEDED"),
            Self::DuplicateAttendanceAttempt => f.write_str("DUPLICATE_ATTENDANCE_ATTEMPT"),
            Self::SuccessfulAttendance => f.write_str("SUCCESSFUL_ATTENDANCE"),
            Self::StoreUnavailable => f.write_str("STORE_UNAVAILABLE"),
        }
    }
}

/// One append-only audit record. Never mutated or deleted by the core;
/// retention and rotation belong to whoever owns the sink.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityEvent {
    #[serde(rename = "ts")]
    pub timestamp: DateTime<Utc>,

    #[serde(rename = "kind")]
    pub kind: EventKind,

    /// Absent for identity-less events (e.g. a store outage).
    #[serde(rename = "identity", default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<String>,

    #[serde(rename = "details")]
    pub details: String,

    #[serde(rename = "src", default, skip_serializing_if = "Option::is_none")]
    pub source_addr: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_serializes_screaming_snake() {
        let json = serde_json::to_string(&EventKind::RateLimitExceeded).unwrap();
        assert_eq!(json, "\"RATE_LIMIT_EXCEEDED\"");
        let back: EventKind = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EventKind::RateLimitExceeded);
    }

    #[test]
    fn display_matches_wire_form() {
        let json = serde_json::to_string(&EventKind::SuccessfulAttendance).unwrap();
        assert_eq!(json.trim_matches('"'), EventKind::SuccessfulAttendance.to_string());
    }

    #[test]
    fn event_roundtrip() {
        let ev = SecurityEvent {
            timestamp: Utc::now(),
            kind: EventKind::SuccessfulEnrollment,
            identity: Some("S100".into()),
            details: "enrolled".into(),
            source_addr: None,
        };
        let json = serde_json::to_vec(&ev).unwrap();
        let back: SecurityEvent = serde_json::from_slice(&json).unwrap();
        assert_eq!(back.kind, ev.kind);
        assert_eq!(back.identity.as_deref(), Some("S100"));
    }
}
