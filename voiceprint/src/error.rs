use thiserror::Error;

/// Rejections from audio validation, feature extraction and matching.
///
/// These are expected, caller-recoverable outcomes: bad input is fixed by
/// resubmitting better audio, a dimension mismatch signals a stale template
/// from an earlier feature layout. They carry enough context to render a
/// human-readable refusal without leaking scoring internals.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum VoiceprintError {
    #[error("audio duration {seconds:.2}s outside allowed range {min:.1}s..{max:.1}s")]
    DurationOutOfRange { seconds: f64, min: f64, max: f64 },

    #[error("audio appears silent or too quiet")]
    SilentOrTooQuiet,

    #[error("audio does not appear to contain human voice")]
    NoVoiceContentDetected,

    #[error("feature dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
}
