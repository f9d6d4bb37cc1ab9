//! Raw-sample archival seam.
//!
//! Enrollment and attendance samples can be shipped to remote object
//! storage for later review. The upload is strictly best-effort: a failed
//! or absent archiver degrades to "no archived sample" and never blocks
//! the verification decision.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("archive: upload failed: {0}")]
    Upload(String),

    #[error("archive: not configured")]
    Disabled,
}

/// Why a sample is being archived; ends up in the object's path/tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SamplePurpose {
    Enrollment,
    Attendance,
}

impl SamplePurpose {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Enrollment => "enrollment",
            Self::Attendance => "attendance",
        }
    }
}

/// Uploads a raw audio sample somewhere durable and returns its locator.
///
/// Implementations live outside the core (HTTP clients, cloud SDKs); the
/// service only ever calls this best-effort.
pub trait SampleArchiver: Send + Sync {
    fn archive(
        &self,
        identity: &str,
        purpose: SamplePurpose,
        audio: &[u8],
    ) -> Result<String, ArchiveError>;
}
