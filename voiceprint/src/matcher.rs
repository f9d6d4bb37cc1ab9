//! Similarity scoring between a freshly extracted vector and a stored
//! template.

use crate::VoiceprintError;

/// Default acceptance threshold on the combined similarity.
pub const DEFAULT_THRESHOLD: f64 = 0.88;

/// Weight of cosine similarity in the combined score.
const COSINE_WEIGHT: f64 = 0.7;
/// Weight of the Euclidean term in the combined score.
const EUCLIDEAN_WEIGHT: f64 = 0.3;

/// Outcome of scoring a test vector against a stored one.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchScore {
    /// Cosine similarity, magnitude-invariant directional agreement.
    pub cosine: f64,
    /// Euclidean distance mapped to (0, 1] via 1/(1+e).
    pub euclidean: f64,
    /// 0.7 * cosine + 0.3 * euclidean term.
    pub combined: f64,
    /// Whether `combined` reached the threshold.
    pub accepted: bool,
}

/// Scores two feature vectors.
///
/// Cosine rewards directional agreement and shrugs off any residual
/// loudness the per-clip normalization missed; the Euclidean term pulls
/// the score down when absolute magnitudes drift apart, which cosine alone
/// ignores. Mismatched lengths mean a template from an earlier feature
/// layout and fail hard with [`VoiceprintError::DimensionMismatch`] —
/// never silently re-aligned, never scored.
///
/// Deterministic: identical inputs produce bit-identical scores.
pub fn score(
    test: &[f32],
    stored: &[f32],
    threshold: f64,
) -> Result<MatchScore, VoiceprintError> {
    if test.len() != stored.len() {
        return Err(VoiceprintError::DimensionMismatch {
            expected: stored.len(),
            got: test.len(),
        });
    }

    let mut dot = 0.0f64;
    let mut norm_a = 0.0f64;
    let mut norm_b = 0.0f64;
    let mut dist_sq = 0.0f64;
    for (&a, &b) in test.iter().zip(stored.iter()) {
        let (a, b) = (a as f64, b as f64);
        dot += a * b;
        norm_a += a * a;
        norm_b += b * b;
        let d = a - b;
        dist_sq += d * d;
    }

    let cosine = if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a.sqrt() * norm_b.sqrt())
    };
    let euclidean = 1.0 / (1.0 + dist_sq.sqrt());
    let combined = COSINE_WEIGHT * cosine + EUCLIDEAN_WEIGHT * euclidean;

    Ok(MatchScore {
        cosine,
        euclidean,
        combined,
        accepted: combined >= threshold,
    })
}
