//! Service policy in one place.

use rollcall_gate::GateConfig;
use rollcall_voiceprint::{DEFAULT_THRESHOLD, FeatureConfig};

/// Everything tunable about the attendance service.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Validation thresholds and feature layout parameters.
    pub feature: FeatureConfig,
    /// Combined-similarity acceptance threshold (default: 0.88).
    pub threshold: f64,
    /// Lockout and rate-limit policy.
    pub gate: GateConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            feature: FeatureConfig::default(),
            threshold: DEFAULT_THRESHOLD,
            gate: GateConfig::default(),
        }
    }
}
