//! The attendance service: enrollment, verification and the daily ledger.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::NaiveDate;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use rollcall_gate::{
    Clock, EventKind, GateConfig, KvAuditSink, SecurityEvent, SecurityGate, SystemClock,
};
use rollcall_kv::KVStore;
use rollcall_voiceprint::{FEATURE_VERSION, extract, score};

use crate::archive::{SampleArchiver, SamplePurpose};
use crate::config::ServiceConfig;
use crate::keys;
use crate::store::{AttendanceStore, TemplateStore};
use crate::types::{
    AttendanceEntry, EnrollOutcome, MarkOutcome, Rejection, VERIFICATION_METHOD, VerifyOutcome,
    VoiceTemplate,
};

/// Voice-verified attendance over a KV store.
///
/// Operations on the same identity serialize on a per-identity lock so
/// check-and-commit sequences (enrollment existence, same-day duplicate,
/// rate limit) cannot interleave; different identities proceed
/// independently. The (identity, day) and (identity) uniqueness
/// invariants additionally hold at the storage layer via conditional
/// inserts, so even a bypassing writer cannot double-commit.
pub struct AttendanceService {
    cfg: ServiceConfig,
    templates: TemplateStore,
    ledger: AttendanceStore,
    gate: SecurityGate,
    clock: Arc<dyn Clock>,
    archiver: Option<Arc<dyn SampleArchiver>>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl AttendanceService {
    /// Service over the given store with wall-clock time, the KV-backed
    /// audit sink and no sample archiver.
    pub fn new(store: Arc<dyn KVStore>, cfg: ServiceConfig) -> Self {
        let sink = Arc::new(KvAuditSink::new(store.clone()));
        Self::with_parts(store, cfg, Arc::new(SystemClock), sink, None)
    }

    /// Fully injected constructor; tests drive the clock and sink.
    pub fn with_parts(
        store: Arc<dyn KVStore>,
        cfg: ServiceConfig,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn rollcall_gate::AuditSink>,
        archiver: Option<Arc<dyn SampleArchiver>>,
    ) -> Self {
        let gate = SecurityGate::new(cfg.gate.clone(), clock.clone(), sink);
        Self {
            cfg,
            templates: TemplateStore::new(store.clone()),
            ledger: AttendanceStore::new(store),
            gate,
            clock,
            archiver,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.cfg
    }

    pub fn gate_config(&self) -> &GateConfig {
        self.gate.config()
    }

    /// Today in the service clock's terms.
    pub fn today(&self) -> NaiveDate {
        self.clock.now().date_naive()
    }

    // -----------------------------------------------------------------
    // Enrollment
    // -----------------------------------------------------------------

    /// Enrolls a new identity from a raw audio sample.
    pub fn enroll(&self, identity: &str, display_name: &str, raw_audio: &[u8]) -> EnrollOutcome {
        self.enroll_from(identity, display_name, raw_audio, None)
    }

    /// [`AttendanceService::enroll`] with the caller's source address for
    /// the audit trail.
    pub fn enroll_from(
        &self,
        identity: &str,
        display_name: &str,
        raw_audio: &[u8],
        source_addr: Option<&str>,
    ) -> EnrollOutcome {
        let lock = self.identity_lock(identity);
        let _guard = lock.lock();

        match self.templates.get(identity) {
            Ok(Some(_)) => {
                self.gate.log_event(
                    EventKind::DuplicateEnrollmentAttempt,
                    Some(identity),
                    format!("attempted to re-enroll as {display_name}"),
                    source_addr,
                );
                return EnrollOutcome::Rejected(Rejection::DuplicateEnrollment);
            }
            Ok(None) => {}
            Err(e) => return EnrollOutcome::Rejected(self.store_trouble(Some(identity), e.into())),
        }

        let features = match self.extract_features(raw_audio) {
            Ok(f) => f,
            Err(rejection) => {
                self.gate.log_event(
                    EventKind::EnrollmentFeatureExtractionFailed,
                    Some(identity),
                    format!("feature extraction failed: {rejection}"),
                    source_addr,
                );
                return EnrollOutcome::Rejected(rejection);
            }
        };

        let sample_url = self.archive_sample(identity, SamplePurpose::Enrollment, raw_audio);

        let template = VoiceTemplate {
            identity: identity.to_string(),
            display_name: display_name.to_string(),
            feature_version: FEATURE_VERSION,
            features,
            enrolled_at: self.clock.now(),
            verification_count: 0,
            last_verified_at: None,
        };
        match self.templates.insert_new(&template) {
            Ok(true) => {}
            Ok(false) => {
                // Lost a race despite the lock (e.g. an external writer).
                self.gate.log_event(
                    EventKind::DuplicateEnrollmentAttempt,
                    Some(identity),
                    format!("attempted to re-enroll as {display_name}"),
                    source_addr,
                );
                return EnrollOutcome::Rejected(Rejection::DuplicateEnrollment);
            }
            Err(e) => return EnrollOutcome::Rejected(self.store_trouble(Some(identity), e.into())),
        }

        self.gate.log_event(
            EventKind::SuccessfulEnrollment,
            Some(identity),
            format!("{display_name} enrolled"),
            source_addr,
        );
        info!("enrolled {identity} ({display_name})");
        EnrollOutcome::Enrolled {
            identity: identity.to_string(),
            display_name: display_name.to_string(),
            sample_url,
        }
    }

    // -----------------------------------------------------------------
    // Verification
    // -----------------------------------------------------------------

    /// Verifies a raw audio sample against the identity's stored template.
    pub fn verify(&self, identity: &str, raw_audio: &[u8]) -> VerifyOutcome {
        self.verify_from(identity, raw_audio, None)
    }

    pub fn verify_from(
        &self,
        identity: &str,
        raw_audio: &[u8],
        source_addr: Option<&str>,
    ) -> VerifyOutcome {
        let lock = self.identity_lock(identity);
        let _guard = lock.lock();
        self.verify_locked(identity, raw_audio, source_addr)
    }

    /// Verification body; caller holds the identity lock.
    fn verify_locked(
        &self,
        identity: &str,
        raw_audio: &[u8],
        source_addr: Option<&str>,
    ) -> VerifyOutcome {
        let mut template = match self.templates.get(identity) {
            Ok(Some(t)) => t,
            Ok(None) => {
                self.gate.log_event(
                    EventKind::VerificationUnknownIdentity,
                    Some(identity),
                    "verification attempted for unknown identity",
                    source_addr,
                );
                return VerifyOutcome::Rejected(Rejection::IdentityNotFound);
            }
            Err(e) => return VerifyOutcome::Rejected(self.store_trouble(Some(identity), e.into())),
        };

        // Lockout is checked before any feature work; extraction on a
        // locked account is wasted effort.
        if self.gate.check_suspicious(identity) {
            let retry_after_secs = self
                .gate
                .lockout_remaining(identity)
                .map(|d| d.num_seconds())
                .unwrap_or(0);
            self.gate.log_event(
                EventKind::SuspiciousActivityDetected,
                Some(identity),
                "repeated failed verification attempts",
                source_addr,
            );
            return VerifyOutcome::Rejected(Rejection::AccountLocked { retry_after_secs });
        }

        let features = match self.extract_features(raw_audio) {
            Ok(f) => f,
            Err(rejection) => {
                self.gate.record_failed_attempt(identity);
                self.gate.log_event(
                    EventKind::VerificationFeatureExtractionFailed,
                    Some(identity),
                    format!("feature extraction failed: {rejection}"),
                    source_addr,
                );
                return VerifyOutcome::Rejected(rejection);
            }
        };

        if template.feature_version != FEATURE_VERSION {
            self.gate.record_failed_attempt(identity);
            self.gate.log_event(
                EventKind::FeatureDimensionMismatch,
                Some(identity),
                format!(
                    "template feature version {} != current {}",
                    template.feature_version, FEATURE_VERSION
                ),
                source_addr,
            );
            return VerifyOutcome::Rejected(Rejection::TemplateVersionMismatch {
                stored: template.feature_version,
                current: FEATURE_VERSION,
            });
        }

        let result = match score(&features, &template.features, self.cfg.threshold) {
            Ok(s) => s,
            Err(e) => {
                // Dimension mismatch: a stale template from an earlier
                // layout. Hard failure, never re-aligned.
                self.gate.record_failed_attempt(identity);
                self.gate.log_event(
                    EventKind::FeatureDimensionMismatch,
                    Some(identity),
                    e.to_string(),
                    source_addr,
                );
                return VerifyOutcome::Rejected(e.into());
            }
        };
        debug!(
            "verify {identity}: cosine {:.4} euclidean {:.4} combined {:.4} threshold {:.2}",
            result.cosine, result.euclidean, result.combined, self.cfg.threshold
        );

        if !result.accepted {
            self.gate.record_failed_attempt(identity);
            self.gate.log_event(
                EventKind::FailedVerification,
                Some(identity),
                format!(
                    "verification failed for {} (similarity {:.4})",
                    template.display_name, result.combined
                ),
                source_addr,
            );
            return VerifyOutcome::Rejected(Rejection::LowSimilarity {
                similarity: result.combined,
                threshold: self.cfg.threshold,
            });
        }

        // The only mutation a template ever sees.
        template.verification_count += 1;
        template.last_verified_at = Some(self.clock.now());
        if let Err(e) = self.templates.update(&template) {
            // The decision stands; only the bookkeeping write failed.
            warn!("verification bookkeeping for {identity} not persisted: {e}");
        }

        self.gate.log_event(
            EventKind::SuccessfulVerification,
            Some(identity),
            format!(
                "voice verified for {} (similarity {:.4})",
                template.display_name, result.combined
            ),
            source_addr,
        );
        VerifyOutcome::Accepted {
            identity: identity.to_string(),
            display_name: template.display_name,
            similarity: result.combined,
        }
    }

    // -----------------------------------------------------------------
    // Attendance
    // -----------------------------------------------------------------

    /// Marks today's attendance after voice verification.
    pub fn mark_attendance(&self, identity: &str, raw_audio: &[u8]) -> MarkOutcome {
        self.mark_attendance_from(identity, raw_audio, None)
    }

    pub fn mark_attendance_from(
        &self,
        identity: &str,
        raw_audio: &[u8],
        source_addr: Option<&str>,
    ) -> MarkOutcome {
        let lock = self.identity_lock(identity);
        let _guard = lock.lock();

        let rate_key = keys::rate_limit_key(identity);
        if !self.gate.check_rate_limit(&rate_key) {
            let retry_after_secs = self
                .gate
                .retry_after(&rate_key)
                .map(|d| d.num_seconds())
                .unwrap_or(0);
            self.gate.log_event(
                EventKind::RateLimitExceeded,
                Some(identity),
                "attendance attempted inside the cool-down window",
                source_addr,
            );
            return MarkOutcome::Rejected(Rejection::TooManyAttempts { retry_after_secs });
        }

        let verdict = self.verify_locked(identity, raw_audio, source_addr);
        // The cool-down starts on every attempt that reached verification,
        // success included: a quick retry must not learn from the response
        // whether the biometric check passed.
        self.gate.apply_rate_limit(&rate_key);

        let (display_name, similarity) = match verdict {
            VerifyOutcome::Accepted {
                display_name,
                similarity,
                ..
            } => (display_name, similarity),
            VerifyOutcome::Rejected(rejection) => return MarkOutcome::Rejected(rejection),
        };

        let now = self.clock.now();
        let sample_url = self.archive_sample(identity, SamplePurpose::Attendance, raw_audio);
        let entry = AttendanceEntry {
            identity: identity.to_string(),
            display_name: display_name.clone(),
            date: now.date_naive(),
            timestamp: now,
            similarity,
            method: VERIFICATION_METHOD.to_string(),
            sample_url,
        };
        match self.ledger.insert_new(&entry) {
            Ok(true) => {}
            Ok(false) => {
                self.gate.log_event(
                    EventKind::DuplicateAttendanceAttempt,
                    Some(identity),
                    format!("attendance already marked for {display_name}"),
                    source_addr,
                );
                return MarkOutcome::Rejected(Rejection::AlreadyMarked { date: entry.date });
            }
            Err(e) => return MarkOutcome::Rejected(self.store_trouble(Some(identity), e.into())),
        }

        self.gate.log_event(
            EventKind::SuccessfulAttendance,
            Some(identity),
            format!("attendance marked for {display_name} (similarity {similarity:.4})"),
            source_addr,
        );
        info!("attendance recorded for {identity} on {}", entry.date);
        MarkOutcome::Recorded(entry)
    }

    // -----------------------------------------------------------------
    // Reports
    // -----------------------------------------------------------------

    /// All attendance entries for a calendar day, keyed by identity.
    pub fn attendance_for_date(
        &self,
        date: NaiveDate,
    ) -> Result<BTreeMap<String, AttendanceEntry>, Rejection> {
        self.ledger.for_date(date).map_err(Rejection::from)
    }

    /// Audit events from the trailing `since_days` days, oldest first.
    pub fn security_events(&self, since_days: i64) -> Vec<SecurityEvent> {
        let cutoff = self.clock.now() - chrono::Duration::days(since_days);
        self.gate.events_since(cutoff)
    }

    /// Enrolled identities with their display names, ordered by identity.
    pub fn enrolled_identities(&self) -> Result<Vec<(String, String)>, Rejection> {
        Ok(self
            .templates
            .list()?
            .into_iter()
            .map(|t| (t.identity, t.display_name))
            .collect())
    }

    // -----------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------

    fn identity_lock(&self, identity: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock();
        locks
            .entry(identity.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Decode, resample to the analysis rate, validate and extract.
    fn extract_features(&self, raw_audio: &[u8]) -> Result<Vec<f32>, Rejection> {
        let decoded = rollcall_audio::decode(raw_audio)?;
        let samples = rollcall_audio::resample(
            &decoded.samples,
            decoded.sample_rate,
            self.cfg.feature.sample_rate,
        )?;
        let features = extract(&samples, self.cfg.feature.sample_rate, &self.cfg.feature)?;
        Ok(features)
    }

    /// Best-effort sample upload; failure degrades to "no archived sample".
    fn archive_sample(
        &self,
        identity: &str,
        purpose: SamplePurpose,
        raw_audio: &[u8],
    ) -> Option<String> {
        let archiver = self.archiver.as_ref()?;
        match archiver.archive(identity, purpose, raw_audio) {
            Ok(url) => Some(url),
            Err(e) => {
                warn!(
                    "sample archive failed for {identity} ({}): {e}",
                    purpose.as_str()
                );
                None
            }
        }
    }

    /// Transient store failure: logged, surfaced, never a failed attempt.
    fn store_trouble(&self, identity: Option<&str>, rejection: Rejection) -> Rejection {
        warn!("store unavailable: {rejection}");
        self.gate.log_event(
            EventKind::StoreUnavailable,
            identity,
            rejection.to_string(),
            None,
        );
        rejection
    }
}
