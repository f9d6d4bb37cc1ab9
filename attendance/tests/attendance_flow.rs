//! End-to-end exercises of the attendance service over an in-memory
//! store with a hand-driven clock.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Duration, TimeZone, Utc};

use rollcall_attendance::{
    ArchiveError, AttendanceService, EnrollOutcome, MarkOutcome, Rejection, SampleArchiver,
    SamplePurpose, ServiceConfig, TemplateStore, VerifyOutcome, VoiceTemplate,
};
use rollcall_gate::{Clock, EventKind, KvAuditSink, ManualClock};
use rollcall_kv::{KVError, KVResult, KVStore, MemoryStore, RedbStore};

// -------------------------------------------------------------------------
// Test audio
// -------------------------------------------------------------------------

const SR: u32 = 22_050;

/// Deterministic voice-like clip: harmonic stack on 155 Hz with vibrato.
/// `variant` shifts the vibrato phase, standing in for "another clip of
/// the same voice".
fn voice_clip(seconds: f64, sample_rate: u32, variant: u64) -> Vec<f32> {
    let n = (seconds * sample_rate as f64) as usize;
    let phase = variant as f64 * 0.7;
    (0..n)
        .map(|i| {
            let t = i as f64 / sample_rate as f64;
            let f = 155.0 + 3.0 * (2.0 * std::f64::consts::PI * 5.0 * t + phase).sin();
            let mut s = 0.0;
            for h in 1..=8u32 {
                s += (2.0 * std::f64::consts::PI * f * h as f64 * t).sin() / h as f64;
            }
            let env = 0.6 + 0.4 * (2.0 * std::f64::consts::PI * 2.5 * t).sin();
            (s * env * 0.18) as f32
        })
        .collect()
}

/// Minimal PCM16 mono WAV encoder.
fn wav_bytes(samples: &[f32], sample_rate: u32) -> Vec<u8> {
    let data_len = (samples.len() * 2) as u32;
    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * 2).to_le_bytes());
    out.extend_from_slice(&2u16.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for &s in samples {
        let v = (s.clamp(-1.0, 1.0) * 32767.0) as i16;
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

fn voice_wav(seconds: f64, variant: u64) -> Vec<u8> {
    wav_bytes(&voice_clip(seconds, SR, variant), SR)
}

fn silent_wav(seconds: f64) -> Vec<u8> {
    wav_bytes(&vec![0.0f32; (seconds * SR as f64) as usize], SR)
}

// -------------------------------------------------------------------------
// Harness
// -------------------------------------------------------------------------

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 2, 8, 30, 0).unwrap()
}

struct Harness {
    service: AttendanceService,
    clock: Arc<ManualClock>,
    store: Arc<MemoryStore>,
}

fn harness() -> Harness {
    harness_with_archiver(None)
}

fn harness_with_archiver(archiver: Option<Arc<dyn SampleArchiver>>) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(ManualClock::new(start_time()));
    let sink = Arc::new(KvAuditSink::new(store.clone()));
    let service = AttendanceService::with_parts(
        store.clone(),
        ServiceConfig::default(),
        clock.clone(),
        sink,
        archiver,
    );
    Harness {
        service,
        clock,
        store,
    }
}

fn event_kinds(service: &AttendanceService) -> Vec<EventKind> {
    service.security_events(7).iter().map(|e| e.kind).collect()
}

// -------------------------------------------------------------------------
// Scenarios
// -------------------------------------------------------------------------

#[test]
fn end_to_end_enroll_verify_attend() {
    let h = harness();

    // Enroll with a 5-second clean sample.
    let enrolled = h.service.enroll("S100", "Ada Lovelace", &voice_wav(5.0, 0));
    assert!(enrolled.success(), "{}", enrolled.message());

    // Verify with a different clip of the same voice.
    let verdict = h.service.verify("S100", &voice_wav(5.0, 1));
    let VerifyOutcome::Accepted {
        display_name,
        similarity,
        ..
    } = &verdict
    else {
        panic!("verification rejected: {}", verdict.message());
    };
    assert_eq!(display_name, "Ada Lovelace");
    assert!(
        *similarity >= 0.88,
        "similarity {similarity} below threshold"
    );

    // Mark attendance with a third clip.
    let marked = h.service.mark_attendance("S100", &voice_wav(5.0, 2));
    let MarkOutcome::Recorded(entry) = &marked else {
        panic!("attendance rejected: {}", marked.message());
    };
    assert_eq!(entry.identity, "S100");
    assert_eq!(entry.date, h.service.today());

    let day = h.service.attendance_for_date(h.service.today()).unwrap();
    assert_eq!(day.len(), 1);

    // Second attempt the same day, after the cool-down, is a duplicate.
    h.clock.advance(Duration::seconds(301));
    let again = h.service.mark_attendance("S100", &voice_wav(5.0, 3));
    assert_eq!(
        again,
        MarkOutcome::Rejected(Rejection::AlreadyMarked {
            date: h.service.today()
        })
    );

    // The first entry is untouched.
    let day = h.service.attendance_for_date(h.service.today()).unwrap();
    assert_eq!(day.get("S100").unwrap(), entry);

    let kinds = event_kinds(&h.service);
    for expected in [
        EventKind::SuccessfulEnrollment,
        EventKind::SuccessfulVerification,
        EventKind::SuccessfulAttendance,
        EventKind::DuplicateAttendanceAttempt,
    ] {
        assert!(kinds.contains(&expected), "missing {expected} in {kinds:?}");
    }
}

#[test]
fn duplicate_enrollment_rejected() {
    let h = harness();
    assert!(h.service.enroll("S1", "First", &voice_wav(3.0, 0)).success());

    let second = h.service.enroll("S1", "Second", &voice_wav(3.0, 1));
    assert_eq!(
        second,
        EnrollOutcome::Rejected(Rejection::DuplicateEnrollment)
    );
    assert!(event_kinds(&h.service).contains(&EventKind::DuplicateEnrollmentAttempt));
}

#[test]
fn short_audio_rejected_before_features() {
    let h = harness();
    let outcome = h.service.enroll("S1", "Short", &voice_wav(0.5, 0));
    let EnrollOutcome::Rejected(Rejection::DurationOutOfRange { seconds, .. }) = outcome else {
        panic!("expected duration rejection, got {outcome:?}");
    };
    assert!((seconds - 0.5).abs() < 0.05);
    assert!(event_kinds(&h.service).contains(&EventKind::EnrollmentFeatureExtractionFailed));
}

#[test]
fn garbage_bytes_rejected_as_unsupported() {
    let h = harness();
    let outcome = h.service.enroll("S1", "Garbage", b"definitely not audio");
    assert!(matches!(
        outcome,
        EnrollOutcome::Rejected(Rejection::UnsupportedOrCorruptAudio { .. })
    ));
}

#[test]
fn unknown_identity_rejected() {
    let h = harness();
    let verdict = h.service.verify("missing", &voice_wav(3.0, 0));
    assert_eq!(
        verdict,
        VerifyOutcome::Rejected(Rejection::IdentityNotFound)
    );
    assert!(event_kinds(&h.service).contains(&EventKind::VerificationUnknownIdentity));
}

#[test]
fn rate_limit_throttles_even_after_success() {
    let h = harness();
    assert!(h.service.enroll("S1", "Ada", &voice_wav(5.0, 0)).success());

    let first = h.service.mark_attendance("S1", &voice_wav(5.0, 1));
    assert!(first.success(), "{}", first.message());

    // Inside the cool-down the refusal is the rate limit, not the
    // duplicate — the response must not reveal the ledger state.
    let second = h.service.mark_attendance("S1", &voice_wav(5.0, 2));
    let MarkOutcome::Rejected(Rejection::TooManyAttempts { retry_after_secs }) = second else {
        panic!("expected rate limit, got {second:?}");
    };
    assert!(retry_after_secs > 0 && retry_after_secs <= 300);
    assert!(event_kinds(&h.service).contains(&EventKind::RateLimitExceeded));

    // The ledger was never touched for the second attempt.
    assert_eq!(
        h.service
            .attendance_for_date(h.service.today())
            .unwrap()
            .len(),
        1
    );
}

#[test]
fn lockout_after_repeated_failures() {
    let h = harness();
    assert!(h.service.enroll("S1", "Ada", &voice_wav(5.0, 0)).success());

    // Three failed verifications (silent clips) inside the window.
    for _ in 0..3 {
        let verdict = h.service.verify("S1", &silent_wav(3.0));
        assert_eq!(
            verdict,
            VerifyOutcome::Rejected(Rejection::SilentOrTooQuiet)
        );
    }

    // Correct audio is now refused up front.
    let verdict = h.service.verify("S1", &voice_wav(5.0, 1));
    let VerifyOutcome::Rejected(Rejection::AccountLocked { retry_after_secs }) = verdict else {
        panic!("expected lockout, got {verdict:?}");
    };
    assert!(retry_after_secs > 0);
    assert!(event_kinds(&h.service).contains(&EventKind::SuspiciousActivityDetected));

    // The window slides: an hour later the same audio verifies.
    h.clock.advance(Duration::minutes(61));
    let verdict = h.service.verify("S1", &voice_wav(5.0, 1));
    assert!(verdict.success(), "{}", verdict.message());
}

#[test]
fn verification_bookkeeping_increments() {
    let h = harness();
    assert!(h.service.enroll("S1", "Ada", &voice_wav(5.0, 0)).success());
    assert!(h.service.verify("S1", &voice_wav(5.0, 1)).success());
    assert!(h.service.verify("S1", &voice_wav(5.0, 2)).success());

    let templates = TemplateStore::new(h.store.clone());
    let tpl = templates.get("S1").unwrap().unwrap();
    assert_eq!(tpl.verification_count, 2);
    assert_eq!(tpl.last_verified_at, Some(h.clock.now()));
}

#[test]
fn stale_template_version_is_integrity_failure() {
    let h = harness();
    let templates = TemplateStore::new(h.store.clone());
    templates
        .insert_new(&VoiceTemplate {
            identity: "S1".into(),
            display_name: "Stale".into(),
            feature_version: 1,
            features: vec![0.1; 80],
            enrolled_at: h.clock.now(),
            verification_count: 0,
            last_verified_at: None,
        })
        .unwrap();

    let verdict = h.service.verify("S1", &voice_wav(5.0, 0));
    assert_eq!(
        verdict,
        VerifyOutcome::Rejected(Rejection::TemplateVersionMismatch {
            stored: 1,
            current: 2
        })
    );
    assert!(event_kinds(&h.service).contains(&EventKind::FeatureDimensionMismatch));
}

#[test]
fn mismatched_dimensions_never_score() {
    let h = harness();
    let templates = TemplateStore::new(h.store.clone());
    templates
        .insert_new(&VoiceTemplate {
            identity: "S1".into(),
            display_name: "Truncated".into(),
            feature_version: 2,
            features: vec![0.1; 60],
            enrolled_at: h.clock.now(),
            verification_count: 0,
            last_verified_at: None,
        })
        .unwrap();

    let verdict = h.service.verify("S1", &voice_wav(5.0, 0));
    assert_eq!(
        verdict,
        VerifyOutcome::Rejected(Rejection::DimensionMismatch {
            expected: 60,
            got: 80
        })
    );
}

#[test]
fn resampled_input_verifies() {
    // Enroll at 22.05kHz, verify with the same voice rendered at 44.1kHz;
    // the front-end resamples and the signature still matches.
    let h = harness();
    assert!(h.service.enroll("S1", "Ada", &voice_wav(5.0, 0)).success());

    let hi_rate = wav_bytes(&voice_clip(5.0, 44_100, 0), 44_100);
    let verdict = h.service.verify("S1", &hi_rate);
    assert!(verdict.success(), "{}", verdict.message());
}

#[test]
fn concurrent_attendance_commits_once() {
    let h = harness();
    assert!(h.service.enroll("S1", "Ada", &voice_wav(5.0, 0)).success());

    let service = &h.service;
    let outcomes: Vec<MarkOutcome> = std::thread::scope(|s| {
        let a = s.spawn(|| service.mark_attendance("S1", &voice_wav(5.0, 1)));
        let b = s.spawn(|| service.mark_attendance("S1", &voice_wav(5.0, 2)));
        vec![a.join().unwrap(), b.join().unwrap()]
    });

    let successes = outcomes.iter().filter(|o| o.success()).count();
    assert_eq!(successes, 1, "exactly one attempt may commit: {outcomes:?}");
    assert!(
        outcomes.iter().any(|o| matches!(
            o,
            MarkOutcome::Rejected(
                Rejection::TooManyAttempts { .. } | Rejection::AlreadyMarked { .. }
            )
        )),
        "loser must see a throttle or duplicate: {outcomes:?}"
    );
    assert_eq!(
        h.service
            .attendance_for_date(h.service.today())
            .unwrap()
            .len(),
        1
    );
}

// -------------------------------------------------------------------------
// Store failures are transient, not verification failures
// -------------------------------------------------------------------------

struct FailingStore {
    inner: MemoryStore,
    failing: AtomicBool,
}

impl FailingStore {
    fn check(&self) -> KVResult<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(KVError::Storage("injected outage".into()));
        }
        Ok(())
    }
}

impl KVStore for FailingStore {
    fn get(&self, key: &str) -> KVResult<Option<Vec<u8>>> {
        self.check()?;
        self.inner.get(key)
    }
    fn set(&self, key: &str, value: &[u8]) -> KVResult<()> {
        self.check()?;
        self.inner.set(key, value)
    }
    fn put_if_absent(&self, key: &str, value: &[u8]) -> KVResult<bool> {
        self.check()?;
        self.inner.put_if_absent(key, value)
    }
    fn delete(&self, key: &str) -> KVResult<()> {
        self.check()?;
        self.inner.delete(key)
    }
    fn scan(&self, prefix: &str) -> KVResult<Vec<(String, Vec<u8>)>> {
        self.check()?;
        self.inner.scan(prefix)
    }
}

#[test]
fn store_outage_is_transient_and_never_locks_out() {
    let store = Arc::new(FailingStore {
        inner: MemoryStore::new(),
        failing: AtomicBool::new(false),
    });
    let clock = Arc::new(ManualClock::new(start_time()));
    let sink = Arc::new(KvAuditSink::new(store.clone()));
    let service = AttendanceService::with_parts(
        store.clone(),
        ServiceConfig::default(),
        clock,
        sink,
        None,
    );

    assert!(service.enroll("S1", "Ada", &voice_wav(5.0, 0)).success());

    store.failing.store(true, Ordering::SeqCst);
    for _ in 0..3 {
        let verdict = service.verify("S1", &voice_wav(5.0, 1));
        let VerifyOutcome::Rejected(rejection) = verdict else {
            panic!("expected store rejection");
        };
        assert!(rejection.is_transient());
        assert!(!rejection.counts_as_failed_attempt());
    }

    // Outage over: the identity is not locked out and verifies normally.
    store.failing.store(false, Ordering::SeqCst);
    let verdict = service.verify("S1", &voice_wav(5.0, 1));
    assert!(verdict.success(), "{}", verdict.message());

    // The outage itself was audited once the sink recovered.
    assert!(
        service
            .security_events(7)
            .iter()
            .any(|e| e.kind == EventKind::StoreUnavailable)
    );
}

// -------------------------------------------------------------------------
// Archiver degradation
// -------------------------------------------------------------------------

struct StubArchiver {
    fail: bool,
}

impl SampleArchiver for StubArchiver {
    fn archive(
        &self,
        identity: &str,
        purpose: SamplePurpose,
        _audio: &[u8],
    ) -> Result<String, ArchiveError> {
        if self.fail {
            return Err(ArchiveError::Upload("bucket unreachable".into()));
        }
        Ok(format!("https://archive/{}/{identity}", purpose.as_str()))
    }
}

#[test]
fn archiver_url_recorded_on_success() {
    let h = harness_with_archiver(Some(Arc::new(StubArchiver { fail: false })));
    let outcome = h.service.enroll("S1", "Ada", &voice_wav(5.0, 0));
    let EnrollOutcome::Enrolled { sample_url, .. } = outcome else {
        panic!("enrollment failed");
    };
    assert_eq!(
        sample_url.as_deref(),
        Some("https://archive/enrollment/S1")
    );

    let marked = h.service.mark_attendance("S1", &voice_wav(5.0, 1));
    let MarkOutcome::Recorded(entry) = marked else {
        panic!("attendance failed");
    };
    assert_eq!(
        entry.sample_url.as_deref(),
        Some("https://archive/attendance/S1")
    );
}

#[test]
fn archiver_failure_degrades_gracefully() {
    let h = harness_with_archiver(Some(Arc::new(StubArchiver { fail: true })));
    let outcome = h.service.enroll("S1", "Ada", &voice_wav(5.0, 0));
    let EnrollOutcome::Enrolled { sample_url, .. } = outcome else {
        panic!("enrollment must succeed without the archive");
    };
    assert_eq!(sample_url, None);

    let marked = h.service.mark_attendance("S1", &voice_wav(5.0, 1));
    assert!(marked.success(), "{}", marked.message());
}

#[test]
fn roster_lists_enrolled_identities() {
    let h = harness();
    assert!(h.service.enroll("S2", "Grace Hopper", &voice_wav(3.0, 0)).success());
    assert!(h.service.enroll("S1", "Ada Lovelace", &voice_wav(3.0, 1)).success());

    let roster = h.service.enrolled_identities().unwrap();
    assert_eq!(
        roster,
        vec![
            ("S1".to_string(), "Ada Lovelace".to_string()),
            ("S2".to_string(), "Grace Hopper".to_string()),
        ]
    );
}

#[test]
fn state_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rollcall.redb");

    {
        let store = Arc::new(RedbStore::open(&path).unwrap());
        let sink = Arc::new(KvAuditSink::new(store.clone()));
        let service = AttendanceService::with_parts(
            store,
            ServiceConfig::default(),
            Arc::new(ManualClock::new(start_time())),
            sink,
            None,
        );
        assert!(service.enroll("S1", "Ada", &voice_wav(3.0, 0)).success());
    }

    // A fresh process over the same file sees the template and the trail.
    let store = Arc::new(RedbStore::open(&path).unwrap());
    let sink = Arc::new(KvAuditSink::new(store.clone()));
    let service = AttendanceService::with_parts(
        store,
        ServiceConfig::default(),
        Arc::new(ManualClock::new(start_time())),
        sink,
        None,
    );
    assert!(service.verify("S1", &voice_wav(3.0, 1)).success());
    assert_eq!(
        service.enrolled_identities().unwrap(),
        vec![("S1".to_string(), "Ada".to_string())]
    );
    assert!(event_kinds(&service).contains(&EventKind::SuccessfulEnrollment));
}

#[test]
fn security_events_filtered_by_window() {
    let h = harness();
    assert!(h.service.enroll("S1", "Ada", &voice_wav(3.0, 0)).success());

    h.clock.advance(Duration::days(10));
    let _ = h.service.verify("missing", &voice_wav(3.0, 0));

    // The enrollment is outside the 7-day window, the failed lookup is in.
    let kinds = event_kinds(&h.service);
    assert!(!kinds.contains(&EventKind::SuccessfulEnrollment));
    assert!(kinds.contains(&EventKind::VerificationUnknownIdentity));
}
