//! Typed stores over the KV layer.
//!
//! Both stores use [`rollcall_kv::KVStore::put_if_absent`] for their
//! uniqueness invariants, so a race between two writers resolves at the
//! storage layer no matter what the callers saw beforehand.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::NaiveDate;
use rollcall_kv::{KVError, KVStore};
use thiserror::Error;

use crate::keys;
use crate::types::{AttendanceEntry, VoiceTemplate};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store: {0}")]
    Kv(#[from] KVError),

    #[error("store: decode failed at {key}: {detail}")]
    Decode { key: String, detail: String },

    #[error("store: encode failed: {0}")]
    Encode(String),
}

/// Voice templates, one per enrolled identity.
pub struct TemplateStore {
    store: Arc<dyn KVStore>,
}

impl TemplateStore {
    pub fn new(store: Arc<dyn KVStore>) -> Self {
        Self { store }
    }

    pub fn get(&self, identity: &str) -> Result<Option<VoiceTemplate>, StoreError> {
        let key = keys::template_key(identity);
        match self.store.get(&key)? {
            Some(bytes) => {
                let tpl = serde_json::from_slice(&bytes).map_err(|e| StoreError::Decode {
                    key,
                    detail: e.to_string(),
                })?;
                Ok(Some(tpl))
            }
            None => Ok(None),
        }
    }

    /// Inserts a template for a not-yet-enrolled identity.
    /// Returns `false` when the identity already has one.
    pub fn insert_new(&self, template: &VoiceTemplate) -> Result<bool, StoreError> {
        let bytes =
            serde_json::to_vec(template).map_err(|e| StoreError::Encode(e.to_string()))?;
        Ok(self
            .store
            .put_if_absent(&keys::template_key(&template.identity), &bytes)?)
    }

    /// Rewrites an existing template. Only the verification bookkeeping
    /// fields are expected to differ from the enrolled state.
    pub fn update(&self, template: &VoiceTemplate) -> Result<(), StoreError> {
        let bytes =
            serde_json::to_vec(template).map_err(|e| StoreError::Encode(e.to_string()))?;
        self.store
            .set(&keys::template_key(&template.identity), &bytes)?;
        Ok(())
    }

    /// All enrolled templates, ordered by identity.
    pub fn list(&self) -> Result<Vec<VoiceTemplate>, StoreError> {
        let entries = self.store.scan(keys::template_prefix())?;
        let mut templates = Vec::with_capacity(entries.len());
        for (key, bytes) in entries {
            let tpl = serde_json::from_slice(&bytes).map_err(|e| StoreError::Decode {
                key,
                detail: e.to_string(),
            })?;
            templates.push(tpl);
        }
        Ok(templates)
    }
}

/// The daily attendance ledger.
pub struct AttendanceStore {
    store: Arc<dyn KVStore>,
}

impl AttendanceStore {
    pub fn new(store: Arc<dyn KVStore>) -> Self {
        Self { store }
    }

    pub fn get(
        &self,
        date: NaiveDate,
        identity: &str,
    ) -> Result<Option<AttendanceEntry>, StoreError> {
        let key = keys::attendance_key(date, identity);
        match self.store.get(&key)? {
            Some(bytes) => {
                let entry = serde_json::from_slice(&bytes).map_err(|e| StoreError::Decode {
                    key,
                    detail: e.to_string(),
                })?;
                Ok(Some(entry))
            }
            None => Ok(None),
        }
    }

    /// Writes the first entry for (identity, day). Returns `false` when
    /// one already exists; the stored entry is never overwritten.
    pub fn insert_new(&self, entry: &AttendanceEntry) -> Result<bool, StoreError> {
        let bytes = serde_json::to_vec(entry).map_err(|e| StoreError::Encode(e.to_string()))?;
        Ok(self
            .store
            .put_if_absent(&keys::attendance_key(entry.date, &entry.identity), &bytes)?)
    }

    /// One day's entries, keyed by identity.
    pub fn for_date(
        &self,
        date: NaiveDate,
    ) -> Result<BTreeMap<String, AttendanceEntry>, StoreError> {
        let entries = self.store.scan(&keys::attendance_prefix(date))?;
        let mut map = BTreeMap::new();
        for (key, bytes) in entries {
            let entry: AttendanceEntry =
                serde_json::from_slice(&bytes).map_err(|e| StoreError::Decode {
                    key,
                    detail: e.to_string(),
                })?;
            map.insert(entry.identity.clone(), entry);
        }
        Ok(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rollcall_kv::MemoryStore;

    use crate::types::VERIFICATION_METHOD;

    fn template(identity: &str) -> VoiceTemplate {
        VoiceTemplate {
            identity: identity.into(),
            display_name: format!("Name {identity}"),
            feature_version: 2,
            features: vec![0.5; 80],
            enrolled_at: Utc::now(),
            verification_count: 0,
            last_verified_at: None,
        }
    }

    fn entry(identity: &str, date: NaiveDate) -> AttendanceEntry {
        AttendanceEntry {
            identity: identity.into(),
            display_name: format!("Name {identity}"),
            date,
            timestamp: Utc::now(),
            similarity: 0.93,
            method: VERIFICATION_METHOD.into(),
            sample_url: None,
        }
    }

    #[test]
    fn template_insert_is_once_only() {
        let store = TemplateStore::new(Arc::new(MemoryStore::new()));

        assert!(store.insert_new(&template("S1")).unwrap());
        assert!(!store.insert_new(&template("S1")).unwrap());

        let loaded = store.get("S1").unwrap().unwrap();
        assert_eq!(loaded.identity, "S1");
        assert!(store.get("S2").unwrap().is_none());
    }

    #[test]
    fn template_update_bookkeeping() {
        let store = TemplateStore::new(Arc::new(MemoryStore::new()));
        store.insert_new(&template("S1")).unwrap();

        let mut tpl = store.get("S1").unwrap().unwrap();
        tpl.verification_count += 1;
        tpl.last_verified_at = Some(Utc::now());
        store.update(&tpl).unwrap();

        let loaded = store.get("S1").unwrap().unwrap();
        assert_eq!(loaded.verification_count, 1);
        assert!(loaded.last_verified_at.is_some());
    }

    #[test]
    fn template_list_ordered() {
        let store = TemplateStore::new(Arc::new(MemoryStore::new()));
        store.insert_new(&template("S2")).unwrap();
        store.insert_new(&template("S1")).unwrap();

        let all = store.list().unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].identity, "S1");
        assert_eq!(all[1].identity, "S2");
    }

    #[test]
    fn attendance_second_insert_refused() {
        let store = AttendanceStore::new(Arc::new(MemoryStore::new()));
        let date = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();

        let first = entry("S1", date);
        assert!(store.insert_new(&first).unwrap());

        let mut second = entry("S1", date);
        second.similarity = 0.99;
        assert!(!store.insert_new(&second).unwrap());

        // First write is the one that sticks.
        let stored = store.get(date, "S1").unwrap().unwrap();
        assert_eq!(stored, first);
    }

    #[test]
    fn attendance_scoped_by_date() {
        let store = AttendanceStore::new(Arc::new(MemoryStore::new()));
        let monday = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        let tuesday = NaiveDate::from_ymd_opt(2026, 3, 3).unwrap();

        store.insert_new(&entry("S1", monday)).unwrap();
        store.insert_new(&entry("S2", monday)).unwrap();
        store.insert_new(&entry("S1", tuesday)).unwrap();

        let day = store.for_date(monday).unwrap();
        assert_eq!(day.len(), 2);
        assert!(day.contains_key("S1"));
        assert!(day.contains_key("S2"));

        assert_eq!(store.for_date(tuesday).unwrap().len(), 1);
    }
}
