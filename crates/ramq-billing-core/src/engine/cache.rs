//! Result cache keyed by a fingerprint of the encounter.

use std::sync::Mutex;

use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::db::{CacheEntry, Database, DbError, DbResult, UsageRecord};
use crate::models::{EncounterInput, SuggestionBundle};

/// Complaint characters that participate in the fingerprint.
pub const FINGERPRINT_COMPLAINT_CHARS: usize = 50;

/// Default lifetime of a cached bundle.
pub const DEFAULT_CACHE_TTL_DAYS: i64 = 7;

/// Persistence needed by the engine. Implemented by [`Database`] and by a
/// shared `Mutex<Database>`; tests substitute failing or in-memory stores.
pub trait SuggestionStore {
    fn live_cache_entry(&self, input_hash: &str, now: DateTime<Utc>) -> DbResult<Option<CacheEntry>>;
    fn write_cache_entry(&self, entry: &CacheEntry) -> DbResult<()>;
    fn usage_on(&self, day: NaiveDate) -> DbResult<UsageRecord>;
    fn record_usage(&self, day: NaiveDate, cost: f64) -> DbResult<UsageRecord>;
}

impl SuggestionStore for Database {
    fn live_cache_entry(&self, input_hash: &str, now: DateTime<Utc>) -> DbResult<Option<CacheEntry>> {
        self.get_live_cache_entry(input_hash, now)
    }

    fn write_cache_entry(&self, entry: &CacheEntry) -> DbResult<()> {
        self.upsert_cache_entry(entry)
    }

    fn usage_on(&self, day: NaiveDate) -> DbResult<UsageRecord> {
        self.usage_for_day(day)
    }

    fn record_usage(&self, day: NaiveDate, cost: f64) -> DbResult<UsageRecord> {
        self.add_usage(day, cost)
    }
}

/// Locks per operation, so a slow provider call never holds the connection.
impl SuggestionStore for Mutex<Database> {
    fn live_cache_entry(&self, input_hash: &str, now: DateTime<Utc>) -> DbResult<Option<CacheEntry>> {
        self.lock()
            .map_err(|_| DbError::LockPoisoned)?
            .get_live_cache_entry(input_hash, now)
    }

    fn write_cache_entry(&self, entry: &CacheEntry) -> DbResult<()> {
        self.lock()
            .map_err(|_| DbError::LockPoisoned)?
            .upsert_cache_entry(entry)
    }

    fn usage_on(&self, day: NaiveDate) -> DbResult<UsageRecord> {
        self.lock().map_err(|_| DbError::LockPoisoned)?.usage_for_day(day)
    }

    fn record_usage(&self, day: NaiveDate, cost: f64) -> DbResult<UsageRecord> {
        self.lock().map_err(|_| DbError::LockPoisoned)?.add_usage(day, cost)
    }
}

#[derive(Serialize)]
struct FingerprintFields<'a> {
    complaint: String,
    procedures: Vec<&'a str>,
    triage: u8,
}

/// SHA-256 (hex) over the canonical JSON of the truncated complaint, the
/// sorted procedures and the triage level. Duration and time are excluded.
pub fn fingerprint(input: &EncounterInput) -> String {
    let mut procedures: Vec<&str> = input.procedures.iter().map(String::as_str).collect();
    procedures.sort_unstable();

    let fields = FingerprintFields {
        complaint: input
            .chief_complaint
            .chars()
            .take(FINGERPRINT_COMPLAINT_CHARS)
            .collect(),
        procedures,
        triage: input.triage_level,
    };

    // Serializing a struct of strings and integers cannot fail
    let canonical = serde_json::to_string(&fields).unwrap_or_default();
    hex::encode(Sha256::digest(canonical.as_bytes()))
}

/// Cache read or write failure.
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache store error: {0}")]
    Store(#[from] DbError),

    #[error("Cached bundle is unreadable: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Suggestion cache with a fixed time-to-live.
#[derive(Debug, Clone)]
pub struct ResultCache {
    ttl: Duration,
}

impl Default for ResultCache {
    fn default() -> Self {
        Self::new(Duration::days(DEFAULT_CACHE_TTL_DAYS))
    }
}

impl ResultCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl }
    }

    /// Cached bundle for `fingerprint`, or `None` if missing or expired at `now`.
    pub fn get(
        &self,
        store: &dyn SuggestionStore,
        fingerprint: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<SuggestionBundle>, CacheError> {
        let Some(entry) = store.live_cache_entry(fingerprint, now)? else {
            return Ok(None);
        };
        let mut bundle: SuggestionBundle = serde_json::from_str(&entry.output_data)?;
        bundle.from_cache = true;
        Ok(Some(bundle))
    }

    /// Insert or replace the bundle with a fresh expiry.
    pub fn put(
        &self,
        store: &dyn SuggestionStore,
        fingerprint: &str,
        input: &EncounterInput,
        bundle: &SuggestionBundle,
        now: DateTime<Utc>,
    ) -> Result<(), CacheError> {
        let mut stored = bundle.clone();
        stored.from_cache = false;

        store.write_cache_entry(&CacheEntry {
            input_hash: fingerprint.to_string(),
            input_data: serde_json::to_string(input)?,
            output_data: serde_json::to_string(&stored)?,
            model_used: stored.provider.clone(),
            created_at: now,
            expires_at: now + self.ttl,
        })?;
        Ok(())
    }
}
