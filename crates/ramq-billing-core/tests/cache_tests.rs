//! Cache, fallback and persistence behaviour of the suggestion engine.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use proptest::prelude::*;
use ramq_billing_core::db::{CacheEntry, DbError, DbResult, UsageRecord};
use ramq_billing_core::engine::{
    fingerprint, ProviderError, ProviderSuggestion, RemoteConfig, SuggestionProvider,
    SuggestionStore,
};
use ramq_billing_core::models::{CatalogRow, LOCAL_PROVIDER};
use ramq_billing_core::{Database, EncounterInput, EngineConfig, SuggestionEngine};

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 1, 12, 0, 0).unwrap()
}

fn at(s: &str) -> NaiveDateTime {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M").unwrap()
}

fn seeded_db() -> Database {
    let db = Database::open_in_memory().unwrap();
    db.seed_base_catalog().unwrap();
    db
}

fn laceration() -> EncounterInput {
    EncounterInput::new(2, "Lacération avant-bras", 75)
        .with_procedures(["Suture complexe membre supérieur"])
        .at(at("2025-03-04 23:30"))
}

// =========================================================================
// Fingerprint
// =========================================================================

proptest! {
    #[test]
    fn fingerprint_ignores_procedure_order(
        (original, shuffled) in proptest::collection::vec("[a-zé ]{0,16}", 0..6)
            .prop_flat_map(|v| (Just(v.clone()), Just(v).prop_shuffle())),
        triage in 1u8..=5,
        complaint in "[A-Za-z ]{0,80}",
    ) {
        let a = EncounterInput::new(triage, complaint.clone(), 30).with_procedures(original);
        let b = EncounterInput::new(triage, complaint, 90).with_procedures(shuffled);
        prop_assert_eq!(fingerprint(&a), fingerprint(&b));
    }
}

#[test]
fn test_reordered_procedures_hit_cache() {
    let db = seeded_db();
    let engine = SuggestionEngine::load(&db, EngineConfig::default()).unwrap();

    let first = EncounterInput::new(2, "Chute", 30)
        .with_procedures(["ECG", "Suture simple"])
        .at(at("2025-03-04 14:00"));
    let second = EncounterInput::new(2, "Chute", 30)
        .with_procedures(["Suture simple", "ECG"])
        .at(at("2025-03-04 14:00"));

    let fresh = engine.analyze_at(&db, &first, t0()).unwrap();
    let cached = engine.analyze_at(&db, &second, t0()).unwrap();

    assert!(!fresh.from_cache);
    assert!(cached.from_cache);
    // Codes follow the first input's order
    assert_eq!(cached.procedure_codes, vec!["00.44", "15.01"]);
}

// =========================================================================
// Expiry
// =========================================================================

#[test]
fn test_cached_until_seven_days() {
    let db = seeded_db();
    let engine = SuggestionEngine::load(&db, EngineConfig::default()).unwrap();
    let input = laceration();

    assert!(!engine.analyze_at(&db, &input, t0()).unwrap().from_cache);

    let almost = t0() + Duration::days(7) - Duration::milliseconds(1);
    assert!(engine.analyze_at(&db, &input, almost).unwrap().from_cache);

    let expired = t0() + Duration::days(7);
    let recomputed = engine.analyze_at(&db, &input, expired).unwrap();
    assert!(!recomputed.from_cache);

    // Recomputing refreshed the entry
    let later = expired + Duration::days(6);
    assert!(engine.analyze_at(&db, &input, later).unwrap().from_cache);
}

#[test]
fn test_custom_ttl() {
    let db = seeded_db();
    let config = EngineConfig {
        cache_ttl: Duration::hours(1),
        ..Default::default()
    };
    let engine = SuggestionEngine::load(&db, config).unwrap();
    let input = laceration();

    engine.analyze_at(&db, &input, t0()).unwrap();
    let after = t0() + Duration::hours(1);
    assert!(!engine.analyze_at(&db, &input, after).unwrap().from_cache);
}

#[test]
fn test_cached_bundle_matches_original() {
    let db = seeded_db();
    let engine = SuggestionEngine::load(&db, EngineConfig::default()).unwrap();
    let input = laceration();

    let mut fresh = engine.analyze_at(&db, &input, t0()).unwrap();
    let cached = engine.analyze_at(&db, &input, t0()).unwrap();
    fresh.from_cache = true;
    assert_eq!(cached, fresh);

    let entry = db.get_live_cache_entry(&fingerprint(&input), t0()).unwrap().unwrap();
    assert_eq!(entry.model_used, LOCAL_PROVIDER);
    assert_eq!(entry.expires_at - entry.created_at, Duration::days(7));
}

// =========================================================================
// Failing store
// =========================================================================

/// Store whose every operation fails.
struct BrokenStore;

impl SuggestionStore for BrokenStore {
    fn live_cache_entry(&self, _: &str, _: DateTime<Utc>) -> DbResult<Option<CacheEntry>> {
        Err(DbError::Constraint("disk I/O error".into()))
    }

    fn write_cache_entry(&self, _: &CacheEntry) -> DbResult<()> {
        Err(DbError::Constraint("disk I/O error".into()))
    }

    fn usage_on(&self, _: NaiveDate) -> DbResult<UsageRecord> {
        Err(DbError::Constraint("disk I/O error".into()))
    }

    fn record_usage(&self, _: NaiveDate, _: f64) -> DbResult<UsageRecord> {
        Err(DbError::Constraint("disk I/O error".into()))
    }
}

#[test]
fn test_failing_store_never_fails_request() {
    let db = seeded_db();
    let engine = SuggestionEngine::load(&db, EngineConfig::default()).unwrap();

    let bundle = engine.analyze_at(&BrokenStore, &laceration(), t0()).unwrap();
    assert_eq!(bundle.primary_code, "08.49B");
    assert_eq!(bundle.total_fee, 299.30);
    assert!(!bundle.from_cache);
}

#[test]
fn test_failing_store_skips_remote() {
    let db = seeded_db();
    let provider = Arc::new(MockProvider::returning("08.49B", &["15.02"]));
    let engine = SuggestionEngine::load(&db, EngineConfig::default())
        .unwrap()
        .with_provider(provider.clone());

    let bundle = engine.analyze_at(&BrokenStore, &laceration(), t0()).unwrap();
    assert_eq!(bundle.provider, LOCAL_PROVIDER);
    assert_eq!(provider.calls(), 0);
}

// =========================================================================
// Remote provider
// =========================================================================

struct MockProvider {
    result: Result<ProviderSuggestion, ProviderError>,
    delay: StdDuration,
    calls: AtomicUsize,
}

impl MockProvider {
    fn returning(primary: &str, procedures: &[&str]) -> Self {
        Self {
            result: Ok(ProviderSuggestion {
                primary_code: primary.into(),
                procedure_codes: procedures.iter().map(|s| s.to_string()).collect(),
                reasoning: "Consultation prolongée".into(),
                cost_usd: 0.0004,
            }),
            delay: StdDuration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    fn failing() -> Self {
        Self {
            result: Err(ProviderError::Transport("connection refused".into())),
            delay: StdDuration::ZERO,
            calls: AtomicUsize::new(0),
        }
    }

    fn slow(mut self, delay: StdDuration) -> Self {
        self.delay = delay;
        self
    }

    fn costing(mut self, cost_usd: f64) -> Self {
        if let Ok(suggestion) = &mut self.result {
            suggestion.cost_usd = cost_usd;
        }
        self
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl SuggestionProvider for MockProvider {
    fn name(&self) -> &str {
        "mock-remote"
    }

    fn suggest(&self, _input: &EncounterInput) -> Result<ProviderSuggestion, ProviderError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.result.clone()
    }
}

fn remote_engine(db: &Database, provider: Arc<MockProvider>, remote: RemoteConfig) -> SuggestionEngine {
    let config = EngineConfig {
        remote,
        ..Default::default()
    };
    SuggestionEngine::load(db, config).unwrap().with_provider(provider)
}

#[test]
fn test_remote_suggestion_used_and_priced() {
    let db = seeded_db();
    let provider = Arc::new(MockProvider::returning("08.49B", &["15.02"]));
    let engine = remote_engine(&db, provider.clone(), RemoteConfig::default());
    assert_eq!(engine.provider_name(), "mock-remote");

    let bundle = engine.analyze_at(&db, &laceration(), t0()).unwrap();
    assert_eq!(bundle.provider, "mock-remote");
    assert_eq!(bundle.confidence, 0.95);
    assert_eq!(bundle.reasoning, "Consultation prolongée");
    assert_eq!(bundle.multiplier, 1.3);
    assert_eq!(bundle.total_fee, 299.30);
    assert!(bundle.semantic_alternatives.is_empty());

    let usage = db.usage_for_day(t0().with_timezone(&chrono::Local).date_naive()).unwrap();
    assert_eq!(usage.calls, 1);

    // Served from cache, provider not called again
    let again = engine.analyze_at(&db, &laceration(), t0()).unwrap();
    assert!(again.from_cache);
    assert_eq!(again.provider, "mock-remote");
    assert_eq!(provider.calls(), 1);
}

#[test]
fn test_remote_failure_falls_back() {
    let db = seeded_db();
    let provider = Arc::new(MockProvider::failing());
    let engine = remote_engine(&db, provider.clone(), RemoteConfig::default());

    let bundle = engine.analyze_at(&db, &laceration(), t0()).unwrap();
    assert_eq!(bundle.provider, LOCAL_PROVIDER);
    assert_eq!(bundle.confidence, 0.85);
    assert_eq!(bundle.primary_code, "08.49B");
    assert_eq!(provider.calls(), 1);
}

#[test]
fn test_remote_timeout_falls_back() {
    let db = seeded_db();
    let provider = Arc::new(
        MockProvider::returning("08.49B", &["15.02"]).slow(StdDuration::from_millis(500)),
    );
    let remote = RemoteConfig {
        timeout: StdDuration::from_millis(50),
        ..Default::default()
    };
    let engine = remote_engine(&db, provider, remote);

    let started = std::time::Instant::now();
    let bundle = engine.analyze_at(&db, &laceration(), t0()).unwrap();
    assert!(started.elapsed() < StdDuration::from_millis(450));
    assert_eq!(bundle.provider, LOCAL_PROVIDER);

    let today = t0().with_timezone(&chrono::Local).date_naive();
    assert_eq!(db.usage_for_day(today).unwrap().calls, 0);

    // The abandoned call still finishes and is charged on the next request
    thread::sleep(StdDuration::from_millis(700));
    let other = EncounterInput::new(3, "Douleur abdominale", 30).at(at("2025-03-04 14:00"));
    engine.analyze_at(&db, &other, t0()).unwrap();
    let usage = db.usage_for_day(today).unwrap();
    assert_eq!(usage.calls, 1);
    assert!((usage.total_cost - 0.0004).abs() < 1e-12);
}

#[test]
fn test_remote_unknown_code_falls_back() {
    let db = seeded_db();
    let provider = Arc::new(MockProvider::returning("08.99Z", &[]));
    let engine = remote_engine(&db, provider, RemoteConfig::default());

    let bundle = engine.analyze_at(&db, &laceration(), t0()).unwrap();
    assert_eq!(bundle.provider, LOCAL_PROVIDER);
    assert_eq!(bundle.primary_code, "08.49B");
}

#[test]
fn test_rejected_remote_codes_still_spend_budget() {
    let db = seeded_db();
    let provider = Arc::new(MockProvider::returning("08.99Z", &[]).costing(1.0));
    let remote = RemoteConfig {
        daily_budget_usd: 2.0,
        ..Default::default()
    };
    let engine = remote_engine(&db, provider.clone(), remote);

    for complaint in ["Douleur", "Fièvre", "Toux", "Céphalée", "Vertige", "Nausée"] {
        let input = EncounterInput::new(3, complaint, 30).at(at("2025-03-04 14:00"));
        let bundle = engine.analyze_at(&db, &input, t0()).unwrap();
        assert_eq!(bundle.provider, LOCAL_PROVIDER, "{complaint}");
    }

    assert_eq!(provider.calls(), 2);
    let usage = db.usage_for_day(t0().with_timezone(&chrono::Local).date_naive()).unwrap();
    assert_eq!(usage.calls, 2);
    assert!((usage.total_cost - 2.0).abs() < 1e-12);
}

#[test]
fn test_remote_budget_exhausted_skips_call() {
    let db = seeded_db();
    let today = t0().with_timezone(&chrono::Local).date_naive();
    db.add_usage(today, 1.0).unwrap();

    let provider = Arc::new(MockProvider::returning("08.49B", &["15.02"]));
    let remote = RemoteConfig {
        daily_budget_usd: 1.0,
        ..Default::default()
    };
    let engine = remote_engine(&db, provider.clone(), remote);

    let bundle = engine.analyze_at(&db, &laceration(), t0()).unwrap();
    assert_eq!(bundle.provider, LOCAL_PROVIDER);
    assert_eq!(provider.calls(), 0);
}

// =========================================================================
// File-backed persistence
// =========================================================================

#[test]
fn test_reload_picks_up_imported_fees() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ramq.db");

    let mut db = Database::open(&path).unwrap();
    db.seed_base_catalog().unwrap();
    let mut engine = SuggestionEngine::load(&db, EngineConfig::default()).unwrap();

    let weekday = at("2025-03-04 14:00");
    let before = engine
        .analyze_at(&db, &EncounterInput::new(3, "Toux", 20).at(weekday), t0())
        .unwrap();
    assert_eq!(before.total_fee, 89.85);

    let rows = vec![CatalogRow {
        code: Some("08.48A".into()),
        description: Some("Examen en urgence - Ordinaire".into()),
        base_fee: Some(92.10),
        category: Some("urgence".into()),
    }];
    db.import_catalog(&rows).unwrap();

    // Loaded catalog is unchanged until reload
    assert_eq!(engine.catalog().lookup_fee("08.48A"), 89.85);
    engine.reload_catalog(&db).unwrap();
    assert_eq!(engine.catalog().lookup_fee("08.48A"), 92.10);

    let after = engine
        .analyze_at(&db, &EncounterInput::new(3, "Fièvre", 20).at(weekday), t0())
        .unwrap();
    assert_eq!(after.total_fee, 92.10);
}

#[test]
fn test_cache_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ramq.db");
    let input = laceration();

    {
        let db = Database::open(&path).unwrap();
        db.seed_base_catalog().unwrap();
        let engine = SuggestionEngine::load(&db, EngineConfig::default()).unwrap();
        engine.analyze_at(&db, &input, t0()).unwrap();
    }

    let db = Database::open(&path).unwrap();
    let engine = SuggestionEngine::load(&db, EngineConfig::default()).unwrap();
    assert_eq!(engine.catalog().len(), 18);

    let bundle = engine.analyze_at(&db, &input, t0() + Duration::days(1)).unwrap();
    assert!(bundle.from_cache);
    assert_eq!(bundle.primary_code, "08.49B");
}
