//! RAMQ Billing Core Library
//!
//! Local-first billing code suggestion for Quebec emergency physicians.
//!
//! # Architecture
//!
//! ```text
//! EncounterInput ──validate──▶ Result cache ──hit──▶ SuggestionBundle (from_cache)
//!                                   │
//!                                  miss
//!                                   │
//!                 ┌─────────────────┴─────────────────┐
//!                 ▼                                   ▼
//!         Remote provider                     Rule classifier
//!   (budget gate, timeout, catalog check)            │
//!                 │                          Semantic enrichment
//!                 │                            (best effort)
//!                 └─────────────────┬─────────────────┘
//!                                   ▼
//!                    Fee modifiers (night, weekend, holiday)
//!                                   │
//!                                   ▼
//!                       Cache write (best effort)
//!                                   │
//!                                   ▼
//!                            SuggestionBundle
//! ```
//!
//! # Core Principle
//!
//! **Suggestions never bill anything.** An encounter enters history only when
//! the physician saves it with the code they selected.
//!
//! # Modules
//!
//! - [`db`]: SQLite storage (catalog, cache, encounter history, usage ledger)
//! - [`models`]: Domain types (CatalogEntry, EncounterInput, SuggestionBundle, etc.)
//! - [`engine`]: Catalog, classifier, matcher, modifiers, cache and orchestrator
//! - [`config`]: Engine configuration resolved at startup

pub mod config;
pub mod db;
pub mod engine;
pub mod models;

// Re-export commonly used types
pub use config::EngineConfig;
pub use db::{Database, EncounterStats, ImportReport};
pub use engine::{Catalog, EngineError, SuggestionEngine, SuggestionProvider, SuggestionStore};
pub use models::{
    CatalogEntry, CatalogRow, EncounterInput, ModifierTag, SavedEncounter, SuggestionBundle,
    ValidationError,
};

// UniFFI setup - using proc macros
uniffi::setup_scaffolding!();

use std::sync::{Arc, Mutex, RwLock};

use chrono::NaiveDateTime;

// =========================================================================
// FFI Error Type
// =========================================================================

#[derive(Debug, thiserror::Error, uniffi::Error)]
pub enum RamqBillingError {
    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Processing error: {0}")]
    ProcessingError(String),
}

impl From<db::DbError> for RamqBillingError {
    fn from(e: db::DbError) -> Self {
        match e {
            db::DbError::NotFound(what) => RamqBillingError::NotFound(what),
            other => RamqBillingError::DatabaseError(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RamqBillingError {
    fn from(e: serde_json::Error) -> Self {
        RamqBillingError::SerializationError(e.to_string())
    }
}

impl From<EngineError> for RamqBillingError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Database(e) => e.into(),
            EngineError::Serialization(e) => e.into(),
            EngineError::Processing(msg) => RamqBillingError::ProcessingError(msg),
        }
    }
}

impl From<ValidationError> for RamqBillingError {
    fn from(e: ValidationError) -> Self {
        RamqBillingError::InvalidInput(e.to_string())
    }
}

impl<T> From<std::sync::PoisonError<T>> for RamqBillingError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        RamqBillingError::DatabaseError(format!("Lock poisoned: {}", e))
    }
}

// =========================================================================
// Factory Functions (exported to FFI)
// =========================================================================

/// Open or create a database at the given path and load its catalog.
#[uniffi::export]
pub fn open_database(path: String) -> Result<Arc<RamqBillingCore>, RamqBillingError> {
    let db = Database::open(&path)?;
    Ok(Arc::new(RamqBillingCore::new(db, EngineConfig::default())?))
}

/// Create an in-memory database (for testing).
#[uniffi::export]
pub fn open_database_in_memory() -> Result<Arc<RamqBillingCore>, RamqBillingError> {
    let db = Database::open_in_memory()?;
    Ok(Arc::new(RamqBillingCore::new(db, EngineConfig::default())?))
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe database and engine wrapper for FFI.
///
/// Locks are always taken engine first, then database. `analyze` takes the
/// database lock per store operation, never across a provider call.
#[derive(uniffi::Object)]
pub struct RamqBillingCore {
    db: Arc<Mutex<Database>>,
    engine: RwLock<SuggestionEngine>,
}

impl RamqBillingCore {
    /// Wrap `db` with an engine built from its catalog.
    pub fn new(db: Database, config: EngineConfig) -> Result<Self, RamqBillingError> {
        let engine = SuggestionEngine::load(&db, config)?;
        Ok(Self::with_engine(db, engine))
    }

    /// Wrap `db` with a preconfigured engine (custom embedder or provider).
    pub fn with_engine(db: Database, engine: SuggestionEngine) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            engine: RwLock::new(engine),
        }
    }
}

#[uniffi::export]
impl RamqBillingCore {
    // =========================================================================
    // Suggestion
    // =========================================================================

    /// Suggest billing codes for an encounter.
    pub fn analyze(
        &self,
        input: FfiEncounterInput,
    ) -> Result<FfiSuggestionBundle, RamqBillingError> {
        let input: EncounterInput = input.try_into()?;
        input.validate()?;

        let engine = self.engine.read()?;
        let bundle = engine.analyze(&*self.db, &input)?;
        Ok(bundle.into())
    }

    // =========================================================================
    // Catalog Operations
    // =========================================================================

    /// List catalog entries, optionally filtered by category and search text.
    pub fn query_codes(
        &self,
        category: Option<String>,
        search: Option<String>,
    ) -> Result<Vec<FfiCatalogEntry>, RamqBillingError> {
        let engine = self.engine.read()?;
        let entries = engine
            .catalog()
            .query(category.as_deref(), search.as_deref());
        Ok(entries.into_iter().map(Into::into).collect())
    }

    /// Get one catalog entry by code.
    pub fn get_code(&self, code: String) -> Result<FfiCatalogEntry, RamqBillingError> {
        let engine = self.engine.read()?;
        engine
            .catalog()
            .get(&code)
            .cloned()
            .map(Into::into)
            .ok_or(RamqBillingError::NotFound(code))
    }

    /// Distinct catalog categories.
    pub fn categories(&self) -> Result<Vec<String>, RamqBillingError> {
        let engine = self.engine.read()?;
        Ok(engine
            .catalog()
            .categories()
            .into_iter()
            .map(String::from)
            .collect())
    }

    /// Bulk insert-or-replace catalog rows. With `replace`, existing entries
    /// are deleted first. Call `reload_catalog` to use the new entries.
    pub fn import_codes(
        &self,
        rows: Vec<FfiCatalogRow>,
        replace: bool,
    ) -> Result<FfiImportReport, RamqBillingError> {
        let rows: Vec<CatalogRow> = rows.into_iter().map(Into::into).collect();
        let mut db = self.db.lock()?;
        let report = if replace {
            db.replace_catalog(&rows)?
        } else {
            db.import_catalog(&rows)?
        };
        Ok(report.into())
    }

    /// Insert the base fee schedule without overwriting existing codes.
    pub fn seed_base_catalog(&self) -> Result<u32, RamqBillingError> {
        let db = self.db.lock()?;
        Ok(db.seed_base_catalog()? as u32)
    }

    /// Reload the in-memory catalog from storage. Returns the entry count.
    pub fn reload_catalog(&self) -> Result<u32, RamqBillingError> {
        let mut engine = self.engine.write()?;
        let db = self.db.lock()?;
        engine.reload_catalog(&db)?;
        Ok(engine.catalog().len() as u32)
    }

    // =========================================================================
    // Encounter History
    // =========================================================================

    /// Save an encounter with the code the physician selected.
    pub fn save_encounter(
        &self,
        physician_id: String,
        input: FfiEncounterInput,
        selected_code: String,
        total_fee: f64,
    ) -> Result<String, RamqBillingError> {
        if physician_id.trim().is_empty() {
            return Err(RamqBillingError::InvalidInput("physician_id is required".into()));
        }
        let input: EncounterInput = input.try_into()?;
        input.validate()?;

        let encounter = SavedEncounter::new(physician_id, input, selected_code, total_fee);
        let db = self.db.lock()?;
        db.insert_encounter(&encounter)?;
        Ok(encounter.encounter_id)
    }

    /// Saved encounters, newest first.
    pub fn list_encounters(
        &self,
        physician_id: Option<String>,
        limit: u32,
    ) -> Result<Vec<FfiSavedEncounter>, RamqBillingError> {
        let db = self.db.lock()?;
        let encounters = db.list_encounters(physician_id.as_deref(), limit as usize)?;
        Ok(encounters.into_iter().map(Into::into).collect())
    }

    /// History and cache figures.
    pub fn statistics(&self) -> Result<FfiStatistics, RamqBillingError> {
        let engine_name = self.engine.read()?.provider_name().to_string();
        let db = self.db.lock()?;
        let stats = db.encounter_statistics()?;
        let cached = db.count_live_cache_entries(chrono::Utc::now())?;

        Ok(FfiStatistics {
            total_encounters: stats.total_encounters as u64,
            average_fee: stats.average_fee,
            total_physicians: stats.total_physicians as u64,
            cached_suggestions: cached as u64,
            engine: engine_name,
        })
    }

    /// Delete expired cache entries. Returns the number removed.
    pub fn purge_expired_cache(&self) -> Result<u64, RamqBillingError> {
        let db = self.db.lock()?;
        Ok(db.purge_expired_cache(chrono::Utc::now())? as u64)
    }
}

// =========================================================================
// FFI Types
// =========================================================================

/// FFI-safe encounter input. `encounter_datetime` is ISO 8601 local time
/// (e.g. "2025-03-04T23:30:00").
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiEncounterInput {
    pub triage_level: u8,
    pub chief_complaint: String,
    pub procedures: Vec<String>,
    pub duration_minutes: u32,
    pub encounter_datetime: Option<String>,
}

impl TryFrom<FfiEncounterInput> for EncounterInput {
    type Error = RamqBillingError;

    fn try_from(input: FfiEncounterInput) -> Result<Self, Self::Error> {
        let encounter_datetime = input
            .encounter_datetime
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(parse_local_datetime)
            .transpose()?;

        Ok(EncounterInput {
            triage_level: input.triage_level,
            chief_complaint: input.chief_complaint,
            procedures: input.procedures,
            duration_minutes: input.duration_minutes,
            encounter_datetime,
        })
    }
}

impl From<EncounterInput> for FfiEncounterInput {
    fn from(input: EncounterInput) -> Self {
        Self {
            triage_level: input.triage_level,
            chief_complaint: input.chief_complaint,
            procedures: input.procedures,
            duration_minutes: input.duration_minutes,
            encounter_datetime: input
                .encounter_datetime
                .map(|dt| dt.format("%Y-%m-%dT%H:%M:%S").to_string()),
        }
    }
}

/// Parse "YYYY-MM-DDTHH:MM[:SS]" or the same with a space separator.
pub fn parse_local_datetime(value: &str) -> Result<NaiveDateTime, RamqBillingError> {
    const FORMATS: &[&str] = &[
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .ok_or_else(|| RamqBillingError::InvalidInput(format!("Invalid encounter datetime: {}", value)))
}

/// FFI-safe fee for one procedure code.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiProcedureFee {
    pub code: String,
    pub fee: f64,
}

/// FFI-safe semantic match.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSemanticMatch {
    pub code: String,
    pub description: String,
    pub base_fee: f64,
    pub similarity: f64,
}

/// FFI-safe suggestion bundle. Modifiers are "NIGHT", "WEEKEND", "HOLIDAY".
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSuggestionBundle {
    pub primary_code: String,
    pub procedure_codes: Vec<String>,
    pub modifiers: Vec<String>,
    pub multiplier: f64,
    pub base_fee: f64,
    pub procedure_fees: Vec<FfiProcedureFee>,
    pub total_fee: f64,
    pub confidence: f64,
    pub reasoning: String,
    pub semantic_alternatives: Vec<FfiSemanticMatch>,
    pub provider: String,
    pub from_cache: bool,
}

impl From<SuggestionBundle> for FfiSuggestionBundle {
    fn from(bundle: SuggestionBundle) -> Self {
        Self {
            primary_code: bundle.primary_code,
            procedure_codes: bundle.procedure_codes,
            modifiers: bundle
                .modifiers
                .iter()
                .map(|m| m.as_str().to_string())
                .collect(),
            multiplier: bundle.multiplier,
            base_fee: bundle.base_fee,
            procedure_fees: bundle
                .procedure_fees
                .into_iter()
                .map(|p| FfiProcedureFee {
                    code: p.code,
                    fee: p.fee,
                })
                .collect(),
            total_fee: bundle.total_fee,
            confidence: bundle.confidence,
            reasoning: bundle.reasoning,
            semantic_alternatives: bundle
                .semantic_alternatives
                .into_iter()
                .map(|m| FfiSemanticMatch {
                    code: m.code,
                    description: m.description,
                    base_fee: m.base_fee,
                    similarity: m.similarity,
                })
                .collect(),
            provider: bundle.provider,
            from_cache: bundle.from_cache,
        }
    }
}

/// FFI-safe catalog entry.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCatalogEntry {
    pub code: String,
    pub description: String,
    pub base_fee: f64,
    pub category: String,
}

impl From<CatalogEntry> for FfiCatalogEntry {
    fn from(entry: CatalogEntry) -> Self {
        Self {
            code: entry.code,
            description: entry.description,
            base_fee: entry.base_fee,
            category: entry.category,
        }
    }
}

/// FFI-safe import row. Rows without code or description are skipped.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiCatalogRow {
    pub code: Option<String>,
    pub description: Option<String>,
    pub base_fee: Option<f64>,
    pub category: Option<String>,
}

impl From<FfiCatalogRow> for CatalogRow {
    fn from(row: FfiCatalogRow) -> Self {
        CatalogRow {
            code: row.code,
            description: row.description,
            base_fee: row.base_fee,
            category: row.category,
        }
    }
}

/// FFI-safe import outcome.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiImportReport {
    pub imported: u32,
    pub skipped: u32,
}

impl From<ImportReport> for FfiImportReport {
    fn from(report: ImportReport) -> Self {
        Self {
            imported: report.imported as u32,
            skipped: report.skipped as u32,
        }
    }
}

/// FFI-safe saved encounter.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiSavedEncounter {
    pub encounter_id: String,
    pub physician_id: String,
    pub input: FfiEncounterInput,
    pub selected_code: String,
    pub total_fee: f64,
    pub created_at: String,
}

impl From<SavedEncounter> for FfiSavedEncounter {
    fn from(encounter: SavedEncounter) -> Self {
        Self {
            encounter_id: encounter.encounter_id,
            physician_id: encounter.physician_id,
            input: encounter.input.into(),
            selected_code: encounter.selected_code,
            total_fee: encounter.total_fee,
            created_at: encounter.created_at,
        }
    }
}

/// FFI-safe statistics.
#[derive(Debug, Clone, uniffi::Record)]
pub struct FfiStatistics {
    pub total_encounters: u64,
    pub average_fee: f64,
    pub total_physicians: u64,
    /// Cache entries not yet expired
    pub cached_suggestions: u64,
    /// Provider tried first ("local_rules_v1" without a remote provider)
    pub engine: String,
}
