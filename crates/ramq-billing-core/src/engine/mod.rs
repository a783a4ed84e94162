//! Suggestion engine for emergency encounters.
//!
//! Pipeline: Cache → (Remote provider | Classifier → Semantic enrichment) →
//! Fee modifiers → Cache write

mod cache;
mod catalog;
mod classifier;
mod fees;
mod matcher;
mod modifiers;
mod provider;

pub use cache::*;
pub use catalog::*;
pub use classifier::*;
pub use fees::*;
pub use matcher::*;
pub use modifiers::*;
pub use provider::*;

use std::sync::Arc;

use chrono::{DateTime, Datelike, Local, NaiveDate, Utc};
use thiserror::Error;

use crate::config::EngineConfig;
use crate::db::{Database, DbError};
use crate::models::{EncounterInput, SemanticMatch, SuggestionBundle, LOCAL_PROVIDER};

/// Engine errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Processing error: {0}")]
    Processing(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Codes chosen for an encounter before pricing.
struct Selection {
    classification: Classification,
    provider: String,
    alternatives: Vec<SemanticMatch>,
}

/// Coordinates the catalog, classifier, matcher, modifiers, cache and an
/// optional remote provider.
pub struct SuggestionEngine {
    catalog: Catalog,
    classifier: Classifier,
    modifiers: ModifierCalculator,
    embedder: Option<Arc<dyn Embedder>>,
    matcher: SemanticMatcher,
    cache: ResultCache,
    semantic_alternatives: usize,
    remote_config: RemoteConfig,
    remote: Option<RemoteGate>,
}

impl std::fmt::Debug for SuggestionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuggestionEngine")
            .field("catalog_entries", &self.catalog.len())
            .field("matcher", &self.matcher)
            .field("remote", &self.remote)
            .finish()
    }
}

impl SuggestionEngine {
    /// Create an engine over an already-loaded catalog.
    ///
    /// With `semantic_enabled`, the built-in lexical embedder backs the matcher.
    pub fn new(catalog: Catalog, config: EngineConfig) -> Self {
        let embedder: Option<Arc<dyn Embedder>> = if config.semantic_enabled {
            Some(Arc::new(LexicalEmbedder::default()))
        } else {
            None
        };
        let matcher = SemanticMatcher::build(embedder.clone(), &catalog);

        Self {
            catalog,
            classifier: Classifier::new(config.classifier),
            modifiers: ModifierCalculator::new(config.modifiers),
            embedder,
            matcher,
            cache: ResultCache::new(config.cache_ttl),
            semantic_alternatives: config.semantic_alternatives,
            remote_config: config.remote,
            remote: None,
        }
    }

    /// Load the catalog from storage and create an engine over it.
    pub fn load(db: &Database, config: EngineConfig) -> EngineResult<Self> {
        Ok(Self::new(Catalog::load(db)?, config))
    }

    /// Replace the embedding backend. `None` disables semantic enrichment.
    pub fn with_embedder(mut self, embedder: Option<Arc<dyn Embedder>>) -> Self {
        self.matcher = SemanticMatcher::build(embedder.clone(), &self.catalog);
        self.embedder = embedder;
        self
    }

    /// Consult `provider` before the rule classifier.
    pub fn with_provider(mut self, provider: Arc<dyn SuggestionProvider>) -> Self {
        self.remote = Some(RemoteGate::new(provider, self.remote_config.clone()));
        self
    }

    /// Reload the catalog from storage and rebuild the semantic index.
    pub fn reload_catalog(&mut self, db: &Database) -> EngineResult<()> {
        self.set_catalog(Catalog::load(db)?);
        Ok(())
    }

    pub fn set_catalog(&mut self, catalog: Catalog) {
        self.matcher = SemanticMatcher::build(self.embedder.clone(), &catalog);
        self.catalog = catalog;
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Tag of the provider tried first.
    pub fn provider_name(&self) -> &str {
        self.remote.as_ref().map_or(LOCAL_PROVIDER, |r| r.name())
    }

    /// Suggest codes for `input`, at the current time.
    pub fn analyze(
        &self,
        store: &dyn SuggestionStore,
        input: &EncounterInput,
    ) -> EngineResult<SuggestionBundle> {
        self.analyze_at(store, input, Utc::now())
    }

    /// Suggest codes for `input` as if processed at `now`.
    ///
    /// A missing encounter time is taken as `now` in local time. Cache and
    /// provider failures are logged and never fail the request.
    pub fn analyze_at(
        &self,
        store: &dyn SuggestionStore,
        input: &EncounterInput,
        now: DateTime<Utc>,
    ) -> EngineResult<SuggestionBundle> {
        let key = fingerprint(input);

        match self.cache.get(store, &key, now) {
            Ok(Some(bundle)) => {
                tracing::debug!(fingerprint = %key, "Cache hit");
                return Ok(bundle);
            }
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "Cache read failed, treating as miss"),
        }

        let local_now = now.with_timezone(&Local);
        let selection = self.select_codes(store, input, local_now.date_naive());

        let encounter_time = input
            .encounter_datetime
            .unwrap_or_else(|| local_now.naive_local());
        if !self.modifiers.covers_year(encounter_time.year()) {
            tracing::debug!(%encounter_time, "No holiday table for encounter year");
        }
        let modifiers = self.modifiers.compute(encounter_time);

        let Selection {
            classification,
            provider,
            alternatives,
        } = selection;

        let fees = price(
            &self.catalog,
            &classification.primary_code,
            &classification.procedure_codes,
            modifiers.multiplier,
        )
        .ok_or_else(|| EngineError::Processing("fee total overflowed".into()))?;

        let bundle = SuggestionBundle {
            primary_code: classification.primary_code,
            procedure_codes: classification.procedure_codes,
            modifiers: modifiers.tags,
            multiplier: modifiers.multiplier.reported(),
            base_fee: fees.base_fee,
            procedure_fees: fees.procedure_fees,
            total_fee: fees.total_fee,
            confidence: classification.confidence,
            reasoning: classification.reasoning,
            semantic_alternatives: alternatives,
            provider,
            from_cache: false,
        };

        if let Err(e) = self.cache.put(store, &key, input, &bundle, now) {
            tracing::warn!(error = %e, "Cache write failed");
        }

        tracing::info!(
            primary = %bundle.primary_code,
            procedures = bundle.procedure_codes.len(),
            multiplier = bundle.multiplier,
            total_fee = bundle.total_fee,
            provider = %bundle.provider,
            "Suggestion computed"
        );
        Ok(bundle)
    }

    fn select_codes(
        &self,
        store: &dyn SuggestionStore,
        input: &EncounterInput,
        today: NaiveDate,
    ) -> Selection {
        if let Some(remote) = &self.remote {
            match remote.suggest(store, &self.catalog, input, today) {
                Ok(suggestion) => {
                    return Selection {
                        classification: Classification {
                            primary_code: suggestion.primary_code,
                            procedure_codes: suggestion.procedure_codes,
                            confidence: remote.config().confidence,
                            reasoning: suggestion.reasoning,
                        },
                        provider: remote.name().to_string(),
                        alternatives: Vec::new(),
                    };
                }
                Err(e) => tracing::warn!(
                    provider = remote.name(),
                    error = %e,
                    "Remote provider skipped, using rules"
                ),
            }
        }

        let classification = self.classifier.classify(
            input.triage_level,
            input.duration_minutes,
            &input.procedures,
        );

        Selection {
            classification,
            provider: LOCAL_PROVIDER.to_string(),
            alternatives: self.enrich(input),
        }
    }

    /// Semantic alternatives, or none if the matcher is unavailable.
    fn enrich(&self, input: &EncounterInput) -> Vec<SemanticMatch> {
        if input.chief_complaint.trim().is_empty() {
            return Vec::new();
        }

        let query = std::iter::once(input.chief_complaint.as_str())
            .chain(input.procedures.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ");

        match self.matcher.rank(&query) {
            Ok(mut matches) => {
                matches.truncate(self.semantic_alternatives);
                matches
            }
            Err(Unavailable::NoBackend) => Vec::new(),
            Err(e) => {
                tracing::warn!(error = %e, "Semantic enrichment skipped");
                Vec::new()
            }
        }
    }
}
