//! Remote suggestion providers and the gate that guards them.
//!
//! A provider may preempt the rule classifier. The gate enforces the daily
//! spend ceiling, bounds the wait, and rejects codes unknown to the catalog.
//! Any gate failure sends the engine down the rule path.

use std::sync::{mpsc, Arc, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::NaiveDate;
use ramq_billing_llm::{
    calculate_cost, make_suggestion_prompt, parse_suggestion_output, ChatCompleter, LlmError,
    PromptEncounter, SYSTEM_PROMPT,
};
use thiserror::Error;

use super::cache::SuggestionStore;
use super::catalog::Catalog;
use crate::models::EncounterInput;

/// Codes proposed by a remote provider.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSuggestion {
    pub primary_code: String,
    pub procedure_codes: Vec<String>,
    pub reasoning: String,
    /// Cost of the call in USD
    pub cost_usd: f64,
}

/// Remote provider failure. Every variant falls back to the rule path.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProviderError {
    #[error("Daily budget reached: spent {spent:.4} of {budget:.2} USD")]
    BudgetExhausted { spent: f64, budget: f64 },

    #[error("Provider timed out after {0:?}")]
    Timeout(Duration),

    #[error("Provider returned unknown code: {0}")]
    UnknownCode(String),

    #[error("Provider response invalid: {0}")]
    InvalidResponse(String),

    #[error("Provider transport error: {0}")]
    Transport(String),

    #[error("Usage ledger unavailable: {0}")]
    Ledger(String),
}

impl From<LlmError> for ProviderError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Timeout(secs) => ProviderError::Timeout(Duration::from_secs(secs)),
            LlmError::Transport(msg) => ProviderError::Transport(msg),
            other => ProviderError::InvalidResponse(other.to_string()),
        }
    }
}

/// A source of code suggestions other than the local rules.
pub trait SuggestionProvider: Send + Sync {
    /// Provider tag recorded on bundles and cache entries.
    fn name(&self) -> &str;

    fn suggest(&self, input: &EncounterInput) -> Result<ProviderSuggestion, ProviderError>;
}

/// Chat-completion model used as a provider.
pub struct ChatProvider<C> {
    client: C,
}

impl<C: ChatCompleter> ChatProvider<C> {
    pub fn new(client: C) -> Self {
        Self { client }
    }
}

impl<C: ChatCompleter> SuggestionProvider for ChatProvider<C> {
    fn name(&self) -> &str {
        self.client.model()
    }

    fn suggest(&self, input: &EncounterInput) -> Result<ProviderSuggestion, ProviderError> {
        let prompt = make_suggestion_prompt(&PromptEncounter {
            triage_level: input.triage_level,
            chief_complaint: &input.chief_complaint,
            procedures: &input.procedures,
            duration_minutes: input.duration_minutes,
        });

        let completion = self.client.complete(SYSTEM_PROMPT, &prompt)?;
        let parsed = parse_suggestion_output(&completion.text)?;

        Ok(ProviderSuggestion {
            primary_code: parsed.primary_code,
            procedure_codes: parsed.procedure_codes,
            reasoning: parsed.reasoning,
            cost_usd: calculate_cost(completion.total_tokens, &completion.model),
        })
    }
}

/// Remote provider limits.
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteConfig {
    /// Longest wait for one call
    pub timeout: Duration,
    /// Daily spend ceiling in USD
    pub daily_budget_usd: f64,
    /// Confidence reported for provider suggestions
    pub confidence: f64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            daily_budget_usd: 5.0,
            confidence: 0.95,
        }
    }
}

/// Spend of calls that finished after the gate stopped waiting.
type LateCosts = Arc<Mutex<Vec<(NaiveDate, f64)>>>;

/// Budget, timeout and catalog checks around a provider.
///
/// Every paid call is charged to the day's ledger, including calls whose
/// codes are rejected and calls that finish after the timeout. Late costs
/// are charged on the next `suggest`.
#[derive(Clone)]
pub struct RemoteGate {
    provider: Arc<dyn SuggestionProvider>,
    config: RemoteConfig,
    late_costs: LateCosts,
}

impl RemoteGate {
    pub fn new(provider: Arc<dyn SuggestionProvider>, config: RemoteConfig) -> Self {
        Self {
            provider,
            config,
            late_costs: Arc::default(),
        }
    }

    pub fn name(&self) -> &str {
        self.provider.name()
    }

    pub fn config(&self) -> &RemoteConfig {
        &self.config
    }

    /// Ask the provider for codes. The spend is recorded whenever the
    /// provider answers, before its codes are checked.
    pub fn suggest(
        &self,
        store: &dyn SuggestionStore,
        catalog: &Catalog,
        input: &EncounterInput,
        today: NaiveDate,
    ) -> Result<ProviderSuggestion, ProviderError> {
        self.charge_late_costs(store);

        let usage = store
            .usage_on(today)
            .map_err(|e| ProviderError::Ledger(e.to_string()))?;
        if usage.total_cost >= self.config.daily_budget_usd {
            return Err(ProviderError::BudgetExhausted {
                spent: usage.total_cost,
                budget: self.config.daily_budget_usd,
            });
        }

        let suggestion = self.call_with_timeout(input, today)?;
        self.charge(store, today, suggestion.cost_usd);

        if let Some(unknown) = std::iter::once(&suggestion.primary_code)
            .chain(&suggestion.procedure_codes)
            .find(|code| !is_billable(catalog, code))
        {
            return Err(ProviderError::UnknownCode(unknown.clone()));
        }

        tracing::info!(
            provider = self.provider.name(),
            cost_usd = suggestion.cost_usd,
            "Remote suggestion accepted"
        );
        Ok(suggestion)
    }

    fn charge(&self, store: &dyn SuggestionStore, day: NaiveDate, cost: f64) {
        match store.record_usage(day, cost) {
            Ok(record) => tracing::debug!(
                provider = self.provider.name(),
                cost_usd = cost,
                day_total = record.total_cost,
                calls = record.calls,
                "Provider usage recorded"
            ),
            Err(e) => tracing::warn!(error = %e, "Failed to record provider usage"),
        }
    }

    fn charge_late_costs(&self, store: &dyn SuggestionStore) {
        let late: Vec<_> = std::mem::take(
            &mut *self.late_costs.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for (day, cost) in late {
            tracing::info!(%day, cost_usd = cost, "Charging late provider call");
            self.charge(store, day, cost);
        }
    }

    fn call_with_timeout(
        &self,
        input: &EncounterInput,
        today: NaiveDate,
    ) -> Result<ProviderSuggestion, ProviderError> {
        let (tx, rx) = mpsc::channel();
        // The worker sends through the slot while holding it. Once the gate
        // empties the slot, the worker books its cost as late instead.
        let slot = Arc::new(Mutex::new(Some(tx)));
        let worker_slot = Arc::clone(&slot);
        let late_costs = Arc::clone(&self.late_costs);
        let provider = Arc::clone(&self.provider);
        let input = input.clone();

        thread::spawn(move || {
            let result = provider.suggest(&input);
            let mut slot = worker_slot.lock().unwrap_or_else(PoisonError::into_inner);
            match slot.take() {
                Some(tx) => {
                    let _ = tx.send(result);
                }
                None => {
                    if let Ok(late) = result {
                        late_costs
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push((today, late.cost_usd));
                    }
                }
            }
        });

        match rx.recv_timeout(self.config.timeout) {
            Ok(result) => result,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                let _ = slot.lock().unwrap_or_else(PoisonError::into_inner).take();
                // The worker may have answered while the slot was being emptied.
                if let Ok(Ok(late)) = rx.try_recv() {
                    self.late_costs
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .push((today, late.cost_usd));
                }
                Err(ProviderError::Timeout(self.config.timeout))
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                Err(ProviderError::Transport("provider thread exited".into()))
            }
        }
    }
}

fn is_billable(catalog: &Catalog, code: &str) -> bool {
    catalog.get(code).map_or(false, |e| !e.is_modifier())
}

impl std::fmt::Debug for RemoteGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteGate")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .finish()
    }
}
