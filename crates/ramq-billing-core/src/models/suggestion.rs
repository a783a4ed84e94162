//! Suggestion models returned by the engine.

use serde::{Deserialize, Serialize};

/// Provider tag for the deterministic rule engine.
pub const LOCAL_PROVIDER: &str = "local_rules_v1";

/// Context-dependent fee modifier.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ModifierTag {
    /// 23h-7h
    Night,
    /// Saturday or Sunday
    Weekend,
    /// Statutory holiday
    Holiday,
}

impl ModifierTag {
    pub fn as_str(self) -> &'static str {
        match self {
            ModifierTag::Night => "NIGHT",
            ModifierTag::Weekend => "WEEKEND",
            ModifierTag::Holiday => "HOLIDAY",
        }
    }
}

/// Fee billed for one procedure code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcedureFee {
    pub code: String,
    pub fee: f64,
}

/// A catalog entry ranked by semantic similarity.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SemanticMatch {
    pub code: String,
    pub description: String,
    pub base_fee: f64,
    /// Cosine similarity (-1.0 - 1.0)
    pub similarity: f64,
}

/// Complete billing suggestion for one encounter.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SuggestionBundle {
    /// Examination or consultation code
    pub primary_code: String,
    /// Additional procedure codes, in input order
    pub procedure_codes: Vec<String>,
    /// Applied modifiers, in NIGHT, WEEKEND, HOLIDAY order
    pub modifiers: Vec<ModifierTag>,
    /// Combined modifier multiplier, rounded to 2 decimals
    pub multiplier: f64,
    /// Fee of the primary code before modifiers
    pub base_fee: f64,
    /// Fee of each procedure code (never modified)
    pub procedure_fees: Vec<ProcedureFee>,
    /// base_fee * multiplier + procedure fees, rounded to cents
    pub total_fee: f64,
    /// Confidence score (0.0 - 1.0)
    pub confidence: f64,
    /// Short human-readable justification
    pub reasoning: String,
    /// Semantically similar catalog entries, best first
    #[serde(default)]
    pub semantic_alternatives: Vec<SemanticMatch>,
    /// Provider that chose the codes
    pub provider: String,
    /// Whether this bundle was served from the result cache
    #[serde(default)]
    pub from_cache: bool,
}
