//! Fee schedule catalog models.

use serde::{Deserialize, Serialize};

/// Category tag for modifier pseudo-codes (their `base_fee` is a multiplier).
pub const MODIFIER_CATEGORY: &str = "modificateur";

/// Category assigned to imported rows that carry none.
pub const DEFAULT_CATEGORY: &str = "general";

/// A single billable entry in the RAMQ fee schedule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogEntry {
    /// Billing code - unique identifier (e.g., "08.48A", "MOD_NUIT")
    pub code: String,
    /// Human-readable description
    pub description: String,
    /// Base fee in dollars, or a multiplier for modifier entries
    pub base_fee: f64,
    /// Grouping tag (e.g., "urgence", "procedure", "interpretation")
    pub category: String,
}

impl CatalogEntry {
    /// Create a new catalog entry.
    pub fn new(code: &str, description: &str, base_fee: f64, category: &str) -> Self {
        Self {
            code: code.to_string(),
            description: description.to_string(),
            base_fee,
            category: category.to_string(),
        }
    }

    /// Whether this entry is a modifier pseudo-code rather than a billable act.
    pub fn is_modifier(&self) -> bool {
        self.category == MODIFIER_CATEGORY
    }

    /// Text used to build the semantic index.
    pub fn semantic_text(&self) -> String {
        format!("{} {}", self.description, self.category)
    }
}

/// A catalog row as received from bulk import tooling.
///
/// Every field is optional so that one malformed row can be skipped without
/// rejecting the batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct CatalogRow {
    pub code: Option<String>,
    pub description: Option<String>,
    pub base_fee: Option<f64>,
    pub category: Option<String>,
}

impl CatalogRow {
    /// Convert to an entry, or `None` if the row lacks a code or description.
    pub fn to_entry(&self) -> Option<CatalogEntry> {
        let code = self.code.as_deref().map(str::trim).filter(|c| !c.is_empty())?;
        let description = self
            .description
            .as_deref()
            .map(str::trim)
            .filter(|d| !d.is_empty())?;
        let base_fee = self
            .base_fee
            .filter(|f| f.is_finite() && *f >= 0.0)
            .unwrap_or(0.0);
        let category = self
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(DEFAULT_CATEGORY);

        Some(CatalogEntry::new(code, description, base_fee, category))
    }
}

/// Base emergency fee schedule loaded by the initializer.
const BASE_FEE_SCHEDULE: &[(&str, &str, f64, &str)] = &[
    // Emergency examinations
    ("08.48A", "Examen en urgence - Ordinaire", 89.85, "urgence"),
    ("08.48B", "Examen en urgence - Complexe", 134.80, "urgence"),
    ("08.48C", "Examen en urgence - Très complexe", 179.75, "urgence"),
    // Emergency consultations
    ("08.49A", "Consultation en urgence - Ordinaire", 107.00, "urgence"),
    ("08.49B", "Consultation en urgence - Complexe", 161.00, "urgence"),
    // Common procedures
    ("15.01", "Suture simple (< 7.5 cm)", 45.00, "procedure"),
    ("15.02", "Suture complexe (> 7.5 cm)", 90.00, "procedure"),
    ("15.03", "Suture face simple", 67.50, "procedure"),
    ("15.04", "Suture face complexe", 135.00, "procedure"),
    ("15.05", "Plâtre membre supérieur", 60.00, "procedure"),
    ("15.06", "Plâtre membre inférieur", 75.00, "procedure"),
    // Interpretations
    ("00.44", "Interprétation ECG", 15.00, "interpretation"),
    ("00.45", "Interprétation radiographie", 20.00, "interpretation"),
    // Special codes
    ("08.01", "Visite à domicile", 120.00, "special"),
    ("08.02", "Consultation téléphonique", 35.00, "special"),
    // Modifiers (reference only)
    ("MOD_NUIT", "Majoration nuit (23h-7h) +30%", 1.3, MODIFIER_CATEGORY),
    ("MOD_FDS", "Majoration fin de semaine +20%", 1.2, MODIFIER_CATEGORY),
    ("MOD_FERIE", "Majoration jour férié +50%", 1.5, MODIFIER_CATEGORY),
];

/// The base fee schedule as catalog entries.
pub fn base_fee_schedule() -> Vec<CatalogEntry> {
    BASE_FEE_SCHEDULE
        .iter()
        .map(|(code, description, fee, category)| {
            CatalogEntry::new(code, description, *fee, category)
        })
        .collect()
}
