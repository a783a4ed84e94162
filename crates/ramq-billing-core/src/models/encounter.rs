//! Encounter models for analysis requests and saved history.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Highest accepted triage level (least urgent).
pub const MAX_TRIAGE_LEVEL: u8 = 5;

/// Longest accepted chief complaint, in characters.
pub const MAX_COMPLAINT_CHARS: usize = 500;

/// Longest accepted encounter, in minutes.
pub const MAX_DURATION_MINUTES: u32 = 480;

/// Boundary validation failures.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("triage level must be between 1 and 5, got {0}")]
    TriageLevel(u8),

    #[error("duration must be between 1 and 480 minutes, got {0}")]
    Duration(u32),

    #[error("chief complaint exceeds 500 characters")]
    ComplaintTooLong,
}

/// A clinical encounter submitted for code suggestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EncounterInput {
    /// Triage level 1-5 (1 = most urgent)
    pub triage_level: u8,
    /// Reason for the visit, free text
    pub chief_complaint: String,
    /// Procedures performed, free text (order is irrelevant)
    #[serde(default)]
    pub procedures: Vec<String>,
    /// Encounter length in minutes
    pub duration_minutes: u32,
    /// Local wall-clock time of the encounter; processing time if absent
    #[serde(default)]
    pub encounter_datetime: Option<NaiveDateTime>,
}

impl EncounterInput {
    /// Create an encounter with no procedures and no explicit timestamp.
    pub fn new(triage_level: u8, chief_complaint: impl Into<String>, duration_minutes: u32) -> Self {
        Self {
            triage_level,
            chief_complaint: chief_complaint.into(),
            procedures: Vec::new(),
            duration_minutes,
            encounter_datetime: None,
        }
    }

    /// Set the procedures performed.
    pub fn with_procedures<I, S>(mut self, procedures: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.procedures = procedures.into_iter().map(Into::into).collect();
        self
    }

    /// Set the encounter timestamp.
    pub fn at(mut self, datetime: NaiveDateTime) -> Self {
        self.encounter_datetime = Some(datetime);
        self
    }

    /// Check boundary constraints. The engine itself tolerates invalid input.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if !(1..=MAX_TRIAGE_LEVEL).contains(&self.triage_level) {
            return Err(ValidationError::TriageLevel(self.triage_level));
        }
        if !(1..=MAX_DURATION_MINUTES).contains(&self.duration_minutes) {
            return Err(ValidationError::Duration(self.duration_minutes));
        }
        if self.chief_complaint.chars().count() > MAX_COMPLAINT_CHARS {
            return Err(ValidationError::ComplaintTooLong);
        }
        Ok(())
    }
}

/// An encounter saved to history after a physician accepted a suggestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SavedEncounter {
    /// Unique encounter ID
    pub encounter_id: String,
    /// Physician who billed the encounter
    pub physician_id: String,
    /// Encounter as submitted
    pub input: EncounterInput,
    /// Code chosen by the physician
    pub selected_code: String,
    /// Fee billed
    pub total_fee: f64,
    /// Creation timestamp
    pub created_at: String,
}

impl SavedEncounter {
    /// Create a new history record. A missing encounter time becomes the save time.
    pub fn new(physician_id: String, mut input: EncounterInput, selected_code: String, total_fee: f64) -> Self {
        if input.encounter_datetime.is_none() {
            input.encounter_datetime = Some(chrono::Local::now().naive_local());
        }
        Self {
            encounter_id: uuid::Uuid::new_v4().to_string(),
            physician_id,
            input,
            selected_code,
            total_fee,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}
