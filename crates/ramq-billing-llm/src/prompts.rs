//! Prompts for RAMQ billing code suggestion.
//!
//! The user prompt is kept deliberately compact: the complaint is truncated and
//! only the first few procedures are sent, which keeps every call well under
//! the response token ceiling.

/// Maximum characters of the chief complaint sent to the model.
pub const COMPLAINT_PROMPT_CHARS: usize = 50;

/// Maximum number of procedures sent to the model.
pub const MAX_PROMPT_PROCEDURES: usize = 3;

/// Response token ceiling requested from the model.
pub const MAX_RESPONSE_TOKENS: u32 = 200;

/// System prompt for billing suggestions.
pub const SYSTEM_PROMPT: &str = "Tu es un expert en facturation RAMQ pour urgences au Québec. \
Réponds en JSON uniquement.";

/// Encounter fields needed to build a prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptEncounter<'a> {
    pub triage_level: u8,
    pub chief_complaint: &'a str,
    pub procedures: &'a [String],
    pub duration_minutes: u32,
}

/// User prompt for a single encounter.
pub fn make_suggestion_prompt(encounter: &PromptEncounter<'_>) -> String {
    let complaint: String = encounter
        .chief_complaint
        .chars()
        .take(COMPLAINT_PROMPT_CHARS)
        .collect();
    let procedures = encounter
        .procedures
        .iter()
        .take(MAX_PROMPT_PROCEDURES)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        r#"Cas urgence:
- Triage: P{}
- Plainte: {}
- Procédures: {}
- Durée: {}min

Retourne JSON:
{{
  "primary_code": "XX.XXX",
  "procedure_codes": ["XX.XX"],
  "reasoning": "justification courte"
}}"#,
        encounter.triage_level, complaint, procedures, encounter.duration_minutes
    )
}
