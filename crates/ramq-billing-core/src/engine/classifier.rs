//! Deterministic rule-based code classifier.
//!
//! Maps triage level and duration to an examination or consultation code,
//! and free-text procedures to procedure codes through an ordered rule list.

/// How a matched procedure rule picks its code.
#[derive(Debug, Clone, PartialEq)]
pub enum Refinement {
    /// Always the same code.
    Fixed(String),
    /// `matched` if the text contains any keyword or is shorter than
    /// `shorter_than` characters, otherwise `otherwise`.
    Keyword {
        keywords: Vec<String>,
        shorter_than: Option<usize>,
        matched: String,
        otherwise: String,
    },
}

/// One procedure rule. The first rule with a matching trigger wins.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcedureRule {
    pub name: String,
    /// Lowercase substrings that select this rule
    pub triggers: Vec<String>,
    pub refinement: Refinement,
}

impl ProcedureRule {
    fn matches(&self, text_lower: &str) -> bool {
        self.triggers.iter().any(|t| text_lower.contains(t.as_str()))
    }

    fn code_for(&self, text_lower: &str) -> &str {
        match &self.refinement {
            Refinement::Fixed(code) => code,
            Refinement::Keyword {
                keywords,
                shorter_than,
                matched,
                otherwise,
            } => {
                let keyword_hit = keywords.iter().any(|k| text_lower.contains(k.as_str()));
                let short = shorter_than.map_or(false, |n| text_lower.chars().count() < n);
                if keyword_hit || short {
                    matched
                } else {
                    otherwise
                }
            }
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// The default emergency procedure rules.
pub fn default_procedure_rules() -> Vec<ProcedureRule> {
    vec![
        ProcedureRule {
            name: "suture".into(),
            triggers: strings(&["suture"]),
            refinement: Refinement::Keyword {
                keywords: strings(&["simple"]),
                shorter_than: Some(15),
                matched: "15.01".into(),
                otherwise: "15.02".into(),
            },
        },
        ProcedureRule {
            name: "cast".into(),
            triggers: strings(&["plâtre", "platre"]),
            refinement: Refinement::Keyword {
                keywords: strings(&["supérieur", "bras"]),
                shorter_than: None,
                matched: "15.05".into(),
                otherwise: "15.06".into(),
            },
        },
        ProcedureRule {
            name: "ecg".into(),
            triggers: strings(&["ecg"]),
            refinement: Refinement::Fixed("00.44".into()),
        },
    ]
}

/// Classifier thresholds, codes and rules.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifierConfig {
    /// Examination code for triage 1
    pub very_complex_code: String,
    /// Examination code for triage 2
    pub complex_code: String,
    /// Examination code for triage 3-5 and unknown levels
    pub ordinary_code: String,
    /// Consultation code for long triage 1-2 encounters
    pub complex_consultation_code: String,
    /// Consultation code for long triage 3 encounters
    pub ordinary_consultation_code: String,
    /// Minutes above which triage 1-2 escalates
    pub complex_escalation_minutes: u32,
    /// Minutes above which triage 3 escalates
    pub ordinary_escalation_minutes: u32,
    pub confidence: f64,
    pub procedure_rules: Vec<ProcedureRule>,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            very_complex_code: "08.48C".into(),
            complex_code: "08.48B".into(),
            ordinary_code: "08.48A".into(),
            complex_consultation_code: "08.49B".into(),
            ordinary_consultation_code: "08.49A".into(),
            complex_escalation_minutes: 60,
            ordinary_escalation_minutes: 45,
            confidence: 0.85,
            procedure_rules: default_procedure_rules(),
        }
    }
}

/// Codes chosen by the classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub primary_code: String,
    pub procedure_codes: Vec<String>,
    pub confidence: f64,
    pub reasoning: String,
}

/// Rule-based classifier.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    config: ClassifierConfig,
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    pub fn classify(
        &self,
        triage_level: u8,
        duration_minutes: u32,
        procedures: &[String],
    ) -> Classification {
        let cfg = &self.config;

        let (primary_code, escalated) = match triage_level {
            1 | 2 if duration_minutes > cfg.complex_escalation_minutes => {
                (&cfg.complex_consultation_code, true)
            }
            3 if duration_minutes > cfg.ordinary_escalation_minutes => {
                (&cfg.ordinary_consultation_code, true)
            }
            1 => (&cfg.very_complex_code, false),
            2 => (&cfg.complex_code, false),
            _ => (&cfg.ordinary_code, false),
        };

        let procedure_codes: Vec<String> = procedures
            .iter()
            .filter_map(|p| self.procedure_code(p))
            .collect();

        let mut reasoning = format!(
            "Based on triage P{}, duration {}min",
            triage_level, duration_minutes
        );
        if escalated {
            reasoning.push_str("; extended encounter billed as consultation");
        }

        tracing::debug!(
            triage_level,
            duration_minutes,
            primary = %primary_code,
            procedures = procedure_codes.len(),
            "Encounter classified"
        );

        Classification {
            primary_code: primary_code.clone(),
            procedure_codes,
            confidence: cfg.confidence,
            reasoning,
        }
    }

    /// Code for one procedure text, or `None` if no rule matches.
    pub fn procedure_code(&self, procedure: &str) -> Option<String> {
        let lower = procedure.to_lowercase();
        self.config
            .procedure_rules
            .iter()
            .find(|rule| rule.matches(&lower))
            .map(|rule| rule.code_for(&lower).to_string())
    }
}
