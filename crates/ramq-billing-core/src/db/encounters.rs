//! Encounter history database operations.

use chrono::NaiveDateTime;
use rusqlite::params;

use super::{Database, DbError, DbResult};
use crate::models::{EncounterInput, SavedEncounter};

const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Aggregate figures over saved encounters.
#[derive(Debug, Clone, PartialEq)]
pub struct EncounterStats {
    pub total_encounters: usize,
    /// Mean billed fee, rounded to cents (0.0 with no encounters)
    pub average_fee: f64,
    pub total_physicians: usize,
}

impl Database {
    /// Append an encounter to history.
    pub fn insert_encounter(&self, encounter: &SavedEncounter) -> DbResult<()> {
        let input = &encounter.input;
        let procedures_json = serde_json::to_string(&input.procedures)?;
        let encounter_datetime = input
            .encounter_datetime
            .ok_or_else(|| DbError::Constraint("Encounter datetime is required".into()))?
            .format(DATETIME_FORMAT)
            .to_string();

        self.conn.execute(
            r#"
            INSERT INTO encounters (
                encounter_id, physician_id, triage_level, chief_complaint, procedures,
                duration_minutes, encounter_datetime, selected_code, total_fee, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                encounter.encounter_id,
                encounter.physician_id,
                input.triage_level,
                input.chief_complaint,
                procedures_json,
                input.duration_minutes,
                encounter_datetime,
                encounter.selected_code,
                encounter.total_fee,
                encounter.created_at,
            ],
        )?;
        Ok(())
    }

    /// List saved encounters, newest first, optionally for one physician.
    pub fn list_encounters(
        &self,
        physician_id: Option<&str>,
        limit: usize,
    ) -> DbResult<Vec<SavedEncounter>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT encounter_id, physician_id, triage_level, chief_complaint, procedures,
                   duration_minutes, encounter_datetime, selected_code, total_fee, created_at
            FROM encounters
            WHERE ?1 IS NULL OR physician_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )?;

        let rows = stmt.query_map(params![physician_id, limit as i64], |row| {
            Ok(EncounterRow {
                encounter_id: row.get(0)?,
                physician_id: row.get(1)?,
                triage_level: row.get(2)?,
                chief_complaint: row.get(3)?,
                procedures: row.get(4)?,
                duration_minutes: row.get(5)?,
                encounter_datetime: row.get(6)?,
                selected_code: row.get(7)?,
                total_fee: row.get(8)?,
                created_at: row.get(9)?,
            })
        })?;

        let mut encounters = Vec::new();
        for row in rows {
            encounters.push(row?.try_into()?);
        }
        Ok(encounters)
    }

    /// Totals across all saved encounters.
    pub fn encounter_statistics(&self) -> DbResult<EncounterStats> {
        let (total, average, physicians): (i64, Option<f64>, i64) = self.conn.query_row(
            "SELECT COUNT(*), AVG(total_fee), COUNT(DISTINCT physician_id) FROM encounters",
            [],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )?;

        Ok(EncounterStats {
            total_encounters: total as usize,
            average_fee: (average.unwrap_or(0.0) * 100.0).round() / 100.0,
            total_physicians: physicians as usize,
        })
    }
}

/// Intermediate row struct for database mapping.
struct EncounterRow {
    encounter_id: String,
    physician_id: String,
    triage_level: u8,
    chief_complaint: String,
    procedures: String,
    duration_minutes: u32,
    encounter_datetime: String,
    selected_code: String,
    total_fee: f64,
    created_at: String,
}

impl TryFrom<EncounterRow> for SavedEncounter {
    type Error = DbError;

    fn try_from(row: EncounterRow) -> Result<Self, Self::Error> {
        let encounter_datetime =
            NaiveDateTime::parse_from_str(&row.encounter_datetime, DATETIME_FORMAT).map_err(|e| {
                DbError::Constraint(format!(
                    "Invalid encounter datetime '{}': {}",
                    row.encounter_datetime, e
                ))
            })?;

        Ok(SavedEncounter {
            encounter_id: row.encounter_id,
            physician_id: row.physician_id,
            input: EncounterInput {
                triage_level: row.triage_level,
                chief_complaint: row.chief_complaint,
                procedures: serde_json::from_str(&row.procedures)?,
                duration_minutes: row.duration_minutes,
                encounter_datetime: Some(encounter_datetime),
            },
            selected_code: row.selected_code,
            total_fee: row.total_fee,
            created_at: row.created_at,
        })
    }
}
