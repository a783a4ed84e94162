//! SQLite schema definition.

/// Complete database schema for the billing assistant.
pub const SCHEMA: &str = r#"
-- ============================================================================
-- RAMQ Fee Schedule
-- ============================================================================

CREATE TABLE IF NOT EXISTS ramq_codes (
    code TEXT PRIMARY KEY,
    description TEXT NOT NULL,
    base_fee REAL NOT NULL DEFAULT 0 CHECK (base_fee >= 0),  -- multiplier for 'modificateur' rows
    category TEXT NOT NULL,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_codes_category ON ramq_codes(category);

-- ============================================================================
-- Suggestion Cache (expired rows are filtered at read time)
-- ============================================================================

CREATE TABLE IF NOT EXISTS ai_cache (
    input_hash TEXT PRIMARY KEY,                 -- SHA-256 of normalized input
    input_data TEXT NOT NULL,                    -- JSON EncounterInput
    output_data TEXT NOT NULL,                   -- JSON SuggestionBundle
    model_used TEXT NOT NULL,
    created_at INTEGER NOT NULL,                 -- unix millis
    expires_at INTEGER NOT NULL                  -- unix millis
);

CREATE INDEX IF NOT EXISTS idx_cache_expires ON ai_cache(expires_at);

-- ============================================================================
-- Encounter History (Append-Only)
-- ============================================================================

CREATE TABLE IF NOT EXISTS encounters (
    encounter_id TEXT PRIMARY KEY,
    physician_id TEXT NOT NULL,
    triage_level INTEGER NOT NULL,
    chief_complaint TEXT NOT NULL,
    procedures TEXT NOT NULL DEFAULT '[]',       -- JSON array of strings
    duration_minutes INTEGER NOT NULL,
    encounter_datetime TEXT NOT NULL,
    selected_code TEXT NOT NULL,
    total_fee REAL NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_encounters_physician ON encounters(physician_id);
CREATE INDEX IF NOT EXISTS idx_encounters_date ON encounters(encounter_datetime);

CREATE TRIGGER IF NOT EXISTS encounters_no_update BEFORE UPDATE ON encounters
BEGIN
    SELECT RAISE(ABORT, 'Encounters are append-only');
END;

-- ============================================================================
-- Remote Provider Usage (daily budget ledger)
-- ============================================================================

CREATE TABLE IF NOT EXISTS provider_usage (
    day TEXT PRIMARY KEY,                        -- YYYY-MM-DD
    total_cost REAL NOT NULL DEFAULT 0,          -- USD
    calls INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        assert!(conn.execute_batch(SCHEMA).is_ok());
    }

    #[test]
    fn test_negative_fee_rejected() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        let result = conn.execute(
            "INSERT INTO ramq_codes (code, description, base_fee, category) VALUES ('X', 'x', -1, 'urgence')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_encounters_append_only() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        conn.execute(
            r#"INSERT INTO encounters (encounter_id, physician_id, triage_level, chief_complaint,
                duration_minutes, encounter_datetime, selected_code, total_fee, created_at)
               VALUES ('e1', 'dr', 3, 'Toux', 20, '2025-01-01T10:00:00', '08.48A', 89.85, 'now')"#,
            [],
        )
        .unwrap();

        let result = conn.execute("UPDATE encounters SET total_fee = 0 WHERE encounter_id = 'e1'", []);
        assert!(result.is_err());
    }
}
