//! Suggestion cache database operations.

use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, OptionalExtension};

use super::{Database, DbError, DbResult};

/// A cached suggestion row.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    /// Fingerprint of the normalized input
    pub input_hash: String,
    /// Serialized input that produced the bundle
    pub input_data: String,
    /// Serialized bundle
    pub output_data: String,
    /// Provider tag
    pub model_used: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl Database {
    /// Insert or replace a cache entry, keyed by fingerprint.
    pub fn upsert_cache_entry(&self, entry: &CacheEntry) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT OR REPLACE INTO ai_cache
                (input_hash, input_data, output_data, model_used, created_at, expires_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
            params![
                entry.input_hash,
                entry.input_data,
                entry.output_data,
                entry.model_used,
                entry.created_at.timestamp_millis(),
                entry.expires_at.timestamp_millis(),
            ],
        )?;
        Ok(())
    }

    /// Get a cache entry that has not expired at `now`.
    pub fn get_live_cache_entry(
        &self,
        input_hash: &str,
        now: DateTime<Utc>,
    ) -> DbResult<Option<CacheEntry>> {
        let row = self
            .conn
            .query_row(
                r#"
                SELECT input_hash, input_data, output_data, model_used, created_at, expires_at
                FROM ai_cache
                WHERE input_hash = ?1 AND expires_at > ?2
                "#,
                params![input_hash, now.timestamp_millis()],
                |row| {
                    Ok(CacheRow {
                        input_hash: row.get(0)?,
                        input_data: row.get(1)?,
                        output_data: row.get(2)?,
                        model_used: row.get(3)?,
                        created_at: row.get(4)?,
                        expires_at: row.get(5)?,
                    })
                },
            )
            .optional()?;

        row.map(|r| r.try_into()).transpose()
    }

    /// Count entries still live at `now`.
    pub fn count_live_cache_entries(&self, now: DateTime<Utc>) -> DbResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM ai_cache WHERE expires_at > ?",
            [now.timestamp_millis()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Physically remove entries expired at `now`.
    pub fn purge_expired_cache(&self, now: DateTime<Utc>) -> DbResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM ai_cache WHERE expires_at <= ?",
            [now.timestamp_millis()],
        )?;
        Ok(removed)
    }
}

/// Intermediate row struct for database mapping.
struct CacheRow {
    input_hash: String,
    input_data: String,
    output_data: String,
    model_used: String,
    created_at: i64,
    expires_at: i64,
}

impl TryFrom<CacheRow> for CacheEntry {
    type Error = DbError;

    fn try_from(row: CacheRow) -> Result<Self, Self::Error> {
        Ok(CacheEntry {
            input_hash: row.input_hash,
            input_data: row.input_data,
            output_data: row.output_data,
            model_used: row.model_used,
            created_at: millis_to_datetime(row.created_at)?,
            expires_at: millis_to_datetime(row.expires_at)?,
        })
    }
}

fn millis_to_datetime(millis: i64) -> DbResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| DbError::Constraint(format!("Invalid timestamp: {}", millis)))
}
