//! Remote provider usage ledger.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension};

use super::{Database, DbResult};

/// Remote provider spend for one calendar day.
#[derive(Debug, Clone, PartialEq)]
pub struct UsageRecord {
    pub day: NaiveDate,
    /// Running total in USD
    pub total_cost: f64,
    pub calls: u32,
}

impl UsageRecord {
    fn empty(day: NaiveDate) -> Self {
        Self {
            day,
            total_cost: 0.0,
            calls: 0,
        }
    }
}

impl Database {
    /// Usage recorded for `day` (zero if none).
    pub fn usage_for_day(&self, day: NaiveDate) -> DbResult<UsageRecord> {
        let row: Option<(f64, u32)> = self
            .conn
            .query_row(
                "SELECT total_cost, calls FROM provider_usage WHERE day = ?",
                [day.to_string()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        Ok(match row {
            Some((total_cost, calls)) => UsageRecord {
                day,
                total_cost,
                calls,
            },
            None => UsageRecord::empty(day),
        })
    }

    /// Add one call costing `cost` USD to `day`, returning the new totals.
    pub fn add_usage(&self, day: NaiveDate, cost: f64) -> DbResult<UsageRecord> {
        self.conn.execute(
            r#"
            INSERT INTO provider_usage (day, total_cost, calls, updated_at)
            VALUES (?1, ?2, 1, datetime('now'))
            ON CONFLICT(day) DO UPDATE SET
                total_cost = total_cost + excluded.total_cost,
                calls = calls + 1,
                updated_at = datetime('now')
            "#,
            params![day.to_string(), cost],
        )?;
        self.usage_for_day(day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, d).unwrap()
    }

    #[test]
    fn test_empty_day() {
        let db = Database::open_in_memory().unwrap();
        assert_eq!(db.usage_for_day(day(1)).unwrap(), UsageRecord::empty(day(1)));
    }

    #[test]
    fn test_accumulates_per_day() {
        let db = Database::open_in_memory().unwrap();
        db.add_usage(day(1), 0.25).unwrap();
        let record = db.add_usage(day(1), 0.5).unwrap();

        assert_eq!(record.calls, 2);
        assert!((record.total_cost - 0.75).abs() < 1e-9);

        let other = db.usage_for_day(day(2)).unwrap();
        assert_eq!(other.calls, 0);
    }
}
