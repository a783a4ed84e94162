//! Catalog database operations.

use rusqlite::{params, Connection, OptionalExtension, Row};

use super::{Database, DbResult};
use crate::models::{base_fee_schedule, CatalogEntry, CatalogRow};

/// Outcome of a bulk import.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ImportReport {
    /// Rows written
    pub imported: usize,
    /// Rows skipped for missing code or description
    pub skipped: usize,
}

const UPSERT_SQL: &str = r#"
    INSERT INTO ramq_codes (code, description, base_fee, category)
    VALUES (?1, ?2, ?3, ?4)
    ON CONFLICT(code) DO UPDATE SET
        description = excluded.description,
        base_fee = excluded.base_fee,
        category = excluded.category
"#;

impl Database {
    /// Insert or replace a catalog entry, keyed by code.
    pub fn upsert_catalog_entry(&self, entry: &CatalogEntry) -> DbResult<()> {
        upsert_entry(&self.conn, entry)
    }

    /// Get a catalog entry by code.
    pub fn get_catalog_entry(&self, code: &str) -> DbResult<Option<CatalogEntry>> {
        let entry = self
            .conn
            .query_row(
                "SELECT code, description, base_fee, category FROM ramq_codes WHERE code = ?",
                [code],
                entry_from_row,
            )
            .optional()?;
        Ok(entry)
    }

    /// Get all catalog entries, ordered by code.
    pub fn list_catalog_entries(&self) -> DbResult<Vec<CatalogEntry>> {
        let mut stmt = self
            .conn
            .prepare("SELECT code, description, base_fee, category FROM ramq_codes ORDER BY code")?;
        let rows = stmt.query_map([], entry_from_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?);
        }
        Ok(entries)
    }

    /// Delete a catalog entry.
    pub fn delete_catalog_entry(&self, code: &str) -> DbResult<bool> {
        let rows_affected = self
            .conn
            .execute("DELETE FROM ramq_codes WHERE code = ?", [code])?;
        Ok(rows_affected > 0)
    }

    /// Bulk insert-or-replace. Malformed rows are skipped individually.
    pub fn import_catalog(&mut self, rows: &[CatalogRow]) -> DbResult<ImportReport> {
        let tx = self.conn.transaction()?;
        let report = upsert_rows(&tx, rows)?;
        tx.commit()?;

        tracing::info!(
            imported = report.imported,
            skipped = report.skipped,
            "Catalog import complete"
        );
        Ok(report)
    }

    /// Delete every entry, then bulk insert `rows`.
    ///
    /// Runs in one transaction on this connection. Readers on other connections
    /// or holding an already-loaded in-memory catalog are not coordinated with.
    pub fn replace_catalog(&mut self, rows: &[CatalogRow]) -> DbResult<ImportReport> {
        let tx = self.conn.transaction()?;
        let removed = tx.execute("DELETE FROM ramq_codes", [])?;
        let report = upsert_rows(&tx, rows)?;
        tx.commit()?;

        tracing::info!(
            removed,
            imported = report.imported,
            skipped = report.skipped,
            "Catalog replaced"
        );
        Ok(report)
    }

    /// Load the base fee schedule without overwriting existing codes.
    ///
    /// Returns the number of entries actually inserted.
    pub fn seed_base_catalog(&self) -> DbResult<usize> {
        let mut stmt = self.conn.prepare(
            "INSERT OR IGNORE INTO ramq_codes (code, description, base_fee, category) VALUES (?1, ?2, ?3, ?4)",
        )?;

        let mut inserted = 0;
        for entry in base_fee_schedule() {
            inserted += stmt.execute(params![
                entry.code,
                entry.description,
                entry.base_fee,
                entry.category
            ])?;
        }

        tracing::info!(inserted, "Base fee schedule seeded");
        Ok(inserted)
    }
}

fn upsert_entry(conn: &Connection, entry: &CatalogEntry) -> DbResult<()> {
    conn.execute(
        UPSERT_SQL,
        params![entry.code, entry.description, entry.base_fee, entry.category],
    )?;
    Ok(())
}

fn upsert_rows(conn: &Connection, rows: &[CatalogRow]) -> DbResult<ImportReport> {
    let mut report = ImportReport::default();
    for (index, row) in rows.iter().enumerate() {
        match row.to_entry() {
            Some(entry) => {
                upsert_entry(conn, &entry)?;
                report.imported += 1;
            }
            None => {
                tracing::debug!(index, "Skipping catalog row without code or description");
                report.skipped += 1;
            }
        }
    }
    Ok(report)
}

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<CatalogEntry> {
    Ok(CatalogEntry {
        code: row.get(0)?,
        description: row.get(1)?,
        base_fee: row.get(2)?,
        category: row.get(3)?,
    })
}
