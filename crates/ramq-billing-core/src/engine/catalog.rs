//! In-memory view of the fee schedule.

use std::collections::HashMap;

use crate::db::{Database, DbResult};
use crate::models::CatalogEntry;

/// Read-only catalog loaded once from storage.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
    by_code: HashMap<String, usize>,
}

impl Catalog {
    /// Build from entries. A repeated code replaces the earlier entry in place.
    pub fn from_entries(entries: impl IntoIterator<Item = CatalogEntry>) -> Self {
        let mut catalog = Self::default();
        for entry in entries {
            match catalog.by_code.get(&entry.code) {
                Some(&index) => catalog.entries[index] = entry,
                None => {
                    catalog.by_code.insert(entry.code.clone(), catalog.entries.len());
                    catalog.entries.push(entry);
                }
            }
        }
        catalog
    }

    /// Load every entry from storage. An empty store yields an empty catalog.
    pub fn load(db: &Database) -> DbResult<Self> {
        let catalog = Self::from_entries(db.list_catalog_entries()?);
        tracing::info!(entries = catalog.len(), "Catalog loaded");
        Ok(catalog)
    }

    /// Base fee for `code`, or 0.0 if the code is unknown.
    pub fn lookup_fee(&self, code: &str) -> f64 {
        self.get(code).map(|e| e.base_fee).unwrap_or(0.0)
    }

    pub fn get(&self, code: &str) -> Option<&CatalogEntry> {
        self.by_code.get(code).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, code: &str) -> bool {
        self.by_code.contains_key(code)
    }

    /// Filter by exact category, then by case-insensitive substring over
    /// description and code. Blank filters are ignored.
    pub fn query(&self, category: Option<&str>, search: Option<&str>) -> Vec<CatalogEntry> {
        let category = category.map(str::trim).filter(|c| !c.is_empty());
        let needle = search
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        self.entries
            .iter()
            .filter(|e| category.map_or(true, |c| e.category == c))
            .filter(|e| {
                needle.as_deref().map_or(true, |n| {
                    e.description.to_lowercase().contains(n) || e.code.to_lowercase().contains(n)
                })
            })
            .cloned()
            .collect()
    }

    /// Distinct categories, in first-seen order.
    pub fn categories(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for entry in &self.entries {
            if !seen.contains(&entry.category.as_str()) {
                seen.push(entry.category.as_str());
            }
        }
        seen
    }

    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
