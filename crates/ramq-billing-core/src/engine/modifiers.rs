//! Fee modifiers for night, weekend and statutory holiday encounters.
//!
//! Rates are held in whole percent and stacked in exact fixed-point
//! (millionths), so three stacked two-decimal rates never lose precision.
//! Rounding happens once, when the multiplier is reported or applied.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike, Weekday};

use crate::models::ModifierTag;

const MILLIONTHS: u64 = 1_000_000;

/// Quebec statutory holidays covered by the built-in table.
///
/// Years outside this table never receive the holiday modifier.
const QUEBEC_HOLIDAYS: &[(i32, u32, u32)] = &[
    (2024, 1, 1),
    (2024, 4, 1),
    (2024, 5, 20),
    (2024, 6, 24),
    (2024, 7, 1),
    (2024, 9, 2),
    (2024, 10, 14),
    (2024, 12, 25),
    (2024, 12, 26),
    (2025, 1, 1),
    (2025, 4, 18),
    (2025, 5, 19),
    (2025, 6, 24),
    (2025, 7, 1),
    (2025, 9, 1),
    (2025, 10, 13),
    (2025, 12, 25),
    (2025, 12, 26),
    (2026, 1, 1),
    (2026, 4, 3),
    (2026, 5, 18),
    (2026, 6, 24),
    (2026, 7, 1),
    (2026, 9, 7),
    (2026, 10, 12),
    (2026, 12, 25),
    (2026, 12, 26),
];

/// The built-in holiday table.
pub fn quebec_holidays() -> BTreeSet<NaiveDate> {
    QUEBEC_HOLIDAYS
        .iter()
        .filter_map(|&(y, m, d)| NaiveDate::from_ymd_opt(y, m, d))
        .collect()
}

/// Exact fee multiplier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Multiplier {
    millionths: u64,
}

impl Multiplier {
    pub const ONE: Multiplier = Multiplier {
        millionths: MILLIONTHS,
    };

    /// A single rate, e.g. `from_percent(130)` is ×1.30.
    pub fn from_percent(percent: u32) -> Self {
        Self {
            millionths: u64::from(percent) * (MILLIONTHS / 100),
        }
    }

    /// Stack another rate on top of this one.
    pub fn stack(self, percent: u32) -> Self {
        Self {
            millionths: self.millionths * u64::from(percent) / 100,
        }
    }

    /// Unrounded value.
    pub fn value(self) -> f64 {
        self.millionths as f64 / MILLIONTHS as f64
    }

    /// Value rounded half-up to 2 decimals, for display and storage.
    pub fn reported(self) -> f64 {
        let hundredths = (self.millionths + 5_000) / 10_000;
        hundredths as f64 / 100.0
    }

    /// Apply to an amount in cents, rounding half-up to the nearest cent.
    ///
    /// Returns `None` on overflow.
    pub fn apply_to_cents(self, cents: i64) -> Option<i64> {
        if cents < 0 {
            return None;
        }
        let scaled = i128::from(cents) * i128::from(self.millionths);
        let rounded = (scaled + i128::from(MILLIONTHS / 2)) / i128::from(MILLIONTHS);
        i64::try_from(rounded).ok()
    }
}

impl Default for Multiplier {
    fn default() -> Self {
        Self::ONE
    }
}

/// Modifier rules. Rates are whole percent (130 = ×1.30).
#[derive(Debug, Clone, PartialEq)]
pub struct ModifierConfig {
    /// First night hour (inclusive)
    pub night_start_hour: u32,
    /// First day hour after the night window (exclusive end)
    pub night_end_hour: u32,
    pub night_rate_percent: u32,
    pub weekend_rate_percent: u32,
    pub holiday_rate_percent: u32,
    pub holidays: BTreeSet<NaiveDate>,
}

impl Default for ModifierConfig {
    fn default() -> Self {
        Self {
            night_start_hour: 23,
            night_end_hour: 7,
            night_rate_percent: 130,
            weekend_rate_percent: 120,
            holiday_rate_percent: 150,
            holidays: quebec_holidays(),
        }
    }
}

/// Modifiers applicable at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeModifiers {
    pub multiplier: Multiplier,
    /// NIGHT, WEEKEND, HOLIDAY order
    pub tags: Vec<ModifierTag>,
}

/// Computes fee modifiers from an encounter's local time.
#[derive(Debug, Clone, Default)]
pub struct ModifierCalculator {
    config: ModifierConfig,
}

impl ModifierCalculator {
    pub fn new(config: ModifierConfig) -> Self {
        Self { config }
    }

    /// Modifiers for an encounter at local time `at`.
    pub fn compute(&self, at: NaiveDateTime) -> FeeModifiers {
        let mut multiplier = Multiplier::ONE;
        let mut tags = Vec::new();

        if self.is_night(at) {
            tags.push(ModifierTag::Night);
            multiplier = multiplier.stack(self.config.night_rate_percent);
        }
        if self.is_weekend(at.date()) {
            tags.push(ModifierTag::Weekend);
            multiplier = multiplier.stack(self.config.weekend_rate_percent);
        }
        if self.is_holiday(at.date()) {
            tags.push(ModifierTag::Holiday);
            multiplier = multiplier.stack(self.config.holiday_rate_percent);
        }

        FeeModifiers { multiplier, tags }
    }

    pub fn is_night(&self, at: NaiveDateTime) -> bool {
        let hour = at.hour();
        let (start, end) = (self.config.night_start_hour, self.config.night_end_hour);
        if start > end {
            hour >= start || hour < end
        } else {
            hour >= start && hour < end
        }
    }

    pub fn is_weekend(&self, date: NaiveDate) -> bool {
        matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
    }

    pub fn is_holiday(&self, date: NaiveDate) -> bool {
        self.config.holidays.contains(&date)
    }

    /// Whether the holiday table has any entry for `year`.
    pub fn covers_year(&self, year: i32) -> bool {
        self.config.holidays.iter().any(|d| d.year() == year)
    }
}
