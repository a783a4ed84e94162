//! Fee totals in exact cents.

use super::catalog::Catalog;
use super::modifiers::Multiplier;
use crate::models::ProcedureFee;

/// Dollars to whole cents.
pub fn to_cents(amount: f64) -> i64 {
    (amount * 100.0).round() as i64
}

/// Whole cents to dollars.
pub fn from_cents(cents: i64) -> f64 {
    cents as f64 / 100.0
}

/// Priced codes for one suggestion.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeBreakdown {
    pub base_fee: f64,
    pub procedure_fees: Vec<ProcedureFee>,
    pub total_fee: f64,
}

/// Price `primary_code` with the multiplier applied, plus unmodified
/// procedure fees. Unknown codes cost 0.0. `None` on overflow.
pub fn price(
    catalog: &Catalog,
    primary_code: &str,
    procedure_codes: &[String],
    multiplier: Multiplier,
) -> Option<FeeBreakdown> {
    let base_cents = to_cents(catalog.lookup_fee(primary_code));
    let mut total_cents = multiplier.apply_to_cents(base_cents)?;

    let mut procedure_fees = Vec::with_capacity(procedure_codes.len());
    for code in procedure_codes {
        let cents = to_cents(catalog.lookup_fee(code));
        total_cents = total_cents.checked_add(cents)?;
        procedure_fees.push(ProcedureFee {
            code: code.clone(),
            fee: from_cents(cents),
        });
    }

    Some(FeeBreakdown {
        base_fee: from_cents(base_cents),
        procedure_fees,
        total_fee: from_cents(total_cents),
    })
}
