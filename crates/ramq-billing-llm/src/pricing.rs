//! Token pricing for cost tracking.

/// Fallback price per token for models missing from the table.
const DEFAULT_PRICE_PER_TOKEN: f64 = 0.002 / 1000.0;

/// USD price per token, by model.
const PRICING: &[(&str, f64)] = &[
    ("gpt-3.5-turbo", 0.0015 / 1000.0),
    ("gpt-4o-mini", 0.00015 / 1000.0),
];

/// Cost in USD of a call that used `tokens` total tokens.
pub fn calculate_cost(tokens: u32, model: &str) -> f64 {
    let per_token = PRICING
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, price)| *price)
        .unwrap_or(DEFAULT_PRICE_PER_TOKEN);
    f64::from(tokens) * per_token
}
