use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Orchestrator tuning. Loaded from the `[parser]` table of `config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Below this share of non-blank lines covered by a grammar rule the
    /// whole receipt goes to the AI fallback.
    pub min_classified_fraction: f64,
    pub fallback_timeout_secs: u64,
    /// Allowed gap between the printed total and the item sum, in kronor.
    #[serde(with = "rust_decimal::serde::float")]
    pub total_tolerance: Decimal,
    pub max_input_bytes: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            min_classified_fraction: 0.6,
            fallback_timeout_secs: 50,
            total_tolerance: Decimal::new(5, 2),
            max_input_bytes: 1024 * 1024,
        }
    }
}
