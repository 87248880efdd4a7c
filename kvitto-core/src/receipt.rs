//! Receipt types shared by the structured parser, the AI fallback and callers.
//!
//! The serialized shape of [`ParsedReceipt`] is consumed by the regression
//! harness and the parser health dashboard:
//!
//! ```text
//! { store_name, total_amount, items[],
//!   parser_metadata: { anomalies[], fallback_used } }
//! ```

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::money::{checked_sum, normalize};

/// Category attached when the structured parser has no classification signal.
pub const DEFAULT_CATEGORY: &str = "other";

/// One purchased line on a receipt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReceiptItem {
    pub name: String,
    /// Amount paid for the line. For multi-buy lines this is the bundle price.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::float", default = "one")]
    pub quantity: Decimal,
    #[serde(default = "default_category")]
    pub category: String,
    #[serde(
        with = "rust_decimal::serde::float_option",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub discount: Option<Decimal>,
}

fn one() -> Decimal {
    Decimal::ONE
}

fn default_category() -> String {
    DEFAULT_CATEGORY.to_string()
}

impl ReceiptItem {
    pub fn new(name: impl Into<String>, price: Decimal) -> Self {
        Self {
            name: name.into(),
            price: normalize(price),
            quantity: Decimal::ONE,
            category: default_category(),
            discount: None,
        }
    }

    pub fn with_quantity(mut self, quantity: Decimal) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn with_discount(mut self, discount: Decimal) -> Self {
        self.discount = Some(normalize(discount));
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    /// The `{name, price, quantity}` triple anomalies point at.
    pub fn affected(&self) -> AffectedItem {
        AffectedItem {
            name: self.name.clone(),
            price: self.price,
            quantity: self.quantity,
        }
    }
}

/// Severity of a parsing anomaly, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

/// The anomaly `type` string.
///
/// Kinds produced by the structured parser are named variants; anything else
/// (typically reported by the AI fallback) round-trips through `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AnomalyKind {
    DiscountClamped,
    PriceClamped,
    MeasureMismatch,
    PatternFallback,
    UnmatchedLine,
    TotalMismatch,
    LowConfidence,
    FallbackUsed,
    FallbackFailed,
    EmptyReceipt,
    ParseFailed,
    AmountOverflow,
    Other(String),
}

impl AnomalyKind {
    pub fn as_str(&self) -> &str {
        match self {
            AnomalyKind::DiscountClamped => "discount_clamped",
            AnomalyKind::PriceClamped => "price_clamped",
            AnomalyKind::MeasureMismatch => "measure_mismatch",
            AnomalyKind::PatternFallback => "pattern_fallback",
            AnomalyKind::UnmatchedLine => "unmatched_line",
            AnomalyKind::TotalMismatch => "total_mismatch",
            AnomalyKind::LowConfidence => "low_confidence",
            AnomalyKind::FallbackUsed => "fallback_used",
            AnomalyKind::FallbackFailed => "fallback_failed",
            AnomalyKind::EmptyReceipt => "empty_receipt",
            AnomalyKind::ParseFailed => "parse_failed",
            AnomalyKind::AmountOverflow => "amount_overflow",
            AnomalyKind::Other(s) => s,
        }
    }
}

impl From<String> for AnomalyKind {
    fn from(s: String) -> Self {
        match s.as_str() {
            "discount_clamped" => AnomalyKind::DiscountClamped,
            "price_clamped" => AnomalyKind::PriceClamped,
            "measure_mismatch" => AnomalyKind::MeasureMismatch,
            "pattern_fallback" => AnomalyKind::PatternFallback,
            "unmatched_line" => AnomalyKind::UnmatchedLine,
            "total_mismatch" => AnomalyKind::TotalMismatch,
            "low_confidence" => AnomalyKind::LowConfidence,
            "fallback_used" => AnomalyKind::FallbackUsed,
            "fallback_failed" => AnomalyKind::FallbackFailed,
            "empty_receipt" => AnomalyKind::EmptyReceipt,
            "parse_failed" => AnomalyKind::ParseFailed,
            "amount_overflow" => AnomalyKind::AmountOverflow,
            _ => AnomalyKind::Other(s),
        }
    }
}

impl From<AnomalyKind> for String {
    fn from(kind: AnomalyKind) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Item reference carried by an anomaly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectedItem {
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(with = "rust_decimal::serde::float")]
    pub quantity: Decimal,
}

/// A non-fatal deviation from the expected receipt grammar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Anomaly {
    #[serde(rename = "type")]
    pub kind: AnomalyKind,
    pub description: String,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_item: Option<AffectedItem>,
}

impl Anomaly {
    pub fn new(kind: AnomalyKind, severity: Severity, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            severity,
            affected_item: None,
        }
    }

    pub fn with_item(self, item: &ReceiptItem) -> Self {
        self.with_affected(item.affected())
    }

    pub fn with_affected(mut self, affected: AffectedItem) -> Self {
        self.affected_item = Some(affected);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParserMetadata {
    #[serde(default)]
    pub anomalies: Vec<Anomaly>,
    #[serde(default)]
    pub fallback_used: bool,
}

/// Output of one parse invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedReceipt {
    pub store_name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub total_amount: Decimal,
    pub items: Vec<ReceiptItem>,
    pub parser_metadata: ParserMetadata,
}

impl ParsedReceipt {
    /// An empty receipt for `store_name`, total zero.
    pub fn empty(store_name: impl Into<String>) -> Self {
        Self {
            store_name: store_name.into(),
            total_amount: normalize(Decimal::ZERO),
            items: Vec::new(),
            parser_metadata: ParserMetadata::default(),
        }
    }

    /// Sum of item prices, `None` if it does not fit a `Decimal`.
    pub fn items_total(&self) -> Option<Decimal> {
        checked_sum(self.items.iter().map(|i| i.price))
    }

    pub fn anomalies(&self) -> &[Anomaly] {
        &self.parser_metadata.anomalies
    }

    pub fn has_anomaly(&self, kind: &AnomalyKind) -> bool {
        self.anomalies().iter().any(|a| &a.kind == kind)
    }

    pub fn anomalies_at_least(&self, severity: Severity) -> impl Iterator<Item = &Anomaly> {
        self.anomalies().iter().filter(move |a| a.severity >= severity)
    }
}
