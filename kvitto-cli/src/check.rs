//! Replay receipt fixtures through the structured parser.
//!
//! A fixture file is a JSON array of cases:
//!
//! ```json
//! [{"name": "nocco", "store": "ICA Kvantum",
//!   "lines": ["*Kiwi Guava Nocco Bcaa 33cl Påse 2", " 41,90", "Energidryck 2F25 -33,80"],
//!   "expected": [{"name": "Kiwi Guava Nocco Bcaa 33cl Påse Energidryck", "price": 25.0, "discount": 16.9}],
//!   "anomalies": []}]
//! ```
//!
//! `anomalies` lists anomaly types that must be present; others are allowed.

use anyhow::{Context, Result};
use kvitto_core::money::{format_kr, normalize};
use kvitto_core::{ParsedReceipt, ReceiptItem};
use kvitto_ingest::ReceiptParser;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct FixtureCase {
    pub name: String,
    pub store: String,
    pub lines: Vec<String>,
    pub expected: Vec<ExpectedItem>,
    #[serde(default)]
    pub anomalies: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExpectedItem {
    pub name: String,
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    #[serde(default, with = "rust_decimal::serde::float_option")]
    pub discount: Option<Decimal>,
}

#[derive(Debug, Clone)]
pub struct CaseResult {
    pub name: String,
    /// Empty when the case passed.
    pub failures: Vec<String>,
}

impl CaseResult {
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }
}

pub fn load_fixtures(path: &Path) -> Result<Vec<FixtureCase>> {
    let s = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    serde_json::from_str(&s).with_context(|| format!("parse fixtures {}", path.display()))
}

pub async fn run_case(parser: &ReceiptParser, case: &FixtureCase) -> Result<CaseResult> {
    let receipt = parser
        .parse(&case.lines.join("\n"), &case.store)
        .await
        .with_context(|| format!("case '{}'", case.name))?;
    Ok(CaseResult {
        name: case.name.clone(),
        failures: compare(case, &receipt),
    })
}

fn compare(case: &FixtureCase, receipt: &ParsedReceipt) -> Vec<String> {
    let mut failures = Vec::new();

    if receipt.items.len() != case.expected.len() {
        failures.push(format!(
            "expected {} item(s), got {}",
            case.expected.len(),
            receipt.items.len()
        ));
    }

    for (i, (want, got)) in case.expected.iter().zip(&receipt.items).enumerate() {
        failures.extend(compare_item(i, want, got));
    }

    for kind in &case.anomalies {
        if !receipt.anomalies().iter().any(|a| a.kind.as_str() == kind) {
            failures.push(format!("missing anomaly '{kind}'"));
        }
    }

    failures
}

fn compare_item(i: usize, want: &ExpectedItem, got: &ReceiptItem) -> Vec<String> {
    let mut failures = Vec::new();
    if want.name != got.name {
        failures.push(format!("item {i}: name '{}' != '{}'", got.name, want.name));
    }
    if normalize(want.price) != got.price {
        failures.push(format!(
            "item {i}: price {} != {}",
            format_kr(got.price),
            format_kr(want.price)
        ));
    }
    if want.discount.map(normalize) != got.discount {
        failures.push(format!(
            "item {i}: discount {:?} != {:?}",
            got.discount.map(format_kr),
            want.discount.map(format_kr)
        ));
    }
    failures
}
