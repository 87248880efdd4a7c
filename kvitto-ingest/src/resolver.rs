//! Turn matched line windows into priced items.
//!
//! Multi-buy promotions (`Energidryck 2F25 -33,80`) are the delicate case.
//! The printed `-X` figure is informational only: stores print it against
//! varying baselines and sometimes with the sign reversed. The stored
//! discount is always derived as `original - bundle`, floored at zero, and
//! the stored price is the bundle price.

use kvitto_core::money::{format_kr, normalize};
use kvitto_core::{AffectedItem, Anomaly, AnomalyKind, Severity};
use rust_decimal::Decimal;

use crate::anomaly::AnomalyReporter;
use crate::classify::{ItemNameLine, MeasureLine, MultiBuyPromo};
use crate::grammar::ItemHead;
use crate::normalizer::infer_quantity;

/// Measured lines may disagree with `qty x unit price` by rounding only.
const MEASURE_TOLERANCE: Decimal = Decimal::from_parts(1, 0, 0, false, 2);

/// How the normalizer should derive the item quantity.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum QuantityHint {
    /// One bundle of N pieces.
    Bundle,
    /// Printed piece count.
    Count(u32),
    /// Weighed or counted measure line.
    Measured(Decimal),
    Single,
}

impl QuantityHint {
    fn from_count(count: Option<u32>) -> Self {
        count.map_or(QuantityHint::Single, QuantityHint::Count)
    }
}

/// Resolver output, before normalization into a `ReceiptItem`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedItem {
    pub name: String,
    pub price: Decimal,
    /// Price printed before any promotion.
    pub original_price: Decimal,
    pub discount: Option<Decimal>,
    pub quantity: QuantityHint,
    /// The multi-buy descriptor, kept for callers that need N.
    pub multi_buy: Option<MultiBuyPromo>,
}

impl ResolvedItem {
    pub fn affected(&self) -> AffectedItem {
        AffectedItem {
            name: self.name.clone(),
            price: self.price,
            quantity: infer_quantity(self.quantity),
        }
    }
}

/// Space-join product text and promo label, skipping empty fragments.
pub fn compose_name(product: &str, label: &str) -> String {
    [product.trim(), label.trim()]
        .into_iter()
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Resolve `name / price / <label> <N>F<bundle> -<printed>`.
pub fn resolve_multi_buy(
    head: &ItemHead,
    multi_buy: &MultiBuyPromo,
    reporter: &mut AnomalyReporter,
) -> ResolvedItem {
    let original = normalize(head.original_price);
    let bundle = normalize(multi_buy.bundle_price);
    let discount = normalize((original - bundle).max(Decimal::ZERO));

    let item = ResolvedItem {
        name: compose_name(&head.product, &multi_buy.promo_label),
        price: bundle,
        original_price: original,
        discount: Some(discount),
        quantity: QuantityHint::Bundle,
        multi_buy: Some(multi_buy.clone()),
    };

    if bundle > original {
        reporter.record(
            Anomaly::new(
                AnomalyKind::DiscountClamped,
                Severity::Medium,
                format!(
                    "bundle price {} ({}F) exceeds original price {}; discount clamped to 0",
                    format_kr(bundle),
                    multi_buy.quantity,
                    format_kr(original)
                ),
            )
            .with_affected(item.affected()),
        );
    }

    item
}

/// Resolve `name / price / <label> -<printed>`. With no bundle arithmetic
/// to contradict it, the printed discount is trusted.
pub fn resolve_plain_discount(
    head: &ItemHead,
    label: &str,
    printed_discount: Decimal,
    reporter: &mut AnomalyReporter,
) -> ResolvedItem {
    let original = normalize(head.original_price);
    let printed = normalize(printed_discount.abs());

    let mut item = ResolvedItem {
        name: compose_name(&head.product, label),
        price: normalize(original - printed),
        original_price: original,
        discount: Some(printed),
        quantity: QuantityHint::from_count(head.count),
        multi_buy: None,
    };

    if item.price < Decimal::ZERO {
        // Only what was actually paid can have been deducted.
        item.price = normalize(Decimal::ZERO);
        item.discount = Some(original);
        reporter.record(
            Anomaly::new(
                AnomalyKind::PriceClamped,
                Severity::Medium,
                format!(
                    "printed discount {} exceeds price {}; price clamped to 0",
                    format_kr(printed),
                    format_kr(original)
                ),
            )
            .with_affected(item.affected()),
        );
    }

    item
}

pub fn resolve_priced(head: &ItemHead) -> ResolvedItem {
    let price = normalize(head.original_price);
    ResolvedItem {
        name: head.product.trim().to_string(),
        price,
        original_price: price,
        discount: None,
        quantity: QuantityHint::from_count(head.count),
        multi_buy: None,
    }
}

/// Resolve `name / 1,024 kg x 29,95 kr/kg 30,67`. The printed line total
/// wins over the computed one.
///
/// `None` when `qty x unit price` does not fit a `Decimal`; an
/// `amount_overflow` anomaly is recorded and the caller defers the window.
pub fn resolve_measured(
    item: &ItemNameLine,
    measure: &MeasureLine,
    reporter: &mut AnomalyReporter,
) -> Option<ResolvedItem> {
    let Some(product) = measure.quantity.checked_mul(measure.unit_price) else {
        reporter.record(Anomaly::new(
            AnomalyKind::AmountOverflow,
            Severity::Medium,
            format!(
                "'{}': {} x {} overflows",
                item.product.trim(),
                measure.quantity,
                measure.unit_price
            ),
        ));
        return None;
    };
    let computed = normalize(product);
    let price = measure.total.map(normalize).unwrap_or(computed);

    let resolved = ResolvedItem {
        name: item.product.trim().to_string(),
        price,
        original_price: price,
        discount: None,
        quantity: QuantityHint::Measured(measure.quantity),
        multi_buy: None,
    };

    if (price - computed).abs() > MEASURE_TOLERANCE {
        reporter.record(
            Anomaly::new(
                AnomalyKind::MeasureMismatch,
                Severity::Low,
                format!(
                    "printed total {} differs from {} x {} = {}",
                    format_kr(price),
                    measure.quantity,
                    format_kr(measure.unit_price),
                    format_kr(computed)
                ),
            )
            .with_affected(resolved.affected()),
        );
    }

    Some(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::MeasureUnit;
    use rust_decimal_macros::dec;

    fn head(product: &str, count: Option<u32>, price: Decimal) -> ItemHead {
        ItemHead {
            product: product.to_string(),
            count,
            original_price: price,
        }
    }

    fn promo(quantity: u32, bundle: Decimal, label: &str) -> MultiBuyPromo {
        MultiBuyPromo {
            quantity,
            bundle_price: bundle,
            promo_label: label.to_string(),
        }
    }

    #[test]
    fn test_multi_buy_ignores_printed_discount() {
        let mut reporter = AnomalyReporter::new();
        let item = resolve_multi_buy(
            &head("Kiwi Guava Nocco Bcaa 33cl Påse", Some(2), dec!(41.90)),
            &promo(2, dec!(25), "Energidryck"),
            &mut reporter,
        );
        assert_eq!(item.name, "Kiwi Guava Nocco Bcaa 33cl Påse Energidryck");
        assert_eq!(item.price, dec!(25.00));
        assert_eq!(item.discount, Some(dec!(16.90)));
        assert_eq!(item.quantity, QuantityHint::Bundle);
        assert_eq!(item.multi_buy.as_ref().map(|m| m.quantity), Some(2));
        assert!(reporter.is_empty());
    }

    #[test]
    fn test_multi_buy_clamps_reversed_bundle() {
        let mut reporter = AnomalyReporter::new();
        let item = resolve_multi_buy(
            &head("Äpplen Pink Lady", None, dec!(18.00)),
            &promo(3, dec!(27), "Frukt"),
            &mut reporter,
        );
        assert_eq!(item.price, dec!(27.00));
        assert_eq!(item.discount, Some(dec!(0.00)));

        let anomalies = reporter.drain();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::DiscountClamped);
        assert_eq!(anomalies[0].severity, Severity::Medium);
        let affected = anomalies[0].affected_item.as_ref().unwrap();
        assert_eq!(affected.name, "Äpplen Pink Lady Frukt");
        assert_eq!(affected.price, dec!(27.00));
        assert_eq!(affected.quantity, dec!(1));
    }

    #[test]
    fn test_multi_buy_equal_prices_no_anomaly() {
        let mut reporter = AnomalyReporter::new();
        let item = resolve_multi_buy(
            &head("Yoghurt", None, dec!(30.00)),
            &promo(2, dec!(30), "Mejeri"),
            &mut reporter,
        );
        assert_eq!(item.discount, Some(dec!(0.00)));
        assert!(reporter.is_empty());
    }

    #[test]
    fn test_plain_discount_trusted() {
        let mut reporter = AnomalyReporter::new();
        let item = resolve_plain_discount(
            &head("Mjölk Arla Ekologisk 3%", None, dec!(25.00)),
            "Kampanj",
            dec!(5.00),
            &mut reporter,
        );
        assert_eq!(item.name, "Mjölk Arla Ekologisk 3% Kampanj");
        assert_eq!(item.price, dec!(20.00));
        assert_eq!(item.discount, Some(dec!(5.00)));
        assert!(reporter.is_empty());
    }

    #[test]
    fn test_plain_discount_larger_than_price() {
        let mut reporter = AnomalyReporter::new();
        let item = resolve_plain_discount(
            &head("Kaffe", None, dec!(10.00)),
            "",
            dec!(12.00),
            &mut reporter,
        );
        assert_eq!(item.name, "Kaffe");
        assert_eq!(item.price, dec!(0.00));
        assert_eq!(item.discount, Some(dec!(10.00)));
        assert!(reporter.has(&AnomalyKind::PriceClamped));
    }

    #[test]
    fn test_measured_prefers_printed_total() {
        let mut reporter = AnomalyReporter::new();
        let line = ItemNameLine {
            product: "Bananer Eko".to_string(),
            count: None,
            marked: true,
        };
        let measure = MeasureLine {
            quantity: dec!(1.024),
            unit: MeasureUnit::Kilogram,
            unit_price: dec!(29.95),
            total: Some(dec!(30.67)),
        };
        let item = resolve_measured(&line, &measure, &mut reporter).unwrap();
        assert_eq!(item.price, dec!(30.67));
        assert_eq!(item.quantity, QuantityHint::Measured(dec!(1.024)));
        assert!(reporter.is_empty());

        let off = MeasureLine {
            total: Some(dec!(35.00)),
            ..measure
        };
        resolve_measured(&line, &off, &mut reporter);
        assert!(reporter.has(&AnomalyKind::MeasureMismatch));
    }

    #[test]
    fn test_measured_overflow_is_reported() {
        let mut reporter = AnomalyReporter::new();
        let line = ItemNameLine {
            product: "Bananer".to_string(),
            count: None,
            marked: true,
        };
        let measure = MeasureLine {
            quantity: dec!(99999999999),
            unit: MeasureUnit::Kilogram,
            unit_price: dec!(999999999999999999.99),
            total: None,
        };
        assert!(resolve_measured(&line, &measure, &mut reporter).is_none());
        let anomalies = reporter.drain();
        assert_eq!(anomalies.len(), 1);
        assert_eq!(anomalies[0].kind, AnomalyKind::AmountOverflow);
        assert_eq!(anomalies[0].severity, Severity::Medium);
    }

    #[test]
    fn test_compose_name_skips_empty() {
        assert_eq!(compose_name("OLW Chips", "OLW"), "OLW Chips OLW");
        assert_eq!(compose_name("OLW Chips ", " "), "OLW Chips");
    }
}
