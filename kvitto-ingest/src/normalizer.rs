//! Assemble final `ReceiptItem`s.
//!
//! Categories are not computed here: every structured item gets the
//! `other` placeholder and is refined later by the product-mapping service.

use kvitto_core::money::{format_kr, normalize};
use kvitto_core::{Anomaly, AnomalyKind, DEFAULT_CATEGORY, ReceiptItem, Severity};
use rust_decimal::Decimal;

use crate::anomaly::AnomalyReporter;
use crate::resolver::{QuantityHint, ResolvedItem};

/// Quantity stored on the item. A multi-buy bundle counts as one purchased
/// unit; N stays on the resolver output.
pub fn infer_quantity(hint: QuantityHint) -> Decimal {
    match hint {
        QuantityHint::Bundle | QuantityHint::Single => Decimal::ONE,
        QuantityHint::Count(n) => Decimal::from(n),
        QuantityHint::Measured(q) => q,
    }
}

pub fn normalize_item(resolved: &ResolvedItem) -> ReceiptItem {
    let item = ReceiptItem::new(resolved.name.clone(), resolved.price)
        .with_quantity(infer_quantity(resolved.quantity))
        .with_category(DEFAULT_CATEGORY);

    match resolved.discount {
        Some(d) => item.with_discount(d),
        None => item,
    }
}

/// Hold an item returned by the AI fallback to the same invariants as the
/// structured output: non-negative money, positive quantity, a category.
pub fn sanitize_fallback_item(mut item: ReceiptItem, reporter: &mut AnomalyReporter) -> ReceiptItem {
    item.name = item.name.trim().to_string();
    if item.category.trim().is_empty() {
        item.category = DEFAULT_CATEGORY.to_string();
    }
    if item.quantity <= Decimal::ZERO {
        item.quantity = Decimal::ONE;
    }

    if item.price < Decimal::ZERO {
        reporter.record(
            Anomaly::new(
                AnomalyKind::PriceClamped,
                Severity::Medium,
                format!("fallback price {} clamped to 0", format_kr(item.price)),
            )
            .with_item(&item),
        );
        item.price = Decimal::ZERO;
    }
    item.price = normalize(item.price);

    if let Some(discount) = item.discount {
        if discount < Decimal::ZERO {
            reporter.record(
                Anomaly::new(
                    AnomalyKind::DiscountClamped,
                    Severity::Medium,
                    format!("fallback discount {} clamped to 0", format_kr(discount)),
                )
                .with_item(&item),
            );
        }
        item.discount = Some(normalize(discount.max(Decimal::ZERO)));
    }

    item
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn resolved(quantity: QuantityHint, discount: Option<Decimal>) -> ResolvedItem {
        ResolvedItem {
            name: "OLW Chips Sourcream 175g OLW".to_string(),
            price: dec!(89.00),
            original_price: dec!(129.80),
            discount,
            quantity,
            multi_buy: None,
        }
    }

    #[test]
    fn test_bundle_counts_as_one() {
        let item = normalize_item(&resolved(QuantityHint::Bundle, Some(dec!(40.80))));
        assert_eq!(item.quantity, dec!(1));
        assert_eq!(item.price, dec!(89.00));
        assert_eq!(item.discount, Some(dec!(40.80)));
        assert_eq!(item.category, "other");
    }

    #[test]
    fn test_quantity_inference() {
        assert_eq!(infer_quantity(QuantityHint::Count(3)), dec!(3));
        assert_eq!(infer_quantity(QuantityHint::Measured(dec!(0.512))), dec!(0.512));
        assert_eq!(infer_quantity(QuantityHint::Single), dec!(1));
        let item = normalize_item(&resolved(QuantityHint::Count(4), None));
        assert_eq!(item.discount, None);
        assert_eq!(item.quantity, dec!(4));
    }

    #[test]
    fn test_sanitize_fallback_item() {
        let mut reporter = AnomalyReporter::new();
        let mut item = ReceiptItem::new(" Ost ", dec!(-5)).with_category("");
        item.discount = Some(dec!(-1.5));
        item.quantity = dec!(0);

        let item = sanitize_fallback_item(item, &mut reporter);
        assert_eq!(item.name, "Ost");
        assert_eq!(item.price, dec!(0.00));
        assert_eq!(item.discount, Some(dec!(0.00)));
        assert_eq!(item.quantity, dec!(1));
        assert_eq!(item.category, "other");
        assert!(reporter.has(&AnomalyKind::PriceClamped));
        assert!(reporter.has(&AnomalyKind::DiscountClamped));
    }

    #[test]
    fn test_sanitize_keeps_valid_item() {
        let mut reporter = AnomalyReporter::new();
        let item = ReceiptItem::new("Bröd", dec!(32.5))
            .with_category("bakery")
            .with_discount(dec!(3));
        let out = sanitize_fallback_item(item.clone(), &mut reporter);
        assert_eq!(out, item);
        assert!(reporter.is_empty());
    }
}
