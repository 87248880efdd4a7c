//! ICA receipts (Kvantum, Maxi, Supermarket, Nära).
//!
//! Item names are `*`-marked, the price sits on the line below and a promo
//! line may follow:
//!   *Kiwi Guava Nocco Bcaa 33cl Påse 2
//!    41,90
//!   Energidryck 2F25 -33,80

use crate::grammar::{Grammar, PatternRule, RuleKind};

pub fn grammar() -> Grammar {
    Grammar::new(
        "ica",
        vec!["ica"],
        vec![
            PatternRule::new("multi_buy", RuleKind::MultiBuy, 100),
            PatternRule::new("malformed_multi_buy", RuleKind::MalformedMultiBuy, 90),
            PatternRule::new("plain_discount", RuleKind::PlainDiscount, 80),
            PatternRule::new("measured_item", RuleKind::MeasuredItem, 70),
            PatternRule::new("priced_item", RuleKind::PricedItem, 60),
            PatternRule::new("total", RuleKind::Total, 50),
            PatternRule::new("metadata", RuleKind::Metadata, 40),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::LineClassifier;
    use crate::grammar::Window;
    use crate::tokenizer::tokenize;

    fn first_rule(text: &str) -> Option<RuleKind> {
        let lines = LineClassifier::new().unwrap().classify_all(&tokenize(text));
        grammar().match_window(&lines).map(|(rule, _, _)| rule.kind)
    }

    #[test]
    fn test_rule_dispatch() {
        assert_eq!(
            first_rule("*Äpplen Pink Lady\n 18,00\nFrukt 3F27 -9,00"),
            Some(RuleKind::MultiBuy)
        );
        assert_eq!(
            first_rule("*Äpplen Pink Lady\n 18,00\nFrukt F27 -9,00"),
            Some(RuleKind::MalformedMultiBuy)
        );
        assert_eq!(
            first_rule("*Mjölk Arla Ekologisk 3%\n 25,00\nKampanj -5,00"),
            Some(RuleKind::PlainDiscount)
        );
        assert_eq!(
            first_rule("*Bananer Eko\n1,024 kg x 29,95 kr/kg 30,67"),
            Some(RuleKind::MeasuredItem)
        );
        assert_eq!(first_rule("*Gurka\n 12,95\n"), Some(RuleKind::PricedItem));
        assert_eq!(first_rule("Totalt 144,00"), Some(RuleKind::Total));
        assert_eq!(first_rule("Moms 12%"), Some(RuleKind::Metadata));
        assert_eq!(first_rule("ICA Kvantum Malmborgs"), None);
    }

    #[test]
    fn test_inline_item_with_multi_buy() {
        let lines = LineClassifier::new()
            .unwrap()
            .classify_all(&tokenize("Nocco 2 41,90\nEnergidryck 2F25 -33,80"));
        let (_, window, width) = grammar().match_window(&lines).unwrap();
        assert_eq!(width, 2);
        assert!(matches!(window, Window::MultiBuy { .. }));
    }
}
