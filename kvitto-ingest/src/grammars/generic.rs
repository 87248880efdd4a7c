//! Fallback grammar for unregistered stores: label / price / discount only.
//! Multi-buy tokens are not interpreted; a promo line's label is kept as
//! printed and its discount is trusted.

use crate::grammar::{Grammar, PatternRule, RuleKind};

pub fn grammar() -> Grammar {
    Grammar::new(
        "generic",
        Vec::new(),
        vec![
            PatternRule::new("discount", RuleKind::LiteralDiscount, 80),
            PatternRule::new("measured_item", RuleKind::MeasuredItem, 70),
            PatternRule::new("priced_item", RuleKind::PricedItem, 60),
            PatternRule::new("total", RuleKind::Total, 50),
            PatternRule::new("metadata", RuleKind::Metadata, 40),
        ],
    )
}
