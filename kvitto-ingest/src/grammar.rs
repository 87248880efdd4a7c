//! Store grammar registry.
//!
//! A [`Grammar`] is an ordered list of [`PatternRule`]s over classified line
//! windows. The registry is built once, never mutated, and shared behind an
//! `Arc` by every parser.

use rust_decimal::Decimal;

use crate::classify::{
    ItemNameLine, LineClassification, LineKind, MeasureLine, MultiBuyPromo, MultiBuyToken,
    PromoLine,
};
use crate::grammars;

/// Lines scanned by [`GrammarRegistry::detect_store`].
const DETECT_SCAN_LINES: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    /// name + price + `<N>F<price>` promo
    MultiBuy,
    /// name + price + promo whose multi-buy token is unreadable
    MalformedMultiBuy,
    /// name + price + promo without a multi-buy token
    PlainDiscount,
    /// name + price + any promo, label kept verbatim
    LiteralDiscount,
    /// name + measure line
    MeasuredItem,
    /// name + price, or a single inline item line
    PricedItem,
    Total,
    Metadata,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatternRule {
    pub name: &'static str,
    pub kind: RuleKind,
    /// Higher runs first.
    pub priority: u8,
}

impl PatternRule {
    pub const fn new(name: &'static str, kind: RuleKind, priority: u8) -> Self {
        Self {
            name,
            kind,
            priority,
        }
    }

    /// Match this rule against the window starting at `lines[0]`.
    /// Returns the extracted window and the number of lines it consumes.
    pub fn try_match(&self, lines: &[LineClassification]) -> Option<(Window, usize)> {
        match self.kind {
            RuleKind::MultiBuy => {
                let (head, width) = item_head(lines)?;
                let promo = promo_at(lines, width)?;
                match &promo.token {
                    MultiBuyToken::Valid(multi_buy) => Some((
                        Window::MultiBuy {
                            multi_buy: multi_buy.clone(),
                            head,
                            promo: promo.clone(),
                        },
                        width + 1,
                    )),
                    _ => None,
                }
            }
            RuleKind::MalformedMultiBuy => {
                let (head, width) = item_head(lines)?;
                let promo = promo_at(lines, width)?;
                match &promo.token {
                    MultiBuyToken::Malformed { raw } => Some((
                        Window::Deferred {
                            head,
                            token: raw.clone(),
                        },
                        width + 1,
                    )),
                    _ => None,
                }
            }
            RuleKind::PlainDiscount => {
                let (head, width) = item_head(lines)?;
                let promo = promo_at(lines, width)?;
                match promo.token {
                    MultiBuyToken::Absent => Some((
                        Window::Discount {
                            head,
                            label: promo.label.clone(),
                            printed_discount: promo.printed_discount,
                        },
                        width + 1,
                    )),
                    _ => None,
                }
            }
            RuleKind::LiteralDiscount => {
                let (head, width) = item_head(lines)?;
                let promo = promo_at(lines, width)?;
                Some((
                    Window::Discount {
                        head,
                        label: promo.raw_label.clone(),
                        printed_discount: promo.printed_discount,
                    },
                    width + 1,
                ))
            }
            RuleKind::MeasuredItem => match (kind_at(lines, 0)?, kind_at(lines, 1)?) {
                (LineKind::ItemName(item), LineKind::Measure(measure)) => Some((
                    Window::Measured {
                        item: item.clone(),
                        measure: measure.clone(),
                    },
                    2,
                )),
                _ => None,
            },
            RuleKind::PricedItem => {
                let (head, width) = item_head(lines)?;
                Some((Window::Priced { head }, width))
            }
            RuleKind::Total => match kind_at(lines, 0)? {
                LineKind::Total { amount } => Some((Window::Total(*amount), 1)),
                _ => None,
            },
            RuleKind::Metadata => match kind_at(lines, 0)? {
                LineKind::Metadata => Some((Window::Metadata, 1)),
                _ => None,
            },
        }
    }
}

/// Product text, piece count and pre-promotion price of an item.
#[derive(Debug, Clone, PartialEq)]
pub struct ItemHead {
    pub product: String,
    pub count: Option<u32>,
    pub original_price: Decimal,
}

/// Payload extracted by a matched rule.
#[derive(Debug, Clone, PartialEq)]
pub enum Window {
    MultiBuy {
        head: ItemHead,
        promo: PromoLine,
        multi_buy: MultiBuyPromo,
    },
    /// Unparseable promo; handed to the AI fallback.
    Deferred { head: ItemHead, token: String },
    Discount {
        head: ItemHead,
        label: String,
        printed_discount: Decimal,
    },
    Measured {
        item: ItemNameLine,
        measure: MeasureLine,
    },
    Priced { head: ItemHead },
    Total(Decimal),
    Metadata,
}

fn kind_at(lines: &[LineClassification], i: usize) -> Option<&LineKind> {
    lines.get(i).map(|l| &l.kind)
}

fn promo_at(lines: &[LineClassification], i: usize) -> Option<&PromoLine> {
    match kind_at(lines, i)? {
        LineKind::DiscountPromo(promo) => Some(promo),
        _ => None,
    }
}

/// `item name` directly above `unit price`, or one inline item line.
fn item_head(lines: &[LineClassification]) -> Option<(ItemHead, usize)> {
    match kind_at(lines, 0)? {
        LineKind::ItemName(item) => match kind_at(lines, 1)? {
            LineKind::UnitPrice { amount } => Some((
                ItemHead {
                    product: item.product.clone(),
                    count: item.count,
                    original_price: *amount,
                },
                2,
            )),
            _ => None,
        },
        LineKind::InlineItem {
            product,
            count,
            amount,
        } => Some((
            ItemHead {
                product: product.clone(),
                count: *count,
                original_price: *amount,
            },
            1,
        )),
        _ => None,
    }
}

/// The rule set for one store family.
#[derive(Debug, Clone)]
pub struct Grammar {
    pub id: &'static str,
    /// Normalized store-id prefixes this grammar answers to.
    pub prefixes: Vec<&'static str>,
    rules: Vec<PatternRule>,
}

impl Grammar {
    pub fn new(id: &'static str, prefixes: Vec<&'static str>, mut rules: Vec<PatternRule>) -> Self {
        rules.sort_by(|a, b| b.priority.cmp(&a.priority));
        Self {
            id,
            prefixes,
            rules,
        }
    }

    /// Rules in evaluation order.
    pub fn rules(&self) -> &[PatternRule] {
        &self.rules
    }

    /// First rule (by priority) matching the window at `lines[0]`.
    pub fn match_window(
        &self,
        lines: &[LineClassification],
    ) -> Option<(&PatternRule, Window, usize)> {
        self.rules
            .iter()
            .find_map(|rule| rule.try_match(lines).map(|(w, width)| (rule, w, width)))
    }

    pub fn supports(&self, kind: RuleKind) -> bool {
        self.rules.iter().any(|r| r.kind == kind)
    }

    fn answers_to(&self, normalized_store: &str) -> bool {
        self.prefixes.iter().any(|p| {
            normalized_store == *p
                || normalized_store
                    .strip_prefix(p)
                    .is_some_and(|rest| rest.starts_with(' '))
        })
    }
}

/// Immutable store-id → grammar lookup.
#[derive(Debug, Clone)]
pub struct GrammarRegistry {
    grammars: Vec<Grammar>,
    generic: Grammar,
}

impl GrammarRegistry {
    pub fn new(grammars: Vec<Grammar>, generic: Grammar) -> Self {
        Self { grammars, generic }
    }

    /// Registry with every built-in store grammar.
    pub fn builtin() -> Self {
        Self::new(vec![grammars::ica::grammar()], grammars::generic::grammar())
    }

    /// Grammar for `store_id`; unregistered stores get the generic grammar.
    pub fn grammar_for(&self, store_id: &str) -> &Grammar {
        let normalized = normalize_store_id(store_id);
        self.grammars
            .iter()
            .find(|g| g.answers_to(&normalized))
            .unwrap_or(&self.generic)
    }

    pub fn rules_for(&self, store_id: &str) -> &[PatternRule] {
        self.grammar_for(store_id).rules()
    }

    /// Registered grammars, generic last.
    pub fn grammars(&self) -> impl Iterator<Item = &Grammar> {
        self.grammars.iter().chain(std::iter::once(&self.generic))
    }

    /// Look for a registered store name among the first lines of a receipt.
    pub fn detect_store(&self, raw_text: &str) -> Option<String> {
        raw_text
            .lines()
            .map(|l| l.trim().trim_start_matches('*').trim())
            .filter(|l| !l.is_empty())
            .take(DETECT_SCAN_LINES)
            .find(|l| {
                let normalized = normalize_store_id(l);
                self.grammars.iter().any(|g| g.answers_to(&normalized))
            })
            .map(str::to_string)
    }
}

/// Trim, lowercase and collapse inner whitespace.
pub fn normalize_store_id(store_id: &str) -> String {
    store_id
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}
