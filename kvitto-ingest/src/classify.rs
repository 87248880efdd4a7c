//! Line classification.
//!
//! Every [`RawLine`] is tagged by shape, independent of which store printed
//! it. Store grammars then decide what a sequence of shapes means.
//!
//! Shapes seen on Swedish grocery receipts:
//!   *OLW Chips Sourcream 175g 4        item name (trailing piece count)
//!    129,80                            unit price
//!   OLW 4F89 -40,80                    promo: label, multi-buy token, printed discount
//!   1,024 kg x 29,95 kr/kg 30,67       measure
//!   Gurka 12,95                        inline item
//!   Totalt 144,00 SEK                  total

use kvitto_core::money::{parse_amount, parse_decimal};
use kvitto_core::ParseError;
use regex::Regex;
use rust_decimal::Decimal;

use crate::tokenizer::RawLine;

/// Amount with comma decimals and optional 3-digit grouping.
const AMOUNT: &str = r"(?:\d{1,3}(?:[ .]\d{3})+|\d+),\d{2}";

/// Parsed `<N>F<price>` multi-buy descriptor.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiBuyPromo {
    /// Units in the bundle, always > 0.
    pub quantity: u32,
    /// Price for the whole bundle, always >= 0.
    pub bundle_price: Decimal,
    /// Label printed before the token (`Energidryck`).
    pub promo_label: String,
}

/// Multi-buy token found (or not) among a promo line's label tokens.
#[derive(Debug, Clone, PartialEq)]
pub enum MultiBuyToken {
    Absent,
    Valid(MultiBuyPromo),
    /// `F<price>` shape with a missing, zero or non-numeric quantity.
    Malformed { raw: String },
}

/// `<label> [<N>F<price>] -<discount>`
#[derive(Debug, Clone, PartialEq)]
pub struct PromoLine {
    /// Label with the multi-buy token removed.
    pub label: String,
    /// Everything before the discount, token included.
    pub raw_label: String,
    pub token: MultiBuyToken,
    /// The `-X` figure as printed, sign dropped.
    pub printed_discount: Decimal,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemNameLine {
    pub product: String,
    /// Trailing piece count (`... Påse 2`).
    pub count: Option<u32>,
    pub marked: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureUnit {
    Kilogram,
    Gram,
    Piece,
    Litre,
}

impl MeasureUnit {
    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "kg" => Some(MeasureUnit::Kilogram),
            "g" => Some(MeasureUnit::Gram),
            "st" => Some(MeasureUnit::Piece),
            "l" => Some(MeasureUnit::Litre),
            _ => None,
        }
    }
}

/// `1,024 kg x 29,95 kr/kg 30,67`
#[derive(Debug, Clone, PartialEq)]
pub struct MeasureLine {
    pub quantity: Decimal,
    pub unit: MeasureUnit,
    pub unit_price: Decimal,
    /// Line total when printed.
    pub total: Option<Decimal>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    Blank,
    ItemName(ItemNameLine),
    UnitPrice { amount: Decimal },
    DiscountPromo(PromoLine),
    Measure(MeasureLine),
    InlineItem { product: String, count: Option<u32>, amount: Decimal },
    Total { amount: Decimal },
    Metadata,
    Unknown,
}

impl LineKind {
    /// Tag name used in logs.
    pub fn tag(&self) -> &'static str {
        match self {
            LineKind::Blank => "blank",
            LineKind::ItemName(_) => "item_name",
            LineKind::UnitPrice { .. } => "unit_price",
            LineKind::DiscountPromo(_) => "discount_promo",
            LineKind::Measure(_) => "measure",
            LineKind::InlineItem { .. } => "inline_item",
            LineKind::Total { .. } => "total",
            LineKind::Metadata => "metadata",
            LineKind::Unknown => "unknown",
        }
    }
}

/// A classified line. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct LineClassification {
    pub index: usize,
    pub raw: String,
    pub kind: LineKind,
}

/// Compiled line patterns. Build once and share.
#[derive(Debug)]
pub struct LineClassifier {
    total_re: Regex,
    summary_re: Regex,
    metadata_re: Regex,
    unit_price_re: Regex,
    bare_discount_re: Regex,
    promo_re: Regex,
    measure_re: Regex,
    inline_re: Regex,
    count_re: Regex,
    multi_buy_re: Regex,
}

impl LineClassifier {
    pub fn new() -> Result<Self, ParseError> {
        Ok(Self {
            total_re: Regex::new(&format!(
                r"(?i)^(?:totalt|total|summa|att betala)\s*:?\s*(?:sek\s*)?(?P<amt>-?{AMOUNT})(?:\s*(?:kr|sek))?$"
            ))?,
            summary_re: Regex::new(
                r"(?i)^(?:erhållen|varav|total|summa)\s+rabatt(?:er)?\b",
            )?,
            metadata_re: Regex::new(concat!(
                r"(?i)^(?:",
                r"(?:summa\s+)?moms|netto|brutto|kort\w*|bankkort|swish|kontant\w*|",
                r"mottaget|växel|betalat|betalning|org\.?\s*nr|organisationsnummer|",
                r"kvitto\w*|kassa|kassör|butik|tel|telefon|datum|tid|ref|terminal|köp|",
                r"spara kvittot|välkommen|tack för|öppettider|erhållen rabatt|varav|antal",
                r")\b|^\d{4}-\d{2}-\d{2}|^\d{2}:\d{2}",
            ))?,
            unit_price_re: Regex::new(&format!(r"(?i)^(?P<amt>{AMOUNT})(?:\s*(?:kr|sek))?$"))?,
            bare_discount_re: Regex::new(&format!(r"(?i)^-\s?(?P<amt>{AMOUNT})(?:\s*kr)?$"))?,
            promo_re: Regex::new(&format!(
                r"(?i)^(?P<body>.*?\S)\s+-\s?(?P<amt>{AMOUNT})(?:\s*kr)?$"
            ))?,
            measure_re: Regex::new(&format!(
                r"(?i)^(?P<qty>\d+(?:,\d+)?)\s*(?P<unit>kg|g|st|l)\s*[x*×]\s*(?P<each>{AMOUNT})(?:\s*(?:kr)?\s*/\s*(?:kg|g|st|l))?(?:\s+(?P<total>{AMOUNT}))?$"
            ))?,
            inline_re: Regex::new(&format!(
                r"(?i)^(?P<name>.*\p{{L}}.*?)\s+(?P<amt>{AMOUNT})(?:\s*kr)?$"
            ))?,
            count_re: Regex::new(r"^(?P<product>.*\p{L}.*?)\s+(?P<count>\d{1,3})$")?,
            multi_buy_re: Regex::new(r"^(?P<n>\S*?)F(?P<price>\d+(?:,\d{1,2})?)$")?,
        })
    }

    pub fn classify(&self, line: &RawLine) -> LineClassification {
        LineClassification {
            index: line.index,
            raw: line.raw.clone(),
            kind: self.classify_text(&line.text, line.marked),
        }
    }

    pub fn classify_all(&self, lines: &[RawLine]) -> Vec<LineClassification> {
        lines.iter().map(|l| self.classify(l)).collect()
    }

    fn classify_text(&self, text: &str, marked: bool) -> LineKind {
        if text.is_empty() {
            return LineKind::Blank;
        }

        if let Some(caps) = self.total_re.captures(text) {
            if let Some(amount) = parse_amount(&caps["amt"]) {
                return LineKind::Total { amount };
            }
        }

        // Receipt-wide discount summaries are not item promos.
        if self.summary_re.is_match(text) {
            return LineKind::Metadata;
        }

        if let Some(caps) = self.unit_price_re.captures(text) {
            if let Some(amount) = parse_amount(&caps["amt"]) {
                return LineKind::UnitPrice { amount };
            }
        }

        if let Some(caps) = self.bare_discount_re.captures(text) {
            if let Some(amount) = parse_amount(&caps["amt"]) {
                return LineKind::DiscountPromo(PromoLine {
                    label: String::new(),
                    raw_label: String::new(),
                    token: MultiBuyToken::Absent,
                    printed_discount: amount,
                });
            }
        }

        if let Some(caps) = self.promo_re.captures(text) {
            if let Some(amount) = parse_amount(&caps["amt"]) {
                return LineKind::DiscountPromo(self.promo_line(&caps["body"], amount));
            }
        }

        // After promos: `Köp 3 betala 2 -10,00` starts with a metadata word.
        if self.metadata_re.is_match(text) {
            return LineKind::Metadata;
        }

        if let Some(measure) = self.measure_line(text) {
            return LineKind::Measure(measure);
        }

        if let Some(caps) = self.inline_re.captures(text) {
            if let Some(amount) = parse_amount(&caps["amt"]) {
                let (product, count) = self.split_count(&caps["name"]);
                return LineKind::InlineItem {
                    product,
                    count,
                    amount,
                };
            }
        }

        if text.chars().any(char::is_alphabetic) {
            let (product, count) = self.split_count(text);
            return LineKind::ItemName(ItemNameLine {
                product,
                count,
                marked,
            });
        }

        LineKind::Unknown
    }

    fn promo_line(&self, body: &str, printed_discount: Decimal) -> PromoLine {
        let mut token = MultiBuyToken::Absent;
        let mut label_parts = Vec::new();

        for part in body.split_whitespace() {
            if matches!(token, MultiBuyToken::Absent) {
                if let Some(found) = self.multi_buy_token(part) {
                    token = found;
                    continue;
                }
            }
            label_parts.push(part);
        }

        let label = label_parts.join(" ");
        if let MultiBuyToken::Valid(promo) = &mut token {
            promo.promo_label = label.clone();
        }

        PromoLine {
            label,
            raw_label: body.split_whitespace().collect::<Vec<_>>().join(" "),
            token,
            printed_discount,
        }
    }

    fn multi_buy_token(&self, part: &str) -> Option<MultiBuyToken> {
        let caps = self.multi_buy_re.captures(part)?;
        let bundle_price = parse_amount(&caps["price"])?;
        let n = &caps["n"];
        let quantity = if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) {
            n.parse::<u32>().ok().filter(|q| *q > 0)
        } else {
            None
        };
        match quantity {
            Some(quantity) => Some(MultiBuyToken::Valid(MultiBuyPromo {
                quantity,
                bundle_price,
                promo_label: String::new(),
            })),
            None => Some(MultiBuyToken::Malformed {
                raw: part.to_string(),
            }),
        }
    }

    fn measure_line(&self, text: &str) -> Option<MeasureLine> {
        let caps = self.measure_re.captures(text)?;
        Some(MeasureLine {
            quantity: parse_decimal(&caps["qty"])?,
            unit: MeasureUnit::parse(&caps["unit"])?,
            unit_price: parse_amount(&caps["each"])?,
            total: match caps.name("total") {
                Some(m) => Some(parse_amount(m.as_str())?),
                None => None,
            },
        })
    }

    fn split_count(&self, text: &str) -> (String, Option<u32>) {
        match self.count_re.captures(text) {
            Some(caps) => (
                caps["product"].trim().to_string(),
                caps["count"].parse::<u32>().ok().filter(|n| *n > 0),
            ),
            None => (text.trim().to_string(), None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::tokenize;
    use rust_decimal_macros::dec;

    fn kinds(text: &str) -> Vec<LineKind> {
        let classifier = LineClassifier::new().unwrap();
        classifier
            .classify_all(&tokenize(text))
            .into_iter()
            .map(|c| c.kind)
            .collect()
    }

    fn kind(line: &str) -> LineKind {
        kinds(line).remove(0)
    }

    #[test]
    fn test_item_name_with_count() {
        assert_eq!(
            kind("*Kiwi Guava Nocco Bcaa 33cl Påse 2"),
            LineKind::ItemName(ItemNameLine {
                product: "Kiwi Guava Nocco Bcaa 33cl Påse".to_string(),
                count: Some(2),
                marked: true,
            })
        );
    }

    #[test]
    fn test_item_name_keeps_percent() {
        match kind("*Mjölk Arla Ekologisk 3%") {
            LineKind::ItemName(item) => {
                assert_eq!(item.product, "Mjölk Arla Ekologisk 3%");
                assert_eq!(item.count, None);
            }
            other => panic!("expected item name, got {other:?}"),
        }
    }

    #[test]
    fn test_unit_price() {
        assert_eq!(kind(" 41,90"), LineKind::UnitPrice { amount: dec!(41.90) });
        assert_eq!(kind("1 234,50 kr"), LineKind::UnitPrice { amount: dec!(1234.50) });
    }

    #[test]
    fn test_valid_multi_buy_promo() {
        let LineKind::DiscountPromo(promo) = kind("Energidryck 2F25 -33,80") else {
            panic!("expected promo");
        };
        assert_eq!(promo.label, "Energidryck");
        assert_eq!(promo.raw_label, "Energidryck 2F25");
        assert_eq!(promo.printed_discount, dec!(33.80));
        assert_eq!(
            promo.token,
            MultiBuyToken::Valid(MultiBuyPromo {
                quantity: 2,
                bundle_price: dec!(25.00),
                promo_label: "Energidryck".to_string(),
            })
        );
    }

    #[test]
    fn test_malformed_multi_buy_promo() {
        for line in [
            "Frukt F27 -9,00",
            "Frukt 0F27 -9,00",
            "Frukt xF27 -9,00",
            "Frukt +2F25 -9,00",
            "Frukt 99999999999F25 -9,00",
        ] {
            let LineKind::DiscountPromo(promo) = kind(line) else {
                panic!("expected promo for {line}");
            };
            assert!(
                matches!(promo.token, MultiBuyToken::Malformed { .. }),
                "{line}: {:?}",
                promo.token
            );
            assert_eq!(promo.label, "Frukt");
        }
    }

    #[test]
    fn test_plain_discount_promo() {
        let LineKind::DiscountPromo(promo) = kind("Kampanj -5,00") else {
            panic!("expected promo");
        };
        assert_eq!(promo.label, "Kampanj");
        assert_eq!(promo.token, MultiBuyToken::Absent);
        assert_eq!(promo.printed_discount, dec!(5.00));
    }

    #[test]
    fn test_promo_starting_with_metadata_word() {
        for (line, label, printed) in [
            ("Köp 3 betala 2 -10,00", "Köp 3 betala 2", dec!(10.00)),
            ("Antal 2 för 30 -5,00", "Antal 2 för 30", dec!(5.00)),
        ] {
            let LineKind::DiscountPromo(promo) = kind(line) else {
                panic!("expected promo for {line}");
            };
            assert_eq!(promo.label, label);
            assert_eq!(promo.token, MultiBuyToken::Absent);
            assert_eq!(promo.printed_discount, printed);
        }
        assert_eq!(kind("Erhållen rabatt -15,00"), LineKind::Metadata);
        assert_eq!(kind("Varav rabatt -10,00"), LineKind::Metadata);
        assert_eq!(kind("Köp"), LineKind::Metadata);
    }

    #[test]
    fn test_bare_discount() {
        let LineKind::DiscountPromo(promo) = kind("-5,00") else {
            panic!("expected promo");
        };
        assert!(promo.label.is_empty());
    }

    #[test]
    fn test_hyphenated_name_is_not_promo() {
        assert!(matches!(kind("Coca-Cola Zero"), LineKind::ItemName(_)));
    }

    #[test]
    fn test_measure_lines() {
        assert_eq!(
            kind("1,024 kg x 29,95 kr/kg 30,67"),
            LineKind::Measure(MeasureLine {
                quantity: dec!(1.024),
                unit: MeasureUnit::Kilogram,
                unit_price: dec!(29.95),
                total: Some(dec!(30.67)),
            })
        );
        assert_eq!(
            kind("2 st x 12,50"),
            LineKind::Measure(MeasureLine {
                quantity: dec!(2),
                unit: MeasureUnit::Piece,
                unit_price: dec!(12.50),
                total: None,
            })
        );
    }

    #[test]
    fn test_inline_item() {
        assert_eq!(
            kind("Gurka 12,95"),
            LineKind::InlineItem {
                product: "Gurka".to_string(),
                count: None,
                amount: dec!(12.95),
            }
        );
        // "12 39,90" is not a grouped thousand.
        assert_eq!(
            kind("Ägg 12 39,90"),
            LineKind::InlineItem {
                product: "Ägg".to_string(),
                count: Some(12),
                amount: dec!(39.90),
            }
        );
    }

    #[test]
    fn test_total_and_metadata() {
        assert_eq!(kind("Totalt 144,00 SEK"), LineKind::Total { amount: dec!(144.00) });
        assert_eq!(kind("Att betala: 89,00"), LineKind::Total { amount: dec!(89.00) });
        assert_eq!(kind("Summa moms 12,00"), LineKind::Metadata);
        assert_eq!(kind("Moms % Moms Netto Brutto"), LineKind::Metadata);
        assert_eq!(kind("2024-10-12 14:32"), LineKind::Metadata);
        assert_eq!(kind("Kortnummer ************1234"), LineKind::Metadata);
    }

    #[test]
    fn test_blank_and_unknown() {
        assert_eq!(kinds("\n---\n"), vec![LineKind::Blank, LineKind::Unknown]);
    }
}
