//! Parse driver: tokenize → classify → resolve → normalize, with an escape
//! to the AI fallback when structured parsing is not trustworthy.
//!
//! ```text
//! Idle → Tokenizing → Classifying → Resolving → Normalizing → Done
//!                                        │            ▲
//!                                        └► AiFallback┘
//! ```
//!
//! Whatever happens per line, `parse` returns a receipt. Only contract
//! violations (empty store id, oversized input) are errors.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use kvitto_core::money::{checked_sum, format_kr, normalize};
use kvitto_core::{
    Anomaly, AnomalyKind, FallbackError, ParseError, ParsedReceipt, ParserMetadata, ReceiptItem,
    Severity,
};
use rust_decimal::Decimal;
use tracing::{debug, info, trace, warn};

use crate::anomaly::AnomalyReporter;
use crate::classify::{LineClassification, LineClassifier, LineKind};
use crate::config::ParserConfig;
use crate::fallback::{FallbackOutput, FallbackParser};
use crate::grammar::{Grammar, GrammarRegistry, Window};
use crate::normalizer::{normalize_item, sanitize_fallback_item};
use crate::resolver::{
    ResolvedItem, resolve_measured, resolve_multi_buy, resolve_plain_discount, resolve_priced,
};
use crate::tokenizer::tokenize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParseStage {
    Idle,
    Tokenizing,
    Classifying,
    Resolving,
    Normalizing,
    AiFallback,
    Done,
}

impl ParseStage {
    pub fn can_advance_to(self, next: ParseStage) -> bool {
        use ParseStage::*;
        matches!(
            (self, next),
            (Idle, Tokenizing)
                | (Tokenizing, Classifying)
                | (Classifying, Resolving)
                | (Classifying, Done)
                | (Resolving, Normalizing)
                | (Resolving, AiFallback)
                | (AiFallback, Normalizing)
                | (Normalizing, Done)
        )
    }
}

#[derive(Debug)]
struct StageTracker {
    stage: ParseStage,
}

impl StageTracker {
    fn new() -> Self {
        Self {
            stage: ParseStage::Idle,
        }
    }

    fn advance(&mut self, next: ParseStage) {
        debug_assert!(
            self.stage.can_advance_to(next),
            "invalid parse transition {:?} -> {:?}",
            self.stage,
            next
        );
        debug!(from = ?self.stage, to = ?next, "parse stage");
        self.stage = next;
    }
}

/// Why the AI fallback was invoked.
#[derive(Debug, Clone, PartialEq)]
enum FallbackTrigger {
    LowConfidence { fraction: f64 },
    DeferredWindows { count: usize },
}

/// Result of running grammar rules over the classified lines.
#[derive(Debug, Default)]
struct Resolution {
    items: Vec<ResolvedItem>,
    /// Lines covered by a matched rule, deferred windows included.
    consumed: usize,
    /// Raw text of windows handed to the fallback.
    deferred: Vec<String>,
    deferred_windows: usize,
}

/// Structured receipt parser. Cheap to share: the registry and compiled
/// patterns are read-only.
pub struct ReceiptParser {
    registry: Arc<GrammarRegistry>,
    classifier: LineClassifier,
    config: ParserConfig,
    fallback: Option<Arc<dyn FallbackParser>>,
}

impl ReceiptParser {
    pub fn new(registry: Arc<GrammarRegistry>, config: ParserConfig) -> Result<Self, ParseError> {
        Ok(Self {
            registry,
            classifier: LineClassifier::new()?,
            config,
            fallback: None,
        })
    }

    /// Parser over the built-in grammars with default settings.
    pub fn builtin() -> Result<Self, ParseError> {
        Self::new(Arc::new(GrammarRegistry::builtin()), ParserConfig::default())
    }

    pub fn with_fallback(mut self, fallback: Arc<dyn FallbackParser>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn registry(&self) -> &GrammarRegistry {
        &self.registry
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Parse one receipt.
    pub async fn parse(&self, raw_text: &str, store_id: &str) -> Result<ParsedReceipt, ParseError> {
        self.parse_with_cancel(raw_text, store_id, std::future::pending::<()>())
            .await
    }

    /// Like [`parse`](Self::parse), but a fallback call still in flight when
    /// `cancel` completes is abandoned and recorded as failed.
    pub async fn parse_with_cancel<C>(
        &self,
        raw_text: &str,
        store_id: &str,
        cancel: C,
    ) -> Result<ParsedReceipt, ParseError>
    where
        C: Future<Output = ()>,
    {
        let store_name = store_id.trim();
        if store_name.is_empty() {
            return Err(ParseError::EmptyStoreId);
        }
        if raw_text.len() > self.config.max_input_bytes {
            return Err(ParseError::InputTooLarge {
                len: raw_text.len(),
                max: self.config.max_input_bytes,
            });
        }

        let grammar = self.registry.grammar_for(store_name);
        let mut stages = StageTracker::new();
        let mut reporter = AnomalyReporter::new();
        let mut fallback_used = false;

        stages.advance(ParseStage::Tokenizing);
        let lines = tokenize(raw_text);

        stages.advance(ParseStage::Classifying);
        let classified = self.classifier.classify_all(&lines);
        let printed_total = printed_total(&classified);

        let content = content_lines(&classified);
        if content == 0 {
            reporter.record(Anomaly::new(
                AnomalyKind::EmptyReceipt,
                Severity::Medium,
                "receipt text has no content lines",
            ));
            stages.advance(ParseStage::Done);
            return Ok(self.finish(store_name, Vec::new(), printed_total, reporter, false));
        }

        stages.advance(ParseStage::Resolving);
        let resolution = self.resolve(grammar, &classified, &mut reporter);
        let fraction = resolution.consumed as f64 / content as f64;
        debug!(store = store_name, grammar = grammar.id, fraction, "resolved lines");
        let structured: Vec<ReceiptItem> = resolution.items.iter().map(normalize_item).collect();

        let items = if fraction < self.config.min_classified_fraction {
            reporter.record(Anomaly::new(
                AnomalyKind::LowConfidence,
                Severity::Medium,
                format!(
                    "only {:.0}% of lines matched a {} rule (minimum {:.0}%)",
                    fraction * 100.0,
                    grammar.id,
                    self.config.min_classified_fraction * 100.0
                ),
            ));

            stages.advance(ParseStage::AiFallback);
            let trigger = FallbackTrigger::LowConfidence { fraction };
            let output = self.run_fallback(raw_text, &trigger, cancel, &mut reporter).await;

            stages.advance(ParseStage::Normalizing);
            match output {
                Some(output) => {
                    fallback_used = true;
                    self.merge_fallback(Vec::new(), output, &mut reporter)
                }
                // Best effort: keep whatever the rules recovered.
                None => structured,
            }
        } else if resolution.deferred_windows > 0 {
            stages.advance(ParseStage::AiFallback);
            let trigger = FallbackTrigger::DeferredWindows {
                count: resolution.deferred_windows,
            };
            let deferred_text = resolution.deferred.join("\n");
            let output = self
                .run_fallback(&deferred_text, &trigger, cancel, &mut reporter)
                .await;

            stages.advance(ParseStage::Normalizing);
            match output {
                Some(output) => {
                    fallback_used = true;
                    self.merge_fallback(structured, output, &mut reporter)
                }
                None => structured,
            }
        } else {
            stages.advance(ParseStage::Normalizing);
            structured
        };

        if items.is_empty() {
            reporter.record(Anomaly::new(
                AnomalyKind::ParseFailed,
                Severity::Critical,
                format!("no items recovered from {content} content line(s)"),
            ));
        }

        stages.advance(ParseStage::Done);
        Ok(self.finish(store_name, items, printed_total, reporter, fallback_used))
    }

    /// Walk the classified lines with `grammar`. First matching rule wins
    /// per window; consumed lines are never revisited.
    fn resolve(
        &self,
        grammar: &Grammar,
        lines: &[LineClassification],
        reporter: &mut AnomalyReporter,
    ) -> Resolution {
        let mut out = Resolution::default();
        let mut i = 0;

        while i < lines.len() {
            let window = &lines[i..];
            let Some((rule, matched, width)) = grammar.match_window(window) else {
                if !matches!(lines[i].kind, LineKind::Blank) {
                    reporter.record(Anomaly::new(
                        AnomalyKind::UnmatchedLine,
                        Severity::Low,
                        format!(
                            "line {} ({}) matched no {} rule: {}",
                            lines[i].index + 1,
                            lines[i].kind.tag(),
                            grammar.id,
                            lines[i].raw.trim()
                        ),
                    ));
                }
                i += 1;
                continue;
            };
            trace!(line = lines[i].index + 1, rule = rule.name, width, "rule matched");

            match matched {
                Window::MultiBuy {
                    head, multi_buy, ..
                } => out.items.push(resolve_multi_buy(&head, &multi_buy, reporter)),
                Window::Discount {
                    head,
                    label,
                    printed_discount,
                } => out
                    .items
                    .push(resolve_plain_discount(&head, &label, printed_discount, reporter)),
                Window::Measured { item, measure } => {
                    match resolve_measured(&item, &measure, reporter) {
                        Some(resolved) => out.items.push(resolved),
                        None => {
                            out.deferred_windows += 1;
                            out.deferred
                                .extend(window[..width].iter().map(|l| l.raw.clone()));
                        }
                    }
                }
                Window::Priced { head } => out.items.push(resolve_priced(&head)),
                Window::Deferred { head, token } => {
                    reporter.record(Anomaly::new(
                        AnomalyKind::PatternFallback,
                        Severity::Medium,
                        format!(
                            "unreadable multi-buy token '{}' for '{}' on line {}; deferred to fallback",
                            token,
                            head.product,
                            lines[i].index + 1
                        ),
                    ));
                    out.deferred_windows += 1;
                    out.deferred
                        .extend(window[..width].iter().map(|l| l.raw.clone()));
                }
                Window::Total(_) | Window::Metadata => {}
            }

            out.consumed += width;
            i += width;
        }

        out
    }

    /// Call the fallback collaborator, bounded by the configured timeout and
    /// the caller's cancellation. Failures become anomalies.
    async fn run_fallback<C>(
        &self,
        text: &str,
        trigger: &FallbackTrigger,
        cancel: C,
        reporter: &mut AnomalyReporter,
    ) -> Option<FallbackOutput>
    where
        C: Future<Output = ()>,
    {
        let result = match &self.fallback {
            None => Err(FallbackError::NotConfigured),
            Some(fallback) => {
                let secs = self.config.fallback_timeout_secs;
                info!(?trigger, timeout_secs = secs, "invoking AI fallback");
                tokio::select! {
                    res = tokio::time::timeout(Duration::from_secs(secs), fallback.fallback_parse(text)) => {
                        res.unwrap_or(Err(FallbackError::Timeout(secs)))
                    }
                    _ = cancel => Err(FallbackError::Cancelled),
                }
            }
        };

        match result {
            Ok(output) => {
                info!(items = output.items.len(), "AI fallback succeeded");
                reporter.record(Anomaly::new(
                    AnomalyKind::FallbackUsed,
                    Severity::Low,
                    match trigger {
                        FallbackTrigger::LowConfidence { fraction } => format!(
                            "structured confidence {:.0}% too low; items from AI fallback",
                            fraction * 100.0
                        ),
                        FallbackTrigger::DeferredWindows { count } => {
                            format!("{count} deferred window(s) parsed by AI fallback")
                        }
                    },
                ));
                Some(output)
            }
            Err(err) => {
                warn!(error = %err, "AI fallback failed");
                reporter.record(Anomaly::new(
                    AnomalyKind::FallbackFailed,
                    Severity::Critical,
                    err.to_string(),
                ));
                None
            }
        }
    }

    fn merge_fallback(
        &self,
        mut items: Vec<ReceiptItem>,
        output: FallbackOutput,
        reporter: &mut AnomalyReporter,
    ) -> Vec<ReceiptItem> {
        reporter.extend(output.anomalies);
        items.extend(
            output
                .items
                .into_iter()
                .map(|item| sanitize_fallback_item(item, reporter)),
        );
        items
    }

    fn finish(
        &self,
        store_name: &str,
        items: Vec<ReceiptItem>,
        printed_total: Option<Decimal>,
        mut reporter: AnomalyReporter,
        fallback_used: bool,
    ) -> ParsedReceipt {
        let items_total = checked_sum(items.iter().map(|i| i.price));
        let total_amount = match (items_total, printed_total) {
            (None, printed) => {
                reporter.record(Anomaly::new(
                    AnomalyKind::AmountOverflow,
                    Severity::Medium,
                    "item prices overflow when summed; total not reconciled",
                ));
                normalize(printed.unwrap_or(Decimal::ZERO))
            }
            (Some(items_total), Some(printed)) => {
                if (printed - items_total).abs() > self.config.total_tolerance {
                    reporter.record(Anomaly::new(
                        AnomalyKind::TotalMismatch,
                        Severity::Low,
                        format!(
                            "printed total {} differs from item sum {}",
                            format_kr(printed),
                            format_kr(items_total)
                        ),
                    ));
                }
                printed
            }
            (Some(items_total), None) => items_total,
        };

        ParsedReceipt {
            store_name: store_name.to_string(),
            total_amount,
            items,
            parser_metadata: ParserMetadata {
                anomalies: reporter.drain(),
                fallback_used,
            },
        }
    }
}

fn content_lines(lines: &[LineClassification]) -> usize {
    lines
        .iter()
        .filter(|l| !matches!(l.kind, LineKind::Blank))
        .count()
}

/// Last printed total on the receipt, if any.
fn printed_total(lines: &[LineClassification]) -> Option<Decimal> {
    lines.iter().rev().find_map(|l| match l.kind {
        LineKind::Total { amount } => Some(amount),
        _ => None,
    })
}
