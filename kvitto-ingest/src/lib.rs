//! Structured receipt parsing.
//!
//! Raw receipt text goes through [`tokenizer`], [`classify`] and a store
//! [`grammar`], then [`resolver`] and [`normalizer`] turn matched windows
//! into items. [`orchestrator::ReceiptParser`] drives the pipeline and
//! decides when to call a [`fallback::FallbackParser`].

pub mod anomaly;
pub mod classify;
pub mod config;
pub mod fallback;
pub mod grammar;
pub mod grammars;
pub mod normalizer;
pub mod orchestrator;
pub mod resolver;
pub mod tokenizer;

pub use anomaly::AnomalyReporter;
pub use classify::{LineClassification, LineClassifier, LineKind, MultiBuyPromo};
pub use config::ParserConfig;
pub use fallback::{FallbackOutput, FallbackParser};
pub use grammar::{Grammar, GrammarRegistry, PatternRule, RuleKind, normalize_store_id};
pub use orchestrator::{ParseStage, ReceiptParser};
pub use resolver::{QuantityHint, ResolvedItem};
