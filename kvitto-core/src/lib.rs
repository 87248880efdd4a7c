//! kvitto-core: receipt data model, money helpers and error types

pub mod error;
pub mod money;
pub mod receipt;

pub use error::{FallbackError, ParseError};
pub use money::{format_kr, normalize, parse_amount};
pub use receipt::{
    AffectedItem, Anomaly, AnomalyKind, DEFAULT_CATEGORY, ParsedReceipt, ParserMetadata,
    ReceiptItem, Severity,
};
