//! Seam for the model-based fallback parser.
//!
//! The structured parser calls out only when its own confidence is too low
//! or a window could not be parsed. Implementations live outside this crate
//! (see `kvitto-cli` for the LLM-backed one).

use futures_util::future::BoxFuture;
use kvitto_core::{Anomaly, FallbackError, ReceiptItem};
use serde::{Deserialize, Serialize};

/// What a fallback parse hands back.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FallbackOutput {
    #[serde(default)]
    pub items: Vec<ReceiptItem>,
    #[serde(default)]
    pub anomalies: Vec<Anomaly>,
}

pub trait FallbackParser: Send + Sync {
    /// Parse `raw_text` into items. The orchestrator bounds the call with its
    /// own timeout and may drop the future on cancellation.
    fn fallback_parse<'a>(
        &'a self,
        raw_text: &'a str,
    ) -> BoxFuture<'a, Result<FallbackOutput, FallbackError>>;
}
