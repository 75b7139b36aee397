// =============================================================================
// Market Status — discrete BUY/SELL/NEUTRAL verdict per symbol
// =============================================================================

pub mod evaluator;
pub mod orchestrator;

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use orchestrator::{AnalysisOrchestrator, OrchestratorSettings};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StatusKind {
    Buy,
    Sell,
    Neutral,
    Error,
}

impl fmt::Display for StatusKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buy => write!(f, "BUY"),
            Self::Sell => write!(f, "SELL"),
            Self::Neutral => write!(f, "NEUTRAL"),
            Self::Error => write!(f, "ERROR"),
        }
    }
}

/// The published verdict for one symbol.
///
/// `status`, `confidence` and `signals` are only ever set by a full
/// evaluation; tick updates patch `current_price` and `as_of` alone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketStatus {
    pub symbol: String,
    pub status: StatusKind,
    /// 0–100.
    pub confidence: u8,
    pub signals: Vec<String>,
    pub current_price: f64,
    pub as_of: DateTime<Utc>,
}

impl MarketStatus {
    /// Status recorded when evaluation itself failed.
    pub fn error(symbol: &str, message: String, current_price: f64, as_of: DateTime<Utc>) -> Self {
        Self {
            symbol: symbol.to_string(),
            status: StatusKind::Error,
            confidence: 0,
            signals: vec![message],
            current_price,
            as_of,
        }
    }

    /// Copy with a fresher price; every status-bearing field is kept.
    pub fn with_price(&self, price: f64, as_of: DateTime<Utc>) -> Self {
        Self {
            current_price: price,
            as_of,
            ..self.clone()
        }
    }
}

/// Event published on `status_change:{symbol}` when the discrete status flips.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusChange {
    pub symbol: String,
    pub old_status: StatusKind,
    pub new_status: StatusKind,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
}
