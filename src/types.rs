// =============================================================================
// Shared types used across the market-pulse pipeline
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::PipelineError;

/// A single trade tick for one instrument.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    pub symbol: String,
    pub price: f64,
    pub volume: u64,
    pub timestamp: DateTime<Utc>,
}

/// Tick as it is stored and published: the timestamp is still an ISO-8601
/// string and has not been validated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickRecord {
    pub price: f64,
    #[serde(default)]
    pub volume: u64,
    pub timestamp: String,
}

impl TickRecord {
    /// Validate the record into a [`Tick`] for `symbol`.
    pub fn parse(&self, symbol: &str) -> Result<Tick, PipelineError> {
        let timestamp = parse_timestamp(&self.timestamp)?;
        if !self.price.is_finite() {
            return Err(PipelineError::Malformed(format!(
                "non-finite price {} for {symbol}",
                self.price
            )));
        }
        Ok(Tick {
            symbol: symbol.to_string(),
            price: self.price,
            volume: self.volume,
            timestamp,
        })
    }
}

impl From<&Tick> for TickRecord {
    fn from(tick: &Tick) -> Self {
        Self {
            price: tick.price,
            volume: tick.volume,
            timestamp: tick.timestamp.to_rfc3339(),
        }
    }
}

/// Parse an ISO-8601 timestamp. Offsets are honoured; naive timestamps
/// (no offset) are taken as UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, PipelineError> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| naive.and_utc())
        .map_err(|e| PipelineError::Malformed(format!("bad timestamp {raw:?}: {e}")))
}
