// Key and topic naming shared with downstream dashboards and alerting.

use crate::market_data::Interval;

pub const MARKET_SUMMARY_KEY: &str = "market_summary";

const TICK_TOPIC_PREFIX: &str = "tick_updates:";
const STATUS_CHANGE_TOPIC_PREFIX: &str = "status_change:";

pub fn analysis_key(symbol: &str, interval: Interval) -> String {
    format!("analysis:{symbol}:{interval}")
}

pub fn market_status_key(symbol: &str) -> String {
    format!("market_status:{symbol}")
}

pub fn tick_topic(symbol: &str) -> String {
    format!("{TICK_TOPIC_PREFIX}{symbol}")
}

pub fn status_change_topic(symbol: &str) -> String {
    format!("{STATUS_CHANGE_TOPIC_PREFIX}{symbol}")
}

/// Symbol encoded in a `tick_updates:{symbol}` topic.
pub fn symbol_from_tick_topic(topic: &str) -> Option<&str> {
    topic
        .strip_prefix(TICK_TOPIC_PREFIX)
        .filter(|symbol| !symbol.is_empty())
}
