pub mod candle_aggregator;
pub mod interval;
pub mod tick_ingest;

pub use candle_aggregator::{Candle, CandleAggregator};
pub use interval::Interval;
pub use tick_ingest::TickIngest;
