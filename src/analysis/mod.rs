pub mod cache;
pub mod result;
pub mod service;

pub use result::AnalysisResult;
pub use service::{MarketDataService, ServiceSettings};
