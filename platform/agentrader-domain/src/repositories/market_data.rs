use crate::services::ohlcv::DataQualityReport;
use crate::value_objects::candle::Candle;

#[derive(Debug, Clone)]
pub struct OhlcvQuery {
    pub symbol: String,
    pub interval: String,
    pub expected_step_seconds: Option<i64>,
    /// Inclusive lower bound, epoch seconds.
    pub start: Option<i64>,
    /// Inclusive upper bound, epoch seconds.
    pub end: Option<i64>,
}

pub trait MarketDataRepository {
    fn load_ohlcv(&self, query: &OhlcvQuery) -> Result<(Vec<Candle>, DataQualityReport), String>;
}
