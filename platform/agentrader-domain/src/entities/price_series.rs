use crate::error::BacktestError;
use crate::value_objects::candle::Candle;

/// Validated, strictly time-ordered candles for one symbol and interval.
/// Read-only once built.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceSeries {
    symbol: String,
    interval: String,
    candles: Vec<Candle>,
}

impl PriceSeries {
    pub fn new(
        symbol: impl Into<String>,
        interval: impl Into<String>,
        candles: Vec<Candle>,
    ) -> Result<Self, BacktestError> {
        if candles.is_empty() {
            return Err(BacktestError::EmptySeries);
        }

        let mut prev_ts: Option<i64> = None;
        for (idx, candle) in candles.iter().enumerate() {
            candle.check().map_err(|reason| {
                BacktestError::malformed(format!(
                    "candle {idx} (timestamp {}): {reason}",
                    candle.timestamp
                ))
            })?;

            if let Some(prev) = prev_ts {
                if candle.timestamp == prev {
                    return Err(BacktestError::malformed(format!(
                        "candle {idx}: duplicate timestamp {}",
                        candle.timestamp
                    )));
                }
                if candle.timestamp < prev {
                    return Err(BacktestError::malformed(format!(
                        "candle {idx}: timestamp {} is before previous {prev}",
                        candle.timestamp
                    )));
                }
            }
            prev_ts = Some(candle.timestamp);
        }

        Ok(Self {
            symbol: symbol.into(),
            interval: interval.into(),
            candles,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn interval(&self) -> &str {
        &self.interval
    }

    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    pub fn len(&self) -> usize {
        self.candles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    pub fn first(&self) -> &Candle {
        &self.candles[0]
    }

    pub fn last(&self) -> &Candle {
        &self.candles[self.candles.len() - 1]
    }

    /// Sub-series restricted to `[start, end]` (inclusive, epoch seconds).
    pub fn between(&self, start: Option<i64>, end: Option<i64>) -> Result<Self, BacktestError> {
        let candles: Vec<Candle> = self
            .candles
            .iter()
            .filter(|c| start.map_or(true, |s| c.timestamp >= s))
            .filter(|c| end.map_or(true, |e| c.timestamp <= e))
            .copied()
            .collect();
        if candles.is_empty() {
            return Err(BacktestError::EmptySeries);
        }
        Ok(Self {
            symbol: self.symbol.clone(),
            interval: self.interval.clone(),
            candles,
        })
    }
}
