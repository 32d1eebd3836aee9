use thiserror::Error;

/// Fatal errors raised by the simulator. A backtest is a deterministic offline
/// replay, so none of these are retried and no partial result is produced.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BacktestError {
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("malformed data: {0}")]
    MalformedData(String),

    #[error("empty series: at least one candle is required")]
    EmptySeries,
}

impl BacktestError {
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfiguration(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedData(message.into())
    }
}
