use crate::value_objects::equity_point::EquityPoint;
use crate::value_objects::trade::Trade;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Terminal record of one simulation run. Every field is always present so
/// downstream readers get a stable shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestResult {
    pub symbol: String,
    pub interval: String,
    pub strategy: String,
    pub start_date: String,
    pub end_date: String,
    pub bars_processed: usize,
    pub initial_balance: f64,
    pub final_balance: f64,
    pub profit_loss: f64,
    pub profit_loss_percent: f64,
    pub max_drawdown: f64,
    pub max_drawdown_percent: f64,
    pub total_trades: usize,
    pub closed_trades: usize,
    pub winning_trades: usize,
    pub win_rate: f64,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
}

impl BacktestResult {
    pub fn buy_count(&self) -> usize {
        self.trades.iter().filter(|t| t.is_buy()).count()
    }

    pub fn sell_count(&self) -> usize {
        self.trades.iter().filter(|t| t.is_sell()).count()
    }
}

/// RFC 3339 rendering of an epoch-seconds timestamp; falls back to the raw
/// number when it is outside chrono's range.
pub fn format_timestamp(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp(timestamp, 0)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_else(|| timestamp.to_string())
}

#[cfg(test)]
mod tests {
    use super::format_timestamp;

    #[test]
    fn formats_epoch_seconds_as_rfc3339() {
        assert_eq!(format_timestamp(0), "1970-01-01T00:00:00+00:00");
        assert_eq!(format_timestamp(i64::MAX), i64::MAX.to_string());
    }
}
