use crate::value_objects::equity_point::EquityPoint;
use crate::value_objects::trade::Trade;
use std::collections::HashMap;

/// Running-peak drawdown tracker. The reported percentage is relative to the
/// peak at the time of the worst drawdown, not to the starting equity.
#[derive(Debug, Clone, Copy, Default)]
pub struct DrawdownTracker {
    peak: Option<f64>,
    max_drawdown: f64,
    max_drawdown_percent: f64,
}

impl DrawdownTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, equity: f64) {
        let peak = match self.peak {
            Some(peak) if peak >= equity => peak,
            _ => equity,
        };
        self.peak = Some(peak);

        let drawdown = peak - equity;
        if drawdown > self.max_drawdown {
            self.max_drawdown = drawdown;
            self.max_drawdown_percent = if peak > 0.0 {
                drawdown / peak * 100.0
            } else {
                0.0
            };
        }
    }

    pub fn peak(&self) -> Option<f64> {
        self.peak
    }

    pub fn max_drawdown(&self) -> f64 {
        self.max_drawdown
    }

    pub fn max_drawdown_percent(&self) -> f64 {
        self.max_drawdown_percent
    }
}

pub fn drawdown_of(equity: &[f64]) -> DrawdownTracker {
    let mut tracker = DrawdownTracker::new();
    for value in equity {
        tracker.record(*value);
    }
    tracker
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TradeStats {
    pub total_trades: usize,
    pub closed_trades: usize,
    pub winning_trades: usize,
    pub win_rate: f64,
}

/// Win rate over SELL trades. A SELL wins when its proceeds exceed the cost of
/// the BUY it closes.
pub fn trade_stats(trades: &[Trade]) -> TradeStats {
    let costs: HashMap<u64, f64> = trades
        .iter()
        .filter(|t| t.is_buy())
        .filter_map(|t| t.cost.map(|cost| (t.id, cost)))
        .collect();

    let mut closed = 0usize;
    let mut wins = 0usize;
    for trade in trades.iter().filter(|t| t.is_sell()) {
        closed += 1;
        let entry_cost = trade.entry_trade_id.and_then(|id| costs.get(&id).copied());
        let won = match (trade.proceeds, entry_cost) {
            (Some(proceeds), Some(cost)) => proceeds > cost,
            _ => trade.pnl.is_some_and(|pnl| pnl > 0.0),
        };
        if won {
            wins += 1;
        }
    }

    TradeStats {
        total_trades: trades.len(),
        closed_trades: closed,
        winning_trades: wins,
        win_rate: if closed == 0 {
            0.0
        } else {
            wins as f64 / closed as f64
        },
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsSummary {
    pub bars_processed: usize,
    pub trades: TradeStats,
    pub max_drawdown: f64,
    pub max_drawdown_percent: f64,
}

/// Accumulates the equity curve and trade log of one run.
#[derive(Debug, Default)]
pub struct MetricsState {
    equity_curve: Vec<EquityPoint>,
    trades: Vec<Trade>,
    drawdown: DrawdownTracker,
}

impl MetricsState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_equity(&mut self, point: EquityPoint) {
        self.drawdown.record(point.equity);
        self.equity_curve.push(point);
    }

    pub fn record_trade(&mut self, trade: Trade) {
        self.trades.push(trade);
    }

    pub fn equity_curve(&self) -> &[EquityPoint] {
        &self.equity_curve
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn drawdown(&self) -> &DrawdownTracker {
        &self.drawdown
    }

    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            bars_processed: self.equity_curve.len(),
            trades: trade_stats(&self.trades),
            max_drawdown: self.drawdown.max_drawdown(),
            max_drawdown_percent: self.drawdown.max_drawdown_percent(),
        }
    }

    pub fn into_parts(self) -> (Vec<EquityPoint>, Vec<Trade>, MetricsSummary) {
        let summary = self.summary();
        (self.equity_curve, self.trades, summary)
    }
}
