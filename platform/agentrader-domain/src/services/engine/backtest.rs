use crate::entities::account::Account;
use crate::entities::metrics::MetricsState;
use crate::entities::price_series::PriceSeries;
use crate::entities::result::{format_timestamp, BacktestResult};
use crate::error::BacktestError;
use crate::services::engine::observer::{NoopObserver, RunObserver};
use crate::services::strategy::DecisionSource;
use crate::value_objects::candle::Candle;
use crate::value_objects::decision::Decision;
use crate::value_objects::equity_point::EquityPoint;
use crate::value_objects::trade::{Trade, TradeReason, TradeType};
use tracing::info_span;

/// Replays a [`PriceSeries`] bar by bar with a single long/flat position.
///
/// The simulator holds no state between runs; every call to [`run`] owns its
/// account, trade log and equity curve, so independent runs can execute on
/// separate threads.
///
/// [`run`]: BacktestSimulator::run
#[derive(Debug, Clone)]
pub struct BacktestSimulator {
    run_id: String,
}

impl BacktestSimulator {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run(
        &self,
        series: &PriceSeries,
        initial_balance: f64,
        decision: &mut dyn DecisionSource,
    ) -> Result<BacktestResult, BacktestError> {
        self.run_observed(series, initial_balance, decision, &mut NoopObserver)
    }

    pub fn run_observed(
        &self,
        series: &PriceSeries,
        initial_balance: f64,
        decision: &mut dyn DecisionSource,
        observer: &mut dyn RunObserver,
    ) -> Result<BacktestResult, BacktestError> {
        if !initial_balance.is_finite() || initial_balance <= 0.0 {
            return Err(BacktestError::invalid_config(format!(
                "initial_balance must be finite and > 0 (got {initial_balance})"
            )));
        }

        let _span = info_span!(
            "backtest.run",
            run_id = %self.run_id,
            symbol = %series.symbol(),
            interval = %series.interval(),
            bars = series.len()
        )
        .entered();

        let mut replay = Replay::new(initial_balance, observer);
        let candles = series.candles();

        replay.record_equity(series.first());

        for (index, candle) in candles.iter().enumerate().skip(1) {
            let signal = decision.decide(&candles[..index]);
            replay.observer.on_decision(index, candle, signal);
            replay.apply(signal, candle);
            replay.record_equity(candle);
        }

        let last = series.last();
        if !replay.account.is_flat() {
            replay.close(last.close, last.timestamp, TradeReason::ForcedLiquidation);
        }

        let final_balance = replay.account.cash();
        let observer = replay.observer;
        let (equity_curve, trades, summary) = replay.metrics.into_parts();

        let profit_loss = final_balance - initial_balance;
        let result = BacktestResult {
            symbol: series.symbol().to_string(),
            interval: series.interval().to_string(),
            strategy: decision.name().to_string(),
            start_date: format_timestamp(series.first().timestamp),
            end_date: format_timestamp(last.timestamp),
            bars_processed: summary.bars_processed,
            initial_balance,
            final_balance,
            profit_loss,
            profit_loss_percent: profit_loss / initial_balance * 100.0,
            max_drawdown: summary.max_drawdown,
            max_drawdown_percent: summary.max_drawdown_percent,
            total_trades: summary.trades.total_trades,
            closed_trades: summary.trades.closed_trades,
            winning_trades: summary.trades.winning_trades,
            win_rate: summary.trades.win_rate,
            trades,
            equity_curve,
        };

        tracing::info!(
            strategy = %result.strategy,
            trades = result.total_trades,
            final_balance = result.final_balance,
            profit_loss_percent = result.profit_loss_percent,
            max_drawdown_percent = result.max_drawdown_percent,
            "backtest complete"
        );
        observer.on_complete(&result);
        Ok(result)
    }
}

/// Mutable state of one run.
struct Replay<'a> {
    account: Account,
    metrics: MetricsState,
    next_trade_id: u64,
    observer: &'a mut dyn RunObserver,
}

impl<'a> Replay<'a> {
    fn new(initial_balance: f64, observer: &'a mut dyn RunObserver) -> Self {
        Self {
            account: Account::new_with_cash(initial_balance),
            metrics: MetricsState::new(),
            next_trade_id: 1,
            observer,
        }
    }

    /// Signals that do not match the position state are ignored.
    fn apply(&mut self, signal: Decision, candle: &Candle) {
        match signal {
            Decision::Buy if self.account.is_flat() => self.open(candle.open, candle.timestamp),
            Decision::Sell if !self.account.is_flat() => {
                self.close(candle.open, candle.timestamp, TradeReason::Signal)
            }
            _ => {}
        }
    }

    fn open(&mut self, price: f64, timestamp: i64) {
        let id = self.next_trade_id;
        let Some((quantity, cost)) = self.account.open_long(price, timestamp, id) else {
            tracing::debug!(price, timestamp, "buy skipped: no fill possible");
            return;
        };
        self.next_trade_id += 1;

        self.push_trade(Trade {
            id,
            trade_type: TradeType::Buy,
            price,
            timestamp,
            amount: quantity,
            cost: Some(cost),
            proceeds: None,
            entry_trade_id: None,
            pnl: None,
            reason: TradeReason::Signal,
        });
    }

    fn close(&mut self, price: f64, timestamp: i64, reason: TradeReason) {
        let Some(closed) = self.account.close_long(price) else {
            return;
        };
        let id = self.next_trade_id;
        self.next_trade_id += 1;

        self.push_trade(Trade {
            id,
            trade_type: TradeType::Sell,
            price,
            timestamp,
            amount: closed.quantity,
            cost: None,
            proceeds: Some(closed.proceeds),
            entry_trade_id: Some(closed.entry_trade_id),
            pnl: Some(closed.proceeds - closed.cost),
            reason,
        });
    }

    fn push_trade(&mut self, trade: Trade) {
        tracing::debug!(
            id = trade.id,
            side = ?trade.trade_type,
            price = trade.price,
            amount = trade.amount,
            reason = ?trade.reason,
            "trade"
        );
        self.observer.on_trade(&trade);
        self.metrics.record_trade(trade);
    }

    fn record_equity(&mut self, candle: &Candle) {
        let point = EquityPoint {
            timestamp: candle.timestamp,
            equity: self.account.equity(candle.close),
            cash: self.account.cash(),
            quantity: self.account.quantity(),
            position_flag: !self.account.is_flat(),
        };
        self.observer.on_equity(&point);
        self.metrics.record_equity(point);
    }
}
