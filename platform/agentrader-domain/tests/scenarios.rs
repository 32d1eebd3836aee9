use agentrader_domain::entities::metrics::{drawdown_of, MetricsState};
use agentrader_domain::entities::price_series::PriceSeries;
use agentrader_domain::services::engine::backtest::BacktestSimulator;
use agentrader_domain::services::strategy::{BuyAndHold, HoldStrategy, SmaCrossover};
use agentrader_domain::value_objects::candle::Candle;
use agentrader_domain::value_objects::equity_point::EquityPoint;
use agentrader_domain::value_objects::trade::{TradeReason, TradeType};
use agentrader_domain::BacktestError;

const HOUR: i64 = 3_600;
const START: i64 = 1_704_067_200; // 2024-01-01T00:00:00Z

fn flat_series(prices: &[f64]) -> PriceSeries {
    let candles = prices
        .iter()
        .enumerate()
        .map(|(idx, price)| Candle::flat(START + idx as i64 * HOUR, *price, 10.0))
        .collect();
    PriceSeries::new("BTCUSDT", "1h", candles).expect("valid series")
}

fn linear(from: f64, to: f64, bars: usize) -> Vec<f64> {
    let step = (to - from) / (bars - 1) as f64;
    (0..bars).map(|idx| from + step * idx as f64).collect()
}

#[test]
fn flat_market_never_trades() {
    let series = flat_series(&[100.0; 60]);
    let mut sma = SmaCrossover::new(5, 20).expect("sma");
    let result = BacktestSimulator::new("flat")
        .run(&series, 10_000.0, &mut sma)
        .expect("run");

    assert!(result.trades.is_empty());
    assert_eq!(result.final_balance, 10_000.0);
    assert_eq!(result.profit_loss, 0.0);
    assert_eq!(result.profit_loss_percent, 0.0);
    assert_eq!(result.max_drawdown, 0.0);
    assert_eq!(result.equity_curve.len(), 60);
    assert_eq!(result.bars_processed, 60);
}

#[test]
fn rising_market_buys_once_and_liquidates_at_the_end() {
    let prices = linear(100.0, 200.0, 60);
    let series = flat_series(&prices);
    let mut sma = SmaCrossover::new(5, 20).expect("sma");
    let result = BacktestSimulator::new("rise")
        .run(&series, 10_000.0, &mut sma)
        .expect("run");

    assert_eq!(result.buy_count(), 1);
    assert_eq!(result.sell_count(), 1);

    let buy = &result.trades[0];
    assert_eq!(buy.trade_type, TradeType::Buy);
    // first bar on which the long average exists in the visible history
    assert_eq!(buy.timestamp, series.candles()[20].timestamp);
    assert_eq!(buy.price, series.candles()[20].open);

    let sell = &result.trades[1];
    assert_eq!(sell.trade_type, TradeType::Sell);
    assert_eq!(sell.reason, TradeReason::ForcedLiquidation);
    assert!((sell.price - 200.0).abs() < 1e-9);
    assert_eq!(sell.timestamp, series.last().timestamp);

    assert!(result.profit_loss > 0.0);
    assert!(result.profit_loss_percent > 0.0);
    assert_eq!(result.closed_trades, 1);
    assert_eq!(result.winning_trades, 1);
    assert_eq!(result.win_rate, 1.0);
}

#[test]
fn malformed_candle_is_rejected_before_running() {
    let mut candles: Vec<Candle> = (0..5)
        .map(|idx| Candle::flat(START + idx * HOUR, 100.0, 1.0))
        .collect();
    candles[3].close = 105.0;
    candles[3].high = 101.0;

    let err = PriceSeries::new("BTCUSDT", "1h", candles).expect_err("malformed");
    match err {
        BacktestError::MalformedData(message) => assert!(message.contains("candle 3")),
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn zero_price_candle_is_rejected_before_running() {
    let candles: Vec<Candle> = [100.0, 100.0, 0.0, 50.0]
        .iter()
        .enumerate()
        .map(|(idx, price)| Candle::flat(START + idx as i64 * HOUR, *price, 1.0))
        .collect();

    let err = PriceSeries::new("BTCUSDT", "1h", candles).expect_err("zero price");
    match err {
        BacktestError::MalformedData(message) => {
            assert!(message.contains("candle 2"), "{message}");
            assert!(message.contains("must be > 0"), "{message}");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[test]
fn zero_balance_is_an_invalid_configuration() {
    let series = flat_series(&[100.0; 10]);
    let err = BacktestSimulator::new("zero")
        .run(&series, 0.0, &mut BuyAndHold)
        .expect_err("zero balance");
    assert!(matches!(err, BacktestError::InvalidConfiguration(_)));
}

#[test]
fn drawdown_percent_is_relative_to_the_running_peak() {
    let tracker = drawdown_of(&[1000.0, 1200.0, 900.0, 1100.0]);
    assert_eq!(tracker.max_drawdown(), 300.0);
    assert_eq!(tracker.max_drawdown_percent(), 25.0);

    let mut state = MetricsState::new();
    for (idx, equity) in [1000.0, 1200.0, 900.0, 1100.0].into_iter().enumerate() {
        state.record_equity(EquityPoint {
            timestamp: idx as i64,
            equity,
            cash: equity,
            quantity: 0.0,
            position_flag: false,
        });
    }
    let summary = state.summary();
    assert_eq!(summary.max_drawdown, 300.0);
    assert_eq!(summary.max_drawdown_percent, 25.0);
}

#[test]
fn simulated_drawdown_matches_the_equity_curve() {
    let series = flat_series(&[100.0, 100.0, 120.0, 90.0, 110.0]);
    let result = BacktestSimulator::new("dd")
        .run(&series, 1_000.0, &mut BuyAndHold)
        .expect("run");

    // long from bar 1 at 100: equity 1000, 1000, 1200, 900, 1100
    assert_eq!(result.max_drawdown, 300.0);
    assert_eq!(result.max_drawdown_percent, 25.0);
    assert_eq!(result.final_balance, 1_100.0);
}

#[test]
fn single_bar_series_is_a_no_op() {
    let series = flat_series(&[42.0]);
    let result = BacktestSimulator::new("one")
        .run(&series, 500.0, &mut BuyAndHold)
        .expect("run");

    assert!(result.trades.is_empty());
    assert_eq!(result.final_balance, 500.0);
    assert_eq!(result.max_drawdown, 0.0);
    assert_eq!(result.equity_curve.len(), 1);
    assert_eq!(result.start_date, result.end_date);
}

#[test]
fn repeated_runs_are_identical() {
    let mut prices = linear(100.0, 180.0, 30);
    prices.extend(linear(180.0, 90.0, 30));
    let series = flat_series(&prices);
    let simulator = BacktestSimulator::new("again");

    let mut first_sma = SmaCrossover::new(3, 8).expect("sma");
    let first = simulator
        .run(&series, 2_500.0, &mut first_sma)
        .expect("first");
    let mut second_sma = SmaCrossover::new(3, 8).expect("sma");
    let second = simulator
        .run(&series, 2_500.0, &mut second_sma)
        .expect("second");

    assert_eq!(first, second);
    assert!(first.sell_count() >= 1);
}

#[test]
fn hold_strategy_keeps_cash_untouched() {
    let prices = linear(50.0, 10.0, 40);
    let series = flat_series(&prices);
    let result = BacktestSimulator::new("hold")
        .run(&series, 1_234.5, &mut HoldStrategy)
        .expect("run");

    assert!(result.trades.is_empty());
    assert!(result.equity_curve.iter().all(|p| p.equity == 1_234.5));
    assert_eq!(result.strategy, "hold");
}

#[test]
fn date_window_is_inclusive() {
    let series = flat_series(&linear(10.0, 20.0, 11));
    let window = series
        .between(Some(START + 2 * HOUR), Some(START + 5 * HOUR))
        .expect("window");
    assert_eq!(window.len(), 4);
    assert_eq!(window.first().timestamp, START + 2 * HOUR);
    assert_eq!(window.last().timestamp, START + 5 * HOUR);

    let err = series
        .between(Some(START + 100 * HOUR), None)
        .expect_err("empty window");
    assert_eq!(err, BacktestError::EmptySeries);
}
