use agentrader_domain::entities::metrics::{drawdown_of, trade_stats, TradeStats};
use agentrader_domain::entities::result::BacktestResult;
use agentrader_domain::repositories::artifacts::ArtifactReader;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info_span;

const TOLERANCE: f64 = 1e-9;

/// Metrics recomputed from the stored equity curve and trade log.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecomputedMetrics {
    pub bars_processed: usize,
    pub final_equity: Option<f64>,
    pub max_drawdown: f64,
    pub max_drawdown_percent: f64,
    pub total_trades: usize,
    pub closed_trades: usize,
    pub winning_trades: usize,
    pub win_rate: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub input_dir: PathBuf,
    pub result: BacktestResult,
    pub recomputed: RecomputedMetrics,
    pub consistent: bool,
    pub mismatches: Vec<String>,
}

pub fn generate_report(input_dir: &Path, reader: &dyn ArtifactReader) -> Result<RunReport, String> {
    let _span = info_span!("generate_report", input_dir = %input_dir.display()).entered();

    let stage_start = Instant::now();
    let result_path = input_dir.join("result.json");
    if !reader.exists(&result_path) {
        return Err(format!("missing result.json in {}", input_dir.display()));
    }

    let result = reader.read_result_json(&result_path)?;
    let recomputed = recompute(&result);
    let mismatches = compare(&result, &recomputed);
    metrics::histogram!("agentrader.report.generate_ms")
        .record(stage_start.elapsed().as_millis() as f64);
    metrics::gauge!("agentrader.report.trades").set(result.trades.len() as f64);

    if !mismatches.is_empty() {
        tracing::warn!(
            mismatches = mismatches.len(),
            "stored result disagrees with recomputed metrics"
        );
    }

    Ok(RunReport {
        input_dir: input_dir.to_path_buf(),
        consistent: mismatches.is_empty(),
        result,
        recomputed,
        mismatches,
    })
}

pub fn recompute(result: &BacktestResult) -> RecomputedMetrics {
    let equity: Vec<f64> = result.equity_curve.iter().map(|p| p.equity).collect();
    let drawdown = drawdown_of(&equity);
    let TradeStats {
        total_trades,
        closed_trades,
        winning_trades,
        win_rate,
    } = trade_stats(&result.trades);

    RecomputedMetrics {
        bars_processed: result.equity_curve.len(),
        final_equity: equity.last().copied(),
        max_drawdown: drawdown.max_drawdown(),
        max_drawdown_percent: drawdown.max_drawdown_percent(),
        total_trades,
        closed_trades,
        winning_trades,
        win_rate,
    }
}

fn compare(result: &BacktestResult, recomputed: &RecomputedMetrics) -> Vec<String> {
    let mut mismatches = Vec::new();
    let mut check_f64 = |name: &str, stored: f64, fresh: f64| {
        let scale = stored.abs().max(fresh.abs()).max(1.0);
        if (stored - fresh).abs() > TOLERANCE * scale {
            mismatches.push(format!("{name}: stored {stored}, recomputed {fresh}"));
        }
    };
    check_f64("max_drawdown", result.max_drawdown, recomputed.max_drawdown);
    check_f64(
        "max_drawdown_percent",
        result.max_drawdown_percent,
        recomputed.max_drawdown_percent,
    );
    check_f64("win_rate", result.win_rate, recomputed.win_rate);
    if let Some(final_equity) = recomputed.final_equity {
        check_f64("final_balance", result.final_balance, final_equity);
    }
    check_f64(
        "profit_loss",
        result.profit_loss,
        result.final_balance - result.initial_balance,
    );

    let counts = [
        ("bars_processed", result.bars_processed, recomputed.bars_processed),
        ("total_trades", result.total_trades, recomputed.total_trades),
        ("closed_trades", result.closed_trades, recomputed.closed_trades),
        ("winning_trades", result.winning_trades, recomputed.winning_trades),
    ];
    for (name, stored, fresh) in counts {
        if stored != fresh {
            mismatches.push(format!("{name}: stored {stored}, recomputed {fresh}"));
        }
    }
    mismatches
}

pub fn render_text(report: &RunReport) -> String {
    let r = &report.result;
    let mut lines = vec![
        format!("run:            {}", report.input_dir.display()),
        format!("symbol:         {} ({})", r.symbol, r.interval),
        format!("strategy:       {}", r.strategy),
        format!("period:         {} -> {}", r.start_date, r.end_date),
        format!("bars:           {}", r.bars_processed),
        format!("initial:        {:.2}", r.initial_balance),
        format!("final:          {:.2}", r.final_balance),
        format!(
            "profit/loss:    {:.2} ({:.2}%)",
            r.profit_loss, r.profit_loss_percent
        ),
        format!(
            "max drawdown:   {:.2} ({:.2}%)",
            r.max_drawdown, r.max_drawdown_percent
        ),
        format!(
            "trades:         {} ({} buy / {} sell)",
            r.total_trades,
            r.buy_count(),
            r.sell_count()
        ),
        format!(
            "win rate:       {:.1}% of {} closed",
            r.win_rate * 100.0,
            r.closed_trades
        ),
        format!("consistent:     {}", report.consistent),
    ];
    lines.extend(report.mismatches.iter().map(|m| format!("  mismatch: {m}")));
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::{compare, recompute};
    use agentrader_domain::entities::price_series::PriceSeries;
    use agentrader_domain::services::engine::backtest::BacktestSimulator;
    use agentrader_domain::services::strategy::BuyAndHold;
    use agentrader_domain::value_objects::candle::Candle;

    #[test]
    fn recomputed_metrics_match_a_fresh_run() {
        let candles = [100.0, 100.0, 120.0, 90.0, 110.0]
            .iter()
            .enumerate()
            .map(|(idx, price)| Candle::flat(idx as i64 * 60, *price, 1.0))
            .collect();
        let series = PriceSeries::new("BTCUSDT", "1m", candles).expect("series");
        let result = BacktestSimulator::new("report")
            .run(&series, 1_000.0, &mut BuyAndHold)
            .expect("run");

        let recomputed = recompute(&result);
        assert_eq!(recomputed.max_drawdown, 300.0);
        assert_eq!(recomputed.final_equity, Some(1_100.0));
        assert!(compare(&result, &recomputed).is_empty());

        let mut tampered = result.clone();
        tampered.max_drawdown_percent = 30.0;
        let mismatches = compare(&tampered, &recomputed);
        assert_eq!(mismatches.len(), 1);
        assert!(mismatches[0].starts_with("max_drawdown_percent"));
    }
}
