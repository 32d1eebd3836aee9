use crate::config::Config;
use crate::shared::{
    check_initial_balance, check_strategy_config, data_quality_json, ohlcv_query,
};
use agentrader_domain::entities::price_series::PriceSeries;
use agentrader_domain::repositories::market_data::MarketDataRepository;
use std::time::Instant;
use tracing::info_span;

/// Loads the configured data and checks that a backtest could start from it.
///
/// Without `strict`, data-quality findings are reported but only problems
/// that would stop the simulator fail validation. With `strict`, any
/// duplicate, gap, out-of-order or invalid row fails as well.
pub fn validate(
    config: &Config,
    strict: bool,
    market_data: &dyn MarketDataRepository,
) -> Result<serde_json::Value, String> {
    let _span = info_span!(
        "validate",
        strict = strict,
        run_id = %config.run.run_id,
        symbol = %config.run.symbol,
        interval = %config.run.interval
    )
    .entered();

    check_initial_balance(config)?;
    check_strategy_config(config)?;
    let query = ohlcv_query(config)?;

    let stage_start = Instant::now();
    let (candles, report) = market_data.load_ohlcv(&query)?;
    metrics::histogram!("agentrader.validate.load_ohlcv_ms")
        .record(stage_start.elapsed().as_millis() as f64);

    metrics::gauge!("agentrader.validate.ohlcv.gaps").set(report.gaps as f64);
    metrics::gauge!("agentrader.validate.ohlcv.duplicates").set(report.duplicates as f64);
    metrics::gauge!("agentrader.validate.ohlcv.out_of_order").set(report.out_of_order as f64);
    metrics::gauge!("agentrader.validate.ohlcv.invalid_rows").set(report.invalid_rows as f64);

    if strict && report.has_issues() {
        return Err(format!(
            "strict validation failed: {} duplicates, {} gaps, {} out of order, {} invalid rows",
            report.duplicates, report.gaps, report.out_of_order, report.invalid_rows
        ));
    }

    let rows = candles.len();
    let series = PriceSeries::new(config.run.symbol.clone(), query.interval.clone(), candles)
        .map_err(|err| err.to_string())?;

    tracing::info!(
        rows,
        gaps = report.gaps,
        first = series.first().timestamp,
        last = series.last().timestamp,
        "validation passed"
    );

    Ok(serde_json::json!({
        "run_id": config.run.run_id,
        "symbol": config.run.symbol,
        "interval": query.interval,
        "expected_step_seconds": query.expected_step_seconds,
        "start": query.start,
        "end": query.end,
        "strategy": config.strategy.kind,
        "ohlcv": data_quality_json(&report),
        "series_bars": series.len(),
        "strict": strict,
    }))
}
