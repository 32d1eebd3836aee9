use agentrader_application::config::load_config_with_source;
use std::path::PathBuf;
use std::time::Instant;

pub(super) fn run_backtest(
    config_path: PathBuf,
    out: Option<PathBuf>,
    json: bool,
) -> Result<(), String> {
    let (config, config_toml) = load_config_with_source(&config_path)?;
    if !json {
        super::common::print_config_summary("backtest", &config, out.as_ref());
    }

    let overall_start = Instant::now();
    let crate::infra::EngineDeps {
        market_data,
        artifacts,
        decision_client,
    } = crate::infra::build_engine_deps(&config)?;

    let outcome = agentrader_application::backtesting::run_backtest(
        &config,
        &config_toml,
        out,
        market_data.as_ref(),
        &artifacts,
        decision_client,
    )?;
    let result = &outcome.result;

    if json {
        let summary = serde_json::json!({
            "status": "ok",
            "run_id": outcome.run_id,
            "run_dir": outcome.run_dir.display().to_string(),
            "symbol": result.symbol,
            "interval": result.interval,
            "strategy": result.strategy,
            "start_date": result.start_date,
            "end_date": result.end_date,
            "bars_processed": result.bars_processed,
            "initial_balance": result.initial_balance,
            "final_balance": result.final_balance,
            "profit_loss": result.profit_loss,
            "profit_loss_percent": result.profit_loss_percent,
            "max_drawdown": result.max_drawdown,
            "max_drawdown_percent": result.max_drawdown_percent,
            "total_trades": result.total_trades,
            "win_rate": result.win_rate,
            "data_quality": outcome.data_quality,
        });
        let line = serde_json::to_string(&summary)
            .map_err(|err| format!("failed to serialize summary: {err}"))?;
        println!("{line}");
        return Ok(());
    }

    println!("run output: {}", outcome.run_dir.display());
    println!(
        "result: final_balance={:.2} profit_loss={:.2} ({:.2}%) max_drawdown={:.2} ({:.2}%) trades={} win_rate={:.1}%",
        result.final_balance,
        result.profit_loss,
        result.profit_loss_percent,
        result.max_drawdown,
        result.max_drawdown_percent,
        result.total_trades,
        result.win_rate * 100.0
    );
    println!(
        "agentrader: backtest total_ms={}",
        overall_start.elapsed().as_millis()
    );
    Ok(())
}
