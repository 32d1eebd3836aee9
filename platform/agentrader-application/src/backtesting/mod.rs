use crate::config::Config;
use crate::shared::{
    build_decision_source, check_initial_balance, data_quality_json, log_data_quality,
    ohlcv_query, timing_event,
};
use agentrader_domain::entities::price_series::PriceSeries;
use agentrader_domain::entities::result::BacktestResult;
use agentrader_domain::repositories::artifacts::ArtifactWriter;
use agentrader_domain::repositories::decision::DecisionClient;
use agentrader_domain::repositories::market_data::MarketDataRepository;
use agentrader_domain::services::audit::{sort_events, AuditEvent};
use agentrader_domain::services::engine::backtest::BacktestSimulator;
use agentrader_domain::services::engine::observer::RunObserver;
use agentrader_domain::services::ohlcv::DataQualityReport;
use agentrader_domain::services::strategy::DecisionSource;
use agentrader_domain::value_objects::trade::Trade;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info_span;

/// What a finished backtest produced and where it was written.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub run_dir: PathBuf,
    pub result: BacktestResult,
    pub data_quality: DataQualityReport,
}

pub fn run_backtest(
    config: &Config,
    config_toml: &str,
    out: Option<PathBuf>,
    market_data: &dyn MarketDataRepository,
    artifacts: &dyn ArtifactWriter,
    decision_client: Option<Box<dyn DecisionClient>>,
) -> Result<RunOutcome, String> {
    let _span = info_span!(
        "run_backtest",
        run_id = %config.run.run_id,
        symbol = %config.run.symbol,
        interval = %config.run.interval
    )
    .entered();

    check_initial_balance(config)?;
    let mut audit_extras: Vec<AuditEvent> = Vec::new();

    let query = ohlcv_query(config)?;
    let stage_start = Instant::now();
    let (candles, data_report) = market_data.load_ohlcv(&query)?;
    metrics::histogram!("agentrader.backtest.load_ohlcv_ms")
        .record(stage_start.elapsed().as_millis() as f64);
    log_data_quality(&config.run.run_id, &data_report);
    data_report.ensure_clean().map_err(|err| err.to_string())?;
    audit_extras.push(timing_event(
        &config.run.run_id,
        Some(&config.run.symbol),
        "load_ohlcv",
        stage_start.elapsed().as_millis() as u64,
        data_quality_json(&data_report),
    ));

    let series = PriceSeries::new(config.run.symbol.clone(), query.interval.clone(), candles)
        .map_err(|err| err.to_string())?;
    let mut source = build_decision_source(config, decision_client)?;

    let simulator = BacktestSimulator::new(config.run.run_id.clone());
    let mut trail = AuditTrail::new(&config.run.run_id, &config.run.symbol);
    let stage_start = Instant::now();
    let result = simulator
        .run_observed(
            &series,
            config.run.initial_balance,
            &mut source,
            &mut trail,
        )
        .map_err(|err| err.to_string())?;
    let engine_ms = stage_start.elapsed().as_millis() as f64;
    metrics::histogram!("agentrader.backtest.engine_ms").record(engine_ms);
    metrics::gauge!("agentrader.backtest.bars_processed").set(result.bars_processed as f64);
    metrics::gauge!("agentrader.backtest.trades").set(result.total_trades as f64);
    metrics::gauge!("agentrader.backtest.engine_bars_per_sec").set(if engine_ms > 0.0 {
        (result.bars_processed as f64) / (engine_ms / 1000.0)
    } else {
        0.0
    });
    audit_extras.push(timing_event(
        &config.run.run_id,
        Some(&config.run.symbol),
        "run_engine",
        engine_ms as u64,
        serde_json::json!({ "strategy": result.strategy }),
    ));

    let mut audit_events = trail.into_events();
    audit_events.append(&mut source.drain_audit_events());
    audit_events.append(&mut audit_extras);

    let run_dir = write_outputs(config, config_toml, out, &result, artifacts, audit_events)?;

    tracing::info!(
        run_dir = %run_dir.display(),
        final_balance = result.final_balance,
        profit_loss_percent = result.profit_loss_percent,
        "backtest artifacts written"
    );

    Ok(RunOutcome {
        run_id: config.run.run_id.clone(),
        run_dir,
        result,
        data_quality: data_report,
    })
}

fn write_outputs(
    config: &Config,
    config_toml: &str,
    out: Option<PathBuf>,
    result: &BacktestResult,
    artifacts: &dyn ArtifactWriter,
    mut audit_events: Vec<AuditEvent>,
) -> Result<PathBuf, String> {
    let base_dir = out.unwrap_or_else(|| PathBuf::from(&config.paths.out_dir));
    let run_dir = base_dir.join(&config.run.run_id);
    artifacts.ensure_dir(&run_dir)?;

    artifacts.write_result_json(run_dir.join("result.json").as_path(), result)?;
    if config.writes_trades_csv() {
        artifacts.write_trades_csv(run_dir.join("trades.csv").as_path(), &result.trades)?;
    }
    if config.writes_equity_csv() {
        artifacts.write_equity_csv(run_dir.join("equity.csv").as_path(), &result.equity_curve)?;
    }

    sort_events(&mut audit_events);
    artifacts.write_audit_jsonl(run_dir.join("logs.jsonl").as_path(), &audit_events)?;
    artifacts
        .write_config_snapshot_toml(run_dir.join("config_snapshot.toml").as_path(), config_toml)?;

    Ok(run_dir)
}

/// Turns simulator callbacks into audit events for `logs.jsonl`.
struct AuditTrail {
    run_id: String,
    symbol: String,
    events: Vec<AuditEvent>,
}

impl AuditTrail {
    fn new(run_id: &str, symbol: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            symbol: symbol.to_string(),
            events: Vec::new(),
        }
    }

    fn into_events(self) -> Vec<AuditEvent> {
        self.events
    }
}

impl RunObserver for AuditTrail {
    fn on_trade(&mut self, trade: &Trade) {
        self.events.push(AuditEvent {
            run_id: self.run_id.clone(),
            timestamp: trade.timestamp,
            stage: "trade".to_string(),
            symbol: Some(self.symbol.clone()),
            action: format!("{:?}", trade.trade_type).to_uppercase(),
            error: None,
            details: serde_json::json!({
                "id": trade.id,
                "price": trade.price,
                "amount": trade.amount,
                "cost": trade.cost,
                "proceeds": trade.proceeds,
                "pnl": trade.pnl,
                "reason": trade.reason,
            }),
        });
    }

    fn on_complete(&mut self, result: &BacktestResult) {
        let timestamp = result.equity_curve.last().map(|p| p.timestamp).unwrap_or(0);
        self.events.push(AuditEvent {
            run_id: self.run_id.clone(),
            timestamp,
            stage: "summary".to_string(),
            symbol: Some(self.symbol.clone()),
            action: "complete".to_string(),
            error: None,
            details: serde_json::json!({
                "strategy": result.strategy,
                "bars_processed": result.bars_processed,
                "final_balance": result.final_balance,
                "profit_loss": result.profit_loss,
                "profit_loss_percent": result.profit_loss_percent,
                "max_drawdown": result.max_drawdown,
                "max_drawdown_percent": result.max_drawdown_percent,
                "total_trades": result.total_trades,
                "win_rate": result.win_rate,
            }),
        });
    }
}
