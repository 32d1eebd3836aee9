use crate::config::{Config, StrategyMode, DEFAULT_HISTORY_WINDOW};
use agentrader_domain::repositories::decision::DecisionClient;
use agentrader_domain::repositories::market_data::OhlcvQuery;
use agentrader_domain::services::audit::AuditEvent;
use agentrader_domain::services::ohlcv::DataQualityReport;
use agentrader_domain::services::strategy::{
    AgentDecision, BuyAndHold, HoldStrategy, SmaCrossover, StrategyKind,
};
use agentrader_domain::value_objects::interval::Interval;
use agentrader_domain::BacktestError;
use chrono::{DateTime, NaiveDate};

pub fn resolve_interval(config: &Config) -> Result<Interval, String> {
    Interval::parse_or_seconds(&config.run.interval)
}

/// Parses a date bound given as epoch seconds, RFC 3339 or `YYYY-MM-DD`.
/// A bare date used as an end bound covers the whole day.
pub fn parse_date_bound(raw: &str, end_of_day: bool) -> Result<i64, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("date cannot be empty".to_string());
    }
    if let Ok(seconds) = trimmed.parse::<i64>() {
        return Ok(seconds);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.timestamp());
    }

    let date = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d").map_err(|err| {
        format!("invalid date '{raw}' (expected RFC 3339, YYYY-MM-DD or epoch seconds): {err}")
    })?;
    let datetime = if end_of_day {
        date.and_hms_opt(23, 59, 59)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    datetime
        .map(|dt| dt.and_utc().timestamp())
        .ok_or_else(|| format!("invalid date '{raw}'"))
}

pub fn resolve_date_range(config: &Config) -> Result<(Option<i64>, Option<i64>), String> {
    let start = config
        .run
        .start_date
        .as_deref()
        .map(|raw| parse_date_bound(raw, false))
        .transpose()?;
    let end = config
        .run
        .end_date
        .as_deref()
        .map(|raw| parse_date_bound(raw, true))
        .transpose()?;

    if let (Some(start), Some(end)) = (start, end) {
        if start > end {
            return Err(BacktestError::invalid_config(format!(
                "run.start_date ({start}) is after run.end_date ({end})"
            ))
            .to_string());
        }
    }
    Ok((start, end))
}

pub fn check_initial_balance(config: &Config) -> Result<(), String> {
    let balance = config.run.initial_balance;
    if !balance.is_finite() || balance <= 0.0 {
        return Err(BacktestError::invalid_config(format!(
            "run.initial_balance must be finite and > 0 (got {balance})"
        ))
        .to_string());
    }
    Ok(())
}

pub fn ohlcv_query(config: &Config) -> Result<OhlcvQuery, String> {
    let interval = resolve_interval(config)?;
    let (start, end) = resolve_date_range(config)?;
    Ok(OhlcvQuery {
        symbol: config.run.symbol.clone(),
        interval: interval.label,
        expected_step_seconds: Some(interval.step_seconds),
        start,
        end,
    })
}

pub fn resolve_sma_periods(config: &Config) -> Result<(usize, usize), String> {
    match (config.strategy.sma_short, config.strategy.sma_long) {
        (Some(short), Some(long)) => Ok((short as usize, long as usize)),
        _ => Err(BacktestError::invalid_config(
            "strategy.kind = \"sma\" requires strategy.sma_short and strategy.sma_long",
        )
        .to_string()),
    }
}

/// Checks the strategy section without needing a decision client.
pub fn check_strategy_config(config: &Config) -> Result<(), String> {
    match config.strategy.kind {
        StrategyMode::Sma => {
            let (short, long) = resolve_sma_periods(config)?;
            SmaCrossover::new(short, long).map_err(|err| err.to_string())?;
        }
        StrategyMode::Agent => {
            if config.agent.is_none() {
                return Err(BacktestError::invalid_config(
                    "strategy.kind = \"agent\" requires an [agent] section",
                )
                .to_string());
            }
        }
        StrategyMode::Hold | StrategyMode::BuyAndHold => {}
    }
    Ok(())
}

pub fn build_decision_source(
    config: &Config,
    decision_client: Option<Box<dyn DecisionClient>>,
) -> Result<StrategyKind, String> {
    check_strategy_config(config)?;
    let strategy = match config.strategy.kind {
        StrategyMode::Sma => {
            let (short, long) = resolve_sma_periods(config)?;
            let sma = SmaCrossover::new(short, long).map_err(|err| err.to_string())?;
            StrategyKind::SmaCrossover(sma)
        }
        StrategyMode::Hold => StrategyKind::Hold(HoldStrategy),
        StrategyMode::BuyAndHold => StrategyKind::BuyAndHold(BuyAndHold),
        StrategyMode::Agent => {
            let Some(agent) = config.agent.as_ref() else {
                return Err("strategy.kind = \"agent\" requires an [agent] section".to_string());
            };
            let Some(client) = decision_client else {
                return Err("strategy.kind = \"agent\" requires a decision client".to_string());
            };
            let interval = resolve_interval(config)?;
            StrategyKind::Agent(AgentDecision::new(
                config.run.run_id.clone(),
                config.run.symbol.clone(),
                interval.label,
                agent.history_window.unwrap_or(DEFAULT_HISTORY_WINDOW),
                agent.fallback_decision,
                client,
            ))
        }
    };
    Ok(strategy)
}

pub fn data_quality_json(report: &DataQualityReport) -> serde_json::Value {
    serde_json::json!({
        "rows": report.rows,
        "duplicates": report.duplicates,
        "gaps": report.gaps,
        "out_of_order": report.out_of_order,
        "invalid_rows": report.invalid_rows,
        "first_timestamp": report.first_timestamp,
        "last_timestamp": report.last_timestamp,
        "first_gap": report.first_gap,
        "first_duplicate": report.first_duplicate,
        "first_out_of_order": report.first_out_of_order,
        "first_invalid": report.first_invalid,
        "max_gap_seconds": report.max_gap_seconds,
        "gap_count": report.gap_count,
    })
}

pub fn log_data_quality(run_id: &str, report: &DataQualityReport) {
    if report.has_issues() {
        tracing::warn!(
            run_id,
            rows = report.rows,
            duplicates = report.duplicates,
            gaps = report.gaps,
            out_of_order = report.out_of_order,
            invalid_rows = report.invalid_rows,
            max_gap_seconds = ?report.max_gap_seconds,
            "market data has quality issues"
        );
    } else {
        tracing::info!(run_id, rows = report.rows, "market data loaded");
    }
}

pub fn timing_event(
    run_id: &str,
    symbol: Option<&str>,
    action: &str,
    duration_ms: u64,
    details: serde_json::Value,
) -> AuditEvent {
    AuditEvent {
        run_id: run_id.to_string(),
        timestamp: 0,
        stage: "timing".to_string(),
        symbol: symbol.map(|s| s.to_string()),
        action: action.to_string(),
        error: None,
        details: serde_json::json!({
            "duration_ms": duration_ms,
            "details": details,
        }),
    }
}
