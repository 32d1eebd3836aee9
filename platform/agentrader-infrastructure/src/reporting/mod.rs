use agentrader_domain::entities::result::BacktestResult;
use agentrader_domain::services::audit::AuditEvent;
use agentrader_domain::value_objects::equity_point::EquityPoint;
use agentrader_domain::value_objects::trade::{Trade, TradeReason, TradeType};
use std::fs;
use std::io::Write;
use std::path::Path;

pub fn write_result_json(path: &Path, result: &BacktestResult) -> Result<(), String> {
    let json = serde_json::to_string_pretty(result)
        .map_err(|err| format!("failed to serialize result: {}", err))?;
    let mut file =
        fs::File::create(path).map_err(|err| format!("failed to create result: {}", err))?;
    file.write_all(json.as_bytes())
        .and_then(|_| file.write_all(b"\n"))
        .map_err(|err| format!("failed to write result: {}", err))
}

pub fn read_result_json(path: &Path) -> Result<BacktestResult, String> {
    let raw = fs::read_to_string(path)
        .map_err(|err| format!("failed to read result {}: {}", path.display(), err))?;
    serde_json::from_str(&raw)
        .map_err(|err| format!("failed to parse result {}: {}", path.display(), err))
}

pub fn write_audit_jsonl(path: &Path, events: &[AuditEvent]) -> Result<(), String> {
    let mut file =
        fs::File::create(path).map_err(|err| format!("failed to create logs: {}", err))?;
    for event in events {
        let line = serde_json::to_string(event)
            .map_err(|err| format!("failed to serialize audit event: {}", err))?;
        file.write_all(line.as_bytes())
            .and_then(|_| file.write_all(b"\n"))
            .map_err(|err| format!("failed to write audit event: {}", err))?;
    }
    Ok(())
}

fn optional_cell<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn reason_label(reason: TradeReason) -> &'static str {
    match reason {
        TradeReason::Signal => "signal",
        TradeReason::ForcedLiquidation => "forced_liquidation",
    }
}

pub fn write_trades_csv(path: &Path, trades: &[Trade]) -> Result<(), String> {
    let mut wtr = csv::Writer::from_path(path)
        .map_err(|err| format!("failed to create trades csv {}: {}", path.display(), err))?;
    wtr.write_record([
        "id",
        "type",
        "timestamp_utc",
        "price",
        "amount",
        "cost",
        "proceeds",
        "entry_trade_id",
        "pnl",
        "reason",
    ])
    .map_err(|err| format!("failed to write trades csv header: {}", err))?;

    for trade in trades {
        let trade_type = match trade.trade_type {
            TradeType::Buy => "BUY",
            TradeType::Sell => "SELL",
        };
        wtr.write_record([
            trade.id.to_string(),
            trade_type.to_string(),
            trade.timestamp.to_string(),
            trade.price.to_string(),
            trade.amount.to_string(),
            optional_cell(trade.cost),
            optional_cell(trade.proceeds),
            optional_cell(trade.entry_trade_id),
            optional_cell(trade.pnl),
            reason_label(trade.reason).to_string(),
        ])
        .map_err(|err| format!("failed to write trades row: {}", err))?;
    }

    wtr.flush()
        .map_err(|err| format!("failed to flush trades csv: {}", err))
}

pub fn write_equity_csv(path: &Path, points: &[EquityPoint]) -> Result<(), String> {
    let mut wtr = csv::Writer::from_path(path)
        .map_err(|err| format!("failed to create equity csv {}: {}", path.display(), err))?;
    wtr.write_record(["timestamp_utc", "equity", "cash", "quantity", "position_flag"])
        .map_err(|err| format!("failed to write equity csv header: {}", err))?;

    for point in points {
        wtr.write_record([
            point.timestamp.to_string(),
            point.equity.to_string(),
            point.cash.to_string(),
            point.quantity.to_string(),
            point.position_flag.to_string(),
        ])
        .map_err(|err| format!("failed to write equity row: {}", err))?;
    }

    wtr.flush()
        .map_err(|err| format!("failed to flush equity csv: {}", err))
}
