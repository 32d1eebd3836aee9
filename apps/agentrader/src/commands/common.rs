use agentrader_application::config::{Config, DataSource};
use std::path::PathBuf;

pub(super) fn print_config_summary(command: &str, config: &Config, out: Option<&PathBuf>) {
    println!(
        "agentrader: {} (run_id={}, symbol={}, interval={}, initial_balance={})",
        command,
        config.run.run_id,
        config.run.symbol,
        config.run.interval,
        config.run.initial_balance
    );
    let source = match config.data.source {
        DataSource::Csv => format!(
            "csv path={}",
            config.data.csv_path.as_deref().unwrap_or("<missing>")
        ),
        DataSource::Postgres => format!(
            "postgres db_url={}, table={}",
            if config.data.db_url.is_some() {
                "<config>"
            } else {
                "$AGENTRADER_DB_URL"
            },
            config.data.ohlcv_table.as_deref().unwrap_or("market_data")
        ),
    };
    println!(
        "data: {}, window={}..{}, out_dir={}",
        source,
        config.run.start_date.as_deref().unwrap_or("start"),
        config.run.end_date.as_deref().unwrap_or("end"),
        out.map(|path| path.display().to_string())
            .unwrap_or_else(|| config.paths.out_dir.clone())
    );
    println!(
        "strategy: kind={}, sma_short={}, sma_long={}",
        serde_json::to_value(config.strategy.kind)
            .ok()
            .and_then(|value| value.as_str().map(str::to_string))
            .unwrap_or_default(),
        optional(config.strategy.sma_short),
        optional(config.strategy.sma_long)
    );
    if let Some(agent) = config.agent.as_ref() {
        println!(
            "agent: url={}, timeout_ms={}, retries={}, fallback_decision={}, history_window={}",
            agent.url,
            agent.timeout_ms,
            agent.retries,
            agent.fallback_decision,
            optional(agent.history_window)
        );
    }
}

fn optional<T: ToString>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}
