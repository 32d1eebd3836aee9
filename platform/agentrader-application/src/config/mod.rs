use agentrader_domain::value_objects::decision::Decision;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    Csv,
    Postgres,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StrategyMode {
    Sma,
    Hold,
    BuyAndHold,
    Agent,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub run: RunConfig,
    pub data: DataConfig,
    pub strategy: StrategyConfig,
    pub agent: Option<AgentConfig>,
    pub paths: PathsConfig,
    pub report: Option<ReportConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct RunConfig {
    pub run_id: String,
    pub symbol: String,
    pub interval: String,
    pub initial_balance: f64,
    /// RFC 3339, `YYYY-MM-DD` or epoch seconds.
    pub start_date: Option<String>,
    /// Inclusive; a bare date covers the whole day.
    pub end_date: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct DataConfig {
    pub source: DataSource,
    pub csv_path: Option<String>,
    pub db_url: Option<String>,
    pub ohlcv_table: Option<String>,
    pub pool_max_size: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct StrategyConfig {
    pub kind: StrategyMode,
    pub sma_short: Option<u64>,
    pub sma_long: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    pub url: String,
    pub timeout_ms: u64,
    pub retries: u32,
    pub fallback_decision: Decision,
    pub history_window: Option<usize>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct PathsConfig {
    pub out_dir: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct ReportConfig {
    pub trades_csv: Option<bool>,
    pub equity_csv: Option<bool>,
}

pub const DEFAULT_HISTORY_WINDOW: usize = 50;

impl Config {
    pub fn writes_trades_csv(&self) -> bool {
        self.report
            .as_ref()
            .and_then(|report| report.trades_csv)
            .unwrap_or(true)
    }

    pub fn writes_equity_csv(&self) -> bool {
        self.report
            .as_ref()
            .and_then(|report| report.equity_csv)
            .unwrap_or(true)
    }
}

pub fn load_config(path: &Path) -> Result<Config, String> {
    let (config, _source) = load_config_with_source(path)?;
    Ok(config)
}

pub fn load_config_with_source(path: &Path) -> Result<(Config, String), String> {
    let contents = fs::read_to_string(path)
        .map_err(|err| format!("failed to read config {}: {}", path.display(), err))?;
    let config = toml::from_str(&contents)
        .map_err(|err| format!("failed to parse TOML {}: {}", path.display(), err))?;
    Ok((config, contents))
}

pub fn to_toml_pretty(config: &Config) -> Result<String, String> {
    toml::to_string_pretty(config)
        .map_err(|err| format!("failed to serialize config as TOML: {err}"))
}
