use agentrader_application::config::{Config, DataSource, StrategyMode};
use agentrader_application::experiments::sweep::ClientFactoryResult;
use agentrader_domain::repositories::artifacts::ArtifactReader;
use agentrader_domain::repositories::decision::DecisionClient;
use agentrader_domain::repositories::market_data::MarketDataRepository;
use agentrader_infrastructure::agents::HttpDecisionClient;
use agentrader_infrastructure::artifacts::{FilesystemArtifactReader, FilesystemArtifactWriter};
use agentrader_infrastructure::market_data::ohlcv::CsvMarketDataRepository;
use agentrader_infrastructure::persistence::postgres_ohlcv::PostgresMarketDataRepository;
use std::env;

const DEFAULT_OHLCV_TABLE: &str = "market_data";
const DEFAULT_POOL_MAX_SIZE: u32 = 4;

pub struct EngineDeps {
    pub market_data: Box<dyn MarketDataRepository>,
    pub artifacts: FilesystemArtifactWriter,
    pub decision_client: Option<Box<dyn DecisionClient>>,
}

pub struct ReportingDeps {
    pub reader: Box<dyn ArtifactReader>,
}

pub fn build_engine_deps(config: &Config) -> Result<EngineDeps, String> {
    Ok(EngineDeps {
        market_data: build_market_data_repo(config)?,
        artifacts: FilesystemArtifactWriter::new(),
        decision_client: build_decision_client(config)?,
    })
}

pub fn build_reporting_deps() -> ReportingDeps {
    ReportingDeps {
        reader: Box::new(FilesystemArtifactReader::new()),
    }
}

fn resolve_db_url(config: &Config) -> Result<String, String> {
    match config.data.db_url.as_deref() {
        Some(url) if !url.trim().is_empty() => Ok(url.to_string()),
        _ => env::var("AGENTRADER_DB_URL").map_err(|_| {
            "missing data.db_url in config and env AGENTRADER_DB_URL is not set".to_string()
        }),
    }
}

pub fn build_market_data_repo(config: &Config) -> Result<Box<dyn MarketDataRepository>, String> {
    match config.data.source {
        DataSource::Csv => {
            let path = config
                .data
                .csv_path
                .as_deref()
                .filter(|path| !path.trim().is_empty())
                .ok_or_else(|| "data.source = \"csv\" requires data.csv_path".to_string())?;
            Ok(Box::new(CsvMarketDataRepository::new(path)))
        }
        DataSource::Postgres => {
            let db_url = resolve_db_url(config)?;
            let table = config
                .data
                .ohlcv_table
                .clone()
                .unwrap_or_else(|| DEFAULT_OHLCV_TABLE.to_string());
            let pool_max_size = config.data.pool_max_size.unwrap_or(DEFAULT_POOL_MAX_SIZE);
            Ok(Box::new(PostgresMarketDataRepository::new(
                db_url,
                table,
                pool_max_size,
            )?))
        }
    }
}

/// Only `strategy.kind = "agent"` talks to a decision service.
pub fn build_decision_client(config: &Config) -> ClientFactoryResult {
    if config.strategy.kind != StrategyMode::Agent {
        return Ok(None);
    }
    let Some(agent) = config.agent.as_ref() else {
        return Err("strategy.kind = \"agent\" requires an [agent] section".to_string());
    };
    let client = HttpDecisionClient::new(agent.url.clone(), agent.timeout_ms, agent.retries)
        .map_err(|err| {
            format!(
                "failed to init decision client (url={}): {err}",
                agent.url
            )
        })?;
    Ok(Some(Box::new(client)))
}

#[cfg(test)]
mod tests {
    use super::{build_decision_client, build_market_data_repo};
    use agentrader_application::config::Config;

    fn config(data: &str, strategy: &str) -> Config {
        let raw = format!(
            r#"
[run]
run_id = "cli"
symbol = "BTCUSDT"
interval = "1h"
initial_balance = 1000.0

[data]
{data}

[strategy]
{strategy}

[agent]
url = "http://127.0.0.1:8000"
timeout_ms = 1000
retries = 1
fallback_decision = "HOLD"

[paths]
out_dir = "runs"
"#
        );
        toml::from_str(&raw).expect("config should parse")
    }

    #[test]
    fn csv_source_requires_a_path() {
        let cfg = config("source = \"csv\"", "kind = \"hold\"");
        let err = build_market_data_repo(&cfg).err().expect("missing csv_path");
        assert!(err.contains("data.csv_path"));

        let cfg = config("source = \"csv\"\ncsv_path = \"data.csv\"", "kind = \"hold\"");
        assert!(build_market_data_repo(&cfg).is_ok());
    }

    #[test]
    fn decision_client_only_for_agent_strategy() {
        let cfg = config("source = \"csv\"\ncsv_path = \"data.csv\"", "kind = \"hold\"");
        assert!(build_decision_client(&cfg).expect("no client").is_none());

        let cfg = config("source = \"csv\"\ncsv_path = \"data.csv\"", "kind = \"agent\"");
        assert!(build_decision_client(&cfg).expect("client").is_some());
    }
}
