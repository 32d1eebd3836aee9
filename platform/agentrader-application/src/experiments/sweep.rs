use crate::backtesting::run_backtest;
use crate::config::{to_toml_pretty, Config};
use crate::shared::{log_data_quality, ohlcv_query};
use agentrader_domain::entities::result::BacktestResult;
use agentrader_domain::repositories::artifacts::ArtifactWriter;
use agentrader_domain::repositories::decision::DecisionClient;
use agentrader_domain::repositories::market_data::{MarketDataRepository, OhlcvQuery};
use agentrader_domain::services::ohlcv::{data_quality_from_candles, DataQualityReport};
use agentrader_domain::value_objects::candle::Candle;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info_span;

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SweepFile {
    pub base: SweepBase,
    pub sweep: SweepMeta,
    #[serde(default)]
    pub params: Vec<SweepParam>,
    pub leaderboard: Option<LeaderboardConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SweepBase {
    pub config: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SweepMeta {
    pub id: String,
    pub parallelism: Option<usize>,
    pub resume: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SweepParam {
    pub path: String,
    pub values: Vec<toml::Value>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LeaderboardConfig {
    pub sort_by: Option<String>,
    pub descending: Option<bool>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepRunEntry {
    pub run_id: String,
    pub params: BTreeMap<String, toml::Value>,
    pub status: String,
    pub error: Option<String>,
    pub metrics: Option<RunMetrics>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RunMetrics {
    pub bars_processed: u64,
    pub total_trades: u64,
    pub win_rate: f64,
    pub final_balance: f64,
    pub profit_loss: f64,
    pub profit_loss_percent: f64,
    pub max_drawdown: f64,
    pub max_drawdown_percent: f64,
}

impl RunMetrics {
    fn from_result(result: &BacktestResult) -> Self {
        Self {
            bars_processed: result.bars_processed as u64,
            total_trades: result.total_trades as u64,
            win_rate: result.win_rate,
            final_balance: result.final_balance,
            profit_loss: result.profit_loss,
            profit_loss_percent: result.profit_loss_percent,
            max_drawdown: result.max_drawdown,
            max_drawdown_percent: result.max_drawdown_percent,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepResult {
    pub sweep_id: String,
    pub sweep_dir: PathBuf,
    pub base_config: String,
    pub parallelism: usize,
    pub runs: Vec<SweepRunEntry>,
}

impl SweepResult {
    pub fn count_status(&self, status: &str) -> usize {
        self.runs.iter().filter(|run| run.status == status).count()
    }
}

pub type ClientFactoryResult = Result<Option<Box<dyn DecisionClient>>, String>;
pub type ClientFactory<'a> = dyn Fn(&Config) -> ClientFactoryResult + Sync + 'a;

const FORBIDDEN_PARAM_PREFIXES: &[&str] = &[
    "run.run_id",
    "run.symbol",
    "run.interval",
    "data.",
    "paths.out_dir",
];

pub fn run_sweep(
    sweep_path: &Path,
    client_factory: &ClientFactory<'_>,
    market_data: &dyn MarketDataRepository,
    artifacts: &(dyn ArtifactWriter + Sync),
) -> Result<SweepResult, String> {
    let sweep = load_sweep_file(sweep_path)?;

    let _span = info_span!("run_sweep", sweep_id = %sweep.sweep.id).entered();

    validate_param_paths(&sweep.params)?;

    let (base_config_path, base_config, base_toml_str) = load_base_config(sweep_path, &sweep)?;
    let base_toml_value: toml::Value = toml::from_str(&base_toml_str)
        .map_err(|err| format!("failed to parse base config TOML as value: {err}"))?;

    let out_dir = PathBuf::from(&base_config.paths.out_dir);
    let sweep_dir = out_dir.join("sweeps").join(&sweep.sweep.id);
    std::fs::create_dir_all(&sweep_dir)
        .map_err(|err| format!("failed to create sweep dir {}: {err}", sweep_dir.display()))?;

    // Runs may move the date window, so the whole history is loaded once and
    // each run filters its own copy.
    let mut query = ohlcv_query(&base_config)?;
    query.start = None;
    query.end = None;
    let stage_start = Instant::now();
    let (candles, report) = market_data.load_ohlcv(&query)?;
    metrics::histogram!("agentrader.sweep.load_ohlcv_ms")
        .record(stage_start.elapsed().as_millis() as f64);
    log_data_quality(&sweep.sweep.id, &report);
    report.ensure_clean().map_err(|err| err.to_string())?;
    let shared_market = InMemoryMarketDataRepository { candles };

    let resume = sweep.sweep.resume.unwrap_or(false);
    let grid = expand_grid(&sweep.params);
    let parallelism = normalize_parallelism(sweep.sweep.parallelism);

    let mut entries: Vec<Option<SweepRunEntry>> = vec![None; grid.len()];
    let mut plans: Vec<SweepRunPlan> = Vec::new();

    for (order_idx, assignment) in grid.iter().enumerate() {
        let mut toml_value = base_toml_value.clone();
        apply_assignment(&mut toml_value, assignment)?;

        let run_id = format!("{}__{}", sweep.sweep.id, assignment_hash(assignment));
        set_path_value(
            &mut toml_value,
            "run.run_id",
            toml::Value::String(run_id.clone()),
        )?;

        let generated = toml::to_string_pretty(&toml_value)
            .map_err(|err| format!("failed to serialize sweep config TOML: {err}"))?;
        let config: Config = toml::from_str(&generated)
            .map_err(|err| format!("failed to parse generated config for {run_id}: {err}"))?;
        let config_toml = to_toml_pretty(&config)?;

        let result_path = out_dir.join(&run_id).join("result.json");
        if resume && result_path.exists() {
            tracing::info!(run_id = %run_id, "skipping run with existing result");
            entries[order_idx] = Some(SweepRunEntry {
                run_id,
                params: assignment.clone(),
                status: "skipped".to_string(),
                error: None,
                metrics: read_metrics_from_result(&result_path).ok(),
            });
            continue;
        }

        plans.push(SweepRunPlan {
            order_idx,
            run_id,
            params: assignment.clone(),
            config,
            config_toml,
        });
    }

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(parallelism)
        .build()
        .map_err(|err| format!("failed to build sweep thread pool: {err}"))?;

    let stage_start = Instant::now();
    let executed: Vec<(usize, SweepRunEntry)> = pool.install(|| {
        plans
            .par_iter()
            .map(|plan| {
                let entry = execute_run_plan(plan, &shared_market, artifacts, client_factory);
                (plan.order_idx, entry)
            })
            .collect()
    });
    metrics::histogram!("agentrader.sweep.execute_ms")
        .record(stage_start.elapsed().as_millis() as f64);

    for (order_idx, entry) in executed {
        entries[order_idx] = Some(entry);
    }

    let runs = entries
        .into_iter()
        .enumerate()
        .map(|(idx, entry)| {
            entry.ok_or_else(|| {
                format!(
                    "internal sweep error: missing run entry {idx} (sweep '{}')",
                    sweep.sweep.id
                )
            })
        })
        .collect::<Result<Vec<_>, String>>()?;

    let result = SweepResult {
        sweep_id: sweep.sweep.id.clone(),
        sweep_dir: sweep_dir.clone(),
        base_config: base_config_path.display().to_string(),
        parallelism,
        runs,
    };

    metrics::gauge!("agentrader.sweep.runs").set(result.runs.len() as f64);
    metrics::gauge!("agentrader.sweep.errors").set(result.count_status("error") as f64);
    tracing::info!(
        runs = result.runs.len(),
        ok = result.count_status("ok"),
        skipped = result.count_status("skipped"),
        errors = result.count_status("error"),
        "sweep complete"
    );

    write_manifest(&sweep_dir, &result)?;
    write_results_csv(&sweep_dir, &result)?;
    write_leaderboard_csv(&sweep_dir, &result, sweep.leaderboard.as_ref())?;

    Ok(result)
}

#[derive(Debug, Clone)]
struct SweepRunPlan {
    order_idx: usize,
    run_id: String,
    params: BTreeMap<String, toml::Value>,
    config: Config,
    config_toml: String,
}

fn normalize_parallelism(value: Option<usize>) -> usize {
    value.unwrap_or(1).max(1)
}

fn execute_run_plan(
    plan: &SweepRunPlan,
    market_data: &InMemoryMarketDataRepository,
    artifacts: &(dyn ArtifactWriter + Sync),
    client_factory: &ClientFactory<'_>,
) -> SweepRunEntry {
    let outcome = client_factory(&plan.config).and_then(|client| {
        run_backtest(
            &plan.config,
            &plan.config_toml,
            None,
            market_data,
            artifacts,
            client,
        )
    });

    match outcome {
        Ok(outcome) => SweepRunEntry {
            run_id: plan.run_id.clone(),
            params: plan.params.clone(),
            status: "ok".to_string(),
            error: None,
            metrics: Some(RunMetrics::from_result(&outcome.result)),
        },
        Err(err) => {
            tracing::warn!(run_id = %plan.run_id, error = %err, "sweep run failed");
            SweepRunEntry {
                run_id: plan.run_id.clone(),
                params: plan.params.clone(),
                status: "error".to_string(),
                error: Some(err),
                metrics: None,
            }
        }
    }
}

pub fn load_sweep_file(sweep_path: &Path) -> Result<SweepFile, String> {
    let raw = std::fs::read_to_string(sweep_path).map_err(|err| {
        format!(
            "failed to read sweep config {}: {err}",
            sweep_path.display()
        )
    })?;
    toml::from_str(&raw)
        .map_err(|err| format!("failed to parse sweep TOML {}: {err}", sweep_path.display()))
}

/// Loads `[base] config`, resolved relative to the sweep file.
pub fn load_base_config(
    sweep_path: &Path,
    sweep: &SweepFile,
) -> Result<(PathBuf, Config, String), String> {
    let path = resolve_base_config_path(sweep_path, &sweep.base.config);
    let (config, source) = crate::config::load_config_with_source(path.as_path())?;
    Ok((path, config, source))
}

fn resolve_base_config_path(sweep_path: &Path, base: &str) -> PathBuf {
    let p = PathBuf::from(base);
    if p.is_absolute() {
        p
    } else {
        sweep_path
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(p)
    }
}

fn validate_param_paths(params: &[SweepParam]) -> Result<(), String> {
    for p in params {
        let path = p.path.trim();
        if path.is_empty() {
            return Err("sweep param path cannot be empty".to_string());
        }
        if FORBIDDEN_PARAM_PREFIXES
            .iter()
            .any(|pre| path.starts_with(pre))
        {
            return Err(format!("sweep param path not allowed: {}", p.path));
        }
        if p.values.is_empty() {
            return Err(format!("sweep param has no values: {}", p.path));
        }
    }
    Ok(())
}

fn expand_grid(params: &[SweepParam]) -> Vec<BTreeMap<String, toml::Value>> {
    let mut out: Vec<BTreeMap<String, toml::Value>> = vec![BTreeMap::new()];
    for p in params {
        let mut next: Vec<BTreeMap<String, toml::Value>> = Vec::new();
        for base in &out {
            for v in &p.values {
                let mut m = base.clone();
                m.insert(p.path.clone(), v.clone());
                next.push(m);
            }
        }
        out = next;
    }
    out
}

fn assignment_hash(assignment: &BTreeMap<String, toml::Value>) -> String {
    let canonical = serde_json::to_string(assignment)
        .unwrap_or_else(|_| "{\"error\":\"assignment\"}".to_string());
    let digest = Sha256::digest(canonical.as_bytes());
    to_hex_short(&digest[..], 12)
}

fn to_hex_short(bytes: &[u8], chars: usize) -> String {
    const HEX: &[u8; 16] = b"0123456789abcdef";
    bytes
        .iter()
        .flat_map(|b| [HEX[(b >> 4) as usize], HEX[(b & 0x0f) as usize]])
        .take(chars)
        .map(char::from)
        .collect()
}

fn apply_assignment(
    root: &mut toml::Value,
    assignment: &BTreeMap<String, toml::Value>,
) -> Result<(), String> {
    for (path, value) in assignment {
        set_path_value(root, path, value.clone())?;
    }
    Ok(())
}

/// Replaces the value at a dotted path. Intermediate tables must exist; the
/// final key may be new so optional fields can be swept.
fn set_path_value(root: &mut toml::Value, path: &str, value: toml::Value) -> Result<(), String> {
    let parts: Vec<&str> = path
        .split('.')
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .collect();
    let Some((last, parents)) = parts.split_last() else {
        return Err("empty path".to_string());
    };
    let mut cur = root;
    for key in parents {
        cur = cur
            .get_mut(*key)
            .ok_or_else(|| format!("path not found: {}", path))?;
        if !cur.is_table() {
            return Err(format!("path is not a table: {}", path));
        }
    }
    let table = cur
        .as_table_mut()
        .ok_or_else(|| format!("path is not a table: {}", path))?;
    table.insert((*last).to_string(), value);
    Ok(())
}

fn read_metrics_from_result(path: &Path) -> Result<RunMetrics, String> {
    let raw = std::fs::read_to_string(path)
        .map_err(|err| format!("failed to read {}: {err}", path.display()))?;
    let result: BacktestResult = serde_json::from_str(&raw)
        .map_err(|err| format!("failed to parse {}: {err}", path.display()))?;
    Ok(RunMetrics::from_result(&result))
}

fn write_manifest(dir: &Path, result: &SweepResult) -> Result<(), String> {
    let path = dir.join("manifest.json");
    let json = serde_json::to_string_pretty(result)
        .map_err(|err| format!("failed to serialize manifest: {err}"))?;
    std::fs::write(&path, json)
        .map_err(|err| format!("failed to write {}: {err}", path.display()))?;
    Ok(())
}

const METRIC_COLUMNS: [&str; 8] = [
    "bars_processed",
    "total_trades",
    "win_rate",
    "final_balance",
    "profit_loss",
    "profit_loss_percent",
    "max_drawdown",
    "max_drawdown_percent",
];

fn metric_cells(m: &RunMetrics) -> Vec<String> {
    vec![
        m.bars_processed.to_string(),
        m.total_trades.to_string(),
        format!("{}", m.win_rate),
        format!("{}", m.final_balance),
        format!("{}", m.profit_loss),
        format!("{}", m.profit_loss_percent),
        format!("{}", m.max_drawdown),
        format!("{}", m.max_drawdown_percent),
    ]
}

fn params_cell(params: &BTreeMap<String, toml::Value>) -> String {
    params
        .iter()
        .map(|(path, value)| format!("{path}={value}"))
        .collect::<Vec<_>>()
        .join(";")
}

fn write_results_csv(dir: &Path, result: &SweepResult) -> Result<(), String> {
    let path = dir.join("results.csv");
    let mut wtr = csv::Writer::from_path(&path)
        .map_err(|err| format!("failed to create {}: {err}", path.display()))?;
    let mut header = vec!["run_id", "status", "params"];
    header.extend(METRIC_COLUMNS);
    header.push("error");
    wtr.write_record(&header)
        .map_err(|err| format!("failed to write results header: {err}"))?;

    for r in &result.runs {
        let mut record = vec![r.run_id.clone(), r.status.clone(), params_cell(&r.params)];
        match &r.metrics {
            Some(m) => record.extend(metric_cells(m)),
            None => record.extend(METRIC_COLUMNS.iter().map(|_| String::new())),
        }
        record.push(r.error.clone().unwrap_or_default());
        wtr.write_record(record)
            .map_err(|err| format!("failed to write results row: {err}"))?;
    }
    wtr.flush()
        .map_err(|err| format!("failed to flush {}: {err}", path.display()))?;
    Ok(())
}

fn write_leaderboard_csv(
    dir: &Path,
    result: &SweepResult,
    cfg: Option<&LeaderboardConfig>,
) -> Result<(), String> {
    let sort_by = cfg
        .and_then(|c| c.sort_by.as_deref())
        .unwrap_or("profit_loss_percent")
        .trim()
        .to_lowercase();
    let descending = cfg.and_then(|c| c.descending).unwrap_or(true);

    let mut rows: Vec<(&SweepRunEntry, RunMetrics)> = result
        .runs
        .iter()
        .filter(|r| r.status != "error")
        .filter_map(|r| r.metrics.map(|m| (r, m)))
        .collect();
    rows.sort_by(|(_, a), (_, b)| {
        let av = metric_value(a, &sort_by);
        let bv = metric_value(b, &sort_by);
        let ord = bv.partial_cmp(&av).unwrap_or(std::cmp::Ordering::Equal);
        if descending {
            ord
        } else {
            ord.reverse()
        }
    });

    let path = dir.join("leaderboard.csv");
    let mut wtr = csv::Writer::from_path(&path)
        .map_err(|err| format!("failed to create {}: {err}", path.display()))?;
    let mut header = vec!["rank", "run_id", "params"];
    header.extend(METRIC_COLUMNS);
    wtr.write_record(&header)
        .map_err(|err| format!("failed to write leaderboard header: {err}"))?;

    for (idx, (r, m)) in rows.iter().enumerate() {
        let mut record = vec![
            (idx + 1).to_string(),
            r.run_id.clone(),
            params_cell(&r.params),
        ];
        record.extend(metric_cells(m));
        wtr.write_record(record)
            .map_err(|err| format!("failed to write leaderboard row: {err}"))?;
    }
    wtr.flush()
        .map_err(|err| format!("failed to flush {}: {err}", path.display()))?;
    Ok(())
}

fn metric_value(m: &RunMetrics, key: &str) -> f64 {
    match key {
        "profit_loss" | "net_profit" => m.profit_loss,
        "final_balance" => m.final_balance,
        "max_drawdown" => m.max_drawdown,
        "max_drawdown_percent" | "max_dd" => m.max_drawdown_percent,
        "total_trades" | "trades" => m.total_trades as f64,
        "bars_processed" => m.bars_processed as f64,
        "win_rate" => m.win_rate,
        _ => m.profit_loss_percent,
    }
}

/// Serves one pre-loaded candle set to every run of a sweep.
struct InMemoryMarketDataRepository {
    candles: Vec<Candle>,
}

impl MarketDataRepository for InMemoryMarketDataRepository {
    fn load_ohlcv(&self, query: &OhlcvQuery) -> Result<(Vec<Candle>, DataQualityReport), String> {
        let candles: Vec<Candle> = self
            .candles
            .iter()
            .filter(|c| query.start.map(|s| c.timestamp >= s).unwrap_or(true))
            .filter(|c| query.end.map(|e| c.timestamp <= e).unwrap_or(true))
            .copied()
            .collect();
        let report = data_quality_from_candles(&candles, query.expected_step_seconds);
        Ok((candles, report))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agentrader_infrastructure::artifacts::FilesystemArtifactWriter;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn expand_grid_is_deterministic() {
        let params = vec![
            SweepParam {
                path: "strategy.sma_short".to_string(),
                values: vec![toml::Value::Integer(3), toml::Value::Integer(5)],
            },
            SweepParam {
                path: "strategy.sma_long".to_string(),
                values: vec![toml::Value::Integer(10), toml::Value::Integer(20)],
            },
        ];
        let grid = expand_grid(&params);
        assert_eq!(grid.len(), 4);
        assert_eq!(
            grid[0].get("strategy.sma_short").and_then(|v| v.as_integer()),
            Some(3)
        );
        assert_eq!(
            grid[0].get("strategy.sma_long").and_then(|v| v.as_integer()),
            Some(10)
        );
        assert_eq!(
            grid[3].get("strategy.sma_short").and_then(|v| v.as_integer()),
            Some(5)
        );
        assert_eq!(
            grid[3].get("strategy.sma_long").and_then(|v| v.as_integer()),
            Some(20)
        );
        assert_eq!(assignment_hash(&grid[1]), assignment_hash(&grid[1].clone()));
        assert_ne!(assignment_hash(&grid[0]), assignment_hash(&grid[1]));
        assert_eq!(assignment_hash(&grid[0]).len(), 12);
    }

    #[test]
    fn set_path_value_rejects_missing_table() {
        let mut v: toml::Value = toml::from_str("[a]\nb=1\n").expect("toml");
        let err = set_path_value(&mut v, "x.c", toml::Value::Integer(2)).expect_err("missing");
        assert!(err.contains("path not found"));

        set_path_value(&mut v, "a.c", toml::Value::Integer(2)).expect("new key");
        assert_eq!(v["a"]["c"].as_integer(), Some(2));
    }

    #[test]
    fn param_paths_cannot_touch_data_identity() {
        for path in ["run.symbol", "data.csv_path", "paths.out_dir", "run.run_id"] {
            let err = validate_param_paths(&[SweepParam {
                path: path.to_string(),
                values: vec![toml::Value::Integer(1)],
            }])
            .expect_err("forbidden path");
            assert!(err.contains("not allowed"), "{err}");
        }
        let err = validate_param_paths(&[SweepParam {
            path: "strategy.sma_short".to_string(),
            values: Vec::new(),
        }])
        .expect_err("no values");
        assert!(err.contains("no values"));
    }

    #[test]
    fn normalize_parallelism_guards_invalid_values() {
        assert_eq!(normalize_parallelism(None), 1);
        assert_eq!(normalize_parallelism(Some(0)), 1);
        assert_eq!(normalize_parallelism(Some(4)), 4);
    }

    #[test]
    fn hex_prefix_has_requested_length() {
        assert_eq!(to_hex_short(&[0xab, 0xcd, 0xef], 5), "abcde");
        assert_eq!(to_hex_short(&[0x01], 12), "01");
    }

    fn test_temp_dir(prefix: &str) -> PathBuf {
        let unique = format!(
            "{}_{}_{}",
            prefix,
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("clock before UNIX_EPOCH")
                .as_nanos()
        );
        std::env::temp_dir().join(unique)
    }

    fn wave_candles(count: usize) -> Vec<Candle> {
        (0..count)
            .map(|index| {
                let ts = 3_600_i64 * index as i64;
                let close = 100.0 + 20.0 * ((index as f64) / 6.0).sin();
                Candle {
                    timestamp: ts,
                    open: close,
                    high: close + 1.0,
                    low: close - 1.0,
                    close,
                    volume: 1.0,
                }
            })
            .collect()
    }

    fn write_sweep_files(temp_dir: &Path, params: &str) -> PathBuf {
        let out_dir = temp_dir.join("runs_out");
        let base_config = format!(
            r#"
[run]
run_id = "base_run"
symbol = "BTCUSDT"
interval = "1h"
initial_balance = 1000.0

[data]
source = "csv"
csv_path = "unused.csv"

[strategy]
kind = "sma"
sma_short = 3
sma_long = 10

[paths]
out_dir = "{}"
"#,
            out_dir.display()
        );
        std::fs::write(temp_dir.join("base.toml"), base_config).expect("write base config");

        let sweep_path = temp_dir.join("sweep.toml");
        std::fs::write(
            &sweep_path,
            format!(
                r#"
[base]
config = "base.toml"

[sweep]
id = "sma_grid"
parallelism = 3
resume = true

{params}
"#
            ),
        )
        .expect("write sweep config");
        sweep_path
    }

    #[test]
    fn run_sweep_keeps_grid_order_and_records_failures() {
        let temp_dir = test_temp_dir("agentrader_sweep");
        std::fs::create_dir_all(&temp_dir).expect("temp dir");
        let sweep_path = write_sweep_files(
            &temp_dir,
            r#"
[[params]]
path = "strategy.sma_short"
values = [2, 4, 12]
"#,
        );

        let market = InMemoryMarketDataRepository {
            candles: wave_candles(120),
        };
        let artifacts = FilesystemArtifactWriter::new();
        let factory_calls = AtomicUsize::new(0);
        let client_factory = |_: &Config| -> ClientFactoryResult {
            factory_calls.fetch_add(1, Ordering::Relaxed);
            Ok(None)
        };

        let result =
            run_sweep(&sweep_path, &client_factory, &market, &artifacts).expect("run sweep");

        assert_eq!(result.runs.len(), 3);
        assert_eq!(factory_calls.load(Ordering::Relaxed), 3);
        let expected_ids: Vec<String> = expand_grid(&[SweepParam {
            path: "strategy.sma_short".to_string(),
            values: vec![
                toml::Value::Integer(2),
                toml::Value::Integer(4),
                toml::Value::Integer(12),
            ],
        }])
        .iter()
        .map(|assignment| format!("sma_grid__{}", assignment_hash(assignment)))
        .collect();
        let actual_ids: Vec<String> = result.runs.iter().map(|r| r.run_id.clone()).collect();
        assert_eq!(actual_ids, expected_ids);

        // sma_short = 12 is not below sma_long = 10
        assert_eq!(result.runs[0].status, "ok");
        assert_eq!(result.runs[1].status, "ok");
        assert_eq!(result.runs[2].status, "error");
        assert!(result.runs[2]
            .error
            .as_deref()
            .is_some_and(|e| e.contains("invalid configuration")));

        let sweep_dir = &result.sweep_dir;
        assert!(sweep_dir.join("manifest.json").exists());
        assert!(sweep_dir.join("results.csv").exists());
        let leaderboard =
            std::fs::read_to_string(sweep_dir.join("leaderboard.csv")).expect("leaderboard");
        assert_eq!(leaderboard.lines().count(), 3);

        let mut reader = csv::Reader::from_path(sweep_dir.join("leaderboard.csv")).expect("csv");
        let pnl: Vec<f64> = reader
            .records()
            .map(|row| {
                let row = row.expect("row");
                row[8].parse::<f64>().expect("profit_loss_percent")
            })
            .collect();
        assert!(pnl[0] >= pnl[1]);

        let rerun =
            run_sweep(&sweep_path, &client_factory, &market, &artifacts).expect("resume sweep");
        assert_eq!(rerun.count_status("skipped"), 2);
        assert_eq!(rerun.count_status("error"), 1);
        assert_eq!(rerun.runs[0].metrics, result.runs[0].metrics);

        let _ = std::fs::remove_dir_all(&temp_dir);
    }

    #[test]
    fn run_sweep_rejects_duplicate_timestamps_before_any_run() {
        let temp_dir = test_temp_dir("agentrader_sweep_dup");
        std::fs::create_dir_all(&temp_dir).expect("temp dir");
        let sweep_path = write_sweep_files(
            &temp_dir,
            r#"
[[params]]
path = "strategy.sma_short"
values = [2, 4]
"#,
        );

        let mut candles = wave_candles(40);
        let repeated = candles[5];
        candles.insert(6, repeated);
        let market = InMemoryMarketDataRepository { candles };
        let client_factory = |_: &Config| -> ClientFactoryResult { Ok(None) };

        let err = run_sweep(
            &sweep_path,
            &client_factory,
            &market,
            &FilesystemArtifactWriter::new(),
        )
        .expect_err("duplicate timestamp");
        assert!(err.starts_with("malformed data"), "{err}");
        let sweep_dir = temp_dir.join("runs_out").join("sweeps").join("sma_grid");
        assert!(!sweep_dir.join("manifest.json").exists());

        let _ = std::fs::remove_dir_all(&temp_dir);
    }

    #[test]
    fn in_memory_repository_filters_inclusive_window() {
        let market = InMemoryMarketDataRepository {
            candles: wave_candles(10),
        };
        let (candles, report) = market
            .load_ohlcv(&OhlcvQuery {
                symbol: "BTCUSDT".to_string(),
                interval: "1h".to_string(),
                expected_step_seconds: Some(3_600),
                start: Some(3_600),
                end: Some(4 * 3_600),
            })
            .expect("load");
        assert_eq!(candles.len(), 4);
        assert_eq!(report.rows, 4);
        assert_eq!(report.gaps, 0);
    }
}
