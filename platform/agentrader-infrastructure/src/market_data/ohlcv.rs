use agentrader_domain::repositories::market_data::{MarketDataRepository, OhlcvQuery};
use agentrader_domain::services::ohlcv::{canonicalize_candles, DataQualityReport};
use agentrader_domain::value_objects::candle::Candle;
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Instant;

#[derive(Debug, Deserialize)]
pub struct OhlcvRecord {
    pub timestamp_utc: String,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// One CSV file per symbol and interval.
#[derive(Debug, Clone)]
pub struct CsvMarketDataRepository {
    pub path: PathBuf,
}

impl CsvMarketDataRepository {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl MarketDataRepository for CsvMarketDataRepository {
    fn load_ohlcv(&self, query: &OhlcvQuery) -> Result<(Vec<Candle>, DataQualityReport), String> {
        let start = Instant::now();
        let _span = tracing::info_span!(
            "infra.csv.load_ohlcv",
            path = %self.path.display(),
            symbol = %query.symbol,
            interval = %query.interval
        )
        .entered();

        let result = load_csv_window(
            &self.path,
            query.expected_step_seconds,
            query.start,
            query.end,
        );
        let result_label = if result.is_ok() { "ok" } else { "err" };
        metrics::counter!("agentrader.infra.csv.load_ohlcv.calls_total", "result" => result_label)
            .increment(1);
        metrics::histogram!("agentrader.infra.csv.load_ohlcv_ms")
            .record(start.elapsed().as_secs_f64() * 1000.0);

        match &result {
            Ok((candles, report)) => {
                metrics::gauge!("agentrader.infra.csv.load_ohlcv.candles_loaded")
                    .set(candles.len() as f64);
                tracing::debug!(
                    rows = report.rows,
                    candles = candles.len(),
                    invalid_rows = report.invalid_rows,
                    duplicates = report.duplicates,
                    gaps = report.gaps,
                    out_of_order = report.out_of_order,
                    "loaded OHLCV"
                );
            }
            Err(err) => tracing::warn!(error = %err, "failed to load OHLCV CSV"),
        }
        result
    }
}

pub fn load_csv(path: &Path) -> Result<(Vec<Candle>, DataQualityReport), String> {
    load_csv_window(path, None, None, None)
}

/// Reads every row, keeps those inside the inclusive `[start, end]` window
/// and canonicalises them. A row that cannot be parsed fails the whole load.
pub fn load_csv_window(
    path: &Path,
    expected_step_seconds: Option<i64>,
    start: Option<i64>,
    end: Option<i64>,
) -> Result<(Vec<Candle>, DataQualityReport), String> {
    let file = File::open(path)
        .map_err(|err| format!("failed to open OHLCV CSV {}: {}", path.display(), err))?;
    let mut reader = csv::Reader::from_reader(file);

    let mut raw = Vec::new();
    for (idx, result) in reader.deserialize::<OhlcvRecord>().enumerate() {
        // header is line 1
        let line = idx + 2;
        let record =
            result.map_err(|err| format!("failed to parse CSV row at line {line}: {err}"))?;
        let timestamp = parse_timestamp(&record.timestamp_utc)
            .map_err(|err| format!("line {line}: {err}"))?;
        if start.is_some_and(|s| timestamp < s) || end.is_some_and(|e| timestamp > e) {
            continue;
        }
        raw.push(Candle {
            timestamp,
            open: record.open,
            high: record.high,
            low: record.low,
            close: record.close,
            volume: record.volume,
        });
    }

    Ok(canonicalize_candles(raw, expected_step_seconds))
}

pub fn parse_timestamp(value: &str) -> Result<i64, String> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Ok(dt.timestamp());
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%z") {
        return Ok(dt.timestamp());
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        let dt: DateTime<Utc> = Utc.from_utc_datetime(&naive);
        return Ok(dt.timestamp());
    }
    if !value.is_empty() && value.chars().all(|ch| ch.is_ascii_digit()) {
        if let Ok(epoch) = value.parse::<i64>() {
            return Ok(epoch);
        }
    }

    Err(format!("unsupported timestamp format: {}", value))
}

#[cfg(test)]
mod tests {
    use super::{load_csv, load_csv_window, parse_timestamp, CsvMarketDataRepository};
    use agentrader_domain::repositories::market_data::{MarketDataRepository, OhlcvQuery};
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_tmp_path(name: &str) -> PathBuf {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!("agentrader_{name}_{}_{}", std::process::id(), now))
    }

    #[test]
    fn parses_supported_timestamp_formats() {
        assert_eq!(parse_timestamp("2026-01-01T00:00:00Z"), Ok(1_767_225_600));
        assert_eq!(parse_timestamp("2026-01-01T01:00:00+01:00"), Ok(1_767_225_600));
        assert_eq!(parse_timestamp("2026-01-01 00:00:00"), Ok(1_767_225_600));
        assert_eq!(parse_timestamp("2026-01-01 00:00:00+0000"), Ok(1_767_225_600));
        assert_eq!(parse_timestamp("1767225600"), Ok(1_767_225_600));
        assert!(parse_timestamp("01/01/2026").is_err());
        assert!(parse_timestamp("").is_err());
    }

    #[test]
    fn load_csv_detects_duplicates_and_gaps() {
        let tmp_path = unique_tmp_path("ohlcv_test.csv");
        let csv_data = "timestamp_utc,open,high,low,close,volume\n\
2026-01-01T00:00:00Z,1,1,1,1,1\n\
2026-01-01T00:00:00Z,1,1,1,1,1\n\
2026-01-01T00:00:02Z,1,1,1,1,1\n";
        fs::write(&tmp_path, csv_data).expect("write csv");

        let (candles, report) = load_csv(&tmp_path).expect("load csv");
        assert_eq!(candles.len(), 2);
        assert_eq!(report.rows, 3);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.gaps, 1);
        assert_eq!(report.gap_count, 1);
        assert_eq!(report.invalid_rows, 0);
        let _ = fs::remove_file(&tmp_path);
    }

    #[test]
    fn load_csv_canonicalizes_out_of_order_rows_and_drops_malformed_ones() {
        let tmp_path = unique_tmp_path("ohlcv_test_non_adj.csv");
        let csv_data = "timestamp_utc,open,high,low,close,volume\n\
2026-01-01T00:00:00Z,1,1,1,1,1\n\
2026-01-01T00:00:02Z,1,1,1,1,1\n\
2026-01-01T00:00:01Z,1,1,1,1,1\n\
2026-01-01T00:00:03Z,1,0.5,1,1,1\n\
2026-01-01T00:00:00Z,2,2,2,2,2\n";
        fs::write(&tmp_path, csv_data).expect("write csv");

        let (candles, report) = load_csv(&tmp_path).expect("load csv");
        assert_eq!(report.out_of_order, 2);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.invalid_rows, 1);
        assert_eq!(candles.len(), 3);
        assert!(candles.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
        assert!((candles[0].close - 2.0).abs() < 1e-9);
        let _ = fs::remove_file(&tmp_path);
    }

    #[test]
    fn load_csv_fails_on_unparsable_row() {
        let tmp_path = unique_tmp_path("ohlcv_test_bad.csv");
        let csv_data = "timestamp_utc,open,high,low,close,volume\n\
2026-01-01T00:00:00Z,1,1,1,1,1\n\
2026-01-01T00:01:00Z,abc,1,1,1,1\n";
        fs::write(&tmp_path, csv_data).expect("write csv");

        let err = load_csv(&tmp_path).expect_err("bad row");
        assert!(err.contains("line 3"), "{err}");
        let _ = fs::remove_file(&tmp_path);
    }

    #[test]
    fn load_csv_errors_when_file_is_missing() {
        let err = load_csv(&unique_tmp_path("missing.csv")).expect_err("missing file");
        assert!(err.contains("failed to open OHLCV CSV"));
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let tmp_path = unique_tmp_path("ohlcv_test_window.csv");
        let csv_data = "timestamp_utc,open,high,low,close,volume\n\
0,1,1,1,1,1\n\
60,2,2,2,2,1\n\
120,3,3,3,3,1\n\
180,4,4,4,4,1\n";
        fs::write(&tmp_path, csv_data).expect("write csv");

        let (candles, report) =
            load_csv_window(&tmp_path, Some(60), Some(60), Some(120)).expect("load csv");
        let stamps: Vec<i64> = candles.iter().map(|c| c.timestamp).collect();
        assert_eq!(stamps, vec![60, 120]);
        assert_eq!(report.rows, 2);
        assert_eq!(report.gaps, 0);

        let repo = CsvMarketDataRepository::new(tmp_path.clone());
        let query = OhlcvQuery {
            symbol: "BTCUSDT".to_string(),
            interval: "1m".to_string(),
            expected_step_seconds: Some(60),
            start: None,
            end: Some(60),
        };
        let (candles, _) = repo.load_ohlcv(&query).expect("repo load");
        assert_eq!(candles.len(), 2);
        let _ = fs::remove_file(&tmp_path);
    }
}
