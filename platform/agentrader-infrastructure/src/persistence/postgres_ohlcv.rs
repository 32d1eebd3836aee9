use agentrader_domain::repositories::market_data::{MarketDataRepository, OhlcvQuery};
use agentrader_domain::services::ohlcv::{canonicalize_candles, DataQualityReport};
use agentrader_domain::value_objects::candle::Candle;
use chrono::{DateTime, Utc};
use postgres::types::ToSql;
use postgres::NoTls;
use r2d2::Pool;
use r2d2_postgres::PostgresConnectionManager;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct PostgresMarketDataRepository {
    pool: Pool<PostgresConnectionManager<NoTls>>,
    pub ohlcv_table: String,
}

impl PostgresMarketDataRepository {
    pub fn new(db_url: String, ohlcv_table: String, pool_max_size: u32) -> Result<Self, String> {
        if let Err(err) = validate_table_name(&ohlcv_table) {
            return Err(format!("invalid ohlcv_table '{}': {}", ohlcv_table, err));
        }

        let config = db_url
            .parse::<postgres::Config>()
            .map_err(|err| format!("invalid postgres db url: {err}"))?;
        let manager = PostgresConnectionManager::new(config, NoTls);
        let pool = Pool::builder()
            .max_size(pool_max_size.max(1))
            .build(manager)
            .map_err(|err| format!("failed to build postgres pool: {err}"))?;

        Ok(Self { pool, ohlcv_table })
    }
}

impl MarketDataRepository for PostgresMarketDataRepository {
    fn load_ohlcv(&self, query: &OhlcvQuery) -> Result<(Vec<Candle>, DataQualityReport), String> {
        load_postgres(&self.pool, &self.ohlcv_table, query)
    }
}

fn record_failure(stage: &'static str) {
    metrics::counter!("agentrader.infra.postgres.load_ohlcv.calls_total", "result" => "err")
        .increment(1);
    metrics::counter!("agentrader.infra.postgres.load_ohlcv.errors_total", "stage" => stage)
        .increment(1);
}

pub fn load_postgres(
    pool: &Pool<PostgresConnectionManager<NoTls>>,
    table: &str,
    query: &OhlcvQuery,
) -> Result<(Vec<Candle>, DataQualityReport), String> {
    let overall_start = Instant::now();
    let span = tracing::info_span!(
        "infra.postgres.load_ohlcv",
        table = %table,
        symbol = %query.symbol,
        interval = %query.interval
    );
    let _enter = span.enter();

    if let Err(err) = validate_table_name(table) {
        record_failure("validate_table");
        tracing::warn!(error = %err, "invalid table name");
        return Err(err);
    }

    let start = match query.start.map(to_utc).transpose() {
        Ok(start) => start,
        Err(err) => {
            record_failure("bounds");
            return Err(err);
        }
    };
    let end = match query.end.map(to_utc).transpose() {
        Ok(end) => end,
        Err(err) => {
            record_failure("bounds");
            return Err(err);
        }
    };

    let get_start = Instant::now();
    let mut client = match pool.get() {
        Ok(client) => client,
        Err(err) => {
            record_failure("pool_get");
            metrics::counter!("agentrader.infra.postgres.pool.get.errors_total", "stage" => "get")
                .increment(1);
            tracing::error!(error = %err, "failed to checkout postgres connection");
            return Err(format!("failed to checkout postgres connection: {err}"));
        }
    };
    metrics::histogram!("agentrader.infra.postgres.pool.get_ms")
        .record(get_start.elapsed().as_secs_f64() * 1000.0);

    let sql = select_sql(table, start.is_some(), end.is_some());
    let mut params: Vec<&(dyn ToSql + Sync)> = vec![&query.symbol, &query.interval];
    if let Some(start) = start.as_ref() {
        params.push(start);
    }
    if let Some(end) = end.as_ref() {
        params.push(end);
    }

    let query_start = Instant::now();
    let rows = match client.query(sql.as_str(), &params) {
        Ok(rows) => rows,
        Err(err) => {
            record_failure("query");
            tracing::error!(error = %err, "failed to query OHLCV");
            return Err(format!("failed to query OHLCV: {err}"));
        }
    };
    metrics::histogram!("agentrader.infra.postgres.query_ms")
        .record(query_start.elapsed().as_secs_f64() * 1000.0);

    let rows_len = rows.len();
    let mut raw = Vec::with_capacity(rows_len);
    for row in rows {
        let timestamp: DateTime<Utc> = row.get(0);
        raw.push(Candle {
            timestamp: timestamp.timestamp(),
            open: row.get(1),
            high: row.get(2),
            low: row.get(3),
            close: row.get(4),
            volume: row.get(5),
        });
    }

    let (candles, report) = canonicalize_candles(raw, query.expected_step_seconds);

    metrics::counter!("agentrader.infra.postgres.load_ohlcv.calls_total", "result" => "ok")
        .increment(1);
    metrics::histogram!("agentrader.infra.postgres.load_ohlcv_ms")
        .record(overall_start.elapsed().as_secs_f64() * 1000.0);
    metrics::gauge!("agentrader.infra.postgres.load_ohlcv.rows_returned").set(rows_len as f64);
    metrics::counter!("agentrader.infra.postgres.load_ohlcv.rows_returned_total")
        .increment(rows_len as u64);
    metrics::gauge!("agentrader.infra.postgres.load_ohlcv.candles_loaded")
        .set(candles.len() as f64);
    metrics::gauge!("agentrader.infra.postgres.load_ohlcv.invalid_rows")
        .set(report.invalid_rows as f64);
    metrics::gauge!("agentrader.infra.postgres.load_ohlcv.duplicates")
        .set(report.duplicates as f64);
    metrics::gauge!("agentrader.infra.postgres.load_ohlcv.gaps").set(report.gaps as f64);

    tracing::debug!(
        rows = rows_len,
        candles = candles.len(),
        invalid_rows = report.invalid_rows,
        duplicates = report.duplicates,
        gaps = report.gaps,
        out_of_order = report.out_of_order,
        "loaded OHLCV"
    );
    Ok((candles, report))
}

fn to_utc(epoch: i64) -> Result<DateTime<Utc>, String> {
    DateTime::<Utc>::from_timestamp(epoch, 0)
        .ok_or_else(|| format!("timestamp out of range: {epoch}"))
}

fn select_sql(table: &str, has_start: bool, has_end: bool) -> String {
    let mut sql = format!(
        "SELECT timestamp_utc, open, high, low, close, volume FROM {} \
         WHERE symbol=$1 AND \"interval\"=$2",
        table
    );
    let mut next = 3;
    if has_start {
        sql.push_str(&format!(" AND timestamp_utc >= ${next}"));
        next += 1;
    }
    if has_end {
        sql.push_str(&format!(" AND timestamp_utc <= ${next}"));
    }
    sql.push_str(" ORDER BY timestamp_utc ASC");
    sql
}

fn validate_table_name(table: &str) -> Result<(), String> {
    if table.is_empty() {
        return Err("table name is empty".to_string());
    }
    let parts: Vec<&str> = table.split('.').collect();
    if parts.len() > 2 {
        return Err(format!("invalid table name: {table}"));
    }
    for part in parts {
        let mut chars = part.chars();
        let first = match chars.next() {
            Some(ch) => ch,
            None => return Err(format!("invalid table name: {table}")),
        };
        if !(first.is_ascii_alphabetic() || first == '_') {
            return Err(format!("invalid table name: {table}"));
        }
        if !chars.all(|ch| ch.is_ascii_alphanumeric() || ch == '_') {
            return Err(format!("invalid table name: {table}"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{load_postgres, select_sql, validate_table_name, PostgresMarketDataRepository};
    use agentrader_domain::repositories::market_data::OhlcvQuery;
    use postgres::NoTls;
    use r2d2::Pool;
    use r2d2_postgres::PostgresConnectionManager;

    fn query() -> OhlcvQuery {
        OhlcvQuery {
            symbol: "BTCUSDT".to_string(),
            interval: "1h".to_string(),
            expected_step_seconds: Some(3600),
            start: None,
            end: None,
        }
    }

    #[test]
    fn validate_table_name_accepts_schema() {
        assert!(validate_table_name("market_data").is_ok());
        assert!(validate_table_name("public.market_data").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("a.b.c").is_err());
        assert!(validate_table_name("public.").is_err());
        assert!(validate_table_name("1table").is_err());
        assert!(validate_table_name("market_data;drop").is_err());
    }

    #[test]
    fn select_sql_numbers_optional_bounds() {
        let sql = select_sql("market_data", false, false);
        assert!(sql.contains("WHERE symbol=$1 AND \"interval\"=$2 ORDER BY"));

        let sql = select_sql("market_data", true, true);
        assert!(sql.contains("timestamp_utc >= $3"));
        assert!(sql.contains("timestamp_utc <= $4"));

        let sql = select_sql("market_data", false, true);
        assert!(sql.contains("timestamp_utc <= $3"));
        assert!(!sql.contains(">="));
    }

    #[test]
    fn load_postgres_rejects_invalid_table_name_before_connect() {
        let pool = build_pool("postgres://invalid");
        let err = load_postgres(&pool, "market_data;drop", &query()).expect_err("invalid table");
        assert!(err.contains("invalid table name"));
    }

    #[test]
    fn repository_errors_on_invalid_db_url() {
        let err = PostgresMarketDataRepository::new(
            "not a url".to_string(),
            "market_data".to_string(),
            1,
        )
        .expect_err("invalid db url should fail fast");
        assert!(err.contains("invalid postgres db url"));
    }

    #[test]
    fn repository_rejects_invalid_table_name() {
        let err = PostgresMarketDataRepository::new(
            "postgres://localhost/agentrader".to_string(),
            "bad-name".to_string(),
            1,
        )
        .expect_err("invalid table");
        assert!(err.contains("invalid ohlcv_table"));
    }

    fn build_pool(db_url: &str) -> Pool<PostgresConnectionManager<NoTls>> {
        let config = db_url
            .parse::<postgres::Config>()
            .expect("test db url should parse");
        let manager = PostgresConnectionManager::new(config, NoTls);
        Pool::builder().max_size(1).build_unchecked(manager)
    }
}
