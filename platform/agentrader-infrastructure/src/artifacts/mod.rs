use crate::reporting;
use agentrader_domain::entities::result::BacktestResult;
use agentrader_domain::repositories::artifacts::{ArtifactReader, ArtifactWriter};
use agentrader_domain::services::audit::AuditEvent;
use agentrader_domain::value_objects::equity_point::EquityPoint;
use agentrader_domain::value_objects::trade::Trade;
use std::fs;
use std::path::Path;
use std::time::Instant;

#[derive(Debug, Default, Clone, Copy)]
pub struct FilesystemArtifactWriter;

impl FilesystemArtifactWriter {
    pub fn new() -> Self {
        Self
    }
}

fn record_write_metrics(kind: &'static str, start: Instant, result: &Result<(), String>) {
    let result_label = if result.is_ok() { "ok" } else { "err" };
    metrics::counter!(
        "agentrader.infra.artifacts.write.calls_total",
        "kind" => kind,
        "result" => result_label
    )
    .increment(1);
    metrics::histogram!(
        "agentrader.infra.artifacts.write_ms",
        "kind" => kind,
        "result" => result_label
    )
    .record(start.elapsed().as_millis() as f64);
}

fn record_read_metrics<T>(kind: &'static str, start: Instant, result: &Result<T, String>) {
    let result_label = if result.is_ok() { "ok" } else { "err" };
    metrics::counter!(
        "agentrader.infra.artifacts.read.calls_total",
        "kind" => kind,
        "result" => result_label
    )
    .increment(1);
    metrics::histogram!(
        "agentrader.infra.artifacts.read_ms",
        "kind" => kind,
        "result" => result_label
    )
    .record(start.elapsed().as_millis() as f64);
}

impl ArtifactWriter for FilesystemArtifactWriter {
    fn ensure_dir(&self, path: &Path) -> Result<(), String> {
        let start = Instant::now();
        let result = fs::create_dir_all(path)
            .map_err(|err| format!("failed to create dir {}: {}", path.display(), err));
        record_write_metrics("dir", start, &result);
        result
    }

    fn write_result_json(&self, path: &Path, result: &BacktestResult) -> Result<(), String> {
        let start = Instant::now();
        let outcome = reporting::write_result_json(path, result);
        record_write_metrics("result_json", start, &outcome);
        outcome
    }

    fn write_trades_csv(&self, path: &Path, trades: &[Trade]) -> Result<(), String> {
        let start = Instant::now();
        let result = reporting::write_trades_csv(path, trades);
        record_write_metrics("trades_csv", start, &result);
        result
    }

    fn write_equity_csv(&self, path: &Path, points: &[EquityPoint]) -> Result<(), String> {
        let start = Instant::now();
        let result = reporting::write_equity_csv(path, points);
        record_write_metrics("equity_csv", start, &result);
        result
    }

    fn write_audit_jsonl(&self, path: &Path, events: &[AuditEvent]) -> Result<(), String> {
        let start = Instant::now();
        let result = reporting::write_audit_jsonl(path, events);
        record_write_metrics("audit_jsonl", start, &result);
        result
    }

    fn write_config_snapshot_toml(&self, path: &Path, contents: &str) -> Result<(), String> {
        let start = Instant::now();
        let result = fs::write(path, contents).map_err(|err| {
            format!(
                "failed to write config snapshot {}: {}",
                path.display(),
                err
            )
        });
        record_write_metrics("config_snapshot", start, &result);
        result
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct FilesystemArtifactReader;

impl FilesystemArtifactReader {
    pub fn new() -> Self {
        Self
    }
}

impl ArtifactReader for FilesystemArtifactReader {
    fn read_result_json(&self, path: &Path) -> Result<BacktestResult, String> {
        let start = Instant::now();
        let result = reporting::read_result_json(path);
        record_read_metrics("result_json", start, &result);
        result
    }

    fn exists(&self, path: &Path) -> bool {
        path.exists()
    }
}

#[cfg(test)]
mod tests {
    use super::{FilesystemArtifactReader, FilesystemArtifactWriter};
    use agentrader_domain::repositories::artifacts::{ArtifactReader, ArtifactWriter};
    use std::fs;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn unique_tmp_dir(prefix: &str) -> PathBuf {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        std::env::temp_dir().join(format!(
            "agentrader_{prefix}_{}_{}",
            std::process::id(),
            now
        ))
    }

    #[test]
    fn writer_creates_nested_dirs_and_snapshot() {
        let root = unique_tmp_dir("artifacts");
        let run_dir = root.join("runs").join("run_1");
        let writer = FilesystemArtifactWriter::new();
        writer.ensure_dir(&run_dir).expect("ensure dir");
        writer
            .write_config_snapshot_toml(&run_dir.join("config_snapshot.toml"), "[run]\n")
            .expect("snapshot");

        let reader = FilesystemArtifactReader::new();
        assert!(reader.exists(&run_dir.join("config_snapshot.toml")));
        assert!(!reader.exists(&run_dir.join("result.json")));
        assert_eq!(
            fs::read_to_string(run_dir.join("config_snapshot.toml")).expect("read"),
            "[run]\n"
        );
        assert!(reader.read_result_json(&run_dir.join("result.json")).is_err());
        let _ = fs::remove_dir_all(&root);
    }
}
