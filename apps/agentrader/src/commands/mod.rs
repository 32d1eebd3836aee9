mod backtest;
mod common;
mod report;
mod sweep;
mod validate;

use std::path::PathBuf;
use std::time::Instant;

pub enum Command {
    Backtest {
        config: PathBuf,
        out: Option<PathBuf>,
        json: bool,
    },
    Sweep {
        config: PathBuf,
    },
    Validate {
        config: PathBuf,
        strict: bool,
    },
    Report {
        input: PathBuf,
        json: bool,
    },
}

impl Command {
    fn name(&self) -> &'static str {
        match self {
            Command::Backtest { .. } => "backtest",
            Command::Sweep { .. } => "sweep",
            Command::Validate { .. } => "validate",
            Command::Report { .. } => "report",
        }
    }
}

pub fn run(command: Command) -> Result<(), String> {
    let name = command.name();
    let start = Instant::now();
    let result = match command {
        Command::Backtest { config, out, json } => backtest::run_backtest(config, out, json),
        Command::Sweep { config } => sweep::run_sweep(config),
        Command::Validate { config, strict } => validate::run_validate(config, strict),
        Command::Report { input, json } => report::run_report(input, json),
    };

    let result_label = if result.is_ok() { "ok" } else { "err" };
    metrics::histogram!("agentrader.cli.command_ms", "command" => name, "result" => result_label)
        .record(start.elapsed().as_millis() as f64);
    tracing::debug!(
        command = name,
        result = result_label,
        total_ms = start.elapsed().as_millis() as u64,
        "command finished"
    );
    result
}
