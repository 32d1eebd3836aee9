mod commands;
mod infra;
mod obs;

use clap::{Parser, Subcommand, ValueEnum};
use commands::Command;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "agentrader")]
#[command(about = "aGENtrader backtest CLI", version, arg_required_else_help = true)]
#[command(
    after_help = "Examples:\n  agentrader backtest --config configs/sample.toml --out runs/\n  agentrader sweep --config configs/sweep.toml\n  agentrader validate --config configs/sample.toml --strict\n  agentrader report --input runs/<run_id>/\n"
)]
struct Cli {
    /// Log filter (overridden by env AGENTRADER_LOG).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Expose Prometheus metrics on host:port.
    #[arg(long, global = true)]
    metrics_addr: Option<String>,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Run one backtest and write its artifacts.
    Backtest {
        #[arg(long)]
        config: PathBuf,
        /// Output root; defaults to paths.out_dir.
        #[arg(long)]
        out: Option<PathBuf>,
        /// Print the result summary as JSON.
        #[arg(long, default_value_t = false)]
        json: bool,
    },
    /// Run a parameter grid over a base config.
    Sweep {
        #[arg(long)]
        config: PathBuf,
    },
    /// Check a config and report the quality of its market data.
    Validate {
        #[arg(long)]
        config: PathBuf,
        /// Fail on any duplicate, gap, out-of-order or invalid row.
        #[arg(long, default_value_t = false)]
        strict: bool,
    },
    /// Summarise a finished run directory.
    Report {
        #[arg(long)]
        input: PathBuf,
        #[arg(long, default_value_t = false)]
        json: bool,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_format = match cli.log_format {
        LogFormat::Text => "text",
        LogFormat::Json => "json",
    };
    if let Err(err) = obs::init_tracing(&cli.log_level, log_format) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
    if let Err(err) = obs::init_metrics(cli.metrics_addr.as_deref()) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }

    let command = match cli.command {
        CliCommand::Backtest { config, out, json } => Command::Backtest { config, out, json },
        CliCommand::Sweep { config } => Command::Sweep { config },
        CliCommand::Validate { config, strict } => Command::Validate { config, strict },
        CliCommand::Report { input, json } => Command::Report { input, json },
    };

    if let Err(err) = commands::run(command) {
        eprintln!("error: {}", err);
        std::process::exit(1);
    }
}
