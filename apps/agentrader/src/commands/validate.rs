use agentrader_application::config::load_config;
use std::path::PathBuf;

pub(super) fn run_validate(config_path: PathBuf, strict: bool) -> Result<(), String> {
    let config = load_config(&config_path)?;
    super::common::print_config_summary("validate", &config, None);

    let market_data = crate::infra::build_market_data_repo(&config)?;
    let report =
        agentrader_application::validation::validate(&config, strict, market_data.as_ref())?;

    let ohlcv = &report["ohlcv"];
    println!(
        "ohlcv report: rows={}, duplicates={}, gaps={}, missing_bars={}, out_of_order={}, invalid_rows={}",
        ohlcv["rows"],
        ohlcv["duplicates"],
        ohlcv["gaps"],
        ohlcv["gap_count"],
        ohlcv["out_of_order"],
        ohlcv["invalid_rows"]
    );
    println!(
        "validation ok: {} bars usable (strict={})",
        report["series_bars"], strict
    );
    Ok(())
}
