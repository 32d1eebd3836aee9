use agentrader_application::experiments::sweep::{self, load_base_config, load_sweep_file};
use std::path::PathBuf;

pub(super) fn run_sweep(sweep_path: PathBuf) -> Result<(), String> {
    let sweep_file = load_sweep_file(&sweep_path)?;
    let (base_path, base_config, _base_toml) = load_base_config(&sweep_path, &sweep_file)?;
    println!(
        "agentrader: sweep (id={}, base={}, params={})",
        sweep_file.sweep.id,
        base_path.display(),
        sweep_file.params.len()
    );

    let market_data = crate::infra::build_market_data_repo(&base_config)?;
    let artifacts = agentrader_infrastructure::artifacts::FilesystemArtifactWriter::new();
    let client_factory = crate::infra::build_decision_client;

    let result = sweep::run_sweep(
        sweep_path.as_path(),
        &client_factory,
        market_data.as_ref(),
        &artifacts,
    )?;

    println!("sweep output: {}", result.sweep_dir.display());
    println!(
        "runs: total={} ok={} skipped={} error={} (parallelism={})",
        result.runs.len(),
        result.count_status("ok"),
        result.count_status("skipped"),
        result.count_status("error"),
        result.parallelism
    );
    for run in result.runs.iter().filter(|run| run.status == "error") {
        println!(
            "  failed {}: {}",
            run.run_id,
            run.error.as_deref().unwrap_or("unknown error")
        );
    }
    Ok(())
}
