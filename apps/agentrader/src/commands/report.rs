use agentrader_application::reporting::{generate_report, render_text};
use std::path::PathBuf;

pub(super) fn run_report(input: PathBuf, json: bool) -> Result<(), String> {
    let deps = crate::infra::build_reporting_deps();
    let report = generate_report(input.as_path(), deps.reader.as_ref())?;

    if json {
        let line = serde_json::to_string_pretty(&report)
            .map_err(|err| format!("failed to serialize report: {err}"))?;
        println!("{line}");
    } else {
        println!("{}", render_text(&report));
    }
    Ok(())
}
