use super::{json_pretty, EXIT_PROFILE_REJECTED, EXIT_SUCCESS};
use devprofile_report::{parse_status_report, ErrorAggregator};
use std::path::Path;

pub fn run(file: &Path, json: bool) -> Result<u8, String> {
    let content = std::fs::read_to_string(file)
        .map_err(|e| format!("failed to read report {}: {e}", file.display()))?;
    let report = parse_status_report(&content).map_err(|e| format!("report error: {e}"))?;

    let mut errors = ErrorAggregator::new();
    errors.absorb(report);

    if json {
        println!("{}", json_pretty(&errors.errors())?);
    } else if errors.is_empty() {
        println!("no validation errors");
    } else {
        for error in errors.errors() {
            println!("{error}");
        }
    }

    if errors.is_empty() {
        Ok(EXIT_SUCCESS)
    } else {
        Ok(EXIT_PROFILE_REJECTED)
    }
}
