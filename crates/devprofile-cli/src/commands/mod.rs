pub mod report;
pub mod run;

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG_ERROR: u8 = 2;
pub const EXIT_PROFILE_REJECTED: u8 = 3;

pub fn json_pretty(value: &impl serde::Serialize) -> Result<String, String> {
    serde_json::to_string_pretty(value).map_err(|e| format!("JSON serialization failed: {e}"))
}

/// Color the `<LEVEL>:` prefix of a progress line.
pub fn colorize_progress(line: &str) -> String {
    use console::Style;
    let Some((level, message)) = line.split_once(':') else {
        return line.to_owned();
    };
    let style = match level {
        "ERROR" => Style::new().red().bold(),
        "WARNING" => Style::new().yellow(),
        "SUCCESS" => Style::new().green(),
        "DEBUG" => Style::new().cyan(),
        "VERBOSE" => Style::new().dim(),
        _ => return line.to_owned(),
    };
    format!("{}:{message}", style.apply_to(level))
}
