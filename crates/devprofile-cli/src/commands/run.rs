use super::{colorize_progress, json_pretty, EXIT_PROFILE_REJECTED, EXIT_SUCCESS};
use devprofile_core::{
    ExecutionRequest, HostScript, Notification, ProfileCommand, ScriptedHost, Settings,
};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;

#[derive(Debug, Serialize)]
struct RunReport<'a> {
    name: &'a str,
    outcome: &'static str,
    message: String,
    progress: Vec<String>,
}

pub fn run(
    profile: &Path,
    name: &str,
    scenario: Option<&Path>,
    config: Option<&Path>,
    json: bool,
) -> Result<u8, String> {
    let payload = std::fs::read_to_string(profile)
        .map_err(|e| format!("failed to read profile {}: {e}", profile.display()))?;
    let settings = match config {
        Some(path) => Settings::load(path).map_err(|e| format!("config error: {e}"))?,
        None => Settings::default(),
    };
    let script = match scenario {
        Some(path) => HostScript::load(path).map_err(|e| format!("config error: scenario: {e}"))?,
        None => HostScript::default(),
    };

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .map_err(|e| format!("failed to start runtime: {e}"))?;

    let (progress, terminal) = runtime.block_on(async {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let handle = ProfileCommand::new(Arc::new(ScriptedHost::new(script)))
            .with_settings(settings.command)
            .with_policy(settings.acquisition)
            .execute(ExecutionRequest::new(name, payload), Arc::new(tx));

        let mut progress = Vec::new();
        let mut terminal = None;
        while let Some(notification) = rx.recv().await {
            match notification {
                Notification::Status(line) => {
                    if !json {
                        eprintln!("{}", colorize_progress(&line));
                    }
                    progress.push(line);
                }
                outcome => terminal = Some(outcome),
            }
        }
        handle
            .await
            .map_err(|e| format!("profile execution task failed: {e}"))?;
        Ok::<_, String>((progress, terminal))
    })?;

    let (outcome, message, code) = match terminal {
        Some(Notification::Success(message)) => ("success", message, EXIT_SUCCESS),
        Some(Notification::Error(message)) => ("error", message, EXIT_PROFILE_REJECTED),
        _ => return Err("profile execution ended without an outcome".to_owned()),
    };

    if json {
        let report = RunReport {
            name,
            outcome,
            message,
            progress,
        };
        println!("{}", json_pretty(&report)?);
    } else if code == EXIT_SUCCESS {
        println!("{message}");
    } else {
        eprintln!("{message}");
    }
    Ok(code)
}
