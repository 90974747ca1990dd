//! Command and acquisition timing policy.

use crate::types::CommandId;
use crate::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_COMMAND_ID: &str = "ProfileManagerCommand";
/// Overall watchdog bounding one `execute` call.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
/// Pause between two manager requests issued by the retry watcher.
pub const RETRY_DELAY: Duration = Duration::from_secs(2);
/// The retry watcher keeps running at least this long, even once a manager is held.
pub const RETRY_MIN_ELAPSED: Duration = Duration::from_secs(2);
/// Hard ceiling on the retry watcher's lifetime.
pub const RETRY_MAX_ELAPSED: Duration = Duration::from_secs(10 * 60);

/// Lifecycle scaffolding shared by commands: identifier and watchdog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct CommandSettings {
    pub command_id: CommandId,
    #[serde(rename = "timeout_ms", with = "millis")]
    pub timeout: Duration,
    pub timeout_enabled: bool,
}

impl Default for CommandSettings {
    fn default() -> Self {
        Self {
            command_id: CommandId::new(DEFAULT_COMMAND_ID),
            timeout: DEFAULT_TIMEOUT,
            timeout_enabled: true,
        }
    }
}

/// Timing of the background retry watcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AcquisitionPolicy {
    #[serde(rename = "retry_delay_ms", with = "millis")]
    pub retry_delay: Duration,
    #[serde(rename = "min_elapsed_ms", with = "millis")]
    pub min_elapsed: Duration,
    #[serde(rename = "max_elapsed_ms", with = "millis")]
    pub max_elapsed: Duration,
}

impl Default for AcquisitionPolicy {
    fn default() -> Self {
        Self {
            retry_delay: RETRY_DELAY,
            min_elapsed: RETRY_MIN_ELAPSED,
            max_elapsed: RETRY_MAX_ELAPSED,
        }
    }
}

impl AcquisitionPolicy {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.retry_delay.is_zero() {
            return Err(ConfigError::Invalid(
                "acquisition.retry_delay_ms must be greater than zero".to_owned(),
            ));
        }
        if self.min_elapsed > self.max_elapsed {
            return Err(ConfigError::Invalid(format!(
                "acquisition.min_elapsed_ms ({}) exceeds max_elapsed_ms ({})",
                self.min_elapsed.as_millis(),
                self.max_elapsed.as_millis()
            )));
        }
        Ok(())
    }
}

/// Settings file with `[command]` and `[acquisition]` tables. Missing tables
/// and keys fall back to the built-in constants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub command: CommandSettings,
    #[serde(default)]
    pub acquisition: AcquisitionPolicy,
}

impl Settings {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(input)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command.command_id.is_empty() {
            return Err(ConfigError::Invalid(
                "command.command_id must not be empty".to_owned(),
            ));
        }
        if self.command.timeout_enabled && self.command.timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "command.timeout_ms must be greater than zero".to_owned(),
            ));
        }
        self.acquisition.validate()
    }
}

mod millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
