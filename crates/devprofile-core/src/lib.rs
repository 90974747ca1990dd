//! Profile execution against a device-management subsystem that may not be
//! ready yet.
//!
//! `ProfileCommand` acquires the manager from a `ManagerHost` (retrying in the
//! background while the subsystem comes up), resolves its profile feature,
//! submits the profile once, interprets the returned status and report, and
//! reports exactly one outcome through `ResultCallbacks` after releasing every
//! handle it acquired. A watchdog bounds the whole call.

pub mod acquisition;
pub mod command;
pub mod host;
pub mod lifecycle;
pub mod mock;
pub mod progress;
pub mod settings;
pub mod status;
pub mod types;

pub use acquisition::{AcquisitionState, Attempt, Released, RetryOutcome};
pub use command::{ExecutionRequest, ProfileCommand};
pub use host::{
    FeatureDelivery, FeatureType, HostEvents, Manager, ManagerHost, ProfileFeature, ProfileFlag,
    Submission,
};
pub use lifecycle::{validate_transition, Phase};
pub use mock::{HostJournal, HostScript, ManagerDelivery, ScriptedHost};
pub use progress::{ExecutionOutcome, MessageLevel, Notification, ResultCallbacks};
pub use settings::{AcquisitionPolicy, CommandSettings, Settings};
pub use status::{Acquisition, StatusCode};
pub use types::{CommandId, ProfileName};

use devprofile_report::{render_summary, ReportError, ValidationError};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("manager not ready: {0}")]
    AcquisitionTransient(String),
    #[error(
        "could not retrieve manager after waiting {} seconds; contact your administrator or check the device logs",
        .elapsed.as_secs()
    )]
    AcquisitionExhausted { elapsed: Duration },
    #[error("profile update failed: {status}\nProfile:\n{profile}")]
    SubmissionRejected {
        status: StatusCode,
        profile: ProfileName,
    },
    #[error("{}", render_summary(.0))]
    ValidationFailed(Vec<ValidationError>),
    #[error("error while trying to parse the status report: {0}")]
    MalformedReport(#[from] ReportError),
    #[error("command {command_id} timed out after {} ms", .timeout.as_millis())]
    OperationTimedOut {
        command_id: CommandId,
        timeout: Duration,
    },
    #[error("invalid state transition: {from} -> {to}")]
    InvalidTransition { from: Phase, to: Phase },
    #[error("host error: {0}")]
    Host(#[from] HostError),
}

/// Failure raised by a host capability.
#[derive(Debug, Error)]
pub enum HostError {
    #[error("manager request failed: {0}")]
    Request(String),
    #[error("{feature} feature request failed: {reason}")]
    Feature {
        feature: FeatureType,
        reason: String,
    },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read settings: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid settings: {0}")]
    Invalid(String),
}
