//! Capabilities consumed from the device-management host.
//!
//! A `ManagerHost` hands out the raw manager, either synchronously or later
//! through `HostEvents`. The manager in turn exposes the profile feature, which
//! is what actually accepts profile submissions. Asynchronous deliveries from
//! any thread go through `HostEvents` and are serialized onto the controller.

use crate::acquisition::RetryOutcome;
use crate::status::{Acquisition, StatusCode};
use crate::HostError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::mpsc::error::SendError;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};

/// Functional area requested from a manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeatureType {
    Profile,
}

impl fmt::Display for FeatureType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Profile => f.write_str("PROFILE"),
        }
    }
}

/// How a manager resolves feature handles on this platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeatureDelivery {
    /// `Manager::feature` returns the handle directly.
    #[default]
    Immediate,
    /// `Manager::request_feature` returns at once and the handle arrives as a
    /// feature status through `HostEvents`.
    Deferred,
}

impl fmt::Display for FeatureDelivery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Immediate => f.write_str("immediate"),
            Self::Deferred => f.write_str("deferred"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileFlag {
    /// Apply the profile.
    Set,
}

/// Result of one profile submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub status: StatusCode,
    /// Structured report attached to a `CheckXml` status.
    pub report: Option<String>,
}

impl Submission {
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            report: None,
        }
    }

    #[must_use]
    pub fn with_report(mut self, report: impl Into<String>) -> Self {
        self.report = Some(report.into());
        self
    }
}

/// Source of the raw manager handle.
pub trait ManagerHost: Send + Sync {
    /// Ask for the manager. `Ready` hands it over now; `Pending` means it will
    /// be delivered through `events`; `Transient` and `Err` both mean the
    /// request should be retried later.
    fn request_manager(
        &self,
        events: &HostEvents,
    ) -> Result<Acquisition<Box<dyn Manager>>, HostError>;
}

/// Raw connection to the device-management subsystem.
pub trait Manager: Send {
    fn feature_delivery(&self) -> FeatureDelivery;

    /// Resolve a feature handle synchronously. `None` means not available yet.
    fn feature(
        &mut self,
        feature: FeatureType,
    ) -> Result<Option<Box<dyn ProfileFeature>>, HostError>;

    /// Start resolving a feature handle; the result arrives via
    /// `HostEvents::feature_status`.
    fn request_feature(&mut self, feature: FeatureType, events: &HostEvents)
        -> Result<(), HostError>;

    fn release(&mut self);
}

/// Profile-processing capability of a manager.
pub trait ProfileFeature: Send {
    fn process_profile(&mut self, name: &str, flag: ProfileFlag, data: &[String]) -> Submission;
}

pub(crate) enum ControllerEvent {
    Manager(Acquisition<Box<dyn Manager>>),
    Feature(Acquisition<Box<dyn ProfileFeature>>),
    ManagerClosed,
    RetryAcquire { attempt: u32, elapsed: Duration },
    RetryFinished(RetryOutcome),
}

impl ControllerEvent {
    fn label(&self) -> &'static str {
        match self {
            Self::Manager(_) => "manager",
            Self::Feature(_) => "feature",
            Self::ManagerClosed => "manager-closed",
            Self::RetryAcquire { .. } => "retry-acquire",
            Self::RetryFinished(_) => "retry-finished",
        }
    }
}

/// Listener handle given to hosts for asynchronous deliveries.
///
/// Deliveries after the command has completed are silently discarded.
#[derive(Clone)]
pub struct HostEvents {
    tx: UnboundedSender<ControllerEvent>,
}

impl HostEvents {
    pub(crate) fn new(tx: UnboundedSender<ControllerEvent>) -> Self {
        Self { tx }
    }

    pub fn manager_opened(&self, manager: Box<dyn Manager>) {
        self.send(ControllerEvent::Manager(Acquisition::Ready(manager)));
    }

    pub fn manager_status(&self, status: Acquisition<Box<dyn Manager>>) {
        self.send(ControllerEvent::Manager(status));
    }

    /// Unsolicited close of the raw manager by the platform.
    pub fn manager_closed(&self) {
        self.send(ControllerEvent::ManagerClosed);
    }

    pub fn feature_status(&self, status: Acquisition<Box<dyn ProfileFeature>>) {
        self.send(ControllerEvent::Feature(status));
    }

    /// Post to the controller. A manager delivered after the command finished
    /// is released here, since nothing else will own it.
    pub(crate) fn send(&self, event: ControllerEvent) -> bool {
        let label = event.label();
        let Err(SendError(event)) = self.tx.send(event) else {
            return true;
        };
        trace!("dropping {label} event: command already completed");
        if let ControllerEvent::Manager(Acquisition::Ready(mut manager)) = event {
            manager.release();
            debug!("released manager delivered after completion");
        }
        false
    }
}

impl fmt::Debug for HostEvents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostEvents")
            .field("closed", &self.tx.is_closed())
            .finish()
    }
}
