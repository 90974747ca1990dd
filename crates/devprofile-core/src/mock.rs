//! Scripted host standing in for a real device-management subsystem.

use crate::host::{
    FeatureDelivery, FeatureType, HostEvents, Manager, ManagerHost, ProfileFeature, ProfileFlag,
    Submission,
};
use crate::status::{Acquisition, StatusCode};
use crate::{ConfigError, HostError};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// How the scripted host hands out its manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ManagerDelivery {
    /// Returned directly from `request_manager`.
    #[default]
    Immediate,
    /// Delivered later through `HostEvents::manager_opened`.
    Listener,
}

/// Behavior of a [`ScriptedHost`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct HostScript {
    /// Manager requests answered "not ready" before one succeeds.
    pub unavailable_requests: u32,
    /// Report unavailable requests as host errors instead of a not-ready status.
    pub fail_with_error: bool,
    /// Never hand out a manager.
    pub never_ready: bool,
    pub manager_delivery: ManagerDelivery,
    /// Delay before asynchronous deliveries.
    pub delivery_delay_ms: u64,
    pub feature_delivery: FeatureDelivery,
    /// Deferred feature requests answered FEATURE_NOT_READY_TO_USE before readiness.
    pub feature_not_ready: u32,
    /// Send an unsolicited close right after the manager is delivered.
    pub close_after_open: bool,
    /// Status returned by the profile submission.
    pub status: StatusCode,
    /// Report attached to the submission result.
    pub report: Option<String>,
}

impl Default for HostScript {
    fn default() -> Self {
        Self {
            unavailable_requests: 0,
            fail_with_error: false,
            never_ready: false,
            manager_delivery: ManagerDelivery::Immediate,
            delivery_delay_ms: 50,
            feature_delivery: FeatureDelivery::Immediate,
            feature_not_ready: 0,
            close_after_open: false,
            status: StatusCode::Success,
            report: None,
        }
    }
}

impl HostScript {
    pub fn from_toml_str(input: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(input)?)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    fn delivery_delay(&self) -> Duration {
        Duration::from_millis(self.delivery_delay_ms)
    }
}

/// A profile submission seen by the scripted feature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedSubmission {
    pub name: String,
    pub flag: ProfileFlag,
    pub data: Vec<String>,
}

#[derive(Debug, Default)]
struct JournalInner {
    entries: Vec<String>,
    manager_requests: u32,
    releases: u32,
    submissions: Vec<RecordedSubmission>,
}

/// Shared, ordered record of everything the scripted host observed.
#[derive(Debug, Clone, Default)]
pub struct HostJournal(Arc<Mutex<JournalInner>>);

impl HostJournal {
    fn lock(&self) -> MutexGuard<'_, JournalInner> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn record(&self, entry: impl Into<String>) {
        self.lock().entries.push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.lock().entries.clone()
    }

    pub fn manager_requests(&self) -> u32 {
        self.lock().manager_requests
    }

    pub fn releases(&self) -> u32 {
        self.lock().releases
    }

    pub fn submissions(&self) -> Vec<RecordedSubmission> {
        self.lock().submissions.clone()
    }

    fn next_request(&self) -> u32 {
        let mut inner = self.lock();
        inner.manager_requests += 1;
        inner.manager_requests
    }
}

pub struct ScriptedHost {
    script: HostScript,
    journal: HostJournal,
}

impl ScriptedHost {
    pub fn new(script: HostScript) -> Self {
        Self {
            script,
            journal: HostJournal::default(),
        }
    }

    pub fn journal(&self) -> HostJournal {
        self.journal.clone()
    }
}

impl ManagerHost for ScriptedHost {
    fn request_manager(
        &self,
        events: &HostEvents,
    ) -> Result<Acquisition<Box<dyn Manager>>, HostError> {
        let request = self.journal.next_request();
        self.journal.record(format!("manager requested #{request}"));
        if self.script.never_ready || request <= self.script.unavailable_requests {
            if self.script.fail_with_error {
                return Err(HostError::Request(format!(
                    "manager service is not running (request {request})"
                )));
            }
            return Ok(Acquisition::from_status(StatusCode::ManagerNotOpened, None));
        }

        let manager: Box<dyn Manager> = Box::new(ScriptedManager {
            script: self.script.clone(),
            journal: self.journal.clone(),
            feature_requests: 0,
        });
        let close = self.script.close_after_open;
        match self.script.manager_delivery {
            ManagerDelivery::Immediate => {
                if close {
                    events.manager_closed();
                }
                Ok(Acquisition::Ready(manager))
            }
            ManagerDelivery::Listener => {
                let events = events.clone();
                let delay = self.script.delivery_delay();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    events.manager_opened(manager);
                    if close {
                        events.manager_closed();
                    }
                });
                Ok(Acquisition::Pending)
            }
        }
    }
}

struct ScriptedManager {
    script: HostScript,
    journal: HostJournal,
    feature_requests: u32,
}

impl ScriptedManager {
    fn make_feature(&self) -> Box<dyn ProfileFeature> {
        Box::new(ScriptedFeature {
            submission: Submission {
                status: self.script.status,
                report: self.script.report.clone(),
            },
            journal: self.journal.clone(),
        })
    }
}

impl Manager for ScriptedManager {
    fn feature_delivery(&self) -> FeatureDelivery {
        self.script.feature_delivery
    }

    fn feature(
        &mut self,
        feature: FeatureType,
    ) -> Result<Option<Box<dyn ProfileFeature>>, HostError> {
        self.journal.record(format!("{feature} feature resolved"));
        Ok(Some(self.make_feature()))
    }

    fn request_feature(
        &mut self,
        feature: FeatureType,
        events: &HostEvents,
    ) -> Result<(), HostError> {
        self.feature_requests += 1;
        self.journal.record(format!(
            "{feature} feature requested #{}",
            self.feature_requests
        ));
        let status = if self.feature_requests <= self.script.feature_not_ready {
            Acquisition::from_status(StatusCode::FeatureNotReadyToUse, None)
        } else {
            Acquisition::Ready(self.make_feature())
        };
        let events = events.clone();
        let delay = self.script.delivery_delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            events.feature_status(status);
        });
        Ok(())
    }

    fn release(&mut self) {
        let mut inner = self.journal.lock();
        inner.releases += 1;
        inner.entries.push("manager released".to_owned());
    }
}

struct ScriptedFeature {
    submission: Submission,
    journal: HostJournal,
}

impl ProfileFeature for ScriptedFeature {
    fn process_profile(&mut self, name: &str, flag: ProfileFlag, data: &[String]) -> Submission {
        let mut inner = self.journal.lock();
        inner.entries.push(format!("profile submitted: {name}"));
        inner.submissions.push(RecordedSubmission {
            name: name.to_owned(),
            flag,
            data: data.to_vec(),
        });
        self.submission.clone()
    }
}

impl Drop for ScriptedFeature {
    fn drop(&mut self) {
        self.journal.record("profile feature dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn script_defaults_succeed_immediately() {
        let script = HostScript::default();
        assert_eq!(script.status, StatusCode::Success);
        assert_eq!(script.manager_delivery, ManagerDelivery::Immediate);
        assert_eq!(script.feature_delivery, FeatureDelivery::Immediate);
        assert!(script.report.is_none());
    }

    #[test]
    fn script_parses_from_toml() {
        let script = HostScript::from_toml_str(
            r#"
unavailable_requests = 3
manager_delivery = "listener"
feature_delivery = "deferred"
feature_not_ready = 1
status = "CHECK_XML"
report = '<parm-error name="Wifi" desc="bad value"/><characteristic-error type="Config"/>'
"#,
        )
        .unwrap();
        assert_eq!(script.unavailable_requests, 3);
        assert_eq!(script.manager_delivery, ManagerDelivery::Listener);
        assert_eq!(script.feature_delivery, FeatureDelivery::Deferred);
        assert_eq!(script.status, StatusCode::CheckXml);
        assert!(script.report.unwrap().contains("parm-error"));
    }

    #[test]
    fn script_rejects_unknown_keys() {
        assert!(HostScript::from_toml_str("retries = 3\n").is_err());
    }

    #[tokio::test]
    async fn unavailable_requests_are_transient_then_ready() {
        let host = ScriptedHost::new(HostScript {
            unavailable_requests: 1,
            ..HostScript::default()
        });
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let events = HostEvents::new(tx);

        assert!(matches!(
            host.request_manager(&events),
            Ok(Acquisition::Transient(_))
        ));
        let mut manager = match host.request_manager(&events) {
            Ok(Acquisition::Ready(manager)) => manager,
            other => panic!("expected a ready manager, got {other:?}"),
        };
        let mut feature = manager.feature(FeatureType::Profile).unwrap().unwrap();
        let submission = feature.process_profile("Clock", ProfileFlag::Set, &["<doc/>".to_owned()]);
        assert_eq!(submission.status, StatusCode::Success);
        manager.release();

        let journal = host.journal();
        assert_eq!(journal.manager_requests(), 2);
        assert_eq!(journal.releases(), 1);
        assert_eq!(journal.submissions()[0].data, vec!["<doc/>".to_owned()]);
    }

    #[tokio::test]
    async fn error_mode_fails_requests() {
        let host = ScriptedHost::new(HostScript {
            never_ready: true,
            fail_with_error: true,
            ..HostScript::default()
        });
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        assert!(matches!(
            host.request_manager(&HostEvents::new(tx)),
            Err(HostError::Request(_))
        ));
    }
}
