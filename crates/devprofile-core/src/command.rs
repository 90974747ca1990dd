use crate::acquisition::{AcquisitionState, RetryOutcome, RetryWatcher};
use crate::host::{
    ControllerEvent, FeatureDelivery, FeatureType, HostEvents, Manager, ManagerHost,
    ProfileFeature, ProfileFlag, Submission,
};
use crate::lifecycle::{validate_transition, Phase};
use crate::progress::{ExecutionOutcome, ResultCallbacks, StatusChannel};
use crate::settings::{AcquisitionPolicy, CommandSettings};
use crate::status::{Acquisition, StatusCode};
use crate::types::ProfileName;
use crate::ProfileError;
use devprofile_report::{parse_status_report, ErrorAggregator};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Profile to submit: a name and a document in the manager's native format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionRequest {
    pub profile_name: ProfileName,
    pub payload: String,
}

impl ExecutionRequest {
    pub fn new(profile_name: impl Into<ProfileName>, payload: impl Into<String>) -> Self {
        Self {
            profile_name: profile_name.into(),
            payload: payload.into(),
        }
    }
}

/// One-shot command submitting a profile to the host's manager.
///
/// `execute` consumes the command, so an instance runs at most once.
pub struct ProfileCommand {
    host: Arc<dyn ManagerHost>,
    settings: CommandSettings,
    policy: AcquisitionPolicy,
}

impl ProfileCommand {
    pub fn new(host: Arc<dyn ManagerHost>) -> Self {
        Self {
            host,
            settings: CommandSettings::default(),
            policy: AcquisitionPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_settings(mut self, settings: CommandSettings) -> Self {
        self.settings = settings;
        self
    }

    #[must_use]
    pub fn with_policy(mut self, policy: AcquisitionPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Start the watchdog and begin acquisition. Everything the caller learns
    /// arrives through `callbacks`; the returned handle only resolves once the
    /// terminal callback has fired.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn execute(
        self,
        request: ExecutionRequest,
        callbacks: Arc<dyn ResultCallbacks>,
    ) -> JoinHandle<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        let (acquired, _) = watch::channel(false);
        let run = ProfileRun {
            status: StatusChannel::new(self.settings.command_id.clone(), callbacks),
            host: self.host,
            settings: self.settings,
            policy: self.policy,
            request,
            events: HostEvents::new(tx),
            state: AcquisitionState::new(),
            phase: Phase::Idle,
            errors: ErrorAggregator::new(),
            watcher: None,
            acquired,
        };
        tokio::spawn(run.run(rx))
    }
}

struct ProfileRun {
    host: Arc<dyn ManagerHost>,
    settings: CommandSettings,
    policy: AcquisitionPolicy,
    request: ExecutionRequest,
    status: StatusChannel,
    events: HostEvents,
    state: AcquisitionState,
    phase: Phase,
    errors: ErrorAggregator,
    watcher: Option<RetryWatcher>,
    acquired: watch::Sender<bool>,
}

impl ProfileRun {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<ControllerEvent>) {
        let deadline = self
            .settings
            .timeout_enabled
            .then(|| Instant::now() + self.settings.timeout);
        if self.request.profile_name.is_empty() {
            self.status.warning("Profile name is empty.");
        }
        self.transition(Phase::AcquiringManager);
        self.initialize();

        while !self.phase.is_terminal() {
            tokio::select! {
                event = rx.recv() => match event {
                    Some(event) => self.handle(event),
                    None => break,
                },
                () = watchdog(deadline) => self.on_timeout(),
            }
        }

        if !self.phase.is_terminal() {
            self.finish(Err(ProfileError::AcquisitionTransient(
                "event channel closed".to_owned(),
            )));
        }
    }

    fn handle(&mut self, event: ControllerEvent) {
        match event {
            ControllerEvent::Manager(acquisition) => self.on_manager_status(acquisition),
            ControllerEvent::Feature(acquisition) => self.on_feature_status(acquisition),
            ControllerEvent::ManagerClosed => self.on_manager_closed(),
            ControllerEvent::RetryAcquire { attempt, elapsed } => {
                self.status.debug(format!(
                    "Calling manager initialization (retry {attempt}, {} ms since first retry, stops at {} ms)",
                    elapsed.as_millis(),
                    self.policy.max_elapsed.as_millis()
                ));
                self.initialize();
            }
            ControllerEvent::RetryFinished(outcome) => self.on_retry_finished(outcome),
        }
    }

    fn transition(&mut self, to: Phase) {
        if self.phase == to {
            return;
        }
        match validate_transition(self.phase, to) {
            Ok(()) => {
                debug!(command = %self.settings.command_id, "{} -> {to}", self.phase);
                self.phase = to;
            }
            Err(e) => warn!(command = %self.settings.command_id, "{e}"),
        }
    }

    fn initialize(&mut self) {
        if !self.state.begin_attempt() {
            debug!("manager acquisition already in flight");
            return;
        }
        if self.state.has_manager() {
            self.status.debug("Manager already retrieved.");
            self.request_feature();
            return;
        }

        match self.host.request_manager(&self.events) {
            Ok(Acquisition::Ready(manager)) => {
                self.status.debug("Manager retrieved synchronously.");
                self.on_manager_retrieved(manager);
            }
            Ok(Acquisition::Pending) => {
                self.status.debug("Manager request issued with success.");
            }
            Ok(Acquisition::Transient(reason)) => {
                self.on_manager_transient(&ProfileError::AcquisitionTransient(reason));
            }
            Err(e) => {
                self.on_manager_transient(&ProfileError::AcquisitionTransient(e.to_string()));
            }
            Ok(Acquisition::Fatal(reason)) => {
                self.state.abandon_attempt();
                self.status
                    .error(format!("Manager request rejected: {reason}"));
            }
        }
    }

    fn on_manager_transient(&mut self, error: &ProfileError) {
        self.state.abandon_attempt();
        self.status.error(format!("Manager request error: {error}"));
        self.wait_for_manager();
    }

    fn wait_for_manager(&mut self) {
        if self.watcher.as_ref().is_some_and(RetryWatcher::is_running) {
            return;
        }
        self.status
            .debug("Manager not available, the subsystem may still be starting up.");
        self.status
            .debug("Starting watcher task to wait for manager initialization.");
        self.watcher = Some(RetryWatcher::spawn(
            self.policy,
            self.events.clone(),
            self.acquired.subscribe(),
        ));
    }

    fn on_retry_finished(&mut self, outcome: RetryOutcome) {
        self.watcher = None;
        match outcome {
            RetryOutcome::Exhausted { elapsed, .. } if !self.state.has_manager() => {
                self.status
                    .error(ProfileError::AcquisitionExhausted { elapsed }.to_string());
            }
            outcome => self
                .status
                .debug(format!("Manager watcher finished: {outcome:?}")),
        }
    }

    fn on_manager_status(&mut self, acquisition: Acquisition<Box<dyn Manager>>) {
        match acquisition {
            Acquisition::Ready(manager) => {
                self.status.debug("Manager opened.");
                self.on_manager_retrieved(manager);
            }
            Acquisition::Pending => {}
            Acquisition::Transient(reason) => {
                self.on_manager_transient(&ProfileError::AcquisitionTransient(reason));
            }
            Acquisition::Fatal(reason) => {
                self.state.abandon_attempt();
                self.status.error(format!("Manager unavailable: {reason}"));
            }
        }
    }

    fn on_manager_retrieved(&mut self, manager: Box<dyn Manager>) {
        // A listener delivery may arrive after the attempt was abandoned.
        self.state.begin_attempt();
        if let Some(mut previous) = self.state.set_manager(manager) {
            previous.release();
            self.status.debug("Previous manager released.");
        }
        self.acquired.send_replace(true);
        self.status.debug("Manager retrieved.");
        self.request_feature();
    }

    fn request_feature(&mut self) {
        self.transition(Phase::AcquiringFeature);
        self.status.debug("Requesting profile feature.");
        let Some(manager) = self.state.manager_mut() else {
            self.state.abandon_attempt();
            return;
        };

        let delivery = manager.feature_delivery();
        self.status
            .verbose(format!("Feature delivery on this platform: {delivery}"));
        match delivery {
            FeatureDelivery::Immediate => {
                self.status.debug("Requesting profile feature synchronously.");
                match manager.feature(FeatureType::Profile) {
                    Ok(Some(feature)) => self.on_feature_ready(feature),
                    Ok(None) => {
                        self.state.abandon_attempt();
                        self.status.warning("Profile feature is not available yet.");
                    }
                    Err(e) => {
                        self.state.abandon_attempt();
                        self.status.error(format!(
                            "Error when trying to retrieve profile feature: {}",
                            ProfileError::Host(e)
                        ));
                    }
                }
            }
            FeatureDelivery::Deferred => {
                self.status
                    .debug("Requesting profile feature asynchronously.");
                if let Err(e) = manager.request_feature(FeatureType::Profile, &self.events) {
                    self.state.abandon_attempt();
                    self.status.error(format!(
                        "Error when trying to retrieve profile feature: {}",
                        ProfileError::Host(e)
                    ));
                }
            }
        }
    }

    fn on_feature_status(&mut self, acquisition: Acquisition<Box<dyn ProfileFeature>>) {
        match acquisition {
            Acquisition::Ready(feature) => {
                if !self.state.has_manager() {
                    self.state.abandon_attempt();
                    self.status
                        .warning("Ignoring profile feature delivered after the manager closed.");
                    return;
                }
                self.status.debug("Profile feature retrieved.");
                self.on_feature_ready(feature);
            }
            Acquisition::Pending => {}
            Acquisition::Transient(reason) => {
                self.status.error(format!(
                    "Error when trying to retrieve profile feature: {reason}"
                ));
                // Resume from the top of the acquisition chain.
                self.state.abandon_attempt();
                self.transition(Phase::AcquiringManager);
                self.initialize();
            }
            Acquisition::Fatal(reason) => {
                self.state.abandon_attempt();
                self.status.error(format!(
                    "Error when trying to retrieve profile feature: {reason}"
                ));
            }
        }
    }

    fn on_manager_closed(&mut self) {
        self.status.debug("Manager closed by the host.");
        self.release_handles();
        self.state.abandon_attempt();
        self.transition(Phase::AcquiringManager);
    }

    fn on_feature_ready(&mut self, feature: Box<dyn ProfileFeature>) {
        self.state.set_feature(feature);
        self.status.debug("Processing profile content.");
        self.process_profile();
    }

    fn process_profile(&mut self) {
        self.transition(Phase::Submitting);
        self.status
            .verbose(format!("Processing profile: {}", self.request.payload));
        let Some(feature) = self.state.feature_mut() else {
            return;
        };
        let submission = feature.process_profile(
            self.request.profile_name.as_str(),
            ProfileFlag::Set,
            std::slice::from_ref(&self.request.payload),
        );
        self.transition(Phase::Interpreting);
        let result = self.interpret(submission);
        self.finish(result);
    }

    fn interpret(&mut self, submission: Submission) -> Result<(), ProfileError> {
        let name = &self.request.profile_name;
        match submission.status {
            StatusCode::CheckXml => {
                let report = parse_status_report(submission.report.as_deref().unwrap_or_default())?;
                if !report.details().is_empty() {
                    self.status.verbose(report.details());
                }
                self.errors.clear();
                self.errors.absorb(report);
                if self.errors.is_empty() {
                    self.status
                        .success(format!("Profile executed with success: {name}"));
                    Ok(())
                } else {
                    Err(ProfileError::ValidationFailed(self.errors.take()))
                }
            }
            StatusCode::Success => {
                self.status
                    .debug(format!("Profile executed with success: {name}"));
                Ok(())
            }
            status => Err(ProfileError::SubmissionRejected {
                status,
                profile: name.clone(),
            }),
        }
    }

    fn on_timeout(&mut self) {
        self.finish(Err(ProfileError::OperationTimedOut {
            command_id: self.settings.command_id.clone(),
            timeout: self.settings.timeout,
        }));
    }

    fn release_handles(&mut self) {
        let released = self.state.release();
        if released.feature {
            self.status.debug("Profile feature reset.");
        }
        if released.manager {
            self.status.debug("Manager released.");
        }
        self.acquired.send_replace(false);
    }

    /// Release everything, then report the outcome. Runs at most once.
    fn finish(&mut self, result: Result<(), ProfileError>) {
        if self.status.is_closed() {
            return;
        }
        if let Err(e) = &result {
            self.status.error(e.to_string());
        }
        if let Some(watcher) = self.watcher.take() {
            watcher.cancel();
        }
        self.release_handles();
        self.transition(Phase::Completed);

        let ExecutionRequest {
            profile_name,
            payload,
        } = &self.request;
        let outcome = match result {
            Ok(()) => ExecutionOutcome::Success(format!(
                "Success applying profile:{profile_name}\nProfileData:{payload}"
            )),
            Err(e) => ExecutionOutcome::Error(format!(
                "Error on profile: {profile_name}\nError:{e}\nProfileData:{payload}"
            )),
        };
        self.status.deliver(&outcome);
    }
}

async fn watchdog(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending::<()>().await,
    }
}
