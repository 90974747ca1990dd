//! Handle bookkeeping and the background retry watcher.

use crate::host::{ControllerEvent, HostEvents, Manager, ProfileFeature};
use crate::settings::AcquisitionPolicy;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// Whether a manager acquisition attempt is currently outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Attempt {
    Idle,
    InFlight,
}

/// Handles held by one command, plus the in-flight guard.
pub struct AcquisitionState {
    manager: Option<Box<dyn Manager>>,
    feature: Option<Box<dyn ProfileFeature>>,
    attempt: Attempt,
}

/// What `AcquisitionState::release` actually dropped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Released {
    pub feature: bool,
    pub manager: bool,
}

impl Default for AcquisitionState {
    fn default() -> Self {
        Self::new()
    }
}

impl AcquisitionState {
    pub fn new() -> Self {
        Self {
            manager: None,
            feature: None,
            attempt: Attempt::Idle,
        }
    }

    pub fn attempt(&self) -> Attempt {
        self.attempt
    }

    /// Mark an attempt in flight. Returns `false` if one already is.
    pub fn begin_attempt(&mut self) -> bool {
        if self.attempt == Attempt::InFlight {
            return false;
        }
        self.attempt = Attempt::InFlight;
        true
    }

    pub fn abandon_attempt(&mut self) {
        self.attempt = Attempt::Idle;
    }

    pub fn has_manager(&self) -> bool {
        self.manager.is_some()
    }

    /// Store the raw manager, returning any previously held one.
    pub fn set_manager(&mut self, manager: Box<dyn Manager>) -> Option<Box<dyn Manager>> {
        self.manager.replace(manager)
    }

    pub fn manager_mut(&mut self) -> Option<&mut (dyn Manager + 'static)> {
        self.manager.as_deref_mut()
    }

    /// Store the feature handle. Obtaining it completes the attempt.
    pub fn set_feature(&mut self, feature: Box<dyn ProfileFeature>) {
        self.feature = Some(feature);
        self.attempt = Attempt::Idle;
    }

    pub fn feature_mut(&mut self) -> Option<&mut (dyn ProfileFeature + 'static)> {
        self.feature.as_deref_mut()
    }

    /// Drop the feature handle, then release and drop the manager.
    pub fn release(&mut self) -> Released {
        let feature = self.feature.take().is_some();
        let manager = match self.manager.take() {
            Some(mut manager) => {
                manager.release();
                true
            }
            None => false,
        };
        Released { feature, manager }
    }
}

/// How the retry watcher ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// A manager was held and the minimum run time had passed.
    Acquired { attempts: u32, elapsed: Duration },
    /// The ceiling was reached.
    Exhausted { attempts: u32, elapsed: Duration },
    /// Stopped by the controller.
    Cancelled,
    /// The controller was gone.
    Abandoned,
}

/// Background task re-issuing manager requests until a handle is held or the
/// policy ceiling is reached. Requests are posted to the controller, which
/// remains the only place state changes.
pub(crate) struct RetryWatcher {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl RetryWatcher {
    pub(crate) fn spawn(
        policy: AcquisitionPolicy,
        events: HostEvents,
        acquired: watch::Receiver<bool>,
    ) -> Self {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let outcome = retry_loop(policy, &events, &acquired, &token).await;
            debug!("manager retry watcher finished: {outcome:?}");
            if matches!(
                outcome,
                RetryOutcome::Acquired { .. } | RetryOutcome::Exhausted { .. }
            ) {
                events.send(ControllerEvent::RetryFinished(outcome));
            }
        });
        Self { cancel, handle }
    }

    pub(crate) fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub(crate) fn cancel(self) {
        self.cancel.cancel();
    }
}

async fn retry_loop(
    policy: AcquisitionPolicy,
    events: &HostEvents,
    acquired: &watch::Receiver<bool>,
    cancel: &CancellationToken,
) -> RetryOutcome {
    let started = Instant::now();
    let mut attempts = 0u32;
    loop {
        if cancel.is_cancelled() {
            return RetryOutcome::Cancelled;
        }
        attempts += 1;
        let elapsed = started.elapsed();
        if !events.send(ControllerEvent::RetryAcquire {
            attempt: attempts,
            elapsed,
        }) {
            return RetryOutcome::Abandoned;
        }

        tokio::select! {
            () = cancel.cancelled() => return RetryOutcome::Cancelled,
            () = tokio::time::sleep(policy.retry_delay) => {}
        }

        let elapsed = started.elapsed();
        trace!(
            attempts,
            elapsed_ms = elapsed.as_millis() as u64,
            "manager retry tick"
        );
        if *acquired.borrow() && elapsed >= policy.min_elapsed {
            return RetryOutcome::Acquired { attempts, elapsed };
        }
        if elapsed >= policy.max_elapsed {
            return RetryOutcome::Exhausted { attempts, elapsed };
        }
    }
}
