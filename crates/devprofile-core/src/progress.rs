//! Caller-facing callbacks and the leveled status channel.

use crate::types::CommandId;
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, error, info, trace, warn};

/// Severity of a status message, mirrored to the caller as a prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageLevel {
    Error,
    Success,
    Verbose,
    Warning,
    Debug,
}

impl MessageLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "ERROR",
            Self::Success => "SUCCESS",
            Self::Verbose => "VERBOSE",
            Self::Warning => "WARNING",
            Self::Debug => "DEBUG",
        }
    }
}

impl fmt::Display for MessageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives the outcome of one `execute` call.
///
/// Exactly one of `on_success` / `on_error` is invoked per call, after any
/// number of `on_debug_status` notifications.
pub trait ResultCallbacks: Send + Sync {
    fn on_success(&self, message: &str);
    fn on_error(&self, message: &str);
    fn on_debug_status(&self, message: &str);
}

/// Channel form of [`ResultCallbacks`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// `<LEVEL>:<message>` progress line.
    Status(String),
    Success(String),
    Error(String),
}

impl Notification {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success(_) | Self::Error(_))
    }
}

impl ResultCallbacks for UnboundedSender<Notification> {
    fn on_success(&self, message: &str) {
        let _ = self.send(Notification::Success(message.to_owned()));
    }

    fn on_error(&self, message: &str) {
        let _ = self.send(Notification::Error(message.to_owned()));
    }

    fn on_debug_status(&self, message: &str) {
        let _ = self.send(Notification::Status(message.to_owned()));
    }
}

/// Terminal result of one `execute` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Success(String),
    Error(String),
}

/// Logs every internal event through `tracing` and forwards it to the caller.
/// Closes after the terminal outcome is delivered.
pub(crate) struct StatusChannel {
    command_id: CommandId,
    callbacks: Arc<dyn ResultCallbacks>,
    closed: bool,
}

impl StatusChannel {
    pub(crate) fn new(command_id: CommandId, callbacks: Arc<dyn ResultCallbacks>) -> Self {
        Self {
            command_id,
            callbacks,
            closed: false,
        }
    }

    pub(crate) fn log(&self, level: MessageLevel, message: &str) {
        let command = self.command_id.as_str();
        match level {
            MessageLevel::Error => error!(command, "{message}"),
            MessageLevel::Warning => warn!(command, "{message}"),
            MessageLevel::Success => info!(command, "{message}"),
            MessageLevel::Debug => debug!(command, "{message}"),
            MessageLevel::Verbose => trace!(command, "{message}"),
        }
        if !self.closed {
            self.callbacks.on_debug_status(&format!("{level}:{message}"));
        }
    }

    pub(crate) fn error(&self, message: impl AsRef<str>) {
        self.log(MessageLevel::Error, message.as_ref());
    }

    pub(crate) fn warning(&self, message: impl AsRef<str>) {
        self.log(MessageLevel::Warning, message.as_ref());
    }

    pub(crate) fn success(&self, message: impl AsRef<str>) {
        self.log(MessageLevel::Success, message.as_ref());
    }

    pub(crate) fn debug(&self, message: impl AsRef<str>) {
        self.log(MessageLevel::Debug, message.as_ref());
    }

    pub(crate) fn verbose(&self, message: impl AsRef<str>) {
        self.log(MessageLevel::Verbose, message.as_ref());
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed
    }

    /// Deliver the terminal outcome. Returns `false` if one was already delivered.
    pub(crate) fn deliver(&mut self, outcome: &ExecutionOutcome) -> bool {
        if self.closed {
            return false;
        }
        self.closed = true;
        match outcome {
            ExecutionOutcome::Success(message) => self.callbacks.on_success(message),
            ExecutionOutcome::Error(message) => self.callbacks.on_error(message),
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn channel() -> (StatusChannel, mpsc::UnboundedReceiver<Notification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (StatusChannel::new(CommandId::new("test"), Arc::new(tx)), rx)
    }

    #[test]
    fn progress_lines_carry_level_prefix() {
        let (status, mut rx) = channel();
        status.error("boom");
        status.success("done");
        status.verbose("payload");
        status.warning("careful");
        status.debug("step");

        let lines: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            lines,
            vec![
                Notification::Status("ERROR:boom".to_owned()),
                Notification::Status("SUCCESS:done".to_owned()),
                Notification::Status("VERBOSE:payload".to_owned()),
                Notification::Status("WARNING:careful".to_owned()),
                Notification::Status("DEBUG:step".to_owned()),
            ]
        );
    }

    #[test]
    fn terminal_delivered_once_and_closes_channel() {
        let (mut status, mut rx) = channel();
        assert!(status.deliver(&ExecutionOutcome::Success("ok".to_owned())));
        assert!(!status.deliver(&ExecutionOutcome::Error("late".to_owned())));
        status.debug("after terminal");

        assert_eq!(rx.try_recv().unwrap(), Notification::Success("ok".to_owned()));
        assert!(rx.try_recv().is_err());
        assert!(status.is_closed());
    }
}
