//! Status codes shared by acquisition, submission, and error rendering.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Result code reported by the device manager for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Success,
    Failure,
    NullPointer,
    #[serde(rename = "EMPTY_PROFILENAME")]
    EmptyProfileName,
    ManagerNotOpened,
    /// A structured report accompanies the result and must be inspected.
    CheckXml,
    PreviousRequestInProgress,
    Processing,
    NoDataListener,
    FeatureNotReadyToUse,
    FeatureNotSupported,
    Unknown,
}

const STATUS_NAMES: &[(StatusCode, &str)] = &[
    (StatusCode::Success, "SUCCESS"),
    (StatusCode::Failure, "FAILURE"),
    (StatusCode::NullPointer, "NULL_POINTER"),
    (StatusCode::EmptyProfileName, "EMPTY_PROFILENAME"),
    (StatusCode::ManagerNotOpened, "MANAGER_NOT_OPENED"),
    (StatusCode::CheckXml, "CHECK_XML"),
    (
        StatusCode::PreviousRequestInProgress,
        "PREVIOUS_REQUEST_IN_PROGRESS",
    ),
    (StatusCode::Processing, "PROCESSING"),
    (StatusCode::NoDataListener, "NO_DATA_LISTENER"),
    (StatusCode::FeatureNotReadyToUse, "FEATURE_NOT_READY_TO_USE"),
    (StatusCode::FeatureNotSupported, "FEATURE_NOT_SUPPORTED"),
    (StatusCode::Unknown, "UNKNOWN"),
];

impl StatusCode {
    pub fn name(self) -> &'static str {
        STATUS_NAMES
            .iter()
            .find(|(code, _)| *code == self)
            .map_or("UNKNOWN", |(_, name)| *name)
    }

    /// Whether the condition is expected to clear on its own if retried later.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            Self::FeatureNotReadyToUse
                | Self::ManagerNotOpened
                | Self::PreviousRequestInProgress
                | Self::Processing
        )
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Outcome of asking the host for a handle.
pub enum Acquisition<T> {
    /// The handle is ready for use.
    Ready(T),
    /// The request was accepted; the handle will be delivered through `HostEvents`.
    Pending,
    /// Not ready yet; acquisition should be attempted again.
    Transient(String),
    /// The handle cannot be obtained.
    Fatal(String),
}

impl<T> Acquisition<T> {
    /// Classify a host status, attaching `handle` when the status is a success.
    pub fn from_status(status: StatusCode, handle: Option<T>) -> Self {
        match (status, handle) {
            (StatusCode::Success, Some(handle)) => Self::Ready(handle),
            (StatusCode::Success, None) => {
                Self::Fatal("host reported success without a handle".to_owned())
            }
            (status, _) if status.is_transient() => Self::Transient(status.name().to_owned()),
            (status, _) => Self::Fatal(status.name().to_owned()),
        }
    }
}

impl<T> fmt::Debug for Acquisition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ready(_) => f.write_str("Ready(..)"),
            Self::Pending => f.write_str("Pending"),
            Self::Transient(reason) => f.debug_tuple("Transient").field(reason).finish(),
            Self::Fatal(reason) => f.debug_tuple("Fatal").field(reason).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_cover_every_code() {
        for (code, name) in STATUS_NAMES {
            assert_eq!(code.name(), *name);
            assert_eq!(code.to_string(), *name);
        }
    }

    #[test]
    fn serde_uses_canonical_names() {
        let json = serde_json::to_string(&StatusCode::EmptyProfileName).unwrap();
        assert_eq!(json, "\"EMPTY_PROFILENAME\"");
        let code: StatusCode = serde_json::from_str("\"CHECK_XML\"").unwrap();
        assert_eq!(code, StatusCode::CheckXml);
        let code: StatusCode = serde_json::from_str("\"FEATURE_NOT_READY_TO_USE\"").unwrap();
        assert_eq!(code, StatusCode::FeatureNotReadyToUse);
    }

    #[test]
    fn classification_from_status() {
        assert!(matches!(
            Acquisition::from_status(StatusCode::Success, Some(1)),
            Acquisition::Ready(1)
        ));
        assert!(matches!(
            Acquisition::<u8>::from_status(StatusCode::FeatureNotReadyToUse, None),
            Acquisition::Transient(ref r) if r == "FEATURE_NOT_READY_TO_USE"
        ));
        assert!(matches!(
            Acquisition::<u8>::from_status(StatusCode::FeatureNotSupported, None),
            Acquisition::Fatal(_)
        ));
        assert!(matches!(
            Acquisition::<u8>::from_status(StatusCode::Success, None),
            Acquisition::Fatal(_)
        ));
    }
}
