//! Status report parsing and validation-error aggregation for devprofile.
//!
//! When a device manager answers a profile submission with "needs inspection",
//! it attaches a tag-structured report. This crate extracts the rejected
//! parameters from that report (`parse_status_report`), correlating each
//! `characteristic-error` with its `parm-error` regardless of their order, and
//! renders the resulting `ValidationError` list into one human-readable summary
//! (`ErrorAggregator`).

pub mod report;
pub mod summary;

pub use report::{
    parse_status_report, try_complete, PendingError, StatusReport, ValidationError,
    CHARACTERISTIC_ERROR, PARM_ERROR,
};
pub use summary::{render_summary, ErrorAggregator};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("malformed status report: {0}")]
    Malformed(String),
}
