use crate::ReportError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::trace;

/// Element carrying the error classification (`type` attribute).
pub const CHARACTERISTIC_ERROR: &str = "characteristic-error";
/// Element carrying the offending parameter (`name` and `desc` attributes).
pub const PARM_ERROR: &str = "parm-error";

/// One rejected configuration parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub error_type: String,
    pub param_name: String,
    pub description: String,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Profile processing error.\tType:{}\tParamName:{}\tDescription:{}",
            self.error_type, self.param_name, self.description
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParamHalf {
    name: String,
    description: String,
}

/// Two-slot accumulator for a validation error whose halves may arrive in
/// either order.
///
/// The pair completes when a half arrives and its counterpart is already
/// present with a non-empty identifying attribute (`name` for the parameter,
/// `type` for the characteristic). Setting a half again overwrites it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingError {
    error_type: Option<String>,
    param: Option<ParamHalf>,
    arrived: Option<Half>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Half {
    ErrorType,
    Param,
}

impl PendingError {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_error_type(&mut self, error_type: &str) {
        self.error_type = Some(error_type.to_owned());
        self.arrived = Some(Half::ErrorType);
    }

    pub fn set_param(&mut self, name: &str, description: &str) {
        self.param = Some(ParamHalf {
            name: name.to_owned(),
            description: description.to_owned(),
        });
        self.arrived = Some(Half::Param);
    }

    pub fn is_empty(&self) -> bool {
        self.error_type.is_none() && self.param.is_none()
    }

    pub fn is_complete(&self) -> bool {
        match self.arrived {
            Some(Half::ErrorType) => self.param.as_ref().is_some_and(|p| !p.name.is_empty()),
            Some(Half::Param) => self.error_type.as_deref().is_some_and(|t| !t.is_empty()),
            None => false,
        }
    }
}

/// Finalize the pending record if it is complete, leaving the slot empty.
/// Returns `None` and leaves the accumulator untouched otherwise.
pub fn try_complete(pending: &mut PendingError) -> Option<ValidationError> {
    if !pending.is_complete() {
        return None;
    }
    let PendingError {
        error_type: Some(error_type),
        param: Some(param),
        ..
    } = std::mem::take(pending)
    else {
        return None;
    };
    Some(ValidationError {
        error_type,
        param_name: param.name,
        description: param.description,
    })
}

/// Validation errors extracted from one status report, in completion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusReport {
    errors: Vec<ValidationError>,
    details: String,
}

impl StatusReport {
    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }

    /// Running per-record detail text accumulated while parsing.
    pub fn details(&self) -> &str {
        &self.details
    }

    pub fn into_errors(self) -> Vec<ValidationError> {
        self.errors
    }

    fn record(&mut self, error: ValidationError) {
        self.details.push_str(&format!(
            "Name: {}\nType: {}\nDescription: {}\n",
            error.param_name, error.error_type, error.description
        ));
        self.errors.push(error);
    }
}

/// Parse a manager status report into its validation errors.
///
/// Only `characteristic-error` and `parm-error` start (or empty) elements are
/// inspected; everything else is skipped. A half-filled record still pending
/// at end of document is dropped. A document that ends with elements still
/// open is malformed.
pub fn parse_status_report(text: &str) -> Result<StatusReport, ReportError> {
    let mut reader = Reader::from_str(text);
    let mut report = StatusReport::default();
    let mut pending = PendingError::new();
    let mut open = 0usize;

    loop {
        let event = reader.read_event();
        match &event {
            Ok(Event::Start(_)) => open += 1,
            Ok(Event::End(_)) => open = open.saturating_sub(1),
            _ => {}
        }
        match event {
            Ok(Event::Start(element) | Event::Empty(element)) => {
                if observe_element(&element, &mut pending)? {
                    if let Some(error) = try_complete(&mut pending) {
                        trace!(
                            param = %error.param_name,
                            error_type = %error.error_type,
                            "validation error recorded"
                        );
                        report.record(error);
                    }
                }
            }
            Ok(Event::Eof) if open > 0 => {
                return Err(ReportError::Malformed(format!(
                    "unexpected end of report: {open} unclosed element(s)"
                )));
            }
            Ok(Event::Eof) => break,
            Ok(_) => {}
            Err(e) => return Err(ReportError::Malformed(e.to_string())),
        }
    }

    if !pending.is_empty() {
        trace!("dropping incomplete validation error at end of report: {pending:?}");
    }
    Ok(report)
}

/// Feed one element into the accumulator. Returns whether it was one of the
/// two error elements.
fn observe_element(element: &BytesStart<'_>, pending: &mut PendingError) -> Result<bool, ReportError> {
    let name = element.name();
    let name = name.as_ref();
    if name == CHARACTERISTIC_ERROR.as_bytes() {
        let error_type = attribute(element, "type")?;
        pending.set_error_type(&error_type);
        Ok(true)
    } else if name == PARM_ERROR.as_bytes() {
        let param_name = attribute(element, "name")?;
        let description = attribute(element, "desc")?;
        pending.set_param(&param_name, &description);
        Ok(true)
    } else {
        Ok(false)
    }
}

/// Unescaped attribute value, or an empty string when absent.
fn attribute(element: &BytesStart<'_>, key: &str) -> Result<String, ReportError> {
    let attr = element
        .try_get_attribute(key)
        .map_err(|e| ReportError::Malformed(e.to_string()))?;
    match attr {
        Some(attr) => attr
            .unescape_value()
            .map(std::borrow::Cow::into_owned)
            .map_err(|e| ReportError::Malformed(e.to_string())),
        None => Ok(String::new()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn error(error_type: &str, name: &str, desc: &str) -> ValidationError {
        ValidationError {
            error_type: error_type.to_owned(),
            param_name: name.to_owned(),
            description: desc.to_owned(),
        }
    }

    #[test]
    fn parm_first_then_characteristic() {
        let report = parse_status_report(
            r#"<parm-error name="Wifi" desc="bad value"/><characteristic-error type="Config"/>"#,
        )
        .unwrap();
        assert_eq!(report.errors(), &[error("Config", "Wifi", "bad value")]);
    }

    #[test]
    fn pairing_order_does_not_matter() {
        let forward = parse_status_report(
            r#"<characteristic-error type="Config"/><parm-error name="Wifi" desc="bad value"/>"#,
        )
        .unwrap();
        let reverse = parse_status_report(
            r#"<parm-error name="Wifi" desc="bad value"/><characteristic-error type="Config"/>"#,
        )
        .unwrap();
        assert_eq!(forward.errors(), reverse.errors());
    }

    #[test]
    fn nested_report_with_unrelated_elements() {
        let input = r#"<?xml version="1.0" encoding="utf-8"?>
<wap-provisioningdoc>
  <characteristic type="Clock" version="4.2">
    <parm name="AutoTime" value="false"/>
  </characteristic>
  <characteristic-error type="Wi-Fi" desc="Unsupported">
    <parm-error name="SSID" desc="Value too long" value="x"/>
  </characteristic-error>
  <characteristic type="Audio"/>
  <parm-error name="Volume" desc="Out of range"></parm-error>
  <characteristic-error type="AudioMgr"/>
</wap-provisioningdoc>"#;
        let report = parse_status_report(input).unwrap();
        assert_eq!(
            report.errors(),
            &[
                error("Wi-Fi", "SSID", "Value too long"),
                error("AudioMgr", "Volume", "Out of range"),
            ]
        );
    }

    #[test]
    fn dangling_characteristic_is_dropped() {
        let input = r#"<root>
  <characteristic-error type="A"/><parm-error name="p" desc="d"/>
  <characteristic-error type="Dangling"/>
</root>"#;
        let report = parse_status_report(input).unwrap();
        assert_eq!(report.errors().len(), 1);
        assert_eq!(report.errors()[0].error_type, "A");
    }

    #[test]
    fn empty_report_is_clean() {
        assert!(parse_status_report("").unwrap().is_clean());
        assert!(parse_status_report("<wap-provisioningdoc/>").unwrap().is_clean());
    }

    #[test]
    fn truncated_tag_is_malformed() {
        let result = parse_status_report(r#"<root><parm-error name="Wifi" desc="bad"#);
        assert!(matches!(result, Err(ReportError::Malformed(_))));
    }

    #[test]
    fn mismatched_end_tag_is_malformed() {
        let result = parse_status_report("<root><characteristic-error type=\"A\"></root>");
        assert!(matches!(result, Err(ReportError::Malformed(_))));
    }

    #[test]
    fn attribute_entities_are_unescaped() {
        let report = parse_status_report(
            r#"<characteristic-error type="A&amp;B"/><parm-error name="p" desc="&lt;5"/>"#,
        )
        .unwrap();
        assert_eq!(report.errors(), &[error("A&B", "p", "<5")]);
    }

    #[test]
    fn details_accumulate_per_record() {
        let report = parse_status_report(
            r#"<characteristic-error type="T"/><parm-error name="N" desc="D"/>"#,
        )
        .unwrap();
        assert_eq!(report.details(), "Name: N\nType: T\nDescription: D\n");
    }

    #[test]
    fn try_complete_needs_both_halves() {
        let mut pending = PendingError::new();
        assert!(try_complete(&mut pending).is_none());

        pending.set_param("Wifi", "bad value");
        assert!(try_complete(&mut pending).is_none());
        assert!(!pending.is_empty());

        pending.set_error_type("Config");
        assert_eq!(
            try_complete(&mut pending),
            Some(error("Config", "Wifi", "bad value"))
        );
        assert!(pending.is_empty());
    }

    #[test]
    fn empty_arriving_half_still_completes() {
        let mut pending = PendingError::new();
        pending.set_param("Wifi", "bad");
        pending.set_error_type("");
        assert_eq!(try_complete(&mut pending), Some(error("", "Wifi", "bad")));
    }

    #[test]
    fn empty_counterpart_defers_completion() {
        let mut pending = PendingError::new();
        pending.set_error_type("");
        pending.set_param("Wifi", "bad");
        assert!(try_complete(&mut pending).is_none());

        pending.set_error_type("Config");
        assert_eq!(
            try_complete(&mut pending),
            Some(error("Config", "Wifi", "bad"))
        );
    }

    #[test]
    fn empty_attributes_pair_in_either_order() {
        let report = parse_status_report(
            r#"<parm-error name="Wifi" desc="bad"/><characteristic-error type=""/>"#,
        )
        .unwrap();
        assert_eq!(report.errors(), &[error("", "Wifi", "bad")]);

        let report = parse_status_report(
            r#"<characteristic-error type="Config"/><parm-error name="" desc="bad"/>"#,
        )
        .unwrap();
        assert_eq!(report.errors(), &[error("Config", "", "bad")]);
    }

    #[test]
    fn unclosed_root_at_end_is_malformed() {
        let result = parse_status_report(
            r#"<wap-provisioningdoc><characteristic-error type="A"/><parm-error name="p" desc="d"/>"#,
        );
        match result {
            Err(ReportError::Malformed(message)) => {
                assert!(message.contains("1 unclosed element(s)"), "{message}");
            }
            other => panic!("expected a malformed report, got {other:?}"),
        }
    }

    #[test]
    fn second_half_overwrites_earlier_value() {
        let report = parse_status_report(
            r#"<parm-error name="first" desc="a"/><parm-error name="second" desc="b"/><characteristic-error type="T"/>"#,
        )
        .unwrap();
        assert_eq!(report.errors(), &[error("T", "second", "b")]);
    }

    #[test]
    fn validation_error_display() {
        let rendered = error("Config", "Wifi", "bad value").to_string();
        assert_eq!(
            rendered,
            "Profile processing error.\tType:Config\tParamName:Wifi\tDescription:bad value"
        );
    }
}
