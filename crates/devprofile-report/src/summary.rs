use crate::report::{StatusReport, ValidationError};

/// Concatenate every error's description, in order, into one string.
pub fn render_summary(errors: &[ValidationError]) -> String {
    errors.iter().map(ToString::to_string).collect()
}

/// Accumulates validation errors across parsed reports for one submission.
#[derive(Debug, Default)]
pub struct ErrorAggregator {
    errors: Vec<ValidationError>,
}

impl ErrorAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn clear(&mut self) {
        self.errors.clear();
    }

    pub fn absorb(&mut self, report: StatusReport) {
        self.errors.extend(report.into_errors());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[ValidationError] {
        &self.errors
    }

    pub fn take(&mut self) -> Vec<ValidationError> {
        std::mem::take(&mut self.errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_status_report;

    #[test]
    fn render_joins_in_order() {
        let report = parse_status_report(
            r#"<characteristic-error type="A"/><parm-error name="x" desc="one"/>
               <parm-error name="y" desc="two"/><characteristic-error type="B"/>"#,
        )
        .unwrap();
        let mut aggregator = ErrorAggregator::new();
        aggregator.absorb(report);

        assert_eq!(aggregator.errors().len(), 2);
        assert_eq!(
            render_summary(aggregator.errors()),
            "Profile processing error.\tType:A\tParamName:x\tDescription:one\
             Profile processing error.\tType:B\tParamName:y\tDescription:two"
        );
    }

    #[test]
    fn empty_aggregator_renders_nothing() {
        let aggregator = ErrorAggregator::new();
        assert!(aggregator.is_empty());
        assert_eq!(render_summary(aggregator.errors()), "");
    }

    #[test]
    fn clear_discards_previous_errors() {
        let mut aggregator = ErrorAggregator::new();
        aggregator.absorb(
            parse_status_report(r#"<characteristic-error type="A"/><parm-error name="x" desc=""/>"#)
                .unwrap(),
        );
        assert!(!aggregator.is_empty());
        aggregator.clear();
        assert!(aggregator.is_empty());
    }

    #[test]
    fn errors_serialize_as_plain_records() {
        let report = parse_status_report(
            r#"<characteristic-error type="Config"/><parm-error name="Wifi" desc="bad value"/>"#,
        )
        .unwrap();
        let json = serde_json::to_value(report.errors()).unwrap();
        assert_eq!(json[0]["error_type"], "Config");
        assert_eq!(json[0]["param_name"], "Wifi");
        assert_eq!(json[0]["description"], "bad value");
    }
}
