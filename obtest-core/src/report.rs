use serde::Serialize;
use std::fmt;

/// Classified result of one case. Produced once per case and never retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaseOutcome {
    Success,
    Failure,
    Timeout,
}

impl CaseOutcome {
    /// Status word used in report messages
    pub fn status(&self) -> &'static str {
        match self {
            CaseOutcome::Success => "success",
            CaseOutcome::Failure => "error",
            CaseOutcome::Timeout => "timeout",
        }
    }
}

impl fmt::Display for CaseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.status())
    }
}

/// Per-run tally of case outcomes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SuiteSummary {
    pub success: usize,
    pub failure: usize,
    pub timeout: usize,
}

impl SuiteSummary {
    pub fn record(&mut self, outcome: CaseOutcome) {
        match outcome {
            CaseOutcome::Success => self.success += 1,
            CaseOutcome::Failure => self.failure += 1,
            CaseOutcome::Timeout => self.timeout += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.success + self.failure + self.timeout
    }
}

/// Append-only status messages for one run, emitted once at the end.
#[derive(Debug, Clone, Default)]
pub struct EvalReport {
    messages: Vec<String>,
}

#[derive(Serialize)]
struct ReportBody<'a> {
    message: &'a str,
}

impl EvalReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append_message(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn record_case(&mut self, case_name: &str, outcome: CaseOutcome) {
        self.append_message(format!("{case_name} is {outcome}"));
    }

    pub fn messages(&self) -> &[String] {
        &self.messages
    }

    pub fn message(&self) -> String {
        self.messages.join("\n")
    }

    pub fn to_json_string(&self) -> String {
        let message = self.message();
        // A struct holding only a string cannot fail to serialize.
        serde_json::to_string(&ReportBody { message: &message }).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_case_messages() {
        let mut report = EvalReport::new();
        report.record_case("basic", CaseOutcome::Success);
        report.record_case("join", CaseOutcome::Failure);
        report.record_case("big", CaseOutcome::Timeout);
        assert_eq!(
            report.message(),
            "basic is success\njoin is error\nbig is timeout"
        );
    }

    #[test]
    fn test_json_is_single_compact_object() {
        let mut report = EvalReport::new();
        report.record_case("basic", CaseOutcome::Success);
        report.append_message("Failed to start server.");
        assert_eq!(
            report.to_json_string(),
            r#"{"message":"basic is success\nFailed to start server."}"#
        );
    }

    #[test]
    fn test_empty_report() {
        assert_eq!(EvalReport::new().to_json_string(), r#"{"message":""}"#);
    }

    #[test]
    fn test_summary_counts() {
        let mut summary = SuiteSummary::default();
        summary.record(CaseOutcome::Success);
        summary.record(CaseOutcome::Success);
        summary.record(CaseOutcome::Timeout);
        assert_eq!(summary.success, 2);
        assert_eq!(summary.failure, 0);
        assert_eq!(summary.timeout, 1);
        assert_eq!(summary.total(), 3);
    }
}
