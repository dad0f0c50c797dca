//! Cross-backend consistency checks.
//!
//! The same single query is run against a reference and a candidate backend with the runner in
//! print-responses mode. Both responses are normalized and compared as canonical JSON; any
//! difference fails the workload without stopping the batch.

use observability_deps::tracing::{info, warn};
use serde_json::Value;

use crate::{
    Result,
    query::{QueryPipeline, RunnerMode},
    registry::SystemProfile,
};

pub mod response;

pub use response::{
    RESPONSE_PREFIX, canonicalize, diff, normalize, reconstruct_response, to_canonical_string,
};

pub const DEFAULT_REFERENCE: &str = "influx";
pub const DEFAULT_CANDIDATE: &str = "kudu";

/// The result of comparing one workload across two backends
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationOutcome {
    Passed,
    /// The normalized responses differ
    Mismatch {
        diff: String,
        /// Normalized response per system, reference first
        responses: Vec<(String, Value)>,
    },
    /// A backend's output did not contain a parsable response
    Malformed { system: String, reason: String },
}

impl ValidationOutcome {
    pub fn is_passed(&self) -> bool {
        matches!(self, Self::Passed)
    }
}

/// Workload names by outcome, in execution order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    pub passed: Vec<String>,
    pub failed: Vec<String>,
    /// Workloads that at least one of the compared systems does not support
    pub skipped: Vec<String>,
}

impl ValidationReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn record(&mut self, workload: &str, outcome: &ValidationOutcome) {
        if outcome.is_passed() {
            self.passed.push(workload.to_owned());
        } else {
            self.failed.push(workload.to_owned());
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConsistencyValidator<'a> {
    query: &'a QueryPipeline,
    reference: &'a SystemProfile,
    candidate: &'a SystemProfile,
}

impl<'a> ConsistencyValidator<'a> {
    pub fn new(
        query: &'a QueryPipeline,
        reference: &'a SystemProfile,
        candidate: &'a SystemProfile,
    ) -> Self {
        Self {
            query,
            reference,
            candidate,
        }
    }

    pub fn reference(&self) -> &'a SystemProfile {
        self.reference
    }

    pub fn candidate(&self) -> &'a SystemProfile {
        self.candidate
    }

    /// Whether either system declares `workload` unsupported
    pub fn is_unsupported(&self, workload: &str) -> bool {
        self.reference.is_unsupported(workload) || self.candidate.is_unsupported(workload)
    }

    /// Run one query of `workload` against both systems and compare the responses
    ///
    /// Process failures are errors; an unusable response is a [`ValidationOutcome::Malformed`].
    pub async fn validate(&self, workload: &str) -> Result<ValidationOutcome> {
        info!(
            workload,
            reference = %self.reference.name,
            candidate = %self.candidate.name,
            "validating workload"
        );

        let reference = match self.fetch(self.reference, workload).await? {
            Ok(response) => response,
            Err(malformed) => return Ok(malformed),
        };
        let candidate = match self.fetch(self.candidate, workload).await? {
            Ok(response) => response,
            Err(malformed) => return Ok(malformed),
        };

        let changes = diff(
            &self.reference.name,
            &to_canonical_string(&reference),
            &self.candidate.name,
            &to_canonical_string(&candidate),
        );
        if changes.is_empty() {
            Ok(ValidationOutcome::Passed)
        } else {
            Ok(ValidationOutcome::Mismatch {
                diff: changes,
                responses: vec![
                    (self.reference.name.clone(), reference),
                    (self.candidate.name.clone(), candidate),
                ],
            })
        }
    }

    /// The normalized response of `system`, or the outcome recording why it is unusable
    async fn fetch(
        &self,
        system: &SystemProfile,
        workload: &str,
    ) -> Result<Result<Value, ValidationOutcome>> {
        let output = self
            .query
            .run(system, workload, 1, &RunnerMode::PrintResponses)
            .await?;
        Ok(parse_response(&output).map_err(|reason| {
            warn!(system = %system.name, workload, %reason, "malformed response");
            ValidationOutcome::Malformed {
                system: system.name.clone(),
                reason,
            }
        }))
    }
}

/// Reconstruct, parse and normalize the response printed in `output`
fn parse_response(output: &str) -> Result<Value, String> {
    let text = reconstruct_response(output, RESPONSE_PREFIX)
        .ok_or_else(|| format!("no line tagged '{RESPONSE_PREFIX}' in runner output"))?;
    let mut response: Value =
        serde_json::from_str(&text).map_err(|e| format!("invalid JSON response: {e}"))?;
    normalize(&mut response);
    Ok(response)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    #[test]
    fn parse_normalizes() {
        let output = "ID 0:{\nID 0:\"response\": {\"results\": [{\"series\": [{\"columns\": [\"a\", \"b\"]}]}]}\nID 0:}\n";
        assert_eq!(
            parse_response(output).unwrap(),
            json!({"response": {"results": [{"series": [{"column_count": 2}]}]}})
        );
    }

    #[test]
    fn parse_rejects_garbage() {
        let err = parse_response("error: dial tcp: connection refused\n").unwrap_err();
        assert!(err.contains("no line tagged"), "{err}");

        let err = parse_response("ID 0:{\nID 0: \"a\": \n").unwrap_err();
        assert!(err.starts_with("invalid JSON response"), "{err}");
    }

    #[test]
    fn report_tracks_failures() {
        let mut report = ValidationReport::default();
        report.record("cpu-max-all-1", &ValidationOutcome::Passed);
        assert!(report.is_success());

        report.record(
            "high-cpu-1",
            &ValidationOutcome::Malformed {
                system: "kudu".to_owned(),
                reason: "empty".to_owned(),
            },
        );
        assert!(!report.is_success());
        assert_eq!(report.passed, vec!["cpu-max-all-1"]);
        assert_eq!(report.failed, vec!["high-cpu-1"]);
    }
}
