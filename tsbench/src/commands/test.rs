use anyhow::{Context, bail};
use tsbench_harness::{
    ValidationReport,
    validate::{DEFAULT_CANDIDATE, DEFAULT_REFERENCE},
};

use super::common::{HarnessArgs, supervised};

#[derive(Debug, clap::Parser)]
pub(crate) struct Config {
    #[clap(flatten)]
    harness: HarnessArgs,

    /// Glob selecting the workloads to compare
    #[clap(long = "workloads", default_value = "*", action)]
    workloads: String,

    /// The system whose responses are taken as correct
    #[clap(long = "reference", default_value = DEFAULT_REFERENCE, action)]
    reference: String,

    /// The system checked against the reference
    #[clap(long = "candidate", default_value = DEFAULT_CANDIDATE, action)]
    candidate: String,
}

pub(crate) async fn command(config: Config) -> anyhow::Result<()> {
    let Config {
        harness,
        workloads,
        reference,
        candidate,
    } = config;
    let registry = harness.registry.load()?;

    let report = supervised(harness.timeout(), |supervisor| async move {
        let coordinator = harness.coordinator(registry, supervisor, true)?;
        coordinator
            .test(&workloads, &reference, &candidate)
            .await
            .with_context(|| format!("comparing {candidate} against {reference}"))
    })
    .await?;

    check_report(&report)
}

/// Fail if any workload returned differing results, otherwise print a summary
fn check_report(report: &ValidationReport) -> anyhow::Result<()> {
    if !report.is_success() {
        bail!(
            "{} of {} workloads returned differing results",
            report.failed.len(),
            report.failed.len() + report.passed.len()
        );
    }
    println!(
        "{} workloads matched, {} skipped",
        report.passed.len(),
        report.skipped.len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn all_matching_workloads_succeed() {
        let report = ValidationReport {
            passed: names(&["cpu-max-all-1", "lastpoint"]),
            failed: vec![],
            skipped: names(&["high-cpu-1"]),
        };
        assert!(check_report(&report).is_ok());
    }

    #[test]
    fn any_failed_workload_fails_the_command() {
        let report = ValidationReport {
            passed: names(&["cpu-max-all-1"]),
            failed: names(&["groupby-orderby-limit"]),
            skipped: vec![],
        };
        let err = check_report(&report).unwrap_err();
        assert_eq!(
            err.to_string(),
            "1 of 2 workloads returned differing results"
        );
    }

    #[test]
    fn nothing_to_compare_is_not_a_failure() {
        assert!(check_report(&ValidationReport::default()).is_ok());
    }
}
