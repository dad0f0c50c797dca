//! Structured performance records extracted from query runner output.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
    sync::LazyLock,
};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

static QUERY_RATE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Overall query rate ([\d\.]+)").expect("valid regex"));

static LATENCY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\w+):\s+([\d\.]+)ms").expect("valid regex"));

/// Throughput and latency statistics of one query run
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RunMetrics {
    /// Queries per second, absent when the runner does not report it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qps: Option<f64>,
    /// Milliseconds, keyed `<stat>_latency`
    #[serde(flatten)]
    pub latencies: BTreeMap<String, f64>,
}

impl RunMetrics {
    /// The latency in milliseconds of `stat`, e.g. `med`
    pub fn latency(&self, stat: &str) -> Option<f64> {
        self.latencies.get(&format!("{stat}_latency")).copied()
    }
}

/// Extract whatever metrics `output` contains
///
/// Never fails: lines that do not parse are ignored and a repeated statistic keeps its last value.
pub fn parse_output(output: &str) -> RunMetrics {
    let qps = QUERY_RATE
        .captures(output)
        .and_then(|c| c[1].parse().ok());

    let mut latencies = BTreeMap::new();
    for c in LATENCY.captures_iter(output) {
        if let Ok(value) = c[2].parse() {
            latencies.insert(format!("{}_latency", &c[1]), value);
        }
    }

    RunMetrics { qps, latencies }
}

/// The persisted result of running one workload against one system
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct BenchmarkRecord {
    pub system: String,
    pub workload: String,
    pub workers: usize,
    #[serde(flatten)]
    pub metrics: RunMetrics,
}

impl BenchmarkRecord {
    pub fn new(
        system: impl Into<String>,
        workload: impl Into<String>,
        workers: usize,
        metrics: RunMetrics,
    ) -> Self {
        Self {
            system: system.into(),
            workload: workload.into(),
            workers,
            metrics,
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "run-{}-{}-workers={}.json",
            self.system, self.workload, self.workers
        )
    }

    pub fn to_json_string_pretty(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|source| Error::Encode {
            what: "benchmark record",
            source,
        })
    }

    /// Write the record as pretty JSON into `dir`, returning the file's path
    pub fn write_to(&self, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(self.file_name());
        let json = self.to_json_string_pretty()?;
        std::fs::write(&path, json).map_err(Error::io(&path))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    const RUNNER_OUTPUT: &str = "\
Burn-in complete.
Run complete after 8000 queries with 8 workers (Overall query rate 2595.49 queries/sec):
Influx max cpu, all 8 hosts, random 12h0m0s by 1h:
min:     0.74ms, med:     1.13ms, mean:     3.02ms, max:   122.48ms, stddev:     6.31ms, sum:  24.2sec, count: 8000
all queries                                      :
min:     0.74ms, med:     1.13ms, mean:     3.02ms, max:   122.48ms, stddev:     6.31ms, sum:  24.2sec, count: 8000
wall clock time: 3.098146sec
";

    #[test]
    fn parse_rate_and_latencies() {
        let metrics =
            parse_output("Overall query rate 2595.49 queries/sec\nmin:     0.74ms, med:     1.13ms");
        assert_eq!(metrics.qps, Some(2595.49));
        assert_eq!(metrics.latency("min"), Some(0.74));
        assert_eq!(metrics.latency("med"), Some(1.13));
        assert_eq!(metrics.latencies.len(), 2);
    }

    #[test]
    fn parse_full_runner_summary() {
        let metrics = parse_output(RUNNER_OUTPUT);
        assert_eq!(metrics.qps, Some(2595.49));
        assert_eq!(
            metrics.latencies.keys().collect::<Vec<_>>(),
            vec![
                "max_latency",
                "mean_latency",
                "med_latency",
                "min_latency",
                "stddev_latency"
            ]
        );
        assert_eq!(metrics.latency("max"), Some(122.48));
    }

    #[test]
    fn missing_rate_is_omitted() {
        let metrics = parse_output("min:     2.50ms\nnothing else here");
        assert_eq!(metrics.qps, None);
        assert_eq!(metrics.latency("min"), Some(2.5));

        let record = BenchmarkRecord::new("influx", "lastpoint", 1, metrics);
        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(
            value,
            json!({
                "system": "influx",
                "workload": "lastpoint",
                "workers": 1,
                "min_latency": 2.5,
            })
        );
    }

    #[test]
    fn last_duplicate_wins() {
        let metrics = parse_output("min:     1.00ms\nmin:     2.00ms");
        assert_eq!(metrics.latency("min"), Some(2.0));
    }

    #[test]
    fn garbage_yields_empty_metrics() {
        assert_eq!(parse_output("panic: connection refused"), RunMetrics::default());
        assert_eq!(parse_output(""), RunMetrics::default());
    }

    #[test]
    fn record_written_as_json() {
        let dir = tempfile::tempdir().unwrap();
        let record = BenchmarkRecord::new("kudu", "cpu-max-all-8", 8, parse_output(RUNNER_OUTPUT));
        let path = record.write_to(dir.path()).unwrap();

        assert_eq!(path, dir.path().join("run-kudu-cpu-max-all-8-workers=8.json"));
        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written["qps"], json!(2595.49));
        assert_eq!(written["stddev_latency"], json!(6.31));
        assert_eq!(written["workers"], json!(8));
    }
}
