//! The fixed, ordered catalog of query workloads and how many queries each run generates.

use crate::{Error, Result};

/// Every workload the harness can run, in execution order
///
/// `groupby-orderby-limit` and `lastpoint` are not answered by every backend and are left out.
pub const WORKLOADS: &[&str] = &[
    "cpu-max-all-1",
    "cpu-max-all-8",
    "double-groupby-1",
    "double-groupby-5",
    "double-groupby-all",
    "high-cpu-1",
    "high-cpu-all",
    "single-groupby-1-1-1",
    "single-groupby-1-1-12",
    "single-groupby-1-8-1",
    "single-groupby-5-1-1",
    "single-groupby-5-1-12",
    "single-groupby-5-8-1",
];

/// Queries per worker for cheap workloads, enough distinct queries to keep every worker busy
pub const HIGH_QUERY_MULTIPLIER: usize = 1000;

/// Queries per worker for everything else
pub const DEFAULT_QUERY_MULTIPLIER: usize = 10;

pub fn query_multiplier(workload: &str) -> usize {
    if workload.contains("single-group") || workload.contains("cpu-max") {
        HIGH_QUERY_MULTIPLIER
    } else {
        DEFAULT_QUERY_MULTIPLIER
    }
}

/// The number of queries to generate for a run of `workload` with `workers` concurrent workers
pub fn query_count(workload: &str, workers: usize) -> usize {
    workers * query_multiplier(workload)
}

/// The catalog workloads matching the glob `pattern`, in catalog order
pub fn select_workloads(pattern: &str) -> Result<Vec<&'static str>> {
    let pattern = glob::Pattern::new(pattern).map_err(|source| Error::InvalidPattern {
        pattern: pattern.to_owned(),
        source,
    })?;
    Ok(WORKLOADS
        .iter()
        .copied()
        .filter(|w| pattern.matches(w))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_counts() {
        assert_eq!(query_count("single-groupby-1-1-1", 8), 8000);
        assert_eq!(query_count("cpu-max-all-8", 2), 2000);
        assert_eq!(query_count("double-groupby-5", 8), 80);
        assert_eq!(query_count("high-cpu-all", 1), 10);
    }

    #[test]
    fn select_by_glob() {
        assert_eq!(select_workloads("*").unwrap(), WORKLOADS);
        assert_eq!(
            select_workloads("double-groupby-*").unwrap(),
            vec!["double-groupby-1", "double-groupby-5", "double-groupby-all"]
        );
        assert_eq!(
            select_workloads("single-groupby-?-8-1").unwrap(),
            vec!["single-groupby-1-8-1", "single-groupby-5-8-1"]
        );
        assert!(select_workloads("lastpoint").unwrap().is_empty());
    }

    #[test]
    fn bad_glob_is_an_error() {
        assert!(matches!(
            select_workloads("cpu-[").unwrap_err(),
            Error::InvalidPattern { .. }
        ));
    }
}
