//! Sequences datasets, loads, query runs and validations across the workload catalog.
//!
//! Workloads always run one after another: concurrent runs would contend for the backend and
//! corrupt the latency measurements.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use observability_deps::tracing::{error, info};

use crate::{
    Result,
    config::HarnessConfig,
    dataset::DatasetStore,
    load::LoadPipeline,
    metrics::{BenchmarkRecord, parse_output},
    process::Supervisor,
    query::{QueryPipeline, RunnerMode},
    registry::SystemRegistry,
    validate::{ConsistencyValidator, ValidationOutcome, ValidationReport},
    workload::{query_count, select_workloads},
};

#[derive(Debug)]
pub struct RunCoordinator {
    registry: Arc<SystemRegistry>,
    datasets: DatasetStore,
    loader: LoadPipeline,
    queries: QueryPipeline,
    logs_dir: PathBuf,
}

impl RunCoordinator {
    pub fn new(
        registry: Arc<SystemRegistry>,
        config: HarnessConfig,
        supervisor: Supervisor,
    ) -> Self {
        let HarnessConfig {
            toolchain,
            params,
            data_dir,
            logs_dir,
            echo_load_output,
        } = config;

        Self {
            datasets: DatasetStore::new(
                data_dir,
                toolchain.clone(),
                params.clone(),
                supervisor.clone(),
            ),
            loader: LoadPipeline::new(toolchain.clone(), &logs_dir, supervisor.clone())
                .with_echo(echo_load_output),
            queries: QueryPipeline::new(toolchain, params, supervisor),
            registry,
            logs_dir,
        }
    }

    pub fn registry(&self) -> &SystemRegistry {
        &self.registry
    }

    pub fn logs_dir(&self) -> &Path {
        &self.logs_dir
    }

    /// Make sure the dataset for `system` exists, then load it; returns the load log's path
    pub async fn load(&self, system: &str) -> Result<PathBuf> {
        let profile = self.registry.get(system)?;
        let key = self.datasets.key_for(&profile.format);

        let loaded = async {
            let dataset = self.datasets.ensure(&key).await?;
            self.loader.load(profile, &dataset).await
        }
        .await;
        if let Err(e) = &loaded {
            error!(system, %e, "load failed");
        }
        loaded
    }

    /// Benchmark every catalog workload matching `pattern` against `system`
    ///
    /// Unsupported workloads are skipped. The first failing run aborts the batch.
    pub async fn run_queries(
        &self,
        system: &str,
        pattern: &str,
        workers: usize,
    ) -> Result<Vec<BenchmarkRecord>> {
        let profile = self.registry.get(system)?;
        let mut records = vec![];

        for workload in select_workloads(pattern)? {
            println!("=== Running workload {workload} with {workers} workers");
            if profile.is_unsupported(workload) {
                println!("Not supported!");
                info!(system, workload, "skipping unsupported workload");
                continue;
            }

            let hdr_latencies = self
                .logs_dir
                .join(format!("hdr-{system}-{workload}-workers={workers}.txt"));
            let mode = RunnerMode::Benchmark {
                workers,
                hdr_latencies,
            };
            let output = match self
                .queries
                .run(profile, workload, query_count(workload, workers), &mode)
                .await
            {
                Ok(output) => output,
                Err(e) => {
                    error!(system, workload, %e, "query run failed");
                    return Err(e);
                }
            };
            let record = BenchmarkRecord::new(system, workload, workers, parse_output(&output));
            let path = record.write_to(&self.logs_dir)?;
            println!("{}", record.to_json_string_pretty()?);
            info!(path = %path.display(), "wrote benchmark record");
            records.push(record);
        }

        Ok(records)
    }

    /// Compare `reference` and `candidate` on every catalog workload matching `pattern`
    ///
    /// Mismatches are printed and collected; process failures abort the batch.
    pub async fn test(
        &self,
        pattern: &str,
        reference: &str,
        candidate: &str,
    ) -> Result<ValidationReport> {
        let validator = ConsistencyValidator::new(
            &self.queries,
            self.registry.get(reference)?,
            self.registry.get(candidate)?,
        );
        let mut report = ValidationReport::default();

        for workload in select_workloads(pattern)? {
            if validator.is_unsupported(workload) {
                info!(workload, "skipping workload unsupported by a compared system");
                report.skipped.push(workload.to_owned());
                continue;
            }
            println!("Testing workload {workload}");

            let outcome = match validator.validate(workload).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(workload, %e, "validation run failed");
                    return Err(e);
                }
            };
            match &outcome {
                ValidationOutcome::Passed => (),
                ValidationOutcome::Mismatch { diff, responses } => {
                    println!("results differed for workload {workload}:");
                    println!("diff:");
                    println!("{diff}");
                    println!("\n\nresponses:");
                    for (system, response) in responses {
                        println!("{system}: {response:#}");
                    }
                }
                ValidationOutcome::Malformed { system, reason } => {
                    println!("unusable response from {system} for workload {workload}: {reason}");
                }
            }
            report.record(workload, &outcome);
        }

        if !report.is_success() {
            println!("\nFollowing workloads failed:\n{}", report.failed.join("\n"));
        }
        Ok(report)
    }
}
