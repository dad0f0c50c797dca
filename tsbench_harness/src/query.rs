//! Streams generated queries straight into a backend's query runner.

use std::{path::PathBuf, process::Stdio};

use observability_deps::tracing::{debug, info};
use tokio::process::Command;

use crate::{
    Error, Result,
    config::{DatasetParams, Toolchain},
    process::{Fanout, Process, Supervisor, combined_output, join_fanout},
    registry::SystemProfile,
};

/// How the query runner reports on the queries it executes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunnerMode {
    /// Measure throughput and latency with `workers` concurrent workers
    Benchmark {
        workers: usize,
        hdr_latencies: PathBuf,
    },
    /// Print every response so it can be compared across backends
    PrintResponses,
}

#[derive(Debug)]
pub struct QueryPipeline {
    toolchain: Toolchain,
    params: DatasetParams,
    supervisor: Supervisor,
}

impl QueryPipeline {
    pub fn new(toolchain: Toolchain, params: DatasetParams, supervisor: Supervisor) -> Self {
        Self {
            toolchain,
            params,
            supervisor,
        }
    }

    pub fn generator_args(
        &self,
        profile: &SystemProfile,
        workload: &str,
        count: usize,
    ) -> Vec<String> {
        let mut args = self.params.common_args();
        args.extend([
            format!("--format={}", profile.format),
            format!("--query-type={workload}"),
            format!("--queries={count}"),
        ]);
        args
    }

    pub fn runner_args(profile: &SystemProfile, mode: &RunnerMode) -> Vec<String> {
        let mut args = match mode {
            RunnerMode::Benchmark {
                workers,
                hdr_latencies,
            } => vec![
                format!("--workers={workers}"),
                "--print-interval=0".to_owned(),
                format!("--hdr-latencies={}", hdr_latencies.display()),
            ],
            RunnerMode::PrintResponses => vec![
                "--print-interval=0".to_owned(),
                "--print-responses".to_owned(),
            ],
        };
        args.extend(profile.run_flags());
        args
    }

    /// Spawn the query generator; its stdout is the query stream, its stderr is discarded
    pub(crate) fn generate_queries(
        &self,
        profile: &SystemProfile,
        workload: &str,
        count: usize,
    ) -> Result<Process> {
        Process::spawn(
            Command::new(self.toolchain.query_generator())
                .args(self.generator_args(profile, workload, count))
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::null()),
        )
    }

    /// Run `count` generated queries of `workload` against `profile`, returning the runner's
    /// combined output
    pub async fn run(
        &self,
        profile: &SystemProfile,
        workload: &str,
        count: usize,
        mode: &RunnerMode,
    ) -> Result<String> {
        info!(system = %profile.name, workload, count, "running queries");
        let watch = self.supervisor.watch();
        let mut generator = self.generate_queries(profile, workload, count)?;

        let runner_path = self.toolchain.query_runner(&profile.format);
        let (output, stdout, stderr) = combined_output(&runner_path.to_string_lossy())?;
        let mut runner = Process::spawn(
            Command::new(&runner_path)
                .args(Self::runner_args(profile, mode))
                .stdin(generator.take_stdout()?)
                .stdout(stdout)
                .stderr(stderr),
        )?;
        let drain = Fanout::new().with_capture().spawn(output, &self.supervisor);

        let status = match watch.wait(&mut runner).await {
            Ok(status) => status,
            Err(e) => {
                generator.kill().await;
                return Err(e);
            }
        };
        let output = join_fanout(drain, runner.program()).await?;
        let output = String::from_utf8_lossy(&output).into_owned();
        if !status.success() {
            generator.kill().await;
            return Err(Error::RunFailure {
                program: runner.program().to_owned(),
                status,
                output,
            });
        }

        let status = watch.wait(&mut generator).await?;
        if !status.success() {
            return Err(Error::GenerationFailure {
                program: generator.program().to_owned(),
                status,
            });
        }

        debug!(system = %profile.name, workload, bytes = output.len(), "query run complete");
        Ok(output)
    }
}
