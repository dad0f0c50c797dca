//! Orchestration and validation engine for time series database benchmarks.
//!
//! The harness never generates data or runs queries itself. It drives the external `tsbs_*`
//! executables, wiring their standard streams together with OS pipes so that a dataset is never
//! materialized twice, and interprets what they print:
//!
//! - [`DatasetStore`] generates a compressed dataset once per [`DatasetKey`] and commits it
//!   atomically.
//! - [`LoadPipeline`] streams a stored dataset through a decompressor into a loader.
//! - [`QueryPipeline`] streams generated queries into a query runner.
//! - [`parse_output`] turns runner output into a [`BenchmarkRecord`].
//! - [`ConsistencyValidator`] diffs the normalized responses of two backends.
//! - [`RunCoordinator`] sequences all of the above across the workload catalog.
use std::{io, path::PathBuf, process::ExitStatus, time::Duration};

use thiserror::Error;

pub mod config;
pub mod coordinator;
pub mod dataset;
pub mod load;
pub mod metrics;
mod process;
pub mod query;
pub mod registry;
pub mod validate;
pub mod workload;

pub use config::{DatasetParams, HarnessConfig, Toolchain};
pub use coordinator::RunCoordinator;
pub use dataset::{DatasetKey, DatasetStore};
pub use load::LoadPipeline;
pub use metrics::{BenchmarkRecord, RunMetrics, parse_output};
pub use process::Supervisor;
pub use query::{QueryPipeline, RunnerMode};
pub use registry::{SystemProfile, SystemRegistry};
pub use validate::{ConsistencyValidator, ValidationOutcome, ValidationReport};

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown system '{name}', available systems are: {available}")]
    UnknownSystem { name: String, available: String },

    #[error("system '{0}' is defined more than once in the registry")]
    DuplicateSystem(String),

    #[error("invalid glob pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        source: glob::PatternError,
    },

    #[error("failed to read system registry from {path:?}: {source}")]
    ReadRegistry { path: PathBuf, source: io::Error },

    #[error("failed to parse system registry: {0}")]
    ParseRegistry(#[source] serde_json::Error),

    #[error("failed to encode {what} as JSON: {source}")]
    Encode {
        what: &'static str,
        source: serde_json::Error,
    },

    #[error("failed to spawn {program}: {source}")]
    Spawn { program: String, source: io::Error },

    #[error("failed to set up pipe for {program}: {source}")]
    Pipe { program: String, source: io::Error },

    #[error("failed waiting on {program}: {source}")]
    Wait { program: String, source: io::Error },

    #[error("failed to drain output of {program}: {source}")]
    Drain { program: String, source: io::Error },

    #[error("data generation failed: {program} exited with {status}")]
    GenerationFailure { program: String, status: ExitStatus },

    #[error("compression failed: {program} exited with {status}")]
    CompressionFailure { program: String, status: ExitStatus },

    #[error("decompression failed: {program} exited with {status}")]
    DecompressionFailure { program: String, status: ExitStatus },

    #[error("load failed: {program} exited with {status}, last lines of {log:?}:\n{tail}")]
    LoadFailure {
        program: String,
        status: ExitStatus,
        log: PathBuf,
        tail: String,
    },

    #[error("query run failed: {program} exited with {status}, output:\n{output}")]
    RunFailure {
        program: String,
        status: ExitStatus,
        output: String,
    },

    #[error("cancelled while waiting on {program}")]
    Cancelled { program: String },

    #[error("{program} did not finish within {timeout:?}")]
    TimedOut { program: String, timeout: Duration },

    #[error("I/O error on {path:?}: {source}")]
    Io { path: PathBuf, source: io::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> Self {
        let path = path.into();
        move |source| Self::Io { path, source }
    }
}
