//! Where the external executables live and the fixed parameters of a benchmark dataset.

use std::path::{Path, PathBuf};

pub const DEFAULT_USE_CASE: &str = "cpu-only";
pub const DEFAULT_SEED: u64 = 123;
pub const DEFAULT_SCALE: u64 = 4000;
pub const DEFAULT_TIMESTAMP_START: &str = "2019-04-01T00:00:00Z";
pub const DEFAULT_TIMESTAMP_END: &str = "2019-04-04T00:00:00Z";
pub const DEFAULT_LOG_INTERVAL: &str = "10s";

/// Locations of the generator, loader, query runner and compression executables
///
/// Loaders and query runners are resolved per wire format, e.g. `tsbs_load_influx` and
/// `tsbs_run_queries_influx` for the `influx` format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Toolchain {
    pub bin_dir: PathBuf,
    pub compressor: PathBuf,
    pub decompressor: PathBuf,
}

impl Toolchain {
    pub fn new(bin_dir: impl Into<PathBuf>) -> Self {
        Self {
            bin_dir: bin_dir.into(),
            compressor: PathBuf::from("zstd"),
            decompressor: PathBuf::from("zstdcat"),
        }
    }

    /// Compressor invoked as `<compressor> -q -f -o <path>`, reading the dataset from stdin
    pub fn with_compressor(mut self, compressor: impl Into<PathBuf>) -> Self {
        self.compressor = compressor.into();
        self
    }

    /// Decompressor invoked as `<decompressor> <path>`, writing the dataset to stdout
    pub fn with_decompressor(mut self, decompressor: impl Into<PathBuf>) -> Self {
        self.decompressor = decompressor.into();
        self
    }

    pub fn data_generator(&self) -> PathBuf {
        self.bin_dir.join("tsbs_generate_data")
    }

    pub fn query_generator(&self) -> PathBuf {
        self.bin_dir.join("tsbs_generate_queries")
    }

    pub fn loader(&self, format: &str) -> PathBuf {
        self.bin_dir.join(format!("tsbs_load_{format}"))
    }

    pub fn query_runner(&self, format: &str) -> PathBuf {
        self.bin_dir.join(format!("tsbs_run_queries_{format}"))
    }
}

/// Parameters shared by data and query generation
///
/// Queries must be generated with the same parameters as the loaded data, otherwise they target
/// hosts and time ranges that do not exist in the database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetParams {
    pub use_case: String,
    pub seed: u64,
    pub scale: u64,
    pub timestamp_start: String,
    pub timestamp_end: String,
    pub log_interval: String,
}

impl Default for DatasetParams {
    fn default() -> Self {
        Self {
            use_case: DEFAULT_USE_CASE.to_owned(),
            seed: DEFAULT_SEED,
            scale: DEFAULT_SCALE,
            timestamp_start: DEFAULT_TIMESTAMP_START.to_owned(),
            timestamp_end: DEFAULT_TIMESTAMP_END.to_owned(),
            log_interval: DEFAULT_LOG_INTERVAL.to_owned(),
        }
    }
}

impl DatasetParams {
    /// Flags passed to both the data and the query generator
    pub fn common_args(&self) -> Vec<String> {
        vec![
            format!("--use-case={}", self.use_case),
            format!("--seed={}", self.seed),
            format!("--scale={}", self.scale),
            format!("--timestamp-start={}", self.timestamp_start),
            format!("--timestamp-end={}", self.timestamp_end),
        ]
    }
}

/// Everything a [`RunCoordinator`][crate::RunCoordinator] needs besides the system registry
#[derive(Debug, Clone)]
pub struct HarnessConfig {
    pub toolchain: Toolchain,
    pub params: DatasetParams,
    /// Directory of the content-addressed dataset cache
    pub data_dir: PathBuf,
    /// Directory receiving load logs, HDR latency files and JSON results
    pub logs_dir: PathBuf,
    /// Echo loader output to stdout in addition to the load log
    pub echo_load_output: bool,
}

impl HarnessConfig {
    pub fn new(
        toolchain: Toolchain,
        data_dir: impl AsRef<Path>,
        logs_dir: impl AsRef<Path>,
    ) -> Self {
        Self {
            toolchain,
            params: DatasetParams::default(),
            data_dir: data_dir.as_ref().to_path_buf(),
            logs_dir: logs_dir.as_ref().to_path_buf(),
            echo_load_output: true,
        }
    }

    pub fn with_params(mut self, params: DatasetParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_echo_load_output(mut self, echo: bool) -> Self {
        self.echo_load_output = echo;
        self
    }
}
