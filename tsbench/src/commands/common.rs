use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use anyhow::Context;
use observability_deps::tracing::info;
use tsbench_harness::{
    DatasetParams, HarnessConfig, RunCoordinator, Supervisor, SystemRegistry, Toolchain,
    config::{
        DEFAULT_LOG_INTERVAL, DEFAULT_SCALE, DEFAULT_SEED, DEFAULT_TIMESTAMP_END,
        DEFAULT_TIMESTAMP_START, DEFAULT_USE_CASE,
    },
};
use tsbench_shutdown::ShutdownManager;

/// Where to find the system catalog
#[derive(Debug, clap::Parser)]
pub(crate) struct RegistryArgs {
    /// JSON file with an array of system profiles, replacing the built-in systems
    #[clap(long = "registry", env = "TSBENCH_REGISTRY", action)]
    pub(crate) registry: Option<PathBuf>,
}

impl RegistryArgs {
    pub(crate) fn load(&self) -> anyhow::Result<SystemRegistry> {
        match &self.registry {
            Some(path) => SystemRegistry::from_path(path)
                .with_context(|| format!("loading system registry from {}", path.display())),
            None => Ok(SystemRegistry::builtin()),
        }
    }
}

/// Options shared by every command that drives the benchmark executables
#[derive(Debug, clap::Parser)]
pub(crate) struct HarnessArgs {
    #[clap(flatten)]
    pub(crate) registry: RegistryArgs,

    /// Directory holding the `tsbs_*` executables
    ///
    /// Defaults to `$GOROOT/bin`, or `~/go/bin` when `GOROOT` is not set.
    #[clap(long = "bin-dir", env = "TSBENCH_BIN_DIR", action)]
    pub(crate) bin_dir: Option<PathBuf>,

    /// Directory of the generated dataset cache
    #[clap(
        long = "data-dir",
        env = "TSBENCH_DATA_DIR",
        default_value = "gen-data",
        action
    )]
    pub(crate) data_dir: PathBuf,

    /// Directory receiving load logs, latency histograms and JSON results
    #[clap(long = "logs-dir", env = "TSBENCH_LOGS_DIR", default_value = "logs", action)]
    pub(crate) logs_dir: PathBuf,

    /// Compressor invoked as `<compressor> -q -f -o <path>`
    #[clap(
        long = "compressor",
        env = "TSBENCH_COMPRESSOR",
        default_value = "zstd",
        action
    )]
    pub(crate) compressor: PathBuf,

    /// Decompressor invoked as `<decompressor> <path>`
    #[clap(
        long = "decompressor",
        env = "TSBENCH_DECOMPRESSOR",
        default_value = "zstdcat",
        action
    )]
    pub(crate) decompressor: PathBuf,

    #[clap(
        long = "use-case",
        env = "TSBENCH_USE_CASE",
        default_value = DEFAULT_USE_CASE,
        action
    )]
    pub(crate) use_case: String,

    #[clap(long = "seed", env = "TSBENCH_SEED", default_value_t = DEFAULT_SEED, action)]
    pub(crate) seed: u64,

    /// Number of simulated hosts
    #[clap(long = "scale", env = "TSBENCH_SCALE", default_value_t = DEFAULT_SCALE, action)]
    pub(crate) scale: u64,

    #[clap(
        long = "timestamp-start",
        env = "TSBENCH_TIMESTAMP_START",
        default_value = DEFAULT_TIMESTAMP_START,
        action
    )]
    pub(crate) timestamp_start: String,

    #[clap(
        long = "timestamp-end",
        env = "TSBENCH_TIMESTAMP_END",
        default_value = DEFAULT_TIMESTAMP_END,
        action
    )]
    pub(crate) timestamp_end: String,

    /// Abort a pipeline that runs longer than this, e.g. `30m`
    #[clap(long = "timeout", env = "TSBENCH_TIMEOUT", action)]
    pub(crate) timeout: Option<humantime::Duration>,
}

impl HarnessArgs {
    pub(crate) fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Into::into)
    }

    /// Create the output directories and assemble a coordinator driving the configured toolchain
    pub(crate) fn coordinator(
        self,
        registry: SystemRegistry,
        supervisor: Supervisor,
        echo_load_output: bool,
    ) -> anyhow::Result<RunCoordinator> {
        let bin_dir = match self.bin_dir {
            Some(dir) => dir,
            None => default_bin_dir()?,
        };
        create_dir(&self.data_dir)?;
        create_dir(&self.logs_dir)?;
        info!(
            bin_dir = %bin_dir.display(),
            data_dir = %self.data_dir.display(),
            logs_dir = %self.logs_dir.display(),
            "configured benchmark toolchain"
        );

        let toolchain = Toolchain::new(bin_dir)
            .with_compressor(self.compressor)
            .with_decompressor(self.decompressor);
        let params = DatasetParams {
            use_case: self.use_case,
            seed: self.seed,
            scale: self.scale,
            timestamp_start: self.timestamp_start,
            timestamp_end: self.timestamp_end,
            log_interval: DEFAULT_LOG_INTERVAL.to_owned(),
        };
        let config = HarnessConfig::new(toolchain, &self.data_dir, &self.logs_dir)
            .with_params(params)
            .with_echo_load_output(echo_load_output);

        Ok(RunCoordinator::new(Arc::new(registry), config, supervisor))
    }
}

fn create_dir(dir: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))
}

/// `$GOROOT/bin`, falling back to `$HOME/go/bin`
pub(crate) fn default_bin_dir() -> anyhow::Result<PathBuf> {
    if let Some(goroot) = std::env::var_os("GOROOT") {
        return Ok(PathBuf::from(goroot).join("bin"));
    }
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join("go").join("bin"))
        .context("neither GOROOT nor HOME is set, pass --bin-dir")
}

/// Run `command` with a [`Supervisor`] that is cancelled on SIGINT, SIGTERM or SIGQUIT
///
/// Returns once the command has killed its processes and removed partial files, and every output
/// drain it started has flushed its log.
pub(crate) async fn supervised<T, F, Fut>(
    timeout: Option<Duration>,
    command: F,
) -> anyhow::Result<T>
where
    F: FnOnce(Supervisor) -> Fut + Send,
    Fut: Future<Output = anyhow::Result<T>> + Send,
    T: Send,
{
    let shutdown_manager = ShutdownManager::new();
    shutdown_manager.shutdown_on_signal();
    let token = shutdown_manager.register();

    let result = command(Supervisor::new(token.clone()).with_timeout(timeout)).await;

    token.complete();
    shutdown_manager.shutdown();
    shutdown_manager.join().await;
    result
}
