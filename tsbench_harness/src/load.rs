//! Streams a stored dataset into a backend's loader.

use std::{
    fs::File,
    path::{Path, PathBuf},
    process::Stdio,
};

use observability_deps::tracing::info;
use tokio::process::Command;

use crate::{
    Error, Result,
    config::Toolchain,
    process::{Fanout, Process, Supervisor, combined_output, join_fanout},
    registry::SystemProfile,
};

/// Interval between loader progress reports
pub const LOAD_REPORTING_PERIOD: &str = "1s";

/// Concurrent loader workers
pub const LOAD_WORKERS: usize = 8;

/// Lines of the load log included in a [`Error::LoadFailure`]
const LOG_TAIL_LINES: usize = 20;

#[derive(Debug)]
pub struct LoadPipeline {
    toolchain: Toolchain,
    logs_dir: PathBuf,
    echo: bool,
    supervisor: Supervisor,
}

impl LoadPipeline {
    pub fn new(
        toolchain: Toolchain,
        logs_dir: impl Into<PathBuf>,
        supervisor: Supervisor,
    ) -> Self {
        Self {
            toolchain,
            logs_dir: logs_dir.into(),
            echo: true,
            supervisor,
        }
    }

    /// Whether loader output is echoed to stdout as well as written to the load log
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub fn log_path(&self, system: &str) -> PathBuf {
        self.logs_dir.join(format!("load-{system}.txt"))
    }

    pub fn loader_args(profile: &SystemProfile) -> Vec<String> {
        let mut args = vec![
            format!("--reporting-period={LOAD_REPORTING_PERIOD}"),
            format!("--workers={LOAD_WORKERS}"),
        ];
        args.extend(profile.load_flags());
        args
    }

    /// Decompress `dataset` into the loader of `profile`; returns the path of the load log
    pub async fn load(&self, profile: &SystemProfile, dataset: &Path) -> Result<PathBuf> {
        let log_path = self.log_path(&profile.name);
        let log = File::create(&log_path).map_err(Error::io(&log_path))?;
        info!(system = %profile.name, dataset = %dataset.display(), "loading dataset");

        let watch = self.supervisor.watch();
        let mut decompressor = Process::spawn(
            Command::new(&self.toolchain.decompressor)
                .arg(dataset)
                .stdin(Stdio::null())
                .stdout(Stdio::piped()),
        )?;

        let loader_path = self.toolchain.loader(&profile.format);
        let (output, stdout, stderr) = combined_output(&loader_path.to_string_lossy())?;
        let mut loader = Process::spawn(
            Command::new(&loader_path)
                .args(Self::loader_args(profile))
                .stdin(decompressor.take_stdout()?)
                .stdout(stdout)
                .stderr(stderr),
        )?;
        let drain = Fanout::new()
            .with_log(log)
            .with_echo(self.echo)
            .spawn(output, &self.supervisor);

        let status = match watch.wait(&mut loader).await {
            Ok(status) => status,
            Err(e) => {
                decompressor.kill().await;
                return Err(e);
            }
        };
        join_fanout(drain, loader.program()).await?;
        if !status.success() {
            decompressor.kill().await;
            return Err(Error::LoadFailure {
                program: loader.program().to_owned(),
                status,
                tail: log_tail(&log_path, LOG_TAIL_LINES),
                log: log_path,
            });
        }

        let status = watch.wait(&mut decompressor).await?;
        if !status.success() {
            return Err(Error::DecompressionFailure {
                program: decompressor.program().to_owned(),
                status,
            });
        }

        info!(system = %profile.name, log = %log_path.display(), "load complete");
        Ok(log_path)
    }
}

/// The last `lines` lines of a log file, empty if it cannot be read
fn log_tail(path: &Path, lines: usize) -> String {
    let Ok(contents) = std::fs::read(path) else {
        return String::new();
    };
    let contents = String::from_utf8_lossy(&contents);
    let all: Vec<&str> = contents.lines().collect();
    all[all.len().saturating_sub(lines)..].join("\n")
}
