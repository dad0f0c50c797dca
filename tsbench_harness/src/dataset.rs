//! Content-addressed cache of compressed benchmark datasets.
//!
//! A dataset is generated by piping the data generator straight into a compressor that writes a
//! temporary file next to the final path. Only a fully generated and compressed file is renamed
//! into place, so a loader can never observe a partial dataset.

use std::{
    ffi::OsString,
    path::{Path, PathBuf},
    process::Stdio,
};

use observability_deps::tracing::{info, warn};
use tokio::process::Command;

use crate::{
    Error, Result,
    config::{DatasetParams, Toolchain},
    process::{Process, Supervisor},
};

/// Identifies a dataset; maps deterministically to a file name in the store
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetKey {
    pub format: String,
    pub use_case: String,
    pub seed: u64,
    pub scale: u64,
    pub timestamp_start: String,
    pub timestamp_end: String,
}

impl DatasetKey {
    pub fn new(format: impl Into<String>, params: &DatasetParams) -> Self {
        Self {
            format: format.into(),
            use_case: params.use_case.clone(),
            seed: params.seed,
            scale: params.scale,
            timestamp_start: params.timestamp_start.clone(),
            timestamp_end: params.timestamp_end.clone(),
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "data-{}-{}-seed-{}-scale-{}-{}-{}.txt.zst",
            self.format,
            self.use_case,
            self.seed,
            self.scale,
            compact_timestamp(&self.timestamp_start),
            compact_timestamp(&self.timestamp_end),
        )
    }
}

fn compact_timestamp(ts: &str) -> String {
    ts.chars().filter(char::is_ascii_alphanumeric).collect()
}

/// The temporary file a dataset is compressed into before being committed
pub fn temp_path(path: &Path) -> PathBuf {
    let mut tmp = OsString::from(path.as_os_str());
    tmp.push(".tmp");
    PathBuf::from(tmp)
}

#[derive(Debug)]
pub struct DatasetStore {
    data_dir: PathBuf,
    toolchain: Toolchain,
    params: DatasetParams,
    supervisor: Supervisor,
}

impl DatasetStore {
    pub fn new(
        data_dir: impl Into<PathBuf>,
        toolchain: Toolchain,
        params: DatasetParams,
        supervisor: Supervisor,
    ) -> Self {
        Self {
            data_dir: data_dir.into(),
            toolchain,
            params,
            supervisor,
        }
    }

    /// The key of the dataset this store generates for `format`
    pub fn key_for(&self, format: &str) -> DatasetKey {
        DatasetKey::new(format, &self.params)
    }

    pub fn path_for(&self, key: &DatasetKey) -> PathBuf {
        self.data_dir.join(key.file_name())
    }

    /// Flags for the data generator; everything but the log interval comes from the key
    pub fn generator_args(&self, key: &DatasetKey) -> Vec<String> {
        vec![
            format!("--use-case={}", key.use_case),
            format!("--seed={}", key.seed),
            format!("--scale={}", key.scale),
            format!("--timestamp-start={}", key.timestamp_start),
            format!("--timestamp-end={}", key.timestamp_end),
            format!("--log-interval={}", self.params.log_interval),
            format!("--format={}", key.format),
        ]
    }

    /// Return the path of the dataset for `key`, generating it first if it does not exist
    pub async fn ensure(&self, key: &DatasetKey) -> Result<PathBuf> {
        let path = self.path_for(key);
        if tokio::fs::try_exists(&path)
            .await
            .map_err(Error::io(&path))?
        {
            info!(path = %path.display(), "dataset already exists, using existing data");
            return Ok(path);
        }

        info!(format = %key.format, scale = key.scale, "generating dataset");
        let tmp_path = temp_path(&path);
        let committed = match self.generate(key, &tmp_path).await {
            Ok(()) => tokio::fs::rename(&tmp_path, &path)
                .await
                .map_err(Error::io(&path)),
            Err(e) => Err(e),
        };
        if let Err(e) = committed {
            remove_temp(&tmp_path).await;
            return Err(e);
        }

        info!(path = %path.display(), "dataset generated");
        Ok(path)
    }

    async fn generate(&self, key: &DatasetKey, tmp_path: &Path) -> Result<()> {
        let watch = self.supervisor.watch();

        let mut compressor = Process::spawn(
            Command::new(&self.toolchain.compressor)
                .args(["-q", "-f", "-o"])
                .arg(tmp_path)
                .stdin(Stdio::piped())
                .stdout(Stdio::null()),
        )?;
        // the command owning the compressor's stdin is dropped with this statement, leaving the
        // generator as the only writer
        let mut generator = Process::spawn(
            Command::new(self.toolchain.data_generator())
                .args(self.generator_args(key))
                .stdin(Stdio::null())
                .stdout(compressor.take_stdin()?),
        )?;

        let status = match watch.wait(&mut generator).await {
            Ok(status) => status,
            Err(e) => {
                compressor.kill().await;
                return Err(e);
            }
        };
        if !status.success() {
            // a compressor that died first makes the generator fail on a broken pipe
            if let Some(compressor_status) = compressor.try_wait() {
                if !compressor_status.success() {
                    return Err(Error::CompressionFailure {
                        program: compressor.program().to_owned(),
                        status: compressor_status,
                    });
                }
            }
            compressor.kill().await;
            return Err(Error::GenerationFailure {
                program: generator.program().to_owned(),
                status,
            });
        }

        let status = watch.wait(&mut compressor).await?;
        if !status.success() {
            return Err(Error::CompressionFailure {
                program: compressor.program().to_owned(),
                status,
            });
        }
        Ok(())
    }
}

async fn remove_temp(tmp_path: &Path) {
    match tokio::fs::remove_file(tmp_path).await {
        Ok(()) => info!(path = %tmp_path.display(), "removed partial dataset"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => (),
        Err(e) => warn!(path = %tmp_path.display(), %e, "failed to remove partial dataset"),
    }
}
