use std::{
    fs,
    os::unix::fs::PermissionsExt,
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use tempfile::TempDir;
use tsbench_harness::{
    DatasetStore, HarnessConfig, RunCoordinator, Supervisor, SystemRegistry, Toolchain,
};
use tsbench_shutdown::ShutdownManager;

/// Compressor stand-in: stores its input uncompressed at the `-o` path
const FAKE_COMPRESSOR: &str = r#"
while [ $# -gt 0 ]; do
    case "$1" in
        -o) out="$2"; shift 2 ;;
        *) shift ;;
    esac
done
exec cat > "$out"
"#;

const FAKE_DECOMPRESSOR: &str = r#"exec cat "$1""#;

/// A scratch directory holding fake benchmark executables, the dataset cache and the logs
#[derive(Debug)]
pub(crate) struct TestContext {
    dir: TempDir,
    pub(crate) manager: ShutdownManager,
}

impl TestContext {
    pub(crate) fn new() -> Self {
        let dir = TempDir::new().unwrap();
        for sub in ["bin", "gen-data", "logs"] {
            fs::create_dir(dir.path().join(sub)).unwrap();
        }
        let ctx = Self {
            dir,
            manager: ShutdownManager::new(),
        };
        ctx.script("zstd", FAKE_COMPRESSOR);
        ctx.script("zstdcat", FAKE_DECOMPRESSOR);
        ctx
    }

    pub(crate) fn path(&self) -> &Path {
        self.dir.path()
    }

    pub(crate) fn bin_dir(&self) -> PathBuf {
        self.path().join("bin")
    }

    pub(crate) fn data_dir(&self) -> PathBuf {
        self.path().join("gen-data")
    }

    pub(crate) fn logs_dir(&self) -> PathBuf {
        self.path().join("logs")
    }

    /// Install an executable `/bin/sh` script named `name` into the bin directory
    pub(crate) fn script(&self, name: &str, body: &str) -> PathBuf {
        let path = self.bin_dir().join(name);
        fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    pub(crate) fn toolchain(&self) -> Toolchain {
        Toolchain::new(self.bin_dir())
            .with_compressor(self.bin_dir().join("zstd"))
            .with_decompressor(self.bin_dir().join("zstdcat"))
    }

    pub(crate) fn config(&self) -> HarnessConfig {
        HarnessConfig::new(self.toolchain(), self.data_dir(), self.logs_dir())
            .with_echo_load_output(false)
    }

    /// Must be called from within a tokio runtime
    pub(crate) fn supervisor(&self) -> Supervisor {
        Supervisor::new(self.manager.register())
    }

    pub(crate) fn dataset_store(&self, timeout: Option<Duration>) -> DatasetStore {
        let config = self.config();
        DatasetStore::new(
            config.data_dir,
            config.toolchain,
            config.params,
            self.supervisor().with_timeout(timeout),
        )
    }

    pub(crate) fn coordinator(&self, registry: SystemRegistry) -> RunCoordinator {
        RunCoordinator::new(Arc::new(registry), self.config(), self.supervisor())
    }

    /// Names of the files in `dir`, sorted
    pub(crate) fn files_in(&self, dir: &Path) -> Vec<String> {
        let mut names: Vec<_> = fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    pub(crate) fn read(&self, path: impl AsRef<Path>) -> String {
        fs::read_to_string(self.path().join(path)).unwrap()
    }
}
