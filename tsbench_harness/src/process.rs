//! Plumbing shared by the pipelines: spawning, supervising and draining external processes.

use std::{
    fs::File,
    io::{self, Read, Write},
    process::{ExitStatus, Stdio},
    time::Duration,
};

use observability_deps::tracing::{debug, warn};
use tokio::{
    process::{Child, Command},
    task::JoinHandle,
    time::Instant,
};
use tsbench_shutdown::ShutdownToken;

use crate::{Error, Result};

/// Cancellation and deadline policy applied to every process a pipeline waits on
///
/// On cancellation or timeout the whole process group of the child is killed, so grandchildren
/// forked by wrapper scripts do not outlive the run.
#[derive(Debug, Clone)]
pub struct Supervisor {
    shutdown: ShutdownToken,
    timeout: Option<Duration>,
}

impl Supervisor {
    pub fn new(shutdown: ShutdownToken) -> Self {
        Self {
            shutdown,
            timeout: None,
        }
    }

    /// Limit the wall-clock time of a single pipeline run
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Run `f` on the blocking pool, tracked so shutdown waits for it to finish
    pub(crate) fn spawn_blocking<F, T>(&self, f: F) -> JoinHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.shutdown.spawn_blocking(f)
    }

    /// Start supervising one pipeline run; its processes share a single deadline
    pub(crate) fn watch(&self) -> Watch<'_> {
        Watch {
            supervisor: self,
            deadline: self.timeout.map(|t| Instant::now() + t),
        }
    }
}

#[derive(Debug)]
pub(crate) struct Watch<'a> {
    supervisor: &'a Supervisor,
    deadline: Option<Instant>,
}

impl Watch<'_> {
    /// Wait for `process` to exit, killing it if the run is cancelled or the deadline passes
    pub(crate) async fn wait(&self, process: &mut Process) -> Result<ExitStatus> {
        let deadline = async {
            match self.deadline {
                Some(deadline) => tokio::time::sleep_until(deadline).await,
                None => std::future::pending().await,
            }
        };

        tokio::select! {
            status = process.child.wait() => {
                let status = status.map_err(|source| Error::Wait {
                    program: process.program.clone(),
                    source,
                })?;
                debug!(program = %process.program, %status, "process exited");
                Ok(status)
            }
            _ = self.supervisor.shutdown.wait_for_shutdown() => {
                process.kill().await;
                Err(Error::Cancelled {
                    program: process.program.clone(),
                })
            }
            _ = deadline => {
                process.kill().await;
                Err(Error::TimedOut {
                    program: process.program.clone(),
                    timeout: self.supervisor.timeout.unwrap_or_default(),
                })
            }
        }
    }
}

/// A spawned external process, leading its own process group
#[derive(Debug)]
pub(crate) struct Process {
    program: String,
    child: Child,
}

impl Process {
    pub(crate) fn spawn(command: &mut Command) -> Result<Self> {
        let program = command
            .as_std()
            .get_program()
            .to_string_lossy()
            .into_owned();
        #[cfg(unix)]
        command.process_group(0);
        command.kill_on_drop(true);

        debug!(?command, "spawning process");
        let child = command.spawn().map_err(|source| Error::Spawn {
            program: program.clone(),
            source,
        })?;
        Ok(Self { program, child })
    }

    pub(crate) fn program(&self) -> &str {
        &self.program
    }

    /// Hand the write end of this process's stdin to another process
    pub(crate) fn take_stdin(&mut self) -> Result<Stdio> {
        let stdin = self.child.stdin.take().ok_or_else(|| self.missing_pipe())?;
        TryInto::<Stdio>::try_into(stdin).map_err(|source| Error::Pipe {
            program: self.program.clone(),
            source,
        })
    }

    /// Hand the read end of this process's stdout to another process
    pub(crate) fn take_stdout(&mut self) -> Result<Stdio> {
        let stdout = self.child.stdout.take().ok_or_else(|| self.missing_pipe())?;
        TryInto::<Stdio>::try_into(stdout).map_err(|source| Error::Pipe {
            program: self.program.clone(),
            source,
        })
    }

    fn missing_pipe(&self) -> Error {
        Error::Pipe {
            program: self.program.clone(),
            source: io::Error::other("standard stream was not piped"),
        }
    }

    /// The exit status, if the process has already exited
    pub(crate) fn try_wait(&mut self) -> Option<ExitStatus> {
        self.child.try_wait().ok().flatten()
    }

    /// Kill the process group and reap the child
    pub(crate) async fn kill(&mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.child.id() {
            // SAFETY: the child was spawned with `process_group(0)`, so its pid is the pgid
            unsafe {
                libc::killpg(pid as libc::pid_t, libc::SIGKILL);
            }
        }
        if let Err(e) = self.child.kill().await {
            debug!(program = %self.program, %e, "failed to kill process");
        }
    }
}

/// Create one pipe for both stdout and stderr of a child, preserving their interleaving
///
/// Returns the read end along with the two `Stdio` handles for the child.
pub(crate) fn combined_output(program: &str) -> Result<(io::PipeReader, Stdio, Stdio)> {
    let pipe_err = |source| Error::Pipe {
        program: program.to_owned(),
        source,
    };
    let (reader, stdout) = io::pipe().map_err(pipe_err)?;
    let stderr = stdout.try_clone().map_err(pipe_err)?;
    Ok((reader, Stdio::from(stdout), Stdio::from(stderr)))
}

/// Copies everything read from a pipe to a set of sinks
///
/// Runs on the blocking pool. The pipe keeps being drained whatever happens to the sinks, so the
/// writing process never stalls on a full pipe buffer. A failing log fails the drain once the
/// pipe is closed; a failing echo is only reported and the log keeps receiving data.
#[derive(Debug, Default)]
pub(crate) struct Fanout {
    log: Option<File>,
    echo: bool,
    capture: bool,
}

impl Fanout {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_log(mut self, log: File) -> Self {
        self.log = Some(log);
        self
    }

    pub(crate) fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    pub(crate) fn with_capture(mut self) -> Self {
        self.capture = true;
        self
    }

    /// Drain `reader` until every writer has closed; resolves to the captured bytes
    ///
    /// A pipeline that bails out early may drop the handle: the drain still runs to the end of the
    /// pipe and shutdown waits for it.
    pub(crate) fn spawn<R>(
        self,
        reader: R,
        supervisor: &Supervisor,
    ) -> JoinHandle<io::Result<Vec<u8>>>
    where
        R: Read + Send + 'static,
    {
        supervisor.spawn_blocking(move || self.drain(reader, io::stdout()))
    }

    fn drain(self, mut reader: impl Read, mut stdout: impl Write) -> io::Result<Vec<u8>> {
        let Self {
            mut log,
            mut echo,
            capture,
        } = self;
        let mut captured = Vec::new();
        let mut log_error = None;
        let mut buf = [0u8; 8192];

        loop {
            let n = match reader.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            let chunk = &buf[..n];
            if capture {
                captured.extend_from_slice(chunk);
            }
            if let Some(Err(e)) = log.as_mut().map(|log| log.write_all(chunk)) {
                log = None;
                log_error = Some(e);
            }
            if echo {
                if let Err(e) = stdout.write_all(chunk).and_then(|()| stdout.flush()) {
                    warn!(%e, "echoing process output failed, output goes to the log only");
                    echo = false;
                }
            }
        }

        if let Some(e) = log_error {
            return Err(e);
        }
        if let Some(log) = log.as_mut() {
            log.flush()?;
        }
        Ok(captured)
    }
}

/// Await a [`Fanout`] task spawned for `program`
pub(crate) async fn join_fanout(
    handle: JoinHandle<io::Result<Vec<u8>>>,
    program: &str,
) -> Result<Vec<u8>> {
    handle
        .await
        .map_err(io::Error::other)
        .and_then(|drained| drained)
        .map_err(|source| Error::Drain {
            program: program.to_owned(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    #[test]
    fn fanout_captures_and_logs() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("out.txt");
        let log = File::create(&log_path).unwrap();

        let captured = Fanout::new()
            .with_log(log)
            .with_capture()
            .drain(Cursor::new(b"progress 1\nprogress 2\n".to_vec()), io::sink())
            .unwrap();

        assert_eq!(captured, b"progress 1\nprogress 2\n");
        assert_eq!(
            std::fs::read_to_string(&log_path).unwrap(),
            "progress 1\nprogress 2\n"
        );
    }

    #[test]
    fn fanout_without_capture_returns_nothing() {
        let captured = Fanout::new()
            .drain(Cursor::new(b"ignored".to_vec()), io::sink())
            .unwrap();
        assert!(captured.is_empty());
    }

    #[test]
    fn fanout_echoes_output() {
        let mut echoed = Vec::new();
        Fanout::new()
            .with_echo(true)
            .drain(Cursor::new(b"batch 1\n".to_vec()), &mut echoed)
            .unwrap();
        assert_eq!(echoed, b"batch 1\n");
    }

    /// Stands in for a stdout whose reader went away
    struct ClosedStdout;

    impl Write for ClosedStdout {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::ErrorKind::BrokenPipe.into())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn closed_echo_keeps_logging() {
        let dir = tempfile::tempdir().unwrap();
        let log_path = dir.path().join("load.txt");
        let log = File::create(&log_path).unwrap();

        let captured = Fanout::new()
            .with_log(log)
            .with_echo(true)
            .with_capture()
            .drain(Cursor::new(b"batch 1\nbatch 2\n".to_vec()), ClosedStdout)
            .unwrap();

        assert_eq!(captured, b"batch 1\nbatch 2\n");
        assert_eq!(
            std::fs::read_to_string(&log_path).unwrap(),
            "batch 1\nbatch 2\n"
        );
    }
}
