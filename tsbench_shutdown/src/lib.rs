//! Manage cancellation of benchmark runs
//!
//! A benchmark run spends nearly all of its time waiting on external processes: generators,
//! compressors, loaders and query runners. When the operator interrupts the run, those processes
//! have to be torn down and any half-written artifacts removed before the harness exits.
//!
//! # Coordinate shutdown with the [`ShutdownManager`] type
//!
//! Components [`register`][ShutdownManager::register] to receive a [`ShutdownToken`]. A token is
//! raced against every blocking wait via [`wait_for_shutdown`][ShutdownToken::wait_for_shutdown];
//! once the component has killed its processes and cleaned up it signals back via
//! [`complete`][ShutdownToken::complete]. [`join`][ShutdownManager::join] resolves when every
//! registered token has completed or been dropped, and every blocking task started through
//! [`spawn_blocking`][ShutdownToken::spawn_blocking] has finished.
use std::sync::Arc;

use observability_deps::tracing::info;
use parking_lot::Mutex;
use tokio::{sync::oneshot, task::JoinHandle};
use tokio_util::{sync::CancellationToken, task::TaskTracker};

/// Wait for a `SIGTERM`, `SIGINT` or `SIGQUIT` on UNIX systems
#[cfg(unix)]
pub async fn wait_for_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate()).expect("failed to register signal handler");
    let mut int = signal(SignalKind::interrupt()).expect("failed to register signal handler");
    let mut quit = signal(SignalKind::quit()).expect("failed to register signal handler");

    tokio::select! {
        _ = term.recv() => info!("Received SIGTERM"),
        _ = int.recv() => info!("Received SIGINT"),
        _ = quit.recv() => info!("Received SIGQUIT"),
    }
}

/// Wait for a `ctrl+c` on Windows systems
#[cfg(windows)]
pub async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("Received SIGINT");
}

/// Manage cancellation of a benchmark run
#[derive(Debug)]
pub struct ShutdownManager {
    shutdown: CancellationToken,
    tasks: TaskTracker,
}

impl ShutdownManager {
    /// Create a [`ShutdownManager`]
    pub fn new() -> Self {
        Self {
            shutdown: CancellationToken::new(),
            tasks: TaskTracker::new(),
        }
    }

    /// Register a component that needs to clean up before the process may exit
    ///
    /// The caller must invoke [`complete`][ShutdownToken::complete], or drop every clone of the
    /// token, for [`join`][Self::join] to resolve.
    pub fn register(&self) -> ShutdownToken {
        let (tx, rx) = oneshot::channel();
        self.tasks.spawn(rx);
        ShutdownToken::new(self.shutdown.clone(), self.tasks.clone(), tx)
    }

    /// Cancel the run
    ///
    /// Wakes every [`wait_for_shutdown`][ShutdownToken::wait_for_shutdown] future so registered
    /// components can kill their processes.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Spawn a task that cancels the run when the process receives a termination signal
    pub fn shutdown_on_signal(&self) {
        let token = self.shutdown.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = wait_for_signal() => token.cancel(),
                _ = token.cancelled() => (),
            }
        });
    }

    /// Waits for registered components to complete their cleanup and their blocking tasks to end
    pub async fn join(&self) {
        self.tasks.close();
        self.tasks.wait().await;
    }
}

impl Default for ShutdownManager {
    fn default() -> Self {
        Self::new()
    }
}

/// A token that a component can obtain via [`register`][ShutdownManager::register]
///
/// This implements [`Clone`] so that a component can hand copies to the pipelines it drives.
#[derive(Debug, Clone)]
pub struct ShutdownToken {
    token: CancellationToken,
    tasks: TaskTracker,
    complete_tx: Arc<Mutex<Option<oneshot::Sender<()>>>>,
}

impl ShutdownToken {
    fn new(
        token: CancellationToken,
        tasks: TaskTracker,
        complete_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            token,
            tasks,
            complete_tx: Arc::new(Mutex::new(Some(complete_tx))),
        }
    }

    /// Run `f` on the blocking pool; [`join`][ShutdownManager::join] waits for it even when the
    /// returned handle is dropped
    pub fn spawn_blocking<F, T>(&self, f: F) -> JoinHandle<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        self.tasks.spawn_blocking(f)
    }

    /// Future that completes when the [`ShutdownManager`] that issued this token is shutdown
    pub async fn wait_for_shutdown(&self) {
        self.token.cancelled().await;
    }

    /// Signal back to the [`ShutdownManager`] that the component that owns this token is finished
    /// cleaning up and it is safe for the process to exit
    pub fn complete(&self) {
        if let Some(s) = self.complete_tx.lock().take() {
            let _ = s.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicBool, Ordering},
        time::Duration,
    };

    use futures::FutureExt;

    use crate::ShutdownManager;

    #[tokio::test]
    async fn join_waits_for_cleanup() {
        let shutdown_manager = ShutdownManager::new();

        static CLEAN: AtomicBool = AtomicBool::new(false);

        let token = shutdown_manager.register();
        tokio::spawn(async move {
            loop {
                futures::select! {
                    _ = token.wait_for_shutdown().fuse() => {
                        CLEAN.store(true, Ordering::SeqCst);
                        token.complete();
                        break;
                    }
                    _ = tokio::time::sleep(Duration::from_millis(10)).fuse() => {
                        // child processes still running
                    }
                }
            }
        });

        shutdown_manager.shutdown();
        shutdown_manager.join().await;
        assert!(CLEAN.load(Ordering::SeqCst), "cleanup did not complete");
    }

    #[tokio::test]
    async fn join_waits_for_detached_blocking_tasks() {
        let shutdown_manager = ShutdownManager::new();

        static DRAINED: AtomicBool = AtomicBool::new(false);

        let token = shutdown_manager.register();
        let handle = token.spawn_blocking(|| {
            std::thread::sleep(Duration::from_millis(100));
            DRAINED.store(true, Ordering::SeqCst);
        });
        drop(handle);
        token.complete();

        shutdown_manager.shutdown();
        shutdown_manager.join().await;
        assert!(DRAINED.load(Ordering::SeqCst), "blocking task was not awaited");
    }

    #[tokio::test]
    async fn every_token_observes_shutdown() {
        let shutdown_manager = ShutdownManager::new();
        let a = shutdown_manager.register();
        let b = shutdown_manager.register();

        shutdown_manager.shutdown();
        a.wait_for_shutdown().await;
        b.wait_for_shutdown().await;

        drop(a);
        b.complete();
        shutdown_manager.join().await;
    }
}
