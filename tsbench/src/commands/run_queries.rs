use std::num::NonZeroUsize;

use anyhow::Context;

use super::common::{HarnessArgs, supervised};

#[derive(Debug, clap::Parser)]
pub(crate) struct Config {
    #[clap(flatten)]
    harness: HarnessArgs,

    /// Glob selecting the workloads to run, e.g. `single-groupby-*`
    #[clap(long = "workloads", default_value = "*", action)]
    workloads: String,

    /// Number of concurrent query runner workers
    #[clap(long = "workers", default_value = "1", action)]
    workers: NonZeroUsize,

    /// The system to benchmark
    system: String,
}

pub(crate) async fn command(config: Config) -> anyhow::Result<()> {
    let Config {
        harness,
        workloads,
        workers,
        system,
    } = config;
    let registry = harness.registry.load()?;

    supervised(harness.timeout(), |supervisor| async move {
        let coordinator = harness.coordinator(registry, supervisor, true)?;
        let records = coordinator
            .run_queries(&system, &workloads, workers.get())
            .await
            .with_context(|| format!("running workloads '{workloads}' against {system}"))?;
        println!(
            "wrote {} benchmark records to {}",
            records.len(),
            coordinator.logs_dir().display()
        );
        Ok(())
    })
    .await
}
