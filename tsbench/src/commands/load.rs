use anyhow::Context;

use super::common::{HarnessArgs, supervised};

#[derive(Debug, clap::Parser)]
pub(crate) struct Config {
    #[clap(flatten)]
    harness: HarnessArgs,

    /// Do not echo loader output, only write it to the load log
    #[clap(short = 'q', long = "quiet", action)]
    quiet: bool,

    /// The system to load the dataset into
    system: String,
}

pub(crate) async fn command(config: Config) -> anyhow::Result<()> {
    let Config {
        harness,
        quiet,
        system,
    } = config;
    let registry = harness.registry.load()?;

    supervised(harness.timeout(), |supervisor| async move {
        let coordinator = harness.coordinator(registry, supervisor, !quiet)?;
        let log = coordinator
            .load(&system)
            .await
            .with_context(|| format!("loading {system}"))?;
        println!("loaded {system}, log written to {}", log.display());
        Ok(())
    })
    .await
}
