use super::common::RegistryArgs;

#[derive(Debug, clap::Parser)]
pub(crate) struct Config {
    #[clap(flatten)]
    registry: RegistryArgs,
}

/// Print the system catalog as JSON, in the format accepted by `--registry`
pub(crate) fn command(config: Config) -> anyhow::Result<()> {
    let registry = config.registry.load()?;
    println!("{}", registry.to_json_string_pretty()?);
    Ok(())
}
