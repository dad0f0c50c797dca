//! Entrypoint of the tsbench binary

use dotenvy::dotenv;
use trogging::{
    TroggingGuard,
    cli::LoggingConfigBuilderExt,
    tracing_subscriber::{Registry, prelude::*},
};

mod commands {
    pub(crate) mod common;
    pub(crate) mod load;
    pub(crate) mod run_queries;
    pub(crate) mod systems;
    pub(crate) mod test;
}

enum ReturnCode {
    Failure = 1,
}

#[derive(Debug, clap::Parser)]
#[clap(
    name = "tsbench",
    version,
    about = "Benchmark and cross-validate time series databases with the TSBS tools",
    long_about = r#"Benchmark and cross-validate time series databases with the TSBS tools

Examples:
    # Generate the dataset for kudu if needed and load it
    tsbench load kudu

    # Run every single-groupby workload against influx with 8 workers
    tsbench run-queries --workloads 'single-groupby-*' --workers 8 influx

    # Check that kudu returns the same results as influx
    tsbench test --reference influx --candidate kudu

    # Print the built-in systems, a starting point for --registry
    tsbench systems

    # Full debug logging
    LOG_FILTER=debug tsbench load kudu
"#
)]
struct Config {
    /// logging options
    #[clap(flatten)]
    logging_config: trogging::cli::LoggingConfig,

    #[clap(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, clap::Parser)]
enum Command {
    /// Generate the dataset for a system if needed, then load it
    Load(commands::load::Config),

    /// Benchmark query workloads against a loaded system
    #[clap(name = "run-queries")]
    RunQueries(commands::run_queries::Config),

    /// Compare the query responses of two loaded systems
    Test(commands::test::Config),

    /// Print the system catalog as JSON
    Systems(commands::systems::Config),
}

fn main() -> Result<(), std::io::Error> {
    // load all environment variables from .env before doing anything
    load_dotenv();

    let config: Config = clap::Parser::parse();

    let tokio_runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    tokio_runtime.block_on(async move {
        fn handle_init_logs(r: Result<TroggingGuard, trogging::Error>) -> TroggingGuard {
            match r {
                Ok(guard) => guard,
                Err(e) => {
                    eprintln!("Initializing logs failed: {e}");
                    std::process::exit(ReturnCode::Failure as _);
                }
            }
        }

        let Some(command) = config.command else {
            println!("command required, -h/--help for help");
            return;
        };
        let _tracing_guard = handle_init_logs(init_logs_and_tracing(&config.logging_config));

        match command {
            Command::Load(config) => {
                if let Err(e) = commands::load::command(config).await {
                    eprintln!("Load command failed: {e:#}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
            Command::RunQueries(config) => {
                if let Err(e) = commands::run_queries::command(config).await {
                    eprintln!("Run queries command failed: {e:#}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
            Command::Test(config) => {
                if let Err(e) = commands::test::command(config).await {
                    eprintln!("Test command failed: {e:#}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
            Command::Systems(config) => {
                if let Err(e) = commands::systems::command(config) {
                    eprintln!("Systems command failed: {e:#}");
                    std::process::exit(ReturnCode::Failure as _)
                }
            }
        }
    });

    Ok(())
}

/// Source the .env file before initialising the Config struct - this sets
/// any envs in the file, which the Config struct then uses.
///
/// Precedence is given to existing env variables.
fn load_dotenv() {
    match dotenv() {
        Ok(_) => {}
        Err(dotenvy::Error::Io(err)) if err.kind() == std::io::ErrorKind::NotFound => {
            // a missing env file is not an error, defaults apply
        }
        Err(e) => {
            eprintln!("FATAL Error loading config from: {e}");
            eprintln!("Aborting");
            std::process::exit(ReturnCode::Failure as _);
        }
    };
}

fn init_logs_and_tracing(
    config: &trogging::cli::LoggingConfig,
) -> Result<TroggingGuard, trogging::Error> {
    let log_layer = trogging::Builder::new()
        .with_default_log_filter("info")
        .with_logging_config(config)
        .build()?;

    let subscriber = Registry::default().with(log_layer);
    trogging::install_global(subscriber)
}

#[cfg(test)]
mod tests {
    use clap::{CommandFactory, Parser};

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Config::command().debug_assert();
    }

    #[test]
    fn parse_run_queries() {
        let config = Config::try_parse_from([
            "tsbench",
            "run-queries",
            "--workloads",
            "cpu-max-*",
            "--workers",
            "8",
            "--bin-dir",
            "/opt/tsbs/bin",
            "kudu",
        ])
        .unwrap();
        let Some(Command::RunQueries(run)) = config.command else {
            panic!("expected run-queries");
        };
        let rendered = format!("{run:?}");
        assert!(rendered.contains("workloads: \"cpu-max-*\""), "{rendered}");
        assert!(rendered.contains("system: \"kudu\""), "{rendered}");
    }

    #[test]
    fn workers_must_be_positive() {
        let parsed = Config::try_parse_from(["tsbench", "run-queries", "--workers", "0", "influx"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn load_requires_a_system() {
        assert!(Config::try_parse_from(["tsbench", "load"]).is_err());
        assert!(Config::try_parse_from(["tsbench", "load", "--quiet", "influx"]).is_ok());
    }
}
