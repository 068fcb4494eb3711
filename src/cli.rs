use crate::extension_control::config::{ConfigError, ExtensionControlConfig};
use crate::instrumentation::LoggingError;
use clap::Parser;
use std::path::PathBuf;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("could not read the extension control config: `{0}`")]
    ConfigRead(#[from] ConfigError),
    #[error("could not initialize logging: `{0}`")]
    LoggingInit(#[from] LoggingError),
}

/// What action was requested from the CLI?
pub enum CliCommand {
    /// Normal operation requested. Run the service with the loaded config.
    Run(ExtensionControlConfig),
    /// Print the version and exit successfully.
    PrintVersion,
}

#[derive(Parser, Debug)]
#[command(author, about, long_about = None)] // Read from `Cargo.toml`
pub struct Cli {
    /// Path to the YAML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(long)]
    version: bool,
}

impl Cli {
    /// Parses command line arguments and decides how the application runs
    pub fn init() -> Result<CliCommand, CliError> {
        // Get command line args
        let cli = Self::parse();

        // If the version flag is set, print the version and exit
        if cli.version {
            return Ok(CliCommand::PrintVersion);
        }

        let config = ExtensionControlConfig::load(cli.config.as_deref())?;
        config.log.clone().try_init()?;
        info!(
            "starting extension control {} listening on {}:{}",
            env!("CARGO_PKG_VERSION"),
            config.server.host,
            config.server.port,
        );

        Ok(CliCommand::Run(config))
    }
}
