use extension_control::cli::{Cli, CliCommand};
use extension_control::extension_control::run::ExtensionControlRunner;
use std::process::exit;
use tracing::error;

fn main() {
    let command = Cli::init().unwrap_or_else(|cli_error| {
        println!("Error parsing CLI arguments: {cli_error}");
        exit(1);
    });

    let config = match command {
        CliCommand::Run(config) => config,
        CliCommand::PrintVersion => {
            println!("extension-control {}", env!("CARGO_PKG_VERSION"));
            return;
        }
    };

    if let Err(err) = ExtensionControlRunner::new(config).run() {
        error!("the extension control process exited with an error: {err}");
        exit(1);
    }
}
