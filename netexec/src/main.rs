//! `netexec <PORT>`: serve command execution requests on a TCP port.

use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use netexec::exit_codes;
use netexec::io::config::{ServerConfig, load_config};
use netexec::logging;
use netexec::server::Server;

#[derive(Parser)]
#[command(
    name = "netexec",
    version,
    about = "Run commands received over TCP and reply with their output"
)]
struct Cli {
    /// TCP port to listen on (all interfaces).
    port: u16,

    /// TOML file with server settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Child process timeout in milliseconds (overrides the config file).
    #[arg(long)]
    timeout_ms: Option<u64>,
}

fn main() {
    let cli = Cli::parse();
    logging::init();
    if let Err(err) = run(cli) {
        eprintln!("{:#}", err);
        std::process::exit(exit_codes::STARTUP_FAILURE);
    }
}

fn run(cli: Cli) -> Result<()> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => ServerConfig::default(),
    };
    if let Some(timeout_ms) = cli.timeout_ms {
        config.timeout_ms = timeout_ms;
    }

    let server = Server::bind(cli.port, &config)?;
    server.run()
}
