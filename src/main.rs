#![warn(clippy::all, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

use anyhow::Result;
use clap::Parser;
use cogito::Config;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

mod cli;

use cli::commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    // Pick ring explicitly; rustls cannot choose a process-level provider
    // on its own when more than one backend is compiled in.
    if let Err(e) = rustls::crypto::ring::default_provider().install_default() {
        eprintln!("Warning: Failed to install default crypto provider: {e:?}");
    }

    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let config = Config::load_or_init()?;
    cli::dispatch::dispatch(cli, config).await
}
