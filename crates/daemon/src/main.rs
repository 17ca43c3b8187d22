/// anonshare - publish a directory, file or zip archive as an onion service
///
/// Prints the published address on stdout and serves until interrupted or
/// until the Tor daemon goes away. Logs go to stderr.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, Level};

use anonshare_common::{transport, PublicationConfig, PublishError, ResultReport};
use anonshare_daemon::{Publisher, TorConnector};

#[derive(Debug, Parser)]
#[command(name = "anonshare", version, about)]
struct Cli {
    /// File, directory or zip archive to publish
    path: PathBuf,

    /// Publish the contents of a zip archive
    #[arg(long)]
    zip: bool,

    /// Do not gate the service behind a capability slug
    #[arg(long)]
    no_slug: bool,

    /// Tor control endpoint (tcp://host:port, host:port or unix:///path)
    #[arg(long, env = "ANONSHARE_CONTROL")]
    control: Option<String>,

    /// Tor control port password
    #[arg(long, env = "ANONSHARE_CONTROL_PASSWORD", hide_env_values = true)]
    control_password: Option<String>,

    /// Derive a stable service address from this passphrase
    #[arg(long, env = "ANONSHARE_PASSPHRASE", hide_env_values = true)]
    passphrase: Option<String>,

    /// Verbose logging, including requests
    #[arg(long)]
    debug: bool,

    /// Load settings from a TOML file; flags override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn into_config(self) -> Result<(PublicationConfig, bool)> {
        let mut config = match &self.config {
            Some(file) => PublicationConfig::from_file(file)
                .with_context(|| format!("Failed to load {}", file.display()))?,
            None => PublicationConfig::default(),
        };

        config.path = self.path;
        config.archive |= self.zip;
        config.slug &= !self.no_slug;
        config.debug |= self.debug;
        if let Some(endpoint) = self.control {
            config.control_endpoint = endpoint;
        }
        if config.control_endpoint.is_empty() {
            config.control_endpoint = transport::DEFAULT_CONTROL_ENDPOINT.to_string();
        }
        if let Some(password) = self.control_password {
            config.control_password = password;
        }
        if let Some(passphrase) = self.passphrase {
            config.passphrase = Some(passphrase);
        }

        Ok((config, self.json))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let (config, json) = Cli::parse().into_config()?;

    tracing_subscriber::fmt()
        .with_max_level(if config.debug { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .init();

    info!("Starting anonshare v{}", env!("CARGO_PKG_VERSION"));

    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            signal.cancel();
        }
    });

    let mut handle = Publisher::new(config, TorConnector).spawn(shutdown);
    let result = handle.result().await;

    if json {
        println!("{}", serde_json::to_string(&ResultReport::from(&result))?);
    }
    match &result {
        Ok(url) if !json => println!("{}", url),
        Ok(_) => {}
        Err(PublishError::Cancelled) => {
            info!("Cancelled before the service was published");
            return Ok(());
        }
        Err(err) => {
            if !json {
                error!("{}", err);
            }
            std::process::exit(1);
        }
    }

    info!("Serving. Press Ctrl+C to stop.");
    if let Err(err) = handle.wait().await {
        error!("Fatal: {}", err);
        std::process::exit(1);
    }

    Ok(())
}
