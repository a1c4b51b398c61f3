use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use cli::SshpipeCli;
use config::{SshpipeConfig, TunnelConfig};
use error::TunnelError;
use shutdown::ShutdownController;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use tunneling::{acceptor::LocalAcceptor, session::SshSession, tunnel_runner::TunnelRunner};

mod cli;
mod config;
mod endpoint;
mod error;
mod shutdown;
mod tunneling;

#[tokio::main]
pub async fn main() -> ExitCode {
    let cli = SshpipeCli::parse();
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: SshpipeCli) -> Result<(), TunnelError> {
    let file = match &cli.config {
        Some(path) => config::load_config_file(path)?,
        None => SshpipeConfig::default(),
    };
    let config = TunnelConfig::resolve(&cli, file)?;

    // [localhost:<local_port>] <-> [<user>@<host>:<port>] <-> [<remote_host>:<remote_port>]
    let session = Arc::new(SshSession::connect(&config).await?);

    let shutdown = Arc::new(ShutdownController::new());
    let acceptor = LocalAcceptor::bind(config.local_port, shutdown.token()).await?;
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move { shutdown.listen().await });
    }

    let target = config.remote_target();
    info!(
        "Forwarding {} -> {} via {}",
        acceptor.local_addr(),
        target,
        config.endpoint
    );

    let runner = TunnelRunner::new(acceptor, session.clone(), target, config.accept_policy);
    let result = runner.run().await;
    if shutdown.is_stopping() {
        info!("Exiting");
    }
    session.disconnect().await;
    result
}
