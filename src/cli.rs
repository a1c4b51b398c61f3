use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(version, about = "Sshpipe forwards a local TCP port to a port reachable only through an SSH server", long_about = None)]
pub(crate) struct SshpipeCli {
    /// the ssh endpoint with the format user@host:port. If port is omitted it defaults to 22
    #[arg(short, long)]
    pub ssh: Option<String>,
    /// private key file, defaults to ~/.ssh/id_ed25519
    #[arg(short, long = "identity_file")]
    pub identity_file: Option<PathBuf>,
    /// local port. Defaults to 0 ie random port is picked
    #[arg(short, long = "local_port")]
    pub local_port: Option<u16>,
    /// remote port
    #[arg(short, long = "remote_port")]
    pub remote_port: Option<u16>,
    /// host the ssh server connects each tunnel to
    #[arg(long = "remote_host")]
    pub remote_host: Option<String>,
    /// log accept errors and keep listening instead of exiting
    #[arg(long = "retry_accept_errors")]
    pub retry_accept_errors: bool,
    /// custom config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// debug logging
    #[arg(short, long)]
    pub verbose: bool,
}
