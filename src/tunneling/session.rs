use std::{fmt, net::SocketAddr, path::Path, pin::Pin, sync::Arc};

use async_trait::async_trait;
use russh::{
    Disconnect,
    client::{self, Handle},
    keys::{PrivateKey, PrivateKeyWithHashAlg, load_secret_key},
};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info};

#[cfg(test)]
use mockall::automock;

use crate::{
    config::TunnelConfig, endpoint::Endpoint, error::TunnelError,
    tunneling::handler::ClientHandler,
};

/// Byte stream carried by a remote channel.
pub(crate) trait RemoteStream: AsyncRead + AsyncWrite + Send {}
impl<T: AsyncRead + AsyncWrite + Send> RemoteStream for T {}

pub(crate) type BoxedStream = Pin<Box<dyn RemoteStream>>;

/// Where the remote side should connect each channel to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RemoteTarget {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for RemoteTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// Opens logical channels over an already authenticated transport.
/// Implementations must be callable from many tunnels at once.
#[cfg_attr(test, automock)]
#[async_trait]
pub(crate) trait Dialer: Send + Sync {
    async fn open_channel(
        &self,
        target: &RemoteTarget,
        originator: SocketAddr,
    ) -> Result<BoxedStream, TunnelError>;
}

pub(crate) struct SshSession {
    endpoint: Endpoint,
    handle: Handle<ClientHandler>,
}

impl SshSession {
    /// Loads the identity, connects and authenticates. Every failure past key loading is a dial error.
    pub async fn connect(config: &TunnelConfig) -> Result<SshSession, TunnelError> {
        let passphrase = match &config.key_passphrase {
            Some(source) => Some(source.resolve()?),
            None => None,
        };
        let private_key = load_private_key(&config.key_file_path, passphrase.as_deref())?;

        let endpoint = config.endpoint.clone();
        let address = endpoint.address();

        let ssh_config = Arc::new(client::Config::default());
        let mut handle = client::connect(
            ssh_config,
            (endpoint.host.to_owned(), endpoint.port_number()?),
            ClientHandler::new(&address),
        )
        .await
        .map_err(|e| TunnelError::dial(&address, e))?;

        let hash_alg = handle
            .best_supported_rsa_hash()
            .await
            .map_err(|e| TunnelError::dial(&address, e))?
            .flatten();
        let auth_res = handle
            .authenticate_publickey(
                endpoint.username.clone(),
                PrivateKeyWithHashAlg::new(Arc::new(private_key), hash_alg),
            )
            .await
            .map_err(|e| TunnelError::dial(&address, e))?;
        if !auth_res.success() {
            return Err(TunnelError::dial(
                &address,
                format!("public key authentication rejected for {}", endpoint.username),
            ));
        }
        info!("Connected to SSH: {}", endpoint);

        Ok(SshSession { endpoint, handle })
    }

    pub async fn disconnect(&self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            debug!("disconnect from {} failed: {}", self.endpoint, e);
        }
    }
}

#[async_trait]
impl Dialer for SshSession {
    async fn open_channel(
        &self,
        target: &RemoteTarget,
        originator: SocketAddr,
    ) -> Result<BoxedStream, TunnelError> {
        let channel = self
            .handle
            .channel_open_direct_tcpip(
                target.host.clone(),
                target.port as u32, // u32 on the wire
                originator.ip().to_string(),
                originator.port() as u32,
            )
            .await
            .map_err(|e| TunnelError::dial(target.to_string(), e))?;
        Ok(Box::pin(channel.into_stream()))
    }
}

fn load_private_key(key_path: &Path, passphrase: Option<&str>) -> Result<PrivateKey, TunnelError> {
    Ok(load_secret_key(key_path, passphrase)?)
}
