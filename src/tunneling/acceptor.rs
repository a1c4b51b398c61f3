use std::net::SocketAddr;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::TunnelError;

/// What the accept loop does with an accept error that is not a deliberate close.
#[derive(Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum AcceptErrorPolicy {
    #[default]
    #[serde(alias = "fatal", alias = "FATAL")]
    Fatal,
    #[serde(alias = "retry", alias = "log_and_continue")]
    LogAndContinue,
}

pub(crate) enum AcceptOutcome {
    Accepted(TcpStream, SocketAddr),
    /// the listener was closed on purpose, no more connections will come
    Closed,
}

/// Anything that hands out local connections, a bound `TcpListener` in practice.
#[async_trait]
pub(crate) trait AcceptSource: Send + Sync {
    async fn accept(&self) -> std::io::Result<(TcpStream, SocketAddr)>;
    fn local_addr(&self) -> std::io::Result<SocketAddr>;
}

#[async_trait]
impl AcceptSource for TcpListener {
    async fn accept(&self) -> std::io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }
    fn local_addr(&self) -> std::io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

pub(crate) struct LocalAcceptor {
    listener: Option<Box<dyn AcceptSource>>,
    local_addr: SocketAddr,
    shutdown: CancellationToken,
}

impl LocalAcceptor {
    /// Binds `localhost:<port>`, port 0 lets the OS pick one.
    pub async fn bind(port: u16, shutdown: CancellationToken) -> Result<Self, TunnelError> {
        let listener = TcpListener::bind(("localhost", port))
            .await
            .map_err(|source| TunnelError::Bind { port, source })?;
        let acceptor = Self::from_source(Box::new(listener), shutdown)
            .map_err(|source| TunnelError::Bind { port, source })?;
        info!("Listening for local connections at: {}", acceptor.local_addr);
        Ok(acceptor)
    }

    pub fn from_source(
        listener: Box<dyn AcceptSource>,
        shutdown: CancellationToken,
    ) -> std::io::Result<Self> {
        Ok(LocalAcceptor {
            local_addr: listener.local_addr()?,
            listener: Some(listener),
            shutdown,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Waits for the next client. Shutdown wins over a pending connection.
    pub async fn accept(&mut self) -> Result<AcceptOutcome, TunnelError> {
        let Some(listener) = &self.listener else {
            return Ok(AcceptOutcome::Closed);
        };
        let accepted = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => None,
            res = listener.accept() => Some(res),
        };
        match accepted {
            None => {
                self.close();
                Ok(AcceptOutcome::Closed)
            }
            Some(Ok((stream, peer))) => Ok(AcceptOutcome::Accepted(stream, peer)),
            Some(Err(e)) => {
                let str = e.to_string();
                Err(TunnelError::Accept(e, str))
            }
        }
    }

    /// Drops the listener so new connection attempts are refused. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.listener.take().is_some() {
            info!("Closed listener at {}", self.local_addr);
        }
    }
}
