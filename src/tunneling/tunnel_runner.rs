use std::sync::Arc;

use tokio_util::task::TaskTracker;
use tracing::{debug, error, warn};

use crate::error::TunnelError;

use super::{
    acceptor::{AcceptErrorPolicy, AcceptOutcome, LocalAcceptor},
    session::{Dialer, RemoteTarget},
    tunnel::Tunnel,
};

/// Accept loop: one tunnel task per local connection.
pub(crate) struct TunnelRunner {
    acceptor: LocalAcceptor,
    dialer: Arc<dyn Dialer>,
    target: RemoteTarget,
    accept_policy: AcceptErrorPolicy,
    tunnels: TaskTracker,
}

impl TunnelRunner {
    pub fn new(
        acceptor: LocalAcceptor,
        dialer: Arc<dyn Dialer>,
        target: RemoteTarget,
        accept_policy: AcceptErrorPolicy,
    ) -> Self {
        TunnelRunner {
            acceptor,
            dialer,
            target,
            accept_policy,
            tunnels: TaskTracker::new(),
        }
    }

    /// Tracks every tunnel task spawned by this runner, including the ones
    /// still running after `run` returned.
    #[cfg(test)]
    pub fn tracker(&self) -> TaskTracker {
        self.tunnels.clone()
    }

    /// Runs until the listener is closed. Active tunnels are left running.
    pub async fn run(mut self) -> Result<(), TunnelError> {
        let result = loop {
            match self.acceptor.accept().await {
                Ok(AcceptOutcome::Accepted(local, peer)) => {
                    debug!("New local connection from {}", peer);
                    let dialer = self.dialer.clone();
                    let target = self.target.clone();
                    self.tunnels.spawn(async move {
                        match Tunnel::establish(&*dialer, local, peer, &target).await {
                            Ok(tunnel) => {
                                tunnel.run().await;
                            }
                            Err(e) => {
                                error!("On conn to remote address ({}) via tunnel: {}", target, e)
                            }
                        }
                    });
                }
                Ok(AcceptOutcome::Closed) => break Ok(()),
                Err(e) => match self.accept_policy {
                    AcceptErrorPolicy::Fatal => break Err(e),
                    AcceptErrorPolicy::LogAndContinue => warn!("On accept: {}", e),
                },
            }
        };
        self.acceptor.close();
        self.tunnels.close();
        result
    }
}
