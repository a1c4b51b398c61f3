use crate::error::TunnelError;

use russh::client::Handler;
use tracing::warn;

pub(crate) struct ClientHandler {
    /// `host:port` of the ssh server, for log lines only
    server_address: String,
}
impl ClientHandler {
    pub fn new(server_address: &str) -> Self {
        ClientHandler {
            server_address: server_address.to_string(),
        }
    }
}
impl Handler for ClientHandler {
    type Error = TunnelError;

    /// Host keys are neither verified nor remembered.
    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        warn!(
            "host key for {} is not verified: {}",
            self.server_address,
            server_public_key.fingerprint(Default::default())
        );
        Ok(true)
    }
}
