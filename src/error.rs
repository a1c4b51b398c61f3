use thiserror::Error;

#[derive(Error, Debug)]
pub enum TunnelError {
    #[error("invalid format: {0}")]
    Format(String),
    #[error("config error: {0}")]
    Config(String),
    #[error("private key error: {1}")]
    Credential(russh::keys::Error, String),
    #[error("env variable for private key error: {0}")]
    EnvError(String),
    #[error("cannot reach {address}: {message}")]
    TransportDial { address: String, message: String },
    #[error("cannot bind local port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },
    #[error("accept failed: {1}")]
    Accept(std::io::Error, String),
    #[error("relay failed: {1}")]
    RelayIo(std::io::Error, String),
    #[error("ssh error: {1}")]
    Ssh(russh::Error, String),
}

impl TunnelError {
    pub fn dial(address: impl Into<String>, message: impl ToString) -> Self {
        Self::TransportDial {
            address: address.into(),
            message: message.to_string(),
        }
    }
}

impl From<russh::keys::Error> for TunnelError {
    fn from(value: russh::keys::Error) -> Self {
        let str_val = value.to_string();
        Self::Credential(value, str_val)
    }
}
impl From<russh::Error> for TunnelError {
    fn from(value: russh::Error) -> Self {
        let str_val = value.to_string();
        Self::Ssh(value, str_val)
    }
}
impl From<toml::de::Error> for TunnelError {
    fn from(value: toml::de::Error) -> Self {
        Self::Config(value.to_string())
    }
}
