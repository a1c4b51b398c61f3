use std::{env::VarError, path::Path, path::PathBuf};

use serde::{
    Deserialize,
    de::{self, Visitor},
};

use crate::{
    cli::SshpipeCli,
    endpoint::Endpoint,
    error::TunnelError,
    tunneling::{acceptor::AcceptErrorPolicy, session::RemoteTarget},
};

pub const DEFAULT_REMOTE_HOST: &str = "localhost";

/// Optional TOML file, every key can be overridden from the command line.
#[derive(Deserialize, Debug, PartialEq, Default)]
#[serde(deny_unknown_fields)]
pub(crate) struct SshpipeConfig {
    pub ssh: Option<String>,
    pub identity_file: Option<PathBuf>,
    pub identity_passphrase: Option<EnvOrValue>,
    pub local_port: Option<u16>,
    pub remote_port: Option<u16>,
    pub remote_host: Option<String>,
    pub accept_errors: Option<AcceptErrorPolicy>,
}

#[derive(Clone, PartialEq, Debug)]
pub(crate) struct EnvOrValue {
    from_env: Option<String>,
    value: Option<String>,
}

impl EnvOrValue {
    pub fn resolve(&self) -> Result<String, TunnelError> {
        match (&self.value, &self.from_env) {
            (Some(value), _) => Ok(value.clone()),
            (None, Some(env_var)) => std::env::var(env_var).map_err(|e| match e {
                VarError::NotPresent => {
                    TunnelError::EnvError(format!("{env_var} not found in the environment!"))
                }
                VarError::NotUnicode(_) => {
                    TunnelError::EnvError(format!("{env_var} is not unicode!"))
                }
            }),
            (None, None) => Err(TunnelError::EnvError(String::from(
                "neither `value` nor `from_env` set",
            ))),
        }
    }
}

/// Fully resolved settings for one forwarder run.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct TunnelConfig {
    pub endpoint: Endpoint,
    pub local_port: u16,
    pub remote_host: String,
    pub remote_port: u16,
    pub key_file_path: PathBuf,
    pub key_passphrase: Option<EnvOrValue>,
    pub accept_policy: AcceptErrorPolicy,
}

impl TunnelConfig {
    /// Command line flags win over the config file, which wins over the defaults.
    pub fn resolve(cli: &SshpipeCli, file: SshpipeConfig) -> Result<TunnelConfig, TunnelError> {
        let ssh = cli.ssh.clone().or(file.ssh).ok_or_else(|| {
            TunnelError::Format(String::from("ssh endpoint missing. Provide --ssh user@host[:port]"))
        })?;
        let endpoint = Endpoint::parse(&ssh)?.with_default_port();

        let remote_port = cli.remote_port.or(file.remote_port).unwrap_or(0);
        if remote_port == 0 {
            return Err(TunnelError::Format(String::from(
                "Remote port missing. Provide remote port",
            )));
        }

        let key_file_path = match cli.identity_file.clone().or(file.identity_file) {
            Some(path) => path,
            None => default_identity_file()?,
        };

        let accept_policy = if cli.retry_accept_errors {
            AcceptErrorPolicy::LogAndContinue
        } else {
            file.accept_errors.unwrap_or_default()
        };

        Ok(TunnelConfig {
            endpoint,
            local_port: cli.local_port.or(file.local_port).unwrap_or(0),
            remote_host: cli
                .remote_host
                .clone()
                .or(file.remote_host)
                .unwrap_or_else(|| DEFAULT_REMOTE_HOST.to_string()),
            remote_port,
            key_file_path,
            key_passphrase: file.identity_passphrase,
            accept_policy,
        })
    }

    pub fn remote_target(&self) -> RemoteTarget {
        RemoteTarget {
            host: self.remote_host.clone(),
            port: self.remote_port,
        }
    }
}

pub fn load_config_file(path: &Path) -> Result<SshpipeConfig, TunnelError> {
    let config = std::fs::read_to_string(path)
        .map_err(|e| TunnelError::Config(format!("error while reading {path:?}: {e}")))?;
    Ok(toml::from_str(&config)?)
}

fn default_identity_file() -> Result<PathBuf, TunnelError> {
    dirs::home_dir()
        .map(|home| home.join(".ssh").join("id_ed25519"))
        .ok_or_else(|| {
            TunnelError::Config(String::from(
                "cannot determine the home directory, pass --identity_file",
            ))
        })
}

impl<'de> Deserialize<'de> for EnvOrValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct EnvOrValueVisitor;
        impl<'de> Visitor<'de> for EnvOrValueVisitor {
            type Value = EnvOrValue;
            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter
                    .write_str("a map with at least one between `from_env` or `value` set to Some")
            }
            fn visit_map<A>(self, mut map: A) -> Result<Self::Value, A::Error>
            where
                A: serde::de::MapAccess<'de>,
            {
                let mut from_env = None;
                let mut value = None;

                while let Some(key) = map.next_key::<String>()? {
                    match key.as_str() {
                        "from_env" => from_env = Some(map.next_value()?),
                        "value" => value = Some(map.next_value()?),
                        _ => return Err(de::Error::unknown_field(&key, &["from_env", "value"])),
                    }
                }

                if from_env.is_none() && value.is_none() {
                    return Err(de::Error::custom(
                        "at least one between `from_env` or `value` must be provided!",
                    ));
                }
                if from_env.is_some() && value.is_some() {
                    from_env = None; // value takes precedence
                }
                Ok(EnvOrValue { value, from_env })
            }
        }
        deserializer.deserialize_map(EnvOrValueVisitor)
    }
}
