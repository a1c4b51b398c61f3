use std::fmt;

use crate::error::TunnelError;

pub const DEFAULT_SSH_PORT: &str = "22";

/// ssh endpoint as given on the command line (`user@host[:port]`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Endpoint {
    pub username: String,
    pub host: String,
    /// empty when the input had no port segment
    pub port: String,
}

impl Endpoint {
    pub fn parse(input: &str) -> Result<Endpoint, TunnelError> {
        let Some((username, address)) = input.split_once('@') else {
            return Err(TunnelError::Format(format!(
                "{input:?} is not in the user@host[:port] format"
            )));
        };
        if username.is_empty() {
            return Err(TunnelError::Format(format!("empty username in {input:?}")));
        }
        let (host, port) = split_host_port(address)?;
        Ok(Endpoint {
            username: username.to_string(),
            host: host.to_string(),
            port: port.to_string(),
        })
    }

    pub fn with_default_port(mut self) -> Endpoint {
        if self.port.is_empty() {
            self.port = DEFAULT_SSH_PORT.to_string();
        }
        self
    }

    /// `host:port`, bracketing ipv6 literals
    pub fn address(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    pub fn port_number(&self) -> Result<u16, TunnelError> {
        self.port
            .parse()
            .map_err(|_| TunnelError::Format(format!("invalid ssh port {:?}", self.port)))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.username, self.address())
    }
}

/// Splits `host:port`. A missing port segment is not an error, the port comes back empty.
fn split_host_port(address: &str) -> Result<(&str, &str), TunnelError> {
    let invalid = |reason: &str| TunnelError::Format(format!("address {address:?}: {reason}"));

    if let Some(rest) = address.strip_prefix('[') {
        let Some((host, tail)) = rest.split_once(']') else {
            return Err(invalid("missing ']'"));
        };
        if host.is_empty() {
            return Err(invalid("missing host"));
        }
        return match tail {
            "" => Ok((host, "")),
            _ => match tail.strip_prefix(':') {
                Some(port) if !port.contains(':') => Ok((host, port)),
                _ => Err(invalid("unexpected characters after ']'")),
            },
        };
    }
    if address.contains(']') {
        return Err(invalid("unexpected ']'"));
    }

    if address.matches(':').count() > 1 {
        return Err(invalid("too many colons"));
    }
    let (host, port) = address.split_once(':').unwrap_or((address, ""));
    if host.is_empty() {
        return Err(invalid("missing host"));
    }
    Ok((host, port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_endpoint() {
        let endpoint = Endpoint::parse("alice@host:2200").unwrap();
        assert_eq!(
            endpoint,
            Endpoint {
                username: String::from("alice"),
                host: String::from("host"),
                port: String::from("2200"),
            }
        );
        assert_eq!(endpoint.port_number().unwrap(), 2200);
        assert_eq!(endpoint.to_string(), "alice@host:2200");
    }

    #[test]
    fn missing_port_gets_default() {
        let endpoint = Endpoint::parse("alice@host").unwrap();
        assert_eq!(endpoint.host, "host");
        assert_eq!(endpoint.port, "");
        let endpoint = endpoint.with_default_port();
        assert_eq!(endpoint.port, "22");
        assert_eq!(endpoint.address(), "host:22");
    }

    #[test]
    fn explicit_port_survives_default() {
        let endpoint = Endpoint::parse("bob@10.0.0.1:2022")
            .unwrap()
            .with_default_port();
        assert_eq!(endpoint.port, "2022");
    }

    #[test]
    fn username_is_split_on_first_at() {
        let endpoint = Endpoint::parse("alice@corp@host").unwrap();
        assert_eq!(endpoint.username, "alice");
        assert_eq!(endpoint.host, "corp@host");
    }

    #[test]
    fn rejects_bad_endpoints() {
        for input in ["@host:22", "alice", "", "alice@", "alice@:22", "alice@a:b:c"] {
            let result = Endpoint::parse(input);
            assert!(
                matches!(result, Err(TunnelError::Format(_))),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn ipv6_hosts() {
        let endpoint = Endpoint::parse("root@[::1]:2222").unwrap();
        assert_eq!(endpoint.host, "::1");
        assert_eq!(endpoint.port, "2222");
        assert_eq!(endpoint.address(), "[::1]:2222");

        let endpoint = Endpoint::parse("root@[fe80::1]").unwrap().with_default_port();
        assert_eq!(endpoint.address(), "[fe80::1]:22");

        assert!(Endpoint::parse("root@[::1").is_err());
        assert!(Endpoint::parse("root@[::1]x").is_err());
    }

    #[test]
    fn non_numeric_port_is_rejected_when_dialing() {
        let endpoint = Endpoint::parse("alice@host:ssh").unwrap();
        assert!(matches!(
            endpoint.port_number(),
            Err(TunnelError::Format(_))
        ));
    }
}
