// ABOUTME: Validated network endpoint (host and port) for SSH connections.
// ABOUTME: Parses forms like "host", "host:port", "[::1]:2222".

use std::fmt;
use thiserror::Error;

pub const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EndpointError {
    #[error("host cannot be empty")]
    EmptyHost,

    #[error("port must be between 1 and 65535")]
    PortOutOfRange,

    #[error("invalid port: {0}")]
    InvalidPort(String),

    #[error("invalid character in host: '{0}'")]
    InvalidChar(char),

    #[error("unterminated '[' in host: {0}")]
    UnterminatedBracket(String),
}

/// A remote host and port. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, EndpointError> {
        let host: String = host.into();
        let host = host.trim();
        if host.is_empty() {
            return Err(EndpointError::EmptyHost);
        }
        if port == 0 {
            return Err(EndpointError::PortOutOfRange);
        }
        if let Some(c) = host
            .chars()
            .find(|c| c.is_whitespace() || matches!(c, '@' | '/' | '[' | ']'))
        {
            return Err(EndpointError::InvalidChar(c));
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// Parse `host`, `host:port`, `[v6]` or `[v6]:port`.
    ///
    /// A bare IPv6 address without brackets is taken as a host with the
    /// default port, since its colons cannot be told apart from a port.
    pub fn parse(input: &str) -> Result<Self, EndpointError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(EndpointError::EmptyHost);
        }

        if let Some(rest) = input.strip_prefix('[') {
            let (host, after) = rest
                .split_once(']')
                .ok_or_else(|| EndpointError::UnterminatedBracket(input.to_string()))?;
            let port = match after {
                "" => DEFAULT_SSH_PORT,
                _ => match after.strip_prefix(':') {
                    Some(port) => parse_port(port)?,
                    None => return Err(EndpointError::InvalidPort(after.to_string())),
                },
            };
            return Self::new(host, port);
        }

        match input.matches(':').count() {
            0 => Self::new(input, DEFAULT_SSH_PORT),
            1 => {
                let (host, port) = input.split_once(':').unwrap_or((input, ""));
                Self::new(host, parse_port(port)?)
            }
            _ => Self::new(input, DEFAULT_SSH_PORT),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

fn parse_port(s: &str) -> Result<u16, EndpointError> {
    match s.parse::<u32>() {
        Ok(0) => Err(EndpointError::PortOutOfRange),
        Ok(p) if p > u16::MAX as u32 => Err(EndpointError::PortOutOfRange),
        Ok(p) => Ok(p as u16),
        Err(_) => Err(EndpointError::InvalidPort(s.to_string())),
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_gets_default_port() {
        let ep = Endpoint::parse("example.com").unwrap();
        assert_eq!(ep.host(), "example.com");
        assert_eq!(ep.port(), 22);
    }

    #[test]
    fn host_with_port() {
        let ep = Endpoint::parse("example.com:2222").unwrap();
        assert_eq!(ep.port(), 2222);
        assert_eq!(ep.to_string(), "example.com:2222");
    }

    #[test]
    fn bracketed_ipv6() {
        let ep = Endpoint::parse("[::1]:2200").unwrap();
        assert_eq!(ep.host(), "::1");
        assert_eq!(ep.port(), 2200);
        assert_eq!(ep.to_string(), "[::1]:2200");
    }

    #[test]
    fn bare_ipv6_uses_default_port() {
        let ep = Endpoint::parse("fe80::1").unwrap();
        assert_eq!(ep.host(), "fe80::1");
        assert_eq!(ep.port(), 22);
    }

    #[test]
    fn port_zero_rejected() {
        assert_eq!(
            Endpoint::parse("host:0").unwrap_err(),
            EndpointError::PortOutOfRange
        );
        assert_eq!(
            Endpoint::new("host", 0).unwrap_err(),
            EndpointError::PortOutOfRange
        );
    }

    #[test]
    fn port_too_large_rejected() {
        assert_eq!(
            Endpoint::parse("host:65536").unwrap_err(),
            EndpointError::PortOutOfRange
        );
    }

    #[test]
    fn garbage_port_rejected() {
        assert!(matches!(
            Endpoint::parse("host:ssh"),
            Err(EndpointError::InvalidPort(_))
        ));
    }

    #[test]
    fn empty_host_rejected() {
        assert_eq!(Endpoint::parse("").unwrap_err(), EndpointError::EmptyHost);
        assert_eq!(Endpoint::parse(":22").unwrap_err(), EndpointError::EmptyHost);
        assert_eq!(Endpoint::parse("[]:22").unwrap_err(), EndpointError::EmptyHost);
    }

    #[test]
    fn unterminated_bracket_rejected() {
        assert!(matches!(
            Endpoint::parse("[::1:22"),
            Err(EndpointError::UnterminatedBracket(_))
        ));
    }
}
