// ABOUTME: Per-host SSH configuration entries.
// ABOUTME: Parses formats like "host", "user@host", "host:port", "user@host:port".

use super::env_value::EnvValue;
use crate::types::{DEFAULT_SSH_PORT, Target};
use serde::Deserialize;
use std::path::PathBuf;

/// Host key checking mode for a configured host.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Host must already be in known_hosts.
    #[default]
    Strict,
    /// Record unknown hosts on first connection, reject changed keys.
    TrustOnFirstUse,
    /// No verification at all.
    AcceptAny,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub password: Option<EnvValue>,
    #[serde(default)]
    pub key: Option<PathBuf>,
    #[serde(default)]
    pub host_key: HostKeyPolicy,
    #[serde(default)]
    pub known_hosts: Option<PathBuf>,
}

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

impl HostConfig {
    pub fn parse(s: &str) -> Result<Self, String> {
        let target = Target::parse(s).map_err(|e| e.to_string())?;
        Ok(Self::from(target))
    }
}

impl From<Target> for HostConfig {
    fn from(target: Target) -> Self {
        HostConfig {
            host: target.endpoint.host().to_string(),
            port: target.endpoint.port(),
            user: target.user,
            password: None,
            key: None,
            host_key: HostKeyPolicy::default(),
            known_hosts: None,
        }
    }
}
