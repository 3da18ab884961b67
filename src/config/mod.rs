// ABOUTME: Configuration types and parsing for sshrun.yml.
// ABOUTME: Resolves host aliases or ad-hoc targets into SSH client configs.

mod deserialize;
mod env_value;
mod host;
mod init;

pub use env_value::EnvValue;
pub use host::{HostConfig, HostKeyPolicy};
pub use init::init_config;

use crate::error::{Error, Result};
use crate::ssh::{ClientConfig, HostTrust, Secret};
use crate::types::{Endpoint, Target};
use deserialize::deserialize_hosts;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILENAME: &str = "sshrun.yml";
pub const CONFIG_FILENAME_ALT: &str = "sshrun.yaml";
pub const CONFIG_FILENAME_DIR: &str = ".sshrun/config.yml";

const FALLBACK_USER: &str = "root";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default = "default_connect_timeout", with = "humantime_serde")]
    pub connect_timeout: Duration,

    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    pub command_timeout: Duration,

    /// Login name for hosts that do not set their own.
    #[serde(default)]
    pub user: Option<String>,

    /// Private key for hosts that do not set their own.
    #[serde(default)]
    pub key: Option<PathBuf>,

    #[serde(default, deserialize_with = "deserialize_hosts")]
    pub hosts: BTreeMap<String, HostConfig>,
}

fn default_connect_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_command_timeout() -> Duration {
    Duration::from_secs(300)
}

impl Default for Config {
    fn default() -> Self {
        Config {
            connect_timeout: default_connect_timeout(),
            command_timeout: default_command_timeout(),
            user: None,
            key: None,
            hosts: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(Error::from)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    pub fn discover(dir: &Path) -> Result<Self> {
        let candidates = [
            dir.join(CONFIG_FILENAME),
            dir.join(CONFIG_FILENAME_ALT),
            dir.join(CONFIG_FILENAME_DIR),
        ];

        for path in &candidates {
            if path.exists() {
                return Self::load(path);
            }
        }

        Err(Error::ConfigNotFound(dir.to_path_buf()))
    }

    /// Like [`Config::discover`], but an absent file yields the defaults.
    pub fn discover_or_default(dir: &Path) -> Result<Self> {
        match Self::discover(dir) {
            Err(Error::ConfigNotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    /// Look up a host alias, falling back to parsing `[user@]host[:port]`.
    pub fn resolve_target(&self, target: &str) -> Result<HostConfig> {
        if let Some(host) = self.hosts.get(target) {
            return Ok(host.clone());
        }

        Target::parse(target)
            .map(HostConfig::from)
            .map_err(|e| Error::InvalidTarget {
                target: target.to_string(),
                reason: e.to_string(),
            })
    }

    /// Build a client configuration for one host.
    ///
    /// The login name falls back from the host entry to the top-level
    /// `user`, then `$USER`, then `root`.
    pub fn client_config(&self, host: &HostConfig) -> Result<ClientConfig> {
        let endpoint = Endpoint::new(host.host.as_str(), host.port)
            .map_err(|e| Error::InvalidConfig(format!("host '{}': {}", host.host, e)))?;

        let user = host
            .user
            .clone()
            .or_else(|| self.user.clone())
            .or_else(|| std::env::var("USER").ok().filter(|u| !u.is_empty()))
            .unwrap_or_else(|| FALLBACK_USER.to_string());

        let mut config = ClientConfig::new(endpoint, user)
            .host_trust(host_trust(host))
            .connect_timeout(Some(self.connect_timeout))
            .command_timeout(Some(self.command_timeout));

        if let Some(password) = &host.password {
            config.password = Some(Secret::new(password.resolve()?));
        }
        if let Some(key) = host.key.as_ref().or(self.key.as_ref()) {
            config = config.key_path(expand_home(key));
        }

        Ok(config)
    }
}

fn host_trust(host: &HostConfig) -> HostTrust {
    let path = host.known_hosts.as_deref().map(expand_home);
    match host.host_key {
        HostKeyPolicy::Strict => HostTrust::KnownHosts {
            path,
            trust_on_first_use: false,
        },
        HostKeyPolicy::TrustOnFirstUse => HostTrust::KnownHosts {
            path,
            trust_on_first_use: true,
        },
        HostKeyPolicy::AcceptAny => HostTrust::AcceptAny,
    }
}

/// Expand a leading `~/` using `$HOME`.
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), std::env::var_os("HOME")) {
        (Ok(rest), Some(home)) => PathBuf::from(home).join(rest),
        _ => path.to_path_buf(),
    }
}
