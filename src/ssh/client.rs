// ABOUTME: Client facade: holds connection parameters and lazily connects on first use.
// ABOUTME: Exposes "run a command, get its output" over a cached, reusable connection.

use super::auth::{Credential, Credentials, Secret};
use super::channel::CommandOutput;
use super::connection::{Connection, Connector, MultiplexPolicy, SshConnector};
use super::error::{CommandError, ConnectError, Result};
use super::transport::{AcceptAnyHost, HostKeyVerifier, KnownHosts, TransportOptions};
use crate::types::Endpoint;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// How the remote host's identity is checked.
#[derive(Clone)]
pub enum HostTrust {
    /// Check an OpenSSH known_hosts file (default ~/.ssh/known_hosts).
    KnownHosts {
        path: Option<PathBuf>,
        trust_on_first_use: bool,
    },
    /// Accept any host key. Insecure; must be chosen explicitly.
    AcceptAny,
    /// Caller-supplied trust decision.
    Custom(Arc<dyn HostKeyVerifier>),
}

impl Default for HostTrust {
    fn default() -> Self {
        HostTrust::KnownHosts {
            path: None,
            trust_on_first_use: false,
        }
    }
}

impl fmt::Debug for HostTrust {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostTrust::KnownHosts {
                path,
                trust_on_first_use,
            } => f
                .debug_struct("KnownHosts")
                .field("path", path)
                .field("trust_on_first_use", trust_on_first_use)
                .finish(),
            HostTrust::AcceptAny => f.write_str("AcceptAny"),
            HostTrust::Custom(_) => f.write_str("Custom(<verifier>)"),
        }
    }
}

impl HostTrust {
    pub fn custom(verifier: impl HostKeyVerifier + 'static) -> Self {
        HostTrust::Custom(Arc::new(verifier))
    }

    pub fn verifier(&self) -> Arc<dyn HostKeyVerifier> {
        match self {
            HostTrust::KnownHosts {
                path,
                trust_on_first_use,
            } => Arc::new(KnownHosts::new(path.clone(), *trust_on_first_use)),
            HostTrust::AcceptAny => Arc::new(AcceptAnyHost),
            HostTrust::Custom(verifier) => Arc::clone(verifier),
        }
    }
}

/// Configuration for a remote execution client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub endpoint: Endpoint,
    pub user: String,
    pub password: Option<Secret>,
    /// Private key file. Unreadable or unparsable files are skipped.
    pub key_path: Option<PathBuf>,
    /// Tried after the password and key file, in order.
    pub extra_credentials: Vec<Credential>,
    pub host_trust: HostTrust,
    /// Deadline for dial, handshake and authentication together.
    pub connect_timeout: Option<Duration>,
    /// Default deadline for a single command.
    pub command_timeout: Option<Duration>,
    pub multiplex: MultiplexPolicy,
    pub transport: TransportOptions,
}

impl ClientConfig {
    pub fn new(endpoint: Endpoint, user: impl Into<String>) -> Self {
        Self {
            endpoint,
            user: user.into(),
            password: None,
            key_path: None,
            extra_credentials: Vec::new(),
            host_trust: HostTrust::default(),
            connect_timeout: Some(Duration::from_secs(30)),
            command_timeout: Some(Duration::from_secs(300)), // 5 minutes
            multiplex: MultiplexPolicy::default(),
            transport: TransportOptions::default(),
        }
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(Secret::new(password));
        self
    }

    pub fn key_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.key_path = Some(path.into());
        self
    }

    pub fn credential(mut self, credential: Credential) -> Self {
        self.extra_credentials.push(credential);
        self
    }

    pub fn host_trust(mut self, trust: HostTrust) -> Self {
        self.host_trust = trust;
        self
    }

    pub fn connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn command_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn multiplex(mut self, policy: MultiplexPolicy) -> Self {
        self.multiplex = policy;
        self
    }

    pub fn transport(mut self, options: TransportOptions) -> Self {
        self.transport = options;
        self
    }

    /// Resolve the ordered credential list, dropping unusable key files.
    pub fn credentials(&self) -> Credentials {
        let mut credentials =
            Credentials::from_sources(self.password.as_ref(), self.key_path.as_deref());
        for credential in &self.extra_credentials {
            credentials.push(credential.clone());
        }
        credentials
    }
}

enum ConnectionState {
    Disconnected,
    Connected(Arc<Connection>),
}

/// Runs commands on one remote host, connecting on first use.
///
/// The connection is reused by later calls. When it is found closed or
/// dead, the next call reconnects; a failed command is never retried.
pub struct Client<C = SshConnector> {
    config: ClientConfig,
    connector: C,
    state: Mutex<ConnectionState>,
}

impl<C> fmt::Debug for Client<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("endpoint", &self.config.endpoint)
            .field("user", &self.config.user)
            .finish()
    }
}

impl Client<SshConnector> {
    pub fn new(config: ClientConfig) -> Self {
        Self::with_connector(config, SshConnector)
    }
}

impl<C: Connector> Client<C> {
    pub fn with_connector(config: ClientConfig, connector: C) -> Self {
        Self {
            config,
            connector,
            state: Mutex::new(ConnectionState::Disconnected),
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Whether a usable connection is currently cached.
    pub async fn is_connected(&self) -> bool {
        match &*self.state.lock().await {
            ConnectionState::Connected(conn) => !conn.is_closed(),
            ConnectionState::Disconnected => false,
        }
    }

    /// Connect eagerly. Does nothing if a usable connection is cached.
    pub async fn connect(&self) -> std::result::Result<(), ConnectError> {
        self.connection().await.map(|_| ())
    }

    async fn connection(&self) -> std::result::Result<Arc<Connection>, ConnectError> {
        let mut state = self.state.lock().await;

        let stale = match &*state {
            ConnectionState::Connected(conn) if !conn.is_closed() => return Ok(Arc::clone(conn)),
            ConnectionState::Connected(conn) => Some(Arc::clone(conn)),
            ConnectionState::Disconnected => None,
        };

        if let Some(stale) = stale {
            tracing::info!(
                "Connection to {} is no longer usable, reconnecting",
                self.config.endpoint
            );
            *state = ConnectionState::Disconnected;
            stale.close().await;
        }

        let conn = Arc::new(self.connector.connect(&self.config).await?);
        *state = ConnectionState::Connected(Arc::clone(&conn));
        Ok(conn)
    }

    /// Run a command and return its output. Non-zero exit is not an error here.
    pub async fn exec(&self, command: &str) -> Result<CommandOutput> {
        self.exec_with_timeout(command, self.config.command_timeout)
            .await
    }

    /// Run a command with a custom deadline (None waits indefinitely).
    pub async fn exec_with_timeout(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput> {
        let conn = self.connection().await?;
        let channel = conn.open_channel().await?;

        match channel.run(command, timeout).await {
            Ok(output) => Ok(output),
            Err(e) => {
                if matches!(e, CommandError::Transport { .. }) {
                    conn.mark_dead();
                }
                Err(e.into())
            }
        }
    }

    /// Run a command and return its stdout.
    ///
    /// Non-zero exit, a signal, or a transport failure become one error that
    /// carries the cause and the captured stderr.
    pub async fn run_command(&self, command: &str) -> Result<String> {
        Ok(self.exec(command).await?.into_stdout()?)
    }

    pub async fn run_command_with_timeout(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<String> {
        Ok(self
            .exec_with_timeout(command, timeout)
            .await?
            .into_stdout()?)
    }

    /// Release the cached connection. Safe to call more than once.
    pub async fn close(&self) {
        let previous = std::mem::replace(
            &mut *self.state.lock().await,
            ConnectionState::Disconnected,
        );
        if let ConnectionState::Connected(conn) = previous {
            conn.close().await;
        }
    }
}
