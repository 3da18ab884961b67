// ABOUTME: An authenticated link to one host, acting as a factory for session channels.
// ABOUTME: Channels are serialized by default; close is idempotent.

use super::auth;
use super::channel::{Channel, ChannelIo, RusshChannel};
use super::client::ClientConfig;
use super::error::{AuthSnafu, ChannelError, ConnectError, TransportError, TransportSnafu};
use super::transport::{self, TransportHandler};
use crate::types::Endpoint;
use async_trait::async_trait;
use russh::Disconnect;
use russh::client::Handle;
use snafu::ResultExt;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

/// How channels on one connection may overlap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MultiplexPolicy {
    /// One channel at a time; later callers wait for the lock.
    #[default]
    Serialized,
    /// Channels run side by side. The link must support true multiplexing.
    Concurrent,
}

/// An established, authenticated link that can open session channels.
#[async_trait]
pub trait Link: Send + Sync {
    async fn open_channel(&self) -> Result<Box<dyn ChannelIo>, ChannelError>;

    /// True once the remote side or the network has ended the session.
    fn is_closed(&self) -> bool;

    async fn disconnect(&self);
}

/// Establishes connections from a client configuration.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, config: &ClientConfig) -> Result<Connection, ConnectError>;
}

/// One authenticated connection to a host.
pub struct Connection {
    link: Box<dyn Link>,
    endpoint: Endpoint,
    host_fingerprint: Option<String>,
    policy: MultiplexPolicy,
    channel_lock: Arc<Mutex<()>>,
    closed: AtomicBool,
    dead: AtomicBool,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("endpoint", &self.endpoint)
            .field("host_fingerprint", &self.host_fingerprint)
            .field("policy", &self.policy)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Connection {
    pub fn new(link: Box<dyn Link>, endpoint: Endpoint, policy: MultiplexPolicy) -> Self {
        Self {
            link,
            endpoint,
            host_fingerprint: None,
            policy,
            channel_lock: Arc::new(Mutex::new(())),
            closed: AtomicBool::new(false),
            dead: AtomicBool::new(false),
        }
    }

    pub fn with_host_fingerprint(mut self, fingerprint: impl Into<String>) -> Self {
        self.host_fingerprint = Some(fingerprint.into());
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn host_fingerprint(&self) -> Option<&str> {
        self.host_fingerprint.as_deref()
    }

    /// Closed by us, marked dead, or ended by the remote side.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst) || self.dead.load(Ordering::SeqCst) || self.link.is_closed()
    }

    /// Record that the link failed underneath a command.
    pub fn mark_dead(&self) {
        if !self.dead.swap(true, Ordering::SeqCst) {
            tracing::debug!("Connection to {} marked dead", self.endpoint);
        }
    }

    /// Open a new session channel.
    pub async fn open_channel(&self) -> Result<Channel, ChannelError> {
        if self.is_closed() {
            return Err(ChannelError::LinkDown);
        }

        let permit = match self.policy {
            MultiplexPolicy::Serialized => Some(Arc::clone(&self.channel_lock).lock_owned().await),
            MultiplexPolicy::Concurrent => None,
        };

        // The link may have gone away while we waited for the lock
        if self.is_closed() {
            return Err(ChannelError::LinkDown);
        }

        match self.link.open_channel().await {
            Ok(io) => Ok(Channel::new(io, permit)),
            Err(_) if self.link.is_closed() => {
                self.mark_dead();
                Err(ChannelError::LinkDown)
            }
            Err(e) => Err(e),
        }
    }

    /// Release the link. Later calls do nothing.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        tracing::debug!("Closing connection to {}", self.endpoint);
        self.link.disconnect().await;
    }
}

/// [`Link`] over a russh client handle.
pub(crate) struct RusshLink {
    handle: Handle<TransportHandler>,
}

#[async_trait]
impl Link for RusshLink {
    async fn open_channel(&self) -> Result<Box<dyn ChannelIo>, ChannelError> {
        let channel = self
            .handle
            .channel_open_session()
            .await
            .map_err(|e| ChannelError::OpenFailed(e.to_string()))?;
        Ok(Box::new(RusshChannel::new(channel)))
    }

    fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }

    async fn disconnect(&self) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            tracing::warn!("SSH disconnect failed: {}", e);
        }
    }
}

/// Connects over TCP with russh: dial, handshake, host check, authenticate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SshConnector;

#[async_trait]
impl Connector for SshConnector {
    async fn connect(&self, config: &ClientConfig) -> Result<Connection, ConnectError> {
        tracing::debug!("Connecting to {}@{}", config.user, config.endpoint);

        let attempt = async {
            let stream = transport::dial(&config.endpoint)
                .await
                .context(TransportSnafu)?;
            let mut link = transport::open(
                stream,
                &config.endpoint,
                config.host_trust.verifier(),
                &config.transport,
            )
            .await
            .context(TransportSnafu)?;
            auth::negotiate(&mut link, &config.user, &config.credentials())
                .await
                .context(AuthSnafu)?;
            Ok::<_, ConnectError>(link)
        };

        let link = match config.connect_timeout {
            Some(limit) => tokio::time::timeout(limit, attempt)
                .await
                .map_err(|_| ConnectError::from(TransportError::Timeout(limit)))??,
            None => attempt.await?,
        };

        let (handle, endpoint, fingerprint) = link.into_parts();
        tracing::info!(
            "Connected to {}@{} (host key {})",
            config.user,
            endpoint,
            fingerprint
        );

        Ok(
            Connection::new(Box::new(RusshLink { handle }), endpoint, config.multiplex)
                .with_host_fingerprint(fingerprint),
        )
    }
}
