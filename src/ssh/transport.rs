// ABOUTME: Transport layer: raw stream to encrypted link with a verified host identity.
// ABOUTME: Host trust is a pluggable decision (known_hosts, TOFU, custom, or accept-any).

use super::error::TransportError;
use crate::types::Endpoint;
use parking_lot::Mutex;
use russh::client::{self, Config, Handle};
use russh::keys::known_hosts::{
    check_known_hosts, check_known_hosts_path, learn_known_hosts, learn_known_hosts_path,
};
use russh::keys::ssh_key;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;

/// The identity a remote host presented during key exchange.
#[derive(Debug, Clone)]
pub struct HostIdentity {
    pub endpoint: Endpoint,
    pub key: ssh_key::PublicKey,
    /// SHA-256 fingerprint in OpenSSH notation (`SHA256:...`).
    pub fingerprint: String,
}

impl HostIdentity {
    /// Identities compare by key material only; any comment is dropped.
    pub fn new(endpoint: Endpoint, mut key: ssh_key::PublicKey) -> Self {
        key.set_comment("");
        let fingerprint = key.fingerprint(ssh_key::HashAlg::Sha256).to_string();
        Self {
            endpoint,
            key,
            fingerprint,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrustDecision {
    Accept,
    Reject,
}

/// Decides whether a remote host identity is trusted.
pub trait HostKeyVerifier: Send + Sync {
    fn verify(&self, identity: &HostIdentity) -> TrustDecision;
}

impl<F> HostKeyVerifier for F
where
    F: Fn(&HostIdentity) -> TrustDecision + Send + Sync,
{
    fn verify(&self, identity: &HostIdentity) -> TrustDecision {
        self(identity)
    }
}

/// Accepts every host key. Insecure; only for hosts reached over a trusted path.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptAnyHost;

impl HostKeyVerifier for AcceptAnyHost {
    fn verify(&self, identity: &HostIdentity) -> TrustDecision {
        tracing::warn!(
            "Accepting host key for {} without verification ({})",
            identity.endpoint,
            identity.fingerprint
        );
        TrustDecision::Accept
    }
}

/// Verifies against an OpenSSH known_hosts file.
#[derive(Debug, Clone, Default)]
pub struct KnownHosts {
    /// If None, uses the default ~/.ssh/known_hosts.
    pub path: Option<PathBuf>,
    /// Accept and record hosts that are not yet in the file.
    pub trust_on_first_use: bool,
}

impl KnownHosts {
    pub fn new(path: Option<PathBuf>, trust_on_first_use: bool) -> Self {
        Self {
            path,
            trust_on_first_use,
        }
    }

    fn learn(&self, identity: &HostIdentity) {
        let host = identity.endpoint.host();
        let port = identity.endpoint.port();
        let result = match &self.path {
            Some(path) => learn_known_hosts_path(host, port, &identity.key, path),
            None => learn_known_hosts(host, port, &identity.key),
        };
        if let Err(e) = result {
            tracing::warn!("Failed to save host key to known_hosts: {}", e);
        }
    }
}

impl HostKeyVerifier for KnownHosts {
    fn verify(&self, identity: &HostIdentity) -> TrustDecision {
        let host = identity.endpoint.host();
        let port = identity.endpoint.port();
        let check_result = match &self.path {
            Some(path) => check_known_hosts_path(host, port, &identity.key, path),
            None => check_known_hosts(host, port, &identity.key),
        };

        match check_result {
            Ok(true) => TrustDecision::Accept,
            Ok(false) if self.trust_on_first_use => {
                tracing::warn!(
                    "Trust-On-First-Use: accepting unknown host key for {} ({})",
                    identity.endpoint,
                    identity.fingerprint
                );
                self.learn(identity);
                TrustDecision::Accept
            }
            Ok(false) => TrustDecision::Reject,
            Err(russh::keys::Error::KeyChanged { .. }) => {
                tracing::warn!(
                    "Host key for {} does not match known_hosts ({})",
                    identity.endpoint,
                    identity.fingerprint
                );
                TrustDecision::Reject
            }
            // Unreadable file: same as an unknown host
            Err(e) => {
                tracing::debug!("known_hosts check failed: {}", e);
                if self.trust_on_first_use {
                    self.learn(identity);
                    TrustDecision::Accept
                } else {
                    TrustDecision::Reject
                }
            }
        }
    }
}

/// Tunables for the underlying protocol session.
#[derive(Debug, Clone)]
pub struct TransportOptions {
    pub inactivity_timeout: Option<Duration>,
    pub keepalive_interval: Option<Duration>,
}

impl Default for TransportOptions {
    fn default() -> Self {
        Self {
            inactivity_timeout: Some(Duration::from_secs(300)),
            keepalive_interval: Some(Duration::from_secs(30)),
        }
    }
}

impl TransportOptions {
    fn russh_config(&self) -> Config {
        Config {
            inactivity_timeout: self.inactivity_timeout,
            keepalive_interval: self.keepalive_interval,
            keepalive_max: 3,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
enum Verdict {
    Accepted(String),
    Rejected(String),
}

/// russh client handler that defers host trust to a [`HostKeyVerifier`].
pub(crate) struct TransportHandler {
    endpoint: Endpoint,
    verifier: Arc<dyn HostKeyVerifier>,
    verdict: Arc<Mutex<Option<Verdict>>>,
}

impl client::Handler for TransportHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &ssh_key::PublicKey,
    ) -> Result<bool, Self::Error> {
        let identity = HostIdentity::new(self.endpoint.clone(), server_public_key.clone());
        let decision = self.verifier.verify(&identity);
        tracing::debug!(
            "Host key for {} ({}): {:?}",
            identity.endpoint,
            identity.fingerprint,
            decision
        );

        let accepted = decision == TrustDecision::Accept;
        *self.verdict.lock() = Some(if accepted {
            Verdict::Accepted(identity.fingerprint)
        } else {
            Verdict::Rejected(identity.fingerprint)
        });
        Ok(accepted)
    }
}

/// An encrypted, not yet authenticated, link to a host.
pub struct EncryptedLink {
    pub(crate) handle: Handle<TransportHandler>,
    endpoint: Endpoint,
    host_fingerprint: String,
}

impl fmt::Debug for EncryptedLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncryptedLink")
            .field("endpoint", &self.endpoint)
            .field("host_fingerprint", &self.host_fingerprint)
            .field("handle", &"<russh::Handle>")
            .finish()
    }
}

impl EncryptedLink {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Fingerprint of the host key accepted during the handshake.
    pub fn host_fingerprint(&self) -> &str {
        &self.host_fingerprint
    }

    pub(crate) fn into_parts(self) -> (Handle<TransportHandler>, Endpoint, String) {
        (self.handle, self.endpoint, self.host_fingerprint)
    }
}

/// Open a TCP stream to the endpoint.
pub async fn dial(endpoint: &Endpoint) -> Result<TcpStream, TransportError> {
    tracing::debug!("Dialing {}", endpoint);
    let stream = TcpStream::connect((endpoint.host(), endpoint.port())).await?;
    stream.set_nodelay(true)?;
    Ok(stream)
}

/// Run the SSH handshake over `stream` and verify the host identity.
///
/// The returned link owns the stream.
pub async fn open<S>(
    stream: S,
    endpoint: &Endpoint,
    verifier: Arc<dyn HostKeyVerifier>,
    options: &TransportOptions,
) -> Result<EncryptedLink, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let verdict = Arc::new(Mutex::new(None));
    let handler = TransportHandler {
        endpoint: endpoint.clone(),
        verifier,
        verdict: Arc::clone(&verdict),
    };

    let result = client::connect_stream(Arc::new(options.russh_config()), stream, handler).await;
    let verdict = verdict.lock().take();

    match (result, verdict) {
        (Ok(handle), Some(Verdict::Accepted(fingerprint))) => Ok(EncryptedLink {
            handle,
            endpoint: endpoint.clone(),
            host_fingerprint: fingerprint,
        }),
        (_, Some(Verdict::Rejected(fingerprint))) => Err(TransportError::HostKeyRejected {
            endpoint: endpoint.clone(),
            fingerprint,
        }),
        (Ok(_), None) => Err(TransportError::HandshakeFailed(
            "host key was never presented".to_string(),
        )),
        (Err(russh::Error::IO(e)), _) => Err(TransportError::Io(e)),
        (Err(e), _) => Err(TransportError::HandshakeFailed(e.to_string())),
    }
}
