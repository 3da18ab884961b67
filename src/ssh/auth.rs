// ABOUTME: Authentication negotiation over an encrypted link.
// ABOUTME: Tries ordered credentials (password, private key) until one is accepted.

use super::error::AuthError;
use super::transport::EncryptedLink;
use async_trait::async_trait;
use russh::keys::{PrivateKey, PrivateKeyWithHashAlg, load_secret_key, ssh_key};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// A password that never shows up in Debug output or logs.
#[derive(Clone, PartialEq, Eq)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Secret(<redacted>)")
    }
}

/// One way of proving identity to the remote host.
#[derive(Clone)]
pub enum Credential {
    Password(Secret),
    PrivateKey(Arc<PrivateKey>),
}

impl Credential {
    pub fn method_name(&self) -> &'static str {
        match self {
            Credential::Password(_) => "password",
            Credential::PrivateKey(_) => "publickey",
        }
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credential::Password(secret) => f.debug_tuple("Password").field(secret).finish(),
            Credential::PrivateKey(key) => f
                .debug_tuple("PrivateKey")
                .field(
                    &key.public_key()
                        .fingerprint(ssh_key::HashAlg::Sha256)
                        .to_string(),
                )
                .finish(),
        }
    }
}

/// Load a private key file as a credential.
///
/// Returns None when the file is missing, unreadable, encrypted or not a key.
/// A bad key file degrades to "no key" so other credentials can still be tried.
pub fn load_key_file(path: &Path) -> Option<Credential> {
    match load_secret_key(path, None) {
        Ok(key) => Some(Credential::PrivateKey(Arc::new(key))),
        Err(e) => {
            tracing::debug!("Ignoring private key {}: {}", path.display(), e);
            None
        }
    }
}

/// Ordered list of credentials handed to the negotiator.
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    methods: Vec<Credential>,
}

impl Credentials {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the list from optional sources: password first, then key file.
    ///
    /// An empty password is treated as absent. A key that fails to load is
    /// dropped.
    pub fn from_sources(password: Option<&Secret>, key_path: Option<&Path>) -> Self {
        let candidates = [
            password
                .filter(|p| !p.expose().is_empty())
                .map(|p| Credential::Password(p.clone())),
            key_path.and_then(load_key_file),
        ];

        Self {
            methods: candidates.into_iter().flatten().collect(),
        }
    }

    pub fn push(&mut self, credential: Credential) {
        self.methods.push(credential);
    }

    pub fn with(mut self, credential: Credential) -> Self {
        self.push(credential);
        self
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Credential> {
        self.methods.iter()
    }
}

/// A link that can attempt individual authentication methods.
#[async_trait]
pub trait Authenticator: Send {
    /// Returns Ok(false) when the host rejects the password.
    async fn try_password(&mut self, user: &str, password: &Secret) -> Result<bool, AuthError>;

    /// Returns Ok(false) when the host rejects the key.
    async fn try_public_key(
        &mut self,
        user: &str,
        key: Arc<PrivateKey>,
    ) -> Result<bool, AuthError>;
}

/// Try each credential in order until the host accepts one.
pub async fn negotiate<A>(
    authenticator: &mut A,
    user: &str,
    credentials: &Credentials,
) -> Result<(), AuthError>
where
    A: Authenticator + ?Sized,
{
    if credentials.is_empty() {
        return Err(AuthError::NoMethods);
    }

    let mut attempted = 0;
    for credential in credentials.iter() {
        attempted += 1;
        tracing::debug!(
            "Trying {} authentication for {} ({}/{})",
            credential.method_name(),
            user,
            attempted,
            credentials.len()
        );

        let accepted = match credential {
            Credential::Password(secret) => authenticator.try_password(user, secret).await?,
            Credential::PrivateKey(key) => {
                authenticator.try_public_key(user, Arc::clone(key)).await?
            }
        };

        if accepted {
            tracing::info!(
                "Authenticated as {} using {}",
                user,
                credential.method_name()
            );
            return Ok(());
        }
    }

    Err(AuthError::AllMethodsFailed { attempted })
}

#[async_trait]
impl Authenticator for EncryptedLink {
    async fn try_password(&mut self, user: &str, password: &Secret) -> Result<bool, AuthError> {
        let result = self
            .handle
            .authenticate_password(user, password.expose())
            .await
            .map_err(|e| AuthError::Protocol(e.to_string()))?;
        Ok(result.success())
    }

    async fn try_public_key(
        &mut self,
        user: &str,
        key: Arc<PrivateKey>,
    ) -> Result<bool, AuthError> {
        let hash_alg = self
            .handle
            .best_supported_rsa_hash()
            .await
            .map_err(|e| AuthError::Protocol(e.to_string()))?
            .flatten();

        let result = self
            .handle
            .authenticate_publickey(user, PrivateKeyWithHashAlg::new(key, hash_alg))
            .await
            .map_err(|e| AuthError::Protocol(e.to_string()))?;
        Ok(result.success())
    }
}
