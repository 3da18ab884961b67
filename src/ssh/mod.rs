// ABOUTME: SSH remote execution: transport, authentication, connection, channels, client.
// ABOUTME: Supports password and key authentication with pluggable host-key trust.

mod auth;
pub mod blocking;
mod channel;
mod client;
mod connection;
mod error;
mod transport;

pub use auth::{Authenticator, Credential, Credentials, Secret, load_key_file, negotiate};
pub use channel::{Channel, ChannelEvent, ChannelIo, CommandOutput, ExitStatus};
pub use client::{Client, ClientConfig, HostTrust};
pub use connection::{Connection, Connector, Link, MultiplexPolicy, SshConnector};
pub use error::{
    AuthError, ChannelError, CommandError, ConnectError, Error, ErrorKind, Result, TransportError,
};
pub use transport::{
    AcceptAnyHost, EncryptedLink, HostIdentity, HostKeyVerifier, KnownHosts, TransportOptions,
    TrustDecision, dial, open,
};
