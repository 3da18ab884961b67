// ABOUTME: SSH-specific error types for each layer of a remote execution.
// ABOUTME: Transport, authentication, channel and command failures keep their causes.

use crate::types::Endpoint;
use snafu::Snafu;
use std::time::Duration;
use thiserror::Error;

/// Failures while turning a raw stream into an encrypted link.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("handshake failed: {0}")]
    HandshakeFailed(String),

    #[error("host key for {endpoint} rejected ({fingerprint})")]
    HostKeyRejected {
        endpoint: Endpoint,
        fingerprint: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out after {0:?}")]
    Timeout(Duration),
}

/// Failures while proving identity over an established link.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("authentication failed: no authentication methods available")]
    NoMethods,

    #[error("authentication failed: all {attempted} method(s) rejected")]
    AllMethodsFailed { attempted: usize },

    #[error("authentication failed: {0}")]
    Protocol(String),
}

/// Connection establishment error, always reported as "unable to connect".
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ConnectError {
    #[snafu(display("unable to connect: {source}"))]
    Transport { source: TransportError },

    #[snafu(display("unable to connect: {source}"))]
    Auth { source: AuthError },
}

impl ConnectError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ConnectError::Transport { source } => match source {
                TransportError::HandshakeFailed(_) => ErrorKind::HandshakeFailed,
                TransportError::HostKeyRejected { .. } => ErrorKind::HostKeyRejected,
                TransportError::Io(_) => ErrorKind::Io,
                TransportError::Timeout(_) => ErrorKind::ConnectTimeout,
            },
            ConnectError::Auth { source } => match source {
                AuthError::NoMethods => ErrorKind::NoAuthMethods,
                AuthError::AllMethodsFailed { .. } => ErrorKind::AuthenticationFailed,
                AuthError::Protocol(_) => ErrorKind::AuthProtocol,
            },
        }
    }
}

impl From<TransportError> for ConnectError {
    fn from(source: TransportError) -> Self {
        ConnectError::Transport { source }
    }
}

impl From<AuthError> for ConnectError {
    fn from(source: AuthError) -> Self {
        ConnectError::Auth { source }
    }
}

/// Failures opening a logical channel on an established connection.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("connection is closed")]
    LinkDown,

    #[error("channel open failed: {0}")]
    OpenFailed(String),
}

/// Failures of a single remote command. Captured stderr rides along.
#[derive(Debug, Error)]
pub enum CommandError {
    #[error("failed to start command: {0}")]
    Start(String),

    #[error("process exited with status {status}{}", detail(.stderr))]
    Exited { status: u32, stderr: String },

    #[error("process killed by signal {signal}{}", detail(.stderr))]
    Signaled { signal: String, stderr: String },

    #[error("process exited without reporting a status{}", detail(.stderr))]
    NoExitStatus { stderr: String },

    #[error("{reason}{}", detail(.stderr))]
    Transport { reason: String, stderr: String },

    #[error("command timed out after {after:?}{}", detail(.stderr))]
    Timeout { after: Duration, stderr: String },
}

impl CommandError {
    /// Captured stderr, if the command got far enough to produce any.
    pub fn stderr(&self) -> Option<&str> {
        match self {
            CommandError::Start(_) => None,
            CommandError::Exited { stderr, .. }
            | CommandError::Signaled { stderr, .. }
            | CommandError::NoExitStatus { stderr }
            | CommandError::Transport { stderr, .. }
            | CommandError::Timeout { stderr, .. } => Some(stderr),
        }
    }
}

fn detail(stderr: &str) -> String {
    let stderr = stderr.trim_end();
    if stderr.is_empty() {
        String::new()
    } else {
        format!(". {stderr}")
    }
}

/// Any failure surfaced by the client facade.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Connect(#[from] ConnectError),

    #[error("unable to start new session: {0}")]
    Channel(#[from] ChannelError),

    #[error(transparent)]
    Command(#[from] CommandError),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connect(e) => e.kind(),
            Error::Channel(ChannelError::LinkDown) => ErrorKind::LinkDown,
            Error::Channel(ChannelError::OpenFailed(_)) => ErrorKind::ChannelOpenFailed,
            Error::Command(CommandError::Start(_)) => ErrorKind::CommandStart,
            Error::Command(CommandError::Exited { .. }) => ErrorKind::NonZeroExit,
            Error::Command(CommandError::Signaled { .. }) => ErrorKind::Signaled,
            Error::Command(CommandError::NoExitStatus { .. }) => ErrorKind::NoExitStatus,
            Error::Command(CommandError::Transport { .. }) => ErrorKind::CommandTransport,
            Error::Command(CommandError::Timeout { .. }) => ErrorKind::CommandTimeout,
        }
    }
}

/// Error kind for programmatic handling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    HandshakeFailed,
    HostKeyRejected,
    Io,
    ConnectTimeout,
    NoAuthMethods,
    AuthenticationFailed,
    AuthProtocol,
    LinkDown,
    ChannelOpenFailed,
    CommandStart,
    NonZeroExit,
    Signaled,
    NoExitStatus,
    CommandTransport,
    CommandTimeout,
}

impl ErrorKind {
    pub fn is_auth(self) -> bool {
        matches!(
            self,
            ErrorKind::NoAuthMethods | ErrorKind::AuthenticationFailed | ErrorKind::AuthProtocol
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
