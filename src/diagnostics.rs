// ABOUTME: Diagnostics accumulator for non-fatal warnings during a remote run.
// ABOUTME: Collects warnings that shouldn't fail a command but should be shown to users.

use crate::ssh::{ClientConfig, HostTrust, load_key_file};

/// Collects non-fatal warnings during a remote run.
#[derive(Default)]
pub struct Diagnostics {
    warnings: Vec<Warning>,
}

impl Diagnostics {
    /// Record a warning, auto-logging it via tracing.
    pub fn warn(&mut self, warning: Warning) {
        tracing::warn!("{}", warning.message);
        self.warnings.push(warning);
    }

    /// Get all collected warnings.
    pub fn warnings(&self) -> &[Warning] {
        &self.warnings
    }

    /// Check if any warnings were collected.
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    /// Inspect a client configuration for settings that weaken or degrade
    /// the connection without failing it.
    pub fn check_client_config(&mut self, config: &ClientConfig) {
        if matches!(config.host_trust, HostTrust::AcceptAny) {
            self.warn(Warning::insecure_host_key(format!(
                "host key of {} will not be verified",
                config.endpoint
            )));
        }

        if let Some(path) = config.key_path.as_deref().filter(|p| load_key_file(p).is_none()) {
            self.warn(Warning::key_ignored(format!(
                "private key {} could not be loaded and will be skipped",
                path.display()
            )));
        }
    }
}

/// A non-fatal warning collected during a remote run.
#[derive(Debug, Clone)]
pub struct Warning {
    pub kind: WarningKind,
    pub message: String,
}

impl Warning {
    /// Create a warning for disabled host key checking.
    pub fn insecure_host_key(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::InsecureHostKey,
            message: message.into(),
        }
    }

    /// Create a warning for an unusable private key file.
    pub fn key_ignored(message: impl Into<String>) -> Self {
        Self {
            kind: WarningKind::KeyIgnored,
            message: message.into(),
        }
    }
}

/// Categories of warnings that can occur during a remote run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningKind {
    /// Host key verification is turned off.
    InsecureHostKey,
    /// Configured private key is missing, encrypted or malformed.
    KeyIgnored,
}
