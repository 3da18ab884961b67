// ABOUTME: Blocking wrapper around the async client for synchronous callers.
// ABOUTME: Owns a current-thread tokio runtime and drives each call to completion.

use super::channel::CommandOutput;
use super::client::{Client as AsyncClient, ClientConfig};
use super::connection::{Connector, SshConnector};
use super::error::Result;
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};

/// Blocking remote execution client.
///
/// Must not be used from inside an async runtime; use [`AsyncClient`] there.
pub struct Client<C = SshConnector> {
    runtime: Runtime,
    inner: AsyncClient<C>,
}

impl Client<SshConnector> {
    pub fn new(config: ClientConfig) -> std::io::Result<Self> {
        Self::with_connector(config, SshConnector)
    }
}

impl<C: Connector> Client<C> {
    pub fn with_connector(config: ClientConfig, connector: C) -> std::io::Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        Ok(Self {
            runtime,
            inner: AsyncClient::with_connector(config, connector),
        })
    }

    pub fn exec(&self, command: &str) -> Result<CommandOutput> {
        self.runtime.block_on(self.inner.exec(command))
    }

    pub fn run_command(&self, command: &str) -> Result<String> {
        self.runtime.block_on(self.inner.run_command(command))
    }

    pub fn run_command_with_timeout(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<String> {
        self.runtime
            .block_on(self.inner.run_command_with_timeout(command, timeout))
    }

    pub fn is_connected(&self) -> bool {
        self.runtime.block_on(self.inner.is_connected())
    }

    pub fn close(&self) {
        self.runtime.block_on(self.inner.close())
    }
}
