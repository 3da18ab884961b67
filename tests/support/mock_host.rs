// ABOUTME: In-process SSH server for integration tests.
// ABOUTME: Runs scripted commands and counts connections, logins and channels.

use russh::keys::{decode_secret_key, ssh_key};
use russh::server::{self, Auth, Msg, Session};
use russh::{Channel, ChannelId, CryptoVec};
use sshrun::ssh::{ClientConfig, HostTrust};
use sshrun::types::Endpoint;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

pub const TEST_USER: &str = "testuser";
pub const TEST_PASSWORD: &str = "testpass";

const HOST_KEY: &str = include_str!("../fixtures/host_key");
const CLIENT_KEY_PUB: &str = include_str!("../fixtures/client_key.pub");

/// Counters shared between the mock host and the test.
#[derive(Debug, Default)]
pub struct HostStats {
    connections: AtomicUsize,
    logins: AtomicUsize,
    rejected_logins: AtomicUsize,
    commands: AtomicUsize,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl HostStats {
    pub fn connections(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub fn logins(&self) -> usize {
        self.logins.load(Ordering::SeqCst)
    }

    pub fn rejected_logins(&self) -> usize {
        self.rejected_logins.load(Ordering::SeqCst)
    }

    pub fn commands(&self) -> usize {
        self.commands.load(Ordering::SeqCst)
    }

    /// Largest number of commands that were running at the same time.
    pub fn max_running(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }

    fn command_started(&self) {
        self.commands.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
    }

    fn command_finished(&self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

/// How a scripted command behaves.
enum Script {
    Reply {
        delay: Duration,
        stdout: String,
        stderr: String,
        /// None closes the channel without sending an exit status.
        status: Option<u32>,
    },
    /// Never answers; the client has to give up.
    Hang,
}

/// Commands the mock host understands:
///
/// - `echo <text>`: prints text and a newline
/// - `slow-echo <text>`: same, after a short delay
/// - `cat /root/secret`: "permission denied" on stderr, status 2
/// - `warn`: output on both streams, status 0
/// - `warn-fail`: output on both streams, status 3
/// - `no-status`: prints output, then closes without an exit status
/// - `sleep forever`: never finishes
/// - anything else: "command not found", status 127
fn script(command: &str) -> Script {
    let reply = |delay: u64, stdout: String, stderr: &str, status| Script::Reply {
        delay: Duration::from_millis(delay),
        stdout,
        stderr: stderr.to_string(),
        status: Some(status),
    };

    if let Some(text) = command.strip_prefix("echo ") {
        return reply(0, format!("{text}\n"), "", 0);
    }
    if let Some(text) = command.strip_prefix("slow-echo ") {
        return reply(100, format!("{text}\n"), "", 0);
    }
    match command {
        "cat /root/secret" => reply(0, String::new(), "cat: /root/secret: permission denied\n", 2),
        "warn" => reply(0, "done\n".to_string(), "warning: disk almost full\n", 0),
        "warn-fail" => reply(0, "partial\n".to_string(), "write error: disk full\n", 3),
        "no-status" => Script::Reply {
            delay: Duration::ZERO,
            stdout: "out\n".to_string(),
            stderr: String::new(),
            status: None,
        },
        "sleep forever" => Script::Hang,
        other => reply(0, String::new(), &format!("sh: {other}: command not found\n"), 127),
    }
}

struct MockHandler {
    stats: Arc<HostStats>,
    authorized_key: ssh_key::PublicKey,
}

impl server::Handler for MockHandler {
    type Error = russh::Error;

    async fn auth_password(&mut self, user: &str, password: &str) -> Result<Auth, Self::Error> {
        Ok(self.decide(user == TEST_USER && password == TEST_PASSWORD))
    }

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &ssh_key::PublicKey,
    ) -> Result<Auth, Self::Error> {
        Ok(self.decide(user == TEST_USER && public_key.key_data() == self.authorized_key.key_data()))
    }

    async fn channel_open_session(
        &mut self,
        _channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        Ok(true)
    }

    async fn exec_request(
        &mut self,
        channel: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let command = String::from_utf8_lossy(data).into_owned();
        tracing::debug!("mock host exec: {}", command);

        let _ = session.channel_success(channel);
        let handle = session.handle();
        let stats = Arc::clone(&self.stats);
        stats.command_started();

        // Replies go through the handle so the session loop keeps running
        tokio::spawn(async move {
            let Script::Reply {
                delay,
                stdout,
                stderr,
                status,
            } = script(&command)
            else {
                return;
            };

            tokio::time::sleep(delay).await;
            if !stdout.is_empty() {
                let _ = handle
                    .data(channel, CryptoVec::from_slice(stdout.as_bytes()))
                    .await;
            }
            if !stderr.is_empty() {
                let _ = handle
                    .extended_data(channel, 1, CryptoVec::from_slice(stderr.as_bytes()))
                    .await;
            }
            stats.command_finished();
            if let Some(status) = status {
                let _ = handle.exit_status_request(channel, status).await;
            }
            let _ = handle.eof(channel).await;
            let _ = handle.close(channel).await;
        });

        Ok(())
    }
}

impl MockHandler {
    fn decide(&self, accepted: bool) -> Auth {
        if accepted {
            self.stats.logins.fetch_add(1, Ordering::SeqCst);
            Auth::Accept
        } else {
            self.stats.rejected_logins.fetch_add(1, Ordering::SeqCst);
            Auth::Reject {
                proceed_with_methods: None,
                partial_success: false,
            }
        }
    }
}

/// A running mock SSH host bound to a random local port.
pub struct MockHost {
    addr: SocketAddr,
    stats: Arc<HostStats>,
    accept_task: JoinHandle<()>,
}

impl MockHost {
    pub async fn start() -> Self {
        let host_key = decode_secret_key(HOST_KEY, None).expect("host key fixture should parse");
        let authorized_key = ssh_key::PublicKey::from_openssh(CLIENT_KEY_PUB.trim())
            .expect("client public key fixture should parse");

        let config = Arc::new(server::Config {
            keys: vec![host_key],
            auth_rejection_time: Duration::from_millis(10),
            auth_rejection_time_initial: Some(Duration::from_secs(0)),
            inactivity_timeout: Some(Duration::from_secs(30)),
            ..Default::default()
        });

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind should succeed");
        let addr = listener.local_addr().expect("listener has an address");
        let stats = Arc::new(HostStats::default());

        let accept_stats = Arc::clone(&stats);
        let accept_task = tokio::spawn(async move {
            while let Ok((socket, _)) = listener.accept().await {
                accept_stats.connections.fetch_add(1, Ordering::SeqCst);
                let handler = MockHandler {
                    stats: Arc::clone(&accept_stats),
                    authorized_key: authorized_key.clone(),
                };
                let config = Arc::clone(&config);
                tokio::spawn(async move {
                    match server::run_stream(config, socket, handler).await {
                        Ok(session) => {
                            if let Err(e) = session.await {
                                tracing::debug!("mock host session ended: {}", e);
                            }
                        }
                        Err(e) => tracing::debug!("mock host handshake failed: {}", e),
                    }
                });
            }
        });

        MockHost {
            addr,
            stats,
            accept_task,
        }
    }

    pub fn endpoint(&self) -> Endpoint {
        Endpoint::new(self.addr.ip().to_string(), self.addr.port()).expect("valid endpoint")
    }

    pub fn stats(&self) -> &HostStats {
        &self.stats
    }

    /// Client config with password auth and host keys accepted unchecked.
    pub fn password_config(&self) -> ClientConfig {
        ClientConfig::new(self.endpoint(), TEST_USER)
            .password(TEST_PASSWORD)
            .host_trust(HostTrust::AcceptAny)
            .connect_timeout(Some(Duration::from_secs(10)))
            .command_timeout(Some(Duration::from_secs(10)))
    }

    /// Client config with only a private key file.
    pub fn key_config(&self) -> ClientConfig {
        ClientConfig::new(self.endpoint(), TEST_USER)
            .key_path(super::fixture("client_key"))
            .host_trust(HostTrust::AcceptAny)
            .connect_timeout(Some(Duration::from_secs(10)))
            .command_timeout(Some(Duration::from_secs(10)))
    }
}

impl Drop for MockHost {
    fn drop(&mut self) {
        self.accept_task.abort();
    }
}
