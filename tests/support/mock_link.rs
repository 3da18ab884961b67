// ABOUTME: In-memory Connector, Link and ChannelIo implementations for client tests.
// ABOUTME: Counts connects, disconnects and overlapping channels; can simulate a dropped link.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use sshrun::ssh::{
    AuthError, ChannelError, ChannelEvent, ChannelIo, ClientConfig, CommandError, ConnectError,
    Connection, Connector, Link,
};
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

/// Counters shared by every link a [`MockConnector`] hands out.
#[derive(Debug, Default)]
pub struct LinkStats {
    connects: AtomicUsize,
    disconnects: AtomicUsize,
    channels: AtomicUsize,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl LinkStats {
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    pub fn channels(&self) -> usize {
        self.channels.load(Ordering::SeqCst)
    }

    /// Largest number of channels that were open at the same time.
    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }

    fn channel_opened(&self) {
        self.channels.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);
    }

    fn channel_closed(&self) {
        self.active.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Hands out in-memory links. Clones share the same stats.
#[derive(Clone, Default)]
pub struct MockConnector {
    stats: Arc<LinkStats>,
    current: Arc<Mutex<Option<Arc<AtomicBool>>>>,
    reject_auth: bool,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every connection attempt fails authentication.
    pub fn rejecting_auth() -> Self {
        Self {
            reject_auth: true,
            ..Self::default()
        }
    }

    pub fn stats(&self) -> Arc<LinkStats> {
        Arc::clone(&self.stats)
    }

    /// Drop the most recent link as if the network went away.
    pub fn drop_link(&self) {
        if let Some(closed) = self.current.lock().as_ref() {
            closed.store(true, Ordering::SeqCst);
        }
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn connect(&self, config: &ClientConfig) -> Result<Connection, ConnectError> {
        if self.reject_auth {
            return Err(AuthError::AllMethodsFailed { attempted: 1 }.into());
        }

        self.stats.connects.fetch_add(1, Ordering::SeqCst);
        let closed = Arc::new(AtomicBool::new(false));
        *self.current.lock() = Some(Arc::clone(&closed));

        let link = MockLink {
            stats: Arc::clone(&self.stats),
            closed,
        };
        Ok(Connection::new(
            Box::new(link),
            config.endpoint.clone(),
            config.multiplex,
        ))
    }
}

struct MockLink {
    stats: Arc<LinkStats>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl Link for MockLink {
    async fn open_channel(&self) -> Result<Box<dyn ChannelIo>, ChannelError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ChannelError::OpenFailed("link is down".to_string()));
        }
        self.stats.channel_opened();
        Ok(Box::new(MockChannel {
            stats: Arc::clone(&self.stats),
            link_closed: Arc::clone(&self.closed),
            events: VecDeque::new(),
            delay: Duration::ZERO,
            hang: false,
            closed: false,
        }))
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn disconnect(&self) {
        self.stats.disconnects.fetch_add(1, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Scripted channel. Understands:
///
/// - `echo <text>` / `slow-echo <text>`
/// - `fail`: "permission denied" on stderr, status 2
/// - `no-status`: output, then a clean close without an exit status
/// - `drop`: partial stderr, then the link goes away without an exit status
/// - `hang`: never answers
/// - `reject`: the remote side refuses the exec request
struct MockChannel {
    stats: Arc<LinkStats>,
    link_closed: Arc<AtomicBool>,
    events: VecDeque<ChannelEvent>,
    delay: Duration,
    hang: bool,
    closed: bool,
}

fn finished(stdout: &str, stderr: &str, status: u32) -> VecDeque<ChannelEvent> {
    let mut events = VecDeque::from([ChannelEvent::ExecAccepted]);
    if !stdout.is_empty() {
        events.push_back(ChannelEvent::Stdout(Bytes::copy_from_slice(stdout.as_bytes())));
    }
    if !stderr.is_empty() {
        events.push_back(ChannelEvent::Stderr(Bytes::copy_from_slice(stderr.as_bytes())));
    }
    events.extend([
        ChannelEvent::ExitStatus(status),
        ChannelEvent::Eof,
        ChannelEvent::Closed,
    ]);
    events
}

#[async_trait]
impl ChannelIo for MockChannel {
    async fn exec(&mut self, command: &str) -> Result<(), CommandError> {
        self.events = if let Some(text) = command.strip_prefix("echo ") {
            finished(&format!("{text}\n"), "", 0)
        } else if let Some(text) = command.strip_prefix("slow-echo ") {
            self.delay = Duration::from_millis(50);
            finished(&format!("{text}\n"), "", 0)
        } else {
            match command {
                "fail" => finished("", "permission denied\n", 2),
                "no-status" => VecDeque::from([
                    ChannelEvent::ExecAccepted,
                    ChannelEvent::Stdout(Bytes::from_static(b"out\n")),
                    ChannelEvent::Eof,
                    ChannelEvent::Closed,
                ]),
                "drop" => VecDeque::from([
                    ChannelEvent::ExecAccepted,
                    ChannelEvent::Stderr(Bytes::from_static(b"partial")),
                ]),
                "hang" => {
                    self.hang = true;
                    VecDeque::new()
                }
                "reject" => VecDeque::from([ChannelEvent::ExecRejected]),
                other => finished("", &format!("{other}: not found\n"), 127),
            }
        };
        Ok(())
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        if self.hang {
            futures::future::pending::<()>().await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(std::mem::take(&mut self.delay)).await;
        }
        let event = self.events.pop_front();
        if event.is_none() && !self.closed {
            // Script ran out before an exit status: the link is gone
            self.link_closed.store(true, Ordering::SeqCst);
        }
        event
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.stats.channel_closed();
        }
    }
}
