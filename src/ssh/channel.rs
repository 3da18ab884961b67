// ABOUTME: Session channels: one remote command per channel, stdout/stderr captured separately.
// ABOUTME: The channel is always closed when a run finishes, fails, or times out.

use super::error::CommandError;
use async_trait::async_trait;
use bytes::Bytes;
use russh::ChannelMsg;
use russh::client::Msg;
use std::fmt;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;

/// How a remote process ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitStatus {
    Code(u32),
    Signal(String),
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExitStatus::Code(code) => write!(f, "exit code {}", code),
            ExitStatus::Signal(signal) => write!(f, "signal {}", signal),
        }
    }
}

/// Output from a remote command execution.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub exit: ExitStatus,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit == ExitStatus::Code(0)
    }

    pub fn exit_code(&self) -> Option<u32> {
        match self.exit {
            ExitStatus::Code(code) => Some(code),
            ExitStatus::Signal(_) => None,
        }
    }

    pub fn stdout_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    pub fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    /// Stdout on success; otherwise an error carrying the exit status and stderr.
    pub fn into_stdout(self) -> Result<String, CommandError> {
        let stderr = self.stderr_lossy();
        match self.exit {
            ExitStatus::Code(0) => Ok(self.stdout_lossy()),
            ExitStatus::Code(status) => Err(CommandError::Exited { status, stderr }),
            ExitStatus::Signal(signal) => Err(CommandError::Signaled { signal, stderr }),
        }
    }
}

/// Events a session channel delivers while a command runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Stdout(Bytes),
    Stderr(Bytes),
    ExitStatus(u32),
    ExitSignal(String),
    ExecAccepted,
    ExecRejected,
    Eof,
    Closed,
}

/// Low-level I/O of one session channel.
#[async_trait]
pub trait ChannelIo: Send {
    async fn exec(&mut self, command: &str) -> Result<(), CommandError>;

    /// Next event, or None once the channel is gone.
    async fn next_event(&mut self) -> Option<ChannelEvent>;

    async fn close(&mut self);
}

#[derive(Default)]
struct OutputSink {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
}

impl OutputSink {
    fn stderr_lossy(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }
}

/// A session channel bound to one connection.
pub struct Channel {
    io: Box<dyn ChannelIo>,
    // Held for the channel's lifetime under serialized multiplexing.
    _permit: Option<OwnedMutexGuard<()>>,
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Channel")
            .field("serialized", &self._permit.is_some())
            .finish()
    }
}

impl Channel {
    pub fn new(io: Box<dyn ChannelIo>, permit: Option<OwnedMutexGuard<()>>) -> Self {
        Self {
            io,
            _permit: permit,
        }
    }

    /// Run `command` and collect its output.
    ///
    /// A non-zero exit is returned as data, not as an error. The channel is
    /// closed before this returns, whatever the outcome.
    pub async fn run(
        mut self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, CommandError> {
        let mut sink = OutputSink::default();

        let result = match timeout {
            Some(after) => {
                let outcome = tokio::time::timeout(after, self.collect(command, &mut sink)).await;
                match outcome {
                    Ok(result) => result,
                    Err(_) => Err(CommandError::Timeout {
                        after,
                        stderr: sink.stderr_lossy(),
                    }),
                }
            }
            None => self.collect(command, &mut sink).await,
        };

        self.io.close().await;

        let exit = result?;
        tracing::debug!(
            "Command finished with {} ({} bytes stdout, {} bytes stderr)",
            exit,
            sink.stdout.len(),
            sink.stderr.len()
        );
        Ok(CommandOutput {
            exit,
            stdout: sink.stdout,
            stderr: sink.stderr,
        })
    }

    async fn collect(
        &mut self,
        command: &str,
        sink: &mut OutputSink,
    ) -> Result<ExitStatus, CommandError> {
        self.io.exec(command).await?;

        let mut exit = None;
        let mut got_eof = false;

        loop {
            match self.io.next_event().await {
                Some(ChannelEvent::Stdout(data)) => sink.stdout.extend_from_slice(&data),
                Some(ChannelEvent::Stderr(data)) => sink.stderr.extend_from_slice(&data),
                Some(ChannelEvent::ExitStatus(code)) => {
                    exit = Some(ExitStatus::Code(code));
                    if got_eof {
                        break;
                    }
                }
                Some(ChannelEvent::ExitSignal(signal)) => {
                    exit = Some(ExitStatus::Signal(signal));
                    if got_eof {
                        break;
                    }
                }
                Some(ChannelEvent::Eof) => {
                    got_eof = true;
                    if exit.is_some() {
                        break;
                    }
                }
                Some(ChannelEvent::ExecRejected) => {
                    return Err(CommandError::Start(
                        "remote host refused to run the command".to_string(),
                    ));
                }
                Some(ChannelEvent::ExecAccepted) => {}
                Some(ChannelEvent::Closed) => {
                    // The remote closed the channel cleanly; the link itself is fine
                    return exit.ok_or_else(|| CommandError::NoExitStatus {
                        stderr: sink.stderr_lossy(),
                    });
                }
                None => break,
            }
        }

        // The channel vanished without a close: the link dropped under us
        exit.ok_or_else(|| CommandError::Transport {
            reason: "connection lost before the command finished".to_string(),
            stderr: sink.stderr_lossy(),
        })
    }
}

/// Plain signal name as sent on the wire, without the "SIG" prefix.
fn signal_name(sig: &russh::Sig) -> String {
    use russh::Sig;
    match sig {
        Sig::ABRT => "ABRT".to_string(),
        Sig::ALRM => "ALRM".to_string(),
        Sig::FPE => "FPE".to_string(),
        Sig::HUP => "HUP".to_string(),
        Sig::ILL => "ILL".to_string(),
        Sig::INT => "INT".to_string(),
        Sig::KILL => "KILL".to_string(),
        Sig::PIPE => "PIPE".to_string(),
        Sig::QUIT => "QUIT".to_string(),
        Sig::SEGV => "SEGV".to_string(),
        Sig::TERM => "TERM".to_string(),
        Sig::USR1 => "USR1".to_string(),
        Sig::Custom(name) => name.clone(),
    }
}

/// [`ChannelIo`] over a russh session channel.
pub(crate) struct RusshChannel {
    inner: russh::Channel<Msg>,
}

impl RusshChannel {
    pub(crate) fn new(inner: russh::Channel<Msg>) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl ChannelIo for RusshChannel {
    async fn exec(&mut self, command: &str) -> Result<(), CommandError> {
        tracing::debug!("Executing remote command: {}", command);
        self.inner
            .exec(true, command)
            .await
            .map_err(|e| CommandError::Start(format!("failed to exec command: {}", e)))
    }

    async fn next_event(&mut self) -> Option<ChannelEvent> {
        loop {
            let event = match self.inner.wait().await? {
                ChannelMsg::Data { data } => ChannelEvent::Stdout(Bytes::copy_from_slice(&data)),
                // Extended data type 1 is stderr
                ChannelMsg::ExtendedData { data, ext: 1 } => {
                    ChannelEvent::Stderr(Bytes::copy_from_slice(&data))
                }
                ChannelMsg::ExitStatus { exit_status } => ChannelEvent::ExitStatus(exit_status),
                ChannelMsg::ExitSignal { signal_name: sig, .. } => {
                    ChannelEvent::ExitSignal(signal_name(&sig))
                }
                ChannelMsg::Success => ChannelEvent::ExecAccepted,
                ChannelMsg::Failure => ChannelEvent::ExecRejected,
                ChannelMsg::Eof => ChannelEvent::Eof,
                ChannelMsg::Close => ChannelEvent::Closed,
                _ => continue,
            };
            return Some(event);
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.inner.close().await {
            tracing::debug!("Channel close failed: {}", e);
        }
    }
}
