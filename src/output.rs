// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON output modes.

use crate::ssh::{CommandOutput, ExitStatus};
use serde::Serialize;
use std::io::Write;
use std::time::Instant;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (only remote output and errors)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
///
/// Remote stdout is the only thing written to stdout in normal and quiet
/// modes, so progress and warnings go to stderr.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    /// Get elapsed time since timer started.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    fn duration_secs(&self) -> Option<f64> {
        self.start_time.map(|_| self.elapsed_secs())
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            eprintln!("{message}");
        }
    }

    /// Print a warning (suppressed in quiet mode).
    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => eprintln!("Warning: {message}"),
            OutputMode::Quiet => {}
            OutputMode::Json => self.emit_stderr(&JsonEvent {
                event: "warning",
                message,
                duration_secs: None,
            }),
        }
    }

    /// Print a plain result line, such as a list entry.
    pub fn line(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => println!("{message}"),
            OutputMode::Json => self.emit_stdout(&JsonEvent {
                event: "item",
                message,
                duration_secs: None,
            }),
        }
    }

    /// Print a success message with optional timing.
    pub fn success(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => {
                let elapsed = self.elapsed_secs();
                if elapsed > 0.0 {
                    eprintln!("{message} ({:.1}s)", elapsed);
                } else {
                    eprintln!("{message}");
                }
            }
            OutputMode::Quiet => {}
            OutputMode::Json => self.emit_stdout(&JsonEvent {
                event: "success",
                message,
                duration_secs: self.duration_secs(),
            }),
        }
    }

    /// Print the captured output of a remote command.
    pub fn command_output(&self, host: &str, output: &CommandOutput) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                // Remote bytes are passed through unchanged
                let _ = std::io::stdout().write_all(&output.stdout);
                let _ = std::io::stdout().flush();
                let _ = std::io::stderr().write_all(&output.stderr);
            }
            OutputMode::Json => {
                let (exit_code, signal) = match &output.exit {
                    ExitStatus::Code(code) => (Some(*code), None),
                    ExitStatus::Signal(name) => (None, Some(name.as_str())),
                };
                self.emit_stdout(&CommandEvent {
                    event: "command_output",
                    host,
                    exit_code,
                    signal,
                    stdout: output.stdout_lossy(),
                    stderr: output.stderr_lossy(),
                    duration_secs: self.duration_secs(),
                });
            }
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => {
                eprintln!("Error: {message}");
            }
            OutputMode::Json => self.emit_stderr(&JsonEvent {
                event: "error",
                message,
                duration_secs: self.duration_secs(),
            }),
        }
    }

    fn emit_stdout(&self, event: &impl Serialize) {
        if let Ok(json) = serde_json::to_string(event) {
            println!("{json}");
        }
    }

    fn emit_stderr(&self, event: &impl Serialize) {
        if let Ok(json) = serde_json::to_string(event) {
            eprintln!("{json}");
        }
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}

#[derive(Serialize)]
struct CommandEvent<'a> {
    event: &'a str,
    host: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    exit_code: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    signal: Option<&'a str>,
    stdout: String,
    stderr: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}
