//! Interactive session sinks
//!
//! The launcher's only output is text handed to an [`InteractiveCommandSink`].
//! What happens to that text (run in a local shell, printed, recorded) is up
//! to the sink.

use std::io::Write;
use std::process::{ExitStatus, Stdio};

use async_trait::async_trait;
use tracing::{debug, info};

use super::invocation::ShellDialect;
use crate::error::{LaunchError, Result};

/// Something that executes lines of text in an interactive session
#[async_trait]
pub trait InteractiveCommandSink: Send {
    /// Send one line of text to be executed in the session
    async fn send_text(&mut self, text: &str) -> Result<()>;
}

/// Collects lines and runs them in the local shell with the terminal attached
#[derive(Debug)]
pub struct ShellSink {
    dialect: ShellDialect,
    lines: Vec<String>,
}

impl ShellSink {
    pub fn new(dialect: ShellDialect) -> Self {
        Self {
            dialect,
            lines: Vec::new(),
        }
    }

    /// Lines queued so far
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Script passed to the shell
    pub fn script(&self) -> String {
        match self.dialect {
            ShellDialect::Posix => self.lines.join("\n"),
            ShellDialect::Cmd => self.lines.join(" & "),
        }
    }

    /// Run the queued lines and wait for the session to end.
    pub async fn run(self) -> Result<ExitStatus> {
        if self.lines.is_empty() {
            return Err(LaunchError::sink("Nothing to run"));
        }

        let script = self.script();
        let mut command = match self.dialect {
            ShellDialect::Posix => {
                let mut c = tokio::process::Command::new("sh");
                c.arg("-c").arg(&script);
                c
            }
            ShellDialect::Cmd => {
                let mut c = tokio::process::Command::new("cmd");
                c.arg("/C");
                push_cmd_script(&mut c, &script);
                c
            }
        };
        command
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit());

        debug!("Starting {} queued line(s) in local shell", self.lines.len());
        let status = command
            .status()
            .await
            .map_err(|e| LaunchError::sink(format!("Failed to start shell: {}", e)))?;
        info!("Session ended with {}", status);
        Ok(status)
    }
}

/// cmd.exe parses its own command line and does not understand the `\"`
/// escapes of the standard argument quoting, so the script goes in verbatim.
#[cfg(windows)]
fn push_cmd_script(command: &mut tokio::process::Command, script: &str) {
    command.raw_arg(script);
}

#[cfg(not(windows))]
fn push_cmd_script(command: &mut tokio::process::Command, script: &str) {
    command.arg(script);
}

#[async_trait]
impl InteractiveCommandSink for ShellSink {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.lines.push(text.to_string());
        Ok(())
    }
}

/// Writes each line to a writer, e.g. stdout for a dry run
pub struct PrintSink<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> PrintSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[async_trait]
impl<W: Write + Send> InteractiveCommandSink for PrintSink<W> {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        writeln!(self.out, "{}", text)?;
        self.out.flush()?;
        Ok(())
    }
}

/// Records lines in memory
#[derive(Debug, Default, Clone)]
pub struct MemorySink {
    pub lines: Vec<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl InteractiveCommandSink for MemorySink {
    async fn send_text(&mut self, text: &str) -> Result<()> {
        self.lines.push(text.to_string());
        Ok(())
    }
}
