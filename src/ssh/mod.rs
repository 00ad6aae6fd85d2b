//! SSH session bootstrapping
//!
//! This module turns a stored server profile into one interactive `ssh`
//! session, typing the stored secret into the client's prompts without
//! showing it to the user.

pub mod invocation;
pub mod launcher;
pub mod profile;
pub mod script;
pub mod sink;
pub mod staging;
pub mod strategy;

// Re-exports
pub use invocation::{escape_for_shell, ShellDialect, SshInvocation};
pub use launcher::{
    ConsoleObserver, FallbackReason, LaunchObserver, LaunchReport, LaunchSettings,
    PlainFallbackNotice, SessionLauncher, SessionSummary,
};
pub use profile::{normalize_key_path, AuthMethod, ConnectionProfile, PromptKind};
pub use script::{AutomationScript, ScriptBuilder};
pub use sink::{InteractiveCommandSink, MemorySink, PrintSink, ShellSink};
pub use staging::{schedule_cleanup, ArtifactHandle, ArtifactKind, OwnerOnly, SecretStaging};
pub use strategy::{
    select_strategy, AutomationTool, PlatformFamily, PlatformStrategy, ShellProbe,
    ToolAvailability, ToolProbe,
};
