//! Secure-shell client invocation and quoting utilities
//!
//! Builds the `ssh` argument vector for a profile and renders it for the
//! three places it ends up: a POSIX shell line, a Windows `cmd` line, and a
//! Tcl `spawn` line inside an expect script.

use std::path::PathBuf;

use super::profile::{ConnectionProfile, DEFAULT_PORT};

/// Secure-shell client binary
pub const SSH_CLIENT: &str = "ssh";

/// Host key checking is disabled for every launched session.
pub const HOST_KEY_OPTION: &str = "StrictHostKeyChecking=no";

/// Characters that never need quoting in any of the supported dialects
fn is_plain_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || "@%+=:,./_-".contains(c)
}

fn is_plain(s: &str) -> bool {
    !s.is_empty() && s.chars().all(is_plain_char)
}

/// Command language of the interactive session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellDialect {
    /// `sh`-compatible shells
    Posix,
    /// Windows `cmd.exe`
    Cmd,
}

impl ShellDialect {
    /// Quote one argument for this dialect
    pub fn quote(self, arg: &str) -> String {
        match self {
            ShellDialect::Posix => quote_posix(arg),
            ShellDialect::Cmd => quote_cmd(arg),
        }
    }
}

/// Escapes a string for safe use in single-quoted shell contexts.
///
/// Replaces single quotes with `'"'"'`: close the quote, emit a
/// double-quoted `'`, reopen.
///
/// # Examples
///
/// ```
/// use ssh_bootstrap::ssh::invocation::escape_for_shell;
///
/// assert_eq!(escape_for_shell("hello"), "hello");
/// assert_eq!(escape_for_shell("it's"), "it'\"'\"'s");
/// ```
pub fn escape_for_shell(s: &str) -> String {
    s.replace('\'', "'\"'\"'")
}

/// Quote an argument for a POSIX shell, leaving plain words untouched.
///
/// ```
/// use ssh_bootstrap::ssh::invocation::quote_posix;
///
/// assert_eq!(quote_posix("root@10.0.0.5"), "root@10.0.0.5");
/// assert_eq!(quote_posix("/tmp/my key"), "'/tmp/my key'");
/// ```
pub fn quote_posix(arg: &str) -> String {
    if is_plain(arg) {
        arg.to_string()
    } else {
        format!("'{}'", escape_for_shell(arg))
    }
}

/// Quote an argument for `cmd.exe`
pub fn quote_cmd(arg: &str) -> String {
    if is_plain(arg) {
        arg.to_string()
    } else {
        format!("\"{}\"", arg.replace('"', "\"\""))
    }
}

/// Escape a string for use inside a double-quoted Tcl word
pub fn escape_for_tcl(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' | '"' | '$' | '[' | ']' => {
                out.push('\\');
                out.push(c);
            }
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            _ => out.push(c),
        }
    }
    out
}

/// Quote an argument as a Tcl word
pub fn quote_tcl(arg: &str) -> String {
    if is_plain(arg) {
        arg.to_string()
    } else {
        format!("\"{}\"", escape_for_tcl(arg))
    }
}

/// One invocation of the secure-shell client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshInvocation {
    /// Remote port; `-p` is emitted only when it differs from 22
    pub port: u16,

    /// Private key passed with `-i`
    pub identity: Option<PathBuf>,

    /// `-o` options in emission order
    pub options: Vec<String>,

    /// `user@host`
    pub destination: String,
}

impl SshInvocation {
    /// Invocation for a profile, with host key checking disabled and the
    /// key path already normalized.
    pub fn for_profile(profile: &ConnectionProfile) -> Self {
        Self {
            port: profile.port,
            identity: profile.identity_file(),
            options: vec![HOST_KEY_OPTION.to_string()],
            destination: profile.destination(),
        }
    }

    /// Append an `-o` option
    pub fn with_option(mut self, option: impl Into<String>) -> Self {
        self.options.push(option.into());
        self
    }

    /// Arguments after the client name
    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.port != DEFAULT_PORT {
            args.push("-p".to_string());
            args.push(self.port.to_string());
        }
        if let Some(ref identity) = self.identity {
            args.push("-i".to_string());
            args.push(identity.to_string_lossy().into_owned());
        }
        for option in &self.options {
            args.push("-o".to_string());
            args.push(option.clone());
        }
        args.push(self.destination.clone());
        args
    }

    /// Render as a shell command line
    pub fn render(&self, dialect: ShellDialect) -> String {
        self.render_with(|arg| dialect.quote(arg))
    }

    /// Render as the argument list of an expect `spawn`
    pub fn render_tcl(&self) -> String {
        self.render_with(quote_tcl)
    }

    fn render_with(&self, quote: impl Fn(&str) -> String) -> String {
        let mut line = SSH_CLIENT.to_string();
        for arg in self.args() {
            line.push(' ');
            line.push_str(&quote(&arg));
        }
        line
    }
}
