//! Connection profile types
//!
//! A [`ConnectionProfile`] is everything the launcher needs to open one
//! session: where to connect, as whom, and which secret (if any) to feed
//! the interactive prompts.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{LaunchError, Result};

/// Default SSH port
pub const DEFAULT_PORT: u16 = 22;

/// Suffix of OpenSSH public key files
const PUBLIC_KEY_SUFFIX: &str = ".pub";

/// How the session authenticates
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMethod {
    /// Password authentication. An empty password means "no stored secret".
    Password { password: String },

    /// Private key authentication with an optional key passphrase
    Key {
        path: PathBuf,
        passphrase: Option<String>,
    },
}

impl AuthMethod {
    /// Secret that has to be typed into a prompt, if any.
    ///
    /// Empty passwords and passphrases count as absent.
    pub fn secret(&self) -> Option<&str> {
        let secret = match self {
            AuthMethod::Password { password } => Some(password.as_str()),
            AuthMethod::Key { passphrase, .. } => passphrase.as_deref(),
        };
        secret.filter(|s| !s.is_empty())
    }

    /// Which prompt family the secret answers
    pub fn prompt_kind(&self) -> PromptKind {
        match self {
            AuthMethod::Password { .. } => PromptKind::Password,
            AuthMethod::Key { .. } => PromptKind::KeyPassphrase,
        }
    }
}

impl fmt::Debug for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMethod::Password { password } => f
                .debug_struct("Password")
                .field("password", &redacted(password))
                .finish(),
            AuthMethod::Key { path, passphrase } => f
                .debug_struct("Key")
                .field("path", path)
                .field("passphrase", &passphrase.as_deref().map(redacted))
                .finish(),
        }
    }
}

fn redacted(secret: &str) -> &'static str {
    if secret.is_empty() {
        "<empty>"
    } else {
        "<redacted>"
    }
}

/// Prompt family matched by the automation scripts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Password,
    KeyPassphrase,
}

/// Stored SSH server profile handed to the launcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionProfile {
    /// Opaque identifier assigned by the profile store
    pub id: String,

    /// Display name
    pub name: String,

    /// Remote hostname or IP address
    pub host: String,

    /// SSH port (default: 22)
    pub port: u16,

    /// Username for authentication
    pub username: String,

    /// Authentication mode and its material
    pub auth: AuthMethod,

    /// Group the profile belongs to, if any
    pub group_id: Option<String>,
}

impl ConnectionProfile {
    /// Create a password profile with an empty password
    pub fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        let host = host.into();
        Self {
            id: String::new(),
            name: host.clone(),
            host,
            port: DEFAULT_PORT,
            username: username.into(),
            auth: AuthMethod::Password {
                password: String::new(),
            },
            group_id: None,
        }
    }

    /// Set the identifier
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the display name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Set the SSH port
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Use password authentication
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.auth = AuthMethod::Password {
            password: password.into(),
        };
        self
    }

    /// Use key authentication
    pub fn with_key(mut self, path: impl Into<PathBuf>, passphrase: Option<String>) -> Self {
        self.auth = AuthMethod::Key {
            path: path.into(),
            passphrase,
        };
        self
    }

    /// Set the group
    pub fn with_group(mut self, group_id: impl Into<String>) -> Self {
        self.group_id = Some(group_id.into());
        self
    }

    /// Check the fields the launcher cannot work without.
    pub fn validate(&self) -> Result<()> {
        let mut missing = Vec::new();

        if self.host.trim().is_empty() {
            missing.push("host");
        }
        if self.username.trim().is_empty() {
            missing.push("username");
        }
        if !missing.is_empty() {
            return Err(LaunchError::invalid_profile(format!(
                "missing required {}",
                missing.join(" and ")
            )));
        }

        if self.port == 0 {
            return Err(LaunchError::invalid_profile("port must be in 1-65535"));
        }

        Ok(())
    }

    /// Private key path with a trailing `.pub` stripped, when key auth is used
    /// and a path was given.
    pub fn identity_file(&self) -> Option<PathBuf> {
        match &self.auth {
            AuthMethod::Key { path, .. } if !path.as_os_str().is_empty() => {
                Some(normalize_key_path(path))
            }
            _ => None,
        }
    }

    /// `user@host` destination
    pub fn destination(&self) -> String {
        format!("{}@{}", self.username, self.host)
    }
}

/// Point a key path at the private key when it names the `.pub` half.
///
/// Only one suffix is removed: `id.pub.pub` becomes `id.pub`.
///
/// # Examples
/// ```
/// use std::path::{Path, PathBuf};
/// use ssh_bootstrap::ssh::profile::normalize_key_path;
///
/// assert_eq!(
///     normalize_key_path(Path::new("/home/u/.ssh/id_rsa.pub")),
///     PathBuf::from("/home/u/.ssh/id_rsa")
/// );
/// ```
pub fn normalize_key_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match raw.strip_suffix(PUBLIC_KEY_SUFFIX) {
        Some(stripped) if !stripped.is_empty() => {
            tracing::debug!("Key path pointed at public key, using {}", stripped);
            PathBuf::from(stripped)
        }
        _ => path.to_path_buf(),
    }
}
