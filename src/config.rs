//! Configuration and CLI argument parsing for ssh-bootstrap

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{LaunchError, Result};
use crate::ssh::launcher::LaunchSettings;
use crate::ssh::profile::ConnectionProfile;
use crate::ssh::strategy::PlatformFamily;
use crate::store::ProfileStore;

/// Default prompt timeout in seconds
pub const DEFAULT_PROMPT_TIMEOUT_SECS: u64 = 30;

/// Default delay before staged files are deleted, in seconds
pub const DEFAULT_CLEANUP_DELAY_SECS: u64 = 10;

/// Bounds accepted for the prompt timeout
const PROMPT_TIMEOUT_RANGE: std::ops::RangeInclusive<u64> = 1..=600;

/// ssh-bootstrap CLI Arguments
#[derive(Parser, Debug, Clone)]
#[command(name = "ssh-bootstrap")]
#[command(version)]
#[command(about = "Open an interactive SSH session and type the stored secret for you")]
pub struct Args {
    /// SSH host to connect to
    #[arg(long, env = "SSHB_HOST")]
    pub host: Option<String>,

    /// SSH port
    #[arg(long, default_value = "22", env = "SSHB_PORT")]
    pub port: u16,

    /// SSH username
    #[arg(long, env = "SSHB_USER")]
    pub user: Option<String>,

    /// Display name for the session
    #[arg(long)]
    pub name: Option<String>,

    /// SSH password
    #[arg(long, env = "SSHB_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Path to SSH private key file (a `.pub` path is accepted)
    #[arg(long, env = "SSHB_KEY")]
    pub key: Option<PathBuf>,

    /// Passphrase for the private key
    #[arg(long, env = "SSHB_PASSPHRASE", hide_env_values = true)]
    pub passphrase: Option<String>,

    /// JSON file of saved servers and groups
    #[arg(long, env = "SSHB_PROFILES")]
    pub profiles: Option<PathBuf>,

    /// Server id or name from the profile file
    #[arg(long)]
    pub server: Option<String>,

    /// List the servers in the profile file and exit
    #[arg(long, default_value = "false")]
    pub list: bool,

    /// Platform to generate commands for (default: detected)
    #[arg(long, env = "SSHB_PLATFORM")]
    pub platform: Option<String>,

    /// Seconds to wait for a credential prompt
    #[arg(long, default_value = "30", env = "SSHB_EXPECT_TIMEOUT")]
    pub expect_timeout: u64,

    /// Seconds before staged scripts are deleted
    #[arg(long, default_value = "10", env = "SSHB_CLEANUP_DELAY")]
    pub cleanup_delay: u64,

    /// Directory for staged scripts (default: system temp dir)
    #[arg(long, env = "SSHB_TEMP_DIR")]
    pub temp_dir: Option<PathBuf>,

    /// Print the session commands instead of running them
    #[arg(long, default_value = "false")]
    pub dry_run: bool,
}

/// What the binary was asked to do
#[derive(Debug, Clone)]
pub enum Action {
    /// Print the servers of a profile file
    List(ProfileStore),
    /// Open a session
    Connect(ConnectionProfile),
}

/// Parsed and validated configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub action: Action,
    pub settings: LaunchSettings,
    pub dry_run: bool,
}

impl Config {
    /// Create Config from CLI Args
    pub fn from_args(args: Args) -> Result<Self> {
        validate_args(&args)?;

        let settings = launch_settings(&args)?;
        let action = if args.list {
            Action::List(load_store(&args)?)
        } else {
            Action::Connect(resolve_profile(&args)?)
        };

        Ok(Config {
            action,
            settings,
            dry_run: args.dry_run,
        })
    }
}

/// Validate CLI arguments
fn validate_args(args: &Args) -> Result<()> {
    let mut errors = Vec::new();

    let inline = args.host.is_some() || args.user.is_some();

    if args.list {
        if args.profiles.is_none() {
            errors.push("--list requires --profiles".to_string());
        }
    } else if args.server.is_some() {
        if args.profiles.is_none() {
            errors.push("--server requires --profiles".to_string());
        }
        if inline {
            errors.push("Use either --server or --host/--user, not both".to_string());
        }
    } else {
        if args.host.as_deref().map_or(true, |h| h.trim().is_empty()) {
            errors.push("Missing required --host (or --server)".to_string());
        }
        if args.user.as_deref().map_or(true, |u| u.trim().is_empty()) {
            errors.push("Missing required --user (or --server)".to_string());
        }
        if args.password.is_some() && args.key.is_some() {
            errors.push("Use either --password or --key, not both".to_string());
        }
        if args.passphrase.is_some() && args.key.is_none() {
            errors.push("--passphrase requires --key".to_string());
        }
    }

    if args.port == 0 {
        errors.push("--port must be in 1-65535".to_string());
    }

    if !PROMPT_TIMEOUT_RANGE.contains(&args.expect_timeout) {
        errors.push(format!(
            "--expect-timeout must be between {} and {} seconds",
            PROMPT_TIMEOUT_RANGE.start(),
            PROMPT_TIMEOUT_RANGE.end()
        ));
    }

    if let Some(ref platform) = args.platform {
        if let Err(e) = platform.parse::<PlatformFamily>() {
            errors.push(e);
        }
    }

    if !errors.is_empty() {
        return Err(LaunchError::Config(format!(
            "Configuration error:\n{}",
            errors.join("\n")
        )));
    }

    Ok(())
}

fn launch_settings(args: &Args) -> Result<LaunchSettings> {
    let platform = match args.platform {
        Some(ref p) => p.parse::<PlatformFamily>().map_err(LaunchError::config)?,
        None => PlatformFamily::current(),
    };

    Ok(LaunchSettings {
        platform,
        prompt_timeout: Duration::from_secs(args.expect_timeout),
        cleanup_delay: Duration::from_secs(args.cleanup_delay),
        temp_dir: args.temp_dir.clone().unwrap_or_else(std::env::temp_dir),
    })
}

fn load_store(args: &Args) -> Result<ProfileStore> {
    let path = args
        .profiles
        .as_ref()
        .ok_or_else(|| LaunchError::config("No profile file given"))?;
    ProfileStore::load(path)
}

fn resolve_profile(args: &Args) -> Result<ConnectionProfile> {
    if let Some(ref server) = args.server {
        let store = load_store(args)?;
        return store
            .find(server)
            .cloned()
            .ok_or_else(|| LaunchError::store(format!("No server with id or name '{}'", server)));
    }

    let host = args.host.clone().unwrap_or_default();
    let user = args.user.clone().unwrap_or_default();
    let mut profile = ConnectionProfile::new(host, user).with_port(args.port);

    if let Some(ref name) = args.name {
        profile = profile.with_name(name);
    }

    profile = match args.key {
        Some(ref key) => profile.with_key(key, sanitize_secret(args.passphrase.clone())),
        None => profile.with_password(sanitize_secret(args.password.clone()).unwrap_or_default()),
    };

    Ok(profile)
}

/// Sanitize a secret: return None if empty
fn sanitize_secret(secret: Option<String>) -> Option<String> {
    secret.filter(|s| !s.is_empty())
}
