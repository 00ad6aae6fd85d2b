//! ssh-bootstrap - Launch authenticated interactive SSH sessions
//!
//! Given a stored server profile, this crate opens one interactive `ssh`
//! session and answers the client's password or key passphrase prompt with
//! the stored secret, without printing the secret or asking the user to type
//! it.
//!
//! # Strategies
//!
//! - `posix-expect-wrapper` - an `expect` script spawns `ssh`, answers the
//!   prompt and hands the terminal back to the user
//! - `posix-sshpass` - `sshpass` passes the secret to `ssh`
//! - `windows-batch-pipe` - a batch file pipes the secret from a side-file
//! - `posix-plain` - bare `ssh`; the user types the secret
//!
//! The strategy is chosen per call from the platform and the tools found on
//! PATH at that moment. Scripts are written to the temp directory with
//! owner-only permissions and deleted a few seconds later.
//!
//! # Example Usage (CLI)
//!
//! ```bash
//! ssh-bootstrap --host=192.168.1.100 --user=admin --password=secret
//! ssh-bootstrap --profiles=servers.json --server=prod
//! ssh-bootstrap --profiles=servers.json --list
//! ```

pub mod config;
pub mod error;
pub mod ssh;
pub mod store;

// Re-exports for convenience
pub use config::{Args, Config};
pub use error::{LaunchError, Result};
pub use ssh::{
    ConnectionProfile, InteractiveCommandSink, LaunchSettings, PlatformFamily, PlatformStrategy,
    SessionLauncher,
};
pub use store::ProfileStore;
