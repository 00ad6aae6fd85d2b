//! Ephemeral secret staging
//!
//! Automation scripts and credential side-files are written to the platform
//! temp directory under an unguessable name, restricted to the owner on
//! POSIX, and removed on a detached timer once the session has had time to
//! read them.
//!
//! Windows has no equivalent of the POSIX mode bits here: staged files keep
//! the temp directory's default ACL until they are deleted.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use rand::rngs::OsRng;
use rand::RngCore;
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{LaunchError, Result};

/// Random bytes in a session token (hex-encoded in file names)
pub const TOKEN_BYTES: usize = 16;

/// File name prefix shared by every staged artifact
const FILE_PREFIX: &str = "ssb";

/// What an artifact is used for; decides its file name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// expect script answering a password prompt
    PasswordScript,
    /// expect script answering a key passphrase prompt
    PassphraseScript,
    /// one-line sshpass wrapper
    SshpassScript,
    /// Windows batch driver
    BatchScript,
    /// plaintext secret read by the batch driver
    SecretFile,
}

impl ArtifactKind {
    fn label(self) -> &'static str {
        match self {
            ArtifactKind::PasswordScript => "expect",
            ArtifactKind::PassphraseScript => "key",
            ArtifactKind::SshpassScript => "pass",
            ArtifactKind::BatchScript => "connect",
            ArtifactKind::SecretFile => "pwd",
        }
    }

    fn extension(self) -> &'static str {
        match self {
            ArtifactKind::BatchScript => ".bat",
            ArtifactKind::SecretFile => ".txt",
            _ => "",
        }
    }

    /// Permissions the artifact is left with
    pub fn access(self) -> OwnerOnly {
        match self {
            ArtifactKind::SecretFile => OwnerOnly::Read,
            _ => OwnerOnly::ReadExecute,
        }
    }
}

/// Owner-only access modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerOnly {
    /// 0o400
    Read,
    /// 0o500
    ReadExecute,
}

impl OwnerOnly {
    /// POSIX mode bits
    pub fn mode(self) -> u32 {
        match self {
            OwnerOnly::Read => 0o400,
            OwnerOnly::ReadExecute => 0o500,
        }
    }
}

/// A staged file. Holds no copy of the content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactHandle {
    pub path: PathBuf,
    pub kind: ArtifactKind,
    pub access: OwnerOnly,
    pub created_at: SystemTime,
}

/// Factory for per-attempt staging sessions
#[derive(Debug, Clone)]
pub struct SecretStaging {
    dir: PathBuf,
}

impl SecretStaging {
    /// Stage under `dir`
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Stage under the platform temp directory
    pub fn system() -> Self {
        Self::new(std::env::temp_dir())
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Start a new attempt with a fresh random token
    pub fn session(&self) -> StagingSession {
        StagingSession {
            dir: self.dir.clone(),
            token: random_token(),
        }
    }
}

/// Hex token drawn from the OS random source
pub fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// Artifacts of one connection attempt. Paths are known before anything is
/// written so scripts can refer to each other.
#[derive(Debug, Clone)]
pub struct StagingSession {
    dir: PathBuf,
    token: String,
}

impl StagingSession {
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Where an artifact of `kind` lives for this attempt
    pub fn path_for(&self, kind: ArtifactKind) -> PathBuf {
        self.dir.join(format!(
            "{}-{}-{}{}",
            FILE_PREFIX,
            kind.label(),
            self.token,
            kind.extension()
        ))
    }

    /// Write `content` and restrict it to the owner.
    ///
    /// Refuses to reuse an existing path and leaves whatever is there alone.
    /// A file created by this call but not fully written is removed before
    /// the error is returned.
    pub async fn stage(&self, kind: ArtifactKind, content: &[u8]) -> Result<ArtifactHandle> {
        let path = self.path_for(kind);
        let access = kind.access();

        if let Err(e) = write_new(&path, content, access).await {
            return Err(LaunchError::staging(path, e));
        }

        debug!("Staged {:?} artifact at {}", kind, path.display());
        Ok(ArtifactHandle {
            path,
            kind,
            access,
            created_at: SystemTime::now(),
        })
    }
}

async fn write_new(path: &Path, content: &[u8], access: OwnerOnly) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    options.mode(0o600);

    // Not ours until this succeeds
    let file = options.open(path).await?;

    if let Err(e) = fill_and_restrict(file, path, content, access).await {
        let _ = tokio::fs::remove_file(path).await;
        return Err(e);
    }
    Ok(())
}

async fn fill_and_restrict(
    mut file: tokio::fs::File,
    path: &Path,
    content: &[u8],
    access: OwnerOnly,
) -> std::io::Result<()> {
    file.write_all(content).await?;
    file.flush().await?;
    drop(file);

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(access.mode())).await?;
    }
    #[cfg(not(unix))]
    let _ = (path, access);

    Ok(())
}

/// Delete the artifact after `delay` without blocking the caller.
///
/// Failures are logged only. A file that is already gone (for example a
/// batch script that deleted itself) is not a failure.
pub fn schedule_cleanup(handle: ArtifactHandle, delay: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        remove_artifact(&handle.path).await;
    })
}

/// Delete the artifact now
pub async fn discard(handle: &ArtifactHandle) {
    remove_artifact(&handle.path).await;
}

pub(crate) async fn remove_artifact(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!("Removed staged artifact {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("Staged artifact {} already gone", path.display())
        }
        Err(e) => warn!("Failed to remove staged artifact {}: {}", path.display(), e),
    }
}
