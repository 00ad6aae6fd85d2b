//! Read-only profile store
//!
//! Loads the JSON document of saved servers and groups:
//!
//! ```json
//! {
//!   "servers": [{ "id": "1", "name": "prod", "host": "10.0.0.5", "port": 22,
//!                 "username": "root", "password": "secret",
//!                 "usePrivateKey": false, "groupId": "g1" }],
//!   "groups": [{ "id": "g1", "name": "Production" }]
//! }
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::error::{LaunchError, Result};
use crate::ssh::profile::{AuthMethod, ConnectionProfile, DEFAULT_PORT};

/// Maximum profile file size (1MB)
const MAX_FILE_SIZE: u64 = 1024 * 1024;

/// Server group
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ServerGroup {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// Server record as stored on disk
#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerRecord {
    #[serde(default)]
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    host: String,
    #[serde(default)]
    port: u16,
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: Option<String>,
    #[serde(default)]
    use_private_key: bool,
    #[serde(default)]
    private_key_path: Option<String>,
    #[serde(default)]
    private_key_password: Option<String>,
    #[serde(default)]
    group_id: Option<String>,
}

impl From<ServerRecord> for ConnectionProfile {
    fn from(record: ServerRecord) -> Self {
        let auth = if record.use_private_key {
            AuthMethod::Key {
                path: PathBuf::from(record.private_key_path.unwrap_or_default()),
                passphrase: record.private_key_password.filter(|p| !p.is_empty()),
            }
        } else {
            AuthMethod::Password {
                password: record.password.unwrap_or_default(),
            }
        };

        let name = if record.name.is_empty() {
            record.host.clone()
        } else {
            record.name
        };

        ConnectionProfile {
            id: record.id,
            name,
            host: record.host,
            port: if record.port == 0 { DEFAULT_PORT } else { record.port },
            username: record.username,
            auth,
            group_id: record.group_id.filter(|g| !g.is_empty()),
        }
    }
}

#[derive(Deserialize)]
struct ProfileFile {
    #[serde(default)]
    servers: Vec<ServerRecord>,
    #[serde(default)]
    groups: Vec<ServerGroup>,
}

/// Servers and groups loaded from a profile file
#[derive(Debug, Clone, Default)]
pub struct ProfileStore {
    servers: Vec<ConnectionProfile>,
    groups: Vec<ServerGroup>,
}

impl ProfileStore {
    /// Load a profile file
    pub fn load(path: &Path) -> Result<Self> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            LaunchError::store(format!("Cannot read {}: {}", path.display(), e))
        })?;
        if metadata.len() > MAX_FILE_SIZE {
            return Err(LaunchError::store(format!(
                "{} is too large (max {} bytes)",
                path.display(),
                MAX_FILE_SIZE
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let store = Self::from_json(&content)?;
        debug!(
            "Loaded {} server(s) and {} group(s) from {}",
            store.servers.len(),
            store.groups.len(),
            path.display()
        );
        Ok(store)
    }

    /// Parse a profile document
    pub fn from_json(content: &str) -> Result<Self> {
        let file: ProfileFile = serde_json::from_str(content)?;
        Ok(Self {
            servers: file.servers.into_iter().map(ConnectionProfile::from).collect(),
            groups: file.groups,
        })
    }

    pub fn servers(&self) -> &[ConnectionProfile] {
        &self.servers
    }

    pub fn groups(&self) -> &[ServerGroup] {
        &self.groups
    }

    /// Find a server by id, then by exact display name
    pub fn find(&self, id_or_name: &str) -> Option<&ConnectionProfile> {
        self.servers
            .iter()
            .find(|s| !s.id.is_empty() && s.id == id_or_name)
            .or_else(|| self.servers.iter().find(|s| s.name == id_or_name))
    }

    /// Servers per group in group order, followed by servers with no
    /// (or an unknown) group under `None`.
    pub fn grouped(&self) -> Vec<(Option<&ServerGroup>, Vec<&ConnectionProfile>)> {
        let mut sections: Vec<(Option<&ServerGroup>, Vec<&ConnectionProfile>)> = self
            .groups
            .iter()
            .map(|group| {
                let members = self
                    .servers
                    .iter()
                    .filter(|s| s.group_id.as_deref() == Some(group.id.as_str()))
                    .collect();
                (Some(group), members)
            })
            .collect();

        let ungrouped: Vec<&ConnectionProfile> = self
            .servers
            .iter()
            .filter(|s| match s.group_id.as_deref() {
                None => true,
                Some(id) => !self.groups.iter().any(|g| g.id == id),
            })
            .collect();
        if !ungrouped.is_empty() {
            sections.push((None, ungrouped));
        }

        sections
    }
}
