// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Configuration layout.
//!
//! Specify the layout of the settings file that wpclone reads, and of the
//! infrastructure environment file that every named infrastructure carries.
//!
//! # Settings File
//!
//! The settings file is optional. Any field left out falls back to its
//! default, so an empty file and a missing file behave the same. Path fields
//! go through shell expansion, thus `~/infrastructure` or
//! `$HOME/infrastructure` are both fine.
//!
//! # Infrastructure Environment File
//!
//! Each infrastructure lives in `{infrastructure_root}/{name}` and holds a
//! `.env` file in dotenv syntax. Only `MYSQL_ROOT_PASSWORD` is required.
//! `SSH_HOST` defaults to the infrastructure name so that an alias in
//! `~/.ssh/config` is enough to reach production.

use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    fs::read_to_string,
    path::{Path, PathBuf},
    str::FromStr,
    time::Duration,
};
use tracing::debug;

/// Name of environment file inside an infrastructure directory.
pub const ENV_FILE_NAME: &str = ".env";

/// Environment key holding the local database root password.
pub const ROOT_PASSWORD_KEY: &str = "MYSQL_ROOT_PASSWORD";

/// Environment key overriding the SSH host alias.
pub const SSH_HOST_KEY: &str = "SSH_HOST";

/// Environment key selecting the SSH user.
pub const SSH_USER_KEY: &str = "SSH_USER";

/// Settings layout.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    /// Directory holding one sub-directory per named infrastructure.
    pub infrastructure_root: PathBuf,

    /// Directory on production hosts holding one directory per domain.
    pub remote_sites_root: String,

    /// Local database container used for provisioning.
    pub database_container: String,

    /// Database container on production hosts used for dumps.
    pub remote_database_container: String,

    /// Shared network the database container listens on.
    pub db_network: String,

    /// Shared network the reverse proxy watches.
    pub proxy_network: String,

    /// Containers that must be running before cloning.
    pub required_containers: Vec<String>,

    /// Containers whose absence only earns a warning.
    pub optional_containers: Vec<String>,

    /// Time limits for external commands.
    pub timeouts: Timeouts,
}

impl Settings {
    /// Load settings from target path.
    ///
    /// Missing file means default settings.
    ///
    /// # Errors
    ///
    /// - Return [`ConfigError::Read`] if file exists but cannot be read.
    /// - Return [`ConfigError::Deserialize`] if file contents are invalid.
    /// - Return [`ConfigError::ShellExpansion`] if path expansion fails.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!("no settings at {}, using defaults", path.display());
            return Settings::default().expand_paths();
        }

        debug!("load settings from {}", path.display());
        read_to_string(path)
            .map_err(|source| ConfigError::Read {
                source,
                path: path.to_path_buf(),
            })?
            .parse()
    }

    /// Networks that must exist before cloning.
    pub fn required_networks(&self) -> Vec<String> {
        vec![self.db_network.clone(), self.proxy_network.clone()]
    }

    fn expand_paths(mut self) -> Result<Self> {
        // INVARIANT: Perform shell expansion on infrastructure root.
        self.infrastructure_root = PathBuf::from(
            shellexpand::full(self.infrastructure_root.to_string_lossy().as_ref())
                .map_err(ConfigError::ShellExpansion)?
                .into_owned(),
        );

        Ok(self)
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            infrastructure_root: PathBuf::from("~/infrastructure"),
            remote_sites_root: "/var/www".into(),
            database_container: "mysql".into(),
            remote_database_container: "mysql".into(),
            db_network: "db-network".into(),
            proxy_network: "proxy-network".into(),
            required_containers: vec!["nginx-proxy".into(), "mysql".into(), "redis".into()],
            optional_containers: vec!["cloudflared".into()],
            timeouts: Timeouts::default(),
        }
    }
}

impl FromStr for Settings {
    type Err = ConfigError;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        let settings: Settings = toml::de::from_str(data).map_err(ConfigError::Deserialize)?;
        settings.expand_paths()
    }
}

impl Display for Settings {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            toml::ser::to_string_pretty(self)
                .map_err(ConfigError::Serialize)?
                .as_str(),
        )
    }
}

/// Time limits in seconds.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Deserialize, Serialize)]
#[serde(default)]
pub struct Timeouts {
    /// Short commands on production host.
    pub remote: u64,

    /// Database dump, image save, and file sync.
    pub transfer: u64,

    /// Commands against local daemon and database.
    pub local: u64,

    /// Total wait for a launched site to answer.
    pub readiness: u64,

    /// Pause between readiness checks.
    pub readiness_interval: u64,
}

impl Timeouts {
    pub fn remote(&self) -> Duration {
        Duration::from_secs(self.remote)
    }

    pub fn transfer(&self) -> Duration {
        Duration::from_secs(self.transfer)
    }

    pub fn local(&self) -> Duration {
        Duration::from_secs(self.local)
    }

    pub fn readiness(&self) -> Duration {
        Duration::from_secs(self.readiness)
    }

    pub fn readiness_interval(&self) -> Duration {
        Duration::from_secs(self.readiness_interval)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            remote: 120,
            transfer: 3600,
            local: 600,
            readiness: 120,
            readiness_interval: 2,
        }
    }
}

/// Read-only view of one named infrastructure.
#[derive(Clone, PartialEq, Eq)]
pub struct InfrastructureContext {
    pub name: String,
    pub directory: PathBuf,
    pub ssh_host: String,
    pub ssh_user: Option<String>,
    pub mysql_root_password: String,
    pub required_containers: Vec<String>,
    pub required_networks: Vec<String>,
}

impl InfrastructureContext {
    /// SSH destination, `user@host` or bare host alias.
    pub fn ssh_target(&self) -> String {
        match &self.ssh_user {
            Some(user) => format!("{user}@{}", self.ssh_host),
            None => self.ssh_host.clone(),
        }
    }
}

impl std::fmt::Debug for InfrastructureContext {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.debug_struct("InfrastructureContext")
            .field("name", &self.name)
            .field("directory", &self.directory)
            .field("ssh_host", &self.ssh_host)
            .field("ssh_user", &self.ssh_user)
            .field("mysql_root_password", &"***")
            .field("required_containers", &self.required_containers)
            .field("required_networks", &self.required_networks)
            .finish()
    }
}

/// Parse environment file into key value pairs.
///
/// # Errors
///
/// - Return [`ConfigError::EnvFile`] if file cannot be read or parsed.
pub fn read_env_file(path: impl AsRef<Path>) -> Result<HashMap<String, String>> {
    let path = path.as_ref();
    let mut vars = HashMap::new();
    let iter = dotenvy::from_path_iter(path).map_err(|source| ConfigError::EnvFile {
        source,
        path: path.to_path_buf(),
    })?;
    for item in iter {
        let (key, value) = item.map_err(|source| ConfigError::EnvFile {
            source,
            path: path.to_path_buf(),
        })?;
        vars.insert(key, value);
    }

    Ok(vars)
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read settings file.
    #[error("failed to read settings at {path:?}")]
    Read {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    /// Failed to deserialize configuration.
    #[error(transparent)]
    Deserialize(#[from] toml::de::Error),

    /// Failed to serialize configuration.
    #[error(transparent)]
    Serialize(#[from] toml::ser::Error),

    /// Failed to perform shell expansion on configuration.
    #[error(transparent)]
    ShellExpansion(#[from] shellexpand::LookupError<std::env::VarError>),

    /// Failed to read or parse environment file.
    #[error("failed to parse environment file {path:?}")]
    EnvFile {
        #[source]
        source: dotenvy::Error,
        path: PathBuf,
    },
}

impl From<ConfigError> for FmtError {
    fn from(_: ConfigError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ConfigError> = std::result::Result<T, E>;
