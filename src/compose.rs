// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Compose descriptor layout.
//!
//! A site instance is started from a `docker-compose.yml` in its site
//! directory. The descriptor declares exactly one service: the WordPress
//! container built from the production snapshot. It joins three networks that
//! all exist outside of compose: the per-site network, the shared database
//! network, and the shared network the reverse proxy watches.
//!
//! Recurring housekeeping is declared through ofelia labels, so whatever
//! scheduler the infrastructure runs picks the job up without extra setup.

use crate::{config::Settings, names::DerivedNames};

use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{Display, Error as FmtError, Formatter, Result as FmtResult},
    path::Path,
};

/// File name of the descriptor inside a site directory.
pub const COMPOSE_FILE_NAME: &str = "docker-compose.yml";

/// Name of the only service in the descriptor.
pub const SERVICE_NAME: &str = "wordpress";

/// Port the site container serves plain HTTP on.
pub const VIRTUAL_PORT: &str = "80";

/// Interval of the housekeeping job.
pub const CRON_SCHEDULE: &str = "@every 5m";

/// Command run by the housekeeping job.
pub const CRON_COMMAND: &str = "wp cron event run --due-now --allow-root";

/// Bind mounts of the site container, relative to the site directory.
pub const VOLUMES: [&str; 4] = [
    "./wordpress:/var/www/html",
    "./logs:/var/log/apache2",
    "./config/php.ini:/usr/local/etc/php/conf.d/zz-custom.ini:ro",
    "./config/opcache.ini:/usr/local/etc/php/conf.d/zz-opcache.ini:ro",
];

/// Compose descriptor layout.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ComposeFile {
    pub services: BTreeMap<String, Service>,
    pub networks: BTreeMap<String, ExternalNetwork>,
}

impl ComposeFile {
    /// Describe site instance for target names.
    pub fn for_site(names: &DerivedNames, settings: &Settings) -> Self {
        let job = format!("ofelia.job-exec.{}-cron", names.container_name);
        let labels = BTreeMap::from([
            ("ofelia.enabled".to_string(), "true".to_string()),
            (format!("{job}.schedule"), CRON_SCHEDULE.to_string()),
            (format!("{job}.command"), CRON_COMMAND.to_string()),
        ]);

        let environment = BTreeMap::from([
            ("VIRTUAL_HOST".to_string(), names.local_domain.clone()),
            ("VIRTUAL_PORT".to_string(), VIRTUAL_PORT.to_string()),
        ]);

        let network_names = vec![
            names.network_name.clone(),
            settings.db_network.clone(),
            settings.proxy_network.clone(),
        ];

        let service = Service {
            image: names.snapshot_image.clone(),
            container_name: names.container_name.clone(),
            restart: "unless-stopped".into(),
            environment,
            volumes: VOLUMES.iter().map(ToString::to_string).collect(),
            labels,
            networks: network_names.clone(),
        };

        Self {
            services: BTreeMap::from([(SERVICE_NAME.to_string(), service)]),
            networks: network_names
                .into_iter()
                .map(|name| (name, ExternalNetwork { external: true }))
                .collect(),
        }
    }

    /// Write descriptor into site directory.
    ///
    /// # Errors
    ///
    /// - Return [`ComposeError::Write`] if file cannot be written.
    pub fn write_to(&self, site_dir: impl AsRef<Path>) -> Result<()> {
        let path = site_dir.as_ref().join(COMPOSE_FILE_NAME);
        let contents = serde_yaml::to_string(self)?;
        std::fs::write(&path, contents).map_err(|source| ComposeError::Write {
            source,
            path: path.clone(),
        })
    }
}

impl Display for ComposeFile {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.write_str(
            serde_yaml::to_string(self)
                .map_err(ComposeError::Serialize)?
                .as_str(),
        )
    }
}

/// Single compose service.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct Service {
    pub image: String,
    pub container_name: String,
    pub restart: String,
    pub environment: BTreeMap<String, String>,
    pub volumes: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub networks: Vec<String>,
}

/// Network created outside of compose.
#[derive(Debug, PartialEq, Eq, Clone, Deserialize, Serialize)]
pub struct ExternalNetwork {
    pub external: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum ComposeError {
    #[error(transparent)]
    Serialize(#[from] serde_yaml::Error),

    #[error("failed to write compose descriptor {path:?}")]
    Write {
        #[source]
        source: std::io::Error,
        path: std::path::PathBuf,
    },
}

impl From<ComposeError> for FmtError {
    fn from(_: ComposeError) -> Self {
        FmtError
    }
}

/// Friendly result alias :3
type Result<T, E = ComposeError> = std::result::Result<T, E>;
