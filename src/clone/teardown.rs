// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Site instance teardown.
//!
//! Requested through `--clean`. Everything a previous clone created locally is
//! removed so that the following run behaves exactly like a first clone:
//! container, per-site network, database with its user, and site directory.
//! Missing pieces are fine, they simply have nothing left to remove.

use crate::{
    clone::{
        credentials::DatabaseCredentials,
        launch::{compose, remove_container},
        provision::{drop_statements, root_sql},
    },
    compose::COMPOSE_FILE_NAME,
    config::{InfrastructureContext, Settings},
    names::DerivedNames,
    process::{CommandSpec, Process, ProcessError},
};

use std::path::{Path, PathBuf};
use tracing::{debug, info, instrument, warn};

/// Remove every local trace of a site instance.
#[instrument(skip_all, level = "debug")]
pub async fn teardown_site<P: Process>(
    process: &P,
    settings: &Settings,
    context: &InfrastructureContext,
    names: &DerivedNames,
    credentials: &DatabaseCredentials,
    site_dir: &Path,
) -> Result<()> {
    info!("tear down existing site {}", names.container_name);

    let descriptor = site_dir.join(COMPOSE_FILE_NAME);
    if descriptor.is_file() {
        let down = compose(settings, &descriptor, ["down", "--remove-orphans"]);
        if let Err(error) = process.run(&down).await {
            warn!("ignoring failed compose teardown: {error}");
        }
    }
    remove_container(process, settings, names)
        .await
        .map_err(TeardownError::Container)?;

    let network = CommandSpec::new("docker", settings.timeouts.local())
        .args(["network", "rm"])
        .arg(names.network_name.as_str());
    match process.run(&network).await {
        Ok(_) => debug!("removed network {}", names.network_name),
        Err(error)
            if error.stderr_contains("not found") || error.stderr_contains("no such network") =>
        {
            debug!("no network {} to remove", names.network_name)
        }
        Err(error) => return Err(TeardownError::Network(error)),
    }

    let drop_database = root_sql(
        settings,
        context,
        drop_statements(credentials),
        &credentials.password,
    );
    process
        .run(&drop_database)
        .await
        .map_err(TeardownError::Database)?;

    if site_dir.exists() {
        std::fs::remove_dir_all(site_dir).map_err(|source| TeardownError::Directory {
            source,
            path: site_dir.to_path_buf(),
        })?;
        debug!("removed {}", site_dir.display());
    }

    Ok(())
}

#[derive(Debug, thiserror::Error)]
pub enum TeardownError {
    #[error("failed to remove site container")]
    Container(#[source] ProcessError),

    #[error("failed to remove site network")]
    Network(#[source] ProcessError),

    #[error("failed to drop site database")]
    Database(#[source] ProcessError),

    #[error("failed to remove site directory {path:?}")]
    Directory {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = TeardownError> = std::result::Result<T, E>;
