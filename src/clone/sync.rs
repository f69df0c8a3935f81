// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Site file mirroring.

use crate::{
    clone::{
        credentials::remote_site_dir,
        snapshot::{Result, TransferError},
    },
    compose::COMPOSE_FILE_NAME,
    config::Settings,
    names::DerivedNames,
    process::Process,
    remote::RemoteHost,
};

use std::path::Path;
use tracing::{info, instrument};

/// Paths kept out of the mirror, relative to the site directory.
///
/// The local descriptor is generated, and logs belong to the local container.
pub fn mirror_excludes() -> [String; 2] {
    [format!("/{COMPOSE_FILE_NAME}"), "/logs/".to_string()]
}

/// Mirror production site directory into local site directory.
///
/// Only changed files travel on a repeated run. Local files that vanished on
/// production are deleted.
#[instrument(skip_all, level = "debug")]
pub async fn sync_site_files<P: Process>(
    process: &P,
    remote: RemoteHost<'_>,
    settings: &Settings,
    names: &DerivedNames,
    site_dir: &Path,
) -> Result<()> {
    std::fs::create_dir_all(site_dir).map_err(|source| TransferError::Io {
        source,
        path: site_dir.to_path_buf(),
    })?;

    let source = remote_site_dir(settings, names);
    info!("mirror {source} into {}", site_dir.display());
    let excludes = mirror_excludes();
    let excludes = excludes.iter().map(String::as_str).collect::<Vec<_>>();
    let command = remote.mirror(&source, site_dir, &excludes, settings.timeouts.transfer());
    process.run(&command).await.map_err(TransferError::Sync)?;

    Ok(())
}
