// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Production snapshot export.
//!
//! Three transfers off the production host: freeze the running container
//! into an image, dump its database, and stream the image out as an archive.
//! The dump and the archive land next to the site directory, never inside it,
//! so that the file mirror cannot delete them.
//!
//! There is no partial success here. If any transfer fails the clone stops
//! before anything local is provisioned from an incomplete snapshot.

use crate::{
    clone::credentials::DatabaseCredentials,
    config::Settings,
    names::DerivedNames,
    process::{CommandSpec, Process, ProcessError},
    remote::{escape_quotes, RemoteHost},
};

use std::path::{Path, PathBuf};
use tracing::{info, instrument};

/// Transient files of one clone run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneArtifacts {
    pub dump: PathBuf,
    pub image_archive: PathBuf,
}

impl CloneArtifacts {
    /// Locate artifacts for target names in destination folder.
    pub fn new(destination: impl AsRef<Path>, names: &DerivedNames) -> Self {
        let destination = destination.as_ref();
        Self {
            dump: destination.join(format!("{}.sql", names.directory_name)),
            image_archive: destination.join(format!("{}.tar", names.directory_name)),
        }
    }
}

/// Freeze production container into snapshot image.
///
/// Committing again simply moves the tag.
#[instrument(skip_all, level = "debug")]
pub async fn commit_snapshot<P: Process>(
    process: &P,
    remote: RemoteHost<'_>,
    settings: &Settings,
    names: &DerivedNames,
) -> Result<()> {
    info!(
        "commit {} into {}",
        names.production_container, names.snapshot_image
    );
    let command = remote.command(
        [
            "docker",
            "commit",
            names.production_container.as_str(),
            names.snapshot_image.as_str(),
        ],
        settings.timeouts.transfer(),
    );
    process.run(&command).await.map_err(TransferError::Commit)?;

    Ok(())
}

/// Dump production database into local file.
#[instrument(skip_all, level = "debug")]
pub async fn dump_database<P: Process>(
    process: &P,
    remote: RemoteHost<'_>,
    settings: &Settings,
    credentials: &DatabaseCredentials,
    artifacts: &CloneArtifacts,
) -> Result<()> {
    info!(
        "dump database {} into {}",
        credentials.name,
        artifacts.dump.display()
    );
    let command = dump_command(remote, settings, credentials, artifacts);
    process.run(&command).await.map_err(TransferError::Dump)?;

    Ok(())
}

// INVARIANT: Mask password both raw and as escaped inside the remote line.
fn dump_command(
    remote: RemoteHost<'_>,
    settings: &Settings,
    credentials: &DatabaseCredentials,
    artifacts: &CloneArtifacts,
) -> CommandSpec {
    let password = format!("MYSQL_PWD={}", credentials.password);
    remote
        .command(
            [
                "docker",
                "exec",
                "-e",
                password.as_str(),
                settings.remote_database_container.as_str(),
                "mysqldump",
                "--no-tablespaces",
                "--single-transaction",
                "-u",
                credentials.user.as_str(),
                credentials.name.as_str(),
            ],
            settings.timeouts.transfer(),
        )
        .stdout_file(&artifacts.dump)
        .secret(credentials.password.as_str())
        .secret(escape_quotes(&credentials.password))
}

/// Stream snapshot image into local archive.
#[instrument(skip_all, level = "debug")]
pub async fn transfer_image<P: Process>(
    process: &P,
    remote: RemoteHost<'_>,
    settings: &Settings,
    names: &DerivedNames,
    artifacts: &CloneArtifacts,
) -> Result<()> {
    info!(
        "save {} into {}",
        names.snapshot_image,
        artifacts.image_archive.display()
    );
    let command = remote
        .command(
            ["docker", "save", names.snapshot_image.as_str()],
            settings.timeouts.transfer(),
        )
        .stdout_file(&artifacts.image_archive);
    process
        .run(&command)
        .await
        .map_err(TransferError::ImageTransfer)?;

    Ok(())
}

/// Failure moving data off the production host.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("failed to commit production container")]
    Commit(#[source] ProcessError),

    #[error("failed to dump production database")]
    Dump(#[source] ProcessError),

    #[error("failed to transfer snapshot image")]
    ImageTransfer(#[source] ProcessError),

    #[error("failed to synchronize site files")]
    Sync(#[source] ProcessError),

    #[error("failed to prepare {path:?}")]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
pub(crate) type Result<T, E = TransferError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::InfrastructureContext;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    #[test]
    fn artifacts_sit_beside_site_dir() {
        let names = DerivedNames::from_domain("test.refine.digital");
        let artifacts = CloneArtifacts::new("/home/dev", &names);
        assert_eq!(
            artifacts,
            CloneArtifacts {
                dump: PathBuf::from("/home/dev/local-test-refine-digital.sql"),
                image_archive: PathBuf::from("/home/dev/local-test-refine-digital.tar"),
            }
        );
        assert!(!artifacts.dump.starts_with(names.site_dir("/home/dev")));
    }

    #[test_case("hunter2"; "plain")]
    #[test_case("pa'ss word"; "single quote")]
    #[test_case("it's $(x) \"y\""; "shell metacharacters")]
    #[test]
    fn dump_command_hides_password(password: &str) {
        let context = InfrastructureContext {
            name: "dev-fi-01".into(),
            directory: PathBuf::from("/srv/infra/dev-fi-01"),
            ssh_host: "prod".into(),
            ssh_user: None,
            mysql_root_password: "root".into(),
            required_containers: vec![],
            required_networks: vec![],
        };
        let credentials = DatabaseCredentials {
            name: "shop".into(),
            user: "shop".into(),
            password: password.into(),
            charset: "utf8mb4".into(),
        };
        let names = DerivedNames::from_domain("test.refine.digital");
        let artifacts = CloneArtifacts::new("/home/dev", &names);

        let command = dump_command(
            RemoteHost::new(&context),
            &Settings::default(),
            &credentials,
            &artifacts,
        );

        let line = command.to_string();
        assert!(line.contains("MYSQL_PWD=***"), "unexpected line {line}");
        assert!(!line.contains(password), "password leaked in {line}");
        assert!(!line.contains("ss word"), "password leaked in {line}");
    }
}
