// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Clone pipeline.
//!
//! A __clone__ mirrors one production WordPress site into a local __site
//! instance__: files, database, container image, and a container running
//! behind the local reverse proxy under `local-{domain}`.
//!
//! # Pipeline
//!
//! The clone runs as a strict sequence of fourteen steps. Each step hands
//! immutable values to the next one, and nothing runs in parallel because
//! every step depends on the one before it.
//!
//! 1. Resolve local names from the production domain.
//! 2. Verify local infrastructure.
//! 3. Lock the site instance.
//! 4. Read production database credentials.
//! 5. Tear down the existing site instance, if asked to.
//! 6. Commit the production container into a snapshot image.
//! 7. Dump the production database.
//! 8. Transfer the snapshot image.
//! 9. Mirror the site files.
//! 10. Load the snapshot image.
//! 11. Recreate the local database.
//! 12. Import the dump.
//! 13. Write the compose descriptor and create the site network.
//! 14. Launch the site and rewrite its URLs.
//!
//! # Re-running
//!
//! All names derive from the production domain, the database is always
//! recreated, and the container is always replaced. Cloning the same domain
//! twice therefore ends in the same state as cloning it once, with the file
//! mirror only moving what changed in between.
//!
//! # Failure
//!
//! Any fatal error stops the pipeline on the spot. Once the snapshot step has
//! started, transient artifacts are cleaned up whether the run succeeded or
//! not. Local state is not rolled back; `--clean` is the way back to a known
//! state.

pub mod cleanup;
pub mod credentials;
pub mod launch;
pub mod provision;
pub mod rewrite;
pub mod snapshot;
pub mod sync;
pub mod teardown;
pub mod verify;

use crate::{
    clone::{
        cleanup::cleanup,
        credentials::{read_credentials, DatabaseCredentials},
        launch::launch_site,
        provision::{
            detect_collation, ensure_network, import_dump, load_image, recreate_database,
            write_descriptor,
        },
        rewrite::rewrite_site,
        snapshot::{commit_snapshot, dump_database, transfer_image, CloneArtifacts},
        sync::sync_site_files,
        teardown::teardown_site,
        verify::verify_infrastructure,
    },
    config::{InfrastructureContext, Settings},
    lock::SiteLock,
    names::{CloneRequest, DerivedNames},
    path::{default_lock_dir, lock_path},
    process::{Process, TokioProcess},
    remote::RemoteHost,
};

use indicatif::ProgressBar;
use std::path::PathBuf;
use tracing::{info, instrument, warn};

/// Number of numbered pipeline steps.
pub const STEPS: u64 = 14;

/// Local footprint of one cloned site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteInstance {
    pub directory: PathBuf,
    pub compose_descriptor: PathBuf,
    pub container_name: String,
    pub network_name: String,
    pub database_name: String,
    pub site_url: String,
}

/// Clone pipeline bound to settings and a process runner.
#[derive(Debug)]
pub struct Pipeline<P = TokioProcess>
where
    P: Process,
{
    settings: Settings,
    process: P,
    bar: ProgressBar,
    lock_dir: PathBuf,
}

impl<P> Pipeline<P>
where
    P: Process,
{
    /// Construct new pipeline.
    ///
    /// Step progress is reported through `bar`. Pass
    /// [`ProgressBar::hidden`] to stay quiet.
    pub fn new(settings: Settings, process: P, bar: ProgressBar) -> Self {
        Self {
            settings,
            process,
            bar,
            lock_dir: default_lock_dir(),
        }
    }

    /// Keep site locks in target directory.
    pub fn with_lock_dir(mut self, lock_dir: impl Into<PathBuf>) -> Self {
        self.lock_dir = lock_dir.into();
        self
    }

    pub fn process(&self) -> &P {
        &self.process
    }

    /// Verify local infrastructure without cloning anything.
    ///
    /// # Errors
    ///
    /// - Return [`CloneError::Precondition`] if a prerequisite is missing.
    pub async fn verify(&self, infrastructure: &str) -> Result<InfrastructureContext> {
        Ok(verify_infrastructure(&self.process, &self.settings, infrastructure).await?)
    }

    /// Clone production site into local site instance.
    ///
    /// # Errors
    ///
    /// - Return [`CloneError`] of the category that stopped the pipeline.
    #[instrument(skip(self, request), fields(domain = request.production_domain()), level = "debug")]
    pub async fn run(&self, request: &CloneRequest) -> Result<SiteInstance> {
        self.bar.set_length(STEPS);

        self.step(1, "resolve names");
        let names = DerivedNames::resolve(request);
        let site_dir = names.site_dir(request.destination());
        info!(
            "clone {} into {} as {}",
            names.production_domain,
            site_dir.display(),
            names.local_domain
        );

        self.step(2, "verify infrastructure");
        let context =
            verify_infrastructure(&self.process, &self.settings, request.infrastructure()).await?;

        self.step(3, "lock site instance");
        std::fs::create_dir_all(request.destination()).map_err(|source| {
            CloneError::Destination {
                source,
                path: request.destination().to_path_buf(),
            }
        })?;
        let _lock = SiteLock::acquire(lock_path(&self.lock_dir, &names.container_name))?;

        self.step(4, "read database credentials");
        let remote = RemoteHost::new(&context);
        let credentials = read_credentials(&self.process, remote, &self.settings, &names).await?;

        if request.clean() {
            self.step(5, "tear down existing site");
            teardown_site(
                &self.process,
                &self.settings,
                &context,
                &names,
                &credentials,
                &site_dir,
            )
            .await?;
        } else {
            self.step(5, "keep existing site");
        }

        let artifacts = CloneArtifacts::new(request.destination(), &names);
        let result = self
            .transfer_and_provision(&context, &names, &credentials, &artifacts, site_dir)
            .await;

        for issue in cleanup(&self.process, remote, &self.settings, &names, &artifacts).await {
            warn!("{issue}");
        }

        if result.is_ok() {
            self.bar.finish_with_message(format!("cloned {}", names.local_domain));
        } else {
            self.bar.abandon();
        }

        result
    }

    async fn transfer_and_provision(
        &self,
        context: &InfrastructureContext,
        names: &DerivedNames,
        credentials: &DatabaseCredentials,
        artifacts: &CloneArtifacts,
        site_dir: PathBuf,
    ) -> Result<SiteInstance> {
        let process = &self.process;
        let settings = &self.settings;
        let remote = RemoteHost::new(context);

        self.step(6, "commit production snapshot");
        commit_snapshot(process, remote, settings, names).await?;

        self.step(7, "dump production database");
        dump_database(process, remote, settings, credentials, artifacts).await?;

        self.step(8, "transfer snapshot image");
        transfer_image(process, remote, settings, names, artifacts).await?;

        self.step(9, "mirror site files");
        sync_site_files(process, remote, settings, names, &site_dir).await?;

        self.step(10, "load snapshot image");
        load_image(process, settings, artifacts).await?;

        self.step(11, "recreate database");
        let collation = detect_collation(&artifacts.dump)?;
        recreate_database(process, settings, context, credentials, &collation).await?;

        self.step(12, "import database");
        import_dump(process, settings, context, credentials, artifacts).await?;

        self.step(13, "write compose descriptor");
        let compose_descriptor = write_descriptor(settings, names, &site_dir)?;
        ensure_network(process, settings, names).await?;

        self.step(14, "launch site");
        launch_site(process, settings, names, &compose_descriptor).await?;
        let site_url = rewrite_site(process, settings, names).await?;

        Ok(SiteInstance {
            directory: site_dir,
            compose_descriptor,
            container_name: names.container_name.clone(),
            network_name: names.network_name.clone(),
            database_name: credentials.name.clone(),
            site_url,
        })
    }

    fn step(&self, number: u64, message: &'static str) {
        info!("[{number}/{STEPS}] {message}");
        self.bar.set_position(number - 1);
        self.bar.set_message(message);
    }
}

/// All ways a clone can stop.
#[derive(Debug, thiserror::Error)]
pub enum CloneError {
    #[error(transparent)]
    Request(#[from] crate::names::RequestError),

    #[error(transparent)]
    Precondition(#[from] crate::clone::verify::PreconditionError),

    #[error(transparent)]
    Lock(#[from] crate::lock::LockError),

    #[error("failed to create destination folder {path:?}")]
    Destination {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },

    #[error(transparent)]
    Credential(#[from] crate::clone::credentials::CredentialError),

    #[error(transparent)]
    Teardown(#[from] crate::clone::teardown::TeardownError),

    #[error(transparent)]
    Transfer(#[from] crate::clone::snapshot::TransferError),

    #[error(transparent)]
    Provisioning(#[from] crate::clone::provision::ProvisioningError),

    #[error(transparent)]
    Launch(#[from] crate::clone::launch::LaunchError),

    #[error(transparent)]
    Rewrite(#[from] crate::clone::rewrite::RewriteError),
}

impl CloneError {
    /// Short category label for reports.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Request(_) => "invalid request",
            Self::Precondition(_) => "precondition",
            Self::Lock(_) | Self::Destination { .. } => "local state",
            Self::Credential(_) => "credentials",
            Self::Transfer(_) => "transfer",
            Self::Teardown(_) | Self::Provisioning(_) => "provisioning",
            Self::Launch(_) => "launch",
            Self::Rewrite(_) => "rewrite",
        }
    }

    /// What the operator can do about it.
    pub fn hint(&self) -> &'static str {
        match self {
            Self::Request(_) => "pass an infrastructure name and a full domain such as example.com",
            Self::Precondition(_) => {
                "start the docker daemon and the shared infrastructure services, then retry; nothing was changed"
            }
            Self::Lock(_) => "wait for the other clone of this site to finish",
            Self::Destination { .. } => "pick a destination folder you can write to",
            Self::Credential(_) => "check ssh access to production and its wp-config.php",
            Self::Transfer(_) => "check ssh access and disk space, then retry; add --clean if local state looks broken",
            Self::Teardown(_) | Self::Provisioning(_) => {
                "check the local database container, then retry with --clean"
            }
            Self::Launch(_) => "inspect the container logs, then retry with --clean",
            Self::Rewrite(_) => "inspect the site with wp-cli inside the container, then retry",
        }
    }
}

/// Friendly result alias :3
pub type Result<T, E = CloneError> = std::result::Result<T, E>;
