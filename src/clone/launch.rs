// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Site container launch.
//!
//! Whatever runs under the site's container name is taken down first, then
//! the stack comes up from the freshly written descriptor. The launch only
//! counts as done once WordPress answers administrative commands, polled for
//! a bounded amount of time.

use crate::{
    config::Settings,
    names::DerivedNames,
    process::{CommandSpec, Process, ProcessError},
};

use std::{path::Path, time::Duration};
use tokio::time::{sleep, Instant};
use tracing::{debug, info, instrument, warn};

/// Run wp-cli inside site container.
pub(crate) fn wp(
    settings: &Settings,
    names: &DerivedNames,
    args: impl IntoIterator<Item = impl Into<String>>,
) -> CommandSpec {
    CommandSpec::new("docker", settings.timeouts.local())
        .args(["exec", names.container_name.as_str(), "wp"])
        .args(args)
        .arg("--allow-root")
}

/// Compose command against target descriptor.
pub(crate) fn compose(
    settings: &Settings,
    descriptor: &Path,
    args: impl IntoIterator<Item = impl Into<String>>,
) -> CommandSpec {
    CommandSpec::new("docker", settings.timeouts.local())
        .args(["compose", "-f"])
        .arg(descriptor.to_string_lossy())
        .args(args)
}

/// Stop and remove site container by name.
///
/// Returns `Ok` when no such container exists.
pub(crate) async fn remove_container<P: Process>(
    process: &P,
    settings: &Settings,
    names: &DerivedNames,
) -> Result<(), ProcessError> {
    let command = CommandSpec::new("docker", settings.timeouts.local())
        .args(["rm", "-f"])
        .arg(names.container_name.as_str());
    match process.run(&command).await {
        Ok(_) => Ok(()),
        Err(error) if error.stderr_contains("no such container") => {
            debug!("no container {} to remove", names.container_name);
            Ok(())
        }
        Err(error) => Err(error),
    }
}

/// Replace any running site container with a fresh one.
#[instrument(skip_all, level = "debug")]
pub async fn launch_site<P: Process>(
    process: &P,
    settings: &Settings,
    names: &DerivedNames,
    descriptor: &Path,
) -> Result<()> {
    let down = compose(settings, descriptor, ["down", "--remove-orphans"]);
    if let Err(error) = process.run(&down).await {
        warn!("ignoring failed teardown of previous stack: {error}");
    }
    remove_container(process, settings, names)
        .await
        .map_err(LaunchError::Remove)?;

    info!("start {}", names.container_name);
    let up = compose(settings, descriptor, ["up", "-d"]);
    process.run(&up).await.map_err(LaunchError::Start)?;

    wait_until_ready(process, settings, names).await
}

/// Poll site until wp-cli can talk to it.
///
/// No single check may outlast what is left of the readiness timeout.
///
/// # Errors
///
/// - Return [`LaunchError::NotReady`] once readiness timeout elapses.
#[instrument(skip_all, level = "debug")]
pub async fn wait_until_ready<P: Process>(
    process: &P,
    settings: &Settings,
    names: &DerivedNames,
) -> Result<()> {
    let timeout = settings.timeouts.readiness();
    let interval = settings.timeouts.readiness_interval();
    let check = wp(settings, names, ["core", "is-installed"]);
    let start = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let remaining = timeout.saturating_sub(start.elapsed());
        let bounded = check
            .clone()
            .with_timeout(remaining.min(settings.timeouts.local()));
        match process.run(&bounded).await {
            Ok(_) => {
                info!(
                    "{} ready after {attempts} attempt(s)",
                    names.container_name
                );
                return Ok(());
            }
            Err(error) => {
                debug!("check {attempts} failed: {error}");
                if start.elapsed() + interval >= timeout {
                    return Err(LaunchError::NotReady {
                        container: names.container_name.clone(),
                        attempts,
                        waited: start.elapsed(),
                        last: error,
                    });
                }
            }
        }

        sleep(interval).await;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum LaunchError {
    #[error("failed to remove previous container")]
    Remove(#[source] ProcessError),

    #[error("failed to start site stack")]
    Start(#[source] ProcessError),

    #[error("container {container} not ready after {attempts} check(s) in {waited:?}")]
    NotReady {
        container: String,
        attempts: u32,
        waited: Duration,
        #[source]
        last: ProcessError,
    },
}

/// Friendly result alias :3
type Result<T, E = LaunchError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::sync::Mutex;

    /// Site that never answers, remembering the time limit of each check.
    #[derive(Debug, Default)]
    struct SilentSite {
        limits: Mutex<Vec<Duration>>,
    }

    impl Process for SilentSite {
        async fn run(&self, command: &CommandSpec) -> Result<String, ProcessError> {
            self.limits.lock().unwrap().push(command.timeout());
            Err(ProcessError::Timeout {
                command: command.to_string(),
                after: command.timeout(),
            })
        }
    }

    #[tokio::test]
    async fn checks_stay_within_readiness_timeout() {
        let mut settings = Settings::default();
        settings.timeouts.readiness = 1;
        settings.timeouts.readiness_interval = 1;
        let names = DerivedNames::from_domain("example.com");
        let site = SilentSite::default();

        let result = wait_until_ready(&site, &settings, &names).await;
        assert!(matches!(result, Err(LaunchError::NotReady { attempts: 1, .. })));

        let limits = site.limits.lock().unwrap().clone();
        assert_eq!(limits.len(), 1);
        assert!(limits[0] <= settings.timeouts.readiness());
        assert!(limits[0] < settings.timeouts.local());
    }

    #[test]
    fn wp_runs_as_root_in_site_container() {
        let names = DerivedNames::from_domain("example.com");
        let command = wp(&Settings::default(), &names, ["option", "get", "siteurl"]);
        assert_eq!(
            command.to_string(),
            "docker exec local-example-com wp option get siteurl --allow-root"
        );
    }

    #[test]
    fn compose_targets_descriptor() {
        let command = compose(
            &Settings::default(),
            Path::new("/sites/local-example-com/docker-compose.yml"),
            ["up", "-d"],
        );
        assert_eq!(
            command.to_string(),
            "docker compose -f /sites/local-example-com/docker-compose.yml up -d"
        );
    }
}
