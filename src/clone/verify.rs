// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Infrastructure verification.
//!
//! Nothing is mutated and nothing reaches production until the local side
//! looks sane: daemon up, infrastructure directory and its environment file
//! in place, root password known, shared services running, shared networks
//! created. Missing services and networks are collected together and
//! reported in one go.

use crate::{
    config::{
        read_env_file, InfrastructureContext, Settings, ENV_FILE_NAME, ROOT_PASSWORD_KEY,
        SSH_HOST_KEY, SSH_USER_KEY,
    },
    process::{CommandSpec, Process, ProcessError},
};

use std::{collections::HashSet, path::PathBuf};
use tracing::{debug, info, instrument, warn};

/// Check local prerequisites of target infrastructure.
///
/// Returns the read-only infrastructure context that later stages need.
///
/// # Errors
///
/// - Return [`PreconditionError`] variant matching the first failed check,
///   or [`PreconditionError::MissingServices`] listing every missing
///   container and network.
#[instrument(skip(process, settings), level = "debug")]
pub async fn verify_infrastructure<P: Process>(
    process: &P,
    settings: &Settings,
    infrastructure: &str,
) -> Result<InfrastructureContext> {
    let local = settings.timeouts.local();

    let check = CommandSpec::new("docker", local).args(["info", "--format", "{{.ServerVersion}}"]);
    let version = process
        .run(&check)
        .await
        .map_err(PreconditionError::DaemonUnreachable)?;
    debug!("docker daemon {version} reachable");

    let directory = settings.infrastructure_root.join(infrastructure);
    if !directory.is_dir() {
        return Err(PreconditionError::MissingInfrastructure(directory));
    }

    let env_path = directory.join(ENV_FILE_NAME);
    if !env_path.is_file() {
        return Err(PreconditionError::MissingEnvFile(env_path));
    }
    let env = read_env_file(&env_path)?;

    let mysql_root_password = env
        .get(ROOT_PASSWORD_KEY)
        .filter(|value| !value.is_empty())
        .cloned()
        .ok_or_else(|| PreconditionError::MissingSecret {
            key: ROOT_PASSWORD_KEY,
            path: env_path.clone(),
        })?;

    let containers = CommandSpec::new("docker", local).args(["ps", "--format", "{{.Names}}"]);
    let networks =
        CommandSpec::new("docker", local).args(["network", "ls", "--format", "{{.Name}}"]);
    let (running, existing) =
        futures::future::try_join(process.run(&containers), process.run(&networks))
            .await
            .map_err(PreconditionError::Inventory)?;

    let required_networks = settings.required_networks();
    let missing_containers = missing(&settings.required_containers, &running);
    let missing_networks = missing(&required_networks, &existing);
    if !missing_containers.is_empty() || !missing_networks.is_empty() {
        return Err(PreconditionError::MissingServices {
            containers: missing_containers,
            networks: missing_networks,
        });
    }

    for optional in missing(&settings.optional_containers, &running) {
        warn!("optional container {optional:?} is not running, site may not be reachable through tunnel");
    }

    info!("infrastructure {infrastructure:?} verified");
    Ok(InfrastructureContext {
        name: infrastructure.to_string(),
        ssh_host: env
            .get(SSH_HOST_KEY)
            .filter(|value| !value.is_empty())
            .cloned()
            .unwrap_or_else(|| infrastructure.to_string()),
        ssh_user: env.get(SSH_USER_KEY).filter(|value| !value.is_empty()).cloned(),
        directory,
        mysql_root_password,
        required_containers: settings.required_containers.clone(),
        required_networks,
    })
}

/// Names from `required` absent in line-separated `listing`.
fn missing(required: &[String], listing: &str) -> Vec<String> {
    let present = listing
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<HashSet<_>>();

    required
        .iter()
        .filter(|name| !present.contains(name.as_str()))
        .cloned()
        .collect()
}

/// Local prerequisite not met.
#[derive(Debug, thiserror::Error)]
pub enum PreconditionError {
    #[error("docker daemon is not reachable")]
    DaemonUnreachable(#[source] ProcessError),

    #[error("infrastructure directory {0:?} does not exist")]
    MissingInfrastructure(PathBuf),

    #[error("infrastructure environment file {0:?} does not exist")]
    MissingEnvFile(PathBuf),

    #[error(transparent)]
    EnvFile(#[from] crate::config::ConfigError),

    #[error("{key} is not set in {path:?}")]
    MissingSecret { key: &'static str, path: PathBuf },

    #[error("failed to list running containers and networks")]
    Inventory(#[source] ProcessError),

    #[error(
        "required infrastructure is missing (containers: [{}], networks: [{}])",
        .containers.join(", "),
        .networks.join(", ")
    )]
    MissingServices {
        containers: Vec<String>,
        networks: Vec<String>,
    },
}

/// Friendly result alias :3
type Result<T, E = PreconditionError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn missing_reports_every_absent_name() {
        let required = vec!["nginx-proxy".to_string(), "mysql".into(), "redis".into()];
        let listing = "mysql\nsome-site\n";
        assert_eq!(missing(&required, listing), vec!["nginx-proxy", "redis"]);
    }

    #[test]
    fn missing_ignores_blank_and_padded_lines() {
        let required = vec!["db-network".to_string()];
        assert_eq!(missing(&required, "\n  db-network  \n\n"), Vec::<String>::new());
        assert_eq!(missing(&required, ""), vec!["db-network"]);
    }

    #[test]
    fn missing_services_lists_all_names() {
        let error = PreconditionError::MissingServices {
            containers: vec!["nginx-proxy".into(), "redis".into()],
            networks: vec!["db-network".into()],
        };
        assert_eq!(
            error.to_string(),
            "required infrastructure is missing (containers: [nginx-proxy, redis], networks: [db-network])"
        );
    }
}
