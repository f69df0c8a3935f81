// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Local provisioning.
//!
//! Turns the transferred snapshot into local state: the image goes into the
//! local daemon, the dump goes into a freshly created database, and the
//! compose descriptor plus per-site network are put in place.
//!
//! # Idempotence
//!
//! The database is always dropped and created again, together with its user.
//! Whatever a previous run left behind, complete or not, the import always
//! starts from an empty database.

use crate::{
    clone::{credentials::DatabaseCredentials, snapshot::CloneArtifacts},
    compose::{ComposeError, ComposeFile, COMPOSE_FILE_NAME},
    config::{InfrastructureContext, Settings},
    names::DerivedNames,
    process::{CommandSpec, Process, ProcessError},
};

use regex::Regex;
use std::{
    fs::File,
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};
use tracing::{debug, info, instrument};

/// Collation used when the dump does not declare one.
pub const FALLBACK_COLLATION: &str = "utf8mb4_unicode_ci";

/// Import snapshot archive into local daemon.
#[instrument(skip_all, level = "debug")]
pub async fn load_image<P: Process>(
    process: &P,
    settings: &Settings,
    artifacts: &CloneArtifacts,
) -> Result<()> {
    info!("load image from {}", artifacts.image_archive.display());
    let command = CommandSpec::new("docker", settings.timeouts.local())
        .arg("load")
        .arg("-i")
        .arg(artifacts.image_archive.to_string_lossy());
    process.run(&command).await.map_err(ProvisioningError::ImageLoad)?;

    Ok(())
}

/// Find collation declared by database dump.
///
/// The first `COLLATE` clause wins. Falls back to [`FALLBACK_COLLATION`] if
/// no clause exists. The dump is streamed, since it can be large and is not
/// guaranteed to be valid UTF-8.
///
/// # Errors
///
/// - Return [`ProvisioningError::Io`] if dump cannot be read.
pub fn detect_collation(dump: impl AsRef<Path>) -> Result<String> {
    let dump = dump.as_ref();
    let io_error = |source: std::io::Error| ProvisioningError::Io {
        source,
        path: dump.to_path_buf(),
    };
    let pattern = Regex::new(r"(?i)\bCOLLATE\s*=?\s*`?'?([a-z0-9]+_[a-z0-9_]+)")?;

    let mut reader = BufReader::new(File::open(dump).map_err(io_error)?);
    let mut line = Vec::new();
    loop {
        line.clear();
        if reader.read_until(b'\n', &mut line).map_err(io_error)? == 0 {
            break;
        }

        let text = String::from_utf8_lossy(&line);
        if let Some(capture) = pattern.captures(&text) {
            let collation = capture[1].to_ascii_lowercase();
            debug!("dump declares collation {collation}");
            return Ok(collation);
        }
    }

    debug!("dump declares no collation, falling back to {FALLBACK_COLLATION}");
    Ok(FALLBACK_COLLATION.to_string())
}

/// Character set a collation belongs to.
pub fn charset_of(collation: &str) -> &str {
    collation.split('_').next().unwrap_or(collation)
}

/// Quote MySQL identifier.
pub fn quote_identifier(identifier: &str) -> String {
    format!("`{}`", identifier.replace('`', "``"))
}

/// Quote MySQL string literal.
pub fn quote_literal(literal: &str) -> String {
    format!("'{}'", literal.replace('\\', "\\\\").replace('\'', "''"))
}

/// Statements dropping database and user of target credentials.
pub fn drop_statements(credentials: &DatabaseCredentials) -> String {
    format!(
        "DROP DATABASE IF EXISTS {db}; DROP USER IF EXISTS {user}@'%';",
        db = quote_identifier(&credentials.name),
        user = quote_literal(&credentials.user),
    )
}

/// Statements recreating database and user of target credentials.
pub fn recreate_statements(credentials: &DatabaseCredentials, collation: &str) -> String {
    let db = quote_identifier(&credentials.name);
    let user = quote_literal(&credentials.user);
    format!(
        "{drop} \
         CREATE DATABASE {db} CHARACTER SET {charset} COLLATE {collation}; \
         CREATE USER {user}@'%' IDENTIFIED BY {password}; \
         GRANT ALL PRIVILEGES ON {db}.* TO {user}@'%'; \
         FLUSH PRIVILEGES;",
        drop = drop_statements(credentials),
        charset = charset_of(collation),
        password = quote_literal(&credentials.password),
    )
}

/// Run SQL as root in local database container.
///
/// Root password travels through the environment, never the argument list.
/// The site password inside `sql` is masked in both raw and quoted form.
pub(crate) fn root_sql(
    settings: &Settings,
    context: &InfrastructureContext,
    sql: String,
    password: &str,
) -> CommandSpec {
    CommandSpec::new("docker", settings.timeouts.local())
        .args(["exec", "-e", "MYSQL_PWD"])
        .arg(settings.database_container.as_str())
        .args(["mysql", "-uroot", "-e"])
        .arg(sql)
        .env("MYSQL_PWD", context.mysql_root_password.as_str())
        .secret(quote_literal(password))
        .secret(password)
}

/// Drop and create database and user from scratch.
#[instrument(skip_all, level = "debug")]
pub async fn recreate_database<P: Process>(
    process: &P,
    settings: &Settings,
    context: &InfrastructureContext,
    credentials: &DatabaseCredentials,
    collation: &str,
) -> Result<()> {
    info!(
        "recreate database {} with collation {collation}",
        credentials.name
    );
    let command = root_sql(
        settings,
        context,
        recreate_statements(credentials, collation),
        &credentials.password,
    );
    process.run(&command).await.map_err(ProvisioningError::Database)?;

    Ok(())
}

/// Load dump into freshly created database.
#[instrument(skip_all, level = "debug")]
pub async fn import_dump<P: Process>(
    process: &P,
    settings: &Settings,
    context: &InfrastructureContext,
    credentials: &DatabaseCredentials,
    artifacts: &CloneArtifacts,
) -> Result<()> {
    info!("import {} into {}", artifacts.dump.display(), credentials.name);
    let command = CommandSpec::new("docker", settings.timeouts.transfer())
        .args(["exec", "-i", "-e", "MYSQL_PWD"])
        .arg(settings.database_container.as_str())
        .args(["mysql", "-uroot"])
        .arg(credentials.name.as_str())
        .env("MYSQL_PWD", context.mysql_root_password.as_str())
        .stdin_file(&artifacts.dump);
    process.run(&command).await.map_err(ProvisioningError::Import)?;

    Ok(())
}

/// Write compose descriptor into site directory.
///
/// Also creates the local log directory the descriptor mounts.
pub fn write_descriptor(
    settings: &Settings,
    names: &DerivedNames,
    site_dir: &Path,
) -> Result<PathBuf> {
    let logs = site_dir.join("logs");
    std::fs::create_dir_all(&logs).map_err(|source| ProvisioningError::Io {
        source,
        path: logs.clone(),
    })?;

    ComposeFile::for_site(names, settings).write_to(site_dir)?;
    let descriptor = site_dir.join(COMPOSE_FILE_NAME);
    info!("wrote {}", descriptor.display());

    Ok(descriptor)
}

/// Create per-site network unless it already exists.
#[instrument(skip_all, level = "debug")]
pub async fn ensure_network<P: Process>(
    process: &P,
    settings: &Settings,
    names: &DerivedNames,
) -> Result<()> {
    let local = settings.timeouts.local();
    let inspect = CommandSpec::new("docker", local)
        .args(["network", "inspect", "--format", "{{.Name}}"])
        .arg(names.network_name.as_str());
    if process.run(&inspect).await.is_ok() {
        debug!("network {} already exists", names.network_name);
        return Ok(());
    }

    info!("create network {}", names.network_name);
    let create = CommandSpec::new("docker", local)
        .args(["network", "create"])
        .arg(names.network_name.as_str());
    match process.run(&create).await {
        Ok(_) => Ok(()),
        Err(error) if error.stderr_contains("already exists") => Ok(()),
        Err(error) => Err(ProvisioningError::Network(error)),
    }
}

/// Failure building local state.
#[derive(Debug, thiserror::Error)]
pub enum ProvisioningError {
    #[error("failed to load snapshot image")]
    ImageLoad(#[source] ProcessError),

    #[error("failed to recreate local database")]
    Database(#[source] ProcessError),

    #[error("failed to import database dump")]
    Import(#[source] ProcessError),

    #[error("failed to create site network")]
    Network(#[source] ProcessError),

    #[error(transparent)]
    Descriptor(#[from] ComposeError),

    #[error(transparent)]
    Pattern(#[from] regex::Error),

    #[error("failed to access {path:?}")]
    Io {
        #[source]
        source: std::io::Error,
        path: PathBuf,
    },
}

/// Friendly result alias :3
type Result<T, E = ProvisioningError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    fn credentials() -> DatabaseCredentials {
        DatabaseCredentials {
            name: "refine_test".into(),
            user: "refine".into(),
            password: "it's secret".into(),
            charset: "utf8mb4".into(),
        }
    }

    #[test]
    fn detect_collation_from_table_definition() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let dump = dir.path().join("dump.sql");
        std::fs::write(
            &dump,
            indoc! {"
                -- MySQL dump 10.13
                CREATE TABLE `wp_options` (
                  `option_id` bigint(20) unsigned NOT NULL AUTO_INCREMENT
                ) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4 COLLATE=utf8mb4_unicode_520_ci;
                CREATE TABLE `wp_posts` (
                  `ID` bigint(20)
                ) ENGINE=InnoDB DEFAULT CHARSET=latin1 COLLATE=latin1_swedish_ci;
            "},
        )?;

        assert_eq!(detect_collation(&dump)?, "utf8mb4_unicode_520_ci");

        Ok(())
    }

    #[test]
    fn detect_collation_falls_back() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let dump = dir.path().join("dump.sql");
        let mut contents = b"CREATE TABLE `t` (`id` int) ENGINE=InnoDB DEFAULT CHARSET=utf8mb4;\n".to_vec();
        contents.extend_from_slice(&[0xff, 0xfe, b'\n']);
        std::fs::write(&dump, contents)?;

        assert_eq!(detect_collation(&dump)?, FALLBACK_COLLATION);

        Ok(())
    }

    #[test]
    fn detect_collation_missing_dump() {
        let result = detect_collation("/nonexistent/dump.sql");
        assert!(matches!(result, Err(ProvisioningError::Io { .. })));
    }

    #[test_case("utf8mb4_unicode_520_ci", "utf8mb4"; "unicode 520")]
    #[test_case("latin1_swedish_ci", "latin1"; "latin")]
    #[test_case("utf8_general_ci", "utf8"; "utf8")]
    #[test]
    fn charset_from_collation(collation: &str, expect: &str) {
        pretty_assertions::assert_eq!(charset_of(collation), expect);
    }

    #[test]
    fn quote_sql_values() {
        assert_eq!(quote_identifier("we`ird"), "`we``ird`");
        assert_eq!(quote_literal(r"it's a \ test"), r"'it''s a \\ test'");
    }

    #[test]
    fn recreate_drops_before_create() {
        let sql = recreate_statements(&credentials(), "utf8mb4_unicode_520_ci");
        let drop_db = sql.find("DROP DATABASE IF EXISTS `refine_test`").unwrap();
        let drop_user = sql.find("DROP USER IF EXISTS 'refine'@'%'").unwrap();
        let create = sql
            .find("CREATE DATABASE `refine_test` CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_520_ci")
            .unwrap();
        assert!(drop_db < create && drop_user < create);
        assert!(sql.contains("CREATE USER 'refine'@'%' IDENTIFIED BY 'it''s secret';"));
        assert!(sql.contains("GRANT ALL PRIVILEGES ON `refine_test`.* TO 'refine'@'%';"));
    }

    #[test]
    fn root_sql_keeps_password_out_of_arguments() {
        let context = InfrastructureContext {
            name: "dev-fi-01".into(),
            directory: PathBuf::from("/srv/infra/dev-fi-01"),
            ssh_host: "dev-fi-01".into(),
            ssh_user: None,
            mysql_root_password: "rootpw".into(),
            required_containers: vec![],
            required_networks: vec![],
        };
        let credentials = credentials();
        let command = root_sql(
            &Settings::default(),
            &context,
            recreate_statements(&credentials, FALLBACK_COLLATION),
            &credentials.password,
        );

        assert!(command.arg_list().iter().all(|arg| !arg.contains("rootpw")));
        assert_eq!(command.env_list(), [("MYSQL_PWD".to_string(), "rootpw".to_string())]);
        assert!(!command.to_string().contains("it''s secret"));
    }

    #[test]
    fn write_descriptor_creates_logs() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let names = DerivedNames::from_domain("example.com");
        let site_dir = names.site_dir(dir.path());
        let descriptor = write_descriptor(&Settings::default(), &names, &site_dir)?;

        assert_eq!(descriptor, site_dir.join(COMPOSE_FILE_NAME));
        assert!(descriptor.is_file());
        assert!(site_dir.join("logs").is_dir());

        Ok(())
    }
}
