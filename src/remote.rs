// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Production host access.
//!
//! OpenSSH joins everything after the destination into a single string and
//! hands it to the remote login shell. To keep argument vectors intact on
//! the far side, every argument is single-quoted before being joined.

use crate::{config::InfrastructureContext, process::CommandSpec};

use std::{path::Path, time::Duration};

/// Options passed to every SSH invocation.
const SSH_OPTIONS: [&str; 4] = ["-o", "BatchMode=yes", "-o", "ConnectTimeout=15"];

/// Builder of commands that reach the production host.
#[derive(Debug, Clone, Copy)]
pub struct RemoteHost<'a> {
    context: &'a InfrastructureContext,
}

impl<'a> RemoteHost<'a> {
    pub fn new(context: &'a InfrastructureContext) -> Self {
        Self { context }
    }

    /// Run argument vector on production host.
    pub fn command(
        &self,
        args: impl IntoIterator<Item = impl AsRef<str>>,
        timeout: Duration,
    ) -> CommandSpec {
        let remote_line = args
            .into_iter()
            .map(|arg| quote(arg.as_ref()))
            .collect::<Vec<_>>()
            .join(" ");

        CommandSpec::new("ssh", timeout)
            .args(SSH_OPTIONS)
            .arg(self.context.ssh_target())
            .arg("--")
            .arg(remote_line)
    }

    /// Mirror remote directory into local directory.
    ///
    /// Archive mode keeps permissions and timestamps. Local files missing on
    /// the remote side are deleted, except for excluded paths.
    pub fn mirror(
        &self,
        remote_dir: &str,
        local_dir: &Path,
        excludes: &[&str],
        timeout: Duration,
    ) -> CommandSpec {
        let mut command = CommandSpec::new("rsync", timeout).args(["-az", "--delete"]);
        for exclude in excludes {
            command = command.arg("--exclude").arg(*exclude);
        }

        command
            .arg("-e")
            .arg(format!("ssh {}", SSH_OPTIONS.join(" ")))
            .arg(format!(
                "{}:{}/",
                self.context.ssh_target(),
                remote_dir.trim_end_matches('/')
            ))
            .arg(format!("{}/", local_dir.display()))
    }
}

/// Quote argument for a POSIX shell.
///
/// Arguments made only of characters that no shell treats specially are left
/// untouched to keep logs readable.
pub fn quote(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | '@' | ','));
    if plain {
        return arg.to_string();
    }

    format!("'{}'", escape_quotes(arg))
}

/// Escape single quotes for use inside a single-quoted shell word.
pub fn escape_quotes(arg: &str) -> String {
    arg.replace('\'', r#"'\''"#)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;
    use std::path::PathBuf;

    fn context() -> InfrastructureContext {
        InfrastructureContext {
            name: "dev-fi-01".into(),
            directory: PathBuf::from("/srv/infra/dev-fi-01"),
            ssh_host: "dev-fi-01".into(),
            ssh_user: Some("deploy".into()),
            mysql_root_password: "root".into(),
            required_containers: vec![],
            required_networks: vec![],
        }
    }

    #[test_case("plain", "plain"; "plain word")]
    #[test_case("/var/www/site.com/wp-config.php", "/var/www/site.com/wp-config.php"; "path")]
    #[test_case("", "''"; "empty")]
    #[test_case("two words", "'two words'"; "whitespace")]
    #[test_case("it's", r#"'it'\''s'"#; "single quote")]
    #[test_case("$(reboot)", "'$(reboot)'"; "substitution")]
    #[test_case("a;b", "'a;b'"; "separator")]
    #[test]
    fn quote_argument(arg: &str, expect: &str) {
        pretty_assertions::assert_eq!(quote(arg), expect);
    }

    #[test]
    fn command_quotes_remote_line() {
        let context = context();
        let command = RemoteHost::new(&context).command(
            ["docker", "exec", "-e", "MYSQL_PWD=p'w d", "mysql", "mysqldump"],
            Duration::from_secs(1),
        );

        assert_eq!(command.program(), "ssh");
        assert_eq!(
            command.arg_list(),
            [
                "-o",
                "BatchMode=yes",
                "-o",
                "ConnectTimeout=15",
                "deploy@dev-fi-01",
                "--",
                r#"docker exec -e 'MYSQL_PWD=p'\''w d' mysql mysqldump"#,
            ]
        );
    }

    #[test]
    fn mirror_trails_directories() {
        let context = context();
        let command = RemoteHost::new(&context).mirror(
            "/var/www/example.com/",
            Path::new("/home/dev/local-example-com"),
            &["/docker-compose.yml"],
            Duration::from_secs(1),
        );

        assert_eq!(command.program(), "rsync");
        assert_eq!(
            command.arg_list(),
            [
                "-az",
                "--delete",
                "--exclude",
                "/docker-compose.yml",
                "-e",
                "ssh -o BatchMode=yes -o ConnectTimeout=15",
                "deploy@dev-fi-01:/var/www/example.com/",
                "/home/dev/local-example-com/",
            ]
        );
    }
}
