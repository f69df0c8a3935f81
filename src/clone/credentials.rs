// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Production database credentials.
//!
//! The production `wp-config.php` is read over SSH and scanned for the four
//! settings a clone needs. Both array-literal pairs (`'DB_NAME' => 'shop'`)
//! and `define('DB_NAME', 'shop')` calls are understood, with either quote
//! style. A missing setting is an error, never a default: an empty password
//! would only resurface later as a confusing dump failure.

use crate::{
    config::Settings,
    names::DerivedNames,
    process::{Process, ProcessError},
    remote::RemoteHost,
};

use regex::Regex;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use tracing::{info, instrument};

/// Keys read out of the production configuration, in order.
pub const CREDENTIAL_KEYS: [&str; 4] = ["DB_NAME", "DB_USER", "DB_PASSWORD", "DB_CHARSET"];

/// Quoted key followed by `=>` or `,` and a quoted value.
///
/// Values may contain backslash escapes, including escaped quotes.
const PAIR_PATTERN: &str = r#"['"](DB_NAME|DB_USER|DB_PASSWORD|DB_CHARSET)['"]\s*(?:=>|,)\s*(?:'((?:[^'\\]|\\.)*)'|"((?:[^"\\]|\\.)*)")"#;

/// Database credentials of production site.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseCredentials {
    pub name: String,
    pub user: String,
    pub password: String,
    pub charset: String,
}

impl Debug for DatabaseCredentials {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        fmt.debug_struct("DatabaseCredentials")
            .field("name", &self.name)
            .field("user", &self.user)
            .field("password", &"***")
            .field("charset", &self.charset)
            .finish()
    }
}

impl DatabaseCredentials {
    /// Parse credentials out of configuration file contents.
    ///
    /// First occurrence of each key wins.
    ///
    /// # Errors
    ///
    /// - Return [`CredentialError::MissingField`] naming the first key that
    ///   could not be found.
    pub fn parse(contents: &str) -> Result<Self> {
        let pair = Regex::new(PAIR_PATTERN)?;
        let mut found: [Option<String>; 4] = Default::default();
        for capture in pair.captures_iter(contents) {
            let Some(index) = CREDENTIAL_KEYS.iter().position(|key| *key == &capture[1]) else {
                continue;
            };

            if found[index].is_none() {
                let value = match (capture.get(2), capture.get(3)) {
                    (Some(single), _) => unescape(single.as_str(), '\''),
                    (None, Some(double)) => unescape(double.as_str(), '"'),
                    (None, None) => String::new(),
                };
                found[index] = Some(value);
            }
        }

        let [name, user, password, charset] = found;
        let field = |value: Option<String>, key: &'static str| {
            value.ok_or(CredentialError::MissingField(key))
        };

        Ok(Self {
            name: field(name, "DB_NAME")?,
            user: field(user, "DB_USER")?,
            password: field(password, "DB_PASSWORD")?,
            charset: field(charset, "DB_CHARSET")?,
        })
    }
}

/// Resolve PHP string escapes of a quoted literal.
///
/// Only the enclosing quote and the backslash are escapes. Any other
/// backslash sequence stays as written.
fn unescape(literal: &str, quote: char) -> String {
    let mut value = String::with_capacity(literal.len());
    let mut chars = literal.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            value.push(c);
            continue;
        }

        match chars.next() {
            Some(next) if next == quote || next == '\\' => value.push(next),
            Some(next) => {
                value.push('\\');
                value.push(next);
            }
            None => value.push('\\'),
        }
    }

    value
}

/// Path of production configuration file on the remote host.
pub fn remote_config_path(settings: &Settings, names: &DerivedNames) -> String {
    format!("{}/wordpress/wp-config.php", remote_site_dir(settings, names))
}

/// Path of production site directory on the remote host.
pub fn remote_site_dir(settings: &Settings, names: &DerivedNames) -> String {
    format!(
        "{}/{}",
        settings.remote_sites_root.trim_end_matches('/'),
        names.production_domain
    )
}

/// Read database credentials of production site.
///
/// # Errors
///
/// - Return [`CredentialError::Remote`] if configuration cannot be read.
/// - Return [`CredentialError::MissingField`] if a setting is absent.
#[instrument(skip_all, level = "debug")]
pub async fn read_credentials<P: Process>(
    process: &P,
    remote: RemoteHost<'_>,
    settings: &Settings,
    names: &DerivedNames,
) -> Result<DatabaseCredentials> {
    let path = remote_config_path(settings, names);
    info!("read database credentials from {path}");
    let command = remote.command(["cat", path.as_str()], settings.timeouts.remote());
    let contents = process.run(&command).await?;
    DatabaseCredentials::parse(&contents)
}

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error("failed to read production configuration")]
    Remote(#[from] ProcessError),

    #[error("{0} not found in production configuration")]
    MissingField(&'static str),

    #[error(transparent)]
    Pattern(#[from] regex::Error),
}

/// Friendly result alias :3
type Result<T, E = CredentialError> = std::result::Result<T, E>;
