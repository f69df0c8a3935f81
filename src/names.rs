// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Clone requests and the names derived from them.
//!
//! Every local identifier of a __site instance__ is computed from the
//! production domain alone. The same request always yields the same names,
//! which is what lets a second run land on top of the first one instead of
//! next to it.
//!
//! # Naming Scheme
//!
//! Given production domain `test.refine.digital`:
//!
//! | Name                 | Value                                  |
//! |----------------------|----------------------------------------|
//! | local domain         | `local-test.refine.digital`            |
//! | container, directory | `local-test-refine-digital`            |
//! | per-site network     | `local-test-refine-digital-network`    |
//! | image tag            | `test-refine-digital`                  |
//! | snapshot image       | `wpclone/test-refine-digital:latest`   |
//! | production container | `testrefinedigital-wordpress-1`        |

use crate::path::absolute_from;

use std::path::{Path, PathBuf};

/// Suffix compose gives the production WordPress container.
pub const PRODUCTION_CONTAINER_SUFFIX: &str = "-wordpress-1";

/// Prefix that turns a production domain into a local one.
pub const LOCAL_DOMAIN_PREFIX: &str = "local-";

/// Validated request to clone one production site.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneRequest {
    infrastructure: String,
    production_domain: String,
    destination: PathBuf,
    clean: bool,
}

impl CloneRequest {
    /// Construct new clone request.
    ///
    /// The domain is lower-cased. The destination is resolved against `cwd`
    /// when relative, but is not created here.
    ///
    /// # Errors
    ///
    /// - Return [`RequestError::InvalidInfrastructure`] if infrastructure name
    ///   is empty or contains characters outside `[A-Za-z0-9_.-]`.
    /// - Return [`RequestError::InvalidDomain`] if domain is empty, has no
    ///   dot, or contains characters outside `[a-z0-9.-]`.
    pub fn new(
        infrastructure: impl Into<String>,
        production_domain: impl Into<String>,
        destination: impl AsRef<Path>,
        cwd: impl AsRef<Path>,
        clean: bool,
    ) -> Result<Self> {
        let infrastructure = infrastructure.into();
        if infrastructure.is_empty()
            || !infrastructure
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        {
            return Err(RequestError::InvalidInfrastructure(infrastructure));
        }

        let production_domain = production_domain.into().to_ascii_lowercase();
        let valid_chars = production_domain
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.'));
        let valid_labels = production_domain.split('.').all(|label| !label.is_empty());
        if !production_domain.contains('.') || !valid_chars || !valid_labels {
            return Err(RequestError::InvalidDomain(production_domain));
        }

        Ok(Self {
            infrastructure,
            production_domain,
            destination: absolute_from(cwd, destination),
            clean,
        })
    }

    pub fn infrastructure(&self) -> &str {
        &self.infrastructure
    }

    pub fn production_domain(&self) -> &str {
        &self.production_domain
    }

    /// Absolute folder that receives the site directory and artifacts.
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Tear down the existing site instance before cloning.
    pub fn clean(&self) -> bool {
        self.clean
    }
}

/// All identifiers derived from a clone request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedNames {
    pub production_domain: String,
    pub local_domain: String,
    pub container_name: String,
    pub directory_name: String,
    pub network_name: String,
    pub image_tag: String,
    pub snapshot_image: String,
    pub production_container: String,
}

impl DerivedNames {
    /// Derive local names from production domain.
    ///
    /// Pure, and total for any domain containing at least one dot.
    pub fn resolve(request: &CloneRequest) -> Self {
        Self::from_domain(request.production_domain())
    }

    pub(crate) fn from_domain(production_domain: &str) -> Self {
        let local_domain = format!("{LOCAL_DOMAIN_PREFIX}{production_domain}");
        let container_name = dash(&local_domain);
        let image_tag = dash(production_domain);

        Self {
            production_domain: production_domain.to_string(),
            network_name: format!("{container_name}-network"),
            directory_name: container_name.clone(),
            snapshot_image: format!("wpclone/{image_tag}:latest"),
            production_container: format!(
                "{}{PRODUCTION_CONTAINER_SUFFIX}",
                production_domain.replace('.', "")
            ),
            local_domain,
            container_name,
            image_tag,
        }
    }

    /// Site directory under destination folder.
    pub fn site_dir(&self, destination: impl AsRef<Path>) -> PathBuf {
        destination.as_ref().join(&self.directory_name)
    }

    /// URL the local site must report once rewritten.
    pub fn local_url(&self) -> String {
        format!("https://{}", self.local_domain)
    }
}

/// Replace every dot with a dash.
pub fn dash(value: &str) -> String {
    value.replace('.', "-")
}

/// Invalid clone request.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    #[error("invalid infrastructure name {0:?}")]
    InvalidInfrastructure(String),

    #[error("invalid production domain {0:?}, expected something like example.com")]
    InvalidDomain(String),
}

/// Friendly result alias :3
type Result<T, E = RequestError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use simple_test_case::test_case;

    fn request(domain: &str) -> CloneRequest {
        CloneRequest::new("dev-fi-01", domain, ".", "/home/dev", false).unwrap()
    }

    #[test]
    fn resolve_reference_domain() {
        let names = DerivedNames::resolve(&request("test.refine.digital"));
        let expect = DerivedNames {
            production_domain: "test.refine.digital".into(),
            local_domain: "local-test.refine.digital".into(),
            container_name: "local-test-refine-digital".into(),
            directory_name: "local-test-refine-digital".into(),
            network_name: "local-test-refine-digital-network".into(),
            image_tag: "test-refine-digital".into(),
            snapshot_image: "wpclone/test-refine-digital:latest".into(),
            production_container: "testrefinedigital-wordpress-1".into(),
        };

        assert_eq!(names, expect);
        assert_eq!(
            names.site_dir("/home/dev"),
            PathBuf::from("/home/dev/local-test-refine-digital")
        );
        assert_eq!(names.local_url(), "https://local-test.refine.digital");
    }

    #[test_case("example.com"; "single dot")]
    #[test_case("a.b.c.d.example.com"; "many dots")]
    #[test_case("my-site.co.uk"; "dashes and dots")]
    #[test]
    fn resolve_transforms_every_dot(domain: &str) {
        let names = DerivedNames::resolve(&request(domain));
        pretty_assertions::assert_eq!(names.local_domain, format!("local-{domain}"));
        assert!(!names.container_name.contains('.'));
        assert!(!names.image_tag.contains('.'));
        assert!(!names.production_container.contains('.'));
    }

    #[test_case("example.com"; "single dot")]
    #[test_case("a.b.c.example.com"; "many dots")]
    #[test]
    fn dash_is_idempotent(domain: &str) {
        pretty_assertions::assert_eq!(dash(&dash(domain)), dash(domain));
    }

    #[test]
    fn resolve_is_deterministic() {
        let first = DerivedNames::resolve(&request("shop.example.org"));
        let second = DerivedNames::resolve(&request("shop.example.org"));
        assert_eq!(first, second);
    }

    #[test]
    fn request_lowercases_domain() {
        assert_eq!(request("Test.Refine.Digital").production_domain(), "test.refine.digital");
    }

    #[test_case("", "example.com"; "empty infrastructure")]
    #[test_case("dev fi", "example.com"; "whitespace infrastructure")]
    #[test_case("dev;rm", "example.com"; "metacharacter infrastructure")]
    #[test]
    fn request_rejects_infrastructure(infrastructure: &str, domain: &str) {
        let result = CloneRequest::new(infrastructure, domain, ".", "/", false);
        assert!(matches!(result, Err(RequestError::InvalidInfrastructure(_))));
    }

    #[test_case(""; "empty")]
    #[test_case("localhost"; "no dot")]
    #[test_case("example..com"; "empty label")]
    #[test_case("example.com;reboot"; "metacharacter")]
    #[test_case("exa mple.com"; "whitespace")]
    #[test]
    fn request_rejects_domain(domain: &str) {
        let result = CloneRequest::new("dev-fi-01", domain, ".", "/", false);
        assert!(matches!(result, Err(RequestError::InvalidDomain(_))));
    }

    #[test]
    fn request_resolves_destination() {
        let request = CloneRequest::new("dev-fi-01", "example.com", "sites", "/home/dev", true).unwrap();
        assert_eq!(request.destination(), Path::new("/home/dev/sites"));
        assert!(request.clean());
    }
}
