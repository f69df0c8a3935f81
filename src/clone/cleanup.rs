// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Transient artifact cleanup.
//!
//! Dump, image archive, and the production snapshot image only live for the
//! duration of one run. Removal is best-effort: each failure is turned into a
//! [`CleanupIssue`] for the caller to report, and nothing here can fail the
//! clone.

use crate::{
    clone::snapshot::CloneArtifacts,
    config::Settings,
    names::DerivedNames,
    process::Process,
    remote::RemoteHost,
};

use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    io::ErrorKind,
    path::Path,
};
use tracing::{debug, instrument};

/// Artifact that could not be removed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupIssue {
    pub artifact: String,
    pub reason: String,
}

impl Display for CleanupIssue {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> FmtResult {
        write!(fmt, "could not remove {}: {}", self.artifact, self.reason)
    }
}

/// Remove transient artifacts of a clone run.
///
/// A file that is already gone does not count as an issue.
#[instrument(skip_all, level = "debug")]
pub async fn cleanup<P: Process>(
    process: &P,
    remote: RemoteHost<'_>,
    settings: &Settings,
    names: &DerivedNames,
    artifacts: &CloneArtifacts,
) -> Vec<CleanupIssue> {
    let mut issues = Vec::new();

    for path in [&artifacts.dump, &artifacts.image_archive] {
        if let Some(issue) = remove_file(path) {
            issues.push(issue);
        }
    }

    let rmi = remote.command(
        ["docker", "rmi", names.snapshot_image.as_str()],
        settings.timeouts.remote(),
    );
    match process.run(&rmi).await {
        Ok(_) => debug!("removed remote snapshot {}", names.snapshot_image),
        Err(error) if error.stderr_contains("no such image") => {
            debug!("remote snapshot {} already gone", names.snapshot_image)
        }
        Err(error) => issues.push(CleanupIssue {
            artifact: format!("remote snapshot {}", names.snapshot_image),
            reason: error.to_string(),
        }),
    }

    issues
}

fn remove_file(path: &Path) -> Option<CleanupIssue> {
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!("removed {}", path.display());
            None
        }
        Err(error) if error.kind() == ErrorKind::NotFound => None,
        Err(error) => Some(CleanupIssue {
            artifact: path.display().to_string(),
            reason: error.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn remove_file_tolerates_missing() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("dump.sql");
        std::fs::write(&path, "-- dump")?;

        assert_eq!(remove_file(&path), None);
        assert!(!path.exists());
        assert_eq!(remove_file(&path), None);

        Ok(())
    }

    #[test]
    fn remove_file_reports_directory() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let issue = remove_file(dir.path());
        assert!(issue.is_some());

        Ok(())
    }
}
