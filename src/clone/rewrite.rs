// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Site URL rewriting.
//!
//! The imported database still points at production. Every absolute URL is
//! rewritten to the local domain with wp-cli's literal search-replace, which
//! also handles serialized PHP values. Both replacement sources carry their
//! scheme, so `https://example.com` never matches inside
//! `https://myexample.com`. Hosts that merely extend the domain on the right,
//! such as `https://example.com.au`, are still rewritten.
//!
//! The object cache goes first. The production Redis integration would try
//! to reach a backend the local infrastructure may not provide, and then
//! every following command would fail.

use crate::{
    clone::launch::wp,
    config::Settings,
    names::DerivedNames,
    process::{Process, ProcessError},
};

use tracing::{info, instrument, warn};

/// Search and replace pairs turning production URLs into the local URL.
pub fn url_rewrites(names: &DerivedNames) -> [(String, String); 2] {
    let local = names.local_url();
    [
        (format!("https://{}", names.production_domain), local.clone()),
        (format!("http://{}", names.production_domain), local),
    ]
}

/// Point imported site at local domain.
///
/// Returns the site URL WordPress reports afterwards.
///
/// # Errors
///
/// - Return [`RewriteError::Command`] if search-replace, cache flush, or
///   URL read back fail.
/// - Return [`RewriteError::SiteUrlMismatch`] if the site still reports
///   another URL.
#[instrument(skip_all, level = "debug")]
pub async fn rewrite_site<P: Process>(
    process: &P,
    settings: &Settings,
    names: &DerivedNames,
) -> Result<String> {
    for args in [
        vec!["redis", "disable"],
        vec!["plugin", "deactivate", "redis-cache"],
    ] {
        let command = wp(settings, names, args);
        if let Err(error) = process.run(&command).await {
            warn!("object cache not disabled, continuing: {error}");
        }
    }

    for (from, to) in url_rewrites(names) {
        info!("replace {from} with {to}");
        let command = wp(
            settings,
            names,
            [
                "search-replace".to_string(),
                from,
                to,
                "--all-tables".into(),
                "--precise".into(),
                "--skip-columns=guid".into(),
            ],
        )
        .with_timeout(settings.timeouts.transfer());
        process.run(&command).await?;
    }

    process.run(&wp(settings, names, ["cache", "flush"])).await?;

    let site_url = process
        .run(&wp(settings, names, ["option", "get", "siteurl"]))
        .await?
        .trim()
        .to_string();
    let expect = names.local_url();
    if site_url != expect {
        return Err(RewriteError::SiteUrlMismatch {
            expect,
            found: site_url,
        });
    }

    info!("site answers as {site_url}");
    Ok(site_url)
}

#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error(transparent)]
    Command(#[from] ProcessError),

    #[error("site reports URL {found:?} instead of {expect:?}")]
    SiteUrlMismatch { expect: String, found: String },
}

/// Friendly result alias :3
type Result<T, E = RewriteError> = std::result::Result<T, E>;
