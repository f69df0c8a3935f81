// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

use wpclone::{
    clone::{CloneError, Pipeline, STEPS},
    config::Settings,
    names::CloneRequest,
    path::default_settings_path,
    process::TokioProcess,
};

use anyhow::{Context, Result};
use clap::{error::ErrorKind, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::{path::PathBuf, process::exit, time::Duration};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Debug, Clone, Parser)]
#[command(
    about,
    override_usage = "\n  wpclone [options] clone <infrastructure> <domain> [folder] [--clean]\n  wpclone [options] verify <infrastructure>",
    subcommand_help_heading = "Commands",
    version
)]
struct Cli {
    /// Path to settings file.
    #[arg(short, long, global = true, value_name = "path")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    async fn run(self) -> Result<()> {
        let settings = load_settings(self.config)?;
        match self.command {
            Command::Clone(opts) => run_clone(settings, opts).await,
            Command::Verify(opts) => run_verify(settings, opts).await,
        }
    }
}

#[derive(Debug, Clone, Subcommand)]
enum Command {
    /// Clone production site into local infrastructure.
    #[command(override_usage = "wpclone clone [options] <infrastructure> <domain> [folder] [--clean]")]
    Clone(CloneOptions),

    /// Check that local infrastructure is ready for cloning.
    #[command(override_usage = "wpclone verify [options] <infrastructure>")]
    Verify(VerifyOptions),
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct CloneOptions {
    /// Name of local infrastructure to clone into.
    #[arg(required = true, value_name = "infrastructure")]
    pub infrastructure: String,

    /// Production domain to clone.
    #[arg(required = true, value_name = "domain")]
    pub domain: String,

    /// Folder to place site directory in.
    #[arg(default_value = ".", value_name = "folder")]
    pub folder: PathBuf,

    /// Tear down existing local site before cloning.
    #[arg(long)]
    pub clean: bool,
}

#[derive(Parser, Clone, Debug)]
#[command(author, about, long_about)]
struct VerifyOptions {
    /// Name of local infrastructure to check.
    #[arg(required = true, value_name = "infrastructure")]
    pub infrastructure: String,
}

#[tokio::main]
async fn main() {
    let layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_timer(false)
        .without_time();
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(layer)
        .with(filter)
        .init();

    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(error) => {
            // INVARIANT: Help and version requests are not usage errors.
            let code = match error.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => 0,
                _ => 1,
            };
            let _ = error.print();
            exit(code);
        }
    };

    if let Err(error) = cli.run().await {
        error!("{error:?}");
        if let Some(clone_error) = error.downcast_ref::<CloneError>() {
            error!("{} failure: {}", clone_error.category(), clone_error.hint());
        }
        exit(1);
    }

    exit(0)
}

fn load_settings(path: Option<PathBuf>) -> Result<Settings> {
    let path = match path {
        Some(path) => path,
        None => default_settings_path()?,
    };

    Settings::load(&path).with_context(|| format!("failed to load settings from {path:?}"))
}

async fn run_clone(settings: Settings, opts: CloneOptions) -> Result<()> {
    let cwd = std::env::current_dir().context("failed to determine current directory")?;
    let request = CloneRequest::new(opts.infrastructure, opts.domain, opts.folder, cwd, opts.clean)
        .map_err(CloneError::from)?;

    let bar = ProgressBar::new(STEPS);
    let style = ProgressStyle::with_template(
        "{elapsed_precise:.green}  {msg:<40}  [{wide_bar:.yellow/blue}] {pos}/{len}",
    )?
    .progress_chars("-Cco.");
    bar.set_style(style);
    bar.enable_steady_tick(Duration::from_millis(100));

    let pipeline = Pipeline::new(settings, TokioProcess, bar);
    let site = pipeline.run(&request).await?;

    info!("site ready at {}", site.site_url);
    info!("files in {}", site.directory.display());
    info!("database {} in container {}", site.database_name, site.container_name);

    Ok(())
}

async fn run_verify(settings: Settings, opts: VerifyOptions) -> Result<()> {
    let pipeline = Pipeline::new(settings, TokioProcess, ProgressBar::hidden());
    let context = pipeline.verify(&opts.infrastructure).await?;

    info!(
        "infrastructure {} ready, production host is {}",
        context.name,
        context.ssh_target()
    );

    Ok(())
}
