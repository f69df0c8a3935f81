// SPDX-FileCopyrightText: 2025 Jason Pena <jasonpena@awkless.com>
// SPDX-License-Identifier: MIT

//! Clone production WordPress sites into local Docker infrastructure.
//!
//! A production site runs as a compose stack on a remote host. wpclone
//! snapshots its container, dumps its database, mirrors its files, and
//! rebuilds the whole thing as a __site instance__ on the local machine,
//! reachable under `local-{domain}` through the shared reverse proxy of a
//! named __infrastructure__.
//!
//! See [`clone::Pipeline`] for the full sequence of steps.

pub mod clone;
pub mod compose;
pub mod config;
pub mod lock;
pub mod names;
pub mod path;
pub mod process;
pub mod remote;

pub use clone::{CloneError, Pipeline, SiteInstance};
pub use config::{InfrastructureContext, Settings};
pub use names::{CloneRequest, DerivedNames};
pub use process::{CommandSpec, Process, ProcessError, TokioProcess};
