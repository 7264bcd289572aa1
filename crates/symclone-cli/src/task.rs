//! Task files and command-line overrides
//!
//! A task describes one convergence: where the tree comes from, where it goes
//! and what metadata to enforce. It can come from a task file, from flags or
//! from both, flags winning.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use symclone_core::{MetadataRequest, ModeSpec, Principal};
use symclone_fs::ConfigStore;

use crate::cli::Cli;
use crate::error::{CliError, Result};

/// One convergence request as written in a task file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Task {
    pub src: Option<PathBuf>,
    #[serde(alias = "dest", alias = "name")]
    pub path: Option<PathBuf>,
    pub mode: Option<ModeSpec>,
    pub owner: Option<Principal>,
    pub group: Option<Principal>,
}

/// A task with both endpoints known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub request: MetadataRequest,
}

impl Task {
    pub fn load(path: &Path) -> Result<Self> {
        Ok(ConfigStore::new().load(path)?)
    }

    /// Overlay every flag that was given on the command line.
    pub fn with_overrides(mut self, cli: &Cli) -> Result<Self> {
        if let Some(src) = &cli.src {
            self.src = Some(src.clone());
        }
        if let Some(dest) = &cli.dest {
            self.path = Some(dest.clone());
        }
        if let Some(mode) = &cli.mode {
            self.mode = Some(mode.parse()?);
        }
        if let Some(owner) = &cli.owner {
            self.owner = Some(Principal::from(owner.as_str()));
        }
        if let Some(group) = &cli.group {
            self.group = Some(Principal::from(group.as_str()));
        }
        Ok(self)
    }

    pub fn into_invocation(self) -> Result<Invocation> {
        let source = self
            .src
            .ok_or_else(|| CliError::user("missing required option: --src"))?;
        let destination = self
            .path
            .ok_or_else(|| CliError::user("missing required option: --dest"))?;

        Ok(Invocation {
            source,
            destination,
            request: MetadataRequest {
                mode: self.mode,
                owner: self.owner,
                group: self.group,
            },
        })
    }
}
