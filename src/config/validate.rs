//! Config validation logic.
//! Turns the configured root strings into a checked RootPair: both present,
//! absolute, disjoint, and (when local) existing directories.

use anyhow::{bail, Result};
use std::path::Path;
use tracing::{error, info};

use super::types::Config;
use crate::errors::StubMoveError;
use crate::location::Location;
use crate::resolve::RootPair;

impl Config {
    /// Validate the roots and build the pair. Remote roots are checked when the session opens.
    pub fn roots(&self, cwd: &Path) -> Result<RootPair> {
        let origin = parse_root(self.origin.as_deref(), "origin", cwd)?;
        let archive = parse_root(self.archive.as_deref(), "archive", cwd)?;

        ensure_local_dir(&origin, "origin")?;
        ensure_local_dir(&archive, "archive")?;

        let roots = RootPair::new(origin, archive)?;
        info!(origin = %roots.origin(), archive = %roots.archive(), "Config validated");
        Ok(roots)
    }
}

fn parse_root(raw: Option<&str>, name: &str, cwd: &Path) -> Result<Location> {
    match raw {
        Some(r) => Location::parse(r, cwd),
        None => bail!("{name} root is not configured"),
    }
}

/// A local root must exist and be a real directory (not a symlink or stub).
fn ensure_local_dir(root: &Location, name: &str) -> Result<()> {
    if let Location::Local(p) = root {
        let is_dir = std::fs::symlink_metadata(p).map(|m| m.is_dir()).unwrap_or(false);
        if !is_dir {
            error!("{name} root is missing or not a directory: {}", p.display());
            return Err(StubMoveError::RootInvalid(root.clone()).into());
        }
    }
    Ok(())
}
