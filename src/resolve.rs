//! Root resolution.
//! Maps user-given operands onto subpaths relative to the root pair.
//!
//! Notes:
//! - Operands are made absolute lexically; symlinks are never resolved. A stub
//!   is a symlink to a nonsense target and following it would land in a phantom path.
//! - All operands and excludes are resolved before anything is mutated.

use anyhow::{bail, Result};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::errors::StubMoveError;
use crate::location::Location;

/// Which way content flows between the two configured roots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Direction {
    /// origin -> archive
    Put,
    /// archive -> origin
    Get,
}

/// The two roots of a run. Neither contains the other.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootPair {
    origin: Location,
    archive: Location,
}

impl RootPair {
    pub fn new(origin: Location, archive: Location) -> Result<Self> {
        for root in [&origin, &archive] {
            if !root.path().is_absolute() {
                bail!("Root must be an absolute path: {root}");
            }
        }
        if origin.strip_root(&archive).is_some() || archive.strip_root(&origin).is_some() {
            return Err(StubMoveError::OverlappingRoots { a: origin, b: archive }.into());
        }
        Ok(Self { origin, archive })
    }

    pub fn origin(&self) -> &Location {
        &self.origin
    }

    pub fn archive(&self) -> &Location {
        &self.archive
    }

    pub fn source(&self, direction: Direction) -> &Location {
        match direction {
            Direction::Put => &self.origin,
            Direction::Get => &self.archive,
        }
    }

    pub fn target(&self, direction: Direction) -> &Location {
        match direction {
            Direction::Put => &self.archive,
            Direction::Get => &self.origin,
        }
    }

    /// Subpath of `loc` under whichever root is its prefix.
    pub fn subpath_of(&self, loc: &Location) -> Option<PathBuf> {
        loc.strip_root(&self.origin).or_else(|| loc.strip_root(&self.archive))
    }
}

/// One path operand, reduced to a root-relative subpath.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operand {
    pub sub: PathBuf,
    /// False for shallow operands (written with a trailing separator).
    pub recursive: bool,
}

/// Everything the mirror engine needs from the command line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Resolved {
    pub operands: Vec<Operand>,
    pub excludes: BTreeSet<PathBuf>,
}

fn has_trailing_separator(raw: &str) -> bool {
    raw.len() > 1 && raw.ends_with('/')
}

/// Resolve one operand against the roots.
pub fn resolve_operand(raw: &str, roots: &RootPair, cwd: &Path) -> Result<Operand> {
    let loc = Location::parse(raw, cwd)?;
    let sub = roots
        .subpath_of(&loc)
        .ok_or_else(|| StubMoveError::OutsideRoots(raw.to_string()))?;
    let recursive = !has_trailing_separator(raw);
    debug!(operand = raw, sub = %sub.display(), recursive, "resolved operand");
    Ok(Operand { sub, recursive })
}

/// Resolve all operands and excludes; fails on the first one outside both roots.
pub fn resolve_all<S: AsRef<str>>(
    operands: &[S],
    excludes: &[S],
    roots: &RootPair,
    cwd: &Path,
) -> Result<Resolved> {
    let operands = operands
        .iter()
        .map(|raw| resolve_operand(raw.as_ref(), roots, cwd))
        .collect::<Result<Vec<_>>>()?;
    let excludes = excludes
        .iter()
        .map(|raw| {
            let sub = resolve_operand(raw.as_ref(), roots, cwd)?.sub;
            if sub.as_os_str().is_empty() {
                bail!("Cannot exclude a root itself: {}", raw.as_ref());
            }
            Ok(sub)
        })
        .collect::<Result<BTreeSet<_>>>()?;
    Ok(Resolved { operands, excludes })
}
