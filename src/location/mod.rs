//! Location capability.
//!
//! A [`Location`] names one filesystem entry, either on this machine or on a
//! host reached through a remote session. Every operation the mirror engine
//! needs goes through the [`Backend`] trait, implemented by [`LocalFs`] and
//! [`RemoteSession`]; [`Sessions`] hands out the right one for a location.
//!
//! Notes:
//! - Nothing here follows symlinks. Stubs are symlinks to nonsense targets.
//! - Children are always returned sorted by raw file name so runs are reproducible.

mod helpers;
mod local;
mod remote;
mod sessions;
pub mod transfer;

use anyhow::{bail, Result};
use std::ffi::{OsStr, OsString};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub use helpers::io_error_with_help;
pub use local::LocalFs;
pub use remote::{RemoteSession, SshSettings};
pub use sessions::Sessions;

/// Raw classification of an entry, before stub decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Dir,
    Symlink,
    Absent,
}

/// Authenticated host identity as handed to the ssh client (`[user@]host`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HostId(String);

impl HostId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HostId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of one filesystem entry. Equality is structural.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    Local(PathBuf),
    Remote { host: HostId, path: PathBuf },
}

impl Location {
    /// Parse `host:/abs/path` or a local path. Relative local paths are joined onto `cwd`.
    /// The result is normalized lexically; symlinks are never resolved.
    pub fn parse(spec: &str, cwd: &Path) -> Result<Self> {
        if let Some((host, path)) = split_remote(spec) {
            if host.is_empty() {
                bail!("Empty host in remote path '{spec}'");
            }
            if !path.starts_with('/') {
                bail!("Remote path must be absolute: '{spec}'");
            }
            return Ok(Location::Remote {
                host: HostId::new(host),
                path: normalize(Path::new(path)),
            });
        }
        let p = Path::new(spec);
        let abs = if p.is_absolute() { p.to_path_buf() } else { cwd.join(p) };
        Ok(Location::Local(normalize(&abs)))
    }

    pub fn path(&self) -> &Path {
        match self {
            Location::Local(p) => p,
            Location::Remote { path, .. } => path,
        }
    }

    pub fn host(&self) -> Option<&HostId> {
        match self {
            Location::Local(_) => None,
            Location::Remote { host, .. } => Some(host),
        }
    }

    /// Location of `sub` below this one. An empty `sub` yields `self`.
    pub fn join(&self, sub: &Path) -> Self {
        if sub.as_os_str().is_empty() {
            return self.clone();
        }
        match self {
            Location::Local(p) => Location::Local(p.join(sub)),
            Location::Remote { host, path } => Location::Remote {
                host: host.clone(),
                path: path.join(sub),
            },
        }
    }

    /// Containing directory on the same machine.
    pub fn parent(&self) -> Option<Self> {
        let parent = self.path().parent()?.to_path_buf();
        Some(match self {
            Location::Local(_) => Location::Local(parent),
            Location::Remote { host, .. } => Location::Remote { host: host.clone(), path: parent },
        })
    }

    /// True when both live on the same machine (same backend, same host).
    pub fn same_side(&self, other: &Location) -> bool {
        self.host() == other.host()
    }

    /// Subpath of `self` below `root`, if `root` is a structural prefix.
    pub fn strip_root(&self, root: &Location) -> Option<PathBuf> {
        if !self.same_side(root) {
            return None;
        }
        self.path().strip_prefix(root.path()).ok().map(Path::to_path_buf)
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Local(p) => write!(f, "{}", p.display()),
            Location::Remote { host, path } => write!(f, "{}:{}", host, path.display()),
        }
    }
}

/// Split `host:path` (scp convention: the part before the first `:` holds no `/`).
fn split_remote(spec: &str) -> Option<(&str, &str)> {
    let (host, path) = spec.split_once(':')?;
    if host.contains('/') {
        return None;
    }
    Some((host, path))
}

const PARTIAL_PREFIX: &str = ".stub_move.";
const PARTIAL_SUFFIX: &str = ".part";

/// Fresh name for an in-flight transfer file, unique per process and instant.
pub(crate) fn partial_name() -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("{PARTIAL_PREFIX}{}.{nanos}{PARTIAL_SUFFIX}", std::process::id())
}

/// True for leftovers of an interrupted transfer. These are never mirrored.
pub fn is_partial_name(name: &OsStr) -> bool {
    name.to_str()
        .is_some_and(|n| n.starts_with(PARTIAL_PREFIX) && n.ends_with(PARTIAL_SUFFIX))
}

/// Lexical normalization: drops `.`, lets `..` pop a component, keeps the root.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for comp in path.components() {
        match comp {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(comp);
                }
            }
            other => out.push(other),
        }
    }
    out
}

/// Uniform interface over the entries of one machine.
///
/// Every call blocks until the operation completes. Removal of an entry that
/// is already gone succeeds, so a concurrent deletion is treated as "absent".
pub trait Backend {
    /// Classify `path` without following a final symlink.
    fn kind(&mut self, path: &Path) -> Result<EntryKind>;
    /// Child names of directory `path`, sorted byte-wise.
    fn list_dir(&mut self, path: &Path) -> Result<Vec<OsString>>;
    fn create_dir(&mut self, path: &Path) -> Result<()>;
    /// Create a symlink at `path` whose target text is `target`.
    fn symlink(&mut self, target: &Path, path: &Path) -> Result<()>;
    /// Remove a file or symlink.
    fn remove_file(&mut self, path: &Path) -> Result<()>;
    /// Remove an empty directory.
    fn remove_dir(&mut self, path: &Path) -> Result<()>;
    fn read_link(&mut self, path: &Path) -> Result<PathBuf>;
}
