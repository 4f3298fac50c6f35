//! Stub-aware mirroring.
//!
//! Moves real content from a source root to a target root, leaving typed stubs
//! on the vacated side. The walk is single-threaded, depth-first and visits
//! children in sorted order. Any occupancy conflict aborts the whole run.

mod engine;
mod run;

pub use engine::Mirror;
pub use run::{prune_excludes, run};

use std::fmt;

use crate::stub::EntryType;

/// Per-call switches of [`Mirror::mirror`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MirrorFlags {
    /// Move content below directories, not just the directory skeleton.
    pub recursive: bool,
    /// Synthesize the target's ancestor directories first.
    pub with_parents: bool,
    /// Leave a stub at the source once content is gone.
    pub create_stub: bool,
}

impl MirrorFlags {
    /// Flags for a command-line operand.
    pub fn operand(recursive: bool) -> Self {
        Self { recursive, with_parents: true, create_stub: true }
    }

    pub(crate) fn ancestor() -> Self {
        Self { recursive: false, with_parents: false, create_stub: true }
    }
}

/// What one location holds, as the engine sees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryState {
    Absent,
    Stub(EntryType),
    Real(EntryType),
}

impl EntryState {
    pub fn real(self) -> Option<EntryType> {
        match self {
            EntryState::Real(ty) => Some(ty),
            _ => None,
        }
    }

    pub fn is_real(self) -> bool {
        matches!(self, EntryState::Real(_))
    }

    pub fn stub(self) -> Option<EntryType> {
        match self {
            EntryState::Stub(ty) => Some(ty),
            _ => None,
        }
    }
}

/// Counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MirrorStats {
    pub files_moved: u64,
    pub links_moved: u64,
    pub bytes_moved: u64,
    pub dirs_created: u64,
    pub dirs_removed: u64,
    pub stubs_written: u64,
    pub stubs_removed: u64,
}

impl MirrorStats {
    /// Entries whose content changed sides.
    pub fn transfers(&self) -> u64 {
        self.files_moved + self.links_moved
    }

    /// True when the run changed nothing on either side.
    pub fn is_noop(&self) -> bool {
        *self == MirrorStats::default()
    }
}

impl fmt::Display for MirrorStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} files ({} bytes) and {} links moved, {} dirs created, {} dirs removed, {} stubs written, {} stubs removed",
            self.files_moved,
            self.bytes_moved,
            self.links_moved,
            self.dirs_created,
            self.dirs_removed,
            self.stubs_written,
            self.stubs_removed
        )
    }
}
