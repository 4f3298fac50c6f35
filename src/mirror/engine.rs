//! The recursive move/exclude/stub walk.

use anyhow::Result;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::debug;

use super::{EntryState, MirrorFlags, MirrorStats};
use crate::errors::StubMoveError;
use crate::location::{is_partial_name, transfer, EntryKind, Location, Sessions};
use crate::output;
use crate::stub::{self, EntryType};

/// Classify `loc`, decoding stubs.
pub(crate) fn entry_state(sessions: &mut Sessions, loc: &Location) -> Result<EntryState> {
    let backend = sessions.backend(loc)?;
    Ok(match backend.kind(loc.path())? {
        EntryKind::Absent => EntryState::Absent,
        EntryKind::File => EntryState::Real(EntryType::File),
        EntryKind::Dir => EntryState::Real(EntryType::Dir),
        EntryKind::Symlink => {
            let target = backend.read_link(loc.path())?;
            match stub::decode_target(&target) {
                Some(ty) => EntryState::Stub(ty),
                None => EntryState::Real(EntryType::Link),
            }
        }
    })
}

/// Proper ancestors of `sub`, outermost first. The root itself is not included.
fn ancestors_outward_in(sub: &Path) -> Vec<PathBuf> {
    let mut out: Vec<PathBuf> = sub
        .ancestors()
        .skip(1)
        .filter(|a| !a.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .collect();
    out.reverse();
    out
}

fn conflict(path: &Location, detail: String) -> anyhow::Error {
    StubMoveError::Conflict { path: path.clone(), detail }.into()
}

/// Mirror engine bound to one source/target root pair.
pub struct Mirror<'a> {
    source: Location,
    target: Location,
    excludes: &'a BTreeSet<PathBuf>,
    sessions: &'a mut Sessions,
    stats: MirrorStats,
}

impl<'a> Mirror<'a> {
    pub fn new(
        source: &Location,
        target: &Location,
        excludes: &'a BTreeSet<PathBuf>,
        sessions: &'a mut Sessions,
    ) -> Self {
        Self {
            source: source.clone(),
            target: target.clone(),
            excludes,
            sessions,
            stats: MirrorStats::default(),
        }
    }

    pub fn stats(&self) -> MirrorStats {
        self.stats
    }

    pub fn into_stats(self) -> MirrorStats {
        self.stats
    }

    fn state(&mut self, loc: &Location) -> Result<EntryState> {
        entry_state(self.sessions, loc)
    }

    /// True when some excluded subpath lies strictly below `sub`.
    fn has_excluded_descendant(&self, sub: &Path) -> bool {
        self.excludes.iter().any(|x| x.as_path() != sub && x.starts_with(sub))
    }

    /// Mirror `sub` from the source root to the target root.
    pub fn mirror(&mut self, sub: &Path, flags: MirrorFlags) -> Result<()> {
        let src = self.source.join(sub);
        let dst = self.target.join(sub);
        let src_state = self.state(&src)?;

        if flags.with_parents && src_state.is_real() {
            self.synthesize_ancestors(sub)?;
        }

        match src_state {
            EntryState::Real(EntryType::Dir) => self.mirror_dir(sub, &src, &dst, flags),
            EntryState::Real(ty) => self.mirror_leaf(&src, &dst, ty, flags),
            other => self.mirror_vacant(&src, &dst, other, flags),
        }
    }

    /// Synchronize stub state of `sub` without moving anything, as for an excluded child.
    pub fn mark(&mut self, sub: &Path) -> Result<()> {
        let src = self.source.join(sub);
        if self.state(&src)?.is_real() {
            self.synthesize_ancestors(sub)?;
        }
        self.mark_only(sub, false)
    }

    fn synthesize_ancestors(&mut self, sub: &Path) -> Result<()> {
        for ancestor in ancestors_outward_in(sub) {
            self.mirror(&ancestor, MirrorFlags::ancestor())?;
        }
        Ok(())
    }

    fn mirror_dir(&mut self, sub: &Path, src: &Location, dst: &Location, flags: MirrorFlags) -> Result<()> {
        self.ensure_target_dir(dst)?;

        let children = self.sessions.backend(src)?.list_dir(src.path())?;
        // The source root itself is never removed.
        let should_delete = flags.recursive && !sub.as_os_str().is_empty() && !self.has_excluded_descendant(sub);
        debug!(path = %src, children = children.len(), should_delete, "mirroring directory");

        for name in children {
            if is_partial_name(&name) {
                // Leftover of an interrupted transfer into this directory.
                let leftover = src.join(Path::new(&name));
                debug!(path = %leftover, "removing partial transfer");
                self.sessions.backend(src)?.remove_file(leftover.path())?;
                continue;
            }
            let child = sub.join(&name);
            if !flags.recursive || self.excludes.contains(&child) {
                self.mark_only(&child, should_delete)?;
            } else {
                let child_flags = MirrorFlags {
                    recursive: true,
                    with_parents: false,
                    create_stub: !should_delete,
                };
                self.mirror(&child, child_flags)?;
            }
        }

        if should_delete {
            self.sessions.backend(src)?.remove_dir(src.path())?;
            self.stats.dirs_removed += 1;
            debug!(path = %src, "removed vacated directory");
            if flags.create_stub {
                self.write_stub(src, EntryType::Dir)?;
            }
        }
        Ok(())
    }

    fn mirror_leaf(&mut self, src: &Location, dst: &Location, ty: EntryType, flags: MirrorFlags) -> Result<()> {
        match self.state(dst)? {
            EntryState::Real(existing) => {
                return Err(conflict(dst, format!("already exists ({existing})")));
            }
            EntryState::Stub(_) => self.remove_stub(dst)?,
            EntryState::Absent => {}
        }

        output::status(&format!("moving {src}"));
        if ty == EntryType::Link {
            transfer::relocate_symlink(self.sessions, src, dst)?;
            self.stats.links_moved += 1;
        } else {
            let bytes = transfer::relocate_file(self.sessions, src, dst)?;
            self.stats.files_moved += 1;
            self.stats.bytes_moved += bytes;
        }
        debug!(src = %src, dst = %dst, kind = %ty, "moved");

        if flags.create_stub {
            self.write_stub(src, ty)?;
        }
        Ok(())
    }

    /// Source holds nothing real: only the source stub may need updating.
    fn mirror_vacant(&mut self, src: &Location, dst: &Location, current: EntryState, flags: MirrorFlags) -> Result<()> {
        let desired = if flags.create_stub { self.state(dst)?.real() } else { None };
        self.sync_stub(src, current.stub(), desired)
    }

    /// Record `child` on the other side without moving any content.
    fn mark_only(&mut self, child: &Path, parent_deleted: bool) -> Result<()> {
        let src = self.source.join(child);
        let dst = self.target.join(child);
        match self.state(&src)? {
            EntryState::Real(EntryType::Dir) => match self.state(&dst)? {
                EntryState::Real(EntryType::Dir) => Ok(()),
                EntryState::Real(existing) => Err(conflict(
                    &dst,
                    format!("already exists and is not a directory ({existing})"),
                )),
                other => self.sync_stub(&dst, other.stub(), Some(EntryType::Dir)),
            },
            EntryState::Real(ty) => match self.state(&dst)? {
                EntryState::Real(existing) => Err(conflict(&dst, format!("already exists ({existing})"))),
                other => self.sync_stub(&dst, other.stub(), Some(ty)),
            },
            other => {
                let desired = if parent_deleted { None } else { self.state(&dst)?.real() };
                self.sync_stub(&src, other.stub(), desired)
            }
        }
    }

    fn ensure_target_dir(&mut self, dst: &Location) -> Result<()> {
        match self.state(dst)? {
            EntryState::Real(EntryType::Dir) => return Ok(()),
            EntryState::Real(existing) => {
                return Err(conflict(dst, format!("already exists and is not a directory ({existing})")));
            }
            EntryState::Stub(_) => self.remove_stub(dst)?,
            EntryState::Absent => {}
        }
        self.sessions.backend(dst)?.create_dir(dst.path())?;
        self.stats.dirs_created += 1;
        debug!(path = %dst, "created directory");
        Ok(())
    }

    /// Make the stub at `loc` (currently `current`) record `desired`; no-op when they match.
    fn sync_stub(&mut self, loc: &Location, current: Option<EntryType>, desired: Option<EntryType>) -> Result<()> {
        if current == desired {
            return Ok(());
        }
        if current.is_some() {
            self.remove_stub(loc)?;
        }
        if let Some(ty) = desired {
            if current.is_none() && !self.parent_is_dir(loc)? {
                // Already covered by a stub (or gone) further up.
                debug!(path = %loc, "parent vacated, no stub needed");
                return Ok(());
            }
            self.write_stub(loc, ty)?;
        }
        Ok(())
    }

    fn parent_is_dir(&mut self, loc: &Location) -> Result<bool> {
        match loc.parent() {
            Some(parent) => Ok(self.state(&parent)? == EntryState::Real(EntryType::Dir)),
            None => Ok(false),
        }
    }

    fn write_stub(&mut self, loc: &Location, ty: EntryType) -> Result<()> {
        let marker = stub::encode(ty);
        self.sessions.backend(loc)?.symlink(Path::new(&marker), loc.path())?;
        self.stats.stubs_written += 1;
        debug!(path = %loc, kind = %ty, "wrote stub");
        Ok(())
    }

    fn remove_stub(&mut self, loc: &Location) -> Result<()> {
        self.sessions.backend(loc)?.remove_file(loc.path())?;
        self.stats.stubs_removed += 1;
        debug!(path = %loc, "removed stub");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ancestors_run_outermost_first() {
        assert_eq!(
            ancestors_outward_in(Path::new("a/b/c")),
            vec![PathBuf::from("a"), PathBuf::from("a/b")]
        );
        assert!(ancestors_outward_in(Path::new("top")).is_empty());
    }
}
