//! Run driver: checks roots, prunes excludes and mirrors every operand in order.

use anyhow::Result;
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use super::engine::entry_state;
use super::{EntryState, Mirror, MirrorFlags, MirrorStats};
use crate::errors::StubMoveError;
use crate::location::{Location, Sessions};
use crate::output;
use crate::resolve::{Direction, Resolved, RootPair};
use crate::stub::EntryType;

/// Keep only excludes that are currently real at the source; stale ones are ignored.
pub fn prune_excludes(
    sessions: &mut Sessions,
    source: &Location,
    excludes: &BTreeSet<PathBuf>,
) -> Result<BTreeSet<PathBuf>> {
    let mut kept = BTreeSet::new();
    for sub in excludes {
        if entry_state(sessions, &source.join(sub))?.is_real() {
            kept.insert(sub.clone());
        } else {
            debug!(exclude = %sub.display(), "ignoring exclude with no real source entry");
        }
    }
    Ok(kept)
}

fn ensure_root(sessions: &mut Sessions, root: &Location) -> Result<()> {
    match entry_state(sessions, root)? {
        EntryState::Real(EntryType::Dir) => Ok(()),
        _ => Err(StubMoveError::RootInvalid(root.clone()).into()),
    }
}

/// Mirror every operand from the direction's source root to its target root.
///
/// Stops at the first error; operands already processed stay applied.
pub fn run(
    sessions: &mut Sessions,
    roots: &RootPair,
    direction: Direction,
    resolved: &Resolved,
) -> Result<MirrorStats> {
    let source = roots.source(direction);
    let target = roots.target(direction);
    ensure_root(sessions, source)?;
    ensure_root(sessions, target)?;

    let excludes = prune_excludes(sessions, source, &resolved.excludes)?;
    let mut engine = Mirror::new(source, target, &excludes, sessions);

    for op in &resolved.operands {
        let loc = source.join(&op.sub);
        info!(path = %loc, recursive = op.recursive, "begin mirroring");
        output::status(&format!("mirroring {loc}"));

        if excludes.iter().any(|x| op.sub.starts_with(x)) {
            warn!(path = %loc, "operand is excluded; only stub state is synchronized");
            engine.mark(&op.sub)?;
        } else {
            engine.mirror(&op.sub, MirrorFlags::operand(op.recursive))?;
        }

        output::clear_status();
        let stats = engine.stats();
        info!(path = %loc, moved = stats.transfers(), stubs = stats.stubs_written, "mirroring done");
    }
    Ok(engine.into_stats())
}
