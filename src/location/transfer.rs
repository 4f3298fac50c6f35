//! Byte transfer between locations.
//! One dispatch table over the four local/remote pairings. Every arm leaves
//! the content at `to` and the source removed. Copies are published under the
//! final name only once complete, so a failed copy leaves `to` absent.

use anyhow::Result;
use std::io::Cursor;
use tracing::{debug, warn};

use super::helpers::io_error_with_help;
use super::local::write_new_file;
use super::{Backend, Location, Sessions};

/// Move the regular file at `from` to `to` (which must be absent).
/// Returns the byte count, or 0 when a remote host renamed it in place.
pub fn relocate_file(sessions: &mut Sessions, from: &Location, to: &Location) -> Result<u64> {
    match (from, to) {
        (Location::Local(src), Location::Local(dst)) => {
            let local = sessions.local();
            let len = std::fs::symlink_metadata(src)
                .map_err(io_error_with_help("inspect", src))?
                .len();
            match local.rename(src, dst) {
                Ok(()) => {
                    debug!(src = %src.display(), dst = %dst.display(), "renamed");
                    Ok(len)
                }
                Err(e) if e.raw_os_error() == Some(libc::EXDEV) => {
                    warn!(src = %src.display(), dst = %dst.display(), "cross-device rename, using copy+remove");
                    let bytes = local.copy_file(src, dst)?;
                    local.remove_file(src)?;
                    Ok(bytes)
                }
                Err(e) => Err(io_error_with_help("rename", src)(e)),
            }
        }
        (Location::Local(src), Location::Remote { host, path: dst }) => {
            let mut file = sessions.local().open_read(src)?;
            let bytes = sessions.remote(host)?.put_file(dst, &mut file)?;
            drop(file);
            sessions.local().remove_file(src)?;
            Ok(bytes)
        }
        (Location::Remote { host, path: src }, Location::Local(dst)) => {
            let remote = sessions.remote(host)?;
            let bytes = write_new_file(dst, |file| remote.get_file(src, file))?;
            remote.remove_file(src)?;
            Ok(bytes)
        }
        (Location::Remote { host: h1, path: src }, Location::Remote { host: h2, path: dst }) => {
            if h1 == h2 {
                sessions.remote(h1)?.rename(src, dst)?;
                return Ok(0);
            }
            let mut buf = Vec::new();
            sessions.remote(h1)?.get_file(src, &mut buf)?;
            let bytes = sessions.remote(h2)?.put_file(dst, &mut Cursor::new(buf))?;
            sessions.remote(h1)?.remove_file(src)?;
            Ok(bytes)
        }
    }
}

/// Move the symlink at `from` to `to`, carrying its target text (never followed).
pub fn relocate_symlink(sessions: &mut Sessions, from: &Location, to: &Location) -> Result<()> {
    let target = sessions.backend(from)?.read_link(from.path())?;
    sessions.backend(to)?.symlink(&target, to.path())?;
    sessions.backend(from)?.remove_file(from.path())
}
