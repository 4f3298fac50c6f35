//! I/O error adapters.
//!
//! Enrich io::Error with the operation, the path and a short actionable hint,
//! usable with map_err in anyhow::Result code paths.
//!
//! Usage:
//!   fs::create_dir(dir).map_err(io_error_with_help("create directory", dir))?;

use anyhow::anyhow;
use std::io;
use std::path::Path;

fn hint_for_code(code: i32) -> Option<&'static str> {
    match code {
        libc::EACCES | libc::EPERM => Some("permission denied; check ownership and write permissions"),
        libc::ENOENT => Some("path not found; a parent may have been vacated or removed"),
        libc::EEXIST => Some("already exists; the receiving side is occupied"),
        libc::ENOTEMPTY => Some("directory not empty; something was written into it during the run"),
        libc::ENOTDIR => Some("a path component is not a directory; a stub may sit in the way"),
        libc::ELOOP => Some("too many symbolic link levels; possible symlink cycle"),
        libc::EXDEV => Some("cross-filesystem; rename not possible"),
        libc::ENOSPC => Some("insufficient space on device"),
        libc::EROFS => Some("read-only filesystem; cannot write here"),
        libc::ENAMETOOLONG => Some("filename or path too long"),
        _ => None,
    }
}

fn hint_for_kind(kind: io::ErrorKind) -> Option<&'static str> {
    match kind {
        io::ErrorKind::PermissionDenied => Some("permission denied; check ownership and write permissions"),
        io::ErrorKind::NotFound => Some("path not found; a parent may have been vacated or removed"),
        io::ErrorKind::AlreadyExists => Some("already exists; the receiving side is occupied"),
        _ => None,
    }
}

/// "<op> '<path>': <error>; <hint> [os code: N]"
fn build_message(op: &str, path: &Path, e: &io::Error) -> String {
    let mut msg = format!("{} '{}': {}", op, path.display(), e);
    let hint = match e.raw_os_error() {
        Some(code) => hint_for_code(code),
        None => hint_for_kind(e.kind()),
    };
    if let Some(h) = hint {
        msg.push_str("; ");
        msg.push_str(h);
    }
    if let Some(code) = e.raw_os_error() {
        msg.push_str(&format!(" [os code: {code}]"));
    }
    msg
}

/// Closure for `.map_err(...)` converting io::Error -> anyhow::Error.
pub fn io_error_with_help<'a>(op: &'a str, path: &'a Path) -> impl FnOnce(io::Error) -> anyhow::Error + 'a {
    move |e: io::Error| anyhow!(build_message(op, path, &e))
}
