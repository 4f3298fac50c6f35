//! Local filesystem backend.

use anyhow::{anyhow, Context, Result};
use std::ffi::OsString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use super::helpers::io_error_with_help;
use super::{Backend, EntryKind, Location};
use crate::errors::StubMoveError;

/// Backend for paths on this machine.
#[derive(Debug, Default)]
pub struct LocalFs;

/// "Not there" for our purposes: missing, or a parent component is not a directory.
fn is_absent(e: &io::Error) -> bool {
    if e.kind() == io::ErrorKind::NotFound {
        return true;
    }
    e.raw_os_error() == Some(libc::ENOTDIR)
}

impl Backend for LocalFs {
    fn kind(&mut self, path: &Path) -> Result<EntryKind> {
        let meta = match fs::symlink_metadata(path) {
            Ok(m) => m,
            Err(e) if is_absent(&e) => return Ok(EntryKind::Absent),
            Err(e) => return Err(io_error_with_help("inspect", path)(e)),
        };
        let ft = meta.file_type();
        if ft.is_symlink() {
            Ok(EntryKind::Symlink)
        } else if ft.is_dir() {
            Ok(EntryKind::Dir)
        } else if ft.is_file() {
            Ok(EntryKind::File)
        } else {
            Err(StubMoveError::UnsupportedKind(Location::Local(path.to_path_buf())).into())
        }
    }

    fn list_dir(&mut self, path: &Path) -> Result<Vec<OsString>> {
        WalkDir::new(path)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .map(|entry| {
                entry
                    .map(|e| e.file_name().to_os_string())
                    .with_context(|| format!("list directory '{}'", path.display()))
            })
            .collect()
    }

    fn create_dir(&mut self, path: &Path) -> Result<()> {
        fs::create_dir(path).map_err(io_error_with_help("create directory", path))
    }

    fn symlink(&mut self, target: &Path, path: &Path) -> Result<()> {
        std::os::unix::fs::symlink(target, path).map_err(io_error_with_help("create symlink", path))
    }

    fn remove_file(&mut self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Err(e) if !is_absent(&e) => Err(io_error_with_help("remove", path)(e)),
            _ => Ok(()),
        }
    }

    fn remove_dir(&mut self, path: &Path) -> Result<()> {
        match fs::remove_dir(path) {
            Err(e) if !is_absent(&e) => Err(io_error_with_help("remove directory", path)(e)),
            _ => Ok(()),
        }
    }

    fn read_link(&mut self, path: &Path) -> Result<PathBuf> {
        fs::read_link(path).map_err(io_error_with_help("read symlink", path))
    }
}

impl LocalFs {
    /// Same-filesystem rename. Errors are returned raw so callers can detect EXDEV.
    pub fn rename(&mut self, from: &Path, to: &Path) -> io::Result<()> {
        fs::rename(from, to)
    }

    /// Byte-for-byte copy into a new file, published only once complete.
    pub fn copy_file(&mut self, from: &Path, to: &Path) -> Result<u64> {
        let mut src = self.open_read(from)?;
        write_new_file(to, |dst| io::copy(&mut src, dst).map_err(io_error_with_help("copy into", to)))
    }

    pub fn open_read(&mut self, path: &Path) -> Result<File> {
        File::open(path).map_err(io_error_with_help("open for reading", path))
    }
}

/// Fill a temp file next to `dst`, fsync it, then rename it into place.
/// On any failure the temp file is removed and `dst` is never created.
pub(crate) fn write_new_file(dst: &Path, fill: impl FnOnce(&mut File) -> Result<u64>) -> Result<u64> {
    let tmp = partial_path(dst)?;
    let res = (|| -> Result<u64> {
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&tmp)
            .map_err(io_error_with_help("create temporary file", &tmp))?;
        let bytes = fill(&mut file)?;
        file.sync_all().map_err(io_error_with_help("sync", &tmp))?;
        drop(file);
        fs::rename(&tmp, dst).map_err(io_error_with_help("rename temporary file into", dst))?;
        Ok(bytes)
    })();
    if res.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    res
}

/// Unique temp path in the directory of `dst`.
fn partial_path(dst: &Path) -> Result<PathBuf> {
    let dir = dst
        .parent()
        .ok_or_else(|| anyhow!("destination has no parent: {}", dst.display()))?;
    Ok(dir.join(super::partial_name()))
}
