//! Stub marker codec.
//! A stub is a symlink whose target text is exactly `marker:<type>`.
//! The text is the whole on-disk format, so it must never change between
//! releases or between `put` and `get` runs.

use std::fmt;
use std::path::Path;

/// Reserved prefix of every stub target.
pub const STUB_PREFIX: &str = "marker:";

/// Type of the real content a stub stands in for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryType {
    Dir,
    File,
    Link,
}

impl EntryType {
    pub fn as_str(self) -> &'static str {
        match self {
            EntryType::Dir => "dir",
            EntryType::File => "file",
            EntryType::Link => "link",
        }
    }
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Marker text for a stub recording `ty`.
pub fn encode(ty: EntryType) -> String {
    format!("{STUB_PREFIX}{}", ty.as_str())
}

/// Parse a symlink target; `None` when it is not a stub marker.
pub fn decode(text: &str) -> Option<EntryType> {
    match text.strip_prefix(STUB_PREFIX)? {
        "dir" => Some(EntryType::Dir),
        "file" => Some(EntryType::File),
        "link" => Some(EntryType::Link),
        _ => None,
    }
}

/// Same as [`decode`] for a link target read from disk. Non-UTF-8 targets are never stubs.
pub fn decode_target(target: &Path) -> Option<EntryType> {
    target.to_str().and_then(decode)
}
