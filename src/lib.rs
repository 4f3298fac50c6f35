//! Core library for `stub_move`.
//!
//! Moves a subtree from one root to another (local or over ssh) and leaves
//! typed stubs behind on the vacated side, so the move can be reversed and
//! stray writes into a vacated tree are easy to spot.
//!
//! Layout:
//! - `location`: the backend capability (local filesystem, remote session) and byte transfer
//! - `stub`: the on-disk marker codec
//! - `resolve`: operands -> root-relative subpaths
//! - `mirror`: the recursive move/exclude/stub engine
//! - `config`, `errors`, `output`, `cli`: the ambient pieces used by the binary

pub mod cli;
pub mod config;
pub mod errors;
pub mod location;
pub mod mirror;
pub mod output;
pub mod resolve;
pub mod stub;

pub use config::{
    default_config_path, default_log_path, load_config, load_config_from_xml_path,
    path_has_symlink_ancestor, Config, LogLevel,
};
pub use errors::StubMoveError;
pub use location::{Backend, EntryKind, HostId, LocalFs, Location, Sessions, SshSettings};
pub use mirror::{run, EntryState, Mirror, MirrorFlags, MirrorStats};
pub use resolve::{resolve_all, Direction, Operand, Resolved, RootPair};
pub use stub::EntryType;
