//! Typed error definitions for stub_move.
//! Provides the well-known failure modes so the app can log them with a stable code.

use std::path::PathBuf;
use thiserror::Error;

use crate::location::{HostId, Location};

#[derive(Debug, Error)]
pub enum StubMoveError {
    #[error("Conflict at {path}: {detail}")]
    Conflict { path: Location, detail: String },

    #[error("Unsupported entry kind (not a file, directory or symlink): {0}")]
    UnsupportedKind(Location),

    #[error("Path outside both roots: {0}")]
    OutsideRoots(String),

    #[error("Roots overlap: '{a}' and '{b}' (neither may contain the other)")]
    OverlappingRoots { a: Location, b: Location },

    #[error("Root is missing or not a directory: {0}")]
    RootInvalid(Location),

    #[error("Could not establish remote session to '{host}': {detail}")]
    RemoteAuth { host: HostId, detail: String },

    #[error("Remote session to '{host}' was lost")]
    RemoteDisconnected { host: HostId },

    #[error("{op} '{host}:{}' failed with status {status}: {message}", path.display())]
    RemoteCommand {
        host: HostId,
        op: &'static str,
        path: PathBuf,
        status: i32,
        message: String,
    },
}

impl StubMoveError {
    /// Stable numeric code for structured logs and scripts.
    pub fn code(&self) -> u16 {
        match self {
            StubMoveError::Conflict { .. } => 10,
            StubMoveError::UnsupportedKind(_) => 11,
            StubMoveError::OutsideRoots(_) => 12,
            StubMoveError::OverlappingRoots { .. } => 13,
            StubMoveError::RootInvalid(_) => 14,
            StubMoveError::RemoteAuth { .. } => 20,
            StubMoveError::RemoteDisconnected { .. } => 21,
            StubMoveError::RemoteCommand { .. } => 22,
        }
    }

    /// Short machine-friendly name used as the `kind` log field.
    pub fn kind(&self) -> &'static str {
        match self {
            StubMoveError::Conflict { .. } => "conflict",
            StubMoveError::UnsupportedKind(_) => "unsupported_kind",
            StubMoveError::OutsideRoots(_) => "outside_roots",
            StubMoveError::OverlappingRoots { .. } => "overlapping_roots",
            StubMoveError::RootInvalid(_) => "root_invalid",
            StubMoveError::RemoteAuth { .. } => "remote_auth",
            StubMoveError::RemoteDisconnected { .. } => "remote_disconnected",
            StubMoveError::RemoteCommand { .. } => "remote_command",
        }
    }
}
