//! Per-run resource manager for backends.
//! Remote sessions are opened lazily on first use, cached by host identity and
//! closed when the manager is dropped at the end of the run.

use anyhow::Result;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use tracing::info;

use super::{Backend, HostId, LocalFs, Location, RemoteSession, SshSettings};

pub struct Sessions {
    ssh: SshSettings,
    local: LocalFs,
    remote: HashMap<HostId, RemoteSession>,
}

impl Sessions {
    pub fn new(ssh: SshSettings) -> Self {
        Self { ssh, local: LocalFs, remote: HashMap::new() }
    }

    pub fn local(&mut self) -> &mut LocalFs {
        &mut self.local
    }

    /// Cached session for `host`, opening it on first use.
    pub fn remote(&mut self, host: &HostId) -> Result<&mut RemoteSession> {
        match self.remote.entry(host.clone()) {
            Entry::Occupied(e) => Ok(e.into_mut()),
            Entry::Vacant(v) => {
                let session = RemoteSession::open(host, &self.ssh)?;
                info!(host = %host, "remote session established");
                Ok(v.insert(session))
            }
        }
    }

    /// Backend serving `loc`.
    pub fn backend(&mut self, loc: &Location) -> Result<&mut dyn Backend> {
        match loc {
            Location::Local(_) => Ok(&mut self.local),
            Location::Remote { host, .. } => Ok(self.remote(host)?),
        }
    }

    /// Number of sessions opened so far.
    pub fn open_sessions(&self) -> usize {
        self.remote.len()
    }
}

impl Default for Sessions {
    fn default() -> Self {
        Self::new(SshSettings::default())
    }
}
