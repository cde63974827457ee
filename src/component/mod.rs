#[cfg(test)]
mod component_test;

use std::fmt;
use std::net::SocketAddr;

use crate::candidate::Candidate;

/// ConnectionState mirrors the subset of ICE component states this core
/// actually transitions through. The full state space is kept because
/// embedders reasonably expect to match on all of it, but the core itself
/// only ever moves a component from `Disconnected` to `Connected` on the
/// first validated check.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Gathering,
    Connecting,
    Connected,
    Ready,
    Failed,
}

impl Default for ConnectionState {
    fn default() -> Self {
        ConnectionState::Disconnected
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Gathering => "gathering",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Connected => "connected",
            ConnectionState::Ready => "ready",
            ConnectionState::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

/// One media component of a stream. This core supports exactly one
/// component per stream, always numbered 1.
#[derive(Default)]
pub struct Component {
    pub id: u16,
    pub local_candidates: Vec<Candidate>,
    pub remote_candidates: Vec<Candidate>,
    /// Index into `local_candidates` of the candidate currently used for
    /// outbound application data, or `None` before the first validated
    /// check. An index is sufficient (rather than a shared/weak pointer)
    /// because candidates are only ever appended, never reordered or
    /// removed individually.
    pub active_candidate: Option<usize>,
    pub peer_addr: Option<SocketAddr>,
    pub state: ConnectionState,
}

impl Component {
    pub fn new(id: u16) -> Self {
        Component {
            id,
            local_candidates: Vec::new(),
            remote_candidates: Vec::new(),
            active_candidate: None,
            peer_addr: None,
            state: ConnectionState::Disconnected,
        }
    }

    /// The local candidate currently selected for outbound traffic, if any.
    pub fn active_local_candidate(&self) -> Option<&Candidate> {
        self.active_candidate.map(|idx| &self.local_candidates[idx])
    }

    /// Sets peer affinity: `local_idx` becomes the active candidate and
    /// `from` becomes the authoritative peer address. Unconditional
    /// overwrite — whichever check most recently validated wins.
    pub(crate) fn set_peer_affinity(&mut self, local_idx: usize, from: SocketAddr) {
        debug_assert!(local_idx < self.local_candidates.len());
        self.active_candidate = Some(local_idx);
        self.peer_addr = Some(from);
    }
}
