#[cfg(test)]
mod candidate_test;

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::broadcast;

/// Fixed width of a locally generated username/password, in printable ASCII
/// bytes. Caller-supplied remote credentials longer than this are silently
/// truncated to it, which is worth revisiting but is preserved here for
/// parity with existing peers.
pub const CREDENTIAL_LEN: usize = 8;

/// CandidateType represents the type of a transport-address endpoint this
/// core knows about. Relayed and server-reflexive candidates are part of
/// the data model (a remote peer may advertise one) even though this core
/// never gathers them itself (TURN relays and server-reflexive gathering
/// are out of scope).
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CandidateType {
    Host,
    ServerReflexive,
    PeerReflexive,
    Relayed,
}

impl fmt::Display for CandidateType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            CandidateType::Host => "host",
            CandidateType::ServerReflexive => "srflx",
            CandidateType::PeerReflexive => "prflx",
            CandidateType::Relayed => "relay",
        };
        write!(f, "{}", s)
    }
}

/// Truncates a caller-supplied credential to the fixed credential width.
/// Locally generated credentials are already exactly this length and pass
/// through unchanged.
pub fn make_credential(raw: &str) -> String {
    raw.chars().take(CREDENTIAL_LEN).collect()
}

/// An opaque per-candidate event-source handle used by
/// `Agent::main_context_attach`. Holding a sender keeps a candidate's
/// attached receive task alive and able to be told to stop; candidates that
/// were never attached simply never populate it.
pub(crate) type EventSource = broadcast::Sender<()>;

/// A transport-address endpoint of known type, with the credentials a STUN
/// Binding check against it is authenticated with.
///
/// Local candidates additionally own the UDP socket bound to their base
/// address for their entire lifetime; remote candidates (signalled in by
/// the peer) carry no socket. `id` is 0 for remote candidates, since only
/// local candidates are assigned ids by the agent.
pub struct Candidate {
    pub id: u64,
    pub stream_id: u64,
    pub component_id: u16,
    pub candidate_type: CandidateType,
    pub addr: SocketAddr,
    pub base_addr: SocketAddr,
    pub username: String,
    pub password: String,
    pub(crate) conn: Option<Arc<dyn util::Conn + Send + Sync>>,
    pub(crate) event_source: Option<EventSource>,
}

impl Candidate {
    /// Constructs a remote candidate as signalled in by the peer: no socket,
    /// no id, credentials truncated to the fixed width.
    pub fn new_remote(
        stream_id: u64,
        component_id: u16,
        candidate_type: CandidateType,
        addr: SocketAddr,
        username: &str,
        password: &str,
    ) -> Self {
        Candidate {
            id: 0,
            stream_id,
            component_id,
            candidate_type,
            addr,
            base_addr: addr,
            username: make_credential(username),
            password: make_credential(password),
            conn: None,
            event_source: None,
        }
    }

    /// True if this candidate owns a socket, i.e. it is local.
    pub fn is_local(&self) -> bool {
        self.conn.is_some()
    }

    pub(crate) fn conn(&self) -> Option<Arc<dyn util::Conn + Send + Sync>> {
        self.conn.clone()
    }
}

impl fmt::Debug for Candidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Candidate")
            .field("id", &self.id)
            .field("stream_id", &self.stream_id)
            .field("component_id", &self.component_id)
            .field("candidate_type", &self.candidate_type)
            .field("addr", &self.addr)
            .field("base_addr", &self.base_addr)
            .field("username", &self.username)
            .field("is_local", &self.is_local())
            .finish()
    }
}
