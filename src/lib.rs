//! The connectivity-check core of an ICE agent: candidates, streams and
//! components with their lifecycle invariants, a STUN Binding request/
//! response handler, and the receive-side demultiplexer that tells STUN
//! and application traffic apart on one shared UDP port.
//!
//! Out of scope: TURN relays, server-reflexive gathering, ICE role conflict
//! resolution, USE-CANDIDATE nomination, IPv6, media encryption, and RTP
//! payload processing. The agent only classifies and passes RTP-shaped
//! datagrams through.

#[macro_use]
extern crate lazy_static;

pub mod agent;
pub mod candidate;
pub mod component;
pub mod error;
pub(crate) mod rand;
pub mod socket;
pub mod stream;
pub mod stun_message;

/// Scratch-buffer size for a single recv: large enough for any STUN message
/// or RTP packet this core deals with.
pub const RECEIVE_MTU: usize = 1500;

pub use agent::{Agent, AgentConfig};
pub use candidate::{Candidate, CandidateType};
pub use component::{Component, ConnectionState};
pub use stream::Stream;
