//! The Agent: top-level container for streams, local addresses and the
//! socket factory, and the public entry point for the whole connectivity
//! check flow.
//!
//! `Agent` performs no internal locking: every method below takes
//! `&mut self` and callers are responsible for serialising calls — this is
//! a single-threaded state machine at the protocol layer.
//! `Agent::main_context_attach` is the one operation that hands control to
//! concurrently running tasks, and is implemented as an associated function
//! on a caller-supplied `Arc<tokio::sync::Mutex<Agent>>` for exactly that
//! reason (see `agent/attach.rs`).

mod attach;
mod demux;
mod handler;
mod recv;

#[cfg(test)]
mod agent_test;

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use log::warn;

use crate::candidate::{Candidate, CandidateType};
use crate::component::{Component, ConnectionState};
use crate::error::{ERR_INVALID_COMPONENT_COUNT, ERR_SOCKET_ALLOCATION, Result};
use crate::rand::generate_credential;
use crate::socket::SocketFactory;
use crate::stream::Stream;

pub use recv::RecvCallback;

/// Invoked synchronously, from within the STUN handler, whenever a
/// component's state changes.
pub type ComponentStateCallback = Box<dyn FnMut(u64, u16, ConnectionState) + Send>;

/// Construction-time settings: the socket factory used to allocate host
/// candidate sockets, and the (currently unused) STUN server hostname for
/// server-reflexive gathering — out of scope, stored only.
pub struct AgentConfig {
    pub socket_factory: Arc<dyn SocketFactory>,
    pub stun_server: Option<String>,
}

impl AgentConfig {
    pub fn new(socket_factory: Arc<dyn SocketFactory>) -> Self {
        AgentConfig {
            socket_factory,
            stun_server: None,
        }
    }
}

pub struct Agent {
    pub(crate) streams: BTreeMap<u64, Stream>,
    pub(crate) next_stream_id: u64,
    pub(crate) next_candidate_id: u64,
    pub(crate) local_addresses: Vec<SocketAddr>,
    pub(crate) socket_factory: Arc<dyn SocketFactory>,
    #[allow(dead_code)]
    pub(crate) stun_server: Option<String>,
    pub(crate) listener: Option<ComponentStateCallback>,
    pub(crate) attached: bool,
}

impl Agent {
    pub fn new(socket_factory: Arc<dyn SocketFactory>) -> Self {
        Agent::with_config(AgentConfig::new(socket_factory))
    }

    pub fn with_config(config: AgentConfig) -> Self {
        Agent {
            streams: BTreeMap::new(),
            next_stream_id: 1,
            next_candidate_id: 1,
            local_addresses: Vec::new(),
            socket_factory: config.socket_factory,
            stun_server: config.stun_server,
            listener: None,
            attached: false,
        }
    }

    /// Registers a listener invoked synchronously on every
    /// `component-state-changed` transition.
    pub fn set_component_state_callback(&mut self, listener: ComponentStateCallback) {
        self.listener = Some(listener);
    }

    /// Records a local interface address with its port forced to 0.
    /// Duplicates are not deduplicated, and streams created before this
    /// call do not retroactively gain a candidate for it — a known
    /// limitation, not fixed here.
    pub fn add_local_address(&mut self, mut addr: SocketAddr) {
        addr.set_port(0);
        self.local_addresses.push(addr);
    }

    /// Creates a stream with `n_components` components, which must be 1.
    /// Allocates one host candidate per registered local address by
    /// invoking the socket factory; the first allocation failure aborts the
    /// whole call and no stream is created.
    pub async fn add_stream(&mut self, n_components: u16) -> Result<u64> {
        if n_components != 1 {
            return Err(ERR_INVALID_COMPONENT_COUNT.clone());
        }

        let stream_id = self.next_stream_id;
        let mut stream = Stream::new(stream_id);

        let local_addresses = self.local_addresses.clone();
        for addr in local_addresses {
            match self.socket_factory.bind(addr).await {
                Ok(conn) => {
                    let bound_addr = conn.local_addr().map_err(|e| {
                        warn!("host candidate socket reported no local address: {}", e);
                        ERR_SOCKET_ALLOCATION.clone()
                    })?;
                    let id = self.next_candidate_id;
                    self.next_candidate_id += 1;
                    stream.component.local_candidates.push(Candidate {
                        id,
                        stream_id,
                        component_id: 1,
                        candidate_type: CandidateType::Host,
                        addr: bound_addr,
                        base_addr: bound_addr,
                        username: generate_credential(),
                        password: generate_credential(),
                        conn: Some(conn),
                        event_source: None,
                    });
                }
                Err(e) => {
                    warn!("failed to allocate host candidate socket for {}: {}", addr, e);
                    return Err(ERR_SOCKET_ALLOCATION.clone());
                }
            }
        }

        self.next_stream_id += 1;
        self.streams.insert(stream_id, stream);
        Ok(stream_id)
    }

    /// Destroys a stream and every resource it owns. No-op if unknown.
    pub fn remove_stream(&mut self, stream_id: u64) {
        self.streams.remove(&stream_id);
    }

    /// Appends a remote candidate signalled in by the peer. No-op if the
    /// stream/component is unknown.
    pub fn add_remote_candidate(
        &mut self,
        stream_id: u64,
        component_id: u16,
        candidate_type: CandidateType,
        addr: SocketAddr,
        username: &str,
        password: &str,
    ) {
        if let Some(component) = self.find_component_mut(stream_id, component_id) {
            component.remote_candidates.push(Candidate::new_remote(
                stream_id,
                component_id,
                candidate_type,
                addr,
                username,
                password,
            ));
        }
    }

    pub fn get_local_candidates(&self, stream_id: u64, component_id: u16) -> Vec<&Candidate> {
        self.find_component(stream_id, component_id)
            .map(|c| c.local_candidates.iter().collect())
            .unwrap_or_default()
    }

    pub fn get_remote_candidates(&self, stream_id: u64, component_id: u16) -> Vec<&Candidate> {
        self.find_component(stream_id, component_id)
            .map(|c| c.remote_candidates.iter().collect())
            .unwrap_or_default()
    }

    /// Reads a component's current connection state; `None` if unknown.
    pub fn component_state(&self, stream_id: u64, component_id: u16) -> Option<ConnectionState> {
        self.find_component(stream_id, component_id).map(|c| c.state)
    }

    /// Transmits `bytes` once over the component's active candidate socket
    /// to its peer address. Silently dropped if neither is set yet.
    pub async fn send(&self, stream_id: u64, component_id: u16, bytes: &[u8]) {
        let component = match self.find_component(stream_id, component_id) {
            Some(c) => c,
            None => return,
        };
        let (idx, peer) = match (component.active_candidate, component.peer_addr) {
            (Some(idx), Some(peer)) => (idx, peer),
            _ => return,
        };
        if let Some(conn) = component.local_candidates[idx].conn() {
            if let Err(e) = conn.send_to(bytes, peer).await {
                warn!("s{}:{}: failed to send application data: {}", stream_id, component_id, e);
            }
        }
    }

    pub(crate) fn find_component(&self, stream_id: u64, component_id: u16) -> Option<&Component> {
        if component_id != 1 {
            return None;
        }
        self.streams.get(&stream_id).map(|s| &s.component)
    }

    pub(crate) fn find_component_mut(
        &mut self,
        stream_id: u64,
        component_id: u16,
    ) -> Option<&mut Component> {
        if component_id != 1 {
            return None;
        }
        self.streams.get_mut(&stream_id).map(|s| &mut s.component)
    }
}
