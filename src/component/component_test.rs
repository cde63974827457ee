use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use super::*;
use crate::candidate::CandidateType;

fn addr(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
}

fn local_candidate(id: u64) -> Candidate {
    Candidate {
        id,
        stream_id: 1,
        component_id: 1,
        candidate_type: CandidateType::Host,
        addr: addr(7000 + id as u16),
        base_addr: addr(7000 + id as u16),
        username: "localuser".to_owned(),
        password: "localpass".to_owned(),
        conn: None,
        event_source: None,
    }
}

#[test]
fn new_component_starts_disconnected_with_no_active_candidate() {
    let component = Component::new(1);
    assert_eq!(component.state, ConnectionState::Disconnected);
    assert!(component.active_local_candidate().is_none());
    assert!(component.peer_addr.is_none());
}

#[test]
fn set_peer_affinity_selects_candidate_and_records_peer() {
    let mut component = Component::new(1);
    component.local_candidates.push(local_candidate(1));
    component.local_candidates.push(local_candidate(2));

    component.set_peer_affinity(1, addr(9000));

    assert_eq!(component.active_candidate, Some(1));
    assert_eq!(component.peer_addr, Some(addr(9000)));
    assert_eq!(component.active_local_candidate().unwrap().id, 2);
}

#[test]
fn set_peer_affinity_overwrites_unconditionally() {
    let mut component = Component::new(1);
    component.local_candidates.push(local_candidate(1));
    component.local_candidates.push(local_candidate(2));

    component.set_peer_affinity(0, addr(9000));
    component.set_peer_affinity(1, addr(9001));

    assert_eq!(component.active_candidate, Some(1));
    assert_eq!(component.peer_addr, Some(addr(9001)));
}

#[test]
fn connection_state_display_matches_ice_notation() {
    assert_eq!(ConnectionState::Disconnected.to_string(), "disconnected");
    assert_eq!(ConnectionState::Connected.to_string(), "connected");
    assert_eq!(ConnectionState::Failed.to_string(), "failed");
}

#[test]
fn connection_state_default_is_disconnected() {
    assert_eq!(ConnectionState::default(), ConnectionState::Disconnected);
}
