use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use super::*;

fn addr(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
}

#[test]
fn make_credential_truncates_long_input() {
    let truncated = make_credential("abcdefghijklmnop");
    assert_eq!(truncated, "abcdefgh");
    assert_eq!(truncated.len(), CREDENTIAL_LEN);
}

#[test]
fn make_credential_leaves_short_input_untouched() {
    assert_eq!(make_credential("abc"), "abc");
}

#[test]
fn new_remote_has_no_socket_and_no_id() {
    let remote = Candidate::new_remote(
        1,
        1,
        CandidateType::Host,
        addr(9000),
        "someverylongusername",
        "someverylongpassword",
    );
    assert_eq!(remote.id, 0);
    assert!(!remote.is_local());
    assert!(remote.conn().is_none());
    assert_eq!(remote.username, "somevery");
    assert_eq!(remote.username.chars().count(), CREDENTIAL_LEN);
    assert_eq!(remote.base_addr, remote.addr);
}

#[test]
fn candidate_type_display_matches_ice_notation() {
    assert_eq!(CandidateType::Host.to_string(), "host");
    assert_eq!(CandidateType::ServerReflexive.to_string(), "srflx");
    assert_eq!(CandidateType::PeerReflexive.to_string(), "prflx");
    assert_eq!(CandidateType::Relayed.to_string(), "relay");
}

#[test]
fn debug_impl_does_not_panic_and_omits_conn_internals() {
    let remote = Candidate::new_remote(1, 1, CandidateType::Host, addr(9001), "u", "p");
    let rendered = format!("{:?}", remote);
    assert!(rendered.contains("is_local"));
    assert!(!rendered.contains("password"));
}
