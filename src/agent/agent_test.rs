use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::UdpSocket;

use super::*;
use crate::candidate::CandidateType;
use crate::socket::UdpSocketFactory;
use crate::stun_message::{pack, unpack, Attribute, Message, MessageType};

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)), port)
}

async fn agent_with_stream() -> (Agent, u64) {
    let mut agent = Agent::new(Arc::new(UdpSocketFactory::default()));
    agent.add_local_address(loopback(0));
    let stream_id = agent.add_stream(1).await.expect("stream creation should succeed");
    (agent, stream_id)
}

async fn recv_with_timeout(sock: &UdpSocket) -> (Vec<u8>, SocketAddr) {
    let mut buf = vec![0u8; crate::RECEIVE_MTU];
    let (n, from) = tokio::time::timeout(Duration::from_secs(1), sock.recv_from(&mut buf))
        .await
        .expect("expected a datagram within the timeout")
        .expect("recv_from should not error");
    (buf[..n].to_vec(), from)
}

#[tokio::test]
async fn add_stream_allocates_one_host_candidate_per_local_address() {
    let (agent, stream_id) = agent_with_stream().await;

    let locals = agent.get_local_candidates(stream_id, 1);
    assert_eq!(locals.len(), 1);
    let candidate = locals[0];
    assert_eq!(candidate.candidate_type, CandidateType::Host);
    assert!(candidate.is_local());
    assert_ne!(candidate.addr.port(), 0, "bind(0) should resolve to a real ephemeral port");
    assert_eq!(candidate.username.chars().count(), crate::candidate::CREDENTIAL_LEN);
    assert_eq!(candidate.password.chars().count(), crate::candidate::CREDENTIAL_LEN);
    assert_eq!(agent.component_state(stream_id, 1), Some(ConnectionState::Disconnected));
}

#[tokio::test]
async fn unknown_component_lookups_are_no_ops() {
    let (mut agent, stream_id) = agent_with_stream().await;

    assert!(agent.get_local_candidates(stream_id, 2).is_empty());
    assert!(agent.component_state(stream_id, 2).is_none());

    // component_id 2 doesn't exist on a single-component stream; this must
    // not panic and must leave the real component untouched.
    agent.add_remote_candidate(stream_id, 2, CandidateType::Host, loopback(4242), "u", "p");
    assert!(agent.get_remote_candidates(stream_id, 1).is_empty());
}

#[tokio::test]
async fn valid_binding_request_responds_triggers_and_connects() {
    let (mut agent, stream_id) = agent_with_stream().await;
    let local_username = agent.get_local_candidates(stream_id, 1)[0].username.clone();

    let peer = UdpSocket::bind(loopback(0)).await.unwrap();
    let peer_addr = peer.local_addr().unwrap();
    let remote_username = "peeruser".to_owned();
    agent.add_remote_candidate(
        stream_id,
        1,
        CandidateType::Host,
        peer_addr,
        &remote_username,
        "peerpass",
    );

    let request = Message::new(MessageType::BindingRequest, [7u8; 16])
        .with_attribute(Attribute::Username(format!("{}{}", local_username, remote_username)));
    let mut out_buf = vec![0u8; crate::RECEIVE_MTU];
    let produced = agent
        .dispatch_datagram(stream_id, 0, &pack(&request), peer_addr, &mut out_buf)
        .await;
    assert_eq!(produced, 0, "a STUN datagram never surfaces as application data");

    let (response_bytes, _) = recv_with_timeout(&peer).await;
    let response = unpack(&response_bytes).expect("response should be well-formed");
    assert_eq!(response.typ, MessageType::BindingResponse);
    assert_eq!(response.transaction_id, [7u8; 16]);
    assert!(matches!(
        response.find_attribute(crate::stun_message::AttributeKind::MappedAddress),
        Some(Attribute::MappedAddress(addr)) if *addr == peer_addr
    ));

    let (triggered_bytes, _) = recv_with_timeout(&peer).await;
    let triggered = unpack(&triggered_bytes).expect("triggered check should be well-formed");
    assert_eq!(triggered.typ, MessageType::BindingRequest);
    assert!(matches!(
        triggered.find_attribute(crate::stun_message::AttributeKind::Username),
        Some(Attribute::Username(u)) if *u == format!("{}{}", remote_username, local_username)
    ));

    assert_eq!(agent.component_state(stream_id, 1), Some(ConnectionState::Connected));
}

#[tokio::test]
async fn unmatched_username_yields_error_response_only() {
    let (mut agent, stream_id) = agent_with_stream().await;
    let local_username = agent.get_local_candidates(stream_id, 1)[0].username.clone();

    let peer = UdpSocket::bind(loopback(0)).await.unwrap();
    let peer_addr = peer.local_addr().unwrap();
    agent.add_remote_candidate(stream_id, 1, CandidateType::Host, peer_addr, "knownuser", "knownpass");

    let request = Message::new(MessageType::BindingRequest, [3u8; 16])
        .with_attribute(Attribute::Username(format!("{}{}", local_username, "somebodyelse")));
    let mut out_buf = vec![0u8; crate::RECEIVE_MTU];
    agent
        .dispatch_datagram(stream_id, 0, &pack(&request), peer_addr, &mut out_buf)
        .await;

    let (reply_bytes, _) = recv_with_timeout(&peer).await;
    let reply = unpack(&reply_bytes).unwrap();
    assert_eq!(reply.typ, MessageType::BindingErrorResponse);
    assert_eq!(reply.transaction_id, [3u8; 16]);

    assert_eq!(agent.component_state(stream_id, 1), Some(ConnectionState::Disconnected));

    tokio::time::timeout(Duration::from_millis(50), recv_with_timeout(&peer))
        .await
        .expect_err("no triggered check should follow a rejected request");
}

#[tokio::test]
async fn missing_username_yields_error_response() {
    let (mut agent, stream_id) = agent_with_stream().await;

    let peer = UdpSocket::bind(loopback(0)).await.unwrap();
    let peer_addr = peer.local_addr().unwrap();

    let request = Message::new(MessageType::BindingRequest, [9u8; 16]);
    let mut out_buf = vec![0u8; crate::RECEIVE_MTU];
    agent
        .dispatch_datagram(stream_id, 0, &pack(&request), peer_addr, &mut out_buf)
        .await;

    let (reply_bytes, _) = recv_with_timeout(&peer).await;
    let reply = unpack(&reply_bytes).unwrap();
    assert_eq!(reply.typ, MessageType::BindingErrorResponse);
    assert_eq!(reply.transaction_id, [9u8; 16]);
}

#[tokio::test]
async fn application_data_passes_through_untouched() {
    let (mut agent, stream_id) = agent_with_stream().await;
    let peer_addr = loopback(55555);

    let rtp_like = [0x80u8, 0x01, 0x02, 0x03, 0x04];
    let mut out_buf = vec![0u8; crate::RECEIVE_MTU];
    let produced = agent
        .dispatch_datagram(stream_id, 0, &rtp_like, peer_addr, &mut out_buf)
        .await;

    assert_eq!(produced, rtp_like.len());
    assert_eq!(&out_buf[..produced], &rtp_like[..]);
    assert_eq!(agent.component_state(stream_id, 1), Some(ConnectionState::Disconnected));
}
