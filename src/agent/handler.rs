//! The STUN Binding request/response handler: authenticates an inbound
//! check against this component's remote candidates, updates peer
//! affinity, and replies with a response plus a triggered check — or, on
//! any authentication failure, a `BINDING_ERROR_RESPONSE`.

use std::net::SocketAddr;

use log::{debug, warn};

use super::Agent;
use crate::component::ConnectionState;
use crate::rand::generate_transaction_id;
use crate::stun_message::{pack, Attribute, AttributeKind, Message, MessageType};

impl Agent {
    /// Entry point for a parsed STUN message arriving on `local_idx`'s
    /// socket, from `from`. Binding requests are authenticated and
    /// answered; Binding responses are accepted silently (no transaction
    /// table is kept); anything else is ignored.
    pub(crate) async fn handle_stun(
        &mut self,
        stream_id: u64,
        local_idx: usize,
        from: SocketAddr,
        msg: Message,
    ) {
        match msg.typ {
            MessageType::BindingRequest => {
                self.handle_binding_request(stream_id, local_idx, from, msg).await;
            }
            MessageType::BindingResponse => {
                debug!("s{}: accepted BINDING_RESPONSE from {} (untracked)", stream_id, from);
            }
            MessageType::BindingErrorResponse => {
                debug!("s{}: ignoring BINDING_ERROR_RESPONSE from {}", stream_id, from);
            }
        }
    }

    async fn handle_binding_request(
        &mut self,
        stream_id: u64,
        local_idx: usize,
        from: SocketAddr,
        msg: Message,
    ) {
        let username = match msg.find_attribute(AttributeKind::Username) {
            Some(Attribute::Username(u)) => u.clone(),
            _ => {
                self.send_error_response(stream_id, local_idx, from, msg.transaction_id).await;
                return;
            }
        };

        let component = match self.find_component_mut(stream_id, 1) {
            Some(c) => c,
            None => return,
        };

        let local_username = component.local_candidates[local_idx].username.clone();
        let matched_remote = component
            .remote_candidates
            .iter()
            .find(|remote| {
                username
                    .strip_prefix(local_username.as_str())
                    .map(|suffix| suffix == remote.username)
                    .unwrap_or(false)
            })
            .map(|remote| remote.username.clone());

        let remote_username = match matched_remote {
            Some(u) => u,
            None => {
                warn!(
                    "s{}:1: rejected BINDING_REQUEST from {} (USERNAME {:?} did not match any remote candidate)",
                    stream_id, from, username
                );
                self.send_error_response(stream_id, local_idx, from, msg.transaction_id).await;
                return;
            }
        };

        debug!("s{}:1: authenticated BINDING_REQUEST from {}", stream_id, from);

        let component = self
            .find_component_mut(stream_id, 1)
            .expect("component looked up successfully above");
        component.set_peer_affinity(local_idx, from);

        let conn = component.local_candidates[local_idx]
            .conn()
            .expect("local candidate always owns a socket");

        // Respond.
        let response = Message::new(MessageType::BindingResponse, msg.transaction_id)
            .with_attribute(Attribute::MappedAddress(from))
            .with_attribute(Attribute::Username(username));
        if let Err(e) = conn.send_to(&pack(&response), from).await {
            warn!("s{}:1: failed to send BINDING_RESPONSE: {}", stream_id, e);
        }

        // Trigger: a reciprocal check, username order reversed.
        let triggered_username = format!("{}{}", remote_username, local_username);
        let triggered = Message::new(MessageType::BindingRequest, generate_transaction_id())
            .with_attribute(Attribute::Username(triggered_username));
        if let Err(e) = conn.send_to(&pack(&triggered), from).await {
            warn!("s{}:1: failed to send triggered BINDING_REQUEST: {}", stream_id, e);
        }

        // Signal, only on the first transition.
        let component = self
            .find_component_mut(stream_id, 1)
            .expect("component looked up successfully above");
        if component.state != ConnectionState::Connected {
            component.state = ConnectionState::Connected;
            if let Some(listener) = self.listener.as_mut() {
                listener(stream_id, 1, ConnectionState::Connected);
            }
        }
    }

    async fn send_error_response(
        &self,
        stream_id: u64,
        local_idx: usize,
        from: SocketAddr,
        transaction_id: [u8; crate::stun_message::TRANSACTION_ID_LEN],
    ) {
        let conn = match self
            .find_component(stream_id, 1)
            .and_then(|c| c.local_candidates.get(local_idx))
            .and_then(|c| c.conn())
        {
            Some(conn) => conn,
            None => return,
        };
        let response = Message::new(MessageType::BindingErrorResponse, transaction_id);
        if let Err(e) = conn.send_to(&pack(&response), from).await {
            warn!("s{}:1: failed to send BINDING_ERROR_RESPONSE: {}", stream_id, e);
        }
    }
}
