//! The receive-side demultiplexer: given one already-read datagram, decide
//! whether it is application data, a STUN message, or neither, and dispatch
//! accordingly. This is the single "process one ready socket" primitive
//! that `recv`, `recv_sock`, `poll_read` and the `main_context_attach`
//! callback all funnel through.

use std::net::SocketAddr;

use log::{debug, warn};

use super::Agent;
use crate::stun_message::{classify_first_byte, unpack, DatagramKind};

impl Agent {
    /// Classifies and dispatches one already-read datagram `data` (from
    /// `from`, received on `local_idx`'s socket). Copies application data
    /// into `out_buf` and returns its length; returns 0 for everything
    /// else (empty read, oversized packet, STUN traffic, or anything the
    /// two-bit prefix doesn't recognise).
    pub(crate) async fn dispatch_datagram(
        &mut self,
        stream_id: u64,
        local_idx: usize,
        data: &[u8],
        from: SocketAddr,
        out_buf: &mut [u8],
    ) -> usize {
        if data.is_empty() {
            return 0;
        }
        if data.len() > out_buf.len() {
            warn!(
                "s{}:1: discarding {}-byte datagram, larger than the {}-byte read buffer",
                stream_id,
                data.len(),
                out_buf.len()
            );
            return 0;
        }

        match classify_first_byte(data[0]) {
            DatagramKind::Application => {
                out_buf[..data.len()].copy_from_slice(data);
                data.len()
            }
            DatagramKind::Stun => {
                match unpack(data) {
                    Ok(msg) => {
                        self.handle_stun(stream_id, local_idx, from, msg).await;
                    }
                    Err(e) => {
                        debug!("s{}:1: dropping unparsable STUN-shaped datagram from {}: {}", stream_id, from, e);
                    }
                }
                0
            }
            DatagramKind::Other => 0,
        }
    }
}
