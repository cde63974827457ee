//! External loop attachment: registers each local candidate's socket with a
//! concurrently running receive task instead of an external GLib-style
//! readiness source, since there is no portable external main-loop type to
//! attach to in this ecosystem. Each task is a `select! { recv => ...,
//! closed_ch.recv() => return }` loop — the same shape
//! `CandidateBase::recv_loop` uses in the teacher crate this one is modeled
//! on.
//!
//! Attachment requires shared mutable access to the `Agent` from tasks that
//! outlive the call to `main_context_attach`, the one place this otherwise
//! single-threaded, no-internal-locking core still needs a synchronization
//! primitive. `tokio::sync::Mutex` is the teacher's own choice for the same
//! problem (`Arc<Mutex<AgentInternal>>` guarding its concurrent
//! `recv_loop` tasks): unlike a `RefCell`, its `lock().await` suspends a
//! contending task rather than panicking when one candidate's STUN handling
//! (itself awaiting two sends) is still in flight while another candidate's
//! task also becomes readable.

use std::sync::Arc;

use log::warn;
use tokio::sync::Mutex;

use super::{Agent, RecvCallback};
use crate::RECEIVE_MTU;

impl Agent {
    /// Registers each local candidate's socket with a background receive
    /// task so that each readable event triggers the demultiplexer and,
    /// for application data, `callback`. At most once per agent; returns
    /// `false` if already attached.
    pub async fn main_context_attach(agent: &Arc<Mutex<Agent>>, callback: RecvCallback) -> bool {
        let candidates: Vec<(u64, usize, Arc<dyn util::Conn + Send + Sync>)> = {
            let mut a = agent.lock().await;
            if a.attached {
                return false;
            }
            a.attached = true;

            a.streams
                .values()
                .flat_map(|stream| {
                    stream
                        .component
                        .local_candidates
                        .iter()
                        .enumerate()
                        .filter_map(move |(idx, c)| c.conn().map(|conn| (stream.id, idx, conn)))
                })
                .collect()
        };

        for (stream_id, local_idx, conn) in candidates {
            let (closed_tx, mut closed_rx) = tokio::sync::broadcast::channel(1);
            {
                let mut a = agent.lock().await;
                if let Some(stream) = a.streams.get_mut(&stream_id) {
                    stream.component.local_candidates[local_idx].event_source = Some(closed_tx);
                }
            }

            let agent = Arc::clone(agent);
            let callback = Arc::clone(&callback);
            tokio::spawn(async move {
                loop {
                    let mut buf = vec![0u8; RECEIVE_MTU];
                    tokio::select! {
                        outcome = conn.recv_from(&mut buf) => {
                            let (n, from) = match outcome {
                                Ok(v) => v,
                                Err(e) => {
                                    warn!("s{}:1: attached socket read failed: {}", stream_id, e);
                                    break;
                                }
                            };
                            if n == 0 {
                                continue;
                            }
                            let mut app_buf = vec![0u8; RECEIVE_MTU];
                            let produced = {
                                let mut a = agent.lock().await;
                                a.dispatch_datagram(stream_id, local_idx, &buf[..n], from, &mut app_buf).await
                            };
                            if produced > 0 {
                                callback(stream_id, 1, &app_buf[..produced]);
                            }
                        }
                        _ = closed_rx.recv() => {
                            break;
                        }
                    }
                }
            });
        }

        true
    }
}
