//! The blocking and polling readiness drivers: `recv`, `recv_sock` and
//! `poll_read`. All three bottom out in `Agent::dispatch_datagram`; they
//! differ only in how they wait for a socket to become ready.
//!
//! Async Rust fuses "wait for readiness" and "read the datagram" into one
//! step (awaiting `Conn::recv_from` does both). `read_one_of` below races
//! every candidate's `recv_from` future and returns whichever completes
//! first, preserving the "sockets are visited in ascending fd order"
//! tiebreak by sorting candidates on their `fileno` before racing them.

use std::future::Future;
use std::net::SocketAddr;
use std::os::unix::io::RawFd;
use std::pin::Pin;
use std::sync::Arc;

use log::warn;

use super::Agent;
use crate::socket::UdpConn;
use crate::RECEIVE_MTU;

/// Callback used by `poll_read` and `main_context_attach` to deliver
/// application data: `(stream_id, component_id, bytes)`.
pub type RecvCallback = Arc<dyn Fn(u64, u16, &[u8]) + Send + Sync>;

type CandidateRef = (u64, usize, Arc<dyn util::Conn + Send + Sync>);

struct ReadResult {
    stream_id: u64,
    local_idx: usize,
    outcome: util::Result<(usize, SocketAddr)>,
    buf: Vec<u8>,
}

async fn read_one_of(candidates: Vec<CandidateRef>) -> ReadResult {
    let futures: Vec<Pin<Box<dyn Future<Output = ReadResult> + Send>>> = candidates
        .into_iter()
        .map(|(stream_id, local_idx, conn)| {
            Box::pin(async move {
                let mut buf = vec![0u8; RECEIVE_MTU];
                let outcome = conn.recv_from(&mut buf).await;
                ReadResult {
                    stream_id,
                    local_idx,
                    outcome,
                    buf,
                }
            }) as Pin<Box<dyn Future<Output = ReadResult> + Send>>
        })
        .collect();

    let (result, _idx, _rest) = futures::future::select_all(futures).await;
    result
}

/// `fileno`, when the socket is our own `UdpConn`; candidates produced by a
/// custom `SocketFactory` that isn't `UdpConn` simply keep insertion order
/// (still deterministic, just not meaningfully "ascending fd").
fn fileno_of(conn: &Arc<dyn util::Conn + Send + Sync>) -> RawFd {
    conn.as_any()
        .downcast_ref::<UdpConn>()
        .map(|c| c.fileno())
        .unwrap_or(RawFd::MAX)
}

impl Agent {
    /// All local candidates of one component, as `(stream_id, index,
    /// socket)` triples sorted into ascending fd order.
    fn component_candidate_refs(&self, stream_id: u64, component_id: u16) -> Vec<CandidateRef> {
        let component = match self.find_component(stream_id, component_id) {
            Some(c) => c,
            None => return Vec::new(),
        };
        let mut refs: Vec<CandidateRef> = component
            .local_candidates
            .iter()
            .enumerate()
            .filter_map(|(idx, c)| c.conn().map(|conn| (stream_id, idx, conn)))
            .collect();
        refs.sort_by_key(|(_, _, conn)| fileno_of(conn));
        refs
    }

    /// All local candidates across every stream, sorted into ascending fd
    /// order, for the agent-wide `poll_read`.
    fn all_candidate_refs(&self) -> Vec<CandidateRef> {
        let mut refs: Vec<CandidateRef> = self
            .streams
            .values()
            .flat_map(|stream| {
                stream
                    .component
                    .local_candidates
                    .iter()
                    .enumerate()
                    .filter_map(move |(idx, c)| c.conn().map(|conn| (stream.id, idx, conn)))
            })
            .collect();
        refs.sort_by_key(|(_, _, conn)| fileno_of(conn));
        refs
    }

    /// Blocks until a non-STUN datagram is available on some local
    /// candidate of the component, then returns it. STUN datagrams
    /// observed while waiting are processed in-line and never returned.
    pub async fn recv(&mut self, stream_id: u64, component_id: u16, buf: &mut [u8]) -> usize {
        loop {
            let refs = self.component_candidate_refs(stream_id, component_id);
            if refs.is_empty() {
                return 0;
            }
            let result = read_one_of(refs).await;
            let n = self.process_read_result(stream_id, result, buf).await;
            if n > 0 {
                return n;
            }
        }
    }

    /// Same as `recv` but constrained to the one local candidate whose
    /// socket has the given `fileno`. Does not loop: if that socket
    /// doesn't have a non-STUN datagram ready, returns whatever `recv_from`
    /// and classification produced for the single read (0 for STUN/empty/
    /// oversized/unrecognised).
    pub async fn recv_sock(
        &mut self,
        stream_id: u64,
        component_id: u16,
        fileno: RawFd,
        buf: &mut [u8],
    ) -> usize {
        let target = self
            .component_candidate_refs(stream_id, component_id)
            .into_iter()
            .find(|(_, _, conn)| fileno_of(conn) == fileno);
        let (stream_id, local_idx, conn) = match target {
            Some(t) => t,
            None => return 0,
        };

        let mut scratch = vec![0u8; RECEIVE_MTU];
        let outcome = conn.recv_from(&mut scratch).await;
        let result = ReadResult {
            stream_id,
            local_idx,
            outcome,
            buf: scratch,
        };
        self.process_read_result(stream_id, result, buf).await
    }

    async fn process_read_result(&mut self, stream_id: u64, result: ReadResult, out_buf: &mut [u8]) -> usize {
        let (n, from) = match result.outcome {
            Ok(v) => v,
            Err(e) => {
                warn!("s{}:1: socket read failed: {}", stream_id, e);
                return 0;
            }
        };
        if n == 0 {
            return 0;
        }
        self.dispatch_datagram(result.stream_id, result.local_idx, &result.buf[..n], from, out_buf)
            .await
    }

    /// Performs one readiness wait over every local candidate's socket
    /// together with the caller-supplied `other_fds`; for each ready
    /// candidate socket, consumes one datagram and, for application data,
    /// invokes `callback`. Returns the subset of `other_fds` that were
    /// ready.
    pub async fn poll_read(&mut self, other_fds: &[RawFd], callback: RecvCallback) -> Vec<RawFd> {
        let candidates = self.all_candidate_refs();
        if candidates.is_empty() && other_fds.is_empty() {
            return Vec::new();
        }

        enum Ready {
            Candidate(ReadResult),
            Other(RawFd),
        }

        let mut futures: Vec<Pin<Box<dyn Future<Output = Ready> + Send>>> = Vec::new();
        for (stream_id, local_idx, conn) in candidates.clone() {
            futures.push(Box::pin(async move {
                let mut buf = vec![0u8; RECEIVE_MTU];
                let outcome = conn.recv_from(&mut buf).await;
                Ready::Candidate(ReadResult {
                    stream_id,
                    local_idx,
                    outcome,
                    buf,
                })
            }));
        }
        for &fd in other_fds {
            futures.push(Box::pin(async move {
                let _ = wait_fd_readable(fd).await;
                Ready::Other(fd)
            }));
        }

        let (first, _idx, _rest) = futures::future::select_all(futures).await;

        let mut ready_other = Vec::new();
        // The socket (if any) that already had its one datagram-per-pass
        // consumed by winning the race above; the drain loop below must
        // skip it, or a second queued datagram on the same socket would be
        // consumed in the same pass.
        let mut winner: Option<(u64, usize)> = None;
        match first {
            Ready::Candidate(result) => {
                winner = Some((result.stream_id, result.local_idx));
                let stream_id = result.stream_id;
                let mut app_buf = vec![0u8; RECEIVE_MTU];
                let n = self.process_read_result(stream_id, result, &mut app_buf).await;
                if n > 0 {
                    let component_id = 1;
                    callback(stream_id, component_id, &app_buf[..n]);
                }
            }
            Ready::Other(fd) => ready_other.push(fd),
        }

        // One pass: opportunistically drain every other socket that also
        // happens to be ready right now, without a second blocking wait.
        // The socket that already won the race above is excluded so it
        // never yields more than the one datagram already consumed.
        for (stream_id, local_idx, conn) in candidates {
            if winner == Some((stream_id, local_idx)) {
                continue;
            }
            if let Some(udp) = conn.as_any().downcast_ref::<UdpConn>() {
                let mut scratch = vec![0u8; RECEIVE_MTU];
                if let Ok((n, from)) = udp.try_recv_from(&mut scratch) {
                    let mut app_buf = vec![0u8; RECEIVE_MTU];
                    let produced = self
                        .dispatch_datagram(stream_id, local_idx, &scratch[..n], from, &mut app_buf)
                        .await;
                    if produced > 0 {
                        callback(stream_id, 1, &app_buf[..produced]);
                    }
                }
            }
        }

        // `other_fds` not already known ready get one genuine non-blocking
        // `poll(2)` check (timeout 0), rather than a freshly constructed
        // `AsyncFd`'s first poll, which always reports `Pending` regardless
        // of actual readiness since no epoll notification has landed yet.
        let remaining: Vec<RawFd> = other_fds
            .iter()
            .copied()
            .filter(|fd| !ready_other.contains(fd))
            .collect();
        ready_other.extend(poll_now_readable(&remaining));
        ready_other.sort_unstable();
        ready_other
    }
}

/// Checks which of `fds` are currently readable with a single non-blocking
/// `poll(2)` call (timeout 0). A real syscall, unlike waiting on a
/// just-registered `AsyncFd`, correctly reports readiness immediately.
fn poll_now_readable(fds: &[RawFd]) -> Vec<RawFd> {
    if fds.is_empty() {
        return Vec::new();
    }
    let mut pollfds: Vec<libc::pollfd> = fds
        .iter()
        .map(|&fd| libc::pollfd {
            fd,
            events: libc::POLLIN,
            revents: 0,
        })
        .collect();
    // SAFETY: `pollfds` is a valid, exclusively owned buffer of `nfds`
    // `libc::pollfd` entries; `poll` only reads `fd`/`events` and writes
    // `revents` for each, never retaining the pointer past the call.
    let ret = unsafe { libc::poll(pollfds.as_mut_ptr(), pollfds.len() as libc::nfds_t, 0) };
    if ret <= 0 {
        return Vec::new();
    }
    pollfds
        .into_iter()
        .filter(|p| p.revents & libc::POLLIN != 0)
        .map(|p| p.fd)
        .collect()
}

/// A raw fd the caller still owns; we only ever borrow it to ask the
/// reactor whether it's readable, never close it.
struct BorrowedFd(RawFd);

impl std::os::unix::io::AsRawFd for BorrowedFd {
    fn as_raw_fd(&self) -> RawFd {
        self.0
    }
}

async fn wait_fd_readable(fd: RawFd) -> std::io::Result<()> {
    let async_fd = tokio::io::unix::AsyncFd::new(BorrowedFd(fd))?;
    async_fd.readable().await?.clear_ready();
    Ok(())
}
