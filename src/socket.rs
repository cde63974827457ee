//! The socket factory and `Conn` abstraction: something that can bind a UDP
//! socket, and send/receive datagrams on it. Each candidate stores its
//! socket as `Arc<dyn util::Conn + Send + Sync>`, cloned into whichever task
//! reads it; this module supplies the default, tokio-backed implementation
//! of that trait plus the `bind` entry point the agent's candidate factory
//! calls.

use std::net::SocketAddr;
use std::os::unix::io::{AsRawFd, RawFd};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use util::Error;

/// Binds local UDP sockets on demand. `Agent::add_stream` calls
/// `SocketFactory::bind` once per registered local address to allocate each
/// host candidate's socket.
#[async_trait]
pub trait SocketFactory: Send + Sync {
    async fn bind(&self, requested_addr: SocketAddr) -> util::Result<Arc<dyn util::Conn + Send + Sync>>;
}

/// Default factory: binds a real `tokio::net::UdpSocket` per call.
#[derive(Default)]
pub struct UdpSocketFactory;

#[async_trait]
impl SocketFactory for UdpSocketFactory {
    async fn bind(&self, requested_addr: SocketAddr) -> util::Result<Arc<dyn util::Conn + Send + Sync>> {
        let socket = UdpSocket::bind(requested_addr)
            .await
            .map_err(|e| Error::new(e.to_string()))?;
        Ok(Arc::new(UdpConn(socket)))
    }
}

/// A bound UDP socket exposed through `util::Conn`.
pub struct UdpConn(UdpSocket);

impl UdpConn {
    /// The candidate's `fileno`: used only to give readiness passes a
    /// stable ascending order, never for anything protocol-relevant.
    pub fn fileno(&self) -> RawFd {
        self.0.as_raw_fd()
    }

    /// Non-blocking read, used by `poll_read`'s opportunistic drain pass to
    /// pick up datagrams on sockets that didn't win the readiness race but
    /// happen to be ready anyway.
    pub fn try_recv_from(&self, buf: &mut [u8]) -> std::io::Result<(usize, SocketAddr)> {
        self.0.try_recv_from(buf)
    }
}

#[async_trait]
impl util::Conn for UdpConn {
    async fn connect(&self, addr: SocketAddr) -> util::Result<()> {
        self.0.connect(addr).await.map_err(|e| Error::new(e.to_string()))
    }

    async fn recv(&self, buf: &mut [u8]) -> util::Result<usize> {
        self.0.recv(buf).await.map_err(|e| Error::new(e.to_string()))
    }

    async fn recv_from(&self, buf: &mut [u8]) -> util::Result<(usize, SocketAddr)> {
        self.0
            .recv_from(buf)
            .await
            .map_err(|e| Error::new(e.to_string()))
    }

    async fn send(&self, buf: &[u8]) -> util::Result<usize> {
        self.0.send(buf).await.map_err(|e| Error::new(e.to_string()))
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> util::Result<usize> {
        self.0
            .send_to(buf, target)
            .await
            .map_err(|e| Error::new(e.to_string()))
    }

    fn local_addr(&self) -> util::Result<SocketAddr> {
        self.0.local_addr().map_err(|e| Error::new(e.to_string()))
    }

    fn remote_addr(&self) -> Option<SocketAddr> {
        None
    }

    async fn close(&self) -> util::Result<()> {
        Ok(())
    }

    fn as_any(&self) -> &(dyn std::any::Any + Send + Sync) {
        self
    }
}
