//! Bus rivers
//!
//! A bus peer registers itself under its stream and dials every peer that was
//! registered before it. Links are symmetric, so existing peers never dial
//! back and the stream stays a full mesh.

use bytes::Bytes;

use super::River;
use crate::error::Result;
use crate::registry::{PeerAddr, Registry};
use crate::rivers::Rivers;
use crate::stats::SocketStats;
use crate::transport::{Protocol, Socket};

/// Full-duplex broadcast river
#[derive(Debug)]
pub struct Bus {
    socket: Socket,
    registry: Registry,
    addr: PeerAddr,
}

impl Bus {
    pub(crate) fn create(rivers: &Rivers, peer: &str, stream: &str) -> Result<Self> {
        let registry = rivers.registry(&rivers.config().namespaces.bus);
        let addr = PeerAddr::new(registry.namespace(), &[stream], peer);
        let socket = rivers.transport().socket(Protocol::Bus);

        let (existing, ()) = registry.join_with(&[stream], peer, |_| socket.listen(&addr.endpoint()))?;
        let linked = dial_all(&socket, &addr, &existing);

        tracing::info!(
            stream = stream,
            peer = peer,
            existing = existing.len(),
            linked = linked,
            "Bus joined"
        );

        Ok(Self {
            socket,
            registry,
            addr,
        })
    }

    /// Stream this peer belongs to
    pub fn stream(&self) -> &str {
        &self.addr.path[0]
    }

    /// Peer id
    pub fn peer(&self) -> &str {
        &self.addr.key
    }

    /// Registry and transport address
    pub fn addr(&self) -> &PeerAddr {
        &self.addr
    }

    /// Number of currently linked peers
    pub fn peer_count(&self) -> usize {
        self.socket.peer_count()
    }

    /// Counters snapshot
    pub fn stats(&self) -> SocketStats {
        self.socket.stats()
    }

    /// Messages already delivered but not yet received, even after close
    pub fn drain(&self) -> Vec<Bytes> {
        self.socket.drain()
    }

    /// Remove the registry entry; a missing entry is not an error
    pub fn deregister(&self) -> Result<()> {
        self.registry.deregister(self.stream(), self.peer())
    }

    /// Close the socket and remove the registry entry in one transaction
    pub fn leave(&self) -> Result<()> {
        self.registry
            .leave_with(&[self.stream()], self.peer(), || self.socket.close())?;
        tracing::info!(stream = self.stream(), peer = self.peer(), "Bus left");
        Ok(())
    }
}

impl River for Bus {
    async fn send(&self, payload: Bytes) -> Result<()> {
        self.socket.send(payload).await
    }

    async fn recv(&self) -> Result<Bytes> {
        self.socket.recv().await
    }

    fn close(&self) -> Result<()> {
        self.socket.close()
    }
}

/// Dial every listed peer, skipping ones that are registered but gone
pub(crate) fn dial_all(socket: &Socket, addr: &PeerAddr, peers: &[String]) -> usize {
    let mut linked = 0;
    for peer in peers {
        let target = addr.sibling(peer.as_str());
        match socket.dial(&target.endpoint()) {
            Ok(()) => linked += 1,
            Err(e) => {
                tracing::warn!(
                    target = %target,
                    error = %e,
                    "Registered peer not reachable, skipping"
                );
            }
        }
    }
    linked
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::Error;

    #[tokio::test]
    async fn test_three_peer_mesh() {
        let rivers = Rivers::new();
        let a = rivers.create_bus("a", "lobby").unwrap();
        let b = rivers.create_bus("b", "lobby").unwrap();
        let c = rivers.create_bus("c", "lobby").unwrap();

        assert_eq!(a.peer_count(), 2);
        assert_eq!(b.peer_count(), 2);
        assert_eq!(c.peer_count(), 2);

        a.send(Bytes::from_static(b"hi")).await.unwrap();
        assert_eq!(b.recv().await.unwrap(), Bytes::from_static(b"hi"));
        assert_eq!(c.recv().await.unwrap(), Bytes::from_static(b"hi"));

        // The sender does not hear itself
        let echo = tokio::time::timeout(Duration::from_millis(20), a.recv()).await;
        assert!(echo.is_err());
    }

    #[tokio::test]
    async fn test_duplicate_peer_rejected() {
        let rivers = Rivers::new();
        let _a = rivers.create_bus("a", "lobby").unwrap();

        let result = rivers.create_bus("a", "lobby");
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
        assert_eq!(rivers.bus_peers("lobby").unwrap(), vec!["a"]);
    }

    #[tokio::test]
    async fn test_streams_are_isolated() {
        let rivers = Rivers::new();
        let a = rivers.create_bus("a", "one").unwrap();
        let b = rivers.create_bus("a", "two").unwrap();

        assert_eq!(a.peer_count(), 0);
        assert_eq!(b.peer_count(), 0);
    }

    #[tokio::test]
    async fn test_leave_twice() {
        let rivers = Rivers::new();
        let a = rivers.create_bus("a", "lobby").unwrap();
        let b = rivers.create_bus("b", "lobby").unwrap();

        a.leave().unwrap();
        a.leave().unwrap();
        a.deregister().unwrap();

        assert_eq!(rivers.bus_peers("lobby").unwrap(), vec!["b"]);
        assert_eq!(b.peer_count(), 0);
        assert!(matches!(a.recv().await, Err(Error::Closed)));
    }

    #[tokio::test]
    async fn test_dropped_peer_is_skipped() {
        let rivers = Rivers::new();
        let a = rivers.create_bus("a", "lobby").unwrap();
        // Socket released without deregistering
        drop(a);

        let b = rivers.create_bus("b", "lobby").unwrap();
        assert_eq!(b.peer_count(), 0);
        assert_eq!(rivers.bus_peers("lobby").unwrap(), vec!["a", "b"]);
    }
}
