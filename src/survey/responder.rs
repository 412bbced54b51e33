//! Responder role
//!
//! A responder is registered under an arbitrary bucket path with a fresh
//! sequence id, so independent hangup groups (per stream, per participant,
//! or both) can coexist.

use bytes::Bytes;

use crate::error::Result;
use crate::registry::{PeerAddr, Registry};
use crate::river::River;
use crate::rivers::Rivers;
use crate::transport::{Protocol, Socket};

/// Survey respondent with a registry-backed id
#[derive(Debug)]
pub struct Responder {
    socket: Socket,
    registry: Registry,
    addr: PeerAddr,
    id: u64,
}

impl Responder {
    pub(crate) fn create(rivers: &Rivers, path: &[&str]) -> Result<Self> {
        let registry = rivers.registry(&rivers.config().namespaces.hangup);
        let socket = rivers.transport().socket(Protocol::Respondent);

        let (id, addr) = registry.allocate_with(path, |id| {
            let addr = PeerAddr::new(registry.namespace(), path, id.to_string());
            socket.listen(&addr.endpoint())?;
            Ok(addr)
        })?;
        tracing::debug!(addr = %addr, id = id, "Responder registered");

        Ok(Self {
            socket,
            registry,
            addr,
            id,
        })
    }

    /// Sequence id embedded in every reply
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Registry and transport address
    pub fn addr(&self) -> &PeerAddr {
        &self.addr
    }

    /// Wait for one survey and answer it
    pub async fn await_hangup(&self) -> Result<()> {
        super::await_hangup(self, self.id).await
    }

    /// Remove the registry entry; a missing entry is not an error
    pub fn deregister(&self) -> Result<()> {
        self.registry.deregister_in(&self.path(), &self.addr.key)
    }

    /// Close the socket and remove the registry entry in one transaction
    pub fn leave(&self) -> Result<()> {
        self.registry
            .leave_with(&self.path(), &self.addr.key, || self.socket.close())
    }

    fn path(&self) -> Vec<&str> {
        self.addr.path.iter().map(String::as_str).collect()
    }
}

impl River for Responder {
    /// Reply to the survey received last
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
