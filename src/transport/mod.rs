//! In-process addressable sockets
//!
//! A [`Transport`] is a directory of listening sockets keyed by address.
//! Dialing an address links the two sockets with a pair of bounded channels;
//! a link carries traffic both ways no matter which side dialed.
//!
//! ```text
//!        Transport { endpoints: addr -> Weak<Core> }
//!                         │ dial(addr)
//!     ┌───────────────────┴───────────────────┐
//!     ▼                                       ▼
//!  Core A                                  Core B
//!  peers: {B -> B.inbox_tx}   ◄──link──►   peers: {A -> A.inbox_tx}
//!  inbox: Receiver<Message>                inbox: Receiver<Message>
//! ```
//!
//! Protocols decide what `send` and `recv` mean on top of the links.

pub mod socket;

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use parking_lot::Mutex;

use crate::error::{Error, Result};

pub use socket::Socket;
use socket::Core;

/// Socket protocol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    /// Broadcast to and receive from every linked bus socket
    Bus,
    /// Broadcast to every linked sub socket, never receives
    Pub,
    /// Receive prefix-filtered messages from linked pub sockets
    Sub,
    /// Broadcast a tagged survey, collect replies until the window closes
    Surveyor,
    /// Receive surveys, reply to the surveyor that asked
    Respondent,
}

impl Protocol {
    /// Protocol name used in errors and logs
    pub fn name(self) -> &'static str {
        match self {
            Protocol::Bus => "bus",
            Protocol::Pub => "pub",
            Protocol::Sub => "sub",
            Protocol::Surveyor => "surveyor",
            Protocol::Respondent => "respondent",
        }
    }

    /// Whether a socket of this protocol may link with `other`
    pub fn links_with(self, other: Protocol) -> bool {
        matches!(
            (self, other),
            (Protocol::Bus, Protocol::Bus)
                | (Protocol::Pub, Protocol::Sub)
                | (Protocol::Sub, Protocol::Pub)
                | (Protocol::Surveyor, Protocol::Respondent)
                | (Protocol::Respondent, Protocol::Surveyor)
        )
    }
}

impl std::fmt::Display for Protocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A message in flight between two linked sockets
#[derive(Debug, Clone)]
pub(crate) struct Message {
    /// Sending socket
    pub from: u64,
    /// Survey tag (0 outside the survey protocol)
    pub tag: u64,
    /// Payload
    pub body: Bytes,
}

struct Directory {
    endpoints: Mutex<HashMap<String, Weak<Core>>>,
    next_id: AtomicU64,
    capacity: usize,
}

/// Cloneable handle to one in-process socket directory
#[derive(Clone)]
pub struct Transport {
    inner: Arc<Directory>,
}

impl Transport {
    /// Create a transport with the default link capacity
    pub fn new() -> Self {
        Self::with_capacity(1024)
    }

    /// Create a transport whose links buffer up to `capacity` messages
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Directory {
                endpoints: Mutex::new(HashMap::new()),
                next_id: AtomicU64::new(1),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Open a new, unbound socket
    pub fn socket(&self, protocol: Protocol) -> Socket {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        Socket::new(self.clone(), id, protocol, self.inner.capacity)
    }

    /// Check whether a live socket is bound at `addr`
    pub fn is_bound(&self, addr: &str) -> bool {
        self.lookup(addr).is_some()
    }

    /// Number of live bound addresses
    pub fn bound_count(&self) -> usize {
        self.inner
            .endpoints
            .lock()
            .values()
            .filter(|core| core.upgrade().is_some_and(|c| !c.is_closed()))
            .count()
    }

    pub(crate) fn bind(&self, addr: &str, core: &Arc<Core>) -> Result<()> {
        let mut endpoints = self.inner.endpoints.lock();
        let in_use = endpoints
            .get(addr)
            .and_then(Weak::upgrade)
            .is_some_and(|existing| !existing.is_closed());
        if in_use {
            return Err(Error::AlreadyExists(addr.to_string()));
        }
        endpoints.insert(addr.to_string(), Arc::downgrade(core));
        Ok(())
    }

    pub(crate) fn unbind(&self, addr: &str, id: u64) {
        let mut endpoints = self.inner.endpoints.lock();
        let owned = endpoints
            .get(addr)
            .and_then(Weak::upgrade)
            .map_or(true, |core| core.id() == id);
        if owned {
            endpoints.remove(addr);
        }
    }

    pub(crate) fn lookup(&self, addr: &str) -> Option<Arc<Core>> {
        self.inner
            .endpoints
            .lock()
            .get(addr)
            .and_then(Weak::upgrade)
            .filter(|core| !core.is_closed())
    }
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Transport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Transport")
            .field("capacity", &self.inner.capacity)
            .finish_non_exhaustive()
    }
}
