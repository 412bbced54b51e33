//! Socket implementation
//!
//! Every socket owns one inbound channel and holds the inbound senders of the
//! sockets it is linked to. Closing a socket cancels its token, which wakes
//! any `recv` or `send` in flight.

use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::{Message, Protocol, Transport};
use crate::error::{Error, Result};
use crate::stats::{SocketCounters, SocketStats};

const DEFAULT_SURVEY_TIME: Duration = Duration::from_millis(30);

struct Link {
    core: Weak<Core>,
    tx: mpsc::Sender<Message>,
}

/// Survey bookkeeping; surveyors use the first three fields, respondents the last
#[derive(Default)]
struct SurveyState {
    tag: u64,
    deadline: Option<Instant>,
    survey_time: Option<Duration>,
    pending: Option<(u64, u64)>,
}

pub(crate) struct Core {
    id: u64,
    protocol: Protocol,
    addr: Mutex<Option<String>>,
    peers: Mutex<HashMap<u64, Link>>,
    inbox_tx: mpsc::Sender<Message>,
    inbox: tokio::sync::Mutex<mpsc::Receiver<Message>>,
    closed: CancellationToken,
    subscriptions: Mutex<Vec<Bytes>>,
    survey: Mutex<SurveyState>,
    counters: SocketCounters,
}

impl Core {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    fn link_to(&self, other: &Arc<Core>) {
        self.peers.lock().insert(
            other.id,
            Link {
                core: Arc::downgrade(other),
                tx: other.inbox_tx.clone(),
            },
        );
    }

    fn senders(&self) -> Vec<mpsc::Sender<Message>> {
        self.peers.lock().values().map(|l| l.tx.clone()).collect()
    }
}

/// One endpoint of the in-process transport
pub struct Socket {
    core: Arc<Core>,
    transport: Transport,
}

impl Socket {
    pub(super) fn new(transport: Transport, id: u64, protocol: Protocol, capacity: usize) -> Self {
        let (inbox_tx, inbox) = mpsc::channel(capacity);
        Self {
            core: Arc::new(Core {
                id,
                protocol,
                addr: Mutex::new(None),
                peers: Mutex::new(HashMap::new()),
                inbox_tx,
                inbox: tokio::sync::Mutex::new(inbox),
                closed: CancellationToken::new(),
                subscriptions: Mutex::new(Vec::new()),
                survey: Mutex::new(SurveyState::default()),
                counters: SocketCounters::default(),
            }),
            transport,
        }
    }

    /// Transport-unique socket id
    pub fn id(&self) -> u64 {
        self.core.id
    }

    /// Socket protocol
    pub fn protocol(&self) -> Protocol {
        self.core.protocol
    }

    /// Address this socket listens on, if any
    pub fn addr(&self) -> Option<String> {
        self.core.addr.lock().clone()
    }

    /// Whether `close` has been called
    pub fn is_closed(&self) -> bool {
        self.core.is_closed()
    }

    /// Number of linked peers
    pub fn peer_count(&self) -> usize {
        self.core.peers.lock().len()
    }

    /// Counters snapshot
    pub fn stats(&self) -> SocketStats {
        self.core.counters.snapshot()
    }

    /// Bind this socket at `addr`
    ///
    /// Fails with [`Error::AlreadyExists`] when a live socket holds the address.
    pub fn listen(&self, addr: &str) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let mut bound = self.core.addr.lock();
        if bound.is_some() {
            return Err(Error::ProtocolState("socket is already listening"));
        }
        self.transport.bind(addr, &self.core)?;
        *bound = Some(addr.to_string());
        Ok(())
    }

    /// Link this socket to the socket listening at `addr`
    pub fn dial(&self, addr: &str) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let remote = self
            .transport
            .lookup(addr)
            .ok_or_else(|| Error::ConnectionRefused(addr.to_string()))?;
        if !self.core.protocol.links_with(remote.protocol) {
            return Err(Error::Incompatible {
                local: self.core.protocol.name(),
                remote: remote.protocol.name(),
            });
        }
        if remote.id == self.core.id {
            return Ok(());
        }

        self.core.link_to(&remote);
        remote.link_to(&self.core);
        tracing::trace!(local = self.core.id, remote = remote.id, addr = addr, "Linked");
        Ok(())
    }

    /// Add a byte-prefix subscription (sub sockets only)
    ///
    /// The empty prefix matches every message.
    pub fn subscribe(&self, prefix: Bytes) -> Result<()> {
        if self.core.protocol != Protocol::Sub {
            return Err(self.unsupported("subscribe"));
        }
        let mut subscriptions = self.core.subscriptions.lock();
        if !subscriptions.contains(&prefix) {
            subscriptions.push(prefix);
        }
        Ok(())
    }

    /// Set how long a surveyor waits for replies after each survey
    pub fn set_survey_time(&self, time: Duration) -> Result<()> {
        if self.core.protocol != Protocol::Surveyor {
            return Err(self.unsupported("survey time"));
        }
        self.core.survey.lock().survey_time = Some(time);
        Ok(())
    }

    /// Send a message according to the socket protocol
    pub async fn send(&self, body: Bytes) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        match self.core.protocol {
            Protocol::Bus | Protocol::Pub => self.broadcast(0, body),
            Protocol::Surveyor => {
                let tag = {
                    let mut survey = self.core.survey.lock();
                    survey.tag += 1;
                    let window = survey.survey_time.unwrap_or(DEFAULT_SURVEY_TIME);
                    survey.deadline = Some(Instant::now() + window);
                    survey.tag
                };
                self.broadcast(tag, body)
            }
            Protocol::Respondent => self.reply(body).await,
            Protocol::Sub => Err(self.unsupported("send")),
        }
    }

    /// Broadcast `body` again under the survey in progress
    ///
    /// Keeps the survey tag, so replies to any earlier broadcast of the same
    /// survey are still accepted, and restarts the reply window.
    pub async fn resurvey(&self, body: Bytes) -> Result<()> {
        if self.core.protocol != Protocol::Surveyor {
            return Err(self.unsupported("resurvey"));
        }
        if self.is_closed() {
            return Err(Error::Closed);
        }
        let tag = {
            let mut survey = self.core.survey.lock();
            if survey.tag == 0 {
                return Err(Error::ProtocolState("no survey to repeat"));
            }
            let window = survey.survey_time.unwrap_or(DEFAULT_SURVEY_TIME);
            survey.deadline = Some(Instant::now() + window);
            survey.tag
        };
        self.broadcast(tag, body)
    }

    /// Receive the next message according to the socket protocol
    ///
    /// Blocks until a message arrives or the socket is closed. Surveyors stop
    /// with [`Error::Timeout`] once the survey window has passed.
    pub async fn recv(&self) -> Result<Bytes> {
        match self.core.protocol {
            Protocol::Pub => return Err(self.unsupported("recv")),
            Protocol::Surveyor => return self.recv_reply().await,
            _ => {}
        }

        let closed = &self.core.closed;
        let mut inbox = tokio::select! {
            biased;
            _ = closed.cancelled() => return Err(Error::Closed),
            inbox = self.core.inbox.lock() => inbox,
        };

        loop {
            let msg = tokio::select! {
                biased;
                _ = closed.cancelled() => return Err(Error::Closed),
                msg = inbox.recv() => msg.ok_or(Error::Closed)?,
            };

            match self.core.protocol {
                Protocol::Sub if !self.subscribed(&msg.body) => {
                    self.core.counters.on_filtered();
                    continue;
                }
                Protocol::Respondent => {
                    self.core.survey.lock().pending = Some((msg.from, msg.tag));
                }
                _ => {}
            }

            self.core.counters.on_recv(msg.body.len());
            return Ok(msg.body);
        }
    }

    /// Close the socket
    ///
    /// Unbinds the address, unlinks every peer and wakes in-flight calls.
    /// Closing an already closed socket does nothing.
    pub fn close(&self) -> Result<()> {
        if self.core.closed.is_cancelled() {
            return Ok(());
        }
        self.core.closed.cancel();

        if let Some(addr) = self.core.addr.lock().take() {
            self.transport.unbind(&addr, self.core.id);
        }

        let peers: Vec<Link> = self.core.peers.lock().drain().map(|(_, link)| link).collect();
        for link in peers {
            if let Some(peer) = link.core.upgrade() {
                peer.peers.lock().remove(&self.core.id);
            }
        }
        Ok(())
    }

    /// Take every message already queued for this socket without waiting
    ///
    /// Works after `close`, so a consumer can collect what arrived before its
    /// peers were unlinked. Returns nothing while a `recv` holds the inbox.
    pub fn drain(&self) -> Vec<Bytes> {
        let mut out = Vec::new();
        let Ok(mut inbox) = self.core.inbox.try_lock() else {
            return out;
        };
        while let Ok(msg) = inbox.try_recv() {
            if self.core.protocol == Protocol::Sub && !self.subscribed(&msg.body) {
                self.core.counters.on_filtered();
                continue;
            }
            self.core.counters.on_recv(msg.body.len());
            out.push(msg.body);
        }
        out
    }

    /// Offer `body` to every linked peer without waiting
    ///
    /// A peer whose inbox is full misses the message and the drop is
    /// counted, so one stalled reader never holds up the others.
    fn broadcast(&self, tag: u64, body: Bytes) -> Result<()> {
        let senders = self.core.senders();
        let len = body.len();
        for tx in senders {
            let msg = Message {
                from: self.core.id,
                tag,
                body: body.clone(),
            };
            match tx.try_send(msg) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    self.core.counters.on_dropped();
                    tracing::trace!(socket = self.core.id, "Peer inbox full, message dropped");
                }
                // A peer that went away between snapshot and send is skipped
                Err(TrySendError::Closed(_)) => {}
            }
        }
        self.core.counters.on_send(len);
        Ok(())
    }

    async fn reply(&self, body: Bytes) -> Result<()> {
        let (to, tag) = self
            .core
            .survey
            .lock()
            .pending
            .take()
            .ok_or(Error::ProtocolState("no survey to reply to"))?;

        let tx = self.core.peers.lock().get(&to).map(|l| l.tx.clone());
        let Some(tx) = tx else {
            tracing::debug!(socket = self.core.id, surveyor = to, "Surveyor gone, reply dropped");
            return Ok(());
        };

        let len = body.len();
        let msg = Message {
            from: self.core.id,
            tag,
            body,
        };
        tokio::select! {
            biased;
            _ = self.core.closed.cancelled() => return Err(Error::Closed),
            _ = tx.send(msg) => {}
        }
        self.core.counters.on_send(len);
        Ok(())
    }

    async fn recv_reply(&self) -> Result<Bytes> {
        let (tag, deadline) = {
            let survey = self.core.survey.lock();
            let deadline = survey
                .deadline
                .ok_or(Error::ProtocolState("no survey in progress"))?;
            (survey.tag, deadline)
        };

        let closed = &self.core.closed;
        let expired = tokio::time::sleep_until(deadline);
        tokio::pin!(expired);

        let mut inbox = tokio::select! {
            biased;
            _ = closed.cancelled() => return Err(Error::Closed),
            _ = &mut expired => return Err(Error::Timeout),
            inbox = self.core.inbox.lock() => inbox,
        };

        loop {
            let msg = tokio::select! {
                biased;
                _ = closed.cancelled() => return Err(Error::Closed),
                msg = inbox.recv() => msg.ok_or(Error::Closed)?,
                _ = &mut expired => return Err(Error::Timeout),
            };
            if msg.tag != tag {
                self.core.counters.on_filtered();
                continue;
            }
            self.core.counters.on_recv(msg.body.len());
            return Ok(msg.body);
        }
    }

    fn subscribed(&self, body: &[u8]) -> bool {
        self.core
            .subscriptions
            .lock()
            .iter()
            .any(|prefix| body.starts_with(prefix))
    }

    fn unsupported(&self, op: &'static str) -> Error {
        Error::Unsupported {
            op,
            protocol: self.core.protocol.name(),
        }
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

impl std::fmt::Debug for Socket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Socket")
            .field("id", &self.core.id)
            .field("protocol", &self.core.protocol)
            .field("addr", &*self.core.addr.lock())
            .field("closed", &self.is_closed())
            .finish()
    }
}
