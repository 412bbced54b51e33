//! Scribe lifecycle
//!
//! Every stream with at least one participant has exactly one scribe. The
//! scribe joins the stream's bus as [`SCRIBE_PEER`], buffers what it hears and
//! flushes batches to a [`MessageLog`]. Participants reference-count the
//! stream through `enter`/`exit`; whoever enters first spawns the scribe and
//! whoever exits last hangs it up. Both steps hold a per-stream lock, so a
//! first entry waits for the previous scribe to finish hanging up.
//!
//! ```text
//!   checkin ──► first? ──► spawn ──► Responder [stream, ~scribe]
//!                                    Bus ~scribe ──► buffer ──► flush
//!   checkout ─► last? ──► hangup ──► Surveyor [stream, ~scribe] ── HUP
//!                                    final flush ──► ScribeReport
//! ```

pub mod log;
mod writer;

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};
use tokio::task::JoinHandle;

use crate::error::{Error, Result};
use crate::hangup::{Hangup, HangupRecver, HangupSender};
use crate::registry::Registry;
use crate::rivers::Rivers;
use crate::stats::ScribeReport;

pub use log::{MessageLog, StoreLog};
use writer::Scribe;

/// Peer id and responder path segment reserved for the scribe
pub const SCRIBE_PEER: &str = "~scribe";

/// Reference-counting supervisor for per-stream scribes
pub struct Scribes {
    rivers: Rivers,
    log: Arc<dyn MessageLog>,
    registry: Registry,
    running: Mutex<HashMap<String, JoinHandle<Result<ScribeReport>>>>,
    lifecycles: Mutex<HashMap<String, Arc<AsyncMutex<()>>>>,
}

impl Scribes {
    /// Supervisor that logs into the store's log namespace
    pub fn new(rivers: Rivers) -> Self {
        let log = StoreLog::new(rivers.store().clone(), &rivers.config().namespaces.log);
        Self::with_log(rivers, Arc::new(log))
    }

    /// Supervisor that logs into `log`
    pub fn with_log(rivers: Rivers, log: Arc<dyn MessageLog>) -> Self {
        let registry = rivers.registry(&rivers.config().namespaces.scribe);
        Self {
            rivers,
            log,
            registry,
            running: Mutex::new(HashMap::new()),
            lifecycles: Mutex::new(HashMap::new()),
        }
    }

    /// Check in to `stream`, spawning its scribe if this is the first entry
    ///
    /// Waits while a previous last exit is still hanging up the stream's
    /// scribe. If the spawn fails the checkin is undone. Returns the ticket
    /// to hand back to [`exit`](Self::exit).
    pub async fn enter(&self, stream: &str) -> Result<u64> {
        let turn = self.lifecycle(stream).await;
        let (ticket, first) = self.checkin(stream)?;
        if first {
            if let Err(e) = self.spawn(stream) {
                if let Err(undo) = self.checkout(stream, ticket) {
                    tracing::warn!(stream = stream, error = %undo, "Checkout after failed spawn");
                }
                drop(turn);
                self.prune(stream);
                return Err(e);
            }
        }
        Ok(ticket)
    }

    /// Hand back `ticket`, hanging up the scribe if it was the last one
    ///
    /// Returns the scribe's report for the last exit and `None` otherwise.
    pub async fn exit(&self, stream: &str, ticket: u64) -> Result<Option<ScribeReport>> {
        let turn = self.lifecycle(stream).await;
        let result = match self.checkout(stream, ticket) {
            Ok(true) => self.hangup(stream).await.map(Some),
            Ok(false) => Ok(None),
            Err(e) => Err(e),
        };
        drop(turn);
        self.prune(stream);
        result
    }

    /// Add a reference to `stream`
    ///
    /// Returns the reference id and whether this was the first one, in which
    /// case the caller should [`spawn`](Self::spawn) the scribe.
    pub fn checkin(&self, stream: &str) -> Result<(u64, bool)> {
        let (id, first) = self.registry.acquire(&[stream])?;
        tracing::debug!(stream = stream, id = id, first = first, "Scribe checkin");
        Ok((id, first))
    }

    /// Drop reference `id` from `stream`
    ///
    /// Returns whether it was the last one, in which case the caller should
    /// [`hangup`](Self::hangup) the scribe.
    pub fn checkout(&self, stream: &str, id: u64) -> Result<bool> {
        let last = self.registry.release(&[stream], id)?;
        tracing::debug!(stream = stream, id = id, last = last, "Scribe checkout");
        Ok(last)
    }

    /// Start the scribe for `stream`
    ///
    /// Fails with [`Error::AlreadyExists`] while a scribe for `stream` is
    /// still registered on the bus.
    pub fn spawn(&self, stream: &str) -> Result<()> {
        let responder = self.rivers.create_responder(&[stream, SCRIBE_PEER])?;
        let bus = match self.rivers.create_bus(SCRIBE_PEER, stream) {
            Ok(bus) => bus,
            Err(e) => {
                let _ = responder.leave();
                return Err(e);
            }
        };

        let hangup = Hangup::new();
        let config = self.rivers.config();
        let scribe = Scribe {
            stream: stream.to_string(),
            recver: HangupRecver::new(bus, hangup.clone()),
            responder: Arc::new(HangupSender::new(responder, hangup)),
            log: Arc::clone(&self.log),
            batch_size: config.scribe_batch_size,
            flush_interval: config.scribe_flush_interval,
        };

        let handle = tokio::spawn(scribe.run());
        if let Some(stale) = self.running.lock().insert(stream.to_string(), handle) {
            // A previous loop for this stream already stopped; its report is lost
            tracing::warn!(stream = stream, finished = stale.is_finished(), "Replaced scribe handle");
        }
        tracing::info!(stream = stream, "Scribe spawned");
        Ok(())
    }

    /// Hang up the scribe for `stream` and wait for its final flush
    ///
    /// Surveys the scribe's responder, then joins the loop and returns its
    /// report. If the survey fails while the loop is still running, the loop
    /// stays registered here and the error is returned. A stream without a local loop yields an empty
    /// report.
    pub async fn hangup(&self, stream: &str) -> Result<ScribeReport> {
        let surveyed = match self.rivers.create_surveyor(&[stream, SCRIBE_PEER]) {
            Ok(surveyor) => surveyor.survey().await,
            // No scribe was ever registered for this stream
            Err(Error::StreamMissing(_)) => Ok(()),
            Err(e) => Err(e),
        };

        let Some(handle) = self.running.lock().remove(stream) else {
            surveyed?;
            tracing::debug!(stream = stream, "No local scribe to join");
            return Ok(ScribeReport::default());
        };

        if let Err(e) = surveyed {
            // A loop that already stopped has answered, whatever the survey saw
            if !handle.is_finished() {
                tracing::warn!(stream = stream, error = %e, "Scribe hangup survey failed");
                self.running.lock().insert(stream.to_string(), handle);
                return Err(e);
            }
            tracing::debug!(stream = stream, error = %e, "Survey failed but the scribe already stopped");
        }

        match handle.await {
            Ok(report) => report,
            Err(e) => {
                tracing::error!(stream = stream, error = %e, "Scribe loop died");
                self.purge(stream);
                Err(Error::Task(e.to_string()))
            }
        }
    }

    /// Whether a scribe loop for `stream` is held and still running
    pub fn is_running(&self, stream: &str) -> bool {
        self.running
            .lock()
            .get(stream)
            .is_some_and(|handle| !handle.is_finished())
    }

    /// The rivers handle scribes are created on
    pub fn rivers(&self) -> &Rivers {
        &self.rivers
    }

    async fn lifecycle(&self, stream: &str) -> OwnedMutexGuard<()> {
        let lock = Arc::clone(self.lifecycles.lock().entry(stream.to_string()).or_default());
        lock.lock_owned().await
    }

    // Locks are cloned under the map lock, so a count of one means nobody
    // else holds or waits on it
    fn prune(&self, stream: &str) {
        let mut lifecycles = self.lifecycles.lock();
        if lifecycles
            .get(stream)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            lifecycles.remove(stream);
        }
    }

    /// Remove what a dead loop left registered so the stream can respawn
    fn purge(&self, stream: &str) {
        let config = self.rivers.config();
        let bus = self.rivers.registry(&config.namespaces.bus);
        if let Err(e) = bus.deregister(stream, SCRIBE_PEER) {
            tracing::warn!(stream = stream, error = %e, "Scribe bus entry not removed");
        }

        let hangup = self.rivers.registry(&config.namespaces.hangup);
        let path = [stream, SCRIBE_PEER];
        let ids = match hangup.list_sequences(&path) {
            Ok(ids) => ids,
            Err(Error::StreamMissing(_)) => Vec::new(),
            Err(e) => {
                tracing::warn!(stream = stream, error = %e, "Scribe responders not listed");
                Vec::new()
            }
        };
        for id in ids {
            if let Err(e) = hangup.deregister_in(&path, &id.to_string()) {
                tracing::warn!(stream = stream, id = id, error = %e, "Scribe responder entry not removed");
            }
        }
    }
}

impl std::fmt::Debug for Scribes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scribes")
            .field("running", &self.running.lock().len())
            .finish_non_exhaustive()
    }
}
