//! Chat participant
//!
//! A participant is a bus peer on its stream plus a responder under
//! `[stream, peer]` whose hangup reply ends the participant's reads. The
//! first participant on a stream spawns its scribe; the last one to leave
//! hangs it up.

use std::sync::Arc;

use bytes::Bytes;
use tokio::task::JoinHandle;

use crate::error::Result;
use crate::hangup::{Hangup, HangupSender};
use crate::river::{Bus, River};
use crate::rivers::Rivers;
use crate::scribe::Scribes;
use crate::stats::{ScribeReport, SocketStats};

/// One peer in a chat stream
#[derive(Debug)]
pub struct Participant {
    stream: String,
    peer: String,
    ticket: u64,
    scribes: Arc<Scribes>,
    sender: Arc<HangupSender<Bus>>,
    answer: JoinHandle<Result<()>>,
    left: bool,
}

impl Participant {
    /// Join `stream` as `peer`
    ///
    /// Enters the stream with the scribe supervisor first, which spawns the
    /// stream's scribe for the first participant. Everything acquired is
    /// released again if a later step fails.
    pub async fn join(scribes: &Arc<Scribes>, stream: &str, peer: &str) -> Result<Self> {
        let ticket = scribes.enter(stream).await?;

        let rivers = scribes.rivers();
        let bus = match rivers.create_bus(peer, stream) {
            Ok(bus) => bus,
            Err(e) => {
                abandon(scribes, stream, ticket).await;
                return Err(e);
            }
        };
        let responder = match rivers.create_responder(&[stream, peer]) {
            Ok(responder) => responder,
            Err(e) => {
                let _ = bus.leave();
                abandon(scribes, stream, ticket).await;
                return Err(e);
            }
        };

        let sender = Arc::new(HangupSender::new(responder, Hangup::new()).with_reader(bus));
        let answering = Arc::clone(&sender);
        let answer = tokio::spawn(async move { answering.await_hangup().await });

        tracing::info!(stream = stream, peer = peer, ticket = ticket, "Participant joined");

        Ok(Self {
            stream: stream.to_string(),
            peer: peer.to_string(),
            ticket,
            scribes: Arc::clone(scribes),
            sender,
            answer,
            left: false,
        })
    }

    /// Survey `peer`'s responder on `stream`, ending its reads
    pub async fn kick(rivers: &Rivers, stream: &str, peer: &str) -> Result<()> {
        let surveyor = rivers.create_surveyor(&[stream, peer])?;
        surveyor.survey().await?;
        tracing::info!(stream = stream, peer = peer, "Participant kicked");
        Ok(())
    }

    /// Stream name
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Peer id
    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Whether this participant has been hung up
    pub fn is_hung_up(&self) -> bool {
        self.sender.is_hung_up()
    }

    /// Bus counters
    pub fn stats(&self) -> SocketStats {
        self.sender.reader().stats()
    }

    /// Broadcast to every other peer on the stream, the scribe included
    pub async fn send(&self, payload: Bytes) -> Result<()> {
        self.sender.reader().send(payload).await
    }

    /// Next message, or `Ok(None)` once hung up
    pub async fn recv(&self) -> Result<Option<Bytes>> {
        self.sender.read().await
    }

    /// Leave the stream
    ///
    /// Closes and deregisters the bus and the responder, then exits the
    /// stream. The last participant out hangs up the scribe and gets its
    /// report.
    pub async fn leave(mut self) -> Result<Option<ScribeReport>> {
        self.left = true;
        let bus_left = self.sender.reader().leave();
        let responder_left = self.sender.responder().leave();

        // Closing the responder ends the answering task
        if let Ok(Err(e)) = (&mut self.answer).await {
            tracing::debug!(stream = %self.stream, peer = %self.peer, error = %e, "Hangup responder ended");
        }

        let report = self.scribes.exit(&self.stream, self.ticket).await?;
        bus_left?;
        responder_left?;
        tracing::info!(
            stream = %self.stream,
            peer = %self.peer,
            last = report.is_some(),
            "Participant left"
        );
        Ok(report)
    }
}

impl Drop for Participant {
    fn drop(&mut self) {
        self.answer.abort();
        if self.left {
            return;
        }
        let _ = self.sender.reader().leave();
        let _ = self.sender.responder().leave();

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(
                stream = %self.stream,
                peer = %self.peer,
                ticket = self.ticket,
                "Participant dropped outside a runtime, checkin kept"
            );
            return;
        };
        tracing::warn!(stream = %self.stream, peer = %self.peer, "Participant dropped without leaving");

        let scribes = Arc::clone(&self.scribes);
        let stream = self.stream.clone();
        let ticket = self.ticket;
        runtime.spawn(async move {
            if let Err(e) = scribes.exit(&stream, ticket).await {
                tracing::warn!(stream = %stream, ticket = ticket, error = %e, "Exit of dropped participant failed");
            }
        });
    }
}

async fn abandon(scribes: &Scribes, stream: &str, ticket: u64) {
    if let Err(e) = scribes.exit(stream, ticket).await {
        tracing::warn!(stream = stream, error = %e, "Exit after failed join");
    }
}
