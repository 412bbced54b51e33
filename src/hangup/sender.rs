//! Hangup sender
//!
//! Wraps a responder and the reader its owner is blocked on. The reply to a
//! hangup survey closes the signal first, so the blocked read returns
//! end-of-stream as soon as the reply goes out.

use bytes::Bytes;

use super::{recv_until, Hangup};
use crate::error::Result;
use crate::river::River;
use crate::survey::{self, Responder};

/// Responder whose reply closes a [`Hangup`] signal
#[derive(Debug)]
pub struct HangupSender<R = ()> {
    responder: Responder,
    hangup: Hangup,
    reader: R,
}

impl HangupSender<()> {
    /// Wrap `responder`; replies close `hangup`
    pub fn new(responder: Responder, hangup: Hangup) -> Self {
        Self {
            responder,
            hangup,
            reader: (),
        }
    }
}

impl<R> HangupSender<R> {
    /// Attach the reader that hangup should interrupt
    pub fn with_reader<T>(self, reader: T) -> HangupSender<T> {
        HangupSender {
            responder: self.responder,
            hangup: self.hangup,
            reader,
        }
    }

    /// The wrapped responder
    pub fn responder(&self) -> &Responder {
        &self.responder
    }

    /// The attached reader
    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// The shared signal
    pub fn signal(&self) -> &Hangup {
        &self.hangup
    }

    /// Whether a hangup reply has gone out
    pub fn is_hung_up(&self) -> bool {
        self.hangup.is_closed()
    }
}

impl<R: Send + Sync> HangupSender<R> {
    /// Wait for one survey and answer it, closing the signal
    pub async fn await_hangup(&self) -> Result<()> {
        survey::await_hangup(self, self.responder.id()).await
    }
}

impl<R: River> HangupSender<R> {
    /// Read from the attached reader until hangup
    ///
    /// Returns `Ok(None)` at end-of-stream: immediately when the signal is
    /// already closed, or as soon as it closes mid-read, in which case the
    /// reader is closed too.
    pub async fn read(&self) -> Result<Option<Bytes>> {
        recv_until(&self.reader, &self.hangup).await
    }
}

impl<R: Send + Sync> River for HangupSender<R> {
    /// Close the signal, then send the reply
    async fn send(&self, payload: Bytes) -> Result<()> {
        if !self.hangup.close() {
            tracing::debug!(id = self.responder.id(), "Hangup signal already closed");
        }
        self.responder.send(payload).await
    }

    async fn recv(&self) -> Result<Bytes> {
        self.responder.recv().await
    }

    fn close(&self) -> Result<()> {
        self.responder.close()
    }
}
