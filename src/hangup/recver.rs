//! Hangup receiver
//!
//! Wraps a receive-side river so that closing the signal interrupts the next
//! or in-flight `recv` and closes the river underneath.

use bytes::Bytes;

use super::{recv_until, Hangup};
use crate::error::Result;
use crate::river::River;

/// Receive-only river interrupted by a [`Hangup`] signal
#[derive(Debug)]
pub struct HangupRecver<R> {
    river: R,
    hangup: Hangup,
}

impl<R: River> HangupRecver<R> {
    /// Wrap `river`; closing `hangup` ends its stream
    pub fn new(river: R, hangup: Hangup) -> Self {
        Self { river, hangup }
    }

    /// The wrapped river
    pub fn inner(&self) -> &R {
        &self.river
    }

    /// The shared signal
    pub fn signal(&self) -> &Hangup {
        &self.hangup
    }

    /// Next message, or `Ok(None)` once hung up
    pub async fn recv(&self) -> Result<Option<Bytes>> {
        recv_until(&self.river, &self.hangup).await
    }
}
