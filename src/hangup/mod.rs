//! Hangup signal and adapters
//!
//! The [`Hangup`] signal is a one-shot, close-only flag shared between the
//! reply path of a responder and whoever is parked in a blocking read. Once
//! closed it stays closed, and every clone observes it without polling.
//!
//! ```text
//!   surveyor ── HUP ──► HangupSender::send(OK) ── closes ──► Hangup
//!                                                             │
//!        HangupSender::read / HangupRecver::recv ◄── wakes ───┘
//!                 returns end-of-stream, closes the reader
//! ```

pub mod recver;
pub mod sender;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::error::Result;
use crate::river::River;

pub use recver::HangupRecver;
pub use sender::HangupSender;

/// One-shot close-only signal
#[derive(Debug, Clone, Default)]
pub struct Hangup {
    token: CancellationToken,
    fired: Arc<AtomicBool>,
}

impl Hangup {
    /// Create an open signal
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the signal
    ///
    /// Returns true for the call that actually closed it; later calls are
    /// no-ops that return false.
    pub fn close(&self) -> bool {
        let first = !self.fired.swap(true, Ordering::AcqRel);
        self.token.cancel();
        first
    }

    /// Whether the signal has been closed
    pub fn is_closed(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Wait until the signal is closed
    pub async fn closed(&self) {
        self.token.cancelled().await
    }
}

/// Receive from `river` until `hangup` closes
///
/// Returns `Ok(None)` once the signal is closed, closing `river` so nothing
/// else arrives. An error from `river` after the signal closed is also
/// reported as end-of-stream.
pub(crate) async fn recv_until<R: River>(river: &R, hangup: &Hangup) -> Result<Option<Bytes>> {
    if hangup.is_closed() {
        river.close()?;
        return Ok(None);
    }

    tokio::select! {
        biased;
        _ = hangup.closed() => {
            river.close()?;
            Ok(None)
        }
        msg = river.recv() => match msg {
            Ok(bytes) => Ok(Some(bytes)),
            Err(_) if hangup.is_closed() => {
                river.close()?;
                Ok(None)
            }
            Err(e) => Err(e),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_close_once() {
        let hangup = Hangup::new();
        let other = hangup.clone();
        assert!(!other.is_closed());

        assert!(hangup.close());
        assert!(!other.close());
        assert!(other.is_closed());
    }

    #[tokio::test]
    async fn test_closed_wakes_waiters() {
        let hangup = Hangup::new();
        let waiter = hangup.clone();
        let handle = tokio::spawn(async move { waiter.closed().await });

        hangup.close();
        tokio::time::timeout(std::time::Duration::from_secs(1), handle)
            .await
            .expect("waiter should wake")
            .unwrap();

        // Already closed: returns immediately
        hangup.closed().await;
    }
}
