//! Rivers: message-passing socket roles
//!
//! Every role speaks the same three-call contract:
//!
//! ```text
//!   send(payload) -> Result<()>
//!   recv()        -> Result<Bytes>
//!   close()       -> Result<()>
//! ```
//!
//! `Bus` is full duplex, `Pub` only sends, `Sub` only receives. Survey roles
//! live in [`crate::survey`].

pub mod bus;
pub mod pubsub;
pub mod topic;

use std::future::Future;

use bytes::Bytes;

use crate::error::Result;

pub use bus::Bus;
pub use pubsub::{Pub, Sub};
pub use topic::Topic;

/// Common contract of every river role
///
/// Implementations are safe to share between tasks: concurrent `send` and
/// `recv` calls are allowed, and `close` wakes whatever is in flight.
pub trait River: Send + Sync {
    /// Send one message
    fn send(&self, payload: Bytes) -> impl Future<Output = Result<()>> + Send;

    /// Wait for the next message
    fn recv(&self) -> impl Future<Output = Result<Bytes>> + Send;

    /// Release the endpoint; closing twice is not an error
    fn close(&self) -> Result<()>;
}
