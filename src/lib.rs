//! # rivers
//!
//! In-process multi-party messaging over a transactional peer registry.
//!
//! A *stream* is a named group of peers. Peers find each other through the
//! [`Registry`](registry::Registry) and talk over *rivers*:
//!
//! - [`Bus`]: every peer hears every other peer
//! - [`Pub`] / [`Sub`]: one-way fan-out with topic prefixes
//! - [`Surveyor`] / [`Responder`]: hangup surveys with per-responder acks
//!
//! Hangup adapters turn a survey reply into end-of-stream for a blocked
//! reader, and [`Scribes`] keeps one batching log writer per active stream.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use bytes::Bytes;
//! use rivers::{Participant, Rivers, Scribes};
//!
//! # async fn example() -> rivers::Result<()> {
//! let scribes = Arc::new(Scribes::new(Rivers::new()));
//! let alice = Participant::join(&scribes, "lobby", "alice").await?;
//! let bob = Participant::join(&scribes, "lobby", "bob").await?;
//!
//! alice.send(Bytes::from_static(b"hi")).await?;
//! assert_eq!(bob.recv().await?, Some(Bytes::from_static(b"hi")));
//!
//! alice.leave().await?;
//! let report = bob.leave().await?;
//! assert!(report.is_some());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod hangup;
pub mod registry;
pub mod river;
pub mod rivers;
pub mod scribe;
pub mod session;
pub mod stats;
pub mod store;
pub mod survey;
pub mod transport;

pub use config::{Namespaces, RiverConfig};
pub use error::{Error, Result};
pub use hangup::{Hangup, HangupRecver, HangupSender};
pub use river::{Bus, Pub, River, Sub, Topic};
pub use rivers::Rivers;
pub use scribe::{MessageLog, Scribes, StoreLog};
pub use session::Participant;
pub use stats::{ScribeReport, SocketStats};
pub use store::Store;
pub use survey::{Responder, Surveyor};
