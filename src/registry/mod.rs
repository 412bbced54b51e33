//! Peer registry
//!
//! The registry records which peer addresses are live. It is the only shared
//! mutable state: peers discover each other by listing a stream's bucket, and
//! reference counts are the number of keys in a bucket.
//!
//! # Layout
//!
//! ```text
//!   <namespace>/
//!     <stream>/<peer>            bus and pub peers
//!     <path..>/<sequence>        responders, decimal ids
//! ```
//!
//! Registering a peer and binding its socket happen in the same store
//! transaction (see [`Registry::join_with`]), so an entry exists exactly while
//! its socket is bound, apart from sockets dropped without deregistering.

pub mod address;
pub mod store;

pub use address::PeerAddr;
pub use store::Registry;
