//! Chat sessions
//!
//! Ties the bus, the hangup responder and the scribe supervisor together into
//! a [`Participant`] that can join a stream, talk, be kicked and leave.

pub mod participant;

pub use participant::Participant;
