//! Error types
//!
//! One error enum covers the registry, the transport, the survey protocol and
//! the scribe. Registry collisions and "address in use" from the transport are
//! both reported as [`Error::AlreadyExists`].

use std::collections::BTreeMap;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Errors returned by river, registry and scribe operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Registry key already present, or the address is already bound
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// No registry bucket for the given stream or path
    #[error("stream missing: {0}")]
    StreamMissing(String),

    /// A respondent got a token it does not understand, or a surveyor got a
    /// reply it cannot attribute
    #[error("unknown survey: {0}")]
    UnknownSurvey(String),

    /// A survey ran out of attempts with these respondents still silent
    #[error("survey incomplete, no reply from {0:?}")]
    Missing(Vec<u64>),

    /// Respondents that answered the survey with a rejection
    ///
    /// Partial success is still one combined failure.
    #[error("{}", describe_rejections(.0))]
    Rejected(BTreeMap<u64, Error>),

    /// The socket was closed, locally or while a call was in flight
    #[error("socket closed")]
    Closed,

    /// Nothing is listening at the dialed address
    #[error("connection refused: {0}")]
    ConnectionRefused(String),

    /// The socket protocol does not support the operation
    #[error("{op} not supported by {protocol} socket")]
    Unsupported {
        op: &'static str,
        protocol: &'static str,
    },

    /// The two socket protocols cannot be linked
    #[error("cannot link {local} socket to {remote} socket")]
    Incompatible {
        local: &'static str,
        remote: &'static str,
    },

    /// A received message could not be decoded
    #[error("decode: {0}")]
    Decode(String),

    /// Two topics with the same prefix in one subscription set
    #[error("duplicate topic prefix {0:#04x}")]
    DuplicateTopic(u8),

    /// A topic other than the global one uses the global prefix
    #[error("topic prefix {0:#04x} is reserved for the global topic")]
    ReservedPrefix(u8),

    /// The survey window closed with no more replies pending
    #[error("survey window expired")]
    Timeout,

    /// The socket is not in a state that allows the operation
    #[error("protocol state: {0}")]
    ProtocolState(&'static str),

    /// The storage collaborator failed
    #[error("storage: {0}")]
    Storage(String),

    /// A background task panicked or was cancelled
    #[error("background task failed: {0}")]
    Task(String),

    /// A scribe loop ended with messages it could not persist
    #[error("scribe for {stream} failed with {unflushed} unflushed message(s): {source}")]
    Scribe {
        stream: String,
        unflushed: usize,
        #[source]
        source: Box<Error>,
    },
}

impl Error {
    /// True for the errors that mean "the other side is gone"
    pub fn is_closed(&self) -> bool {
        matches!(self, Error::Closed)
    }
}

fn describe_rejections(rejections: &BTreeMap<u64, Error>) -> String {
    let detail = rejections
        .iter()
        .map(|(id, err)| format!("{}: {}", id, err))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "survey rejected by {} respondent(s): {}",
        rejections.len(),
        detail
    )
}
