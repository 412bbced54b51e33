//! Survey protocol for coordinated hangup
//!
//! A surveyor broadcasts `HUP` to every responder registered under a bucket
//! path and collects one reply per responder:
//!
//! ```text
//!   surveyor ── "HUP" ──────────────────► responder 1..N
//!            ◄─ "OK"  || id (u64 LE) ───  acknowledged
//!            ◄─ "IDK" || id (u64 LE) ───  survey not understood
//! ```
//!
//! Each attempt waits one survey window; silent responders are surveyed
//! again, up to the configured number of attempts.

pub mod responder;
pub mod round;
pub mod surveyor;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};
use crate::river::River;

pub use responder::Responder;
pub use round::Round;
pub use surveyor::Surveyor;

/// Survey token asking respondents to hang up
pub const HUP: &[u8] = b"HUP";

/// Acknowledgment prefix
pub const OK: &[u8] = b"OK";

/// Rejection prefix
pub const IDK: &[u8] = b"IDK";

/// A decoded survey reply
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    /// Respondent acknowledged the hangup
    Ok(u64),
    /// Respondent did not understand the survey
    Unknown(u64),
}

impl Reply {
    /// Respondent id carried by the reply
    pub fn id(self) -> u64 {
        match self {
            Reply::Ok(id) | Reply::Unknown(id) => id,
        }
    }

    /// Wire form: prefix followed by the id in little-endian order
    pub fn encode(self) -> Bytes {
        let prefix = match self {
            Reply::Ok(_) => OK,
            Reply::Unknown(_) => IDK,
        };
        let mut out = BytesMut::with_capacity(prefix.len() + 8);
        out.extend_from_slice(prefix);
        out.put_u64_le(self.id());
        out.freeze()
    }

    /// Parse a reply received by a surveyor
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        if let Some(id) = suffix_id(bytes, OK) {
            return Ok(Reply::Ok(id));
        }
        if let Some(id) = suffix_id(bytes, IDK) {
            return Ok(Reply::Unknown(id));
        }
        Err(Error::UnknownSurvey(format!(
            "unrecognized reply {:?}",
            String::from_utf8_lossy(bytes)
        )))
    }
}

fn suffix_id(bytes: &[u8], prefix: &[u8]) -> Option<u64> {
    let rest = bytes.strip_prefix(prefix)?;
    let id: [u8; 8] = rest.try_into().ok()?;
    Some(u64::from_le_bytes(id))
}

/// Wait for one survey on `river` and answer it as respondent `id`
///
/// `HUP` is acknowledged with `OK`; anything else is answered with `IDK` and
/// reported to the caller as [`Error::UnknownSurvey`].
pub async fn await_hangup<R: River>(river: &R, id: u64) -> Result<()> {
    let survey = river.recv().await?;
    if survey.as_ref() == HUP {
        river.send(Reply::Ok(id).encode()).await?;
        tracing::debug!(id = id, "Hangup acknowledged");
        Ok(())
    } else {
        river.send(Reply::Unknown(id).encode()).await?;
        let token = String::from_utf8_lossy(&survey).into_owned();
        tracing::warn!(id = id, token = %token, "Unknown survey");
        Err(Error::UnknownSurvey(token))
    }
}
