//! Topics
//!
//! A topic multiplexes one logical channel over a pub/sub river. On the wire
//! a tagged message is `prefix (1 byte) || code (N bytes) || payload`, and a
//! receiver strips `len() = N + 1` header bytes.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{Error, Result};

/// A byte-prefix tagged logical channel
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Topic {
    prefix: u8,
    code: Bytes,
    name: String,
}

#[allow(clippy::len_without_is_empty)]
impl Topic {
    /// Prefix reserved for the global topic
    pub const GLOBAL_PREFIX: u8 = 0;

    /// Create a topic
    pub fn new(prefix: u8, code: impl Into<Bytes>, name: impl Into<String>) -> Self {
        Self {
            prefix,
            code: code.into(),
            name: name.into(),
        }
    }

    /// The global topic (prefix 0, code `[0]`)
    ///
    /// Subscribing to it receives all traffic, tagged or not.
    pub fn global() -> Self {
        Self::new(Self::GLOBAL_PREFIX, Bytes::from_static(&[0]), "global")
    }

    /// Whether this is the global topic
    ///
    /// Both the prefix and the code must match; the name is free.
    pub fn is_global(&self) -> bool {
        self.prefix == Self::GLOBAL_PREFIX && self.code[..] == [0]
    }

    /// Leading byte of the header
    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Human readable name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Full wire header: `prefix || code`
    pub fn code(&self) -> Bytes {
        let mut header = BytesMut::with_capacity(self.len());
        header.put_u8(self.prefix);
        header.extend_from_slice(&self.code);
        header.freeze()
    }

    /// Header length on the wire
    pub fn len(&self) -> usize {
        self.code.len() + 1
    }

    /// Tag `payload` with this topic's header
    pub fn encode(&self, payload: &[u8]) -> Bytes {
        let mut msg = BytesMut::with_capacity(self.len() + payload.len());
        msg.put_u8(self.prefix);
        msg.extend_from_slice(&self.code);
        msg.extend_from_slice(payload);
        msg.freeze()
    }

    /// Strip this topic's header from `msg`
    pub fn decode(&self, mut msg: Bytes) -> Result<Bytes> {
        if msg.len() < self.len() || msg[0] != self.prefix || msg[1..self.len()] != self.code[..] {
            return Err(Error::Decode(format!(
                "message does not carry topic {:?} header",
                self.name
            )));
        }
        Ok(msg.split_off(self.len()))
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}({:#04x})", self.name, self.prefix)
    }
}

/// Reject subscription sets with two topics sharing a prefix
///
/// The global prefix belongs to the global topic alone.
pub fn check_unique(topics: &[Topic]) -> Result<()> {
    let mut seen = [false; 256];
    for topic in topics {
        if topic.prefix == Topic::GLOBAL_PREFIX && !topic.is_global() {
            return Err(Error::ReservedPrefix(topic.prefix));
        }
        let slot = &mut seen[topic.prefix as usize];
        if *slot {
            return Err(Error::DuplicateTopic(topic.prefix));
        }
        *slot = true;
    }
    Ok(())
}

/// Decode a message received by a subscriber of `topics`
///
/// The topic whose prefix matches the leading byte is stripped. A message that
/// matches no subscribed prefix passes through untouched when the global topic
/// is subscribed, and is a decode error otherwise.
pub fn strip(topics: &[Topic], msg: Bytes) -> Result<Bytes> {
    let lead = msg.first().copied();
    if let Some(topic) = topics.iter().find(|t| Some(t.prefix) == lead) {
        return topic.decode(msg);
    }
    if topics.iter().any(Topic::is_global) {
        return Ok(msg);
    }
    Err(Error::Decode(match lead {
        Some(byte) => format!("no subscribed topic with prefix {:#04x}", byte),
        None => "empty message".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typing() -> Topic {
        Topic::new(2, Bytes::from_static(b"ty"), "typing")
    }

    #[test]
    fn test_code_and_len() {
        let topic = typing();
        assert_eq!(topic.code(), Bytes::from_static(b"\x02ty"));
        assert_eq!(topic.len(), 3);

        let global = Topic::global();
        assert_eq!(global.code(), Bytes::from_static(&[0, 0]));
        assert_eq!(global.len(), 2);
        assert!(global.is_global());
    }

    #[test]
    fn test_encode_then_strip() {
        let topic = typing();
        let msg = topic.encode(b"alice is typing");
        assert_eq!(
            strip(&[topic], msg).unwrap(),
            Bytes::from_static(b"alice is typing")
        );
    }

    #[test]
    fn test_header_mismatch_is_decode_error() {
        let topic = typing();
        let msg = Bytes::from_static(b"\x02xxpayload");
        assert!(matches!(strip(&[topic], msg), Err(Error::Decode(_))));
    }

    #[test]
    fn test_unmatched_prefix_is_decode_error() {
        let msg = Bytes::from_static(b"\x07payload");
        assert!(matches!(strip(&[typing()], msg), Err(Error::Decode(_))));
        assert!(matches!(strip(&[typing()], Bytes::new()), Err(Error::Decode(_))));
    }

    #[test]
    fn test_global_passes_other_topics_through() {
        let topics = [Topic::global()];
        let tagged = typing().encode(b"hi");
        assert_eq!(strip(&topics, tagged.clone()).unwrap(), tagged);

        let untagged = Topic::global().encode(b"hello");
        assert_eq!(strip(&topics, untagged).unwrap(), Bytes::from_static(b"hello"));
    }

    #[test]
    fn test_duplicate_prefix_rejected() {
        let a = Topic::new(5, Bytes::from_static(b"a"), "a");
        let b = Topic::new(5, Bytes::from_static(b"b"), "b");
        assert!(matches!(check_unique(&[a.clone(), b]), Err(Error::DuplicateTopic(5))));
        assert!(check_unique(&[a, typing(), Topic::global()]).is_ok());
    }

    #[test]
    fn test_global_prefix_is_reserved() {
        let impostor = Topic::new(0, Bytes::from_static(b"chat"), "chat");
        assert!(!impostor.is_global());
        assert!(matches!(
            check_unique(&[impostor]),
            Err(Error::ReservedPrefix(0))
        ));

        // Same header as the global topic under another name
        let renamed = Topic::new(0, Bytes::from_static(&[0]), "everything");
        assert!(renamed.is_global());
        assert!(check_unique(&[renamed]).is_ok());
    }
}
