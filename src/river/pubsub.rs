//! Pub/Sub rivers
//!
//! Pub peers register under their stream like bus peers but only send. A Sub
//! takes a snapshot of the registered Pub peers when it is created and dials
//! them; Pub peers that register later are not seen by that Sub.

use bytes::Bytes;

use super::bus::dial_all;
use super::topic::{self, Topic};
use super::River;
use crate::error::Result;
use crate::registry::{PeerAddr, Registry};
use crate::rivers::Rivers;
use crate::stats::SocketStats;
use crate::transport::{Protocol, Socket};

/// Send-only broadcast river
#[derive(Debug)]
pub struct Pub {
    socket: Socket,
    registry: Registry,
    addr: PeerAddr,
}

impl Pub {
    pub(crate) fn create(rivers: &Rivers, peer: &str, stream: &str) -> Result<Self> {
        let registry = rivers.registry(&rivers.config().namespaces.publishers);
        let addr = PeerAddr::new(registry.namespace(), &[stream], peer);
        let socket = rivers.transport().socket(Protocol::Pub);

        registry.join_with(&[stream], peer, |_| socket.listen(&addr.endpoint()))?;
        tracing::info!(stream = stream, peer = peer, "Pub registered");

        Ok(Self {
            socket,
            registry,
            addr,
        })
    }

    /// Stream this peer belongs to
    pub fn stream(&self) -> &str {
        &self.addr.path[0]
    }

    /// Peer id
    pub fn peer(&self) -> &str {
        &self.addr.key
    }

    /// Number of subscribers currently linked
    pub fn subscriber_count(&self) -> usize {
        self.socket.peer_count()
    }

    /// Counters snapshot
    pub fn stats(&self) -> SocketStats {
        self.socket.stats()
    }

    /// Send `payload` tagged with `topic`
    pub async fn publish(&self, topic: &Topic, payload: &[u8]) -> Result<()> {
        self.socket.send(topic.encode(payload)).await
    }

    /// Remove the registry entry; a missing entry is not an error
    pub fn deregister(&self) -> Result<()> {
        self.registry.deregister(self.stream(), self.peer())
    }

    /// Close the socket and remove the registry entry in one transaction
    pub fn leave(&self) -> Result<()> {
        self.registry
            .leave_with(&[self.stream()], self.peer(), || self.socket.close())
    }
}

impl River for Pub {
    /// Broadcast raw bytes; callers tag them with a topic header first
    async fn send(&self, payload: Bytes) -> Result<()> {
        self.socket.send(payload).await
    }

    async fn recv(&self) -> Result<Bytes> {
        self.socket.recv().await
    }

    fn close(&self) -> Result<()> {
        self.socket.close()
    }
}

/// Topic-filtered receive-only river
#[derive(Debug)]
pub struct Sub {
    socket: Socket,
    stream: String,
    topics: Vec<Topic>,
}

impl Sub {
    pub(crate) fn create(rivers: &Rivers, stream: &str, topics: &[Topic]) -> Result<Self> {
        let topics = if topics.is_empty() {
            vec![Topic::global()]
        } else {
            topics.to_vec()
        };
        topic::check_unique(&topics)?;

        let registry = rivers.registry(&rivers.config().namespaces.publishers);
        let publishers = registry.list_peers(stream)?;

        let socket = rivers.transport().socket(Protocol::Sub);
        for topic in &topics {
            let filter = if topic.is_global() {
                Bytes::new()
            } else {
                topic.code()
            };
            socket.subscribe(filter)?;
        }

        let addr = PeerAddr::new(registry.namespace(), &[stream], "");
        let linked = dial_all(&socket, &addr, &publishers);
        tracing::info!(
            stream = stream,
            publishers = linked,
            topics = topics.len(),
            "Sub created"
        );

        Ok(Self {
            socket,
            stream: stream.to_string(),
            topics,
        })
    }

    /// Stream this subscriber listens to
    pub fn stream(&self) -> &str {
        &self.stream
    }

    /// Subscribed topics
    pub fn topics(&self) -> &[Topic] {
        &self.topics
    }

    /// Number of publishers linked at creation that are still live
    pub fn publisher_count(&self) -> usize {
        self.socket.peer_count()
    }

    /// Counters snapshot
    pub fn stats(&self) -> SocketStats {
        self.socket.stats()
    }
}

impl River for Sub {
    async fn send(&self, payload: Bytes) -> Result<()> {
        self.socket.send(payload).await
    }

    /// Receive the next matching message with its topic header stripped
    async fn recv(&self) -> Result<Bytes> {
        let msg = self.socket.recv().await?;
        topic::strip(&self.topics, msg)
    }

    fn close(&self) -> Result<()> {
        self.socket.close()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::error::Error;

    fn chat() -> Topic {
        Topic::new(1, Bytes::from_static(b"c"), "chat")
    }

    fn presence() -> Topic {
        Topic::new(2, Bytes::from_static(b"p"), "presence")
    }

    #[tokio::test]
    async fn test_topic_isolation() {
        let rivers = Rivers::new();
        let publisher = rivers.create_pub("p", "lobby").unwrap();
        let chat_sub = rivers.create_sub("lobby", &[chat()]).unwrap();
        let presence_sub = rivers.create_sub("lobby", &[presence()]).unwrap();

        publisher.publish(&chat(), b"hello").await.unwrap();

        assert_eq!(chat_sub.recv().await.unwrap(), Bytes::from_static(b"hello"));
        let leaked = tokio::time::timeout(Duration::from_millis(20), presence_sub.recv()).await;
        assert!(leaked.is_err());
    }

    #[tokio::test]
    async fn test_default_is_global() {
        let rivers = Rivers::new();
        let publisher = rivers.create_pub("p", "lobby").unwrap();
        let sub = rivers.create_sub("lobby", &[]).unwrap();
        assert_eq!(sub.topics(), &[Topic::global()]);

        publisher.publish(&Topic::global(), b"plain").await.unwrap();
        assert_eq!(sub.recv().await.unwrap(), Bytes::from_static(b"plain"));
    }

    #[tokio::test]
    async fn test_duplicate_prefix() {
        let rivers = Rivers::new();
        let _publisher = rivers.create_pub("p", "lobby").unwrap();
        let clash = Topic::new(1, Bytes::from_static(b"x"), "clash");

        let result = rivers.create_sub("lobby", &[chat(), clash]);
        assert!(matches!(result, Err(Error::DuplicateTopic(1))));
    }

    #[tokio::test]
    async fn test_global_prefix_needs_global_code() {
        let rivers = Rivers::new();
        let publisher = rivers.create_pub("p", "lobby").unwrap();
        let lookalike = Topic::new(0, Bytes::from_static(b"news"), "news");

        // Would otherwise subscribe to everything with an empty filter
        assert!(matches!(
            rivers.create_sub("lobby", &[lookalike]),
            Err(Error::ReservedPrefix(0))
        ));

        let sub = rivers.create_sub("lobby", &[chat()]).unwrap();
        publisher.publish(&presence(), b"away").await.unwrap();
        publisher.publish(&chat(), b"hi").await.unwrap();
        assert_eq!(sub.recv().await.unwrap(), Bytes::from_static(b"hi"));
    }

    #[tokio::test]
    async fn test_sub_without_publishers() {
        let rivers = Rivers::new();
        assert!(matches!(
            rivers.create_sub("empty", &[]),
            Err(Error::StreamMissing(_))
        ));
    }

    #[tokio::test]
    async fn test_pub_cannot_recv_and_sub_cannot_send() {
        let rivers = Rivers::new();
        let publisher = rivers.create_pub("p", "lobby").unwrap();
        let sub = rivers.create_sub("lobby", &[]).unwrap();

        assert!(matches!(publisher.recv().await, Err(Error::Unsupported { .. })));
        assert!(matches!(
            sub.send(Bytes::new()).await,
            Err(Error::Unsupported { .. })
        ));
    }

    // Membership is a snapshot: a Pub registered after the Sub is not linked.
    #[tokio::test]
    async fn test_late_publisher_is_invisible() {
        let rivers = Rivers::new();
        let early = rivers.create_pub("early", "lobby").unwrap();
        let sub = rivers.create_sub("lobby", &[]).unwrap();
        let late = rivers.create_pub("late", "lobby").unwrap();

        assert_eq!(sub.publisher_count(), 1);
        assert_eq!(late.subscriber_count(), 0);

        late.publish(&Topic::global(), b"lost").await.unwrap();
        early.publish(&Topic::global(), b"seen").await.unwrap();
        assert_eq!(sub.recv().await.unwrap(), Bytes::from_static(b"seen"));
    }
}
