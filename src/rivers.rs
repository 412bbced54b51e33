//! Rivers handle
//!
//! Bundles the store, the transport and the configuration that every river
//! operation needs, so they are passed explicitly instead of living in
//! process-wide singletons.

use std::sync::Arc;

use crate::config::RiverConfig;
use crate::error::Result;
use crate::registry::Registry;
use crate::river::{Bus, Pub, Sub, Topic};
use crate::store::Store;
use crate::survey::{Responder, Surveyor};
use crate::transport::Transport;

struct Inner {
    store: Store,
    transport: Transport,
    config: RiverConfig,
}

/// Cloneable handle used to create rivers
///
/// # Example
/// ```no_run
/// use bytes::Bytes;
/// use rivers::{River, Rivers};
///
/// # async fn example() -> rivers::Result<()> {
/// let rivers = Rivers::new();
/// let alice = rivers.create_bus("alice", "lobby")?;
/// let bob = rivers.create_bus("bob", "lobby")?;
///
/// alice.send(Bytes::from_static(b"hi bob")).await?;
/// assert_eq!(bob.recv().await?, Bytes::from_static(b"hi bob"));
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Rivers {
    inner: Arc<Inner>,
}

impl Rivers {
    /// Create a handle over a fresh store with default configuration
    pub fn new() -> Self {
        Self::with_config(RiverConfig::default())
    }

    /// Create a handle over a fresh store
    pub fn with_config(config: RiverConfig) -> Self {
        Self::with_store(Store::new(), config)
    }

    /// Create a handle over an existing store
    pub fn with_store(store: Store, config: RiverConfig) -> Self {
        let transport = Transport::with_capacity(config.channel_capacity);
        Self {
            inner: Arc::new(Inner {
                store,
                transport,
                config,
            }),
        }
    }

    /// Store handle
    pub fn store(&self) -> &Store {
        &self.inner.store
    }

    /// Transport handle
    pub fn transport(&self) -> &Transport {
        &self.inner.transport
    }

    /// Configuration
    pub fn config(&self) -> &RiverConfig {
        &self.inner.config
    }

    /// Registry over one namespace of the store
    pub fn registry(&self, namespace: &str) -> Registry {
        Registry::new(self.inner.store.clone(), namespace)
    }

    /// Join `stream` as bus peer `peer`
    pub fn create_bus(&self, peer: &str, stream: &str) -> Result<Bus> {
        Bus::create(self, peer, stream)
    }

    /// Register `peer` as a publisher on `stream`
    pub fn create_pub(&self, peer: &str, stream: &str) -> Result<Pub> {
        Pub::create(self, peer, stream)
    }

    /// Subscribe to the publishers currently registered on `stream`
    ///
    /// With no topics the subscriber gets the global topic.
    pub fn create_sub(&self, stream: &str, topics: &[Topic]) -> Result<Sub> {
        Sub::create(self, stream, topics)
    }

    /// Create a responder with a fresh sequence id under `path`
    pub fn create_responder(&self, path: &[&str]) -> Result<Responder> {
        Responder::create(self, path)
    }

    /// Create a surveyor over the responders currently registered under `path`
    pub fn create_surveyor(&self, path: &[&str]) -> Result<Surveyor> {
        Surveyor::create(self, path)
    }

    /// Bus peers registered on `stream`
    pub fn bus_peers(&self, stream: &str) -> Result<Vec<String>> {
        self.registry(&self.inner.config.namespaces.bus)
            .list_peers(stream)
    }

    /// Pub peers registered on `stream`
    pub fn pub_peers(&self, stream: &str) -> Result<Vec<String>> {
        self.registry(&self.inner.config.namespaces.publishers)
            .list_peers(stream)
    }
}

impl Default for Rivers {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Rivers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rivers")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}
