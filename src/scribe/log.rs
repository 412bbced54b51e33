//! Durable message log
//!
//! Scribes write batches through the [`MessageLog`] trait. [`StoreLog`] keeps
//! them in the store under `<namespace>/<stream>/<sequence>`, with the
//! sequence as an 8-byte big-endian key so byte order is arrival order.

use bytes::Bytes;

use crate::error::Result;
use crate::store::Store;

/// Destination for scribe batches
pub trait MessageLog: Send + Sync + 'static {
    /// Persist `batch` for `stream`, all or nothing
    fn append(&self, stream: &str, batch: &[Bytes]) -> Result<()>;
}

/// Message log backed by the store
#[derive(Debug, Clone)]
pub struct StoreLog {
    store: Store,
    namespace: String,
}

impl StoreLog {
    /// Create a log under `namespace` in `store`
    pub fn new(store: Store, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    /// Every message logged for `stream`, oldest first
    pub fn messages(&self, stream: &str) -> Result<Vec<Bytes>> {
        self.store.view(|root| {
            Ok(root
                .bucket_at(&[self.namespace.as_str(), stream])
                .map(|bucket| bucket.iter().map(|(_, v)| v.clone()).collect())
                .unwrap_or_default())
        })
    }

    /// Number of messages logged for `stream`
    pub fn len(&self, stream: &str) -> Result<usize> {
        self.store.view(|root| {
            Ok(root
                .bucket_at(&[self.namespace.as_str(), stream])
                .map_or(0, |bucket| bucket.len()))
        })
    }
}

impl MessageLog for StoreLog {
    fn append(&self, stream: &str, batch: &[Bytes]) -> Result<()> {
        self.store.update(|root| {
            let bucket = root.create_bucket_path(&[self.namespace.as_str(), stream])?;
            for msg in batch {
                let seq = bucket.next_sequence();
                bucket.put(seq.to_be_bytes().to_vec(), msg.clone())?;
            }
            Ok(())
        })
    }
}
