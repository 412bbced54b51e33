//! Registry implementation
//!
//! Presence records for live peers, kept in one top-level namespace bucket of
//! the store. Every check-then-act sequence runs inside a single store
//! transaction; no other locking is layered on top.

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::store::{Bucket, Store};

/// Transactional presence registry for one namespace
#[derive(Debug, Clone)]
pub struct Registry {
    store: Store,
    namespace: String,
}

impl Registry {
    /// Create a registry rooted at `namespace` in `store`
    pub fn new(store: Store, namespace: impl Into<String>) -> Self {
        Self {
            store,
            namespace: namespace.into(),
        }
    }

    /// Namespace bucket name
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Underlying store handle
    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Register `peer` in `stream`
    ///
    /// Returns [`Error::AlreadyExists`] if the peer is already present.
    pub fn register(&self, stream: &str, peer: &str) -> Result<()> {
        self.register_in(&[stream], peer)
    }

    /// Remove `peer` from `stream`; removing a missing peer is not an error
    pub fn deregister(&self, stream: &str, peer: &str) -> Result<()> {
        self.deregister_in(&[stream], peer)
    }

    /// List the peers of `stream` in key order
    ///
    /// Returns [`Error::StreamMissing`] if the stream has no bucket.
    pub fn list_peers(&self, stream: &str) -> Result<Vec<String>> {
        self.list_in(&[stream])
    }

    /// Register `key` under a bucket path
    pub fn register_in(&self, path: &[&str], key: &str) -> Result<()> {
        self.join_with(path, key, |_| Ok(())).map(|_| ())
    }

    /// Remove `key` from a bucket path, ignoring a missing key or bucket
    pub fn deregister_in(&self, path: &[&str], key: &str) -> Result<()> {
        self.leave_with(path, key, || Ok(()))
    }

    /// List the keys under a bucket path in key order
    pub fn list_in(&self, path: &[&str]) -> Result<Vec<String>> {
        self.store.view(|root| {
            let bucket = self
                .bucket(root, path)
                .ok_or_else(|| Error::StreamMissing(self.describe(path)))?;
            Ok(keys_of(bucket))
        })
    }

    /// Check whether `key` is registered under a bucket path
    pub fn contains_in(&self, path: &[&str], key: &str) -> Result<bool> {
        self.store.view(|root| {
            Ok(self
                .bucket(root, path)
                .is_some_and(|bucket| bucket.contains(key.as_bytes())))
        })
    }

    /// Register `key` and bring up its endpoint in one transaction
    ///
    /// `bring_up` gets the keys that were present before `key` and runs while
    /// the transaction is open. If it fails, nothing is registered.
    pub fn join_with<T, F>(&self, path: &[&str], key: &str, bring_up: F) -> Result<(Vec<String>, T)>
    where
        F: FnOnce(&[String]) -> Result<T>,
    {
        self.store.update(|root| {
            let bucket = self.bucket_mut(root, path)?;
            if bucket.contains(key.as_bytes()) {
                return Err(Error::AlreadyExists(format!("{}/{}", self.describe(path), key)));
            }
            let existing = keys_of(bucket);
            let out = bring_up(&existing)?;
            bucket.put(key, Bytes::new())?;
            Ok((existing, out))
        })
    }

    /// Tear down an endpoint and remove its key in one transaction
    pub fn leave_with<F>(&self, path: &[&str], key: &str, teardown: F) -> Result<()>
    where
        F: FnOnce() -> Result<()>,
    {
        self.store.update(|root| {
            teardown()?;
            if let Some(bucket) = self.bucket_at_mut(root, path) {
                bucket.delete(key.as_bytes());
            }
            Ok(())
        })
    }

    /// Allocate a sequence id under a bucket path and register it
    ///
    /// The id is stored as a decimal key. `bring_up` runs inside the
    /// transaction; if it fails the id is not registered.
    pub fn allocate_with<T, F>(&self, path: &[&str], bring_up: F) -> Result<(u64, T)>
    where
        F: FnOnce(u64) -> Result<T>,
    {
        self.store.update(|root| {
            let bucket = self.bucket_mut(root, path)?;
            let id = bucket.next_sequence();
            let out = bring_up(id)?;
            bucket.put(id.to_string(), Bytes::new())?;
            Ok((id, out))
        })
    }

    /// List the sequence ids registered under a bucket path
    pub fn list_sequences(&self, path: &[&str]) -> Result<Vec<u64>> {
        let keys = self.list_in(path)?;
        let mut ids = keys
            .iter()
            .map(|key| {
                key.parse::<u64>()
                    .map_err(|_| Error::Storage(format!("bad sequence key {:?}", key)))
            })
            .collect::<Result<Vec<_>>>()?;
        ids.sort_unstable();
        Ok(ids)
    }

    /// Add one reference under a bucket path
    ///
    /// Returns the reference id and whether the bucket was empty before.
    pub fn acquire(&self, path: &[&str]) -> Result<(u64, bool)> {
        self.store.update(|root| {
            let bucket = self.bucket_mut(root, path)?;
            let first = bucket.is_empty();
            let id = bucket.next_sequence();
            bucket.put(id.to_string(), Bytes::new())?;
            Ok((id, first))
        })
    }

    /// Drop one reference under a bucket path
    ///
    /// Returns whether the bucket is empty afterwards.
    pub fn release(&self, path: &[&str], id: u64) -> Result<bool> {
        self.store.update(|root| {
            let bucket = self
                .bucket_at_mut(root, path)
                .ok_or_else(|| Error::StreamMissing(self.describe(path)))?;
            bucket.delete(id.to_string().as_bytes());
            Ok(bucket.is_empty())
        })
    }

    fn bucket<'a>(&self, root: &'a Bucket, path: &[&str]) -> Option<&'a Bucket> {
        root.bucket(self.namespace.as_bytes())?.bucket_at(path)
    }

    fn bucket_at_mut<'a>(&self, root: &'a mut Bucket, path: &[&str]) -> Option<&'a mut Bucket> {
        root.bucket_mut(self.namespace.as_bytes())?.bucket_at_mut(path)
    }

    fn bucket_mut<'a>(&self, root: &'a mut Bucket, path: &[&str]) -> Result<&'a mut Bucket> {
        root.create_bucket_if_not_exists(self.namespace.as_bytes())?
            .create_bucket_path(path)
    }

    fn describe(&self, path: &[&str]) -> String {
        let mut out = self.namespace.clone();
        for segment in path {
            out.push('/');
            out.push_str(segment);
        }
        out
    }
}

fn keys_of(bucket: &Bucket) -> Vec<String> {
    bucket
        .keys()
        .map(|key| String::from_utf8_lossy(key).into_owned())
        .collect()
}
