//! Nested key/value buckets
//!
//! A bucket holds plain keys and named child buckets in two separate ordered
//! maps. A name can be a key or a child bucket, never both.
//!
//! Every change is journaled in the bucket it touches, together with the
//! names of children handed out mutably. The store commits by dropping the
//! journals along the touched paths and rolls back by replaying them in
//! reverse, so a transaction costs what it changes, not what the tree holds.

use std::collections::{BTreeMap, BTreeSet};

use bytes::Bytes;

use crate::error::{Error, Result};

/// Inverse of one change
#[derive(Debug)]
enum Undo {
    /// Restore a plain key (`None` removes it)
    Key(Vec<u8>, Option<Bytes>),
    /// Restore the sequence counter
    Sequence(u64),
    /// Drop a child created in this transaction
    Created(Vec<u8>),
    /// Put back a child deleted in this transaction
    Deleted(Vec<u8>, Bucket),
}

/// One level of the bucket tree
#[derive(Debug, Default)]
pub struct Bucket {
    /// Plain keys, iterated in byte order
    keys: BTreeMap<Vec<u8>, Bytes>,
    /// Child buckets, iterated in byte order
    buckets: BTreeMap<Vec<u8>, Bucket>,
    /// Last value handed out by `next_sequence`
    sequence: u64,
    /// Uncommitted changes to this level, oldest first
    journal: Vec<Undo>,
    /// Children borrowed mutably since the last commit
    touched: BTreeSet<Vec<u8>>,
}

impl Bucket {
    /// Get the value stored at `key`
    pub fn get(&self, key: &[u8]) -> Option<&Bytes> {
        self.keys.get(key)
    }

    /// Check whether `key` is present
    pub fn contains(&self, key: &[u8]) -> bool {
        self.keys.contains_key(key)
    }

    /// Store `value` at `key`, replacing any previous value
    ///
    /// Fails if `key` already names a child bucket.
    pub fn put(&mut self, key: impl Into<Vec<u8>>, value: Bytes) -> Result<()> {
        let key = key.into();
        if self.buckets.contains_key(&key) {
            return Err(Error::Storage(format!(
                "key {} is a bucket",
                String::from_utf8_lossy(&key)
            )));
        }
        let previous = self.keys.insert(key.clone(), value);
        self.journal.push(Undo::Key(key, previous));
        Ok(())
    }

    /// Remove `key`, returning whether it was present
    pub fn delete(&mut self, key: &[u8]) -> bool {
        match self.keys.remove(key) {
            Some(previous) => {
                self.journal.push(Undo::Key(key.to_vec(), Some(previous)));
                true
            }
            None => false,
        }
    }

    /// Iterate plain keys in byte order
    pub fn keys(&self) -> impl Iterator<Item = &[u8]> {
        self.keys.keys().map(Vec::as_slice)
    }

    /// Iterate plain key/value pairs in byte order
    pub fn iter(&self) -> impl Iterator<Item = (&[u8], &Bytes)> {
        self.keys.iter().map(|(k, v)| (k.as_slice(), v))
    }

    /// Number of plain keys
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// True when the bucket holds no plain keys
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Get a child bucket
    pub fn bucket(&self, name: &[u8]) -> Option<&Bucket> {
        self.buckets.get(name)
    }

    /// Get a child bucket mutably
    pub fn bucket_mut(&mut self, name: &[u8]) -> Option<&mut Bucket> {
        if !self.buckets.contains_key(name) {
            return None;
        }
        self.touch(name);
        self.buckets.get_mut(name)
    }

    /// Get a child bucket, creating it when missing
    pub fn create_bucket_if_not_exists(&mut self, name: &[u8]) -> Result<&mut Bucket> {
        if self.keys.contains_key(name) {
            return Err(Error::Storage(format!(
                "bucket name {} is a key",
                String::from_utf8_lossy(name)
            )));
        }
        if !self.buckets.contains_key(name) {
            self.buckets.insert(name.to_vec(), Bucket::default());
            self.journal.push(Undo::Created(name.to_vec()));
        }
        self.touch(name);
        self.buckets
            .get_mut(name)
            .ok_or_else(|| Error::Storage("bucket vanished during creation".into()))
    }

    /// Remove a child bucket and everything under it
    pub fn delete_bucket(&mut self, name: &[u8]) -> bool {
        match self.buckets.remove(name) {
            Some(child) => {
                self.journal.push(Undo::Deleted(name.to_vec(), child));
                true
            }
            None => false,
        }
    }

    /// Iterate child bucket names in byte order
    pub fn bucket_names(&self) -> impl Iterator<Item = &[u8]> {
        self.buckets.keys().map(Vec::as_slice)
    }

    /// Allocate the next sequence number for this bucket (starts at 1)
    pub fn next_sequence(&mut self) -> u64 {
        self.journal.push(Undo::Sequence(self.sequence));
        self.sequence += 1;
        self.sequence
    }

    /// Last allocated sequence number (0 if none)
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// Walk a path of child buckets
    pub fn bucket_at<S: AsRef<[u8]>>(&self, path: &[S]) -> Option<&Bucket> {
        path.iter()
            .try_fold(self, |bucket, segment| bucket.bucket(segment.as_ref()))
    }

    /// Walk a path of child buckets mutably
    pub fn bucket_at_mut<S: AsRef<[u8]>>(&mut self, path: &[S]) -> Option<&mut Bucket> {
        path.iter()
            .try_fold(self, |bucket, segment| bucket.bucket_mut(segment.as_ref()))
    }

    /// Walk a path of child buckets, creating every missing level
    pub fn create_bucket_path<S: AsRef<[u8]>>(&mut self, path: &[S]) -> Result<&mut Bucket> {
        let mut bucket = self;
        for segment in path {
            bucket = bucket.create_bucket_if_not_exists(segment.as_ref())?;
        }
        Ok(bucket)
    }

    /// Keep every journaled change
    pub(crate) fn commit(&mut self) {
        self.journal.clear();
        for name in std::mem::take(&mut self.touched) {
            if let Some(child) = self.buckets.get_mut(&name) {
                child.commit();
            }
        }
    }

    /// Undo every journaled change
    pub(crate) fn rollback(&mut self) {
        while let Some(undo) = self.journal.pop() {
            match undo {
                Undo::Key(key, Some(value)) => {
                    self.keys.insert(key, value);
                }
                Undo::Key(key, None) => {
                    self.keys.remove(&key);
                }
                Undo::Sequence(sequence) => self.sequence = sequence,
                Undo::Created(name) => {
                    self.buckets.remove(&name);
                }
                Undo::Deleted(name, child) => {
                    self.buckets.insert(name, child);
                }
            }
        }
        // Restored children still carry the changes made before their deletion
        for name in std::mem::take(&mut self.touched) {
            if let Some(child) = self.buckets.get_mut(&name) {
                child.rollback();
            }
        }
    }

    fn touch(&mut self, name: &[u8]) {
        if !self.touched.contains(name) {
            self.touched.insert(name.to_vec());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys_iterate_in_order() {
        let mut bucket = Bucket::default();
        bucket.put("c", Bytes::new()).unwrap();
        bucket.put("a", Bytes::new()).unwrap();
        bucket.put("b", Bytes::new()).unwrap();

        let keys: Vec<&[u8]> = bucket.keys().collect();
        assert_eq!(keys, vec![b"a".as_slice(), b"b", b"c"]);
    }

    #[test]
    fn test_key_and_bucket_names_do_not_collide() {
        let mut bucket = Bucket::default();
        bucket.create_bucket_if_not_exists(b"child").unwrap();
        bucket.put("plain", Bytes::new()).unwrap();

        assert!(bucket.put("child", Bytes::new()).is_err());
        assert!(bucket.create_bucket_if_not_exists(b"plain").is_err());
    }

    #[test]
    fn test_sequence_is_monotonic() {
        let mut bucket = Bucket::default();
        assert_eq!(bucket.sequence(), 0);
        assert_eq!(bucket.next_sequence(), 1);
        assert_eq!(bucket.next_sequence(), 2);

        // Deleting keys never rewinds the sequence
        bucket.put("2", Bytes::new()).unwrap();
        bucket.delete(b"2");
        assert_eq!(bucket.next_sequence(), 3);
    }

    #[test]
    fn test_nested_paths() {
        let mut root = Bucket::default();
        root.create_bucket_path(&["a", "b", "c"])
            .unwrap()
            .put("k", Bytes::from_static(b"v"))
            .unwrap();

        assert!(root.bucket_at(&["a", "b"]).is_some());
        assert!(root.bucket_at(&["a", "x"]).is_none());
        let leaf = root.bucket_at(&["a", "b", "c"]).unwrap();
        assert_eq!(leaf.get(b"k").unwrap().as_ref(), b"v");

        assert!(root.bucket_at_mut(&["a"]).unwrap().delete_bucket(b"b"));
        assert!(root.bucket_at(&["a", "b", "c"]).is_none());
    }

    #[test]
    fn test_rollback_restores_every_change() {
        let mut root = Bucket::default();
        let lobby = root.create_bucket_path(&["bus", "lobby"]).unwrap();
        lobby.put("alice", Bytes::from_static(b"1")).unwrap();
        lobby.next_sequence();
        root.create_bucket_path(&["bus", "gone"]).unwrap();
        root.commit();

        let lobby = root.bucket_at_mut(&["bus", "lobby"]).unwrap();
        lobby.put("alice", Bytes::from_static(b"2")).unwrap();
        lobby.put("bob", Bytes::new()).unwrap();
        lobby.next_sequence();
        let gone = root.bucket_at_mut(&["bus", "gone"]).unwrap();
        gone.put("x", Bytes::new()).unwrap();
        root.bucket_mut(b"bus").unwrap().delete_bucket(b"gone");
        root.create_bucket_path(&["pub", "news"]).unwrap();
        root.rollback();

        let lobby = root.bucket_at(&["bus", "lobby"]).unwrap();
        assert_eq!(lobby.get(b"alice").unwrap().as_ref(), b"1");
        assert!(!lobby.contains(b"bob"));
        assert_eq!(lobby.sequence(), 1);
        // Deleted child is back without the change made before its deletion
        assert!(root.bucket_at(&["bus", "gone"]).unwrap().is_empty());
        assert!(root.bucket(b"pub").is_none());
    }

    #[test]
    fn test_commit_clears_journals() {
        let mut root = Bucket::default();
        root.create_bucket_path(&["log", "lobby"])
            .unwrap()
            .put("k", Bytes::new())
            .unwrap();
        root.commit();
        root.rollback();

        assert!(root.bucket_at(&["log", "lobby"]).unwrap().contains(b"k"));
        assert!(root.journal.is_empty());
        assert!(root.touched.is_empty());
    }
}
