//! Transactional bucket store
//!
//! The registry and the scribe log keep their state here. Transactions are
//! serializable: `update` holds the store lock for the whole closure and
//! changes the tree in place. Each bucket journals what the closure changed;
//! `Ok` drops the journals, `Err` replays them backwards.
//!
//! ```text
//!   Store ── Arc<Mutex<Bucket>> (root)
//!              ├── bus/<stream>/<peer>          -> ∅
//!              ├── pub/<stream>/<peer>          -> ∅
//!              ├── hangup/<path..>/<sequence>   -> ∅
//!              ├── scribe/<stream>/<sequence>   -> ∅
//!              └── log/<stream>/<sequence>      -> message
//! ```

pub mod bucket;

use std::sync::Arc;

use parking_lot::Mutex;

use crate::error::Result;

pub use bucket::Bucket;

/// Cloneable handle to one in-memory store
#[derive(Clone, Default)]
pub struct Store {
    root: Arc<Mutex<Bucket>>,
}

impl Store {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Run a read-write transaction
    ///
    /// Every change made by `f` is discarded when it returns an error.
    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Bucket) -> Result<T>,
    {
        let mut root = self.root.lock();
        // Leftovers of a closure that panicked mid-transaction
        root.rollback();
        match f(&mut root) {
            Ok(out) => {
                root.commit();
                Ok(out)
            }
            Err(e) => {
                root.rollback();
                Err(e)
            }
        }
    }

    /// Run a read-only transaction
    pub fn view<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Bucket) -> Result<T>,
    {
        let root = self.root.lock();
        f(&root)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::error::Error;

    #[test]
    fn test_update_commits() {
        let store = Store::new();
        store
            .update(|root| root.create_bucket_path(&["a"])?.put("k", Bytes::new()))
            .unwrap();

        let present = store
            .view(|root| Ok(root.bucket_at(&["a"]).is_some_and(|b| b.contains(b"k"))))
            .unwrap();
        assert!(present);
    }

    #[test]
    fn test_update_rolls_back_on_error() {
        let store = Store::new();
        let result: Result<()> = store.update(|root| {
            root.create_bucket_path(&["a"])?.put("k", Bytes::new())?;
            Err(Error::Storage("abort".into()))
        });
        assert!(result.is_err());

        let exists = store.view(|root| Ok(root.bucket_at(&["a"]).is_some())).unwrap();
        assert!(!exists);
    }

    #[test]
    fn test_clones_share_state() {
        let store = Store::new();
        let other = store.clone();
        store
            .update(|root| root.create_bucket_path(&["x"]).map(|_| ()))
            .unwrap();

        assert!(other.view(|root| Ok(root.bucket_at(&["x"]).is_some())).unwrap());
    }

    #[test]
    fn test_rollback_keeps_earlier_commits() {
        let store = Store::new();
        store
            .update(|root| {
                let log = root.create_bucket_path(&["log", "lobby"])?;
                for i in 0..3u8 {
                    let seq = log.next_sequence();
                    log.put(seq.to_be_bytes().to_vec(), Bytes::from(vec![i]))?;
                }
                Ok(())
            })
            .unwrap();

        let result: Result<()> = store.update(|root| {
            let log = root.create_bucket_path(&["log", "lobby"])?;
            let seq = log.next_sequence();
            log.put(seq.to_be_bytes().to_vec(), Bytes::new())?;
            log.delete(&1u64.to_be_bytes());
            Err(Error::Storage("abort".into()))
        });
        assert!(result.is_err());

        let (len, sequence) = store
            .view(|root| {
                let log = root.bucket_at(&["log", "lobby"]).unwrap();
                Ok((log.len(), log.sequence()))
            })
            .unwrap();
        assert_eq!((len, sequence), (3, 3));
    }

    #[test]
    fn test_panicking_transaction_is_undone() {
        let store = Store::new();
        let panicked = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _: Result<()> = store.update(|root| {
                root.create_bucket_path(&["half"])?;
                panic!("closure failed");
            });
        }));
        assert!(panicked.is_err());

        store.update(|_| Ok(())).unwrap();
        assert!(store.view(|root| Ok(root.bucket(b"half").is_none())).unwrap());
    }
}
