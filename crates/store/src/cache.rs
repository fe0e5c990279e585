//! Authoritative in-RAM store for one resource kind.
//!
//! Readers load an immutable snapshot through `ArcSwap` and never block.
//! The single writer builds the next map off to the side and publishes it
//! with one pointer swap, so a reader sees either the whole previous state or
//! the whole next one.

use std::sync::{Arc, Mutex, PoisonError};

use arc_swap::ArcSwap;
use cloudrec_core::{ChangeSet, CoreError, Record, Snapshot};
use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct CacheSnapshot<R: Record> {
    pub epoch: u64,
    pub items: Snapshot<R>,
}

impl<R: Record> Default for CacheSnapshot<R> {
    fn default() -> Self { Self { epoch: 0, items: Snapshot::<R>::default() } }
}

/// What an apply actually did, in listener terms.
#[derive(Debug, Clone)]
pub struct Applied<R: Record> {
    pub epoch: u64,
    pub added: Vec<R>,
    /// `(new, previous)` pairs.
    pub updated: Vec<(R, R)>,
    pub deleted: Vec<R::Key>,
}

impl<R: Record> Applied<R> {
    pub fn is_empty(&self) -> bool { self.added.is_empty() && self.updated.is_empty() && self.deleted.is_empty() }
}

pub struct Cache<R: Record> {
    snap: ArcSwap<CacheSnapshot<R>>,
    writer: Mutex<()>,
    epoch_tx: watch::Sender<u64>,
}

impl<R: Record> Default for Cache<R> {
    fn default() -> Self { Self::new() }
}

impl<R: Record> Cache<R> {
    pub fn new() -> Self {
        let (epoch_tx, _) = watch::channel(0u64);
        Self { snap: ArcSwap::from_pointee(CacheSnapshot::default()), writer: Mutex::new(()), epoch_tx }
    }

    pub fn get(&self, key: &R::Key) -> Option<R> { self.snap.load().items.get(key).cloned() }

    pub fn contains(&self, key: &R::Key) -> bool { self.snap.load().items.contains_key(key) }

    pub fn snapshot(&self) -> Arc<CacheSnapshot<R>> { self.snap.load_full() }

    pub fn len(&self) -> usize { self.snap.load().items.len() }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    pub fn epoch(&self) -> u64 { self.snap.load().epoch }

    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> { self.epoch_tx.subscribe() }

    /// Apply a change set. Every delta is merged before anything is
    /// published; a delta that does not fit the schema rejects the whole set.
    /// Updated deltas are merged onto the stored item (merge policy).
    pub(crate) fn apply(&self, cs: &ChangeSet<R>) -> Result<Applied<R>, CoreError> {
        let _writer = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let cur = self.snap.load_full();

        let mut updated = Vec::with_capacity(cs.updated.len());
        for (key, delta) in cs.updated.iter() {
            match cur.items.get(key) {
                Some(prev) => updated.push((key.clone(), prev.merged(delta)?, prev.clone())),
                None => warn!(kind = %R::KIND, key = ?key, "update for key not in cache; ignored"),
            }
        }

        let mut items = cur.items.clone();
        for item in cs.added.iter() {
            items.insert(item.key(), item.clone());
        }
        for (key, next, _) in updated.iter() {
            items.insert(key.clone(), next.clone());
        }
        for key in cs.deleted.iter() {
            items.remove(key);
        }

        let epoch = cur.epoch.saturating_add(1);
        self.snap.store(Arc::new(CacheSnapshot { epoch, items }));
        self.epoch_tx.send_replace(epoch);
        debug!(kind = %R::KIND, org_id = %cs.scope.org, epoch, "cache swapped");

        Ok(Applied {
            epoch,
            added: cs.added.clone(),
            updated: updated.into_iter().map(|(_, next, prev)| (next, prev)).collect(),
            deleted: cs.deleted.clone(),
        })
    }
}
