//! An in-memory block store.

use lassie_api::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

#[derive(Debug, Default)]
struct Inner {
    blocks: HashMap<Cid, Block>,
    size: u64,
    put_count: u64,
}

/// An in-memory block store.
///
/// Usable as the [RetrievalSink] of a request, and as the content a
/// [MemHost](crate::factories::MemHost) serves. Duplicate writes are
/// counted but stored once.
#[derive(Debug, Default)]
pub struct MemBlockStore(Mutex<Inner>);

impl MemBlockStore {
    /// Construct a new, empty store.
    pub fn create() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Store a block.
    pub fn insert(&self, block: Block) {
        let mut lock = self.0.lock().unwrap();
        lock.put_count += 1;
        let len = block.data.len() as u64;
        if lock.blocks.insert(block.cid.clone(), block).is_none() {
            lock.size += len;
        }
    }

    /// Store every block in `blocks`.
    pub fn extend(&self, blocks: impl IntoIterator<Item = Block>) {
        for block in blocks {
            self.insert(block);
        }
    }

    /// Get a block by cid.
    pub fn get(&self, cid: &Cid) -> Option<Block> {
        self.0.lock().unwrap().blocks.get(cid).cloned()
    }

    /// Returns true if the block is stored.
    pub fn contains(&self, cid: &Cid) -> bool {
        self.0.lock().unwrap().blocks.contains_key(cid)
    }

    /// Number of distinct blocks stored.
    pub fn len(&self) -> usize {
        self.0.lock().unwrap().blocks.len()
    }

    /// Returns true if no block is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Total bytes of the distinct blocks stored.
    pub fn size(&self) -> u64 {
        self.0.lock().unwrap().size
    }

    /// Number of writes, including duplicates.
    pub fn put_count(&self) -> u64 {
        self.0.lock().unwrap().put_count
    }
}

impl RetrievalSink for MemBlockStore {
    fn put_block(&self, block: Block) -> BoxFut<'_, LassieResult<()>> {
        self.insert(block);
        Box::pin(async move { Ok(()) })
    }
}
