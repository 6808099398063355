//! Block Cache (spec §4.2): a write-through LRU over fixed-size block
//! payloads, keyed by 16-byte identifier.
//!
//! Modelled as two cooperating structures, per the design note in spec
//! §9: an arena of slots holding the bytes and the MRU/LRU order
//! (intrusive doubly-linked list realised as `prev`/`next` indices into
//! the arena, rather than raw pointers), and a separate `HashMap<Key,
//! usize>` giving O(1) expected lookup from key to slot index.

use std::collections::HashMap;

use crate::error::FsResult;
use crate::key::Key;
use crate::kv::Adapter;

pub const CAPACITY: usize = 30;
pub const BLOCK_SIZE: usize = 4096;

struct Slot {
    key: Key,
    data: Vec<u8>,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Write-through LRU cache over block-sized values. Operations keyed by
/// the zero key bypass the cache entirely (spec §4.2 "Bypass"), going
/// straight through the adapter so the root inode's reads and writes are
/// never subject to the eviction policy.
pub struct Cache {
    slots: Vec<Slot>,
    index: HashMap<Key, usize>,
    mru: Option<usize>,
    lru: Option<usize>,
    free: Vec<usize>,
}

impl Cache {
    pub fn new() -> Cache {
        Cache {
            slots: Vec::with_capacity(CAPACITY),
            index: HashMap::new(),
            mru: None,
            lru: None,
            free: Vec::new(),
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    /// Unlink a slot from the MRU/LRU list without touching the index or
    /// the arena slot storage.
    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);
        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.mru = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.lru = prev,
        }
        self.slots[idx].prev = None;
        self.slots[idx].next = None;
    }

    /// Push a slot onto the MRU end of the list.
    fn push_mru(&mut self, idx: usize) {
        self.slots[idx].prev = None;
        self.slots[idx].next = self.mru;
        if let Some(old_mru) = self.mru {
            self.slots[old_mru].prev = Some(idx);
        }
        self.mru = Some(idx);
        if self.lru.is_none() {
            self.lru = Some(idx);
        }
    }

    fn promote(&mut self, idx: usize) {
        if self.mru == Some(idx) {
            return;
        }
        self.unlink(idx);
        self.push_mru(idx);
    }

    /// Evict the LRU slot, writing it back through the adapter first.
    /// No-op if the cache is empty.
    fn evict_one(&mut self, adapter: &mut Adapter) -> FsResult<()> {
        let idx = match self.lru {
            Some(idx) => idx,
            None => return Ok(()),
        };
        self.unlink(idx);
        let key = self.slots[idx].key;
        let data = std::mem::take(&mut self.slots[idx].data);
        self.index.remove(&key);
        self.free.push(idx);
        adapter.put(key, data)
    }

    fn alloc_slot(&mut self, key: Key, data: Vec<u8>) -> usize {
        if let Some(idx) = self.free.pop() {
            self.slots[idx] = Slot {
                key,
                data,
                prev: None,
                next: None,
            };
            idx
        } else {
            self.slots.push(Slot {
                key,
                data,
                prev: None,
                next: None,
            });
            self.slots.len() - 1
        }
    }

    fn install(&mut self, adapter: &mut Adapter, key: Key, data: Vec<u8>) -> FsResult<usize> {
        if self.len() >= CAPACITY {
            self.evict_one(adapter)?;
        }
        let idx = self.alloc_slot(key, data);
        self.index.insert(key, idx);
        self.push_mru(idx);
        Ok(idx)
    }

    /// Cached read (spec §4.2): hit promotes to MRU and returns a copy;
    /// miss reads through the adapter, installs at MRU, evicting the LRU
    /// entry if the cache was full.
    pub fn read(&mut self, adapter: &mut Adapter, key: &Key) -> FsResult<Vec<u8>> {
        if key.is_zero() {
            return Ok(adapter.get(key)?.unwrap_or_else(|| vec![0u8; BLOCK_SIZE]));
        }
        if let Some(&idx) = self.index.get(key) {
            self.promote(idx);
            return Ok(self.slots[idx].data.clone());
        }
        let data = adapter.get(key)?.unwrap_or_else(|| vec![0u8; BLOCK_SIZE]);
        self.install(adapter, *key, data.clone())?;
        Ok(data)
    }

    /// Cached write (spec §4.2): overwrites the cached copy and defers
    /// the store write-back to eviction or flush.
    pub fn write(&mut self, adapter: &mut Adapter, key: Key, data: Vec<u8>) -> FsResult<()> {
        if key.is_zero() {
            return adapter.put(key, data);
        }
        if let Some(&idx) = self.index.get(&key) {
            self.slots[idx].data = data;
            self.promote(idx);
            return Ok(());
        }
        self.install(adapter, key, data)?;
        Ok(())
    }

    /// Write back every resident entry, in unspecified order. Entries
    /// remain resident afterwards.
    pub fn flush(&mut self, adapter: &mut Adapter) -> FsResult<()> {
        for (&key, &idx) in self.index.iter() {
            adapter.put(key, self.slots[idx].data.clone())?;
        }
        Ok(())
    }

    /// Drop a key from the cache without writing it back — used when a
    /// block is deleted so a stale copy can't resurface on a later
    /// eviction or flush.
    pub fn discard(&mut self, key: &Key) {
        if let Some(idx) = self.index.remove(key) {
            self.unlink(idx);
            self.free.push(idx);
        }
    }
}

impl Default for Cache {
    fn default() -> Self {
        Cache::new()
    }
}
