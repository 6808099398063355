//! The embedded key-value store (spec §1 lists this as an external
//! collaborator: "a byte-addressable map from fixed-size keys to
//! variable-size values with store / fetch / append / delete / open /
//! close"). This module is a minimal, self-contained engine satisfying
//! that contract so the crate is runnable end to end; it is not part of
//! the object under test in spec §8 and carries none of the block
//! addressing/inode logic.
//!
//! Layout on disk: the whole map is a single file, read in full on
//! `open` and rewritten in full on `close`/`sync`. This mirrors the
//! "one backing file holding a key-value store" contract in spec §6
//! without pulling in an external database crate.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use crate::key::Key;

/// Raw engine-level error. The adapter layer (`crate::kv`) wraps this
/// into `FsError::Storage`.
#[derive(Debug)]
pub struct StoreError(pub String);

impl std::fmt::Display for StoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for StoreError {}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        StoreError(e.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;

pub struct Store {
    path: PathBuf,
    map: HashMap<Key, Vec<u8>>,
    dirty: bool,
}

impl Store {
    /// Open the store, creating the backing file if it is absent.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Store> {
        let path = path.as_ref().to_path_buf();
        let map = if path.exists() {
            let mut file = File::open(&path)?;
            let mut bytes = Vec::new();
            file.read_to_end(&mut bytes)?;
            decode(&bytes)?
        } else {
            OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .open(&path)?;
            HashMap::new()
        };
        Ok(Store {
            path,
            map,
            dirty: false,
        })
    }

    pub fn store(&mut self, key: Key, value: Vec<u8>) -> StoreResult<()> {
        self.map.insert(key, value);
        self.dirty = true;
        Ok(())
    }

    pub fn fetch(&self, key: &Key) -> StoreResult<Option<Vec<u8>>> {
        Ok(self.map.get(key).cloned())
    }

    pub fn append(&mut self, key: Key, bytes: &[u8]) -> StoreResult<()> {
        self.map.entry(key).or_default().extend_from_slice(bytes);
        self.dirty = true;
        Ok(())
    }

    pub fn delete(&mut self, key: &Key) -> StoreResult<()> {
        self.map.remove(key);
        self.dirty = true;
        Ok(())
    }

    /// Persist the full map to the backing file.
    pub fn sync(&mut self) -> StoreResult<()> {
        if !self.dirty {
            return Ok(());
        }
        let bytes = encode(&self.map);
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&self.path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        self.dirty = false;
        Ok(())
    }

    /// Flush and release the backing file handle.
    pub fn close(mut self) -> StoreResult<()> {
        self.sync()
    }
}

/// Trivial length-prefixed framing: count, then (16-byte key, u64 len,
/// bytes) per entry. Deliberately not a general serialization
/// framework dependency — this file format is private to this engine.
fn encode(map: &HashMap<Key, Vec<u8>>) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + map.len() * 32);
    out.extend_from_slice(&(map.len() as u64).to_le_bytes());
    for (key, value) in map {
        out.extend_from_slice(key.as_bytes());
        out.extend_from_slice(&(value.len() as u64).to_le_bytes());
        out.extend_from_slice(value);
    }
    out
}

fn decode(bytes: &[u8]) -> StoreResult<HashMap<Key, Vec<u8>>> {
    let mut map = HashMap::new();
    if bytes.is_empty() {
        return Ok(map);
    }
    let mut pos = 0usize;
    let count = read_u64(bytes, &mut pos)?;
    for _ in 0..count {
        let key_bytes = read_slice(bytes, &mut pos, 16)?;
        let mut key_arr = [0u8; 16];
        key_arr.copy_from_slice(key_bytes);
        let key = Key::from_bytes(key_arr);
        let len = read_u64(bytes, &mut pos)? as usize;
        let value = read_slice(bytes, &mut pos, len)?.to_vec();
        map.insert(key, value);
    }
    Ok(map)
}

fn read_u64(bytes: &[u8], pos: &mut usize) -> StoreResult<u64> {
    let slice = read_slice(bytes, pos, 8)?;
    let mut buf = [0u8; 8];
    buf.copy_from_slice(slice);
    Ok(u64::from_le_bytes(buf))
}

fn read_slice<'a>(bytes: &'a [u8], pos: &mut usize, len: usize) -> StoreResult<&'a [u8]> {
    if *pos + len > bytes.len() {
        return Err(StoreError("corrupt store file: truncated".into()));
    }
    let slice = &bytes[*pos..*pos + len];
    *pos += len;
    Ok(slice)
}
