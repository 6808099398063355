//! Directory mutation (spec §4.4): a directory's payload is a tightly
//! packed sequence of 256-byte entries stored under the owning FCB's
//! `data_key`. Mutations go straight through the adapter (append on
//! add, full read/rewrite on remove) rather than through the block
//! cache, per spec §4.4.
//!
//! Generalizes the teacher's `dirlink`/`dirlookup`
//! (`fs/ufs/inode.rs`), which reused the first free slot of a fixed
//! array; this design instead keeps the payload tightly packed and
//! compacts on removal (spec §4.4, §9), since growth here is an
//! append-only byte string rather than a fixed-size inode block.

use crate::error::{FsError, FsResult};
use crate::fcb::{DirEntry, Fcb, DIRENT_SIZE};
use crate::key::Key;
use crate::kv::Adapter;

/// Look up a directory entry by exact filename match.
pub fn lookup(adapter: &Adapter, fcb: &Fcb, name: &str) -> FsResult<Option<DirEntry>> {
    Ok(read_all(adapter, fcb)?.into_iter().find(|e| e.name == name))
}

/// List all entries, in on-disk order.
pub fn list(adapter: &Adapter, fcb: &Fcb) -> FsResult<Vec<DirEntry>> {
    read_all(adapter, fcb)
}

/// Append a new entry and bump the owning FCB's entry count. The
/// caller is responsible for persisting the mutated FCB afterwards.
pub fn add(adapter: &mut Adapter, fcb: &mut Fcb, name: &str, target: Key) -> FsResult<()> {
    if lookup(adapter, fcb, name)?.is_some() {
        return Err(FsError::AlreadyExists);
    }
    let entry = DirEntry::new(name, target)?;
    adapter.append(fcb.data_key, &entry.to_bytes())?;
    fcb.size += 1;
    Ok(())
}

/// Remove an entry by exact filename match: every later entry shifts
/// one slot forward (spec §4.4), the count decremented, and the
/// shortened array rewritten, or the payload key deleted entirely if
/// the directory becomes empty. Returns the removed entry so the
/// caller can release what it pointed at.
pub fn remove(adapter: &mut Adapter, fcb: &mut Fcb, name: &str) -> FsResult<DirEntry> {
    let mut entries = read_all(adapter, fcb)?;
    let pos = entries
        .iter()
        .position(|e| e.name == name)
        .ok_or(FsError::NotFound)?;
    let removed = entries.remove(pos);
    fcb.size = entries.len() as u64;

    if entries.is_empty() {
        adapter.delete(&fcb.data_key)?;
    } else {
        let mut bytes = Vec::with_capacity(entries.len() * DIRENT_SIZE);
        for entry in &entries {
            bytes.extend_from_slice(&entry.to_bytes());
        }
        adapter.put(fcb.data_key, bytes)?;
    }
    Ok(removed)
}

fn read_all(adapter: &Adapter, fcb: &Fcb) -> FsResult<Vec<DirEntry>> {
    if fcb.size == 0 {
        return Ok(Vec::new());
    }
    let bytes = adapter.get(&fcb.data_key)?.unwrap_or_default();
    let expected = fcb.size as usize * DIRENT_SIZE;
    if bytes.len() != expected {
        return Err(FsError::InvalidState(format!(
            "directory payload has {} bytes, expected {} for {} entries",
            bytes.len(),
            expected,
            fcb.size
        )));
    }
    Ok(bytes
        .chunks_exact(DIRENT_SIZE)
        .map(DirEntry::from_bytes)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fcb::{DIRECT_BLOCKS, S_IFDIR};
    use crate::store::Store;
    use tempfile::tempdir;

    fn harness() -> (tempfile::TempDir, Adapter) {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("s.kv")).unwrap();
        (dir, Adapter::new(store))
    }

    fn dir_fcb() -> Fcb {
        Fcb {
            data_key: Key::fresh(),
            uid: 0,
            gid: 0,
            mode: S_IFDIR | 0o755,
            atime: 0,
            mtime: 0,
            ctime: 0,
            nlink: 1,
            size: 0,
            direct: [Key::zero(); DIRECT_BLOCKS],
            single_indirect: Key::zero(),
            double_indirect: Key::zero(),
        }
    }

    #[test]
    fn add_then_lookup() {
        let (_dir, mut adapter) = harness();
        let mut fcb = dir_fcb();
        let target = Key::fresh();
        add(&mut adapter, &mut fcb, "a.txt", target).unwrap();
        assert_eq!(fcb.size, 1);
        let found = lookup(&adapter, &fcb, "a.txt").unwrap().unwrap();
        assert_eq!(found.target, target);
        assert!(lookup(&adapter, &fcb, "missing").unwrap().is_none());
    }

    #[test]
    fn duplicate_name_rejected() {
        let (_dir, mut adapter) = harness();
        let mut fcb = dir_fcb();
        add(&mut adapter, &mut fcb, "a.txt", Key::fresh()).unwrap();
        let err = add(&mut adapter, &mut fcb, "a.txt", Key::fresh()).unwrap_err();
        assert!(matches!(err, FsError::AlreadyExists));
    }

    #[test]
    fn remove_compacts_and_decrements() {
        let (_dir, mut adapter) = harness();
        let mut fcb = dir_fcb();
        add(&mut adapter, &mut fcb, "a", Key::fresh()).unwrap();
        add(&mut adapter, &mut fcb, "b", Key::fresh()).unwrap();
        add(&mut adapter, &mut fcb, "c", Key::fresh()).unwrap();
        remove(&mut adapter, &mut fcb, "a").unwrap();
        assert_eq!(fcb.size, 2);
        let names: Vec<_> = list(&adapter, &fcb).unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names.len(), 2);
        assert!(names.contains(&"b".to_string()));
        assert!(names.contains(&"c".to_string()));
        assert!(!names.contains(&"a".to_string()));
    }

    #[test]
    fn remove_preserves_order_of_later_entries() {
        let (_dir, mut adapter) = harness();
        let mut fcb = dir_fcb();
        add(&mut adapter, &mut fcb, "a", Key::fresh()).unwrap();
        add(&mut adapter, &mut fcb, "b", Key::fresh()).unwrap();
        add(&mut adapter, &mut fcb, "c", Key::fresh()).unwrap();
        add(&mut adapter, &mut fcb, "d", Key::fresh()).unwrap();
        remove(&mut adapter, &mut fcb, "b").unwrap();
        let names: Vec<_> = list(&adapter, &fcb).unwrap().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["a".to_string(), "c".to_string(), "d".to_string()]);
    }

    #[test]
    fn remove_last_entry_deletes_payload_key() {
        let (_dir, mut adapter) = harness();
        let mut fcb = dir_fcb();
        add(&mut adapter, &mut fcb, "only", Key::fresh()).unwrap();
        remove(&mut adapter, &mut fcb, "only").unwrap();
        assert_eq!(fcb.size, 0);
        assert!(adapter.get(&fcb.data_key).unwrap().is_none());
    }

    #[test]
    fn remove_missing_is_not_found() {
        let (_dir, mut adapter) = harness();
        let mut fcb = dir_fcb();
        let err = remove(&mut adapter, &mut fcb, "nope").unwrap_err();
        assert!(matches!(err, FsError::NotFound));
    }
}
