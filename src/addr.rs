//! Block Addressing (spec §4.3): maps a logical block index within an
//! FCB to a 16-byte storage key through direct slots, a single-level
//! indirect block and a double-level indirect block, and allocates /
//! deallocates chain entries on growth and truncation.
//!
//! Generalizes the teacher's `bmap`/`bmap_internal`/`itrunc`
//! (`fs/ufs/inode.rs`), which only goes one level of indirection deep
//! with 12 direct slots, to the 13-direct + single + double scheme spec
//! §3 specifies.

use static_assertions::const_assert_eq;

use crate::cache::{Cache, BLOCK_SIZE};
use crate::error::{FsError, FsResult};
use crate::fcb::{Fcb, DIRECT_BLOCKS};
use crate::key::Key;
use crate::kv::Adapter;

/// Keys per indirect block: a 4096-byte block holding 256 contiguous
/// 16-byte keys.
pub const INDIRECT_ENTRIES: usize = BLOCK_SIZE / 16;
const_assert_eq!(INDIRECT_ENTRIES, 256);

const SINGLE_START: usize = DIRECT_BLOCKS;
const SINGLE_END: usize = SINGLE_START + INDIRECT_ENTRIES; // 269
const DOUBLE_START: usize = SINGLE_END;
const DOUBLE_END: usize = DOUBLE_START + INDIRECT_ENTRIES * INDIRECT_ENTRIES; // 65805

/// Largest logical block index this addressing scheme supports.
pub const MAX_BLOCK_INDEX: usize = DOUBLE_END;

enum Region {
    Direct(usize),
    Single(usize),
    /// (row, col) within the double-indirect table.
    Double(usize, usize),
}

fn region_of(i: usize) -> FsResult<Region> {
    if i < SINGLE_START {
        Ok(Region::Direct(i))
    } else if i < SINGLE_END {
        Ok(Region::Single(i - SINGLE_START))
    } else if i < DOUBLE_END {
        let j = i - DOUBLE_START;
        Ok(Region::Double(j / INDIRECT_ENTRIES, j % INDIRECT_ENTRIES))
    } else {
        Err(FsError::FileTooLarge)
    }
}

fn read_indirect_entry(
    cache: &mut Cache,
    adapter: &mut Adapter,
    table: &Key,
    slot: usize,
) -> FsResult<Key> {
    if table.is_zero() {
        return Ok(Key::zero());
    }
    let block = cache.read(adapter, table)?;
    Ok(key_at(&block, slot))
}

fn write_indirect_entry(
    cache: &mut Cache,
    adapter: &mut Adapter,
    table: &Key,
    slot: usize,
    value: Key,
) -> FsResult<()> {
    let mut block = cache.read(adapter, table)?;
    set_key_at(&mut block, slot, value);
    cache.write(adapter, *table, block)
}

fn key_at(block: &[u8], slot: usize) -> Key {
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&block[slot * 16..slot * 16 + 16]);
    Key::from_bytes(bytes)
}

fn set_key_at(block: &mut [u8], slot: usize, key: Key) {
    block[slot * 16..slot * 16 + 16].copy_from_slice(key.as_bytes());
}

/// Resolve logical block `i` to a storage key. Returns the zero key for
/// an unallocated slot.
pub fn resolve(fcb: &Fcb, cache: &mut Cache, adapter: &mut Adapter, i: usize) -> FsResult<Key> {
    match region_of(i)? {
        Region::Direct(slot) => Ok(fcb.direct[slot]),
        Region::Single(slot) => read_indirect_entry(cache, adapter, &fcb.single_indirect, slot),
        Region::Double(row, col) => {
            let row_table = read_indirect_entry(cache, adapter, &fcb.double_indirect, row)?;
            read_indirect_entry(cache, adapter, &row_table, col)
        }
    }
}

/// Allocate whatever chain entries are needed to make logical block `i`
/// addressable, including a freshly zeroed data block. Persists the
/// mutated indirect tables through the cache so later resolves observe
/// them, and updates `fcb`'s direct/indirect roots in place.
pub fn extend(fcb: &mut Fcb, cache: &mut Cache, adapter: &mut Adapter, i: usize) -> FsResult<Key> {
    let zero_block = || vec![0u8; BLOCK_SIZE];

    match region_of(i)? {
        Region::Direct(slot) => {
            if fcb.direct[slot].is_zero() {
                let key = Key::fresh();
                cache.write(adapter, key, zero_block())?;
                fcb.direct[slot] = key;
            }
            Ok(fcb.direct[slot])
        }
        Region::Single(slot) => {
            if fcb.single_indirect.is_zero() {
                let table = Key::fresh();
                cache.write(adapter, table, zero_block())?;
                fcb.single_indirect = table;
            }
            let existing = read_indirect_entry(cache, adapter, &fcb.single_indirect, slot)?;
            if existing.is_zero() {
                let key = Key::fresh();
                cache.write(adapter, key, zero_block())?;
                write_indirect_entry(cache, adapter, &fcb.single_indirect, slot, key)?;
                Ok(key)
            } else {
                Ok(existing)
            }
        }
        Region::Double(row, col) => {
            if fcb.double_indirect.is_zero() {
                let table = Key::fresh();
                cache.write(adapter, table, zero_block())?;
                fcb.double_indirect = table;
            }
            let mut row_table = read_indirect_entry(cache, adapter, &fcb.double_indirect, row)?;
            if row_table.is_zero() {
                row_table = Key::fresh();
                cache.write(adapter, row_table, zero_block())?;
                write_indirect_entry(cache, adapter, &fcb.double_indirect, row, row_table)?;
            }
            let existing = read_indirect_entry(cache, adapter, &row_table, col)?;
            if existing.is_zero() {
                let key = Key::fresh();
                cache.write(adapter, key, zero_block())?;
                write_indirect_entry(cache, adapter, &row_table, col, key)?;
                Ok(key)
            } else {
                Ok(existing)
            }
        }
    }
}

/// Release logical block `i`: deletes its data block and clears the
/// slot. When clearing the first slot of an indirect table, the table
/// itself is also deleted.
pub fn shrink(fcb: &mut Fcb, cache: &mut Cache, adapter: &mut Adapter, i: usize) -> FsResult<()> {
    match region_of(i)? {
        Region::Direct(slot) => {
            let key = fcb.direct[slot];
            if !key.is_zero() {
                cache.discard(&key);
                adapter.delete(&key)?;
                fcb.direct[slot] = Key::zero();
            }
            Ok(())
        }
        Region::Single(slot) => {
            if fcb.single_indirect.is_zero() {
                return Ok(());
            }
            let key = read_indirect_entry(cache, adapter, &fcb.single_indirect, slot)?;
            if !key.is_zero() {
                cache.discard(&key);
                adapter.delete(&key)?;
                write_indirect_entry(cache, adapter, &fcb.single_indirect, slot, Key::zero())?;
            }
            if slot == 0 {
                let table = fcb.single_indirect;
                cache.discard(&table);
                adapter.delete(&table)?;
                fcb.single_indirect = Key::zero();
            }
            Ok(())
        }
        Region::Double(row, col) => {
            if fcb.double_indirect.is_zero() {
                return Ok(());
            }
            let row_table = read_indirect_entry(cache, adapter, &fcb.double_indirect, row)?;
            if row_table.is_zero() {
                if row == 0 && col == 0 {
                    let table = fcb.double_indirect;
                    cache.discard(&table);
                    adapter.delete(&table)?;
                    fcb.double_indirect = Key::zero();
                }
                return Ok(());
            }
            let key = read_indirect_entry(cache, adapter, &row_table, col)?;
            if !key.is_zero() {
                cache.discard(&key);
                adapter.delete(&key)?;
                write_indirect_entry(cache, adapter, &row_table, col, Key::zero())?;
            }
            if col == 0 {
                cache.discard(&row_table);
                adapter.delete(&row_table)?;
                write_indirect_entry(cache, adapter, &fcb.double_indirect, row, Key::zero())?;
            }
            if row == 0 && col == 0 {
                let table = fcb.double_indirect;
                cache.discard(&table);
                adapter.delete(&table)?;
                fcb.double_indirect = Key::zero();
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use tempfile::tempdir;

    fn harness() -> (tempfile::TempDir, Cache, Adapter) {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("s.kv")).unwrap();
        (dir, Cache::new(), Adapter::new(store))
    }

    fn blank_fcb() -> Fcb {
        Fcb {
            data_key: Key::zero(),
            uid: 0,
            gid: 0,
            mode: 0,
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
    fn direct_block_roundtrip() {
        let (_dir, mut cache, mut adapter) = harness();
        let mut fcb = blank_fcb();
        let key = extend(&mut fcb, &mut cache, &mut adapter, 5).unwrap();
        assert_eq!(resolve(&fcb, &mut cache, &mut adapter, 5).unwrap(), key);
        assert!(resolve(&fcb, &mut cache, &mut adapter, 6).unwrap().is_zero());
    }

    #[test]
    fn single_indirect_allocation() {
        let (_dir, mut cache, mut adapter) = harness();
        let mut fcb = blank_fcb();
        let key = extend(&mut fcb, &mut cache, &mut adapter, 13).unwrap();
        assert!(!fcb.single_indirect.is_zero());
        assert_eq!(resolve(&fcb, &mut cache, &mut adapter, 13).unwrap(), key);
    }

    #[test]
    fn double_indirect_allocation() {
        let (_dir, mut cache, mut adapter) = harness();
        let mut fcb = blank_fcb();
        let key = extend(&mut fcb, &mut cache, &mut adapter, SINGLE_END).unwrap();
        assert!(!fcb.double_indirect.is_zero());
        assert_eq!(
            resolve(&fcb, &mut cache, &mut adapter, SINGLE_END).unwrap(),
            key
        );
    }

    #[test]
    fn shrink_frees_direct_block_and_clears_slot() {
        let (_dir, mut cache, mut adapter) = harness();
        let mut fcb = blank_fcb();
        extend(&mut fcb, &mut cache, &mut adapter, 0).unwrap();
        shrink(&mut fcb, &mut cache, &mut adapter, 0).unwrap();
        assert!(fcb.direct[0].is_zero());
    }

    #[test]
    fn shrink_frees_single_indirect_table_on_last_slot() {
        let (_dir, mut cache, mut adapter) = harness();
        let mut fcb = blank_fcb();
        extend(&mut fcb, &mut cache, &mut adapter, 13).unwrap();
        shrink(&mut fcb, &mut cache, &mut adapter, 13).unwrap();
        assert!(fcb.single_indirect.is_zero());
    }

    #[test]
    fn index_beyond_limit_is_file_too_large() {
        let (_dir, mut cache, mut adapter) = harness();
        let fcb = blank_fcb();
        let err = resolve(&fcb, &mut cache, &mut adapter, MAX_BLOCK_INDEX).unwrap_err();
        assert!(matches!(err, FsError::FileTooLarge));
    }
}
