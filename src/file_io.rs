//! Regular-file I/O (spec §4.4): decomposes byte-range reads and writes
//! into whole-block operations dispatched through the block cache and
//! addressing layer, and implements resize (truncate/extend).
//!
//! Generalizes the teacher's `itrunc` (`fs/ufs/inode.rs`), which walks
//! an inode's block list releasing blocks down to a target size; this
//! version additionally threads reads and writes through the same
//! per-block indexing `addr::resolve`/`addr::extend` expose.

use crate::addr;
use crate::cache::{Cache, BLOCK_SIZE};
use crate::error::FsResult;
use crate::fcb::Fcb;
use crate::kv::Adapter;

/// Read up to `len` bytes starting at `offset`, clamped to the file's
/// current size. Reads past the end of file return fewer bytes than
/// requested (down to an empty vector), never an error.
pub fn read(
    fcb: &Fcb,
    cache: &mut Cache,
    adapter: &mut Adapter,
    offset: u64,
    len: usize,
) -> FsResult<Vec<u8>> {
    let size = fcb.size as usize;
    let offset = offset as usize;
    if offset >= size {
        return Ok(Vec::new());
    }
    let end = (offset + len).min(size);
    let mut out = Vec::with_capacity(end - offset);
    let mut pos = offset;
    while pos < end {
        let block_idx = pos / BLOCK_SIZE;
        let within = pos % BLOCK_SIZE;
        let chunk_len = (BLOCK_SIZE - within).min(end - pos);
        let key = addr::resolve(fcb, cache, adapter, block_idx)?;
        let block = cache.read(adapter, &key)?;
        out.extend_from_slice(&block[within..within + chunk_len]);
        pos += chunk_len;
    }
    Ok(out)
}

/// Write `data` at `offset`, allocating whatever blocks are needed and
/// growing `fcb.size` if the write extends past the current end. The
/// caller persists the mutated FCB record afterwards.
pub fn write(
    fcb: &mut Fcb,
    cache: &mut Cache,
    adapter: &mut Adapter,
    offset: u64,
    data: &[u8],
) -> FsResult<()> {
    let offset = offset as usize;
    let mut written = 0;
    while written < data.len() {
        let pos = offset + written;
        let block_idx = pos / BLOCK_SIZE;
        let within = pos % BLOCK_SIZE;
        let chunk_len = (BLOCK_SIZE - within).min(data.len() - written);
        let key = addr::extend(fcb, cache, adapter, block_idx)?;
        let mut block = cache.read(adapter, &key)?;
        block[within..within + chunk_len].copy_from_slice(&data[written..written + chunk_len]);
        cache.write(adapter, key, block)?;
        written += chunk_len;
    }
    let end = (offset + data.len()) as u64;
    if end > fcb.size {
        fcb.size = end;
    }
    Ok(())
}

/// Resize a regular file to `new_size`. Shrinking releases blocks from
/// the highest index down to the new boundary, in descending order, so
/// that an indirect table's first slot (and the table itself) is only
/// ever freed once every later slot in it is already gone. Growing
/// calls `addr::extend` on each newly needed index in ascending order
/// (spec §4.4), so every block index below `ceil(new_size/4096)`
/// resolves to a live, zero-filled key — never the bypassed zero key.
pub fn resize(fcb: &mut Fcb, cache: &mut Cache, adapter: &mut Adapter, new_size: u64) -> FsResult<()> {
    let old_blocks = fcb.blocks_in_use();
    let new_blocks = ceil_div(new_size as usize, BLOCK_SIZE);
    if new_blocks < old_blocks {
        for idx in (new_blocks..old_blocks).rev() {
            addr::shrink(fcb, cache, adapter, idx)?;
        }
    } else if new_blocks > old_blocks {
        for idx in old_blocks..new_blocks {
            addr::extend(fcb, cache, adapter, idx)?;
        }
    }
    fcb.size = new_size;
    Ok(())
}

fn ceil_div(n: usize, d: usize) -> usize {
    (n + d - 1) / d
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fcb::{DIRECT_BLOCKS, S_IFREG};
    use crate::key::Key;
    use crate::store::Store;
    use tempfile::tempdir;

    fn harness() -> (tempfile::TempDir, Cache, Adapter) {
        let dir = tempdir().unwrap();
        let store = Store::open(dir.path().join("s.kv")).unwrap();
        (dir, Cache::new(), Adapter::new(store))
    }

    fn file_fcb() -> Fcb {
        Fcb {
            data_key: Key::zero(),
            uid: 0,
            gid: 0,
            mode: S_IFREG | 0o644,
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
    fn write_then_read_roundtrips() {
        let (_dir, mut cache, mut adapter) = harness();
        let mut fcb = file_fcb();
        write(&mut fcb, &mut cache, &mut adapter, 0, b"hello world").unwrap();
        assert_eq!(fcb.size, 11);
        let back = read(&fcb, &mut cache, &mut adapter, 0, 11).unwrap();
        assert_eq!(back, b"hello world");
    }

    #[test]
    fn read_past_end_is_truncated() {
        let (_dir, mut cache, mut adapter) = harness();
        let mut fcb = file_fcb();
        write(&mut fcb, &mut cache, &mut adapter, 0, b"abc").unwrap();
        let back = read(&fcb, &mut cache, &mut adapter, 1, 100).unwrap();
        assert_eq!(back, b"bc");
        let empty = read(&fcb, &mut cache, &mut adapter, 50, 10).unwrap();
        assert!(empty.is_empty());
    }

    #[test]
    fn write_crossing_block_boundary_is_contiguous() {
        let (_dir, mut cache, mut adapter) = harness();
        let mut fcb = file_fcb();
        let data = vec![0xABu8; BLOCK_SIZE + 10];
        write(&mut fcb, &mut cache, &mut adapter, 0, &data).unwrap();
        assert_eq!(fcb.size, data.len() as u64);
        let back = read(&fcb, &mut cache, &mut adapter, 0, data.len()).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn resize_to_zero_frees_all_blocks() {
        let (_dir, mut cache, mut adapter) = harness();
        let mut fcb = file_fcb();
        write(&mut fcb, &mut cache, &mut adapter, 0, &vec![1u8; BLOCK_SIZE * 2]).unwrap();
        resize(&mut fcb, &mut cache, &mut adapter, 0).unwrap();
        assert_eq!(fcb.size, 0);
        assert!(fcb.direct[0].is_zero());
        assert!(fcb.direct[1].is_zero());
    }

    #[test]
    fn resize_grow_reads_back_as_zero() {
        let (_dir, mut cache, mut adapter) = harness();
        let mut fcb = file_fcb();
        write(&mut fcb, &mut cache, &mut adapter, 0, b"hi").unwrap();
        resize(&mut fcb, &mut cache, &mut adapter, 10).unwrap();
        assert_eq!(fcb.size, 10);
        let back = read(&fcb, &mut cache, &mut adapter, 0, 10).unwrap();
        assert_eq!(&back[0..2], b"hi");
        assert_eq!(&back[2..], &[0u8; 8]);
    }
}
