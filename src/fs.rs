//! Namespace operations and lifecycle (spec §4.4 "Create", §4.5, §4.6,
//! §6): ties the key-value adapter, block cache, addressing, FCB/
//! directory records and path resolution into the operations a
//! filesystem bridge dispatches into.
//!
//! `Filesystem` plays the role the teacher's `Itable`/`FileSystem`
//! pair plays in `fs/mod.rs`: a single owner of process-wide state
//! (key-value handle, cache, in-memory root FCB copy) threaded
//! explicitly through every operation rather than reached via globals,
//! per the design note in spec §9.

use std::path::Path as FsPath;
use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info};

use crate::cache::Cache;
use crate::directory;
use crate::error::{FsError, FsResult};
use crate::fcb::{Fcb, DIRECT_BLOCKS, S_IFDIR, S_IFREG};
use crate::file_io;
use crate::key::{Key, ZERO_KEY};
use crate::kv::Adapter;
use crate::path;
use crate::store::Store;

/// POSIX-flavoured metadata returned by `getattr`. `ino` is always 10
/// (spec §6): this core has no notion of small stable integer inode
/// numbers, only 16-byte keys, and the bridge layer is responsible for
/// mapping those keys to whatever inode numbers its protocol needs.
#[derive(Clone, Copy, Debug)]
pub struct Stat {
    pub ino: u64,
    pub mode: u32,
    pub uid: u32,
    pub gid: u32,
    pub size: u64,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub nlink: u32,
}

/// One entry of a `readdir` listing.
#[derive(Clone, Debug)]
pub struct DirEntryView {
    pub name: String,
    pub is_dir: bool,
}

fn now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn caller_ids() -> (u32, u32) {
    // SAFETY: geteuid/getegid take no arguments and cannot fail.
    unsafe { (libc::geteuid(), libc::getegid()) }
}

pub struct Filesystem {
    adapter: Adapter,
    cache: Cache,
    root: Fcb,
}

impl Filesystem {
    /// Open the backing store, seeding a fresh root FCB if the zero
    /// key is absent (spec §4.6). Aborts with `FsError::InvalidState`
    /// if a stored root FCB has the wrong record size — the caller is
    /// expected to log and exit non-zero rather than proceed.
    pub fn mount<P: AsRef<FsPath>>(path: P) -> FsResult<Filesystem> {
        let store = Store::open(path).map_err(|e| FsError::Storage(e.to_string()))?;
        let mut adapter = Adapter::new(store);
        let root = match adapter.get(&ZERO_KEY)? {
            Some(bytes) => {
                info!("root fcb found, resuming existing filesystem");
                Fcb::from_bytes(&bytes)?
            }
            None => {
                info!("no root fcb in store, seeding a fresh one");
                let (uid, gid) = caller_ids();
                let ts = now();
                let root = Fcb {
                    data_key: Key::fresh(),
                    uid,
                    gid,
                    mode: S_IFDIR | 0o755,
                    atime: ts,
                    mtime: ts,
                    ctime: ts,
                    nlink: 1,
                    size: 0,
                    direct: [Key::zero(); DIRECT_BLOCKS],
                    single_indirect: Key::zero(),
                    double_indirect: Key::zero(),
                };
                adapter.put(ZERO_KEY, root.to_bytes().to_vec())?;
                root
            }
        };
        Ok(Filesystem {
            adapter,
            cache: Cache::new(),
            root,
        })
    }

    /// Flush the cache and close the store. Consumes `self` so no
    /// further operations can be dispatched afterwards.
    pub fn shutdown(mut self) -> FsResult<()> {
        info!("shutting down: flushing cache and closing store");
        self.cache.flush(&mut self.adapter)?;
        self.adapter.flush()
    }

    fn load_fcb(&self, key: &Key) -> FsResult<Fcb> {
        if key.is_zero() {
            return Ok(self.root);
        }
        let bytes = self
            .adapter
            .get(key)?
            .ok_or_else(|| FsError::InvalidState(format!("missing fcb for {:?}", key)))?;
        Fcb::from_bytes(&bytes)
    }

    fn save_fcb(&mut self, key: Key, fcb: &Fcb) -> FsResult<()> {
        if key.is_zero() {
            self.root = *fcb;
        }
        self.adapter.put(key, fcb.to_bytes().to_vec())
    }

    /// Resolve `path` to `(storage_key, fcb)`, following one directory
    /// lookup per component from the root.
    fn resolve(&self, target: &str) -> FsResult<(Key, Fcb)> {
        path::resolve(
            &self.adapter,
            |adapter, key| {
                if key.is_zero() {
                    Ok(self.root)
                } else {
                    let bytes = adapter
                        .get(key)?
                        .ok_or_else(|| FsError::InvalidState(format!("missing fcb for {:?}", key)))?;
                    Fcb::from_bytes(&bytes)
                }
            },
            ZERO_KEY,
            &self.root,
            target,
        )
    }

    fn stat_of(fcb: &Fcb) -> Stat {
        Stat {
            ino: 10,
            mode: fcb.mode,
            uid: fcb.uid,
            gid: fcb.gid,
            size: fcb.size,
            atime: fcb.atime,
            mtime: fcb.mtime,
            ctime: fcb.ctime,
            nlink: fcb.nlink,
        }
    }

    pub fn getattr(&self, target: &str) -> FsResult<Stat> {
        let (_, fcb) = self.resolve(target)?;
        Ok(Self::stat_of(&fcb))
    }

    /// List a directory's children, synthetic `.`/`..` entries first,
    /// per spec §6.
    pub fn readdir(&self, target: &str) -> FsResult<Vec<DirEntryView>> {
        let (_, fcb) = self.resolve(target)?;
        if !fcb.is_dir() {
            return Err(FsError::NotADirectory);
        }
        let mut out = vec![
            DirEntryView {
                name: ".".to_string(),
                is_dir: true,
            },
            DirEntryView {
                name: "..".to_string(),
                is_dir: true,
            },
        ];
        for entry in directory::list(&self.adapter, &fcb)? {
            let child = self.load_fcb(&entry.target)?;
            out.push(DirEntryView {
                name: entry.name,
                is_dir: child.is_dir(),
            });
        }
        Ok(out)
    }

    /// No flag enforcement; only validates that the path resolves.
    pub fn open(&self, target: &str) -> FsResult<()> {
        self.resolve(target).map(|_| ())
    }

    pub fn read(&mut self, target: &str, offset: u64, len: usize) -> FsResult<Vec<u8>> {
        let (_, fcb) = self.resolve(target)?;
        file_io::read(&fcb, &mut self.cache, &mut self.adapter, offset, len)
    }

    pub fn write(&mut self, target: &str, offset: u64, data: &[u8]) -> FsResult<usize> {
        let (key, mut fcb) = self.resolve(target)?;
        file_io::write(&mut fcb, &mut self.cache, &mut self.adapter, offset, data)?;
        fcb.mtime = now();
        self.save_fcb(key, &fcb)?;
        Ok(data.len())
    }

    pub fn truncate(&mut self, target: &str, new_size: u64) -> FsResult<()> {
        let (key, mut fcb) = self.resolve(target)?;
        file_io::resize(&mut fcb, &mut self.cache, &mut self.adapter, new_size)?;
        fcb.mtime = now();
        self.save_fcb(key, &fcb)
    }

    pub fn utime(&mut self, target: &str, atime: i64, mtime: i64) -> FsResult<()> {
        let (key, mut fcb) = self.resolve(target)?;
        fcb.atime = atime;
        fcb.mtime = mtime;
        self.save_fcb(key, &fcb)
    }

    pub fn chmod(&mut self, target: &str, mode: u32) -> FsResult<()> {
        let (key, mut fcb) = self.resolve(target)?;
        let type_bits = fcb.mode & crate::fcb::S_IFMT;
        fcb.mode = type_bits | (mode & !crate::fcb::S_IFMT);
        fcb.ctime = now();
        self.save_fcb(key, &fcb)
    }

    pub fn chown(&mut self, target: &str, uid: u32, gid: u32) -> FsResult<()> {
        let (key, mut fcb) = self.resolve(target)?;
        fcb.uid = uid;
        fcb.gid = gid;
        fcb.ctime = now();
        self.save_fcb(key, &fcb)
    }

    fn create_entry(&mut self, target: &str, mode: u32, is_dir: bool) -> FsResult<Stat> {
        let (parent_path, name) = path::split_parent(target)?;
        let (parent_key, mut parent) = self.resolve(&parent_path)?;
        if !parent.is_dir() {
            return Err(FsError::NotADirectory);
        }
        let (uid, gid) = caller_ids();
        let ts = now();
        let type_bits = if is_dir { S_IFDIR } else { S_IFREG };
        let child = Fcb {
            data_key: Key::fresh(),
            uid,
            gid,
            mode: type_bits | (mode & !crate::fcb::S_IFMT),
            atime: ts,
            mtime: ts,
            ctime: ts,
            nlink: 1,
            size: 0,
            direct: [Key::zero(); DIRECT_BLOCKS],
            single_indirect: Key::zero(),
            double_indirect: Key::zero(),
        };
        let child_key = Key::fresh();
        directory::add(&mut self.adapter, &mut parent, &name, child_key)?;
        self.save_fcb(child_key, &child)?;
        self.save_fcb(parent_key, &parent)?;
        debug!("created {} (dir={})", target, is_dir);
        Ok(Self::stat_of(&child))
    }

    /// Parent must exist; creates a regular file (spec §6).
    pub fn create(&mut self, target: &str, mode: u32) -> FsResult<Stat> {
        self.create_entry(target, mode, false)
    }

    /// Parent must exist; creates a directory (spec §6).
    pub fn mkdir(&mut self, target: &str, mode: u32) -> FsResult<Stat> {
        self.create_entry(target, mode, true)
    }

    /// Removes `target`'s entry from its parent directory and releases
    /// what it owned: for a regular file, its block-addressing chain
    /// (equivalent to a resize to zero); for a directory, its payload
    /// key. The FCB record itself is then deleted. `nlink` is not
    /// consulted or decremented — by design this filesystem only ever
    /// has one name per object, and the source behaviour of never
    /// decrementing `nlink` on removal is kept as-is (spec §9) rather
    /// than silently patched.
    fn remove_entry(&mut self, target: &str) -> FsResult<()> {
        let (parent_path, name) = path::split_parent(target)?;
        let (parent_key, mut parent) = self.resolve(&parent_path)?;
        let removed = directory::remove(&mut self.adapter, &mut parent, &name)?;
        self.save_fcb(parent_key, &parent)?;

        let child = self.load_fcb(&removed.target)?;
        if child.is_dir() {
            // Only the directory's own payload is released; existing
            // children are not recursively freed (spec §9: flagged
            // orphan risk, kept rather than silently fixed).
            if !child.data_key.is_zero() {
                self.adapter.delete(&child.data_key)?;
            }
        } else {
            let mut child = child;
            file_io::resize(&mut child, &mut self.cache, &mut self.adapter, 0)?;
        }
        self.adapter.delete(&removed.target)
    }

    pub fn unlink(&mut self, target: &str) -> FsResult<()> {
        self.remove_entry(target)
    }

    /// Does not require the directory to be empty (spec §6, §9): any
    /// children it had become unreachable by name, their storage is
    /// not recursively freed. Identical to `unlink` in every other
    /// respect — neither checks the removed entry's type, matching the
    /// source behaviour this was distilled from.
    pub fn rmdir(&mut self, target: &str) -> FsResult<()> {
        self.remove_entry(target)
    }

    /// Flushes the block cache (spec §6).
    pub fn flush(&mut self, _target: &str) -> FsResult<()> {
        self.cache.flush(&mut self.adapter)
    }

    /// Intentionally a stub (spec §6): the source always returns
    /// "no such entry" from release, and that behaviour is kept as-is.
    pub fn release(&self, _target: &str) -> FsResult<()> {
        Err(FsError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn mounted() -> (tempfile::TempDir, Filesystem) {
        let dir = tempdir().unwrap();
        let fs = Filesystem::mount(dir.path().join("fs.kv")).unwrap();
        (dir, fs)
    }

    #[test]
    fn fresh_mount_seeds_root_directory() {
        let (_dir, fs) = mounted();
        let stat = fs.getattr("/").unwrap();
        assert_eq!(stat.ino, 10);
        assert_eq!(stat.mode & S_IFDIR, S_IFDIR);
    }

    #[test]
    fn mkdir_create_write_read_roundtrip() {
        let (_dir, mut fs) = mounted();
        fs.mkdir("/a", 0o755).unwrap();
        fs.create("/a/f", 0o644).unwrap();
        fs.write("/a/f", 0, b"hello").unwrap();
        let bytes = fs.read("/a/f", 0, 5).unwrap();
        assert_eq!(bytes, b"hello");
    }

    #[test]
    fn cross_block_write_read() {
        let (_dir, mut fs) = mounted();
        fs.create("/big", 0o644).unwrap();
        let data = vec![0x5Au8; 5000];
        fs.write("/big", 0, &data).unwrap();
        let back = fs.read("/big", 0, 5000).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn truncate_to_zero_then_read_is_empty() {
        let (_dir, mut fs) = mounted();
        fs.create("/f", 0o644).unwrap();
        fs.write("/f", 0, b"data").unwrap();
        fs.truncate("/f", 0).unwrap();
        let back = fs.read("/f", 0, 1).unwrap();
        assert!(back.is_empty());
    }

    #[test]
    fn truncate_grow_allocates_blocks_and_reads_back_as_zero() {
        let (_dir, mut fs) = mounted();
        fs.create("/f", 0o644).unwrap();
        fs.truncate("/f", 5000).unwrap();
        let back = fs.read("/f", 0, 5000).unwrap();
        assert_eq!(back.len(), 5000);
        assert!(back.iter().all(|&b| b == 0));
    }

    #[test]
    fn rmdir_of_nonempty_directory_orphans_child() {
        let (_dir, mut fs) = mounted();
        fs.mkdir("/a", 0o755).unwrap();
        fs.create("/a/f", 0o644).unwrap();
        fs.rmdir("/a").unwrap();
        assert!(matches!(
            fs.getattr("/a").unwrap_err(),
            FsError::NotFound
        ));
        assert!(matches!(
            fs.getattr("/a/f").unwrap_err(),
            FsError::NotFound
        ));
    }

    #[test]
    fn readdir_lists_created_children_with_dot_entries() {
        let (_dir, mut fs) = mounted();
        fs.mkdir("/d", 0o755).unwrap();
        fs.create("/d/one", 0o644).unwrap();
        fs.create("/d/two", 0o644).unwrap();
        let names: Vec<_> = fs.readdir("/d").unwrap().into_iter().map(|e| e.name).collect();
        assert!(names.contains(&".".to_string()));
        assert!(names.contains(&"..".to_string()));
        assert!(names.contains(&"one".to_string()));
        assert!(names.contains(&"two".to_string()));
    }

    #[test]
    fn unlink_removes_entry_and_frees_blocks() {
        let (_dir, mut fs) = mounted();
        fs.create("/f", 0o644).unwrap();
        fs.write("/f", 0, &vec![1u8; 5000]).unwrap();
        fs.unlink("/f").unwrap();
        assert!(matches!(fs.getattr("/f").unwrap_err(), FsError::NotFound));
    }

    #[test]
    fn single_indirect_boundary_roundtrip() {
        let (_dir, mut fs) = mounted();
        fs.create("/x", 0o644).unwrap();
        let data = vec![0x11u8; 270_000];
        fs.write("/x", 0, &data).unwrap();
        let back = fs.read("/x", 0, data.len()).unwrap();
        assert_eq!(back, data);
    }

    #[test]
    fn cache_churn_across_many_files_survives_flush_and_remount() {
        let dir = tempdir().unwrap();
        let store_path = dir.path().join("fs.kv");
        {
            let mut fs = Filesystem::mount(&store_path).unwrap();
            for i in 0..31 {
                let name = format!("/file{}", i);
                fs.create(&name, 0o644).unwrap();
                fs.write(&name, 0, format!("contents-{}", i).as_bytes()).unwrap();
            }
            fs.flush("/").unwrap();
            fs.shutdown().unwrap();
        }
        let fs = Filesystem::mount(&store_path).unwrap();
        for i in 0..31 {
            let name = format!("/file{}", i);
            let stat = fs.getattr(&name).unwrap();
            assert!(stat.size > 0);
        }
    }

    #[test]
    fn chmod_and_truncate_are_idempotent() {
        let (_dir, mut fs) = mounted();
        fs.create("/f", 0o644).unwrap();
        fs.chmod("/f", 0o600).unwrap();
        let after_first = fs.getattr("/f").unwrap();
        fs.chmod("/f", 0o600).unwrap();
        let after_second = fs.getattr("/f").unwrap();
        assert_eq!(after_first.mode, after_second.mode);

        fs.truncate("/f", 42).unwrap();
        let s1 = fs.getattr("/f").unwrap().size;
        fs.truncate("/f", 42).unwrap();
        let s2 = fs.getattr("/f").unwrap().size;
        assert_eq!(s1, s2);
    }
}
