//! File Control Block and directory entry on-disk records (spec §3).
//!
//! Both records are packed manually into fixed-size byte buffers,
//! matching the teacher's own manual disk-record packing
//! (`Dinode`/`Dirent`, `InodeGuard::update`/`lock` in
//! `fs/ufs/inode.rs`) rather than leaning on a generic serialization
//! framework for records whose on-disk size is part of the contract.

use static_assertions::const_assert_eq;

use crate::error::{FsError, FsResult};
use crate::key::{Key, KEY_SIZE};

pub const DIRECT_BLOCKS: usize = 13;
pub const MAX_NAME_LEN: usize = 240;
pub const DIRENT_SIZE: usize = MAX_NAME_LEN + KEY_SIZE;

/// Type bits packed into `mode`, following the upper bits of a POSIX
/// mode word (same convention `songzhi-ext2-rs::sys::inode::TypePerm`
/// uses for `S_IFDIR`/`S_IFREG`).
pub const S_IFDIR: u32 = 0o040000;
pub const S_IFREG: u32 = 0o100000;
pub const S_IFMT: u32 = 0o170000;

pub const FCB_SIZE: usize = KEY_SIZE // data_key
    + 4 // uid
    + 4 // gid
    + 4 // mode
    + 8 // atime
    + 8 // mtime
    + 8 // ctime
    + 4 // nlink
    + 8 // size
    + DIRECT_BLOCKS * KEY_SIZE
    + KEY_SIZE // single_indirect
    + KEY_SIZE; // double_indirect

const_assert_eq!(FCB_SIZE, 304);
const_assert_eq!(DIRENT_SIZE, 256);

/// File control block: the fixed-size record representing one
/// filesystem object (spec §3).
#[derive(Clone, Copy, Debug)]
pub struct Fcb {
    pub data_key: Key,
    pub uid: u32,
    pub gid: u32,
    pub mode: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub nlink: u32,
    pub size: u64,
    pub direct: [Key; DIRECT_BLOCKS],
    pub single_indirect: Key,
    pub double_indirect: Key,
}

impl Fcb {
    pub fn is_dir(&self) -> bool {
        self.mode & S_IFMT == S_IFDIR
    }

    pub fn is_regular(&self) -> bool {
        self.mode & S_IFMT == S_IFREG
    }

    /// Count of 4096-byte blocks a regular file's current size spans.
    pub fn blocks_in_use(&self) -> usize {
        ceil_div(self.size as usize, crate::cache::BLOCK_SIZE)
    }

    pub fn to_bytes(&self) -> [u8; FCB_SIZE] {
        let mut out = [0u8; FCB_SIZE];
        let mut off = 0;
        put_key(&mut out, &mut off, &self.data_key);
        put_u32(&mut out, &mut off, self.uid);
        put_u32(&mut out, &mut off, self.gid);
        put_u32(&mut out, &mut off, self.mode);
        put_i64(&mut out, &mut off, self.atime);
        put_i64(&mut out, &mut off, self.mtime);
        put_i64(&mut out, &mut off, self.ctime);
        put_u32(&mut out, &mut off, self.nlink);
        put_u64(&mut out, &mut off, self.size);
        for key in &self.direct {
            put_key(&mut out, &mut off, key);
        }
        put_key(&mut out, &mut off, &self.single_indirect);
        put_key(&mut out, &mut off, &self.double_indirect);
        debug_assert_eq!(off, FCB_SIZE);
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> FsResult<Fcb> {
        if bytes.len() != FCB_SIZE {
            return Err(FsError::InvalidState(format!(
                "fcb record has {} bytes, expected {}",
                bytes.len(),
                FCB_SIZE
            )));
        }
        let mut off = 0;
        let data_key = get_key(bytes, &mut off);
        let uid = get_u32(bytes, &mut off);
        let gid = get_u32(bytes, &mut off);
        let mode = get_u32(bytes, &mut off);
        let atime = get_i64(bytes, &mut off);
        let mtime = get_i64(bytes, &mut off);
        let ctime = get_i64(bytes, &mut off);
        let nlink = get_u32(bytes, &mut off);
        let size = get_u64(bytes, &mut off);
        let mut direct = [Key::zero(); DIRECT_BLOCKS];
        for slot in &mut direct {
            *slot = get_key(bytes, &mut off);
        }
        let single_indirect = get_key(bytes, &mut off);
        let double_indirect = get_key(bytes, &mut off);
        debug_assert_eq!(off, FCB_SIZE);
        Ok(Fcb {
            data_key,
            uid,
            gid,
            mode,
            atime,
            mtime,
            ctime,
            nlink,
            size,
            direct,
            single_indirect,
            double_indirect,
        })
    }
}

/// Fixed 256-byte directory entry: 240 bytes of zero-padded filename
/// plus a 16-byte target key (spec §3).
#[derive(Clone, Debug)]
pub struct DirEntry {
    pub name: String,
    pub target: Key,
}

impl DirEntry {
    pub fn new(name: &str, target: Key) -> FsResult<DirEntry> {
        if name.len() >= MAX_NAME_LEN {
            return Err(FsError::NameTooLong);
        }
        Ok(DirEntry {
            name: name.to_string(),
            target,
        })
    }

    pub fn to_bytes(&self) -> [u8; DIRENT_SIZE] {
        let mut out = [0u8; DIRENT_SIZE];
        let name_bytes = self.name.as_bytes();
        out[..name_bytes.len()].copy_from_slice(name_bytes);
        out[MAX_NAME_LEN..].copy_from_slice(self.target.as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> DirEntry {
        debug_assert_eq!(bytes.len(), DIRENT_SIZE);
        let nul = bytes[..MAX_NAME_LEN]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_NAME_LEN);
        let name = String::from_utf8_lossy(&bytes[..nul]).into_owned();
        let mut target = [0u8; KEY_SIZE];
        target.copy_from_slice(&bytes[MAX_NAME_LEN..]);
        DirEntry {
            name,
            target: Key::from_bytes(target),
        }
    }
}

fn ceil_div(n: usize, d: usize) -> usize {
    (n + d - 1) / d
}

fn put_key(buf: &mut [u8], off: &mut usize, key: &Key) {
    buf[*off..*off + KEY_SIZE].copy_from_slice(key.as_bytes());
    *off += KEY_SIZE;
}

fn get_key(buf: &[u8], off: &mut usize) -> Key {
    let mut arr = [0u8; KEY_SIZE];
    arr.copy_from_slice(&buf[*off..*off + KEY_SIZE]);
    *off += KEY_SIZE;
    Key::from_bytes(arr)
}

fn put_u32(buf: &mut [u8], off: &mut usize, v: u32) {
    buf[*off..*off + 4].copy_from_slice(&v.to_le_bytes());
    *off += 4;
}

fn get_u32(buf: &[u8], off: &mut usize) -> u32 {
    let mut arr = [0u8; 4];
    arr.copy_from_slice(&buf[*off..*off + 4]);
    *off += 4;
    u32::from_le_bytes(arr)
}

fn put_u64(buf: &mut [u8], off: &mut usize, v: u64) {
    buf[*off..*off + 8].copy_from_slice(&v.to_le_bytes());
    *off += 8;
}

fn get_u64(buf: &[u8], off: &mut usize) -> u64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&buf[*off..*off + 8]);
    *off += 8;
    u64::from_le_bytes(arr)
}

fn put_i64(buf: &mut [u8], off: &mut usize, v: i64) {
    buf[*off..*off + 8].copy_from_slice(&v.to_le_bytes());
    *off += 8;
}

fn get_i64(buf: &[u8], off: &mut usize) -> i64 {
    let mut arr = [0u8; 8];
    arr.copy_from_slice(&buf[*off..*off + 8]);
    *off += 8;
    i64::from_le_bytes(arr)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Fcb {
        let mut direct = [Key::zero(); DIRECT_BLOCKS];
        direct[0] = Key::fresh();
        Fcb {
            data_key: Key::fresh(),
            uid: 1000,
            gid: 1000,
            mode: S_IFREG | 0o644,
            atime: 1,
            mtime: 2,
            ctime: 3,
            nlink: 1,
            size: 4096,
            direct,
            single_indirect: Key::zero(),
            double_indirect: Key::zero(),
        }
    }

    #[test]
    fn fcb_roundtrips() {
        let fcb = sample();
        let bytes = fcb.to_bytes();
        assert_eq!(bytes.len(), FCB_SIZE);
        let back = Fcb::from_bytes(&bytes).unwrap();
        assert_eq!(back.uid, fcb.uid);
        assert_eq!(back.size, fcb.size);
        assert_eq!(back.direct[0], fcb.direct[0]);
        assert!(back.is_regular());
    }

    #[test]
    fn dirent_roundtrips() {
        let entry = DirEntry::new("hello.txt", Key::fresh()).unwrap();
        let bytes = entry.to_bytes();
        assert_eq!(bytes.len(), DIRENT_SIZE);
        let back = DirEntry::from_bytes(&bytes);
        assert_eq!(back.name, "hello.txt");
        assert_eq!(back.target, entry.target);
    }

    #[test]
    fn overlong_name_rejected() {
        let name: String = std::iter::repeat('a').take(MAX_NAME_LEN).collect();
        assert!(DirEntry::new(&name, Key::fresh()).is_err());
    }
}
