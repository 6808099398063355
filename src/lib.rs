//! File system implementation. Layers, leaves first:
//!   + Store: a byte-addressable map from 16-byte keys to variable-size
//!     values (the embedded key-value engine).
//!   + Cache: a write-through LRU over fixed-size block payloads.
//!   + Addressing: direct / single-indirect / double-indirect block
//!     chains rooted at a file control block.
//!   + Fcb/Directory: on-disk inode records and packed directory entries.
//!   + Path: tokenising and resolving `/`-separated paths.
//!   + Fs: ties the above together into the path-based operations a
//!     bridge (e.g. a FUSE front end) dispatches into.
//!
//! This crate contains no bridge-specific code; `Filesystem` below is
//! usable standalone against a backing file and is what the test suite
//! exercises directly.

pub mod addr;
pub mod cache;
pub mod directory;
pub mod error;
pub mod fcb;
pub mod file_io;
pub mod fs;
pub mod fuse_bridge;
pub mod key;
pub mod kv;
pub mod path;
pub mod store;

pub use error::FsError;
pub use fs::{DirEntryView, Filesystem, Stat};
pub use fuse_bridge::FuseBridge;
pub use key::Key;
