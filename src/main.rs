//! Command-line entry point: mounts the filesystem at a given
//! directory via FUSE (spec §2, §6).
//!
//! Grounded on `path_tag_fs`'s `main()`: a builder-style `clap::Command`
//! for argument parsing, `env_logger::init()` for logging, and
//! `fuser::mount2` with a `Vec<MountOption>` assembled from the parsed
//! flags. Unlike `path_tag_fs`, this filesystem has a backing store to
//! close on the way out (spec §4.6), so the core is kept behind an
//! `Arc` shared with the bridge and recovered once `mount2` returns —
//! matching `shutdown_fs()` in `original_source/code/myfs.c`, called
//! after `fuse_main()` returns.

use std::sync::{Arc, Mutex};

use clap::{Arg, ArgAction, Command};
use fuser::MountOption;
use log::{error, info};

use kvfs::fuse_bridge::FuseBridge;
use kvfs::Filesystem;

fn main() {
    env_logger::init();

    let matches = Command::new("kvfs")
        .version(env!("CARGO_PKG_VERSION"))
        .author("kvfs")
        .arg(
            Arg::new("MOUNT_POINT")
                .required(true)
                .index(1)
                .help("directory to mount the filesystem at"),
        )
        .arg(
            Arg::new("store")
                .long("store")
                .required(true)
                .help("path to the backing key-value store file"),
        )
        .arg(
            Arg::new("auto_unmount")
                .long("auto_unmount")
                .action(ArgAction::SetTrue)
                .help("automatically unmount on process exit"),
        )
        .arg(
            Arg::new("allow-root")
                .long("allow-root")
                .action(ArgAction::SetTrue)
                .help("allow root to access the mount"),
        )
        .get_matches();

    let mountpoint = matches.get_one::<String>("MOUNT_POINT").unwrap();
    let store_path = matches.get_one::<String>("store").unwrap();

    let filesystem = match Filesystem::mount(store_path) {
        Ok(fs) => fs,
        Err(e) => {
            error!("failed to mount filesystem store {}: {}", store_path, e);
            std::process::exit(1);
        }
    };

    let mut options = vec![MountOption::RW, MountOption::FSName("kvfs".to_string())];
    if matches.get_flag("auto_unmount") {
        options.push(MountOption::AutoUnmount);
    }
    if matches.get_flag("allow-root") {
        options.push(MountOption::AllowRoot);
    }

    info!("mounting {} at {}", store_path, mountpoint);
    let core = Arc::new(Mutex::new(filesystem));
    let bridge = FuseBridge::new(Arc::clone(&core));
    let mount_result = fuser::mount2(bridge, mountpoint, &options);

    // `mount2` drops the bridge (and its `Arc` clone) once the session
    // ends, leaving `core` as the sole owner again.
    match Arc::try_unwrap(core) {
        Ok(mutex) => {
            let filesystem = mutex.into_inner().unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Err(e) = filesystem.shutdown() {
                error!("failed to shut down filesystem cleanly: {}", e);
                std::process::exit(1);
            }
        }
        Err(_) => {
            error!("fuse bridge outlived its session; filesystem was not shut down cleanly");
        }
    }

    if let Err(e) = mount_result {
        error!("fuse session ended with error: {}", e);
        std::process::exit(1);
    }
}
