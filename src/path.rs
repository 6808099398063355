//! Path resolution (spec §4.5): tokenizes an absolute, `/`-separated
//! path and walks it one directory lookup per component.
//!
//! Generalizes the teacher's `Path::skipelem` (`fs/path.rs`), which
//! peels one filename off a NUL-free byte slice and returns the
//! remainder, to owned `&str` components (no `cstr_core`/unsafe
//! slice-retyping needed once the path is just a `String`).

use crate::directory;
use crate::error::{FsError, FsResult};
use crate::fcb::Fcb;
use crate::key::Key;
use crate::kv::Adapter;

/// Split the next path component off the front of `path`, returning
/// `(name, rest)` with `rest` having no leading slashes. Returns `None`
/// once nothing but slashes remain.
pub fn split_first_component(path: &str) -> Option<(&str, &str)> {
    let trimmed = path.trim_start_matches('/');
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.find('/') {
        Some(slash) => Some((&trimmed[..slash], &trimmed[slash..])),
        None => Some((trimmed, "")),
    }
}

/// All non-empty components of an absolute path, in order.
pub fn components(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Split `path` into its parent directory path and final component
/// name, e.g. `"/a/b/c"` -> `("/a/b", "c")`. The root path `"/"` has no
/// parent and no name to split off.
pub fn split_parent(path: &str) -> FsResult<(String, String)> {
    let parts = components(path);
    let (name, rest) = parts.split_last().ok_or(FsError::NotFound)?;
    let parent = if rest.is_empty() {
        "/".to_string()
    } else {
        format!("/{}", rest.join("/"))
    };
    Ok((parent, (*name).to_string()))
}

/// Resolve an absolute path to the FCB it names and the key under which
/// that FCB is stored, walking one directory lookup per component
/// starting from `(root_key, root)`. A non-final component that does
/// not name a directory is `FsError::NotADirectory`; a missing
/// component at any point is `FsError::NotFound`.
pub fn resolve(
    adapter: &Adapter,
    load: impl Fn(&Adapter, &Key) -> FsResult<Fcb>,
    root_key: Key,
    root: &Fcb,
    path: &str,
) -> FsResult<(Key, Fcb)> {
    let mut current_key = root_key;
    let mut current = *root;
    let mut rest = path;
    while let Some((name, tail)) = split_first_component(rest) {
        if !current.is_dir() {
            return Err(FsError::NotADirectory);
        }
        let entry = directory::lookup(adapter, &current, name)?.ok_or(FsError::NotFound)?;
        current = load(adapter, &entry.target)?;
        current_key = entry.target;
        rest = tail;
    }
    Ok((current_key, current))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_components_ignoring_repeated_slashes() {
        assert_eq!(components("/a//bb/c"), vec!["a", "bb", "c"]);
        assert_eq!(components("/"), Vec::<&str>::new());
    }

    #[test]
    fn split_first_component_peels_one_name() {
        assert_eq!(split_first_component("a/bb/c"), Some(("a", "/bb/c")));
        assert_eq!(split_first_component("///a//bb"), Some(("a", "//bb")));
        assert_eq!(split_first_component("a"), Some(("a", "")));
        assert_eq!(split_first_component(""), None);
        assert_eq!(split_first_component("////"), None);
    }

    #[test]
    fn split_parent_ascends_one_level() {
        let (parent, name) = split_parent("/a/b/c").unwrap();
        assert_eq!(parent, "/a/b");
        assert_eq!(name, "c");

        let (parent, name) = split_parent("/file").unwrap();
        assert_eq!(parent, "/");
        assert_eq!(name, "file");
    }

    #[test]
    fn split_parent_of_root_is_not_found() {
        assert!(split_parent("/").is_err());
    }
}
