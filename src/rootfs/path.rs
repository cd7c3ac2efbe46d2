//! Path handling confined to an assembled root
//!
//! Layer contents can carry absolute symlinks (`/lib -> /usr/lib`) that are only
//! meaningful once the root is the process root. Every path we touch on the host
//! is resolved here so that such links are followed relative to the root instead
//! of the host filesystem.

use std::collections::VecDeque;
use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};

const MAX_SYMLINK_FOLLOWS: usize = 40;

enum Part {
    Parent,
    Name(OsString),
}

fn parts_of(path: &Path) -> VecDeque<Part> {
    path.components()
        .filter_map(|component| match component {
            Component::ParentDir => Some(Part::Parent),
            Component::Normal(name) => Some(Part::Name(name.to_os_string())),
            Component::RootDir | Component::CurDir | Component::Prefix(_) => None,
        })
        .collect()
}

/// Turn an archive entry name into a path relative to the root.
///
/// Leading `/` and `.` components are dropped. Returns `None` when the name
/// contains a `..` component.
pub fn normalize_entry_path(raw: &Path) -> Option<PathBuf> {
    let mut normalized = PathBuf::new();
    for component in raw.components() {
        match component {
            Component::Normal(name) => normalized.push(name),
            Component::ParentDir => return None,
            Component::RootDir | Component::CurDir | Component::Prefix(_) => {}
        }
    }
    Some(normalized)
}

/// Resolve `relative` beneath `root`, following symlinks as if `root` were `/`.
///
/// The final component is only followed when `follow_final` is set. `..` never
/// climbs above `root`.
pub fn resolve_in_root(root: &Path, relative: &Path, follow_final: bool) -> io::Result<PathBuf> {
    let mut resolved = PathBuf::new();
    let mut pending = parts_of(relative);
    let mut follows = 0;

    while let Some(part) = pending.pop_front() {
        let name = match part {
            Part::Parent => {
                resolved.pop();
                continue;
            }
            Part::Name(name) => name,
        };

        let candidate = resolved.join(&name);
        let is_final = pending.is_empty();
        let host_path = root.join(&candidate);

        let is_symlink = fs::symlink_metadata(&host_path)
            .map(|meta| meta.file_type().is_symlink())
            .unwrap_or(false);

        if is_symlink && (!is_final || follow_final) {
            follows += 1;
            if follows > MAX_SYMLINK_FOLLOWS {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("too many levels of symbolic links at {}", candidate.display()),
                ));
            }

            let target = fs::read_link(&host_path)?;
            if target.is_absolute() {
                resolved = PathBuf::new();
            }
            let mut expanded = parts_of(&target);
            expanded.extend(pending.drain(..));
            pending = expanded;
        } else {
            resolved = candidate;
        }
    }

    Ok(root.join(resolved))
}

/// Host location for an entry: parents resolved inside the root, last component untouched
pub fn entry_target(root: &Path, relative: &Path) -> io::Result<PathBuf> {
    let parent = relative.parent().unwrap_or_else(|| Path::new(""));
    let resolved_parent = resolve_in_root(root, parent, true)?;
    Ok(match relative.file_name() {
        Some(name) => resolved_parent.join(name),
        None => resolved_parent,
    })
}

/// Remove whatever lives at `path`; a missing path is not an error
pub fn remove_path(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}
