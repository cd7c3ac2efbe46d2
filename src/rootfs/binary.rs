//! Stage the command binary inside the assembled root

use crate::error::{Result, RunnerError};
use crate::logging::Logger;
use crate::rootfs::path::{remove_path, resolve_in_root};
use std::fs::{self, Permissions};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageOutcome {
    /// The image already provides an executable at the command path
    AlreadyPresent(PathBuf),
    /// The host binary was copied to this location inside the root
    Copied(PathBuf),
}

fn copy_error(context: &str, path: &Path, err: std::io::Error) -> RunnerError {
    RunnerError::Copy(format!("{} {}: {}", context, path.display(), err))
}

fn is_executable_file(path: &Path) -> bool {
    fs::metadata(path)
        .map(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Make `command` (an absolute host path) invocable at the same path inside `root`.
///
/// Nothing is copied when the layers already put an executable there, possibly
/// behind a symlink that resolves inside the root.
pub fn stage_binary(command: &Path, root: &Path, output: &Logger) -> Result<StageOutcome> {
    let relative = command.strip_prefix("/").map_err(|_| {
        RunnerError::Copy(format!(
            "Command must be an absolute path: {}",
            command.display()
        ))
    })?;
    if relative.file_name().is_none() {
        return Err(RunnerError::Copy(format!(
            "Command does not name a file: {}",
            command.display()
        )));
    }

    let resolved = resolve_in_root(root, relative, true)
        .map_err(|e| copy_error("Failed to resolve", command, e))?;
    if is_executable_file(&resolved) {
        output.detail(&format!(
            "{} provided by the image",
            command.display()
        ));
        return Ok(StageOutcome::AlreadyPresent(resolved));
    }

    let host_meta = fs::metadata(command).map_err(|e| copy_error("Cannot stat host binary", command, e))?;
    if !host_meta.is_file() {
        return Err(RunnerError::Copy(format!(
            "Host command is not a regular file: {}",
            command.display()
        )));
    }

    // Parents are resolved inside the root; the final component is replaced as-is.
    let parent = resolve_in_root(root, relative.parent().unwrap_or_else(|| Path::new("")), true)
        .map_err(|e| copy_error("Failed to resolve", command, e))?;
    let destination = match relative.file_name() {
        Some(name) => parent.join(name),
        None => parent.clone(),
    };

    fs::create_dir_all(&parent).map_err(|e| copy_error("Failed to create directory", &parent, e))?;
    if fs::symlink_metadata(&destination).is_ok_and(|meta| meta.is_dir()) {
        return Err(RunnerError::Copy(format!(
            "{} is a directory inside the root",
            command.display()
        )));
    }
    remove_path(&destination).map_err(|e| copy_error("Failed to replace", &destination, e))?;

    let copied = fs::copy(command, &destination)
        .map_err(|e| copy_error("Failed to copy binary to", &destination, e))?;
    fs::set_permissions(
        &destination,
        Permissions::from_mode(host_meta.permissions().mode() & 0o7777),
    )
    .map_err(|e| copy_error("Failed to set mode on", &destination, e))?;

    output.detail(&format!(
        "Copied {} into root ({})",
        command.display(),
        output.format_size(copied)
    ));
    Ok(StageOutcome::Copied(destination))
}
