//! Layer download and extraction onto the assembled root
//!
//! Layers are gzip-compressed tar archives applied in manifest order. Later
//! layers replace earlier entries at the same path, and OCI whiteout markers
//! delete entries contributed by earlier layers.

use crate::common::BlobSource;
use crate::error::{Result, RunnerError};
use crate::image::{DigestUtils, ImageReference, LayerDescriptor, Manifest, Verification};
use crate::logging::Logger;
use crate::rootfs::path::{entry_target, normalize_entry_path, remove_path, resolve_in_root};
use flate2::read::GzDecoder;
use std::collections::HashSet;
use std::fs::{self, OpenOptions, Permissions};
use std::io::{self, Read};
use std::os::unix::fs::{OpenOptionsExt, PermissionsExt, symlink};
use std::path::{Path, PathBuf};
use tar::{Archive, Entry, EntryType};

const WHITEOUT_PREFIX: &str = ".wh.";
const OPAQUE_WHITEOUT: &str = ".wh..wh.opq";

/// Counters for what a layer contributed to the root
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LayerStats {
    pub directories: u64,
    pub files: u64,
    pub symlinks: u64,
    pub hardlinks: u64,
    pub whiteouts: u64,
    pub skipped: u64,
    /// Uncompressed bytes written to regular files
    pub bytes: u64,
}

impl LayerStats {
    pub fn merge(&mut self, other: &LayerStats) {
        self.directories += other.directories;
        self.files += other.files;
        self.symlinks += other.symlinks;
        self.hardlinks += other.hardlinks;
        self.whiteouts += other.whiteouts;
        self.skipped += other.skipped;
        self.bytes += other.bytes;
    }

    pub fn entries(&self) -> u64 {
        self.directories + self.files + self.symlinks + self.hardlinks + self.whiteouts
    }
}

fn layer_error(context: &str, path: &Path, err: io::Error) -> RunnerError {
    RunnerError::Layer(format!("{} {}: {}", context, path.display(), err))
}

/// Decompress a gzip tar stream and unpack it onto `root`
pub fn unpack_layer<R: Read>(compressed: R, root: &Path, output: &Logger) -> Result<LayerStats> {
    let mut archive = Archive::new(GzDecoder::new(compressed));
    let mut stats = LayerStats::default();
    // Host paths this layer created, with their ancestors; whiteouts leave them alone
    let mut written = HashSet::new();

    let entries = archive
        .entries()
        .map_err(|e| RunnerError::Layer(format!("Failed to read layer archive: {}", e)))?;

    for entry in entries {
        let entry =
            entry.map_err(|e| RunnerError::Layer(format!("Failed to read archive entry: {}", e)))?;
        apply_entry(entry, root, output, &mut stats, &mut written)?;
    }

    Ok(stats)
}

fn apply_entry<R: Read>(
    mut entry: Entry<'_, R>,
    root: &Path,
    output: &Logger,
    stats: &mut LayerStats,
    written: &mut HashSet<PathBuf>,
) -> Result<()> {
    let raw_path = entry
        .path()
        .map_err(|e| RunnerError::Layer(format!("Invalid entry path: {}", e)))?
        .into_owned();

    let Some(relative) = normalize_entry_path(&raw_path) else {
        output.warning(&format!(
            "Skipping entry outside the root: {}",
            raw_path.display()
        ));
        stats.skipped += 1;
        return Ok(());
    };

    // "./" itself
    if relative.as_os_str().is_empty() {
        return Ok(());
    }

    let target = entry_target(root, &relative)
        .map_err(|e| layer_error("Failed to resolve", &relative, e))?;

    if let Some(name) = relative.file_name().and_then(|name| name.to_str()) {
        if let Some(whited_out) = name.strip_prefix(WHITEOUT_PREFIX) {
            let directory = target.parent().unwrap_or(root);
            if !directory.starts_with(root) {
                output.warning(&format!(
                    "Skipping whiteout outside the root: {}",
                    relative.display()
                ));
                stats.skipped += 1;
                return Ok(());
            }

            if name == OPAQUE_WHITEOUT {
                clear_directory(directory, written)
                    .map_err(|e| layer_error("Failed to apply opaque whiteout in", directory, e))?;
            } else {
                if !is_plain_name(whited_out) {
                    output.warning(&format!(
                        "Skipping malformed whiteout: {}",
                        relative.display()
                    ));
                    stats.skipped += 1;
                    return Ok(());
                }
                let victim = directory.join(whited_out);
                if written.contains(&victim) {
                    output.debug(&format!(
                        "Whiteout {} spares an entry from the same layer",
                        relative.display()
                    ));
                } else {
                    remove_path(&victim)
                        .map_err(|e| layer_error("Failed to apply whiteout for", &victim, e))?;
                }
            }
            output.trace(&format!("whiteout {}", relative.display()));
            stats.whiteouts += 1;
            return Ok(());
        }
    }

    let mode = entry
        .header()
        .mode()
        .map_err(|e| layer_error("Invalid mode for", &relative, e))?
        & 0o7777;
    let entry_type = entry.header().entry_type();

    match entry_type {
        EntryType::Directory => {
            let existing_dir = fs::symlink_metadata(&target)
                .map(|meta| meta.is_dir())
                .unwrap_or(false);
            if !existing_dir {
                remove_path(&target).map_err(|e| layer_error("Failed to replace", &target, e))?;
            }
            fs::create_dir_all(&target)
                .map_err(|e| layer_error("Failed to create directory", &target, e))?;
            fs::set_permissions(&target, Permissions::from_mode(mode))
                .map_err(|e| layer_error("Failed to set mode on", &target, e))?;
            stats.directories += 1;
        }
        EntryType::Regular | EntryType::Continuous => {
            prepare_target(&target)?;
            let mut file = OpenOptions::new()
                .write(true)
                .create(true)
                .truncate(true)
                .mode(mode)
                .open(&target)
                .map_err(|e| layer_error("Failed to create file", &target, e))?;
            let written = io::copy(&mut entry, &mut file)
                .map_err(|e| layer_error("Failed to write file", &target, e))?;
            // The open mode is filtered by the umask
            file.set_permissions(Permissions::from_mode(mode))
                .map_err(|e| layer_error("Failed to set mode on", &target, e))?;
            stats.files += 1;
            stats.bytes += written;
        }
        EntryType::Symlink => {
            let link_target = entry
                .link_name()
                .map_err(|e| layer_error("Invalid symlink target for", &relative, e))?
                .ok_or_else(|| {
                    RunnerError::Layer(format!("Symlink {} has no target", relative.display()))
                })?
                .into_owned();
            prepare_target(&target)?;
            symlink(&link_target, &target)
                .map_err(|e| layer_error("Failed to create symlink", &target, e))?;
            stats.symlinks += 1;
        }
        EntryType::Link => {
            let link_name = entry
                .link_name()
                .map_err(|e| layer_error("Invalid hard link target for", &relative, e))?
                .ok_or_else(|| {
                    RunnerError::Layer(format!("Hard link {} has no target", relative.display()))
                })?
                .into_owned();
            let Some(link_relative) = normalize_entry_path(&link_name) else {
                output.warning(&format!(
                    "Skipping hard link {} pointing outside the root",
                    relative.display()
                ));
                stats.skipped += 1;
                return Ok(());
            };
            let source = resolve_in_root(root, &link_relative, false)
                .map_err(|e| layer_error("Failed to resolve", &link_relative, e))?;
            prepare_target(&target)?;
            fs::hard_link(&source, &target)
                .map_err(|e| layer_error("Failed to create hard link", &target, e))?;
            stats.hardlinks += 1;
        }
        other => {
            output.debug(&format!(
                "Skipping {:?} entry {}",
                other,
                relative.display()
            ));
            stats.skipped += 1;
            return Ok(());
        }
    }

    mark_written(written, root, &target);
    Ok(())
}

/// A single path component that names a directory entry
fn is_plain_name(name: &str) -> bool {
    !name.is_empty() && name != "." && name != ".." && !name.contains('/')
}

fn mark_written(written: &mut HashSet<PathBuf>, root: &Path, target: &Path) {
    let mut current = Some(target);
    while let Some(path) = current {
        if path == root || !path.starts_with(root) || !written.insert(path.to_path_buf()) {
            break;
        }
        current = path.parent();
    }
}

/// Make room for a non-directory entry: parents exist, nothing occupies the path
fn prepare_target(target: &Path) -> Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| layer_error("Failed to create directory", parent, e))?;
    }
    remove_path(target).map_err(|e| layer_error("Failed to replace", target, e))
}

/// Remove what lower layers put in `directory`, keeping entries in `written`
fn clear_directory(directory: &Path, written: &HashSet<PathBuf>) -> io::Result<()> {
    let entries = match fs::read_dir(directory) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if !written.contains(&path) {
            remove_path(&path)?;
        } else if entry.file_type()?.is_dir() {
            clear_directory(&path, written)?;
        }
    }
    Ok(())
}

/// Fetches layer blobs and applies them to a root, one after another
pub struct LayerMaterializer<'a, S: BlobSource + ?Sized> {
    source: &'a S,
    output: Logger,
    verify_digests: bool,
}

impl<'a, S: BlobSource + ?Sized> LayerMaterializer<'a, S> {
    pub fn new(source: &'a S, output: Logger) -> Self {
        Self {
            source,
            output,
            verify_digests: false,
        }
    }

    pub fn with_digest_verification(mut self, verify: bool) -> Self {
        self.verify_digests = verify;
        self
    }

    /// Download one layer and unpack it onto `root`
    pub async fn materialize(
        &self,
        reference: &ImageReference,
        layer: &LayerDescriptor,
        root: &Path,
    ) -> Result<LayerStats> {
        let blob = self.source.fetch_blob(reference, &layer.digest).await?;

        if self.verify_digests {
            match DigestUtils::verify(&blob, &layer.digest)? {
                Verification::Verified => {
                    self.output
                        .detail(&format!("Digest verified for {}", layer.short_digest()));
                }
                Verification::Unsupported(algorithm) => {
                    self.output.warning(&format!(
                        "Cannot verify {} digest of layer {}",
                        algorithm, layer.digest
                    ));
                }
            }
        }

        unpack_layer(blob.as_slice(), root, &self.output)
    }

    /// Apply every manifest layer in order; the first failure aborts the rest
    pub async fn materialize_all(
        &self,
        reference: &ImageReference,
        manifest: &Manifest,
        root: &Path,
    ) -> Result<LayerStats> {
        let total = manifest.layers.len();
        let mut totals = LayerStats::default();

        for (index, layer) in manifest.layers.iter().enumerate() {
            self.output.step(&format!(
                "Layer {}/{}: {} ({})",
                index + 1,
                total,
                layer.short_digest(),
                self.output.format_size(layer.size)
            ));

            let stats = self.materialize(reference, layer, root).await?;
            self.output.detail(&format!(
                "{} entries, {} written, {} skipped",
                stats.entries(),
                self.output.format_size(stats.bytes),
                stats.skipped
            ));
            totals.merge(&stats);
        }

        Ok(totals)
    }
}
