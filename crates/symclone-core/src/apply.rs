//! Enforcing desired mode and ownership on a tree
//!
//! Symlinks are never touched, so the files they point at keep their own
//! metadata. Regular files never receive execute bits. Extended attributes
//! and ACLs are out of reach of this module.

use std::path::Path;

use symclone_fs::{EntryMetadata, FileSystem};
use tracing::trace;

use crate::{DesiredMetadata, Result};

/// Apply `desired` to `root` and every entry below it, skipping symlinks.
pub fn apply_metadata<F: FileSystem + ?Sized>(
    fs: &F,
    root: &Path,
    desired: &DesiredMetadata,
) -> Result<()> {
    for entry in fs.walk(root)? {
        let entry = entry?;
        if entry.is_symlink {
            continue;
        }
        let path = entry.under(root);
        let meta = fs.symlink_metadata(&path)?;
        apply_to_entry(fs, &path, &meta, desired)?;
    }
    Ok(())
}

/// Apply `desired` to the entries of `destination` that mirror an entry of
/// `source`, skipping symlinks. Destination-only content is left alone.
///
/// # Errors
///
/// Fails with a not-found error when a mirrored path does not exist.
pub fn apply_metadata_mirrored<F: FileSystem + ?Sized>(
    fs: &F,
    source: &Path,
    destination: &Path,
    desired: &DesiredMetadata,
) -> Result<()> {
    for entry in fs.walk(source)? {
        let entry = entry?;
        let path = entry.under(destination);
        let meta = fs.symlink_metadata(&path)?;
        if meta.is_symlink() {
            continue;
        }
        apply_to_entry(fs, &path, &meta, desired)?;
    }
    Ok(())
}

fn apply_to_entry<F: FileSystem + ?Sized>(
    fs: &F,
    path: &Path,
    meta: &EntryMetadata,
    desired: &DesiredMetadata,
) -> Result<()> {
    let uid = desired.uid.filter(|uid| *uid != meta.uid);
    let gid = desired.gid.filter(|gid| *gid != meta.gid);
    if uid.is_some() || gid.is_some() {
        trace!(path = %path.display(), ?uid, ?gid, "Changing ownership");
        fs.set_owner(path, uid, gid)?;
    }

    if let Some(bits) = desired.target_mode(meta) {
        // Re-read after chown, which may have cleared setuid/setgid
        let current = if uid.is_some() || gid.is_some() {
            fs.symlink_metadata(path)?.mode
        } else {
            meta.mode
        };
        if bits != current {
            trace!(path = %path.display(), mode = %format!("0{:03o}", bits), "Changing mode");
            fs.set_mode(path, bits)?;
        }
    }

    Ok(())
}
