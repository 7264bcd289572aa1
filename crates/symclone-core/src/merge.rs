//! Projecting a source tree onto a destination with symlinks
//!
//! Directories are materialized as real directories carrying the source
//! directory's metadata; files become absolute symlinks to the source file.
//! The merge is additive: nothing that exists only in the destination is
//! touched.

use std::path::{Path, PathBuf};

use symclone_fs::{EntryKind, FileSystem};
use tracing::{debug, trace};

use crate::{Error, Result};

/// Merge `source` into `destination`.
///
/// Creates `destination` when missing. Entries are processed top-down, so
/// every directory exists before its children are linked. A failure leaves
/// whatever was merged so far in place.
///
/// # Errors
///
/// - [`Error::Conflict`] when a real directory sits where a file link must go,
///   or a non-directory, non-symlink entry sits where a directory must go.
/// - [`Error::Fs`] for any failing filesystem call, with its path.
pub fn merge<F: FileSystem + ?Sized>(fs: &F, source: &Path, destination: &Path) -> Result<()> {
    let source = absolute(source)?;
    debug!(
        source = %source.display(),
        destination = %destination.display(),
        "Merging tree"
    );

    for entry in fs.walk(&source)? {
        let entry = entry?;
        let src_path = entry.under(&source);
        let dst_path = entry.under(destination);

        if entry.is_root() {
            if !fs.is_dir(destination)? {
                create_dir_from(fs, &src_path, destination)?;
            }
            continue;
        }

        match entry.kind {
            EntryKind::Directory => merge_directory(fs, &src_path, &dst_path)?,
            EntryKind::File => link_file(fs, &src_path, &dst_path)?,
        }
    }

    Ok(())
}

fn merge_directory<F: FileSystem + ?Sized>(fs: &F, src_path: &Path, dst_path: &Path) -> Result<()> {
    match fs.try_symlink_metadata(dst_path)? {
        Some(existing) if existing.is_dir() => Ok(()),
        Some(existing) if existing.is_symlink() => {
            trace!(path = %dst_path.display(), "Replacing symlink with directory");
            fs.remove_file(dst_path)?;
            create_dir_from(fs, src_path, dst_path)
        }
        Some(_) => Err(Error::Conflict {
            path: dst_path.to_path_buf(),
            expected: EntryKind::Directory,
        }),
        None => create_dir_from(fs, src_path, dst_path),
    }
}

fn link_file<F: FileSystem + ?Sized>(fs: &F, src_path: &Path, dst_path: &Path) -> Result<()> {
    match fs.try_symlink_metadata(dst_path)? {
        Some(existing) if existing.is_dir() => {
            return Err(Error::Conflict {
                path: dst_path.to_path_buf(),
                expected: EntryKind::File,
            });
        }
        Some(_) => fs.remove_file(dst_path)?,
        None => {}
    }
    trace!(
        link = %dst_path.display(),
        target = %src_path.display(),
        "Linking file"
    );
    fs.symlink(src_path, dst_path)?;
    Ok(())
}

/// `mkdir` followed by a copy of the source directory's own metadata.
fn create_dir_from<F: FileSystem + ?Sized>(fs: &F, src_path: &Path, dst_path: &Path) -> Result<()> {
    trace!(path = %dst_path.display(), "Creating directory");
    fs.create_dir(dst_path)?;
    fs.copy_metadata(src_path, dst_path)?;
    Ok(())
}

/// Make `path` absolute against the working directory without resolving
/// symlinks.
pub(crate) fn absolute(path: &Path) -> Result<PathBuf> {
    std::path::absolute(path).map_err(|e| symclone_fs::Error::io(path, e).into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use symclone_fs::MemoryFs;

    fn p(path: &str) -> PathBuf {
        PathBuf::from(path)
    }

    fn source_tree() -> MemoryFs {
        let fs = MemoryFs::new();
        fs.create_dir_all(&p("/src/dir1")).unwrap();
        fs.create_dir_all(&p("/src/dir2")).unwrap();
        fs.write_file(&p("/src/dir1/file1.txt"), "one").unwrap();
        fs.write_file(&p("/src/dir1/file2.txt"), "two").unwrap();
        fs
    }

    #[test]
    fn merge_creates_destination_root_with_source_metadata() {
        let fs = source_tree();
        fs.set_mode(&p("/src"), 0o750).unwrap();

        merge(&fs, &p("/src"), &p("/dst")).unwrap();

        let root = fs.symlink_metadata(&p("/dst")).unwrap();
        assert!(root.is_dir());
        assert_eq!(root.mode, 0o750);
    }

    #[test]
    fn merge_links_files_and_creates_directories() {
        let fs = source_tree();

        merge(&fs, &p("/src"), &p("/dst")).unwrap();

        assert!(fs.symlink_metadata(&p("/dst/dir1")).unwrap().is_dir());
        assert!(fs.symlink_metadata(&p("/dst/dir2")).unwrap().is_dir());
        assert_eq!(
            fs.read_link(&p("/dst/dir1/file1.txt")).unwrap(),
            p("/src/dir1/file1.txt")
        );
        assert_eq!(
            fs.read_link(&p("/dst/dir1/file2.txt")).unwrap(),
            p("/src/dir1/file2.txt")
        );
    }

    #[test]
    fn existing_directory_metadata_is_left_alone() {
        let fs = source_tree();
        fs.create_dir_all(&p("/dst/dir1")).unwrap();
        fs.set_mode(&p("/dst/dir1"), 0o700).unwrap();

        merge(&fs, &p("/src"), &p("/dst")).unwrap();

        assert_eq!(fs.symlink_metadata(&p("/dst/dir1")).unwrap().mode, 0o700);
    }

    #[test]
    fn dangling_symlink_at_file_path_is_replaced() {
        let fs = source_tree();
        fs.create_dir_all(&p("/dst/dir1")).unwrap();
        fs.symlink(&p("/gone"), &p("/dst/dir1/file1.txt")).unwrap();

        merge(&fs, &p("/src"), &p("/dst")).unwrap();

        assert_eq!(
            fs.read_link(&p("/dst/dir1/file1.txt")).unwrap(),
            p("/src/dir1/file1.txt")
        );
    }

    #[test]
    fn directory_at_file_path_is_a_conflict() {
        let fs = source_tree();
        fs.create_dir_all(&p("/dst/dir1/file1.txt")).unwrap();

        let err = merge(&fs, &p("/src"), &p("/dst")).unwrap_err();

        assert!(matches!(
            err,
            Error::Conflict { ref path, expected: EntryKind::File } if path == &p("/dst/dir1/file1.txt")
        ));
    }

    #[test]
    fn regular_file_at_directory_path_is_a_conflict() {
        let fs = source_tree();
        fs.create_dir_all(&p("/dst")).unwrap();
        fs.write_file(&p("/dst/dir2"), "in the way").unwrap();

        let err = merge(&fs, &p("/src"), &p("/dst")).unwrap_err();

        assert!(matches!(err, Error::Conflict { expected: EntryKind::Directory, .. }));
    }

    #[test]
    fn missing_destination_parent_fails_with_not_found() {
        let fs = source_tree();
        let err = merge(&fs, &p("/src"), &p("/missing/dst")).unwrap_err();
        assert!(err.is_not_found());
    }
}
