//! Tree copy and deletion built on [`crate::walk`], plus the executable bit.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tracing::{debug, warn};

use crate::error::{IoContext, Result};
use crate::fsx as fs;
use crate::permissions::{EntryKind, PERMISSION_MASK};
use crate::walk::{self, WalkOrder};

/// Mirrors `src` into `dst` and returns the number of files and links copied.
///
/// Directories are created before their contents. Links are recreated as links:
/// relative targets verbatim, absolute targets inside `src` rewritten relative to
/// the link so they resolve inside the copy. Absolute targets outside `src` are kept
/// as they are. Directory modes and mtimes are applied once the copy is complete.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<usize> {
    let root = fs::canonicalize(src).at(src)?;
    fs::create_dir_all(dst).at(dst)?;
    let mut dirs: Vec<(PathBuf, Option<u32>, Option<SystemTime>)> = Vec::new();
    let mut copied = 0usize;

    for entry in walk::walk(&root, WalkOrder::PreOrder) {
        let entry = entry?;
        if entry.is_root() {
            continue;
        }
        let dest = dst.join(&entry.relative);
        match entry.kind {
            EntryKind::Directory => {
                fs::create_dir_all(&dest).at(&dest)?;
                dirs.push((
                    dest,
                    fs::maybe_unix_mode(&entry.metadata),
                    entry.metadata.modified().ok(),
                ));
            }
            EntryKind::Symlink => {
                let target = copied_link_target(&root, &entry.path)?;
                fs::remove_existing(&dest).at(&dest)?;
                fs::create_symlink(&target, &dest).at(&dest)?;
                copied += 1;
            }
            _ if entry.metadata.is_file() => {
                copy_file_with_attributes(&entry.path, &dest)?;
                copied += 1;
            }
            _ => warn!(path = %entry.path.display(), "skipping special file"),
        }
    }

    dirs.sort_by_key(|(path, _, _)| std::cmp::Reverse(path.components().count()));
    for (dir, mode, mtime) in dirs {
        if let Some(mode) = mode {
            fs::set_unix_permissions(&dir, mode & PERMISSION_MASK).at(&dir)?;
        }
        if let Some(mtime) = mtime {
            fs::set_modified(&dir, mtime).at(&dir)?;
        }
    }
    debug!(from = %src.display(), to = %dst.display(), copied, "copied tree");
    Ok(copied)
}

fn copied_link_target(root: &Path, link: &Path) -> Result<PathBuf> {
    let raw = fs::read_link(link).at(link)?;
    if raw.is_relative() {
        return Ok(raw);
    }
    let resolved = fs::canonicalize(&raw).unwrap_or_else(|_| raw.clone());
    match (resolved.starts_with(root), link.parent()) {
        (true, Some(parent)) => Ok(walk::relative_path(parent, &resolved)),
        _ => Ok(raw),
    }
}

/// Copies one file, keeping its permission bits and modification time. An existing
/// file or link at `dst` is replaced.
pub fn copy_file_with_attributes(src: &Path, dst: &Path) -> Result<()> {
    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent).at(parent)?;
    }
    if fs::is_symlink(dst) {
        fs::remove_file(dst).at(dst)?;
    }
    fs::copy(src, dst).at(src)?;
    let meta = fs::metadata(src).at(src)?;
    if let Some(mode) = fs::maybe_unix_mode(&meta) {
        fs::set_unix_permissions(dst, mode).at(dst)?;
    }
    if let Ok(mtime) = meta.modified() {
        fs::set_modified(dst, mtime).at(dst)?;
    }
    Ok(())
}

/// Deletes `path` and everything below it, contents before their directory. Links
/// are removed, never followed. A missing path is not an error.
pub fn delete_tree(path: &Path) -> Result<()> {
    let meta = match fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e).at(path),
    };
    if !meta.is_dir() {
        return fs::remove_file(path).at(path);
    }
    // read-only directories would refuse to give up their entries
    for entry in walk::walk(path, WalkOrder::PreOrder) {
        let entry = entry?;
        if entry.kind == EntryKind::Directory {
            if let Some(mode) = fs::maybe_unix_mode(&entry.metadata) {
                if mode & 0o200 == 0 {
                    fs::set_unix_permissions(&entry.path, mode | 0o700).at(&entry.path)?;
                }
            }
        }
    }
    for entry in walk::walk(path, WalkOrder::PostOrder) {
        let entry = entry?;
        match entry.kind {
            EntryKind::Directory => fs::remove_dir(&entry.path).at(&entry.path)?,
            _ => fs::remove_file(&entry.path).at(&entry.path)?,
        }
    }
    Ok(())
}

/// Sets the owner-execute bit. Failure is logged, not returned.
pub fn set_executable(path: &Path) {
    let result = fs::metadata(path).and_then(|meta| {
        let mode = fs::maybe_unix_mode(&meta).unwrap_or(0o644);
        fs::set_unix_permissions(path, mode | 0o100)
    });
    if let Err(e) = result {
        warn!(path = %path.display(), error = %e, "could not set executable flag");
    }
}
