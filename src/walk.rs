//! Lazy directory walk shared by archive creation, tree copy and tree deletion.
//!
//! Links are never followed. Entries come out sorted by file name within each
//! directory, so archives built from the same tree are byte-for-byte stable.

use std::fs::Metadata;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::error::{IoContext, Result};
use crate::permissions::EntryKind;

/// One node seen during a walk.
#[derive(Debug)]
pub struct WalkEntry {
    /// Absolute (or root-joined) path of the node.
    pub path: PathBuf,
    /// Path relative to the walk root; empty for the root itself.
    pub relative: PathBuf,
    pub kind: EntryKind,
    /// Metadata of the node itself, not of a link target.
    pub metadata: Metadata,
    pub depth: usize,
}

impl WalkEntry {
    pub fn is_root(&self) -> bool {
        self.depth == 0
    }

    /// Relative path with forward slashes, as used for archive entry names.
    pub fn entry_name(&self) -> String {
        to_entry_name(&self.relative)
    }
}

/// Order in which directories are yielded relative to their contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkOrder {
    /// Directories before their contents.
    PreOrder,
    /// Contents before their directory.
    PostOrder,
}

/// Walks `root`, yielding `(path, kind, metadata)` for every node including the
/// root.
pub fn walk(root: &Path, order: WalkOrder) -> impl Iterator<Item = Result<WalkEntry>> {
    walk_to_depth(root, order, usize::MAX)
}

fn walk_to_depth(
    root: &Path,
    order: WalkOrder,
    max_depth: usize,
) -> impl Iterator<Item = Result<WalkEntry>> {
    let root = root.to_path_buf();
    WalkDir::new(&root)
        .follow_links(false)
        .max_depth(max_depth)
        .contents_first(order == WalkOrder::PostOrder)
        .sort_by_file_name()
        .into_iter()
        .map(move |entry| {
            let entry = entry?;
            let metadata = entry.path().symlink_metadata().at(entry.path())?;
            let file_type = metadata.file_type();
            let kind = if file_type.is_symlink() {
                EntryKind::Symlink
            } else if file_type.is_dir() {
                EntryKind::Directory
            } else {
                EntryKind::File
            };
            let relative = entry
                .path()
                .strip_prefix(&root)
                .map(Path::to_path_buf)
                .unwrap_or_default();
            Ok(WalkEntry {
                path: entry.path().to_path_buf(),
                relative,
                kind,
                metadata,
                depth: entry.depth(),
            })
        })
}

/// Direct children of `dir`, sorted by name. A missing directory yields nothing.
pub fn children(dir: &Path) -> Result<Vec<WalkEntry>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    walk_to_depth(dir, WalkOrder::PreOrder, 1)
        .filter(|e| !matches!(e, Ok(entry) if entry.is_root()))
        .collect()
}

/// Joins the components of `relative` with forward slashes.
pub fn to_entry_name(relative: &Path) -> String {
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Lexical path from directory `from` to `to`. Both paths should be absolute and
/// normalised; nothing is read from disk.
pub fn relative_path(from: &Path, to: &Path) -> PathBuf {
    let from: Vec<Component> = from.components().collect();
    let to: Vec<Component> = to.components().collect();
    let common = from.iter().zip(&to).take_while(|(a, b)| a == b).count();
    let mut out = PathBuf::new();
    for _ in common..from.len() {
        out.push("..");
    }
    for part in &to[common..] {
        out.push(part.as_os_str());
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}
