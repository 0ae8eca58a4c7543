//! Materialises archive entries below an extraction root.
//!
//! Every entry name is normalised and checked against the root before anything
//! touches the disk, and the deepest existing ancestor of every destination must
//! resolve inside the root, so links written by earlier entries cannot redirect
//! later ones. Directory metadata is applied once all entries are written,
//! so a read-only directory mode cannot block its own children and child writes
//! cannot clobber the restored directory mtime.

use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use super::{ArchiveEntry, EntryKind};
use crate::error::{IoContext, PackError, Result};
use crate::fsx as fs;
use crate::permissions::effective_mode;

pub(crate) struct EntrySink {
    root: PathBuf,
    canonical_root: PathBuf,
    deferred_dirs: Vec<(PathBuf, ArchiveEntry)>,
    written: usize,
}

impl EntrySink {
    pub fn new(root: &Path) -> Result<Self> {
        fs::create_dir_all(root).at(root)?;
        let canonical_root = fs::canonicalize(root).at(root)?;
        Ok(Self {
            root: root.to_path_buf(),
            canonical_root,
            deferred_dirs: Vec::new(),
            written: 0,
        })
    }

    /// Resolves an entry name to a path below the root, rejecting absolute names and
    /// names that climb out with `..`.
    pub fn resolve(&self, name: &str) -> Result<PathBuf> {
        let relative = normalize_entry_name(name).ok_or_else(|| PackError::PathEscape {
            entry: name.to_string(),
            target: self.root.clone(),
        })?;
        Ok(self.root.join(relative))
    }

    /// Writes one entry. `content` must be present for regular files only.
    pub fn materialize(&mut self, entry: ArchiveEntry, content: Option<&mut dyn Read>) -> Result<()> {
        let dest = self.resolve(&entry.name)?;
        match entry.kind {
            EntryKind::Directory => self.ensure_inside(&entry.name, &dest)?,
            _ => {
                if let Some(parent) = dest.parent() {
                    self.ensure_inside(&entry.name, parent)?;
                }
            }
        }
        match (entry.kind, content) {
            (EntryKind::Directory, _) => {
                fs::create_dir_all(&dest).at(&dest)?;
                if dest != self.root {
                    self.deferred_dirs.push((dest, entry));
                }
                return Ok(());
            }
            (EntryKind::File, Some(reader)) => self.write_file(&dest, &entry, reader)?,
            (EntryKind::File, None) => {
                return Err(PackError::format(
                    &self.root,
                    format!("file entry '{}' has no content", entry.name),
                ))
            }
            (EntryKind::Symlink, _) => self.write_symlink(&dest, &entry)?,
            (EntryKind::Hardlink, _) => self.write_hardlink(&dest, &entry)?,
        }
        apply_metadata(&dest, &entry)?;
        self.written += 1;
        Ok(())
    }

    /// Applies deferred directory metadata, deepest first, and returns the number of
    /// non-directory entries written.
    pub fn finish(mut self) -> Result<usize> {
        self.deferred_dirs
            .sort_by_key(|(path, _)| std::cmp::Reverse(path.components().count()));
        for (path, entry) in &self.deferred_dirs {
            apply_metadata(path, entry)?;
        }
        Ok(self.written)
    }

    /// Fails with [`PackError::PathEscape`] when the deepest existing ancestor of
    /// `path` resolves outside the root, e.g. through a symlink entry.
    fn ensure_inside(&self, name: &str, path: &Path) -> Result<()> {
        let mut existing = path;
        while fs::symlink_metadata(existing).is_err() {
            match existing.parent() {
                Some(parent) => existing = parent,
                None => return Ok(()),
            }
        }
        match fs::canonicalize(existing) {
            Ok(resolved) if resolved.starts_with(&self.canonical_root) => Ok(()),
            _ => Err(PackError::PathEscape {
                entry: name.to_string(),
                target: self.root.clone(),
            }),
        }
    }

    fn write_file(&self, dest: &Path, entry: &ArchiveEntry, reader: &mut dyn Read) -> Result<()> {
        if dest == self.root {
            return Err(PackError::format(&self.root, "file entry with an empty name"));
        }
        prepare_parent(dest)?;
        // last entry wins; never write through a link left by an earlier entry
        match fs::symlink_metadata(dest) {
            Ok(meta) if !meta.is_dir() => fs::remove_file(dest).at(dest)?,
            _ => {}
        }
        let mut out = fs::File::create(dest).at(dest)?;
        let copied = io::copy(reader, &mut out).at(dest)?;
        if entry.size != 0 && copied != entry.size {
            debug!(entry = %entry.name, expected = entry.size, copied, "entry size differs from header");
        }
        Ok(())
    }

    fn write_symlink(&self, dest: &Path, entry: &ArchiveEntry) -> Result<()> {
        let target = link_target(entry, &self.root)?;
        prepare_parent(dest)?;
        fs::remove_existing(dest).at(dest)?;
        fs::create_symlink(Path::new(target), dest).at(dest)
    }

    fn write_hardlink(&self, dest: &Path, entry: &ArchiveEntry) -> Result<()> {
        let target = link_target(entry, &self.root)?;
        let source = self.resolve(target)?;
        self.ensure_inside(target, &source)?;
        prepare_parent(dest)?;
        fs::remove_existing(dest).at(dest)?;
        fs::hard_link(&source, dest).at(&source)
    }
}

fn link_target<'a>(entry: &'a ArchiveEntry, root: &Path) -> Result<&'a str> {
    entry
        .link_target
        .as_deref()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| PackError::format(root, format!("link entry '{}' has no target", entry.name)))
}

fn prepare_parent(dest: &Path) -> Result<()> {
    match dest.parent() {
        Some(parent) => fs::create_dir_all(parent).at(parent),
        None => Ok(()),
    }
}

/// Applies mode and mtime to `path`. Links are left alone: attributes set through a
/// symlink land on its target, and a hard link shares its target's inode.
fn apply_metadata(path: &Path, entry: &ArchiveEntry) -> Result<()> {
    if matches!(entry.kind, EntryKind::Symlink | EntryKind::Hardlink) || fs::is_symlink(path) {
        return Ok(());
    }
    fs::set_unix_permissions(path, effective_mode(entry.mode, entry.kind)).at(path)?;
    if let Some(mtime) = entry.modified {
        if let Err(e) = fs::set_modified(path, mtime) {
            warn!(path = %path.display(), error = %e, "could not set modification time");
        }
    }
    Ok(())
}

/// Normalises an entry name to a relative path. Returns `None` for absolute names
/// (leading slash, backslash or drive letter) and names whose `..` components climb
/// above the root.
pub(crate) fn normalize_entry_name(name: &str) -> Option<PathBuf> {
    let unified = name.replace('\\', "/");
    if unified.starts_with('/') {
        return None;
    }
    let mut out = PathBuf::new();
    for (i, part) in unified.split('/').enumerate() {
        match part {
            "" | "." => {}
            ".." => {
                if !out.pop() {
                    return None;
                }
            }
            p if i == 0 && is_drive_prefix(p) => return None,
            p => out.push(p),
        }
    }
    Some(out)
}

fn is_drive_prefix(part: &str) -> bool {
    let bytes = part.as_bytes();
    bytes.len() == 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':'
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn file_entry(name: &str) -> ArchiveEntry {
        ArchiveEntry {
            name: name.to_string(),
            kind: EntryKind::File,
            size: 0,
            modified: None,
            mode: 0,
            link_target: None,
        }
    }

    #[test]
    fn normalizes_harmless_names() {
        assert_eq!(normalize_entry_name("a/b/c.txt"), Some(PathBuf::from("a/b/c.txt")));
        assert_eq!(normalize_entry_name("./a//b/"), Some(PathBuf::from("a/b")));
        assert_eq!(normalize_entry_name("a/../b"), Some(PathBuf::from("b")));
        assert_eq!(normalize_entry_name("a\\b"), Some(PathBuf::from("a/b")));
        assert_eq!(normalize_entry_name("./"), Some(PathBuf::new()));
    }

    #[test]
    fn rejects_escaping_names() {
        assert_eq!(normalize_entry_name("../../etc/passwd"), None);
        assert_eq!(normalize_entry_name("a/../../b"), None);
        assert_eq!(normalize_entry_name("/etc/passwd"), None);
        assert_eq!(normalize_entry_name("\\windows\\system32"), None);
        assert_eq!(normalize_entry_name("C:/windows"), None);
    }

    #[test]
    fn escape_fails_before_writing() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        let mut sink = EntrySink::new(&root).unwrap();
        let err = sink
            .materialize(file_entry("../outside.txt"), Some(&mut &b"x"[..]))
            .unwrap_err();
        assert!(matches!(err, PackError::PathEscape { .. }));
        assert!(!dir.path().join("outside.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn writes_through_escaping_symlink_are_rejected() {
        let dir = tempdir().unwrap();
        let root = dir.path().join("root");
        let outside = dir.path().join("outside");
        std::fs::create_dir_all(&outside).unwrap();
        let mut sink = EntrySink::new(&root).unwrap();

        let mut link = file_entry("link");
        link.kind = EntryKind::Symlink;
        link.link_target = Some(outside.to_string_lossy().into_owned());
        sink.materialize(link, None).unwrap();

        let err = sink
            .materialize(file_entry("link/pwned.txt"), Some(&mut &b"x"[..]))
            .unwrap_err();
        assert!(matches!(err, PackError::PathEscape { .. }), "{err}");
        assert!(!outside.join("pwned.txt").exists());

        let mut hard = file_entry("hard");
        hard.kind = EntryKind::Hardlink;
        hard.link_target = Some("link/secret".into());
        std::fs::write(outside.join("secret"), b"s").unwrap();
        let err = sink.materialize(hard, None).unwrap_err();
        assert!(matches!(err, PackError::PathEscape { .. }), "{err}");
        assert!(!root.join("hard").exists());
    }

    #[cfg(unix)]
    #[test]
    fn symlinks_inside_the_root_can_be_written_through() {
        let dir = tempdir().unwrap();
        let mut sink = EntrySink::new(dir.path()).unwrap();
        let mut real = file_entry("real/");
        real.kind = EntryKind::Directory;
        sink.materialize(real, None).unwrap();
        let mut link = file_entry("alias");
        link.kind = EntryKind::Symlink;
        link.link_target = Some("real".into());
        sink.materialize(link, None).unwrap();
        sink.materialize(file_entry("alias/a.txt"), Some(&mut &b"a"[..])).unwrap();
        sink.finish().unwrap();
        assert_eq!(std::fs::read(dir.path().join("real/a.txt")).unwrap(), b"a");
    }

    #[test]
    fn later_duplicate_overwrites_earlier() {
        let dir = tempdir().unwrap();
        let mut sink = EntrySink::new(dir.path()).unwrap();
        sink.materialize(file_entry("dup.txt"), Some(&mut &b"first"[..])).unwrap();
        sink.materialize(file_entry("dup.txt"), Some(&mut &b"second"[..])).unwrap();
        assert_eq!(sink.finish().unwrap(), 2);
        assert_eq!(std::fs::read(dir.path().join("dup.txt")).unwrap(), b"second");
    }

    #[cfg(unix)]
    #[test]
    fn read_only_directory_mode_is_applied_last() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempdir().unwrap();
        let mut sink = EntrySink::new(dir.path()).unwrap();
        let mut ro = file_entry("ro/");
        ro.kind = EntryKind::Directory;
        ro.mode = 0o555;
        sink.materialize(ro, None).unwrap();
        sink.materialize(file_entry("ro/inside.txt"), Some(&mut &b"x"[..])).unwrap();
        sink.finish().unwrap();
        let mode = std::fs::metadata(dir.path().join("ro")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o555);
        std::fs::set_permissions(dir.path().join("ro"), std::fs::Permissions::from_mode(0o755)).unwrap();
    }
}
