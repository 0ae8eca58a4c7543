//! # Archive engine
//!
//! Reads and writes ZIP, JAR and TAR containers while keeping POSIX permissions,
//! symbolic links, hard links and modification times intact.
//!
//! The container kind is sniffed once from the leading bytes (after peeling off an
//! optional gzip/bzip2/xz/zstd wrapper) and then matched exhaustively:
//!
//! * `Zip` is read through the random-access central directory, so duplicated or
//!   reordered entries resolve the same way every time.
//! * `Jar` and `Tar` are read as forward streams.
//! * `Generic` covers containers that are recognised but have no extractor.
//!
//! Creation always writes to a temporary file next to the destination and renames
//! it into place, so an interrupted run never leaves a truncated archive that
//! looks valid.

mod detect;
mod sink;
mod tar_codec;
mod zip_codec;

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::error::{IoContext, PackError, Result};
use crate::fsx as fs;
use crate::permissions::{effective_mode, DEFAULT_FILE_MODE, PERMISSION_MASK};
use crate::walk::{self, WalkOrder};

pub use crate::permissions::EntryKind;
pub use detect::Compression;

pub(crate) use sink::normalize_entry_name;
use sink::EntrySink;
use tar_codec::TarEntryWriter;
use zip_codec::ZipEntryWriter;

/// Container format of an archive, resolved once by sniffing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArchiveKind {
    Zip,
    Jar,
    Tar,
    /// Recognised by magic bytes, but there is no native extractor for it.
    Generic,
}

impl ArchiveKind {
    /// Kind implied by a file extension (`zip`, `jar`, `tar`), case-insensitive.
    pub fn from_extension(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "zip" => Some(ArchiveKind::Zip),
            "jar" => Some(ArchiveKind::Jar),
            "tar" => Some(ArchiveKind::Tar),
            _ => None,
        }
    }

    /// Sniffs the container kind of an uncompressed file.
    pub fn detect(path: &Path) -> Result<Option<Self>> {
        let mut file = File::open(path).at(path)?;
        let head = detect::read_head(&mut file, detect::HEAD_LEN).at(path)?;
        Ok(detect::sniff_container(&head))
    }
}

impl fmt::Display for ArchiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArchiveKind::Zip => "zip",
            ArchiveKind::Jar => "jar",
            ArchiveKind::Tar => "tar",
            ArchiveKind::Generic => "generic",
        };
        f.write_str(name)
    }
}

/// One container member, decoded from its format-specific header.
#[derive(Debug, Clone)]
pub struct ArchiveEntry {
    /// Relative, forward-slash separated name as stored in the archive.
    pub name: String,
    pub kind: EntryKind,
    pub size: u64,
    pub modified: Option<SystemTime>,
    /// Unix mode, `0` when the format did not record one.
    pub mode: u32,
    /// Link target for symlinks and hard links.
    pub link_target: Option<String>,
}

/// Extracts `archive_path` into `target_dir` and returns the number of non-directory
/// entries written.
///
/// Fails with [`PackError::PathEscape`] as soon as an entry would land outside
/// `target_dir`. Entries that cannot be decoded are logged and skipped.
pub fn extract(archive_path: &Path, target_dir: &Path) -> Result<usize> {
    let mut file = File::open(archive_path).at(archive_path)?;
    let head = detect::read_head(&mut file, detect::HEAD_LEN).at(archive_path)?;

    let written = match detect::sniff_compression(&head) {
        Some(compression) => {
            debug!(archive = %archive_path.display(), %compression, "decompressing input stream");
            let stream = Cursor::new(head).chain(file);
            let mut decoded = detect::decompress(compression, stream).at(archive_path)?;
            let inner = detect::read_head(&mut decoded, detect::HEAD_LEN).at(archive_path)?;
            let kind = resolve_kind(archive_path, &inner)?;
            let label = detect::generic_label(&inner);
            let reader = Cursor::new(inner).chain(decoded);
            match kind {
                ArchiveKind::Tar => {
                    let mut sink = EntrySink::new(target_dir)?;
                    tar_codec::extract(reader, &mut sink, archive_path)?;
                    sink.finish()?
                }
                ArchiveKind::Zip | ArchiveKind::Jar => {
                    return Err(PackError::UnsupportedFormat {
                        path: archive_path.to_path_buf(),
                        kind: format!("{kind} inside a {compression} stream"),
                    })
                }
                ArchiveKind::Generic => return Err(unsupported_generic(archive_path, label)),
            }
        }
        None => {
            debug!(archive = %archive_path.display(), "no compression wrapper");
            let kind = resolve_kind(archive_path, &head)?;
            file.seek(SeekFrom::Start(0)).at(archive_path)?;
            match kind {
                ArchiveKind::Zip => {
                    let mut sink = EntrySink::new(target_dir)?;
                    zip_codec::extract_zip(file, &mut sink, archive_path)?;
                    sink.finish()?
                }
                ArchiveKind::Jar => {
                    let mut sink = EntrySink::new(target_dir)?;
                    if detect::uses_data_descriptor(&head) {
                        debug!(
                            archive = %archive_path.display(),
                            "jar uses data descriptors, reading central directory"
                        );
                        zip_codec::extract_zip(file, &mut sink, archive_path)?;
                    } else {
                        extract_jar(file, &mut sink, archive_path)?;
                    }
                    sink.finish()?
                }
                ArchiveKind::Tar => {
                    let mut sink = EntrySink::new(target_dir)?;
                    tar_codec::extract(BufReader::new(file), &mut sink, archive_path)?;
                    sink.finish()?
                }
                ArchiveKind::Generic => {
                    return Err(unsupported_generic(archive_path, detect::generic_label(&head)))
                }
            }
        }
    };

    info!(
        archive = %archive_path.display(),
        target = %target_dir.display(),
        entries = written,
        "extracted archive"
    );
    Ok(written)
}

fn resolve_kind(archive_path: &Path, head: &[u8]) -> Result<ArchiveKind> {
    detect::sniff_container(head)
        .ok_or_else(|| PackError::format(archive_path, "unrecognised archive format"))
}

fn unsupported_generic(archive_path: &Path, label: Option<&str>) -> PackError {
    PackError::UnsupportedFormat {
        path: archive_path.to_path_buf(),
        kind: label.unwrap_or("unknown").to_string(),
    }
}

/// Streams a JAR. A later entry sized by a trailing data descriptor cannot be
/// streamed; the same file is then re-read through the central directory.
fn extract_jar(mut file: File, sink: &mut EntrySink, archive_path: &Path) -> Result<()> {
    match zip_codec::extract_jar_stream(BufReader::new(&mut file), sink, archive_path) {
        Err(PackError::Zip(zip::result::ZipError::UnsupportedArchive(reason))) => {
            debug!(archive = %archive_path.display(), reason, "falling back to random-access reader");
            file.seek(SeekFrom::Start(0)).at(archive_path)?;
            zip_codec::extract_zip(file, sink, archive_path)
        }
        other => other,
    }
}

/// Format-specific entry writer used by [`create`].
enum EntryWriter {
    Zip(ZipEntryWriter<File>),
    Tar(TarEntryWriter<File>),
}

impl EntryWriter {
    fn new(kind: ArchiveKind, file: File, archive_file: &Path) -> Result<Self> {
        match kind {
            ArchiveKind::Zip | ArchiveKind::Jar => Ok(EntryWriter::Zip(ZipEntryWriter::new(file))),
            ArchiveKind::Tar => Ok(EntryWriter::Tar(TarEntryWriter::new(file))),
            ArchiveKind::Generic => Err(PackError::UnsupportedFormat {
                path: archive_file.to_path_buf(),
                kind: "generic containers cannot be created".to_string(),
            }),
        }
    }

    fn directory(&mut self, name: &str, mode: u32, mtime: Option<SystemTime>) -> Result<()> {
        match self {
            EntryWriter::Zip(w) => w.directory(name, mode, mtime),
            EntryWriter::Tar(w) => w.directory(name, mode, mtime),
        }
    }

    fn file(&mut self, name: &str, source: &Path, mode: u32, mtime: Option<SystemTime>) -> Result<()> {
        match self {
            EntryWriter::Zip(w) => w.file(name, source, mode, mtime),
            EntryWriter::Tar(w) => w.file(name, source, mode, mtime),
        }
    }

    fn symlink(&mut self, name: &str, target: &str, mode: u32, mtime: Option<SystemTime>) -> Result<()> {
        match self {
            EntryWriter::Zip(w) => w.symlink(name, target, mode, mtime),
            EntryWriter::Tar(w) => w.symlink(name, target, mode, mtime),
        }
    }

    fn finish(self) -> Result<File> {
        match self {
            EntryWriter::Zip(w) => w.finish(),
            EntryWriter::Tar(w) => w.finish(),
        }
    }
}

/// Packs the contents of `source_dir` into `archive_file` and returns the number of
/// entries written. The root directory itself is not stored.
///
/// Entry names are relative to the canonicalised source root. Symbolic links are
/// stored as links, never followed; absolute link targets are rewritten relative
/// to the link's own directory so the archive stays relocatable.
///
/// The archive is assembled in a temporary file in the destination directory and
/// renamed over `archive_file` only after it has been finalised.
pub fn create(kind: ArchiveKind, source_dir: &Path, archive_file: &Path) -> Result<usize> {
    let root = fs::canonicalize(source_dir).at(source_dir)?;
    let parent = match archive_file.parent() {
        Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent).at(&parent)?;
    let previous_mode = fs::metadata(archive_file)
        .ok()
        .and_then(|m| fs::maybe_unix_mode(&m));

    let tmp = NamedTempFile::new_in(&parent).at(&parent)?;
    let tmp_canonical = fs::canonicalize(tmp.path()).ok();
    let file = tmp.reopen().at(tmp.path())?;
    let mut writer = EntryWriter::new(kind, file, archive_file)?;

    let mut count = 0usize;
    for entry in walk::walk(&root, WalkOrder::PreOrder) {
        let entry = entry?;
        if entry.is_root() || tmp_canonical.as_deref() == Some(entry.path.as_path()) {
            continue;
        }
        let name = entry.entry_name();
        let raw_mode = fs::maybe_unix_mode(&entry.metadata).unwrap_or(0) & PERMISSION_MASK;
        let mode = effective_mode(raw_mode, entry.kind);
        let mtime = entry.metadata.modified().ok();
        match entry.kind {
            EntryKind::Directory => writer.directory(&name, mode, mtime)?,
            EntryKind::Symlink => {
                let target = stored_link_target(&entry.path)?;
                writer.symlink(&name, &target, mode, mtime)?;
            }
            EntryKind::File if entry.metadata.is_file() => {
                writer.file(&name, &entry.path, mode, mtime)?
            }
            _ => {
                warn!(path = %entry.path.display(), "skipping special file");
                continue;
            }
        }
        count += 1;
    }

    let file = writer.finish()?;
    file.sync_all().at(tmp.path())?;
    drop(file);
    tmp.persist(archive_file)
        .map_err(|e| PackError::Io {
            source: e.error,
            path: archive_file.to_path_buf(),
        })?;
    fs::set_unix_permissions(archive_file, previous_mode.unwrap_or(DEFAULT_FILE_MODE))
        .at(archive_file)?;

    info!(
        archive = %archive_file.display(),
        %kind,
        entries = count,
        "created archive"
    );
    Ok(count)
}

/// Link target as stored in an archive: relative targets verbatim, absolute targets
/// re-expressed relative to the link's directory.
fn stored_link_target(link: &Path) -> Result<String> {
    let raw = fs::read_link(link).at(link)?;
    if raw.is_relative() {
        return Ok(walk::to_entry_name(&raw));
    }
    let resolved = fs::canonicalize(&raw).unwrap_or(raw);
    let base = link
        .parent()
        .map(|p| fs::canonicalize(p).unwrap_or_else(|_| p.to_path_buf()))
        .unwrap_or_default();
    Ok(walk::to_entry_name(&walk::relative_path(&base, &resolved)))
}
