//! TAR streaming extraction and GNU-header creation.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tar::{Archive, Builder, EntryType, Header};
use tracing::warn;

use super::sink::EntrySink;
use super::{ArchiveEntry, EntryKind};
use crate::error::{IoContext, PackError, Result};
use crate::fsx::unix_seconds;

/// Extracts a tar stream entry by entry. Hard links must refer to an entry that has
/// already been written. Device nodes and FIFOs are skipped.
pub fn extract<R: Read>(reader: R, sink: &mut EntrySink, source: &Path) -> Result<()> {
    let mut archive = Archive::new(reader);
    let entries = archive
        .entries()
        .map_err(|e| PackError::format(source, e.to_string()))?;
    for entry in entries {
        let mut entry = entry.map_err(|e| PackError::format(source, e.to_string()))?;
        let header = entry.header();
        let entry_type = header.entry_type();
        let kind = match entry_type {
            EntryType::Regular | EntryType::Continuous => EntryKind::File,
            EntryType::Directory => EntryKind::Directory,
            EntryType::Symlink => EntryKind::Symlink,
            EntryType::Link => EntryKind::Hardlink,
            other => {
                let name = String::from_utf8_lossy(&entry.path_bytes()).into_owned();
                warn!(archive = %source.display(), entry = %name, kind = ?other, "skipping unsupported tar entry");
                continue;
            }
        };
        let mode = header.mode().unwrap_or(0);
        let modified = header
            .mtime()
            .ok()
            .map(|secs| UNIX_EPOCH + Duration::from_secs(secs));
        let link_target = match kind {
            EntryKind::Symlink | EntryKind::Hardlink => entry
                .link_name_bytes()
                .map(|bytes| String::from_utf8_lossy(&bytes).into_owned()),
            _ => None,
        };
        let record = ArchiveEntry {
            name: String::from_utf8_lossy(&entry.path_bytes()).into_owned(),
            kind,
            size: entry.size(),
            modified,
            mode,
            link_target,
        };
        match kind {
            EntryKind::File => sink.materialize(record, Some(&mut entry))?,
            _ => sink.materialize(record, None)?,
        }
    }
    Ok(())
}

/// Writes GNU headers, which carry names and link targets of any length.
pub struct TarEntryWriter<W: Write> {
    inner: Builder<W>,
}

impl<W: Write> TarEntryWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: Builder::new(writer),
        }
    }

    fn header(entry_type: EntryType, mode: u32, mtime: Option<SystemTime>, size: u64) -> Header {
        let mut header = Header::new_gnu();
        header.set_entry_type(entry_type);
        header.set_mode(mode);
        header.set_mtime(mtime.map(unix_seconds).unwrap_or(0));
        header.set_size(size);
        header
    }

    pub fn directory(&mut self, name: &str, mode: u32, mtime: Option<SystemTime>) -> Result<()> {
        let mut header = Self::header(EntryType::Directory, mode, mtime, 0);
        let path = format!("{name}/");
        self.inner
            .append_data(&mut header, &path, io::empty())
            .at(Path::new(&path))
    }

    pub fn file(&mut self, name: &str, source: &Path, mode: u32, mtime: Option<SystemTime>) -> Result<()> {
        let input = File::open(source).at(source)?;
        let len = input.metadata().at(source)?.len();
        let mut header = Self::header(EntryType::Regular, mode, mtime, len);
        self.inner.append_data(&mut header, name, input).at(source)
    }

    pub fn symlink(&mut self, name: &str, target: &str, mode: u32, mtime: Option<SystemTime>) -> Result<()> {
        let mut header = Self::header(EntryType::Symlink, mode, mtime, 0);
        self.inner
            .append_link(&mut header, name, target)
            .at(Path::new(name))
    }

    /// Writes the two terminating zero blocks and hands back the underlying writer.
    pub fn finish(self) -> Result<W> {
        self.inner.into_inner().at(Path::new("<tar stream>"))
    }
}
