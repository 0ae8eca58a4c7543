//! ZIP and JAR reading and writing on top of the `zip` crate.
//!
//! Unix modes travel in the upper word of the external attributes. A symlink is an
//! entry whose mode carries the `S_IFLNK` type bits and whose content is the link
//! target.

use std::fs::File;
use std::io::{self, Read, Seek, Write};
use std::path::Path;
use std::time::SystemTime;

use chrono::{Datelike, Local, NaiveDate, TimeZone, Timelike};
use tracing::{debug, warn};
use zip::result::ZipError;
use zip::write::FileOptions;
use zip::{CompressionMethod, DateTime, ZipArchive, ZipWriter};

use super::sink::EntrySink;
use super::{ArchiveEntry, EntryKind};
use crate::error::{IoContext, PackError, Result};
use crate::permissions::is_zip_symlink;

/// Extracts every entry through the central directory, in directory order. Later
/// entries with a repeated name overwrite earlier ones.
pub fn extract_zip<R: Read + Seek>(reader: R, sink: &mut EntrySink, source: &Path) -> Result<()> {
    let mut archive = ZipArchive::new(reader)
        .map_err(|e| PackError::format(source, e.to_string()))?;
    for index in 0..archive.len() {
        let mut file = match archive.by_index(index) {
            Ok(file) => file,
            Err(ZipError::UnsupportedArchive(reason)) => {
                warn!(archive = %source.display(), index, reason, "skipping unreadable entry");
                continue;
            }
            Err(e) => return Err(e.into()),
        };
        let mode = file.unix_mode().unwrap_or(0);
        let kind = if is_zip_symlink(mode) {
            EntryKind::Symlink
        } else if file.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        let mut entry = ArchiveEntry {
            name: file.name().to_string(),
            kind,
            size: file.size(),
            modified: from_zip_time(file.last_modified()),
            mode,
            link_target: None,
        };
        match kind {
            EntryKind::Symlink => {
                let mut target = String::new();
                file.read_to_string(&mut target).at(source)?;
                entry.link_target = Some(target);
                sink.materialize(entry, None)?;
            }
            EntryKind::File => sink.materialize(entry, Some(&mut file))?,
            _ => sink.materialize(entry, None)?,
        }
    }
    Ok(())
}

/// Streams local file headers front to back. Local headers carry no external
/// attributes, so modes come out as `0` and fall back to the kind defaults.
///
/// Returns `ZipError::UnsupportedArchive` for entries whose size is only known from
/// a trailing data descriptor; the caller re-reads those archives with
/// [`extract_zip`].
pub fn extract_jar_stream<R: Read>(mut reader: R, sink: &mut EntrySink, source: &Path) -> Result<()> {
    let mut count = 0usize;
    loop {
        let mut file = match zip::read::read_zipfile_from_stream(&mut reader) {
            Ok(Some(file)) => file,
            Ok(None) => break,
            Err(ZipError::UnsupportedArchive(reason)) => {
                return Err(PackError::Zip(ZipError::UnsupportedArchive(reason)))
            }
            Err(e) => return Err(PackError::format(source, e.to_string())),
        };
        let kind = if file.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        let entry = ArchiveEntry {
            name: file.name().to_string(),
            kind,
            size: file.size(),
            modified: from_zip_time(file.last_modified()),
            mode: file.unix_mode().unwrap_or(0),
            link_target: None,
        };
        match kind {
            EntryKind::File => sink.materialize(entry, Some(&mut file))?,
            _ => sink.materialize(entry, None)?,
        }
        count += 1;
    }
    debug!(archive = %source.display(), entries = count, "streamed jar");
    Ok(())
}

/// DOS timestamps are local wall-clock time without a zone.
fn from_zip_time(time: DateTime) -> Option<SystemTime> {
    let naive = NaiveDate::from_ymd_opt(
        i32::from(time.year()),
        u32::from(time.month()),
        u32::from(time.day()),
    )?
    .and_hms_opt(
        u32::from(time.hour()),
        u32::from(time.minute()),
        u32::from(time.second()),
    )?;
    let local = Local.from_local_datetime(&naive).earliest()?;
    Some(SystemTime::from(local))
}

/// Nearest representable DOS timestamp. Times outside 1980..=2107 clamp to the DOS
/// epoch.
fn to_zip_time(time: Option<SystemTime>) -> DateTime {
    let Some(time) = time else {
        return DateTime::default();
    };
    let local: chrono::DateTime<Local> = time.into();
    let Ok(year) = u16::try_from(local.year()) else {
        return DateTime::default();
    };
    DateTime::from_date_and_time(
        year,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .unwrap_or_default()
}

pub struct ZipEntryWriter<W: Write + Seek> {
    inner: ZipWriter<W>,
}

impl<W: Write + Seek> ZipEntryWriter<W> {
    pub fn new(writer: W) -> Self {
        Self {
            inner: ZipWriter::new(writer),
        }
    }

    fn options(mode: u32, mtime: Option<SystemTime>) -> FileOptions {
        FileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .unix_permissions(mode)
            .last_modified_time(to_zip_time(mtime))
    }

    pub fn directory(&mut self, name: &str, mode: u32, mtime: Option<SystemTime>) -> Result<()> {
        let options = Self::options(mode, mtime).compression_method(CompressionMethod::Stored);
        self.inner.add_directory(format!("{name}/"), options)?;
        Ok(())
    }

    pub fn file(&mut self, name: &str, source: &Path, mode: u32, mtime: Option<SystemTime>) -> Result<()> {
        let mut input = File::open(source).at(source)?;
        let len = input.metadata().at(source)?.len();
        let options = Self::options(mode, mtime).large_file(len >= u64::from(u32::MAX));
        self.inner.start_file(name, options)?;
        io::copy(&mut input, &mut self.inner).at(source)?;
        Ok(())
    }

    pub fn symlink(&mut self, name: &str, target: &str, mode: u32, mtime: Option<SystemTime>) -> Result<()> {
        let options = Self::options(mode, mtime).compression_method(CompressionMethod::Stored);
        self.inner.add_symlink(name, target, options)?;
        Ok(())
    }

    /// Writes the central directory and hands back the underlying writer.
    pub fn finish(mut self) -> Result<W> {
        Ok(self.inner.finish()?)
    }
}
