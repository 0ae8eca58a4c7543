//! Magic-byte sniffing for compression wrappers and container formats.

use std::fmt;
use std::io::{self, BufReader, Read};

use super::ArchiveKind;

/// Bytes read up front for sniffing. Covers the tar header block and the first ZIP
/// local header including a reasonably long name and extra field.
pub const HEAD_LEN: usize = 1024;

const ZIP_LOCAL: &[u8] = b"PK\x03\x04";
const ZIP_EMPTY: &[u8] = b"PK\x05\x06";
const ZIP_SPANNED: &[u8] = b"PK\x07\x08";
const JAR_MAGIC: u16 = 0xCAFE;

const TAR_BLOCK: usize = 512;
const USTAR_OFFSET: usize = 257;

/// A compression wrapper around a container stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    Gzip,
    Bzip2,
    Xz,
    Zstd,
}

impl fmt::Display for Compression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Compression::Gzip => "gzip",
            Compression::Bzip2 => "bzip2",
            Compression::Xz => "xz",
            Compression::Zstd => "zstd",
        };
        f.write_str(name)
    }
}

pub fn sniff_compression(head: &[u8]) -> Option<Compression> {
    if head.starts_with(&[0x1f, 0x8b]) {
        Some(Compression::Gzip)
    } else if head.starts_with(b"BZh") {
        Some(Compression::Bzip2)
    } else if head.starts_with(&[0xfd, b'7', b'z', b'X', b'Z', 0x00]) {
        Some(Compression::Xz)
    } else if head.starts_with(&[0x28, 0xb5, 0x2f, 0xfd]) {
        Some(Compression::Zstd)
    } else {
        None
    }
}

/// Wraps `reader` in the decoder for `compression`.
pub fn decompress<'a, R: Read + 'a>(
    compression: Compression,
    reader: R,
) -> io::Result<Box<dyn Read + 'a>> {
    let reader = BufReader::new(reader);
    Ok(match compression {
        Compression::Gzip => Box::new(flate2::read::MultiGzDecoder::new(reader)),
        Compression::Bzip2 => Box::new(bzip2::read::MultiBzDecoder::new(reader)),
        Compression::Xz => Box::new(xz2::read::XzDecoder::new_multi_decoder(reader)),
        Compression::Zstd => Box::new(zstd::stream::read::Decoder::with_buffer(reader)?),
    })
}

pub fn sniff_container(head: &[u8]) -> Option<ArchiveKind> {
    if head.starts_with(ZIP_LOCAL) {
        return Some(if looks_like_jar(head) {
            ArchiveKind::Jar
        } else {
            ArchiveKind::Zip
        });
    }
    if head.starts_with(ZIP_EMPTY) || head.starts_with(ZIP_SPANNED) {
        return Some(ArchiveKind::Zip);
    }
    if is_tar_header(head) {
        return Some(ArchiveKind::Tar);
    }
    generic_label(head).map(|_| ArchiveKind::Generic)
}

/// Name of a recognised container that has no native extractor.
pub fn generic_label(head: &[u8]) -> Option<&'static str> {
    if head.starts_with(b"!<arch>\n") {
        Some("ar")
    } else if head.starts_with(b"070701") || head.starts_with(b"070702") || head.starts_with(b"070707")
    {
        Some("cpio")
    } else if head.starts_with(&[0xc7, 0x71]) || head.starts_with(&[0x71, 0xc7]) {
        Some("cpio (binary)")
    } else if head.starts_with(&[b'7', b'z', 0xbc, 0xaf, 0x27, 0x1c]) {
        Some("7z")
    } else {
        None
    }
}

/// A ZIP is treated as a JAR when its first entry is the manifest directory/file or
/// carries the `0xCAFE` extra-field marker the `jar` tool writes.
fn looks_like_jar(head: &[u8]) -> bool {
    if head.len() < 30 {
        return false;
    }
    let name_len = u16::from_le_bytes([head[26], head[27]]) as usize;
    let extra_len = u16::from_le_bytes([head[28], head[29]]) as usize;
    let name_end = 30 + name_len;
    let Some(name) = head.get(30..name_end) else {
        return false;
    };
    if name == b"META-INF/" || name == b"META-INF/MANIFEST.MF" {
        return true;
    }
    let extra = head.get(name_end..name_end + extra_len).unwrap_or(&[]);
    let mut offset = 0;
    while offset + 4 <= extra.len() {
        let id = u16::from_le_bytes([extra[offset], extra[offset + 1]]);
        let size = u16::from_le_bytes([extra[offset + 2], extra[offset + 3]]) as usize;
        if id == JAR_MAGIC {
            return true;
        }
        offset += 4 + size;
    }
    false
}

/// True when the first local header defers its sizes to a trailing data
/// descriptor (general-purpose flag bit 3), so the entry cannot be streamed.
pub fn uses_data_descriptor(head: &[u8]) -> bool {
    if !head.starts_with(ZIP_LOCAL) || head.len() < 8 {
        return false;
    }
    u16::from_le_bytes([head[6], head[7]]) & 0x0008 != 0
}

fn is_tar_header(head: &[u8]) -> bool {
    if head.len() >= USTAR_OFFSET + 5 && &head[USTAR_OFFSET..USTAR_OFFSET + 5] == b"ustar" {
        return true;
    }
    // pre-POSIX (v7) tar: no magic, only a verifiable checksum
    if head.len() < TAR_BLOCK || head[0] == 0 {
        return false;
    }
    let Some(stored) = parse_octal(&head[148..156]) else {
        return false;
    };
    let computed: u64 = head[..TAR_BLOCK]
        .iter()
        .enumerate()
        .map(|(i, b)| if (148..156).contains(&i) { u64::from(b' ') } else { u64::from(*b) })
        .sum();
    stored == computed
}

fn parse_octal(field: &[u8]) -> Option<u64> {
    let text = std::str::from_utf8(field).ok()?;
    let trimmed = text.trim_matches(|c: char| c == '\0' || c == ' ');
    if trimmed.is_empty() {
        return None;
    }
    u64::from_str_radix(trimmed, 8).ok()
}

/// Reads up to `len` bytes, stopping early only at end of stream.
pub fn read_head<R: Read + ?Sized>(reader: &mut R, len: usize) -> io::Result<Vec<u8>> {
    let mut head = Vec::with_capacity(len);
    reader.take(len as u64).read_to_end(&mut head)?;
    Ok(head)
}
