//! Cross-platform filesystem wrapper.
//!
//! Re-exports `std::fs` and adds the handful of attribute and link helpers the
//! archive engine needs. On Windows there is no POSIX attribute view: permission
//! calls are no-ops and reads report `None`, so callers fall back to the
//! per-kind default modes.

use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use filetime::FileTime;

pub use std::fs::*;

/// Set POSIX permission bits on Unix.
#[cfg(unix)]
pub fn set_unix_permissions(path: &Path, mode: u32) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode))
}

/// No-op on Windows: POSIX permission bits are not preserved.
#[cfg(not(unix))]
pub fn set_unix_permissions(_path: &Path, _mode: u32) -> io::Result<()> {
    Ok(())
}

/// Permission bits of `meta`, if the platform has them.
#[cfg(unix)]
pub fn maybe_unix_mode(meta: &Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(meta.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
pub fn maybe_unix_mode(_meta: &Metadata) -> Option<u32> {
    None
}

/// True if `path` itself is a symbolic link (the link is not followed).
pub fn is_symlink(path: &Path) -> bool {
    symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

/// Creates `link` pointing at `target`. The target is stored verbatim.
#[cfg(unix)]
pub fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
pub fn create_symlink(target: &Path, link: &Path) -> io::Result<()> {
    let resolved = link.parent().map(|p| p.join(target));
    match resolved {
        Some(p) if p.is_dir() => std::os::windows::fs::symlink_dir(target, link),
        _ => std::os::windows::fs::symlink_file(target, link),
    }
}

/// Removes whatever is at `path` (file, link or directory tree). Missing paths are
/// fine.
pub fn remove_existing(path: &Path) -> io::Result<()> {
    match symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => remove_dir_all(path),
        Ok(_) => remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Sets the modification time of `path` without following a trailing symlink.
pub fn set_modified(path: &Path, mtime: SystemTime) -> io::Result<()> {
    filetime::set_symlink_file_times(
        path,
        FileTime::from_system_time(SystemTime::now()),
        FileTime::from_system_time(mtime),
    )
}

/// Seconds since the Unix epoch, clamped at zero for pre-epoch times.
pub fn unix_seconds(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
