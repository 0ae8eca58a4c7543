//! POSIX permission bits and their numeric Unix mode.
//!
//! Archive formats disagree on how much of the mode they carry. ZIP entries written
//! by naive tools report `0`, so every reader falls back to [`default_mode`] for the
//! entry's kind when the permission bits are empty.

use std::fmt;

/// Kind of a filesystem node or archive member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    File,
    Directory,
    Symlink,
    Hardlink,
}

/// One of the nine POSIX permission bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PosixPermission {
    OwnerRead,
    OwnerWrite,
    OwnerExecute,
    GroupRead,
    GroupWrite,
    GroupExecute,
    OthersRead,
    OthersWrite,
    OthersExecute,
}

impl PosixPermission {
    pub const ALL: [PosixPermission; 9] = [
        PosixPermission::OwnerRead,
        PosixPermission::OwnerWrite,
        PosixPermission::OwnerExecute,
        PosixPermission::GroupRead,
        PosixPermission::GroupWrite,
        PosixPermission::GroupExecute,
        PosixPermission::OthersRead,
        PosixPermission::OthersWrite,
        PosixPermission::OthersExecute,
    ];

    /// Octal bit of this permission in a Unix mode.
    pub const fn bit(self) -> u32 {
        match self {
            PosixPermission::OwnerRead => 0o400,
            PosixPermission::OwnerWrite => 0o200,
            PosixPermission::OwnerExecute => 0o100,
            PosixPermission::GroupRead => 0o040,
            PosixPermission::GroupWrite => 0o020,
            PosixPermission::GroupExecute => 0o010,
            PosixPermission::OthersRead => 0o004,
            PosixPermission::OthersWrite => 0o002,
            PosixPermission::OthersExecute => 0o001,
        }
    }
}

/// Mask of the nine permission bits.
pub const PERMISSION_MASK: u32 = 0o777;
/// File-type bits of a Unix mode (`S_IFMT`).
pub const FILE_TYPE_MASK: u32 = 0o170000;
/// Symlink file type (`S_IFLNK`), stored in the upper word of a ZIP entry's
/// external attributes.
pub const ZIP_SYMLINK_FLAG: u32 = 0o120000;

pub const DEFAULT_FILE_MODE: u32 = 0o644;
pub const DEFAULT_DIR_MODE: u32 = 0o755;
pub const DEFAULT_SYMLINK_MODE: u32 = 0o777;

/// An unordered set of POSIX permission bits.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PermissionSet(u16);

impl PermissionSet {
    pub const fn empty() -> Self {
        PermissionSet(0)
    }

    pub fn contains(&self, perm: PosixPermission) -> bool {
        u32::from(self.0) & perm.bit() != 0
    }

    pub fn insert(&mut self, perm: PosixPermission) {
        self.0 |= perm.bit() as u16;
    }

    pub fn remove(&mut self, perm: PosixPermission) {
        self.0 &= !(perm.bit() as u16);
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = PosixPermission> + '_ {
        PosixPermission::ALL.into_iter().filter(|p| self.contains(*p))
    }
}

impl FromIterator<PosixPermission> for PermissionSet {
    fn from_iter<I: IntoIterator<Item = PosixPermission>>(iter: I) -> Self {
        let mut set = PermissionSet::empty();
        for perm in iter {
            set.insert(perm);
        }
        set
    }
}

impl fmt::Debug for PermissionSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PermissionSet({:03o})", self.0)
    }
}

/// Converts the permission bits of `mode` into a set. File-type and
/// setuid/setgid/sticky bits are ignored.
pub fn mode_to_permissions(mode: u32) -> PermissionSet {
    PosixPermission::ALL
        .into_iter()
        .filter(|p| mode & p.bit() != 0)
        .collect()
}

pub fn permissions_to_mode(perms: PermissionSet) -> u32 {
    perms.iter().fold(0, |mode, p| mode | p.bit())
}

/// Mode used when a source format reports no permission bits.
pub fn default_mode(kind: EntryKind) -> u32 {
    match kind {
        EntryKind::Directory => DEFAULT_DIR_MODE,
        EntryKind::Symlink => DEFAULT_SYMLINK_MODE,
        EntryKind::File | EntryKind::Hardlink => DEFAULT_FILE_MODE,
    }
}

/// Returns the permission bits of `mode`, or the default for `kind` when they are all
/// zero.
pub fn effective_mode(mode: u32, kind: EntryKind) -> u32 {
    let perms = mode & PERMISSION_MASK;
    if perms == 0 {
        default_mode(kind)
    } else {
        perms
    }
}

/// True if a ZIP unix mode carries the symlink file type.
pub fn is_zip_symlink(mode: u32) -> bool {
    mode & FILE_TYPE_MASK == ZIP_SYMLINK_FLAG
}
