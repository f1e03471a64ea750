//! Archive entry metadata.
//!
//! [`EntryHeader`] is the format-agnostic description of one archive member.
//! The body travels separately as a reader so entries can be streamed from
//! source to sink without buffering.

use std::fs::Metadata;
use std::time::UNIX_EPOCH;

/// Entry type (file, directory, symlink, etc.).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EntryType {
    /// Regular file.
    #[default]
    Regular,
    /// Directory.
    Directory,
    /// Symbolic link.
    Symlink,
    /// Hard link.
    Hardlink,
    /// Character device.
    CharDevice,
    /// Block device.
    BlockDevice,
    /// Named pipe.
    Fifo,
    /// Any other tar typeflag, kept verbatim.
    Other(u8),
}

impl EntryType {
    /// Map a tar typeflag byte to an entry type.
    pub fn from_typeflag(flag: u8) -> Self {
        match flag {
            b'0' | 0 | b'7' => Self::Regular,
            b'1' => Self::Hardlink,
            b'2' => Self::Symlink,
            b'3' => Self::CharDevice,
            b'4' => Self::BlockDevice,
            b'5' => Self::Directory,
            b'6' => Self::Fifo,
            other => Self::Other(other),
        }
    }

    /// The tar typeflag byte for this type.
    pub fn typeflag(&self) -> u8 {
        match self {
            Self::Regular => b'0',
            Self::Hardlink => b'1',
            Self::Symlink => b'2',
            Self::CharDevice => b'3',
            Self::BlockDevice => b'4',
            Self::Directory => b'5',
            Self::Fifo => b'6',
            Self::Other(flag) => *flag,
        }
    }

    /// Check if entries of this type carry body bytes in a tar stream.
    pub fn has_body(&self) -> bool {
        matches!(self, Self::Regular | Self::Other(_))
    }

    /// Check if this is a directory.
    pub fn is_dir(&self) -> bool {
        matches!(self, Self::Directory)
    }

    /// Check if this is a symlink.
    pub fn is_symlink(&self) -> bool {
        matches!(self, Self::Symlink)
    }
}

/// Metadata for one archive member.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct EntryHeader {
    /// The name/path of the entry within the archive.
    pub name: String,
    /// Body size in bytes.
    pub size: u64,
    /// Unix permission bits.
    pub mode: u32,
    /// Modification time, seconds since the Unix epoch.
    pub mtime: u64,
    /// The type of entry.
    pub entry_type: EntryType,
    /// Link target for symlinks and hard links.
    pub link_target: Option<String>,
    /// Owner user ID.
    pub uid: u64,
    /// Owner group ID.
    pub gid: u64,
    /// Owner user name.
    pub uname: String,
    /// Owner group name.
    pub gname: String,
}

impl EntryHeader {
    /// Create a regular file header.
    pub fn file(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            mode: 0o644,
            ..Self::default()
        }
    }

    /// Create a directory header.
    pub fn directory(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: 0o755,
            entry_type: EntryType::Directory,
            ..Self::default()
        }
    }

    /// Create a symlink header.
    pub fn symlink(name: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            mode: 0o777,
            entry_type: EntryType::Symlink,
            link_target: Some(target.into()),
            ..Self::default()
        }
    }

    /// Build a regular file header from filesystem metadata.
    pub fn from_metadata(name: impl Into<String>, meta: &Metadata) -> Self {
        let mtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs())
            .unwrap_or(0);

        let mut header = Self::file(name, meta.len());
        header.mtime = mtime;
        header.mode = unix_mode(meta);
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            header.uid = u64::from(meta.uid());
            header.gid = u64::from(meta.gid());
        }
        header
    }

    /// Number of body bytes that follow this header in a tar stream.
    pub fn body_len(&self) -> u64 {
        if self.entry_type.has_body() {
            self.size
        } else {
            0
        }
    }
}

#[cfg(unix)]
fn unix_mode(meta: &Metadata) -> u32 {
    use std::os::unix::fs::PermissionsExt;
    meta.permissions().mode() & 0o7777
}

#[cfg(not(unix))]
fn unix_mode(meta: &Metadata) -> u32 {
    if meta.permissions().readonly() {
        0o444
    } else {
        0o644
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_typeflag_roundtrip() {
        for flag in [b'0', b'1', b'2', b'3', b'4', b'5', b'6', b'S'] {
            assert_eq!(EntryType::from_typeflag(flag).typeflag(), flag);
        }
        // Old-style NUL and contiguous files read as regular files.
        assert_eq!(EntryType::from_typeflag(0), EntryType::Regular);
        assert_eq!(EntryType::from_typeflag(b'7'), EntryType::Regular);
    }

    #[test]
    fn test_body_len() {
        assert_eq!(EntryHeader::file("a", 5).body_len(), 5);

        let mut dir = EntryHeader::directory("d/");
        dir.size = 99;
        assert_eq!(dir.body_len(), 0);
        assert!(dir.entry_type.is_dir());
    }

    #[test]
    fn test_symlink_header() {
        let link = EntryHeader::symlink("latest", "v1/file");
        assert!(link.entry_type.is_symlink());
        assert_eq!(link.link_target.as_deref(), Some("v1/file"));
        assert_eq!(link.body_len(), 0);
    }
}
