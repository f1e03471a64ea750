//! Content-type sniffing.
//!
//! This module classifies a byte source by its magic numbers (file
//! signatures) without consuming it. Seekable sources are rewound after the
//! probe; non-seekable ones go through [`PeekReader`], which keeps the probed
//! bytes and replays them ahead of the rest of the stream.
//!
//! Sniffing never fails on unrecognised content: anything without a known
//! compression magic is treated as raw bytes, and the tar decoder gets to
//! reject it later if it is not an archive.

use oxitar_core::CompressionKind;
use oxitar_core::error::{OxiTarError, Result};
use std::io::{self, Read, Seek, SeekFrom};
use std::path::Path;
use tracing::debug;

/// Number of leading bytes inspected when sniffing.
pub const SNIFF_LEN: usize = 512;

/// GZIP magic: 0x1F 0x8B.
pub const GZIP_MAGIC: [u8; 2] = [0x1F, 0x8B];

/// XZ magic: 0xFD '7' 'z' 'X' 'Z' 0x00.
pub const XZ_MAGIC: [u8; 6] = [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00];

/// Offset of the "ustar" magic inside a tar header block.
const USTAR_OFFSET: usize = 257;

/// Detected content of a byte source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentType {
    /// GZIP compressed stream.
    Gzip,
    /// XZ compressed stream.
    Xz,
    /// Uncompressed tar archive (ustar header).
    Tar,
    /// The source had no bytes at all.
    Empty,
    /// Anything else.
    Unknown,
}

impl ContentType {
    /// Detect content type from magic bytes.
    pub fn from_magic(magic: &[u8]) -> Self {
        if magic.is_empty() {
            return Self::Empty;
        }

        if magic.starts_with(&GZIP_MAGIC) {
            return Self::Gzip;
        }

        if magic.starts_with(&XZ_MAGIC) {
            return Self::Xz;
        }

        // TAR: "ustar" at offset 257 (both POSIX "ustar\0" and GNU "ustar ")
        if magic.len() >= USTAR_OFFSET + 5 && &magic[USTAR_OFFSET..USTAR_OFFSET + 5] == b"ustar" {
            return Self::Tar;
        }

        Self::Unknown
    }

    /// Map the content type to the compression envelope to decode with.
    ///
    /// XZ streams are also recognised by a `.xz` file name when the magic is
    /// missing; everything else without a compression magic is raw bytes.
    pub fn compression(&self, name_hint: Option<&Path>) -> CompressionKind {
        match self {
            Self::Gzip => CompressionKind::Gzip,
            Self::Xz => CompressionKind::Xz,
            Self::Unknown if name_hint.is_some_and(|p| has_extension(p, "xz")) => {
                CompressionKind::Xz
            }
            _ => CompressionKind::None,
        }
    }

    /// Decide whether a file holds a (possibly compressed) tar stream rather
    /// than plain bytes to be stored as a single entry.
    pub fn is_archive(&self, name_hint: Option<&Path>) -> bool {
        match self {
            Self::Gzip | Self::Xz | Self::Tar => true,
            Self::Empty | Self::Unknown => {
                name_hint.is_some_and(|p| has_extension(p, "tar") || has_extension(p, "xz"))
            }
        }
    }

    /// Get the MIME type.
    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Gzip => "application/gzip",
            Self::Xz => "application/x-xz",
            Self::Tar => "application/x-tar",
            Self::Empty => "inode/x-empty",
            Self::Unknown => "application/octet-stream",
        }
    }
}

impl std::fmt::Display for ContentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Gzip => write!(f, "GZIP"),
            Self::Xz => write!(f, "XZ"),
            Self::Tar => write!(f, "TAR"),
            Self::Empty => write!(f, "Empty"),
            Self::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Result of sniffing a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sniffed {
    /// What the leading bytes look like.
    pub content: ContentType,
    /// Envelope to decode the source with.
    pub compression: CompressionKind,
}

impl Sniffed {
    fn from_probe(probe: &[u8], name_hint: Option<&Path>) -> Self {
        let content = ContentType::from_magic(probe);
        let compression = content.compression(name_hint);
        debug!(%content, %compression, probed = probe.len(), "sniffed content type");
        Self {
            content,
            compression,
        }
    }
}

/// Check a path's final extension, ignoring ASCII case.
pub fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Sniff a non-seekable source through its peek buffer.
///
/// The probed bytes stay buffered in `reader` and are returned by the next
/// reads, so the stream is unchanged from the consumer's point of view.
pub fn sniff<R: Read>(reader: &mut PeekReader<R>, name_hint: Option<&Path>) -> Result<Sniffed> {
    let probe = reader.peek(SNIFF_LEN).map_err(OxiTarError::Sniff)?;
    Ok(Sniffed::from_probe(probe, name_hint))
}

/// Sniff a seekable source and restore its read position afterwards.
pub fn sniff_seekable<R: Read + Seek>(reader: &mut R, name_hint: Option<&Path>) -> Result<Sniffed> {
    let start = reader.stream_position().map_err(OxiTarError::Sniff)?;

    let mut probe = Vec::with_capacity(SNIFF_LEN);
    let read = reader.by_ref().take(SNIFF_LEN as u64).read_to_end(&mut probe);
    // Rewind even when the probe failed part-way.
    let rewind = reader.seek(SeekFrom::Start(start));
    read.map_err(OxiTarError::Sniff)?;
    rewind.map_err(OxiTarError::Sniff)?;

    Ok(Sniffed::from_probe(&probe, name_hint))
}

/// A reader that can look ahead without consuming.
///
/// Peeked bytes are held in an internal buffer and handed out again by
/// [`Read::read`] before any new bytes are pulled from the inner reader.
#[derive(Debug)]
pub struct PeekReader<R> {
    inner: R,
    buf: Vec<u8>,
    pos: usize,
}

impl<R: Read> PeekReader<R> {
    /// Wrap a reader.
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            pos: 0,
        }
    }

    /// Look at up to `len` bytes from the current position.
    ///
    /// Returns fewer than `len` bytes only if the stream ends first.
    pub fn peek(&mut self, len: usize) -> io::Result<&[u8]> {
        if self.pos > 0 {
            self.buf.drain(..self.pos);
            self.pos = 0;
        }

        let mut chunk = [0u8; SNIFF_LEN];
        while self.buf.len() < len {
            let want = (len - self.buf.len()).min(chunk.len());
            match self.inner.read(&mut chunk[..want]) {
                Ok(0) => break,
                Ok(n) => self.buf.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        let end = len.min(self.buf.len());
        Ok(&self.buf[..end])
    }

    /// Number of peeked bytes not yet consumed.
    pub fn buffered(&self) -> usize {
        self.buf.len() - self.pos
    }
}

impl<R: Read> Read for PeekReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.pos < self.buf.len() {
            let n = out.len().min(self.buf.len() - self.pos);
            out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
            self.pos += n;
            if self.pos == self.buf.len() {
                self.buf.clear();
                self.pos = 0;
            }
            return Ok(n);
        }
        self.inner.read(out)
    }
}
