//! Tar stream writer.
//!
//! [`ArchiveSink`] serializes entries into a tar stream wrapped in the
//! requested compression. The end-of-archive marker is written only by
//! [`ArchiveSink::finish`], which consumes the sink.

use crate::codec::Encoder;
use crate::tar::{self, BLOCK_SIZE, END_OF_ARCHIVE_LEN};
use oxitar_core::error::{OxiTarError, Result};
use oxitar_core::{CompressionKind, EntryHeader};
use std::io::{self, Read, Write};
use tracing::debug;

/// Writes entries as a tar stream into `W`.
pub struct ArchiveSink<W: Write> {
    encoder: Encoder<W>,
    entries: u64,
    body_bytes: u64,
    poisoned: bool,
}

impl<W: Write> ArchiveSink<W> {
    /// Create a sink writing into `dest`, compressed as `kind`.
    pub fn new(dest: W, kind: CompressionKind) -> Self {
        Self {
            encoder: Encoder::new(dest, kind),
            entries: 0,
            body_bytes: 0,
            poisoned: false,
        }
    }

    /// Output compression.
    pub fn kind(&self) -> CompressionKind {
        self.encoder.kind()
    }

    /// Number of entries written so far.
    pub fn entries(&self) -> u64 {
        self.entries
    }

    /// Body bytes written so far, excluding headers and padding.
    pub fn body_bytes(&self) -> u64 {
        self.body_bytes
    }

    /// Write one entry: its header blocks, then exactly `header.size` body
    /// bytes from `body`, then block padding.
    ///
    /// If `body` ends early the entry is incomplete and the sink is
    /// poisoned: this call returns [`OxiTarError::TruncatedEntry`] and every
    /// later call returns [`OxiTarError::Aborted`].
    pub fn write_entry<R: Read + ?Sized>(
        &mut self,
        header: &EntryHeader,
        body: &mut R,
    ) -> Result<u64> {
        if self.poisoned {
            return Err(OxiTarError::Aborted);
        }

        let result = self.write_entry_inner(header, body);
        if result.is_err() {
            self.poisoned = true;
        }
        result
    }

    fn write_entry_inner<R: Read + ?Sized>(
        &mut self,
        header: &EntryHeader,
        body: &mut R,
    ) -> Result<u64> {
        let blocks = tar::encode_header(header)?;
        self.encoder.write_all(&blocks)?;

        let expected = header.body_len();
        let copied = io::copy(&mut body.take(expected), &mut self.encoder)?;
        if copied < expected {
            return Err(OxiTarError::truncated(&header.name, expected, copied));
        }

        let pad = tar::padding(expected) as usize;
        if pad > 0 {
            self.encoder.write_all(&[0u8; BLOCK_SIZE][..pad])?;
        }

        self.entries += 1;
        self.body_bytes += expected;
        debug!(name = %header.name, size = expected, "wrote entry");
        Ok(expected)
    }

    /// Add an in-memory regular file.
    pub fn add_file(&mut self, name: &str, data: &[u8]) -> Result<()> {
        let header = EntryHeader::file(name, data.len() as u64);
        self.write_entry(&header, &mut &data[..])?;
        Ok(())
    }

    /// Write the end-of-archive marker, finish the compression and hand
    /// back the destination.
    ///
    /// A sink with no entries still produces a valid, empty archive.
    pub fn finish(mut self) -> Result<W> {
        if self.poisoned {
            return Err(OxiTarError::Aborted);
        }

        self.encoder.write_all(&[0u8; END_OF_ARCHIVE_LEN as usize])?;
        let dest = self.encoder.finish()?;
        debug!(entries = self.entries, bytes = self.body_bytes, "finished archive");
        Ok(dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Decoder;
    use crate::detect::PeekReader;
    use crate::source::{ArchiveSource, TarSource};
    use std::io::Cursor;

    /// A reader that fails after handing out `ok` bytes.
    struct Broken {
        ok: usize,
    }

    impl Read for Broken {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            if self.ok == 0 {
                return Err(io::Error::other("disk on fire"));
            }
            let n = buf.len().min(self.ok);
            buf[..n].fill(b'z');
            self.ok -= n;
            Ok(n)
        }
    }

    #[test]
    fn test_empty_archive() {
        let out = ArchiveSink::new(Vec::new(), CompressionKind::None)
            .finish()
            .unwrap();
        assert_eq!(out, vec![0u8; END_OF_ARCHIVE_LEN as usize]);

        let mut archive = ::tar::Archive::new(Cursor::new(out));
        assert_eq!(archive.entries().unwrap().count(), 0);
    }

    #[test]
    fn test_empty_compressed_archive() {
        for kind in [CompressionKind::Gzip, CompressionKind::Xz] {
            let out = ArchiveSink::new(Vec::new(), kind).finish().unwrap();
            let mut decoder = Decoder::new(PeekReader::new(Cursor::new(out)), kind).unwrap();
            let mut plain = Vec::new();
            decoder.read_to_end(&mut plain).unwrap();
            assert_eq!(plain, vec![0u8; END_OF_ARCHIVE_LEN as usize]);
        }
    }

    #[test]
    fn test_layout() {
        let mut sink = ArchiveSink::new(Vec::new(), CompressionKind::None);
        sink.add_file("a.txt", b"hello").unwrap();
        sink.add_file("b.txt", &[7u8; 512]).unwrap();
        assert_eq!(sink.entries(), 2);
        assert_eq!(sink.body_bytes(), 517);

        let out = sink.finish().unwrap();
        // header + 1 body block, header + 1 body block, end marker
        assert_eq!(out.len(), 4 * BLOCK_SIZE + END_OF_ARCHIVE_LEN as usize);
        assert_eq!(&out[BLOCK_SIZE..BLOCK_SIZE + 5], b"hello");
        assert!(out[BLOCK_SIZE + 5..2 * BLOCK_SIZE].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_readable_by_tar_crate() {
        let mut sink = ArchiveSink::new(Vec::new(), CompressionKind::None);
        sink.add_file("a.txt", b"alpha").unwrap();
        sink.write_entry(&EntryHeader::directory("dir/"), &mut io::empty())
            .unwrap();
        sink.write_entry(&EntryHeader::symlink("link", "a.txt"), &mut io::empty())
            .unwrap();
        let long_name = format!("deep/{}", "x".repeat(200));
        sink.add_file(&long_name, b"long").unwrap();
        let out = sink.finish().unwrap();

        let mut archive = ::tar::Archive::new(Cursor::new(out));
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| {
                let path = e.unwrap().path().unwrap().to_string_lossy().into_owned();
                path.trim_end_matches('/').to_string()
            })
            .collect();
        assert_eq!(names, vec!["a.txt", "dir", "link", long_name.as_str()]);
    }

    #[test]
    fn test_truncated_entry_poisons_sink() {
        let mut sink = ArchiveSink::new(Vec::new(), CompressionKind::None);
        let header = EntryHeader::file("short.bin", 100);

        let err = sink.write_entry(&header, &mut &[1u8; 40][..]).unwrap_err();
        assert!(matches!(
            err,
            OxiTarError::TruncatedEntry {
                expected: 100,
                actual: 40,
                ..
            }
        ));

        assert!(matches!(
            sink.add_file("next.txt", b"x").unwrap_err(),
            OxiTarError::Aborted
        ));
        assert!(matches!(sink.finish().unwrap_err(), OxiTarError::Aborted));
    }

    #[test]
    fn test_body_read_error_poisons_sink() {
        let mut sink = ArchiveSink::new(Vec::new(), CompressionKind::Gzip);
        let header = EntryHeader::file("broken.bin", 10_000);
        let err = sink
            .write_entry(&header, &mut Broken { ok: 4096 })
            .unwrap_err();
        assert!(matches!(err, OxiTarError::Io(_)));
        assert!(matches!(
            sink.add_file("x", b"").unwrap_err(),
            OxiTarError::Aborted
        ));
    }

    #[test]
    fn test_extra_body_bytes_are_not_copied() {
        let mut sink = ArchiveSink::new(Vec::new(), CompressionKind::None);
        let header = EntryHeader::file("three", 3);
        let mut body = Cursor::new(b"abcdef".to_vec());
        assert_eq!(sink.write_entry(&header, &mut body).unwrap(), 3);
        assert_eq!(body.position(), 3);
    }

    #[test]
    fn test_roundtrip_through_source() {
        for kind in CompressionKind::ALL {
            let mut sink = ArchiveSink::new(Vec::new(), kind);
            sink.add_file("one", b"1").unwrap();
            sink.add_file("two", b"22").unwrap();
            let out = sink.finish().unwrap();

            let mut source = TarSource::new(Cursor::new(out), "mem", None, None).unwrap();
            assert_eq!(source.compression(), kind);
            let mut names = Vec::new();
            while let Some(entry) = source.next_entry().unwrap() {
                names.push(entry.header().name.clone());
            }
            assert_eq!(names, ["one", "two"], "kind {kind}");
        }
    }
}
