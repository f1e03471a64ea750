//! Entry streams read from archives and plain files.
//!
//! An [`ArchiveSource`] yields entries one at a time, forward only. Each
//! [`Entry`] borrows its source, so the body must be consumed (or dropped)
//! before the next call to [`ArchiveSource::next_entry`]; unread body bytes
//! are skipped automatically.

use crate::codec::Decoder;
use crate::detect::{self, PeekReader};
use crate::tar::{self, BLOCK_SIZE, TarHeader};
use oxitar_core::error::{OxiTarError, Result};
use oxitar_core::{CompressionKind, EntryHeader};
use std::collections::HashMap;
use std::fs::{File, Metadata};
use std::io::{self, BufReader, Read};
use std::path::Path;
use tracing::debug;

/// A forward-only sequence of archive entries.
pub trait ArchiveSource {
    /// Produce the next entry.
    ///
    /// `Ok(None)` is the clean end of the sequence. After an error the source
    /// is spent and keeps returning [`OxiTarError::Exhausted`].
    fn next_entry(&mut self) -> Result<Option<Entry<'_>>>;

    /// Name of the input, for logs and error messages.
    fn label(&self) -> &str;
}

impl<S: ArchiveSource + ?Sized> ArchiveSource for Box<S> {
    fn next_entry(&mut self) -> Result<Option<Entry<'_>>> {
        (**self).next_entry()
    }

    fn label(&self) -> &str {
        (**self).label()
    }
}

/// One archive member: metadata plus a body reader borrowed from its source.
pub struct Entry<'a> {
    header: EntryHeader,
    body: EntryBody<'a>,
}

impl<'a> Entry<'a> {
    /// Entry metadata.
    pub fn header(&self) -> &EntryHeader {
        &self.header
    }

    /// Reader over the entry's body.
    pub fn body(&mut self) -> &mut EntryBody<'a> {
        &mut self.body
    }

    /// Split into metadata and body.
    pub fn into_parts(self) -> (EntryHeader, EntryBody<'a>) {
        (self.header, self.body)
    }
}

/// Body reader limited to the entry's declared size.
///
/// If the underlying stream ends early the reader simply reports end of
/// file; the sink notices the shortfall against the declared size.
pub struct EntryBody<'a> {
    inner: &'a mut dyn Read,
    remaining: &'a mut u64,
}

impl EntryBody<'_> {
    /// Bytes of the declared size not yet read.
    pub fn remaining(&self) -> u64 {
        *self.remaining
    }
}

impl Read for EntryBody<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if *self.remaining == 0 || buf.is_empty() {
            return Ok(0);
        }
        let max = buf.len().min(usize::try_from(*self.remaining).unwrap_or(usize::MAX));
        let n = self.inner.read(&mut buf[..max])?;
        *self.remaining -= n as u64;
        Ok(n)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Ready,
    Done,
    Failed,
}

/// Entries decoded from a (possibly compressed) tar stream.
pub struct TarSource<R: Read> {
    label: String,
    reader: Decoder<R>,
    info: Option<Metadata>,
    state: State,
    /// Unread body bytes of the current entry.
    remaining: u64,
    /// Padding after the current entry's body.
    pad: u64,
    global_pax: HashMap<String, String>,
}

impl TarSource<BufReader<File>> {
    /// Open an archive file.
    ///
    /// Without a `hint`, the compression is sniffed from the file's leading
    /// bytes and name; the file position is restored before decoding.
    pub fn open(path: &Path, hint: Option<CompressionKind>) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_file(file, path, hint)
    }

    /// Wrap an already opened archive file.
    pub fn from_file(mut file: File, path: &Path, hint: Option<CompressionKind>) -> Result<Self> {
        let info = file.metadata()?;
        let kind = match hint {
            Some(kind) => kind,
            None => detect::sniff_seekable(&mut file, Some(path))?.compression,
        };

        let reader = Decoder::new(PeekReader::new(BufReader::new(file)), kind)?;
        let mut source = Self::from_decoder(reader, path.display().to_string());
        source.info = Some(info);
        Ok(source)
    }
}

impl<R: Read> TarSource<R> {
    /// Wrap a non-seekable stream such as standard input.
    ///
    /// The sniffed bytes are replayed to the decoder, so nothing is lost.
    pub fn new(
        reader: R,
        label: impl Into<String>,
        hint: Option<CompressionKind>,
        name_hint: Option<&Path>,
    ) -> Result<Self> {
        Self::from_peek(PeekReader::new(reader), label, hint, name_hint)
    }

    /// Like [`TarSource::new`], for a stream that was already peeked at.
    pub fn from_peek(
        mut reader: PeekReader<R>,
        label: impl Into<String>,
        hint: Option<CompressionKind>,
        name_hint: Option<&Path>,
    ) -> Result<Self> {
        let kind = match hint {
            Some(kind) => kind,
            None => detect::sniff(&mut reader, name_hint)?.compression,
        };
        Ok(Self::from_decoder(Decoder::new(reader, kind)?, label))
    }

    /// Read entries from an existing decoder.
    pub fn from_decoder(reader: Decoder<R>, label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            reader,
            info: None,
            state: State::Ready,
            remaining: 0,
            pad: 0,
            global_pax: HashMap::new(),
        }
    }

    /// Compression kind the stream is decoded with.
    pub fn compression(&self) -> CompressionKind {
        self.reader.kind()
    }

    /// Metadata of the underlying file, when the source is a file.
    pub fn info(&self) -> Option<&Metadata> {
        self.info.as_ref()
    }

    /// Skip what is left of the current entry's body and padding.
    fn skip_body(&mut self) -> Result<()> {
        let skip = self.remaining + self.pad;
        self.remaining = 0;
        self.pad = 0;
        if skip == 0 {
            return Ok(());
        }

        let skipped = io::copy(&mut (&mut self.reader).take(skip), &mut io::sink())?;
        if skipped < skip {
            return Err(OxiTarError::invalid_header(format!(
                "unexpected end of archive: {} bytes missing from entry body",
                skip - skipped
            )));
        }
        Ok(())
    }

    /// Read headers up to the next real entry.
    fn advance(&mut self) -> Result<Option<EntryHeader>> {
        self.skip_body()?;

        let mut pax = HashMap::new();
        let mut longname: Option<String> = None;
        let mut longlink: Option<String> = None;
        let mut block = [0u8; BLOCK_SIZE];

        loop {
            let pending = !pax.is_empty() || longname.is_some() || longlink.is_some();

            if !tar::read_block(&mut self.reader, &mut block)? {
                if pending {
                    return Err(OxiTarError::invalid_header(
                        "archive ends after an extended header",
                    ));
                }
                return Ok(None);
            }

            let Some(mut header) = TarHeader::from_block(&block)? else {
                return Ok(None);
            };

            if header.is_extension() {
                let data = tar::read_extension_data(&mut self.reader, header.size)?;
                if header.is_pax_global_header() {
                    self.global_pax.extend(TarHeader::parse_pax_data(&data));
                } else if header.is_pax_header() {
                    pax = TarHeader::parse_pax_data(&data);
                } else {
                    let text = String::from_utf8_lossy(&data)
                        .trim_end_matches('\0')
                        .to_string();
                    if header.is_gnu_longname() {
                        longname = Some(text);
                    } else {
                        longlink = Some(text);
                    }
                }
                continue;
            }

            // Global first, then local PAX overrides it
            if !self.global_pax.is_empty() {
                header.apply_pax_attrs(&self.global_pax);
            }
            if !pax.is_empty() {
                header.apply_pax_attrs(&pax);
            }
            if let Some(name) = longname.take() {
                header.name = name;
            }
            if let Some(link) = longlink.take() {
                header.linkname = link;
            }

            let entry = header.to_entry_header();
            self.remaining = entry.body_len();
            self.pad = tar::padding(self.remaining);
            return Ok(Some(entry));
        }
    }
}

impl<R: Read> ArchiveSource for TarSource<R> {
    fn next_entry(&mut self) -> Result<Option<Entry<'_>>> {
        match self.state {
            State::Failed => return Err(OxiTarError::Exhausted),
            State::Done => return Ok(None),
            State::Ready => {}
        }

        match self.advance() {
            Ok(Some(header)) => {
                debug!(input = %self.label, name = %header.name, size = header.size, "read entry");
                Ok(Some(Entry {
                    header,
                    body: EntryBody {
                        inner: &mut self.reader,
                        remaining: &mut self.remaining,
                    },
                }))
            }
            Ok(None) => {
                self.state = State::Done;
                Ok(None)
            }
            Err(e) => {
                self.state = State::Failed;
                Err(e)
            }
        }
    }

    fn label(&self) -> &str {
        &self.label
    }
}

/// A plain file presented as a one-entry archive.
pub struct PlainFileSource {
    label: String,
    header: Option<EntryHeader>,
    file: BufReader<File>,
    remaining: u64,
}

impl PlainFileSource {
    /// Open a regular file; its entry is named after the file, under
    /// `prefix` if given.
    pub fn open(path: &Path, prefix: Option<&str>) -> Result<Self> {
        let file = File::open(path)?;
        Self::from_file(file, path, prefix)
    }

    /// Wrap an already opened regular file.
    pub fn from_file(file: File, path: &Path, prefix: Option<&str>) -> Result<Self> {
        let meta = file.metadata()?;
        if !meta.is_file() {
            return Err(OxiTarError::configuration(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        let header = EntryHeader::from_metadata(entry_name(path, prefix), &meta);
        Ok(Self {
            label: path.display().to_string(),
            header: Some(header),
            file: BufReader::new(file),
            remaining: 0,
        })
    }
}

impl ArchiveSource for PlainFileSource {
    fn next_entry(&mut self) -> Result<Option<Entry<'_>>> {
        let Some(header) = self.header.take() else {
            return Ok(None);
        };
        self.remaining = header.size;
        Ok(Some(Entry {
            header,
            body: EntryBody {
                inner: &mut self.file,
                remaining: &mut self.remaining,
            },
        }))
    }

    fn label(&self) -> &str {
        &self.label
    }
}

/// Archive name for a plain file: its base name, under `prefix` if given.
pub fn entry_name(path: &Path, prefix: Option<&str>) -> String {
    let base = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned());

    match prefix {
        Some(prefix) if !prefix.is_empty() => {
            if prefix.ends_with('/') {
                format!("{prefix}{base}")
            } else {
                format!("{prefix}/{base}")
            }
        }
        _ => base,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::ArchiveSink;
    use std::io::Cursor;

    fn build_tar(files: &[(&str, &[u8])]) -> Vec<u8> {
        let mut sink = ArchiveSink::new(Vec::new(), CompressionKind::None);
        for (name, data) in files {
            sink.add_file(name, data).unwrap();
        }
        sink.finish().unwrap()
    }

    fn collect<S: ArchiveSource>(source: &mut S) -> Vec<(String, Vec<u8>)> {
        let mut out = Vec::new();
        while let Some(mut entry) = source.next_entry().unwrap() {
            let mut data = Vec::new();
            entry.body().read_to_end(&mut data).unwrap();
            out.push((entry.header().name.clone(), data));
        }
        out
    }

    #[test]
    fn test_reads_entries_in_order() {
        let tar = build_tar(&[("a.txt", b"hello"), ("b.txt", b"world"), ("empty", b"")]);
        let mut source = TarSource::new(Cursor::new(tar), "mem", None, None).unwrap();
        assert_eq!(source.compression(), CompressionKind::None);

        let entries = collect(&mut source);
        assert_eq!(
            entries,
            vec![
                ("a.txt".to_string(), b"hello".to_vec()),
                ("b.txt".to_string(), b"world".to_vec()),
                ("empty".to_string(), Vec::new()),
            ]
        );
        // The end state is sticky.
        assert!(source.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_unread_bodies_are_skipped() {
        let big = vec![b'x'; 3000];
        let tar = build_tar(&[("big.bin", &big), ("after.txt", b"ok")]);
        let mut source = TarSource::new(Cursor::new(tar), "mem", None, None).unwrap();

        let mut first = source.next_entry().unwrap().unwrap();
        let mut partial = [0u8; 10];
        first.body().read_exact(&mut partial).unwrap();
        assert_eq!(first.body().remaining(), 2990);

        let mut second = source.next_entry().unwrap().unwrap();
        assert_eq!(second.header().name, "after.txt");
        let mut data = String::new();
        second.body().read_to_string(&mut data).unwrap();
        assert_eq!(data, "ok");
    }

    #[test]
    fn test_empty_stream_is_empty_archive() {
        let mut source = TarSource::new(Cursor::new(Vec::new()), "mem", None, None).unwrap();
        assert!(source.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_malformed_header_is_terminal() {
        let mut tar = build_tar(&[("a.txt", b"hello"), ("b.txt", b"world")]);
        // Corrupt the second header's name, invalidating its checksum.
        tar[2 * BLOCK_SIZE] = b'Z';

        let mut source = TarSource::new(Cursor::new(tar), "mem", None, None).unwrap();
        assert!(source.next_entry().unwrap().is_some());

        let err = source.next_entry().err().unwrap();
        assert!(matches!(err, OxiTarError::Decode { kind: "tar", .. }));
        assert!(matches!(
            source.next_entry().err().unwrap(),
            OxiTarError::Exhausted
        ));
    }

    #[test]
    fn test_truncated_body_fails_on_skip() {
        let tar = build_tar(&[("a.txt", &[1u8; 1000]), ("b.txt", b"x")]);
        let cut = tar[..BLOCK_SIZE + 600].to_vec();

        let mut source = TarSource::new(Cursor::new(cut), "mem", None, None).unwrap();
        let mut entry = source.next_entry().unwrap().unwrap();
        let mut data = Vec::new();
        entry.body().read_to_end(&mut data).unwrap();
        assert_eq!(data.len(), 600);

        assert!(source.next_entry().is_err());
    }

    #[test]
    fn test_gnu_longname_and_global_pax() {
        let long_name = "n".repeat(150);
        let mut raw = Vec::new();

        let mut push = |typeflag: u8, name: &str, data: &[u8]| {
            let header = TarHeader {
                name: name.to_string(),
                mode: 0o644,
                uid: 0,
                gid: 0,
                size: data.len() as u64,
                mtime: 0,
                typeflag,
                linkname: String::new(),
                uname: String::new(),
                gname: String::new(),
            };
            raw.extend_from_slice(&header.to_block().unwrap());
            raw.extend_from_slice(data);
            raw.resize(raw.len() + crate::tar::padding(data.len() as u64) as usize, 0);
        };

        let global = TarHeader::format_pax_record("uname", "builder");
        push(b'g', "pax_global_header", global.as_bytes());
        push(b'L', "././@LongLink", format!("{long_name}\0").as_bytes());
        push(b'0', "short", b"body");
        raw.extend_from_slice(&[0u8; BLOCK_SIZE * 2]);

        let mut source = TarSource::new(Cursor::new(raw), "mem", None, None).unwrap();
        let entry = source.next_entry().unwrap().unwrap();
        assert_eq!(entry.header().name, long_name);
        assert_eq!(entry.header().uname, "builder");
        drop(entry);
        assert!(source.next_entry().unwrap().is_none());
    }

    #[test]
    fn test_entry_name_prefix() {
        let path = Path::new("/tmp/data/report.csv");
        assert_eq!(entry_name(path, None), "report.csv");
        assert_eq!(entry_name(path, Some("")), "report.csv");
        assert_eq!(entry_name(path, Some("out")), "out/report.csv");
        assert_eq!(entry_name(path, Some("out/")), "out/report.csv");
    }

    #[test]
    fn test_plain_file_source() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.txt");
        std::fs::write(&path, b"plain bytes").unwrap();

        let mut source = PlainFileSource::open(&path, Some("docs")).unwrap();
        let entries = collect(&mut source);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].0, "docs/note.txt");
        assert_eq!(entries[0].1, b"plain bytes");
    }

    #[test]
    fn test_file_source_exposes_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.tar");
        let tar = build_tar(&[("a.txt", b"hello")]);
        std::fs::write(&path, &tar).unwrap();

        let source = TarSource::open(&path, None).unwrap();
        assert_eq!(source.info().map(|m| m.len()), Some(tar.len() as u64));
        assert_eq!(source.label(), path.display().to_string());
    }
}
