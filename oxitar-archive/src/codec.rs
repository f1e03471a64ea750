//! Compression filters around a tar byte stream.
//!
//! [`Decoder`] and [`Encoder`] are transparent stream adapters selected by a
//! [`CompressionKind`]: gzip and xz go through `flate2` and `xz2`, `None`
//! passes bytes through unchanged.
//!
//! Encoders must be finished explicitly with [`Encoder::finish`] so the
//! compressed trailer is written before the destination is closed.

use crate::detect::{GZIP_MAGIC, PeekReader, XZ_MAGIC};
use flate2::Compression;
use flate2::read::MultiGzDecoder;
use flate2::write::GzEncoder;
use oxitar_core::CompressionKind;
use oxitar_core::error::{OxiTarError, Result};
use std::io::{self, Read, Write};
use xz2::read::XzDecoder;
use xz2::write::XzEncoder;

/// LZMA2 preset used for xz output.
pub const XZ_PRESET: u32 = 6;

/// Decoding side of the compression adapter.
pub enum Decoder<R: Read> {
    /// Raw bytes.
    Plain(PeekReader<R>),
    /// GZIP stream, including concatenated members.
    Gzip(MultiGzDecoder<PeekReader<R>>),
    /// XZ stream, including concatenated streams.
    Xz(XzDecoder<PeekReader<R>>),
}

impl<R: Read> Decoder<R> {
    /// Wrap `source` for decoding as `kind`.
    ///
    /// For compressed kinds the stream magic is checked up front, so a source
    /// that is not really gzip or xz fails here rather than mid-transfer.
    pub fn new(mut source: PeekReader<R>, kind: CompressionKind) -> Result<Self> {
        match kind {
            CompressionKind::None => Ok(Self::Plain(source)),
            CompressionKind::Gzip => {
                check_magic(&mut source, kind, &GZIP_MAGIC)?;
                Ok(Self::Gzip(MultiGzDecoder::new(source)))
            }
            CompressionKind::Xz => {
                check_magic(&mut source, kind, &XZ_MAGIC)?;
                Ok(Self::Xz(XzDecoder::new_multi_decoder(source)))
            }
        }
    }

    /// The compression kind being decoded.
    pub fn kind(&self) -> CompressionKind {
        match self {
            Self::Plain(_) => CompressionKind::None,
            Self::Gzip(_) => CompressionKind::Gzip,
            Self::Xz(_) => CompressionKind::Xz,
        }
    }
}

fn check_magic<R: Read>(
    source: &mut PeekReader<R>,
    kind: CompressionKind,
    magic: &[u8],
) -> Result<()> {
    let found = source.peek(magic.len())?;
    if found != magic {
        return Err(OxiTarError::decode(
            kind,
            format!("invalid header: expected magic {magic:02x?}, found {found:02x?}"),
        ));
    }
    Ok(())
}

/// Tag a codec error with the kind that raised it.
fn tag_error(kind: CompressionKind, err: io::Error) -> io::Error {
    match err.kind() {
        io::ErrorKind::InvalidData | io::ErrorKind::InvalidInput | io::ErrorKind::Other => {
            io::Error::new(err.kind(), format!("{kind} stream: {err}"))
        }
        _ => err,
    }
}

impl<R: Read> Read for Decoder<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Plain(r) => r.read(buf),
            Self::Gzip(r) => r
                .read(buf)
                .map_err(|e| tag_error(CompressionKind::Gzip, e)),
            Self::Xz(r) => r.read(buf).map_err(|e| tag_error(CompressionKind::Xz, e)),
        }
    }
}

/// Encoding side of the compression adapter.
pub enum Encoder<W: Write> {
    /// Raw bytes.
    Plain(W),
    /// GZIP at maximum compression.
    Gzip(GzEncoder<W>),
    /// XZ at [`XZ_PRESET`].
    Xz(XzEncoder<W>),
}

impl<W: Write> Encoder<W> {
    /// Wrap `sink` for encoding as `kind`.
    pub fn new(sink: W, kind: CompressionKind) -> Self {
        match kind {
            CompressionKind::None => Self::Plain(sink),
            CompressionKind::Gzip => Self::Gzip(GzEncoder::new(sink, Compression::best())),
            CompressionKind::Xz => Self::Xz(XzEncoder::new(sink, XZ_PRESET)),
        }
    }

    /// The compression kind being encoded.
    pub fn kind(&self) -> CompressionKind {
        match self {
            Self::Plain(_) => CompressionKind::None,
            Self::Gzip(_) => CompressionKind::Gzip,
            Self::Xz(_) => CompressionKind::Xz,
        }
    }

    /// Write the compression trailer and hand back the destination.
    ///
    /// The destination is flushed but not closed; dropping it is up to the
    /// caller.
    pub fn finish(self) -> io::Result<W> {
        let mut inner = match self {
            Self::Plain(w) => w,
            Self::Gzip(w) => w.finish()?,
            Self::Xz(w) => w.finish()?,
        };
        inner.flush()?;
        Ok(inner)
    }
}

impl<W: Write> Write for Encoder<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(buf),
            Self::Gzip(w) => w.write(buf),
            Self::Xz(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            Self::Gzip(w) => w.flush(),
            Self::Xz(w) => w.flush(),
        }
    }
}
