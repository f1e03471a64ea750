//! Compression framing around a tar stream.

use crate::error::OxiTarError;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// Compression envelope applied to a tar byte stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionKind {
    /// Raw tar bytes.
    None,
    /// GZIP (DEFLATE) envelope.
    Gzip,
    /// XZ (LZMA2) envelope.
    #[default]
    Xz,
}

impl CompressionKind {
    /// All supported kinds.
    pub const ALL: [CompressionKind; 3] = [Self::None, Self::Gzip, Self::Xz];

    /// Lowercase name, as accepted by [`FromStr`].
    pub fn name(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Gzip => "gzip",
            Self::Xz => "xz",
        }
    }

    /// Check if the kind wraps the stream in a codec.
    pub fn is_compressed(&self) -> bool {
        !matches!(self, Self::None)
    }
}

impl fmt::Display for CompressionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CompressionKind {
    type Err = OxiTarError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "none" | "tar" => Ok(Self::None),
            "gzip" | "gz" => Ok(Self::Gzip),
            "xz" => Ok(Self::Xz),
            other => Err(OxiTarError::configuration(format!(
                "compression format not available: {other}"
            ))),
        }
    }
}
