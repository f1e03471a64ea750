//! Error types for OxiTar operations.
//!
//! Every failure in a job maps to one variant of [`OxiTarError`]. Errors are
//! fatal to the job that raised them: there is no partial success and no
//! retry, so the variants carry enough context to say which input or stage
//! failed.

use crate::compression::CompressionKind;
use std::io;
use thiserror::Error;

/// The main error type for OxiTar operations.
#[derive(Debug, Error)]
pub enum OxiTarError {
    /// I/O error from an underlying reader/writer.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid job configuration (unsupported format, bad destination, ...).
    #[error("configuration error: {message}")]
    Configuration {
        /// Description of the problem.
        message: String,
    },

    /// I/O failure while probing the leading bytes of a stream.
    #[error("failed to sniff content type: {0}")]
    Sniff(#[source] io::Error),

    /// Malformed compressed header or malformed tar header.
    #[error("{kind} decode error: {message}")]
    Decode {
        /// Layer that failed to decode ("gzip", "xz", "tar").
        kind: &'static str,
        /// Description of the malformed data.
        message: String,
    },

    /// An entry body delivered fewer bytes than its header declared.
    #[error("truncated entry {name}: expected {expected} bytes, got {actual}")]
    TruncatedEntry {
        /// Entry name.
        name: String,
        /// Declared size.
        expected: u64,
        /// Bytes actually available.
        actual: u64,
    },

    /// The existing archive cannot be repositioned for appending.
    #[error("cannot append: {message}")]
    AppendWindow {
        /// Why the end-of-archive window could not be located.
        message: String,
    },

    /// A sink was used again after a failed entry.
    #[error("archive sink aborted by an earlier error")]
    Aborted,

    /// A source was polled again after it returned an error.
    #[error("archive source exhausted by an earlier error")]
    Exhausted,

    /// Wraps an error with the input or stage it came from.
    #[error("failed to merge {input}: {source}")]
    Input {
        /// Input path, `stdin`, or stage name.
        input: String,
        /// The underlying error.
        #[source]
        source: Box<OxiTarError>,
    },
}

/// Result type alias for OxiTar operations.
pub type Result<T> = std::result::Result<T, OxiTarError>;

impl OxiTarError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a decode error for a compression kind.
    pub fn decode(kind: CompressionKind, message: impl Into<String>) -> Self {
        Self::Decode {
            kind: kind.name(),
            message: message.into(),
        }
    }

    /// Create a decode error for a malformed tar header.
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::Decode {
            kind: "tar",
            message: message.into(),
        }
    }

    /// Create a truncated entry error.
    pub fn truncated(name: impl Into<String>, expected: u64, actual: u64) -> Self {
        Self::TruncatedEntry {
            name: name.into(),
            expected,
            actual,
        }
    }

    /// Create an append window error.
    pub fn append_window(message: impl Into<String>) -> Self {
        Self::AppendWindow {
            message: message.into(),
        }
    }

    /// Attach the name of the failing input.
    ///
    /// An error that already names an input is returned unchanged so the
    /// innermost context wins.
    pub fn with_input(self, input: impl Into<String>) -> Self {
        match self {
            Self::Input { .. } => self,
            other => Self::Input {
                input: input.into(),
                source: Box::new(other),
            },
        }
    }

    /// The error with any [`OxiTarError::Input`] wrappers removed.
    pub fn root(&self) -> &OxiTarError {
        match self {
            Self::Input { source, .. } => source.root(),
            other => other,
        }
    }

    /// Check if this is a configuration error.
    pub fn is_configuration(&self) -> bool {
        matches!(self.root(), Self::Configuration { .. })
    }
}
