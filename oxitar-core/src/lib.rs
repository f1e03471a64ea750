//! # OxiTar Core
//!
//! Core types shared by the OxiTar crates.
//!
//! - [`entry`]: Archive entry metadata
//! - [`compression`]: Compression envelopes around a tar stream
//! - [`error`]: Error types
//!
//! ## Architecture
//!
//! OxiTar composes tar archives as a layered stream stack:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │ Job: merge / add / append, CLI                          │
//! ├─────────────────────────────────────────────────────────┤
//! │ Pipeline: sources -> sink, append repositioning         │
//! ├─────────────────────────────────────────────────────────┤
//! │ Container: tar headers, entry streams                   │
//! ├─────────────────────────────────────────────────────────┤
//! │ Framing: sniffing, gzip / xz / identity filters         │
//! └─────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```rust
//! use oxitar_core::{CompressionKind, EntryHeader};
//!
//! let kind: CompressionKind = "gzip".parse().unwrap();
//! assert!(kind.is_compressed());
//!
//! let header = EntryHeader::file("hello.txt", 5);
//! assert_eq!(header.body_len(), 5);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod compression;
pub mod entry;
pub mod error;

// Re-exports for convenience
pub use compression::CompressionKind;
pub use entry::{EntryHeader, EntryType};
pub use error::{OxiTarError, Result};
