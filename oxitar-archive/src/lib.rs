//! # OxiTar Archive
//!
//! Tar stream composition for OxiTar.
//!
//! This crate merges tar archives, adds plain files to them and appends to
//! finished archives, across these compression envelopes:
//!
//! - **None**: Raw tar bytes
//! - **GZIP**: DEFLATE, including concatenated members
//! - **XZ**: LZMA2, including concatenated streams
//!
//! ## Example
//!
//! ```rust,no_run
//! use oxitar_archive::job::{ArchiveJob, InputSpec, JobConfig, OutputSpec};
//! use std::path::PathBuf;
//!
//! let config = JobConfig {
//!     inputs: vec![InputSpec::parse("a.tar"), InputSpec::parse("b.tar.gz")],
//!     output: OutputSpec::Path(PathBuf::from("merged.tar.xz")),
//!     format: "xz".to_string(),
//!     ..JobConfig::default()
//! };
//! let report = ArchiveJob::from_config(config)?.run()?;
//! println!("{} entries", report.entries());
//! # Ok::<(), oxitar_core::OxiTarError>(())
//! ```
//!
//! ## Building blocks
//!
//! - [`detect`]: sniff the compression of a stream without consuming it
//! - [`codec`]: gzip / xz / identity stream adapters
//! - [`source`] and [`sink`]: read and write entries
//! - [`pipeline`]: drain sources into a sink, in order
//! - [`append`]: reposition a finished archive so new entries can follow

#![warn(missing_docs)]
#![warn(clippy::all)]
#![allow(clippy::module_name_repetitions)]

pub mod append;
pub mod codec;
pub mod detect;
pub mod job;
pub mod pipeline;
pub mod sink;
pub mod source;
pub mod tar;

// Re-exports
pub use append::{AppendConfig, AppendJob, RepositionedArchive};
pub use codec::{Decoder, Encoder};
pub use detect::{ContentType, PeekReader, Sniffed};
pub use job::{ArchiveJob, InputSpec, JobConfig, JobMode, OutputSpec};
pub use pipeline::{InputReport, TransferObserver, TransferReport, transfer};
pub use sink::ArchiveSink;
pub use source::{ArchiveSource, Entry, EntryBody, PlainFileSource, TarSource};
pub use tar::{END_OF_ARCHIVE_LEN, TarHeader};
