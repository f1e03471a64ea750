//! Moving entries from sources into a sink.
//!
//! Sources are drained strictly in the order given, and each source's
//! entries are copied in the order it produces them. The first error stops
//! the transfer; the sink is then dropped without being finished, so no
//! end-of-archive marker is written after a failure.

use crate::sink::ArchiveSink;
use crate::source::ArchiveSource;
use oxitar_core::error::Result;
use oxitar_core::{CompressionKind, EntryHeader};
use serde::Serialize;
use std::io::Write;
use tracing::{debug, info};

/// Callbacks fired while a transfer runs.
///
/// All methods default to doing nothing.
pub trait TransferObserver {
    /// A source is about to be drained.
    fn source_started(&mut self, _label: &str) {}

    /// An entry is about to be copied.
    fn entry(&mut self, _label: &str, _header: &EntryHeader) {}

    /// A source was drained completely.
    fn source_finished(&mut self, _report: &InputReport) {}
}

impl TransferObserver for () {}

/// What one input contributed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InputReport {
    /// Input label: a path or `stdin`.
    pub input: String,
    /// Entries copied.
    pub entries: u64,
    /// Body bytes copied.
    pub bytes: u64,
}

/// Summary of a finished transfer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransferReport {
    /// Output compression.
    pub compression: CompressionKind,
    /// Per-input counts, in transfer order.
    pub inputs: Vec<InputReport>,
}

impl TransferReport {
    /// Create an empty report for an output of the given kind.
    pub fn new(compression: CompressionKind) -> Self {
        Self {
            compression,
            inputs: Vec::new(),
        }
    }

    /// Total entries copied.
    pub fn entries(&self) -> u64 {
        self.inputs.iter().map(|i| i.entries).sum()
    }

    /// Total body bytes copied.
    pub fn bytes(&self) -> u64 {
        self.inputs.iter().map(|i| i.bytes).sum()
    }
}

/// Drain every source into `sink`, then finish it.
///
/// Returns the finished destination along with the report.
pub fn transfer<S, I, W>(sources: I, sink: ArchiveSink<W>) -> Result<(W, TransferReport)>
where
    S: ArchiveSource,
    I: IntoIterator<Item = S>,
    W: Write,
{
    transfer_observed(sources, sink, &mut ())
}

/// Like [`transfer`], reporting progress to `observer`.
pub fn transfer_observed<S, I, W>(
    sources: I,
    mut sink: ArchiveSink<W>,
    observer: &mut dyn TransferObserver,
) -> Result<(W, TransferReport)>
where
    S: ArchiveSource,
    I: IntoIterator<Item = S>,
    W: Write,
{
    let mut report = TransferReport::new(sink.kind());
    for mut source in sources {
        report
            .inputs
            .push(transfer_entries(&mut source, &mut sink, observer)?);
    }

    let dest = sink.finish()?;
    info!(
        inputs = report.inputs.len(),
        entries = report.entries(),
        bytes = report.bytes(),
        "transfer finished"
    );
    Ok((dest, report))
}

/// Copy every entry of one source into `sink` without finishing it.
///
/// Errors are tagged with the source's label.
pub fn transfer_entries<S, W>(
    source: &mut S,
    sink: &mut ArchiveSink<W>,
    observer: &mut dyn TransferObserver,
) -> Result<InputReport>
where
    S: ArchiveSource + ?Sized,
    W: Write,
{
    let label = source.label().to_string();
    observer.source_started(&label);
    debug!(input = %label, "draining input");

    let mut entries = 0;
    let mut bytes = 0;
    while let Some(entry) = source.next_entry().map_err(|e| e.with_input(&label))? {
        let (header, mut body) = entry.into_parts();
        observer.entry(&label, &header);
        bytes += sink
            .write_entry(&header, &mut body)
            .map_err(|e| e.with_input(&label))?;
        entries += 1;
    }

    let report = InputReport {
        input: label,
        entries,
        bytes,
    };
    info!(input = %report.input, entries, bytes, "input merged");
    observer.source_finished(&report);
    Ok(report)
}
