//! Appending to an existing archive.
//!
//! A finished tar stream ends with an all-zero end-of-archive marker of
//! [`END_OF_ARCHIVE_LEN`] bytes. To append, the decoded archive is truncated
//! just before that marker and a new sink continues writing from there; the
//! sink's own `finish` then writes a single fresh marker.
//!
//! Compressed archives cannot be extended in place, so they are decoded into
//! a scratch file next to the destination first. The scratch is removed on
//! any failure.

use crate::codec::{Decoder, Encoder};
use crate::detect::{self, PeekReader};
use crate::job::{self, InputSpec, JobMode, OutputSpec};
use crate::pipeline::{self, TransferObserver, TransferReport};
use crate::sink::ArchiveSink;
use crate::source::ArchiveSource;
use crate::tar::{BLOCK_SIZE, END_OF_ARCHIVE_LEN, TarHeader, padding, read_block};
use oxitar_core::CompressionKind;
use oxitar_core::error::{OxiTarError, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tempfile::{NamedTempFile, TempPath};
use tracing::{debug, info, warn};

/// A decoded archive positioned at its end-of-archive marker.
#[derive(Debug)]
pub struct RepositionedArchive {
    file: File,
    scratch: Option<TempPath>,
    source_kind: CompressionKind,
    offset: u64,
}

impl RepositionedArchive {
    /// Compression of the original archive.
    pub fn source_kind(&self) -> CompressionKind {
        self.source_kind
    }

    /// Offset of the old end-of-archive marker in the decoded stream; new
    /// entries start here.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Whether the archive is being extended in place, without a scratch
    /// copy.
    pub fn is_in_place(&self) -> bool {
        self.scratch.is_none()
    }

    /// Hand the positioned file to a sink, keeping the scratch path alive.
    pub fn into_parts(self) -> (File, Option<TempPath>) {
        (self.file, self.scratch)
    }
}

/// Decode `archive` into a scratch file created in `scratch_dir` and
/// position it for appending.
pub fn reposition(archive: &Path, scratch_dir: &Path) -> Result<RepositionedArchive> {
    let mut input = File::open(archive)?;
    if input.metadata()?.len() == 0 {
        return Err(OxiTarError::append_window(format!(
            "{} is empty",
            archive.display()
        )));
    }

    let sniffed = detect::sniff_seekable(&mut input, Some(archive))?;
    let mut decoder = Decoder::new(
        PeekReader::new(BufReader::new(input)),
        sniffed.compression,
    )?;

    let mut scratch = NamedTempFile::new_in(scratch_dir)?;
    let decoded = io::copy(&mut decoder, scratch.as_file_mut())?;
    scratch.as_file().sync_all()?;
    // Close the handle and reopen the scratch for reading and writing.
    let scratch = scratch.into_temp_path();
    debug!(
        archive = %archive.display(),
        compression = %sniffed.compression,
        decoded,
        scratch = %scratch.display(),
        "decoded archive into scratch"
    );

    let mut file = OpenOptions::new().read(true).write(true).open(&scratch)?;
    let offset = seek_to_end_marker(&mut file)?;

    Ok(RepositionedArchive {
        file,
        scratch: Some(scratch),
        source_kind: sniffed.compression,
        offset,
    })
}

/// Position an uncompressed archive for appending without copying it.
pub fn reposition_in_place(archive: &Path) -> Result<RepositionedArchive> {
    let mut file = OpenOptions::new().read(true).write(true).open(archive)?;
    if file.metadata()?.len() == 0 {
        return Err(OxiTarError::append_window(format!(
            "{} is empty",
            archive.display()
        )));
    }

    let sniffed = detect::sniff_seekable(&mut file, Some(archive))?;
    if sniffed.compression.is_compressed() {
        return Err(OxiTarError::append_window(format!(
            "{} is {}-compressed and cannot be extended in place",
            archive.display(),
            sniffed.compression
        )));
    }

    let offset = seek_to_end_marker(&mut file)?;
    Ok(RepositionedArchive {
        file,
        scratch: None,
        source_kind: CompressionKind::None,
        offset,
    })
}

/// Verify the trailing end-of-archive marker, truncate it away and leave
/// the file positioned where it started.
///
/// The cut is made at the first zero block after the last entry, so
/// archives padded past the two marker blocks (to a 10240-byte record, say)
/// never hide appended entries behind stale padding. Returns the new end
/// offset.
pub fn seek_to_end_marker(file: &mut File) -> Result<u64> {
    let len = file.metadata()?.len();
    if len < END_OF_ARCHIVE_LEN {
        return Err(OxiTarError::append_window(format!(
            "archive is {len} bytes, shorter than the {END_OF_ARCHIVE_LEN}-byte end marker"
        )));
    }

    file.seek(SeekFrom::Start(len - END_OF_ARCHIVE_LEN))?;
    let mut window = [0u8; END_OF_ARCHIVE_LEN as usize];
    file.read_exact(&mut window)?;
    if window.iter().any(|&b| b != 0) {
        return Err(OxiTarError::append_window("no end-of-archive marker"));
    }

    // Entries running to the end of the file mean the zero window is body
    // data, not a marker.
    let Some(offset) = end_of_entries(file, len)? else {
        return Err(OxiTarError::append_window("no end-of-archive marker"));
    };
    file.set_len(offset)?;
    file.seek(SeekFrom::Start(offset))?;
    debug!(offset, padding = len - offset, "repositioned before end-of-archive marker");
    Ok(offset)
}

/// Walk the headers from the start and return the offset of the first zero
/// block, or `None` if the entries run to the end of the file.
fn end_of_entries(file: &mut File, len: u64) -> Result<Option<u64>> {
    file.seek(SeekFrom::Start(0))?;
    let mut reader = BufReader::new(&mut *file);
    let mut block = [0u8; BLOCK_SIZE];
    let mut pos = 0u64;

    while pos < len && read_block(&mut reader, &mut block)? {
        let Some(header) = TarHeader::from_block(&block)? else {
            return Ok(Some(pos));
        };
        let skip = header.size + padding(header.size);
        reader.seek_relative(skip as i64)?;
        pos += BLOCK_SIZE as u64 + skip;
    }

    Ok(None)
}

/// Unvalidated append description.
#[derive(Debug, Clone, Default)]
pub struct AppendConfig {
    /// The existing archive.
    pub archive: PathBuf,
    /// Destination; defaults to the archive itself.
    pub output: Option<OutputSpec>,
    /// Files to append, in order.
    pub inputs: Vec<PathBuf>,
    /// Output compression name.
    pub format: String,
    /// Directory prefix for appended plain files.
    pub directory: Option<String>,
}

/// A validated append job.
#[derive(Debug, Clone)]
pub struct AppendJob {
    archive: PathBuf,
    output: PathBuf,
    inputs: Vec<PathBuf>,
    output_kind: CompressionKind,
    directory: Option<String>,
}

impl AppendJob {
    /// Validate a configuration without touching the filesystem.
    pub fn from_config(config: AppendConfig) -> Result<Self> {
        let output_kind: CompressionKind = config.format.parse()?;

        let output = match config.output {
            None => config.archive.clone(),
            Some(OutputSpec::Path(path)) => path,
            Some(OutputSpec::Stdout) => {
                return Err(OxiTarError::configuration(
                    "appending needs a file as output, not stdout",
                ));
            }
        };
        if config.inputs.is_empty() {
            return Err(OxiTarError::configuration("nothing to append"));
        }
        if config.inputs.iter().any(|p| job::same_file(p, &output)) {
            return Err(OxiTarError::configuration(format!(
                "output {} is also an input",
                output.display()
            )));
        }

        Ok(Self {
            archive: config.archive,
            output,
            inputs: config.inputs,
            output_kind,
            directory: config.directory.filter(|d| !d.is_empty()),
        })
    }

    /// Reposition the archive, in place when it is uncompressed and is
    /// rewritten as uncompressed onto itself.
    fn reposition(&self) -> Result<RepositionedArchive> {
        let in_place = self.output_kind == CompressionKind::None
            && job::same_file(&self.archive, &self.output)
            && archive_kind(&self.archive)? == CompressionKind::None;

        if in_place {
            reposition_in_place(&self.archive)
        } else {
            reposition(&self.archive, scratch_dir(&self.output))
        }
    }

    /// Destination path.
    pub fn output(&self) -> &Path {
        &self.output
    }

    /// Run the append.
    pub fn run(&self) -> Result<TransferReport> {
        self.run_observed(&mut ())
    }

    /// Run the append, reporting progress to `observer`.
    ///
    /// Every input is opened before the archive is touched. If writing fails
    /// after an in-place reposition, the archive is terminated again at its
    /// old end.
    pub fn run_observed(&self, observer: &mut dyn TransferObserver) -> Result<TransferReport> {
        let mut sources = Vec::with_capacity(self.inputs.len());
        for path in &self.inputs {
            let input = InputSpec::Path(path.clone());
            let opened = job::open_input(&input, JobMode::Add, None, self.directory.as_deref())
                .map_err(|e| e.with_input(input.label()))?;
            sources.extend(opened);
        }

        let archive_label = self.archive.display().to_string();
        let original_perms = fs::metadata(&self.archive)?.permissions();
        let positioned = self
            .reposition()
            .map_err(|e| e.with_input(&archive_label))?;

        let offset = positioned.offset();
        info!(
            archive = %archive_label,
            source = %positioned.source_kind(),
            offset,
            in_place = positioned.is_in_place(),
            "appending"
        );

        let (file, scratch) = positioned.into_parts();
        let written = write_entries(file, sources, self.output_kind, observer);
        let (mut file, report) = match written {
            Ok(written) => written,
            Err(e) => {
                if scratch.is_none() {
                    if let Err(restore) = restore_end_marker(&self.archive, offset) {
                        warn!(
                            archive = %archive_label,
                            error = %restore,
                            "failed to restore end-of-archive marker"
                        );
                    }
                }
                return Err(e);
            }
        };

        match scratch {
            None => {}
            Some(scratch) if self.output_kind == CompressionKind::None => {
                drop(file);
                fs::set_permissions(&scratch, original_perms)?;
                scratch.persist(&self.output).map_err(|e| e.error)?;
            }
            Some(scratch) => {
                // Encode into a second temp file so a failure never leaves
                // a half-written destination.
                file.seek(SeekFrom::Start(0))?;
                let mut encoded = NamedTempFile::new_in(scratch_dir(&self.output))?;
                let mut encoder =
                    Encoder::new(BufWriter::new(encoded.as_file_mut()), self.output_kind);
                io::copy(&mut BufReader::new(&mut file), &mut encoder)?;
                encoder
                    .finish()?
                    .into_inner()
                    .map_err(io::IntoInnerError::into_error)?
                    .sync_all()?;
                drop(file);
                scratch.close()?;
                fs::set_permissions(encoded.path(), original_perms)?;
                encoded.persist(&self.output).map_err(|e| e.error)?;
            }
        }

        info!(
            output = %self.output.display(),
            compression = %self.output_kind,
            entries = report.entries(),
            "append finished"
        );
        Ok(report)
    }
}

/// Write every source into the positioned file and terminate it.
fn write_entries(
    file: File,
    sources: Vec<Box<dyn ArchiveSource>>,
    output_kind: CompressionKind,
    observer: &mut dyn TransferObserver,
) -> Result<(File, TransferReport)> {
    let mut sink = ArchiveSink::new(BufWriter::new(file), CompressionKind::None);
    let mut report = TransferReport::new(output_kind);
    for mut source in sources {
        report
            .inputs
            .push(pipeline::transfer_entries(&mut source, &mut sink, observer)?);
    }
    let file = sink
        .finish()?
        .into_inner()
        .map_err(io::IntoInnerError::into_error)?;
    file.sync_all()?;
    Ok((file, report))
}

/// Cut an archive extended in place back to `offset` and write a fresh end
/// marker there.
fn restore_end_marker(archive: &Path, offset: u64) -> Result<()> {
    let mut file = OpenOptions::new().write(true).open(archive)?;
    file.set_len(offset)?;
    file.seek(SeekFrom::Start(offset))?;
    file.write_all(&[0u8; END_OF_ARCHIVE_LEN as usize])?;
    file.sync_all()?;
    debug!(offset, "restored end-of-archive marker");
    Ok(())
}

fn archive_kind(path: &Path) -> Result<CompressionKind> {
    let mut file = File::open(path)?;
    Ok(detect::sniff_seekable(&mut file, Some(path))?.compression)
}

/// Scratch files live next to the destination so the final rename stays on
/// one filesystem.
fn scratch_dir(output: &Path) -> &Path {
    match output.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}
