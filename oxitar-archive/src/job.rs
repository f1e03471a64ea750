//! Merge and add jobs.
//!
//! A [`JobConfig`] names the endpoints and formats as plain strings and
//! paths. [`ArchiveJob::from_config`] validates all of it before anything is
//! opened, then [`ArchiveJob::run`] creates the output and streams every
//! input into it, one input at a time.

use crate::detect::{self, PeekReader};
use crate::pipeline::{self, TransferObserver, TransferReport};
use crate::sink::ArchiveSink;
use crate::source::{ArchiveSource, PlainFileSource, TarSource};
use oxitar_core::CompressionKind;
use oxitar_core::error::{OxiTarError, Result};
use std::fmt;
use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Where entries come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSpec {
    /// Standard input, read as an archive.
    Stdin,
    /// A file on disk.
    Path(PathBuf),
}

impl InputSpec {
    /// Parse a command-line operand; `-` is standard input.
    pub fn parse(arg: &str) -> Self {
        match arg {
            "-" => Self::Stdin,
            path => Self::Path(PathBuf::from(path)),
        }
    }

    /// Label used in logs and errors.
    pub fn label(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for InputSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdin => write!(f, "stdin"),
            Self::Path(p) => write!(f, "{}", p.display()),
        }
    }
}

/// Where the archive goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSpec {
    /// Standard output.
    Stdout,
    /// A file, created or truncated.
    Path(PathBuf),
}

impl OutputSpec {
    /// Parse a command-line value; `-` is standard output.
    pub fn parse(arg: &str) -> Result<Self> {
        match arg {
            "" => Err(OxiTarError::configuration("missing output file")),
            "-" => Ok(Self::Stdout),
            path => Ok(Self::Path(PathBuf::from(path))),
        }
    }
}

impl fmt::Display for OutputSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Path(p) => write!(f, "{}", p.display()),
        }
    }
}

/// How path inputs are interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum JobMode {
    /// Every input is an archive whose entries are copied.
    #[default]
    Merge,
    /// Path inputs are sniffed: archives are merged, anything else is
    /// stored as a single entry.
    Add,
}

/// Unvalidated job description.
#[derive(Debug, Clone)]
pub struct JobConfig {
    /// Inputs, in merge order.
    pub inputs: Vec<InputSpec>,
    /// Output endpoint.
    pub output: OutputSpec,
    /// Output compression name: `xz`, `gzip` or `none`.
    pub format: String,
    /// Compression of stdin, skipping detection. Named files are always
    /// sniffed.
    pub input_format: Option<String>,
    /// Directory prefix for plain files stored by [`JobMode::Add`].
    pub directory: Option<String>,
    /// Job mode.
    pub mode: JobMode,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            inputs: Vec::new(),
            output: OutputSpec::Stdout,
            format: CompressionKind::default().name().to_string(),
            input_format: None,
            directory: None,
            mode: JobMode::Merge,
        }
    }
}

/// A validated merge or add job.
#[derive(Debug, Clone)]
pub struct ArchiveJob {
    inputs: Vec<InputSpec>,
    output: OutputSpec,
    output_kind: CompressionKind,
    input_kind: Option<CompressionKind>,
    directory: Option<String>,
    mode: JobMode,
}

impl ArchiveJob {
    /// Validate a configuration.
    ///
    /// Nothing is opened or created here, so a rejected configuration leaves
    /// the filesystem untouched.
    pub fn from_config(config: JobConfig) -> Result<Self> {
        let output_kind: CompressionKind = config.format.parse()?;
        let input_kind = config
            .input_format
            .as_deref()
            .map(str::parse::<CompressionKind>)
            .transpose()?;

        if config.inputs.is_empty() {
            return Err(OxiTarError::configuration("no inputs given"));
        }

        if let OutputSpec::Path(out) = &config.output {
            for input in &config.inputs {
                if let InputSpec::Path(path) = input {
                    if same_file(path, out) {
                        return Err(OxiTarError::configuration(format!(
                            "output {} is also an input",
                            out.display()
                        )));
                    }
                }
            }
        }

        Ok(Self {
            inputs: config.inputs,
            output: config.output,
            output_kind,
            input_kind,
            directory: config.directory.filter(|d| !d.is_empty()),
            mode: config.mode,
        })
    }

    /// Output compression.
    pub fn output_kind(&self) -> CompressionKind {
        self.output_kind
    }

    /// Output endpoint.
    pub fn output(&self) -> &OutputSpec {
        &self.output
    }

    /// Run the job.
    pub fn run(&self) -> Result<TransferReport> {
        self.run_observed(&mut ())
    }

    /// Run the job, reporting progress to `observer`.
    pub fn run_observed(&self, observer: &mut dyn TransferObserver) -> Result<TransferReport> {
        let report = match &self.output {
            OutputSpec::Stdout => {
                let stdout = BufWriter::new(io::stdout().lock());
                let (mut out, report) = self.write_to(stdout, observer)?;
                out.flush()?;
                report
            }
            OutputSpec::Path(path) => {
                let file = File::create(path)
                    .map_err(|e| OxiTarError::from(e).with_input(path.display().to_string()))?;
                let (out, report) = self.write_to(BufWriter::new(file), observer)?;
                let file = out.into_inner().map_err(io::IntoInnerError::into_error)?;
                file.sync_all()?;
                report
            }
        };

        info!(
            output = %self.output,
            entries = report.entries(),
            bytes = report.bytes(),
            "job finished"
        );
        Ok(report)
    }

    /// Compression forced on `input`. Only stdin takes the input format;
    /// named files are always sniffed.
    fn input_hint(&self, input: &InputSpec) -> Option<CompressionKind> {
        match input {
            InputSpec::Stdin => self.input_kind,
            InputSpec::Path(_) => None,
        }
    }

    /// Stream every input into `dest` and finish the archive.
    pub fn write_to<W: Write>(
        &self,
        dest: W,
        observer: &mut dyn TransferObserver,
    ) -> Result<(W, TransferReport)> {
        let mut sink = ArchiveSink::new(dest, self.output_kind);
        let mut report = TransferReport::new(self.output_kind);

        for input in &self.inputs {
            let opened = open_input(
                input,
                self.mode,
                self.input_hint(input),
                self.directory.as_deref(),
            )
                .map_err(|e| e.with_input(input.label()))?;
            let Some(mut source) = opened else {
                continue;
            };
            report
                .inputs
                .push(pipeline::transfer_entries(&mut source, &mut sink, observer)?);
        }

        Ok((sink.finish()?, report))
    }
}

/// Open one input as an entry source.
///
/// Returns `None` for an empty standard input, which contributes nothing.
pub fn open_input(
    input: &InputSpec,
    mode: JobMode,
    hint: Option<CompressionKind>,
    directory: Option<&str>,
) -> Result<Option<Box<dyn ArchiveSource>>> {
    match input {
        InputSpec::Stdin => {
            let mut reader = PeekReader::new(io::stdin().lock());
            if reader.peek(1).map_err(OxiTarError::Sniff)?.is_empty() {
                warn!("standard input is empty, skipping");
                return Ok(None);
            }
            let source = TarSource::from_peek(reader, "stdin", hint, None)?;
            Ok(Some(Box::new(source)))
        }
        InputSpec::Path(path) => match mode {
            JobMode::Merge => Ok(Some(Box::new(TarSource::open(path, hint)?))),
            JobMode::Add => open_added(path, directory).map(Some),
        },
    }
}

/// Open a file for adding: nested archives are merged, other files are
/// stored as one entry.
fn open_added(path: &Path, directory: Option<&str>) -> Result<Box<dyn ArchiveSource>> {
    let mut file = File::open(path)?;
    let sniffed = detect::sniff_seekable(&mut file, Some(path))?;

    if sniffed.content.is_archive(Some(path)) {
        let source = TarSource::from_file(file, path, Some(sniffed.compression))?;
        Ok(Box::new(source))
    } else {
        Ok(Box::new(PlainFileSource::from_file(file, path, directory)?))
    }
}

/// Whether two paths name the same existing file.
pub fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}
