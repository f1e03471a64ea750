//! Add command implementation.

use crate::GlobalOpts;
use crate::utils::{CliObserver, print_report, stdin_is_piped};
use oxitar_archive::job::{ArchiveJob, InputSpec, JobConfig, JobMode, OutputSpec};
use std::path::PathBuf;

/// Add files (plain or nested archives), then `--input` or piped stdin.
pub fn cmd_add(
    files: &[PathBuf],
    input: Option<PathBuf>,
    output: &str,
    format: &str,
    input_format: Option<String>,
    directory: Option<String>,
    opts: GlobalOpts,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut inputs: Vec<InputSpec> = files.iter().cloned().map(InputSpec::Path).collect();
    match input {
        Some(path) => inputs.push(InputSpec::Path(path)),
        None if stdin_is_piped() => inputs.push(InputSpec::Stdin),
        None => {}
    }

    let job = ArchiveJob::from_config(JobConfig {
        inputs,
        output: OutputSpec::parse(output)?,
        format: format.to_string(),
        input_format,
        directory,
        mode: JobMode::Add,
    })?;

    let mut observer = CliObserver::new(opts);
    let report = job.run_observed(&mut observer);
    observer.finish();

    print_report(&report?, opts.json)?;
    Ok(())
}
