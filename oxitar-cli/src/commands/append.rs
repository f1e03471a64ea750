//! Append command implementation.

use crate::GlobalOpts;
use crate::utils::{CliObserver, print_report};
use oxitar_archive::append::{AppendConfig, AppendJob};
use oxitar_archive::job::OutputSpec;
use std::path::PathBuf;

/// Append files to an existing archive, writing to `output` or back to the
/// archive itself.
pub fn cmd_append(
    files: Vec<PathBuf>,
    input: PathBuf,
    output: Option<String>,
    format: &str,
    directory: Option<String>,
    opts: GlobalOpts,
) -> Result<(), Box<dyn std::error::Error>> {
    let output = output.as_deref().map(OutputSpec::parse).transpose()?;

    let job = AppendJob::from_config(AppendConfig {
        archive: input,
        output,
        inputs: files,
        format: format.to_string(),
        directory,
    })?;

    let mut observer = CliObserver::new(opts);
    let report = job.run_observed(&mut observer);
    observer.finish();

    print_report(&report?, opts.json)?;
    Ok(())
}
