//! Merge command implementation.

use crate::GlobalOpts;
use crate::utils::{CliObserver, print_report, stdin_is_piped};
use oxitar_archive::job::{ArchiveJob, InputSpec, JobConfig, JobMode, OutputSpec};
use oxitar_core::CompressionKind;

/// Merge archives: piped stdin first, then each file in order.
pub fn cmd_merge(
    files: &[String],
    output: &str,
    format: &str,
    no_compress: bool,
    input_format: Option<String>,
    opts: GlobalOpts,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut inputs: Vec<InputSpec> = files.iter().map(|f| InputSpec::parse(f)).collect();
    if !inputs.contains(&InputSpec::Stdin) && stdin_is_piped() {
        inputs.insert(0, InputSpec::Stdin);
    }

    let format = if no_compress {
        CompressionKind::None.name().to_string()
    } else {
        format.to_string()
    };

    let job = ArchiveJob::from_config(JobConfig {
        inputs,
        output: OutputSpec::parse(output)?,
        format,
        input_format,
        directory: None,
        mode: JobMode::Merge,
    })?;

    let mut observer = CliObserver::new(opts);
    let report = job.run_observed(&mut observer);
    observer.finish();

    print_report(&report?, opts.json)?;
    Ok(())
}
