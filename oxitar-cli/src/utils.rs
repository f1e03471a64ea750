//! Utility functions for the CLI.

use crate::GlobalOpts;
use indicatif::{ProgressBar, ProgressStyle};
use oxitar_archive::pipeline::{InputReport, TransferObserver, TransferReport};
use oxitar_core::EntryHeader;
use std::io::IsTerminal;
use std::time::Duration;

/// Create a spinner with standard styling, drawn on stderr.
pub fn create_spinner(enable: bool) -> ProgressBar {
    if !enable {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner} [{elapsed_precise}] {pos} entries {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

/// Reports transfer progress on stderr.
pub struct CliObserver {
    progress: ProgressBar,
    verbose: bool,
}

impl CliObserver {
    /// Build an observer from the global flags.
    pub fn new(opts: GlobalOpts) -> Self {
        Self {
            progress: create_spinner(opts.progress),
            verbose: opts.verbose,
        }
    }

    /// Clear the spinner.
    pub fn finish(&self) {
        self.progress.finish_and_clear();
    }
}

impl TransferObserver for CliObserver {
    fn source_started(&mut self, label: &str) {
        self.progress.set_message(label.to_string());
    }

    fn entry(&mut self, _label: &str, header: &EntryHeader) {
        self.progress.inc(1);
        if self.verbose {
            self.progress
                .suspend(|| eprintln!("{:>10}  {}", header.size, header.name));
        }
    }

    fn source_finished(&mut self, report: &InputReport) {
        if self.verbose {
            self.progress.suspend(|| {
                eprintln!(
                    "{}: {} entries, {} bytes",
                    report.input, report.entries, report.bytes
                )
            });
        }
    }
}

/// Print the transfer report as JSON on stderr when asked to.
pub fn print_report(report: &TransferReport, json: bool) -> Result<(), serde_json::Error> {
    if json {
        eprintln!("{}", serde_json::to_string_pretty(report)?);
    }
    Ok(())
}

/// Whether stdin carries piped data rather than a terminal.
pub fn stdin_is_piped() -> bool {
    !std::io::stdin().is_terminal()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hidden_spinner() {
        let pb = create_spinner(false);
        assert!(pb.is_hidden());
    }

    #[test]
    fn test_observer_counts_entries() {
        let mut observer = CliObserver::new(GlobalOpts {
            verbose: false,
            progress: false,
            json: false,
        });
        observer.source_started("a.tar");
        observer.entry("a.tar", &EntryHeader::file("x", 1));
        observer.entry("a.tar", &EntryHeader::file("y", 2));
        assert_eq!(observer.progress.position(), 2);
        observer.finish();
    }
}
