//! OxiTar CLI - tar archive composer
//!
//! Merges tar archives, adds files to them and appends to existing ones,
//! reading and writing raw, gzip and xz framed streams.

mod commands;
mod utils;

use clap::{Args, Parser, Subcommand};
use commands::{cmd_add, cmd_append, cmd_detect, cmd_merge};
use std::io::IsTerminal;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter.
const LOG_ENV: &str = "OXITAR_LOG";

#[derive(Parser)]
#[command(name = "oxitar")]
#[command(author, version, about = "Tar archive composer")]
#[command(long_about = "
OxiTar concatenates tar streams without unpacking them.
Supported compression: none, gzip, xz (detected automatically on input)

Examples:
  oxitar merge a.tar b.tar.gz -o all.tar.xz
  cat a.tar | oxitar merge b.tar -f gzip > all.tar.gz
  oxitar add notes.txt nested.tar.xz -i base.tar -o out.tar.xz -d docs
  oxitar append c.txt -i existing.tar.xz
  oxitar detect mystery.bin
")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalOpts,
}

/// Flags accepted by every command.
#[derive(Args, Debug, Clone, Copy)]
pub struct GlobalOpts {
    /// List each entry on stderr and log progress
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Show a spinner on stderr
    #[arg(long, global = true)]
    pub progress: bool,

    /// Print the transfer report as JSON on stderr
    #[arg(long, global = true)]
    pub json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Merge several tar archives into one
    #[command(alias = "m")]
    Merge {
        /// Archives to merge, in order ("-" for stdin)
        files: Vec<String>,

        /// Output file ("-" for stdout)
        #[arg(short, long, default_value = "-")]
        output: String,

        /// Output compression (xz, gzip, none)
        #[arg(short, long, default_value = "xz")]
        format: String,

        /// Write an uncompressed archive, ignoring --format
        #[arg(long)]
        no_compress: bool,

        /// Compression of stdin, skipping detection (xz, gzip, none)
        #[arg(short = 'l', long = "input-format")]
        input_format: Option<String>,
    },

    /// Add files and nested archives to a new archive
    #[command(alias = "a")]
    Add {
        /// Files to add; archives are merged, other files stored as entries
        files: Vec<PathBuf>,

        /// Archive added after the files (defaults to stdin when piped)
        #[arg(short, long)]
        input: Option<PathBuf>,

        /// Output file ("-" for stdout)
        #[arg(short, long, default_value = "-")]
        output: String,

        /// Output compression (xz, gzip, none)
        #[arg(short, long, default_value = "xz")]
        format: String,

        /// Compression of stdin, skipping detection (xz, gzip, none)
        #[arg(short = 'l', long = "input-format")]
        input_format: Option<String>,

        /// Directory prefix for stored files
        #[arg(short, long)]
        directory: Option<String>,
    },

    /// Append files to an existing archive
    Append {
        /// Files to append
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// The existing archive
        #[arg(short, long)]
        input: PathBuf,

        /// Output file (defaults to the input archive)
        #[arg(short, long)]
        output: Option<String>,

        /// Output compression (xz, gzip, none)
        #[arg(short, long, default_value = "xz")]
        format: String,

        /// Directory prefix for appended files
        #[arg(short, long)]
        directory: Option<String>,
    },

    /// Detect the content type and compression of a file
    Detect {
        /// File to inspect
        file: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let default = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(default));

    // stdout may carry the archive, so logs always go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false)
        .init();
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let result = match cli.command {
        Commands::Merge {
            files,
            output,
            format,
            no_compress,
            input_format,
        } => cmd_merge(
            &files,
            &output,
            &format,
            no_compress,
            input_format,
            cli.global,
        ),
        Commands::Add {
            files,
            input,
            output,
            format,
            input_format,
            directory,
        } => cmd_add(
            &files,
            input,
            &output,
            &format,
            input_format,
            directory,
            cli.global,
        ),
        Commands::Append {
            files,
            input,
            output,
            format,
            directory,
        } => cmd_append(files, input, output, &format, directory, cli.global),
        Commands::Detect { file } => cmd_detect(&file, cli.global.json),
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
