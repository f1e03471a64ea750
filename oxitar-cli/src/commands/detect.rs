//! Detect command implementation.

use oxitar_archive::detect;
use serde::Serialize;
use std::fs::File;
use std::path::Path;

/// JSON output for the detect command.
#[derive(Debug, Serialize)]
struct DetectJson {
    file: String,
    content: String,
    mime_type: &'static str,
    compression: &'static str,
    archive: bool,
}

pub fn cmd_detect(file: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut f = File::open(file)?;
    let sniffed = detect::sniff_seekable(&mut f, Some(file))?;
    let archive = sniffed.content.is_archive(Some(file));

    if json {
        let out = DetectJson {
            file: file.display().to_string(),
            content: sniffed.content.to_string(),
            mime_type: sniffed.content.mime_type(),
            compression: sniffed.compression.name(),
            archive,
        };
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    println!("File: {}", file.display());
    println!("Content: {}", sniffed.content);
    println!("MIME type: {}", sniffed.content.mime_type());
    println!("Compression: {}", sniffed.compression);

    if archive {
        println!("Type: Archive (entries are merged)");
    } else {
        println!("Type: Plain file (stored as one entry)");
    }

    Ok(())
}
