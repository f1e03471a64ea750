use oxitar_archive::job::{ArchiveJob, InputSpec, JobConfig, JobMode, OutputSpec};
use oxitar_archive::{AppendConfig, AppendJob, ArchiveSink, ArchiveSource, TarSource};
use oxitar_core::CompressionKind;
use std::error::Error;
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};

type TestResult = Result<(), Box<dyn Error>>;

fn write_archive(path: &Path, kind: CompressionKind, files: &[(&str, &str)]) -> TestResult {
    let mut sink = ArchiveSink::new(File::create(path)?, kind);
    for (name, data) in files {
        sink.add_file(name, data.as_bytes())?;
    }
    sink.finish()?;
    Ok(())
}

fn read_entries(path: &Path) -> Result<Vec<(String, String)>, Box<dyn Error>> {
    let mut source = TarSource::open(path, None)?;
    let mut entries = Vec::new();
    while let Some(mut entry) = source.next_entry()? {
        let mut body = String::new();
        entry.body().read_to_string(&mut body)?;
        entries.push((entry.header().name.clone(), body));
    }
    Ok(entries)
}

fn pairs(items: &[(&str, &str)]) -> Vec<(String, String)> {
    items
        .iter()
        .map(|(n, b)| (n.to_string(), b.to_string()))
        .collect()
}

fn merge_config(inputs: &[PathBuf], output: &Path, format: &str) -> JobConfig {
    JobConfig {
        inputs: inputs.iter().cloned().map(InputSpec::Path).collect(),
        output: OutputSpec::Path(output.to_path_buf()),
        format: format.to_string(),
        ..JobConfig::default()
    }
}

#[test]
fn test_merge_gzip_and_plain_into_gzip() -> TestResult {
    let dir = tempfile::tempdir()?;
    let first = dir.path().join("first.tar.gz");
    let second = dir.path().join("second.tar");
    let out = dir.path().join("merged.tar.gz");
    write_archive(&first, CompressionKind::Gzip, &[("a.txt", "A")])?;
    write_archive(&second, CompressionKind::None, &[("b.txt", "B")])?;

    let job = ArchiveJob::from_config(merge_config(&[first, second], &out, "gzip"))?;
    let report = job.run()?;
    eprintln!("merged {} entries", report.entries());

    let data = fs::read(&out)?;
    assert_eq!(&data[..2], &[0x1F, 0x8B]);
    assert_eq!(read_entries(&out)?, pairs(&[("a.txt", "A"), ("b.txt", "B")]));
    assert_eq!(report.inputs.len(), 2);
    Ok(())
}

#[test]
fn test_merge_keeps_duplicates_in_order() -> TestResult {
    let dir = tempfile::tempdir()?;
    let inputs: Vec<PathBuf> = (0..3).map(|i| dir.path().join(format!("{i}.tar"))).collect();
    write_archive(&inputs[0], CompressionKind::Xz, &[("same", "0"), ("x", "0")])?;
    write_archive(&inputs[1], CompressionKind::None, &[])?;
    write_archive(&inputs[2], CompressionKind::Gzip, &[("same", "2")])?;
    let out = dir.path().join("out.tar");

    ArchiveJob::from_config(merge_config(&inputs, &out, "none"))?.run()?;
    assert_eq!(
        read_entries(&out)?,
        pairs(&[("same", "0"), ("x", "0"), ("same", "2")])
    );
    Ok(())
}

#[test]
fn test_append_with_xz_output() -> TestResult {
    let dir = tempfile::tempdir()?;
    let archive = dir.path().join("base.tar");
    let c = dir.path().join("c.txt");
    let out = dir.path().join("out.tar.xz");
    write_archive(&archive, CompressionKind::None, &[("a.txt", "A"), ("b.txt", "B")])?;
    fs::write(&c, "C")?;

    let job = AppendJob::from_config(AppendConfig {
        archive: archive.clone(),
        output: Some(OutputSpec::Path(out.clone())),
        inputs: vec![c],
        format: "xz".to_string(),
        directory: None,
    })?;
    let report = job.run()?;
    assert_eq!(report.entries(), 1);

    let data = fs::read(&out)?;
    assert_eq!(&data[..6], &[0xFD, b'7', b'z', b'X', b'Z', 0x00]);
    assert_eq!(
        read_entries(&out)?,
        pairs(&[("a.txt", "A"), ("b.txt", "B"), ("c.txt", "C")])
    );
    Ok(())
}

#[test]
fn test_append_twice_keeps_single_marker() -> TestResult {
    let dir = tempfile::tempdir()?;
    let archive = dir.path().join("grow.tar");
    write_archive(&archive, CompressionKind::None, &[("0.txt", "0")])?;

    for i in 1..=3 {
        let file = dir.path().join(format!("{i}.txt"));
        fs::write(&file, i.to_string())?;
        AppendJob::from_config(AppendConfig {
            archive: archive.clone(),
            inputs: vec![file],
            format: "none".to_string(),
            ..AppendConfig::default()
        })?
        .run()?;
    }

    // Four single-block files, then one end marker.
    let data = fs::read(&archive)?;
    assert_eq!(data.len(), 8 * 512 + 1024);
    assert_eq!(
        read_entries(&archive)?,
        pairs(&[("0.txt", "0"), ("1.txt", "1"), ("2.txt", "2"), ("3.txt", "3")])
    );
    Ok(())
}

#[test]
fn test_unsupported_format_leaves_destination_absent() -> TestResult {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("in.tar");
    let out = dir.path().join("never.tar");
    write_archive(&input, CompressionKind::None, &[("a.txt", "A")])?;

    let err = ArchiveJob::from_config(merge_config(&[input], &out, "unsupported")).unwrap_err();
    assert!(err.is_configuration());
    assert!(!out.exists());

    let err = AppendJob::from_config(AppendConfig {
        archive: dir.path().join("in.tar"),
        output: Some(OutputSpec::Path(out.clone())),
        inputs: vec![dir.path().join("in.tar")],
        format: "unsupported".to_string(),
        directory: None,
    })
    .unwrap_err();
    assert!(err.is_configuration());
    assert!(!out.exists());
    Ok(())
}

#[test]
fn test_add_mixes_plain_files_and_archives() -> TestResult {
    let dir = tempfile::tempdir()?;
    let plain = dir.path().join("readme.md");
    let nested = dir.path().join("nested.tar.xz");
    let out = dir.path().join("out.tar.gz");
    fs::write(&plain, "# readme")?;
    write_archive(&nested, CompressionKind::Xz, &[("n1", "1"), ("n2", "2")])?;

    let job = ArchiveJob::from_config(JobConfig {
        inputs: vec![InputSpec::Path(nested), InputSpec::Path(plain)],
        output: OutputSpec::Path(out.clone()),
        format: "gzip".to_string(),
        directory: Some("pkg".to_string()),
        mode: JobMode::Add,
        ..JobConfig::default()
    })?;
    job.run()?;

    assert_eq!(
        read_entries(&out)?,
        pairs(&[("n1", "1"), ("n2", "2"), ("pkg/readme.md", "# readme")])
    );
    Ok(())
}

#[test]
fn test_failed_merge_reports_input() -> TestResult {
    let dir = tempfile::tempdir()?;
    let good = dir.path().join("good.tar");
    let bad = dir.path().join("bad.tar.gz");
    let out = dir.path().join("out.tar");
    write_archive(&good, CompressionKind::None, &[("a.txt", "A")])?;
    fs::write(&bad, b"\x1f\x8bthis is not really gzip")?;

    let err = ArchiveJob::from_config(merge_config(&[good, bad.clone()], &out, "none"))?
        .run()
        .unwrap_err();
    let message = err.to_string();
    eprintln!("{message}");
    assert!(message.starts_with(&format!("failed to merge {}:", bad.display())));
    Ok(())
}
