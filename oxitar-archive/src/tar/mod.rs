//! TAR block codec.
//!
//! This module encodes and decodes the 512-byte header blocks of a tar
//! stream:
//! - UStar format (POSIX.1-1988), including the name prefix field
//! - PAX extended headers (POSIX.1-2001) for long names and link targets
//! - GNU LongName/LongLink records and base-256 numeric fields on read
//!
//! Entry bodies are not handled here; [`crate::source`] and [`crate::sink`]
//! stream them between headers.

use oxitar_core::error::{OxiTarError, Result};
use oxitar_core::{EntryHeader, EntryType};
use std::collections::HashMap;
use std::io::{self, Read};

/// TAR block size.
pub const BLOCK_SIZE: usize = 512;

/// Length of the end-of-archive marker: two zero blocks.
///
/// [`crate::sink::ArchiveSink::finish`] writes exactly this many zero bytes,
/// and [`crate::append`] seeks back by the same amount to overwrite them.
pub const END_OF_ARCHIVE_LEN: u64 = 2 * BLOCK_SIZE as u64;

/// PAX typeflag for extended header (applies to next file only).
const PAX_HEADER: u8 = b'x';

/// PAX typeflag for global extended header (applies to all subsequent files).
const PAX_GLOBAL_HEADER: u8 = b'g';

/// GNU LongName typeflag.
const GNU_LONGNAME: u8 = b'L';

/// GNU LongLink typeflag.
const GNU_LONGLINK: u8 = b'K';

/// Upper bound for PAX / GNU extension payloads.
const MAX_EXTENSION_LEN: u64 = 1 << 20;

const NAME_LEN: usize = 100;
const PREFIX_LEN: usize = 155;
const OWNER_LEN: usize = 32;

/// Zero bytes needed after `len` body bytes to reach a block boundary.
pub fn padding(len: u64) -> u64 {
    let block = BLOCK_SIZE as u64;
    (block - len % block) % block
}

/// TAR header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TarHeader {
    /// File name, with the ustar prefix already joined.
    pub name: String,
    /// File mode.
    pub mode: u32,
    /// Owner UID.
    pub uid: u64,
    /// Owner GID.
    pub gid: u64,
    /// File size.
    pub size: u64,
    /// Modification time.
    pub mtime: u64,
    /// Type flag.
    pub typeflag: u8,
    /// Link name.
    pub linkname: String,
    /// Owner name.
    pub uname: String,
    /// Group name.
    pub gname: String,
}

impl TarHeader {
    /// Read a TAR header from a block.
    ///
    /// Returns `None` for an all-zero block, which marks the end of the
    /// archive.
    pub fn from_block(block: &[u8; BLOCK_SIZE]) -> Result<Option<Self>> {
        if block.iter().all(|&b| b == 0) {
            return Ok(None);
        }

        Self::verify_checksum(block)?;

        let name = Self::parse_string(&block[0..100]);
        let mode = Self::parse_numeric(&block[100..108])?;
        let uid = Self::parse_numeric(&block[108..116])?;
        let gid = Self::parse_numeric(&block[116..124])?;
        let size = Self::parse_numeric(&block[124..136])?;
        let mtime = Self::parse_numeric(&block[136..148])?;
        let typeflag = block[156];
        let linkname = Self::parse_string(&block[157..257]);

        let ustar = &block[257..262] == b"ustar";
        // Only POSIX ustar uses 345..500 as a name prefix; GNU stores times there.
        let posix = &block[257..263] == b"ustar\0";

        let (uname, gname) = if ustar {
            (
                Self::parse_string(&block[265..297]),
                Self::parse_string(&block[297..329]),
            )
        } else {
            (String::new(), String::new())
        };

        let prefix = if posix {
            Self::parse_string(&block[345..500])
        } else {
            String::new()
        };

        let full_name = if prefix.is_empty() {
            name
        } else {
            format!("{}/{}", prefix, name)
        };

        let mode = u32::try_from(mode)
            .map_err(|_| OxiTarError::invalid_header(format!("mode out of range: {mode:o}")))?;

        Ok(Some(Self {
            name: full_name,
            mode,
            uid,
            gid,
            size,
            mtime,
            typeflag,
            linkname,
            uname,
            gname,
        }))
    }

    /// Check the header checksum, accepting both unsigned and the historic
    /// signed byte sums.
    fn verify_checksum(block: &[u8; BLOCK_SIZE]) -> Result<()> {
        let stored = Self::parse_numeric(&block[148..156])?;

        let mut unsigned = 0u64;
        let mut signed = 0i64;
        for (i, &b) in block.iter().enumerate() {
            let b = if (148..156).contains(&i) { b' ' } else { b };
            unsigned += u64::from(b);
            signed += i64::from(b as i8);
        }

        if stored != unsigned && i64::try_from(stored).ok() != Some(signed) {
            return Err(OxiTarError::invalid_header(format!(
                "checksum mismatch: stored {stored:o}, computed {unsigned:o}"
            )));
        }
        Ok(())
    }

    /// Parse a null-terminated string.
    fn parse_string(data: &[u8]) -> String {
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        String::from_utf8_lossy(&data[..end]).into_owned()
    }

    /// Parse a numeric field: octal text, or GNU base-256 when the high bit
    /// of the first byte is set.
    fn parse_numeric(data: &[u8]) -> Result<u64> {
        if let Some(&first) = data.first() {
            if first & 0x80 != 0 {
                if first & 0x40 != 0 {
                    return Err(OxiTarError::invalid_header("negative base-256 field"));
                }
                let mut value = u64::from(first & 0x3F);
                for &b in &data[1..] {
                    value = value
                        .checked_mul(256)
                        .and_then(|v| v.checked_add(u64::from(b)))
                        .ok_or_else(|| OxiTarError::invalid_header("base-256 field overflow"))?;
                }
                return Ok(value);
            }
        }

        let s = Self::parse_string(data);
        let s = s.trim_matches(|c| c == ' ' || c == '\0');
        if s.is_empty() {
            return Ok(0);
        }
        u64::from_str_radix(s, 8)
            .map_err(|_| OxiTarError::invalid_header(format!("Invalid octal: {}", s)))
    }

    /// Check if this is a PAX extended header.
    pub fn is_pax_header(&self) -> bool {
        self.typeflag == PAX_HEADER
    }

    /// Check if this is a PAX global extended header.
    pub fn is_pax_global_header(&self) -> bool {
        self.typeflag == PAX_GLOBAL_HEADER
    }

    /// Check if this is a GNU LongName header.
    pub fn is_gnu_longname(&self) -> bool {
        self.typeflag == GNU_LONGNAME
    }

    /// Check if this is a GNU LongLink header.
    pub fn is_gnu_longlink(&self) -> bool {
        self.typeflag == GNU_LONGLINK
    }

    /// Check if this header only carries metadata for the next one.
    pub fn is_extension(&self) -> bool {
        self.is_pax_header()
            || self.is_pax_global_header()
            || self.is_gnu_longname()
            || self.is_gnu_longlink()
    }

    /// Apply PAX extended attributes to this header.
    pub fn apply_pax_attrs(&mut self, attrs: &HashMap<String, String>) {
        if let Some(path) = attrs.get("path") {
            self.name = path.clone();
        }
        if let Some(linkpath) = attrs.get("linkpath") {
            self.linkname = linkpath.clone();
        }
        if let Some(size) = attrs.get("size").and_then(|s| s.parse::<u64>().ok()) {
            self.size = size;
        }
        if let Some(mtime) = attrs.get("mtime") {
            // PAX mtime can be fractional; keep whole seconds
            let whole = mtime.split('.').next().unwrap_or("");
            if let Ok(t) = whole.parse::<u64>() {
                self.mtime = t;
            }
        }
        if let Some(uid) = attrs.get("uid").and_then(|s| s.parse::<u64>().ok()) {
            self.uid = uid;
        }
        if let Some(gid) = attrs.get("gid").and_then(|s| s.parse::<u64>().ok()) {
            self.gid = gid;
        }
        if let Some(uname) = attrs.get("uname") {
            self.uname = uname.clone();
        }
        if let Some(gname) = attrs.get("gname") {
            self.gname = gname.clone();
        }
    }

    /// Parse PAX extended header data.
    /// Format: "length key=value\n" repeated
    pub fn parse_pax_data(data: &[u8]) -> HashMap<String, String> {
        let mut attrs = HashMap::new();
        let mut pos = 0;

        while pos < data.len() {
            let space_pos = match data[pos..].iter().position(|&b| b == b' ') {
                Some(p) => pos + p,
                None => break,
            };

            let len_str = String::from_utf8_lossy(&data[pos..space_pos]);
            let record_len: usize = match len_str.trim().parse() {
                Ok(l) => l,
                Err(_) => break,
            };

            let record_end = pos + record_len;
            if record_len == 0 || record_end > data.len() || record_end <= space_pos {
                break;
            }

            let mut value_end = record_end;
            if data.get(value_end - 1) == Some(&b'\n') {
                value_end -= 1;
            }
            let record = &data[space_pos + 1..value_end];

            if let Some(eq_pos) = record.iter().position(|&b| b == b'=') {
                let key = String::from_utf8_lossy(&record[..eq_pos]).into_owned();
                let value = String::from_utf8_lossy(&record[eq_pos + 1..]).into_owned();
                attrs.insert(key, value);
            }

            pos = record_end;
        }

        attrs
    }

    /// Format a single PAX record: "len key=value\n"
    pub fn format_pax_record(key: &str, value: &str) -> String {
        // length counts its own digits, so iterate until it is stable
        let base_len = key.len() + value.len() + 3; // " " + "=" + "\n"
        let mut total_len = base_len + 1;
        loop {
            let expected = base_len + total_len.to_string().len();
            if expected == total_len {
                break;
            }
            total_len = expected;
        }

        format!("{} {}={}\n", total_len, key, value)
    }

    /// Convert to format-agnostic entry metadata.
    pub fn to_entry_header(&self) -> EntryHeader {
        EntryHeader {
            name: self.name.clone(),
            size: self.size,
            mode: self.mode,
            mtime: self.mtime,
            entry_type: EntryType::from_typeflag(self.typeflag),
            link_target: (!self.linkname.is_empty()).then(|| self.linkname.clone()),
            uid: self.uid,
            gid: self.gid,
            uname: self.uname.clone(),
            gname: self.gname.clone(),
        }
    }

    /// Build a header from entry metadata.
    pub fn from_entry_header(entry: &EntryHeader) -> Self {
        Self {
            name: entry.name.clone(),
            mode: entry.mode,
            uid: entry.uid,
            gid: entry.gid,
            size: entry.body_len(),
            mtime: entry.mtime,
            typeflag: entry.entry_type.typeflag(),
            linkname: entry.link_target.clone().unwrap_or_default(),
            uname: entry.uname.clone(),
            gname: entry.gname.clone(),
        }
    }

    /// Split a name into ustar (prefix, name) fields, if it fits.
    fn split_name(name: &str) -> Option<(&str, &str)> {
        if name.len() <= NAME_LEN {
            return Some(("", name));
        }
        name.match_indices('/')
            .map(|(pos, _)| pos)
            .filter(|&pos| pos > 0 && pos <= PREFIX_LEN)
            .find(|&pos| {
                let rest = name.len() - pos - 1;
                rest > 0 && rest <= NAME_LEN
            })
            .map(|pos| (&name[..pos], &name[pos + 1..]))
    }

    /// Convert header to a 512-byte block.
    pub fn to_block(&self) -> Result<[u8; BLOCK_SIZE]> {
        let mut block = [0u8; BLOCK_SIZE];

        let (prefix, name) = Self::split_name(&self.name)
            .ok_or_else(|| OxiTarError::invalid_header("Filename too long for TAR"))?;

        Self::write_string(&mut block[0..100], name);
        Self::write_numeric(&mut block[100..108], u64::from(self.mode));
        Self::write_numeric(&mut block[108..116], self.uid);
        Self::write_numeric(&mut block[116..124], self.gid);
        Self::write_numeric(&mut block[124..136], self.size);
        Self::write_numeric(&mut block[136..148], self.mtime);

        // Checksum is computed over the block with this field as spaces
        block[148..156].copy_from_slice(b"        ");
        block[156] = self.typeflag;
        Self::write_string(&mut block[157..257], &self.linkname);

        block[257..263].copy_from_slice(b"ustar\0");
        block[263..265].copy_from_slice(b"00");
        Self::write_string(&mut block[265..297], &self.uname);
        Self::write_string(&mut block[297..329], &self.gname);

        // Dev major/minor (skip, leave as zeros)

        Self::write_string(&mut block[345..500], prefix);

        let checksum: u32 = block.iter().map(|&b| u32::from(b)).sum();
        let checksum_str = format!("{:06o}\0 ", checksum);
        block[148..156].copy_from_slice(&checksum_str.as_bytes()[..8]);

        Ok(block)
    }

    /// Write a string to a field, NUL-terminated when shorter than the field.
    fn write_string(field: &mut [u8], s: &str) {
        let bytes = s.as_bytes();
        let len = bytes.len().min(field.len());
        field[..len].copy_from_slice(&bytes[..len]);
    }

    /// Write a number as zero-padded octal, or base-256 if it does not fit.
    fn write_numeric(field: &mut [u8], value: u64) {
        let digits = field.len() - 1;
        let s = format!("{:0width$o}", value, width = digits);
        if s.len() <= digits {
            field[..s.len()].copy_from_slice(s.as_bytes());
            field[digits] = 0;
            return;
        }

        field.fill(0);
        let bytes = value.to_be_bytes();
        let n = bytes.len().min(field.len());
        let start = field.len() - n;
        field[start..].copy_from_slice(&bytes[bytes.len() - n..]);
        field[0] |= 0x80;
    }
}

/// The last `max` bytes of `s`, moved forward to a char boundary.
fn tail(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut start = s.len() - max;
    while !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

/// The first `max` bytes of `s`, cut back to a char boundary.
fn head(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Encode the header blocks for one entry.
///
/// A PAX extended header is emitted first when the name, link target or
/// owner names do not fit the ustar fields; the ustar header then carries a
/// truncated copy.
pub fn encode_header(entry: &EntryHeader) -> Result<Vec<u8>> {
    let mut header = TarHeader::from_entry_header(entry);
    let mut pax_data = String::new();

    if TarHeader::split_name(&header.name).is_none() {
        pax_data.push_str(&TarHeader::format_pax_record("path", &header.name));
        header.name = tail(&header.name, NAME_LEN).to_string();
    }
    if header.linkname.len() > NAME_LEN {
        pax_data.push_str(&TarHeader::format_pax_record("linkpath", &header.linkname));
        header.linkname = tail(&header.linkname, NAME_LEN).to_string();
    }
    if header.uname.len() > OWNER_LEN {
        pax_data.push_str(&TarHeader::format_pax_record("uname", &header.uname));
        header.uname = head(&header.uname, OWNER_LEN).to_string();
    }
    if header.gname.len() > OWNER_LEN {
        pax_data.push_str(&TarHeader::format_pax_record("gname", &header.gname));
        header.gname = head(&header.gname, OWNER_LEN).to_string();
    }

    let mut out = Vec::with_capacity(BLOCK_SIZE * 3);
    if !pax_data.is_empty() {
        let pax_header = TarHeader {
            name: "PaxHeader".to_string(),
            mode: 0o644,
            uid: 0,
            gid: 0,
            size: pax_data.len() as u64,
            mtime: entry.mtime,
            typeflag: PAX_HEADER,
            linkname: String::new(),
            uname: String::new(),
            gname: String::new(),
        };
        out.extend_from_slice(&pax_header.to_block()?);
        out.extend_from_slice(pax_data.as_bytes());
        out.resize(out.len() + padding(pax_data.len() as u64) as usize, 0);
    }
    out.extend_from_slice(&header.to_block()?);

    Ok(out)
}

/// Read one header block.
///
/// Returns `false` on a clean end of stream before the block starts; a
/// stream ending part-way through a block is an error.
pub fn read_block<R: Read + ?Sized>(reader: &mut R, block: &mut [u8; BLOCK_SIZE]) -> Result<bool> {
    let mut filled = 0;
    while filled < BLOCK_SIZE {
        match reader.read(&mut block[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    match filled {
        0 => Ok(false),
        BLOCK_SIZE => Ok(true),
        n => Err(OxiTarError::invalid_header(format!(
            "unexpected end of archive: {n} of {BLOCK_SIZE} header bytes"
        ))),
    }
}

/// Read the payload of a PAX or GNU extension record, skipping its padding.
pub fn read_extension_data<R: Read + ?Sized>(reader: &mut R, size: u64) -> Result<Vec<u8>> {
    if size > MAX_EXTENSION_LEN {
        return Err(OxiTarError::invalid_header(format!(
            "extended header too large: {size} bytes"
        )));
    }

    let mut data = vec![0u8; (size + padding(size)) as usize];
    reader.read_exact(&mut data).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            OxiTarError::invalid_header("unexpected end of archive inside extended header")
        }
        _ => e.into(),
    })?;
    data.truncate(size as usize);

    Ok(data)
}
