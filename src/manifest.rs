//! Parser for md5 checksum manifests of raw amplicon files.
//!
//! The filenames are the only carrier of provenance for the raw files, e.g.
//!
//! ```text
//! cea407dac3f3e7b9afd21b1c096619b7  9486_1_16S_AGRF_ACGTGTACCCAA_A810W_S43_L001_R2_001.fastq.gz
//! ```
//!
//! Everything in front of the target marker is the extraction id, the rest
//! is decoded positionally. Anything not matching one of the known shapes is
//! rejected, never guessed.

use std::fs;
use std::path::Path;

use serde::Serialize;

use crate::error::Result;

/// Amplicon targets recognised in filenames, in order of precedence
pub const TARGETS: [&str; 4] = ["16S", "18S", "ITS", "A16S"];

/// Structured information decoded from one manifest line
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileEntry {
    pub md5: String,
    pub filename: String,
    pub extraction_id: String,
    pub target: String,
    pub vendor: String,
    /// Dual indexes are joined with a comma
    pub index: String,
    /// Well or flow cell id
    pub well: String,
    pub sequence: String,
    pub lane: String,
    pub run: String,
}

/// Why a manifest line was not turned into a [`FileEntry`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// Not of the form `<checksum> <filename>`
    Shape,
    /// Checksum is not 32 hex digits
    Checksum(String),
    /// First filename token is not numeric
    NotAnId(String),
    /// None of the [`TARGETS`] occurs in the filename
    NoTarget,
    /// Unexpected number of tokens after the target marker
    Arity(usize),
}

/// Whether a filename token looks like an index read barcode
fn is_barcode(token: &str) -> bool {
    !token.is_empty() && token.chars().all(|c| matches!(c, 'A' | 'C' | 'G' | 'T' | 'N'))
}

/// Split a filename into extraction id and the tokens starting at the target marker
fn split_at_target<'a>(
    parts: &[&'a str],
) -> std::result::Result<(String, Vec<&'a str>), Rejection> {
    let first = parts.first().copied().unwrap_or("");
    if first.parse::<u64>().is_err() {
        return Err(Rejection::NotAnId(first.to_string()));
    }

    for target in TARGETS.iter() {
        if let Some(idx) = parts.iter().position(|p| p == target) {
            return Ok((parts[..idx].join("_"), parts[idx..].to_vec()));
        }
    }
    Err(Rejection::NoTarget)
}

/// Parse a single non-blank manifest line
pub fn parse_line(line: &str) -> std::result::Result<FileEntry, Rejection> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let (md5, filename) = match fields.as_slice() {
        [md5, filename] => (*md5, *filename),
        _ => return Err(Rejection::Shape),
    };
    if md5.len() != 32 || !md5.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(Rejection::Checksum(md5.to_string()));
    }

    let parts: Vec<&str> = filename.split('_').collect();
    let (extraction_id, rest) = split_at_target(&parts)?;

    // 12897_1_16S_AGRF_TTCCTAGGTGAG_A801W_S67_L001_I1
    let (target, vendor, index, well, sequence, lane, run) = match rest.as_slice() {
        [target, vendor, index, well, sequence, lane, run] => {
            (*target, *vendor, index.to_string(), *well, *sequence, *lane, *run)
        }
        [target, vendor, index1, index2, well, sequence, lane, run] if is_barcode(index2) => {
            (*target, *vendor, format!("{},{}", index1, index2), *well, *sequence, *lane, *run)
        }
        // single index with a trailing chunk number, e.g. ..._L001_R2_001.fastq.gz
        [target, vendor, index, well, sequence, lane, run, chunk] => {
            debug!(
                "{}: {} is not a barcode, reading {} as chunk of a single index file",
                filename, well, chunk
            );
            (*target, *vendor, index.to_string(), *well, *sequence, *lane, *run)
        }
        _ => return Err(Rejection::Arity(rest.len())),
    };

    Ok(FileEntry {
        md5: md5.to_string(),
        filename: filename.to_string(),
        extraction_id,
        target: target.to_string(),
        vendor: vendor.to_string(),
        index,
        well: well.to_string(),
        sequence: sequence.to_string(),
        lane: lane.to_string(),
        run: run.to_string(),
    })
}

/// Parse a whole manifest. Blank lines are ignored, bad lines logged and skipped.
pub fn parse_manifest(content: &str, source: &Path) -> Vec<FileEntry> {
    let mut entries = Vec::new();
    for line in content.lines().map(str::trim).filter(|l| !l.is_empty()) {
        match parse_line(line) {
            Ok(entry) => entries.push(entry),
            Err(Rejection::NotAnId(token)) => {
                error!("{}: {} is not a BPA ID, ignoring line {}", source.display(), token, line)
            }
            Err(Rejection::Arity(n)) => error!(
                "{}: ignoring line {} with missing data ({} fields after target)",
                source.display(),
                line,
                n
            ),
            Err(r) => error!("{}: ignoring line {}: {:?}", source.display(), line, r),
        }
    }
    entries
}

pub fn read_manifest(path: &Path) -> Result<Vec<FileEntry>> {
    let content = fs::read_to_string(path)?;
    Ok(parse_manifest(&content, path))
}
