//! Metadata extraction from dataset files.
//!
//! Extracted metadata rides along in the scan-result patch as
//! `versionMetadata`. Extraction is best effort: anything that cannot be read
//! or parsed yields no metadata rather than failing the dataset.
//!
//! FITS files may be stored gzipped (`.fits.gz`); they are decompressed on
//! the fly while reading the header.

use catcrawl_catalog::Metadata;
use flate2::read::GzDecoder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;
use tracing::debug;

/// Pulls structured metadata out of a file.
pub trait MetadataExtractor: Send + Sync {
    /// Metadata for the file at `path`, or `None` when there is nothing to report.
    fn extract(&self, path: &Path) -> Option<Metadata>;

    fn name(&self) -> &'static str;
}

/// Extractor selection in configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractorKind {
    #[default]
    None,
    Fits,
}

impl ExtractorKind {
    pub fn build(self) -> Box<dyn MetadataExtractor> {
        match self {
            Self::None => Box::new(NoMetadata),
            Self::Fits => Box::new(FitsHeaderExtractor::default()),
        }
    }
}

/// Never produces metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMetadata;

impl MetadataExtractor for NoMetadata {
    fn extract(&self, _path: &Path) -> Option<Metadata> {
        None
    }

    fn name(&self) -> &'static str {
        "none"
    }
}

// ============================================================================
// FITS
// ============================================================================

const CARD_LEN: usize = 80;
const BLOCK_LEN: usize = 2880;
const FITS_MAGIC: &[u8] = b"SIMPLE  =";

/// Keywords that carry free text rather than a value.
const COMMENTARY_KEYWORDS: &[&str] = &["COMMENT", "HISTORY", ""];

/// Reads the primary header of FITS files into keyword/value pairs.
#[derive(Debug, Clone, Copy)]
pub struct FitsHeaderExtractor {
    /// Upper bound on header blocks read before giving up on finding `END`
    max_blocks: usize,
}

impl Default for FitsHeaderExtractor {
    fn default() -> Self {
        Self { max_blocks: 64 }
    }
}

impl FitsHeaderExtractor {
    pub fn with_max_blocks(max_blocks: usize) -> Self {
        Self {
            max_blocks: max_blocks.max(1),
        }
    }

    fn read_header(&self, path: &Path) -> io::Result<Option<Metadata>> {
        let Some(mut file) = open_fits(path)? else {
            return Ok(None);
        };
        let mut block = vec![0u8; BLOCK_LEN];
        let mut metadata = Metadata::new();

        for index in 0..self.max_blocks {
            let filled = read_full(&mut file, &mut block)?;
            if index == 0 && !block[..filled].starts_with(FITS_MAGIC) {
                return Ok(None);
            }

            for card in block[..filled].chunks_exact(CARD_LEN) {
                match parse_card(card) {
                    Card::End => return Ok(Some(metadata)),
                    Card::Value(keyword, value) => {
                        metadata.entry(keyword).or_insert(value);
                    }
                    Card::Other => {}
                }
            }

            if filled < BLOCK_LEN {
                break;
            }
        }

        // No END card: truncated or not really FITS
        Ok(None)
    }
}

impl MetadataExtractor for FitsHeaderExtractor {
    fn extract(&self, path: &Path) -> Option<Metadata> {
        if !has_fits_extension(path) {
            return None;
        }
        match self.read_header(path) {
            Ok(metadata) => metadata.filter(|md| !md.is_empty()),
            Err(e) => {
                debug!(path = %path.display(), error = %e, "Could not read FITS header");
                None
            }
        }
    }

    fn name(&self) -> &'static str {
        "fits"
    }
}

/// How a FITS file is stored on disk, judged by its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FitsEncoding {
    /// `*.fits`
    Plain,
    /// `*.fits.gz`
    Gzip,
}

/// Encoding implied by the file name, or `None` for non-FITS names.
pub fn fits_encoding(path: &Path) -> Option<FitsEncoding> {
    let name = path.file_name()?.to_str()?;
    if name.strip_suffix(".fits").is_some_and(|stem| !stem.is_empty()) {
        Some(FitsEncoding::Plain)
    } else if name.strip_suffix(".fits.gz").is_some_and(|stem| !stem.is_empty()) {
        Some(FitsEncoding::Gzip)
    } else {
        None
    }
}

/// Whether `path` ends in `.fits` or `.fits.gz`.
pub fn has_fits_extension(path: &Path) -> bool {
    fits_encoding(path).is_some()
}

/// Reader over the decoded FITS bytes, or `None` for non-FITS names.
fn open_fits(path: &Path) -> io::Result<Option<Box<dyn Read>>> {
    let reader: Box<dyn Read> = match fits_encoding(path) {
        None => return Ok(None),
        Some(FitsEncoding::Plain) => Box::new(File::open(path)?),
        Some(FitsEncoding::Gzip) => Box::new(GzDecoder::new(File::open(path)?)),
    };
    Ok(Some(reader))
}

/// Whether `path` has a FITS extension and its (decompressed) bytes start
/// with the FITS magic.
pub fn is_fits_file(path: &Path) -> bool {
    let mut magic = [0u8; FITS_MAGIC.len()];
    match open_fits(path) {
        Ok(Some(mut reader)) => match read_full(&mut reader, &mut magic) {
            Ok(n) => n == magic.len() && magic == FITS_MAGIC,
            Err(_) => false,
        },
        _ => false,
    }
}

fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[derive(Debug, PartialEq)]
enum Card {
    End,
    Value(String, Value),
    Other,
}

fn parse_card(card: &[u8]) -> Card {
    let text = String::from_utf8_lossy(card);
    let keyword = text.get(..8).unwrap_or(&*text).trim_end();

    if keyword == "END" {
        return Card::End;
    }
    if COMMENTARY_KEYWORDS.contains(&keyword) || text.get(8..10) != Some("= ") {
        return Card::Other;
    }

    match parse_value(text.get(10..).unwrap_or("")) {
        Some(value) => Card::Value(keyword.to_string(), value),
        None => Card::Other,
    }
}

fn parse_value(field: &str) -> Option<Value> {
    let field = field.trim_start();

    if let Some(rest) = field.strip_prefix('\'') {
        return parse_string(rest).map(Value::String);
    }

    let raw = field.split('/').next().unwrap_or("").trim();
    match raw {
        "" => None,
        "T" => Some(Value::Bool(true)),
        "F" => Some(Value::Bool(false)),
        _ => {
            if let Ok(int) = raw.parse::<i64>() {
                return Some(Value::from(int));
            }
            // Fortran-style exponents use D
            raw.replace(['D', 'd'], "E")
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
        }
    }
}

/// Parse a quoted string body (after the opening quote). `''` is an escaped quote.
fn parse_string(rest: &str) -> Option<String> {
    let mut out = String::new();
    let mut chars = rest.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\'' {
            if chars.peek() == Some(&'\'') {
                chars.next();
                out.push('\'');
            } else {
                return Some(out.trim_end().to_string());
            }
        } else {
            out.push(c);
        }
    }
    None
}
