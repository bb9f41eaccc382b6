//! I/O utilities: encoding candidates, strict decoding, CSV reader and writer construction.
//!
//! - **Encodings**: caller label, BOM sniffing, UTF-8, a `chardetng` guess, then
//!   fixed 8-bit and 16-bit fallbacks.
//! - **Decoding**: strict; malformed sequences or NUL bytes reject an encoding so
//!   the reader moves on to the next candidate.
//! - **Readers**: permissive (`flexible`) CSV readers over decoded text.
//! - **Writers**: UTF-8 delimited output for exported and rewritten tables.

use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use chardetng::EncodingDetector;
use csv::QuoteStyle;
use encoding_rs::{Encoding, ISO_8859_15, UTF_8, UTF_16BE, UTF_16LE, WINDOWS_1252};
use log::warn;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

/// Delimiters tried by the reader, in order.
pub const CANDIDATE_DELIMITERS: &[u8] = &[b',', b';', b'\t', b'|'];

const FALLBACK_ENCODINGS: &[&Encoding] = &[UTF_8, WINDOWS_1252, ISO_8859_15, UTF_16LE, UTF_16BE];

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    if let Some(value) = label {
        Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
    } else {
        Ok(UTF_8)
    }
}

pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
}

/// Orders delimiter candidates so the extension's natural delimiter is tried first.
pub fn candidate_delimiters(path: &Path) -> Vec<u8> {
    let preferred = match extension_of(path).as_deref() {
        Some("tsv") | Some("tab") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    };
    let mut delimiters = vec![preferred];
    delimiters.extend(
        CANDIDATE_DELIMITERS
            .iter()
            .copied()
            .filter(|d| *d != preferred),
    );
    delimiters
}

/// Ordered, de-duplicated list of encodings worth trying for `bytes`.
pub fn candidate_encodings(bytes: &[u8], requested: Option<&str>) -> Vec<&'static Encoding> {
    let mut encodings: Vec<&'static Encoding> = Vec::new();
    let mut push = |encoding: &'static Encoding| {
        if !encodings.contains(&encoding) {
            encodings.push(encoding);
        }
    };
    if requested.is_some() {
        match resolve_encoding(requested) {
            Ok(encoding) => push(encoding),
            Err(err) => warn!("{err}; falling back to detection"),
        }
    }
    if let Some((encoding, _)) = Encoding::for_bom(bytes) {
        push(encoding);
    }
    push(UTF_8);
    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    push(detector.guess(None, true));
    for &encoding in FALLBACK_ENCODINGS {
        push(encoding);
    }
    encodings
}

/// Decodes `bytes` strictly, stripping a matching BOM.
///
/// Fails on malformed input and on NUL characters, which show up when 16-bit
/// text is read through an 8-bit encoding.
pub fn decode_strict(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let body = match Encoding::for_bom(bytes) {
        Some((bom_encoding, bom_len)) if bom_encoding == encoding => &bytes[bom_len..],
        _ => bytes,
    };
    let text = encoding
        .decode_without_bom_handling_and_without_replacement(body)
        .ok_or_else(|| anyhow!("Input is not valid {}", encoding.name()))?;
    if text.contains('\0') {
        return Err(anyhow!(
            "Decoding as {} produced NUL characters",
            encoding.name()
        ));
    }
    Ok(text.into_owned())
}

/// Lossy decode used only for the reader's final attempt.
pub fn decode_lossy(bytes: &[u8]) -> String {
    let (text, _, _) = UTF_8.decode(bytes);
    text.into_owned()
}

pub fn open_csv_reader(text: &str, delimiter: u8, has_headers: bool) -> csv::Reader<&[u8]> {
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(has_headers)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(text.as_bytes())
}

pub fn open_csv_writer(path: &Path, delimiter: u8) -> Result<csv::Writer<Box<dyn Write>>> {
    let file = File::create(path).with_context(|| format!("Creating output file {path:?}"))?;
    let writer: Box<dyn Write> = Box::new(BufWriter::new(file));
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(delimiter)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    Ok(builder.from_writer(writer))
}
