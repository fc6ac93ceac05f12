//! CSV reader/writer construction, delimiter resolution and input decoding.
//!
//! Survey exports arrive as `.csv` or `.tsv` files, sometimes re-saved by
//! spreadsheet programs in a legacy encoding (`euc-kr`/`cp949` for Korean
//! forms) and often with a UTF-8 byte-order mark. Every read goes through this
//! module; `-` as a path means stdin/stdout.

use std::{
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use encoding_rs::{Encoding, UTF_8};
use log::warn;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

const UTF8_BOM: char = '\u{feff}';

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'")),
        None => Ok(UTF_8),
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

/// Form exports drop trailing empty cells, so rows may be ragged.
pub fn open_csv_reader<R: Read>(reader: R, delimiter: u8) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true)
        .from_reader(reader)
}

pub fn open_csv_reader_from_path(path: &Path, delimiter: u8) -> Result<csv::Reader<Box<dyn Read>>> {
    let reader: Box<dyn Read> = if is_dash(path) {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(BufReader::new(
            File::open(path).with_context(|| format!("Opening input file {path:?}"))?,
        ))
    };
    Ok(open_csv_reader(reader, delimiter))
}

pub fn open_csv_writer(path: Option<&Path>, delimiter: u8) -> Result<csv::Writer<Box<dyn Write>>> {
    let writer: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(
            File::create(p).with_context(|| format!("Creating output file {p:?}"))?,
        )),
        _ => Box::new(std::io::stdout()),
    };
    Ok(csv::WriterBuilder::new()
        .delimiter(delimiter)
        .from_writer(writer))
}

/// Undecodable bytes become U+FFFD; the flag reports whether any were replaced.
pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> (String, bool) {
    let (text, _, had_errors) = encoding.decode(bytes);
    (text.into_owned(), had_errors)
}

/// A decoded row plus the number of cells that needed replacement characters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DecodedRecord {
    pub cells: Vec<String>,
    pub replaced: usize,
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> DecodedRecord {
    let mut decoded = DecodedRecord::default();
    for field in record.iter() {
        let (text, had_errors) = decode_bytes(field, encoding);
        decoded.replaced += usize::from(had_errors);
        decoded.cells.push(text);
    }
    decoded
}

/// Decodes the header row, dropping a leading byte-order mark and padding.
pub fn reader_headers<R: Read>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> Result<Vec<String>> {
    let headers = reader.byte_headers().context("Reading header row")?.clone();
    let mut decoded = decode_record(&headers, encoding);
    if decoded.replaced > 0 {
        warn!(
            "{} header(s) are not valid {}; undecodable bytes replaced",
            decoded.replaced,
            encoding.name()
        );
    }
    if let Some(first) = decoded.cells.first_mut() {
        *first = first.trim_start_matches(UTF8_BOM).to_string();
    }
    Ok(decoded
        .cells
        .into_iter()
        .map(|header| header.trim().to_string())
        .collect())
}
