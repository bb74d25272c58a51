//! CSV reading and writing for assessment exports.
//!
//! - **Delimiter resolution**: `.tsv` files default to tab, everything else to
//!   comma, unless a delimiter is supplied.
//! - **Encoding**: input decoding and output encoding via `encoding_rs`,
//!   defaulting to UTF-8.
//! - **Headers**: blank headers get synthetic names and repeated headers are
//!   suffixed `.1`, `.2`, ... so every stored column name is unique.
//! - **stdin/stdout**: the `-` path reads stdin or writes stdout.

use std::{
    collections::HashMap,
    fs::File,
    io::{BufReader, BufWriter, Read, Write},
    path::Path,
};

use encoding_rs::{Encoding, UTF_8};

use crate::{
    data::{Table, Value},
    error::{LedgerError, Result},
};

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

/// How to read one export file.
#[derive(Debug, Clone, Default)]
pub struct CsvReadOptions {
    pub delimiter: Option<u8>,
    pub encoding: Option<String>,
}

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| LedgerError::Encoding(format!("unknown encoding '{value}'"))),
        None => Ok(UTF_8),
    }
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn resolve_output_delimiter(path: Option<&Path>, provided: Option<u8>) -> u8 {
    if let Some(delim) = provided {
        return delim;
    }
    match path.and_then(|p| p.extension()).and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    }
}

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
        if !path.exists() {
            return Err(LedgerError::NotFound(format!("{} not found", path.display())));
        }
        Box::new(BufReader::new(File::open(path)?))
    };
    Ok(open_csv_reader(reader, delimiter))
}

pub fn decode_bytes(bytes: &[u8], encoding: &'static Encoding) -> Result<String> {
    let (text, _, had_errors) = encoding.decode(bytes);
    if had_errors {
        Err(LedgerError::Encoding(format!(
            "failed to decode text with encoding {}",
            encoding.name()
        )))
    } else {
        Ok(text.into_owned())
    }
}

pub fn decode_record(record: &csv::ByteRecord, encoding: &'static Encoding) -> Result<Vec<String>> {
    record
        .iter()
        .map(|field| decode_bytes(field, encoding))
        .collect()
}

/// Makes header names usable as stored column names.
pub fn unique_headers(headers: Vec<String>) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    headers
        .into_iter()
        .enumerate()
        .map(|(idx, header)| {
            let header = header.trim_start_matches('\u{feff}').to_string();
            let base = if header.trim().is_empty() {
                format!("column_{}", idx + 1)
            } else {
                header
            };
            let count = counts.entry(base.clone()).or_insert(0);
            let name = if *count == 0 {
                base
            } else {
                format!("{base}.{count}")
            };
            *count += 1;
            name
        })
        .collect()
}

/// Reads a whole export file into a [`Table`].
pub fn read_table(path: &Path, options: &CsvReadOptions) -> Result<Table> {
    let delimiter = resolve_input_delimiter(path, options.delimiter);
    let encoding = resolve_encoding(options.encoding.as_deref())?;
    let mut reader = open_csv_reader_from_path(path, delimiter)?;
    read_table_from(&mut reader, encoding)
}

pub fn read_table_from<R: Read>(
    reader: &mut csv::Reader<R>,
    encoding: &'static Encoding,
) -> Result<Table> {
    let headers = reader.byte_headers()?.clone();
    let headers = unique_headers(decode_record(&headers, encoding)?);
    let mut rows: Vec<Vec<Value>> = Vec::new();
    for record in reader.byte_records() {
        let decoded = decode_record(&record?, encoding)?;
        rows.push(decoded.iter().map(|field| Value::from_field(field)).collect());
    }
    Ok(Table::new(headers, rows))
}

/// Writes `table` as CSV to `path` (stdout for `None` or `-`).
pub fn write_table(
    table: &Table,
    path: Option<&Path>,
    delimiter: u8,
    encoding: &'static Encoding,
) -> Result<()> {
    let mut buffer = csv::WriterBuilder::new()
        .delimiter(delimiter)
        .quote_style(csv::QuoteStyle::Necessary)
        .from_writer(Vec::new());
    buffer.write_record(&table.columns)?;
    for row in &table.rows {
        buffer.write_record(row.iter().map(Value::as_display))?;
    }
    let bytes = buffer
        .into_inner()
        .map_err(|err| LedgerError::Io(err.into_error()))?;

    let encoded = if encoding == UTF_8 {
        bytes
    } else {
        let text = String::from_utf8_lossy(&bytes);
        let (encoded, _, had_errors) = encoding.encode(&text);
        if had_errors {
            return Err(LedgerError::Encoding(format!(
                "failed to encode output using {}",
                encoding.name()
            )));
        }
        encoded.into_owned()
    };

    let mut out: Box<dyn Write> = match path {
        Some(p) if !is_dash(p) => Box::new(BufWriter::new(File::create(p)?)),
        _ => Box::new(std::io::stdout()),
    };
    out.write_all(&encoded)?;
    out.flush()?;
    Ok(())
}
