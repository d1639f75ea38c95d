//! Reopenable CSV sources.
//!
//! An import reads each file several times: a cheap line count, a sampling
//! pass for type inference, an optional full pass for primary key detection,
//! and the streaming insert pass. [`CsvSource`] holds what is needed to open a
//! fresh reader for every pass instead of rewinding a shared iterator.

use std::{
    fs::{self, File},
    io::{BufRead, BufReader},
    path::{Path, PathBuf},
};

use anyhow::{Context, Result, anyhow};
use csv::ByteRecord;
use encoding_rs::{Encoding, UTF_8};

pub const DEFAULT_DELIMITER: u8 = b',';

#[derive(Debug, Clone)]
pub struct CsvSource {
    path: PathBuf,
    delimiter: u8,
    encoding: &'static Encoding,
}

impl CsvSource {
    pub fn new(path: impl Into<PathBuf>, delimiter: u8, encoding: &'static Encoding) -> Self {
        Self {
            path: path.into(),
            delimiter,
            encoding,
        }
    }

    pub fn utf8(path: impl Into<PathBuf>) -> Self {
        Self::new(path, DEFAULT_DELIMITER, UTF_8)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open_reader(&self) -> Result<csv::Reader<BufReader<File>>> {
        let file = File::open(&self.path)
            .with_context(|| format!("Opening input file {:?}", self.path))?;
        Ok(csv::ReaderBuilder::new()
            .has_headers(true)
            .delimiter(self.delimiter)
            .double_quote(true)
            .flexible(true)
            .from_reader(BufReader::new(file)))
    }

    pub fn headers(&self) -> Result<Option<Vec<String>>> {
        let mut reader = self.open_reader()?;
        let record = reader
            .byte_headers()
            .with_context(|| format!("Reading header row of {:?}", self.path))?
            .clone();
        if record.is_empty() {
            return Ok(None);
        }
        let mut headers = self.decode(&record, 1)?;
        if let Some(first) = headers.first_mut() {
            if let Some(stripped) = first.strip_prefix('\u{feff}') {
                *first = stripped.to_string();
            }
        }
        Ok(Some(headers))
    }

    pub fn rows(&self) -> Result<CsvRows> {
        let mut reader = self.open_reader()?;
        reader
            .byte_headers()
            .with_context(|| format!("Reading header row of {:?}", self.path))?;
        Ok(CsvRows {
            reader,
            record: ByteRecord::new(),
            source: self.clone(),
            row_number: 1,
        })
    }

    /// Counts physical lines after the header without parsing CSV. Quoted
    /// fields that span lines are counted once per line.
    pub fn count_data_lines(&self) -> Result<usize> {
        let file = File::open(&self.path)
            .with_context(|| format!("Opening input file {:?}", self.path))?;
        let mut reader = BufReader::new(file);
        let mut lines = 0usize;
        let mut last_byte = None;
        loop {
            let buffer = reader
                .fill_buf()
                .with_context(|| format!("Counting lines in {:?}", self.path))?;
            if buffer.is_empty() {
                break;
            }
            lines += buffer.iter().filter(|byte| **byte == b'\n').count();
            last_byte = buffer.last().copied();
            let consumed = buffer.len();
            reader.consume(consumed);
        }
        if matches!(last_byte, Some(byte) if byte != b'\n') {
            lines += 1;
        }
        Ok(lines.saturating_sub(1))
    }

    fn decode(&self, record: &ByteRecord, row_number: usize) -> Result<Vec<String>> {
        record
            .iter()
            .map(|field| {
                let (text, had_errors) = self.encoding.decode_without_bom_handling(field);
                if had_errors {
                    Err(anyhow!(
                        "Row {row_number} of {:?} is not valid {}",
                        self.path,
                        self.encoding.name()
                    ))
                } else {
                    Ok(text.into_owned())
                }
            })
            .collect()
    }
}

pub struct CsvRows {
    reader: csv::Reader<BufReader<File>>,
    record: ByteRecord,
    source: CsvSource,
    row_number: usize,
}

impl Iterator for CsvRows {
    type Item = Result<Vec<String>>;

    fn next(&mut self) -> Option<Self::Item> {
        self.row_number += 1;
        match self.reader.read_byte_record(&mut self.record) {
            Ok(true) => Some(self.source.decode(&self.record, self.row_number)),
            Ok(false) => None,
            Err(err) => Some(Err(anyhow::Error::new(err).context(format!(
                "Reading row {} in {:?}",
                self.row_number, self.source.path
            )))),
        }
    }
}

pub fn discover_csv_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(dir).with_context(|| format!("Listing CSV directory {dir:?}"))?;
    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Listing CSV directory {dir:?}"))?;
        let path = entry.path();
        let is_csv = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("csv"));
        if is_csv && path.is_file() {
            files.push(path);
        }
    }
    files.sort_by(|left, right| left.file_name().cmp(&right.file_name()));
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use encoding_rs::WINDOWS_1252;
    use tempfile::tempdir;

    #[test]
    fn headers_and_rows_come_from_fresh_passes() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("parts.csv");
        fs::write(&path, "id,name\n1,brick\n2,\"plate, round\"\n").expect("write csv");
        let source = CsvSource::utf8(&path);

        let headers = source.headers().expect("headers").expect("header row");
        assert_eq!(headers, vec!["id", "name"]);

        let first: Vec<_> = source.rows().expect("rows").collect::<Result<_>>().expect("pass");
        let second: Vec<_> = source.rows().expect("rows").collect::<Result<_>>().expect("pass");
        assert_eq!(first, second);
        assert_eq!(first[1], vec!["2", "plate, round"]);
    }

    #[test]
    fn empty_file_has_no_headers() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("empty.csv");
        fs::write(&path, "").expect("write csv");
        assert!(CsvSource::utf8(&path).headers().expect("headers").is_none());
    }

    #[test]
    fn byte_order_mark_is_stripped_from_header() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("bom.csv");
        fs::write(&path, "\u{feff}id,name\n1,a\n").expect("write csv");
        let headers = CsvSource::utf8(&path).headers().expect("headers").expect("row");
        assert_eq!(headers[0], "id");
    }

    #[test]
    fn line_count_handles_missing_trailing_newline() {
        let dir = tempdir().expect("temp dir");
        let with_newline = dir.path().join("a.csv");
        let without_newline = dir.path().join("b.csv");
        fs::write(&with_newline, "h\n1\n2\n3\n").expect("write csv");
        fs::write(&without_newline, "h\n1\n2\n3").expect("write csv");
        assert_eq!(CsvSource::utf8(&with_newline).count_data_lines().unwrap(), 3);
        assert_eq!(CsvSource::utf8(&without_newline).count_data_lines().unwrap(), 3);
    }

    #[test]
    fn rows_decode_configured_encoding() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("latin.csv");
        let (encoded, _, _) = WINDOWS_1252.encode("name\nCaf\u{e9}\n");
        fs::write(&path, &encoded).expect("write csv");
        let source = CsvSource::new(&path, b',', WINDOWS_1252);
        let rows: Vec<_> = source.rows().unwrap().collect::<Result<_>>().unwrap();
        assert_eq!(rows, vec![vec!["Caf\u{e9}".to_string()]]);
    }

    #[test]
    fn discovery_is_sorted_and_non_recursive() {
        let dir = tempdir().expect("temp dir");
        fs::write(dir.path().join("sets.csv"), "id\n").unwrap();
        fs::write(dir.path().join("colors.CSV"), "id\n").unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested").join("inner.csv"), "id\n").unwrap();

        let files = discover_csv_files(dir.path()).expect("discover");
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["colors.CSV", "sets.csv"]);
    }
}
