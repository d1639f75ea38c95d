use std::path::PathBuf;

use anyhow::{Result, anyhow};
use clap::Parser;
use encoding_rs::{Encoding, UTF_8};

use crate::{
    importer::{DEFAULT_BATCH_SIZE, DEFAULT_CSV_DIR, DEFAULT_DB_PATH, ImportOptions},
    inference::DEFAULT_SAMPLE_ROWS,
    primary_key::DEFAULT_PK_ROW_LIMIT,
};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Import a directory of CSV files into a SQLite database",
    long_about = None
)]
pub struct Cli {
    /// SQLite database file to create/use
    #[arg(long, default_value = DEFAULT_DB_PATH)]
    pub db: PathBuf,
    /// Directory containing the CSV files (not searched recursively)
    #[arg(long = "csv-dir", default_value = DEFAULT_CSV_DIR)]
    pub csv_dir: PathBuf,
    /// Drop each table before creating it
    #[arg(long)]
    pub drop: bool,
    /// Try to detect a primary key column for each file
    #[arg(long = "detect-pk")]
    pub detect_pk: bool,
    /// Maximum rows to import per file
    #[arg(long = "max-rows")]
    pub max_rows: Option<usize>,
    /// Skip files with more than this many rows
    #[arg(long = "skip-large")]
    pub skip_large: Option<usize>,
    /// Rows per insert batch; each batch is committed in its own transaction
    #[arg(long = "batch-size", default_value_t = DEFAULT_BATCH_SIZE, value_parser = parse_positive)]
    pub batch_size: usize,
    /// Number of rows sampled when inferring column types (0 means full scan)
    #[arg(long = "sample-rows", default_value_t = DEFAULT_SAMPLE_ROWS)]
    pub sample_rows: usize,
    /// Files with more rows than this skip primary key detection
    #[arg(long = "pk-row-limit", default_value_t = DEFAULT_PK_ROW_LIMIT)]
    pub pk_row_limit: usize,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the input files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
    /// Declare REFERENCES for `<name>_id` columns and report violations after import
    #[arg(long = "foreign-keys")]
    pub foreign_keys: bool,
}

impl Cli {
    pub fn into_options(self) -> Result<ImportOptions> {
        let encoding = resolve_encoding(self.input_encoding.as_deref())?;
        let defaults = ImportOptions::default();
        Ok(ImportOptions {
            db_path: self.db,
            csv_dir: self.csv_dir,
            drop_tables: self.drop,
            detect_primary_key: self.detect_pk,
            max_rows: self.max_rows,
            skip_large: self.skip_large,
            batch_size: self.batch_size,
            sample_rows: self.sample_rows,
            pk_row_limit: self.pk_row_limit,
            delimiter: self.delimiter.unwrap_or(defaults.delimiter),
            encoding,
            foreign_keys: self.foreign_keys,
        })
    }
}

pub fn resolve_encoding(label: Option<&str>) -> Result<&'static Encoding> {
    match label {
        Some(value) => Encoding::for_label(value.trim().as_bytes())
            .ok_or_else(|| anyhow!("Unknown encoding '{value}'")),
        None => Ok(UTF_8),
    }
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}

fn parse_positive(value: &str) -> Result<usize, String> {
    match value.parse::<usize>() {
        Ok(0) => Err("Value must be at least 1".to_string()),
        Ok(parsed) => Ok(parsed),
        Err(err) => Err(err.to_string()),
    }
}
