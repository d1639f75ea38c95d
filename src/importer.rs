//! Per-file import pipeline.
//!
//! A run happens in three steps:
//!
//! 1. **Plan** every discovered file: the `--skip-large` line count, header
//!    read, type sampling, and optional primary key detection.
//! 2. **Resolve** foreign key references across all plans (only with
//!    `--foreign-keys`).
//! 3. **Import** each planned file: optional drop, create, stream batches of
//!    `INSERT OR IGNORE`, then index `_id` columns.
//!
//! A failure in any step is recorded against its file and the run moves on to
//! the next file. All run state lives in the [`RunSummary`] returned to the
//! caller.

use std::{
    collections::HashMap,
    fmt,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use encoding_rs::{Encoding, UTF_8};
use log::{debug, error, info, warn};
use rusqlite::types::Value;
use thiserror::Error;

use crate::{
    database::{Database, ForeignKeyViolation},
    inference::{self, DEFAULT_SAMPLE_ROWS},
    naming,
    primary_key::{self, DEFAULT_PK_ROW_LIMIT, PrimaryKeyDetection},
    schema::{self, TablePlan},
    source::{self, CsvSource, DEFAULT_DELIMITER},
};

pub const DEFAULT_DB_PATH: &str = "Brix.sqlite";
pub const DEFAULT_CSV_DIR: &str = "csv";
pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Error)]
pub enum ImportError {
    #[error("CSV directory not found: {0:?}")]
    MissingDirectory(PathBuf),
    #[error("{failed} of {total} file(s) failed to import")]
    FilesFailed { failed: usize, total: usize },
}

#[derive(Debug, Clone)]
pub struct ImportOptions {
    pub db_path: PathBuf,
    pub csv_dir: PathBuf,
    pub drop_tables: bool,
    pub detect_primary_key: bool,
    pub max_rows: Option<usize>,
    pub skip_large: Option<usize>,
    pub batch_size: usize,
    pub sample_rows: usize,
    pub pk_row_limit: usize,
    pub delimiter: u8,
    pub encoding: &'static Encoding,
    pub foreign_keys: bool,
}

impl Default for ImportOptions {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            csv_dir: PathBuf::from(DEFAULT_CSV_DIR),
            drop_tables: false,
            detect_primary_key: false,
            max_rows: None,
            skip_large: None,
            batch_size: DEFAULT_BATCH_SIZE,
            sample_rows: DEFAULT_SAMPLE_ROWS,
            pk_row_limit: DEFAULT_PK_ROW_LIMIT,
            delimiter: DEFAULT_DELIMITER,
            encoding: UTF_8,
            foreign_keys: false,
        }
    }
}

impl ImportOptions {
    pub fn source_for(&self, path: &Path) -> CsvSource {
        CsvSource::new(path, self.delimiter, self.encoding)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStage {
    Pending,
    Skipped,
    Sampled,
    PrimaryKeyDetected,
    SchemaCreated,
    Importing,
    Done,
}

impl fmt::Display for FileStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FileStage::Pending => "pending",
            FileStage::Skipped => "skipped",
            FileStage::Sampled => "sampled",
            FileStage::PrimaryKeyDetected => "pk-detected",
            FileStage::SchemaCreated => "schema-created",
            FileStage::Importing => "importing",
            FileStage::Done => "done",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    TooLarge { rows: usize, limit: usize },
    NoHeader,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::TooLarge { rows, limit } => write!(f, "{rows} rows > {limit}"),
            SkipReason::NoHeader => f.write_str("no header row"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FileReport {
    pub path: PathBuf,
    pub table: String,
    pub stage: FileStage,
    pub rows_processed: usize,
    pub rows_inserted: usize,
    pub primary_key: Option<String>,
    pub indexes: Vec<String>,
    pub skipped: Option<SkipReason>,
    pub error: Option<String>,
}

impl FileReport {
    pub fn new(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            table: naming::table_name_for(path),
            stage: FileStage::Pending,
            rows_processed: 0,
            rows_inserted: 0,
            primary_key: None,
            indexes: Vec::new(),
            skipped: None,
            error: None,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some()
    }

    pub fn rows_ignored(&self) -> usize {
        self.rows_processed.saturating_sub(self.rows_inserted)
    }

    fn fail(&mut self, err: &anyhow::Error) {
        error!(
            "Failed to import {:?} during {}: {err:#}",
            self.path, self.stage
        );
        self.error = Some(format!("{err:#}"));
    }

    fn skip(&mut self, reason: SkipReason) {
        warn!("Skipping {:?}: {reason}", self.path);
        self.stage = FileStage::Skipped;
        self.skipped = Some(reason);
    }
}

#[derive(Debug, Clone, Default)]
pub struct RunSummary {
    pub files: Vec<FileReport>,
    pub violations: Vec<ForeignKeyViolation>,
}

impl RunSummary {
    pub fn failed(&self) -> usize {
        self.files.iter().filter(|file| file.is_failed()).count()
    }

    pub fn skipped(&self) -> usize {
        self.files
            .iter()
            .filter(|file| file.stage == FileStage::Skipped)
            .count()
    }

    pub fn rows_inserted(&self) -> usize {
        self.files.iter().map(|file| file.rows_inserted).sum()
    }

    pub fn into_result(self) -> Result<Self> {
        let failed = self.failed();
        if failed > 0 {
            return Err(ImportError::FilesFailed {
                failed,
                total: self.files.len(),
            }
            .into());
        }
        Ok(self)
    }

    pub fn report(&self, path: &Path) -> Option<&FileReport> {
        self.files.iter().find(|file| file.path == path)
    }
}

/// Imports every CSV file of `options.csv_dir` into `options.db_path`.
/// Directory and database problems abort the run; per-file problems are
/// recorded in the returned summary.
pub fn run_import(options: &ImportOptions) -> Result<RunSummary> {
    if !options.csv_dir.is_dir() {
        return Err(ImportError::MissingDirectory(options.csv_dir.clone()).into());
    }
    let files = source::discover_csv_files(&options.csv_dir)?;
    if files.is_empty() {
        warn!("No CSV files found in {:?}", options.csv_dir);
    }

    info!("Creating/opening SQLite database at {:?}", options.db_path);
    let mut db = Database::open(&options.db_path)?;

    let mut reports: Vec<FileReport> = files.iter().map(|path| FileReport::new(path)).collect();
    warn_on_table_collisions(&reports);

    let mut plans: Vec<Option<TablePlan>> = reports
        .iter_mut()
        .map(|report| match plan_file(options, report) {
            Ok(plan) => plan,
            Err(err) => {
                report.fail(&err);
                None
            }
        })
        .collect();

    if options.foreign_keys {
        link_foreign_keys(&mut plans);
    }

    for (report, plan) in reports.iter_mut().zip(&plans) {
        let Some(plan) = plan else {
            continue;
        };
        if let Err(err) = import_file(&mut db, options, plan, report) {
            report.fail(&err);
        }
    }

    let violations = if options.foreign_keys {
        // A reference to a parent column without a unique constraint makes
        // SQLite reject the whole check; the import itself already succeeded.
        check_foreign_keys(&db).unwrap_or_else(|err| {
            warn!("Foreign key check failed: {err:#}");
            Vec::new()
        })
    } else {
        Vec::new()
    };

    Ok(RunSummary {
        files: reports,
        violations,
    })
}

fn warn_on_table_collisions(reports: &[FileReport]) {
    for (first, second) in table_collisions(reports) {
        warn!(
            "{:?} and {:?} both map to table '{}'",
            reports[first].path, reports[second].path, reports[second].table
        );
    }
}

// SQLite compares table names case-insensitively.
fn table_collisions(reports: &[FileReport]) -> Vec<(usize, usize)> {
    let mut owners: HashMap<String, usize> = HashMap::new();
    let mut collisions = Vec::new();
    for (idx, report) in reports.iter().enumerate() {
        let key = report.table.to_ascii_lowercase();
        if let Some(&previous) = owners.get(&key) {
            collisions.push((previous, idx));
        } else {
            owners.insert(key, idx);
        }
    }
    collisions
}

/// Runs the read-only passes over one file. `Ok(None)` means the file was
/// skipped.
pub fn plan_file(options: &ImportOptions, report: &mut FileReport) -> Result<Option<TablePlan>> {
    let source = options.source_for(&report.path);

    if let Some(limit) = options.skip_large {
        let rows = source.count_data_lines()?;
        if rows > limit {
            report.skip(SkipReason::TooLarge { rows, limit });
            return Ok(None);
        }
    }

    let Some(headers) = source.headers()? else {
        report.skip(SkipReason::NoHeader);
        return Ok(None);
    };

    let types = inference::infer_types(&source, headers.len(), options.sample_rows)
        .with_context(|| format!("Inferring column types for {:?}", report.path))?;
    let mut plan = TablePlan::new(report.table.clone(), &headers, &types);
    report.stage = FileStage::Sampled;
    for column in &plan.columns {
        debug!("{}.{}: {}", plan.name, column.name, column.column_type);
    }

    if options.detect_primary_key {
        match primary_key::detect_primary_key(&source, &types, options.pk_row_limit)
            .with_context(|| format!("Detecting primary key for {:?}", report.path))?
        {
            PrimaryKeyDetection::Found(idx) => {
                plan.primary_key = Some(idx);
                report.primary_key = plan.primary_key_column().map(|c| c.name.clone());
                info!(
                    "Detected primary key '{}' for table '{}'",
                    plan.columns[idx].name, plan.name
                );
            }
            PrimaryKeyDetection::NoCandidate => {
                debug!("No primary key candidate for table '{}'", plan.name);
            }
            PrimaryKeyDetection::TooLarge { rows, limit } => {
                info!(
                    "Skipping primary key detection for {:?}: {rows} rows > {limit}",
                    report.path
                );
            }
        }
        report.stage = FileStage::PrimaryKeyDetected;
    }

    Ok(Some(plan))
}

fn link_foreign_keys(plans: &mut [Option<TablePlan>]) {
    let occupied: Vec<bool> = plans.iter().map(Option::is_some).collect();
    let mut planned: Vec<TablePlan> = plans.iter_mut().filter_map(Option::take).collect();
    schema::resolve_foreign_keys(&mut planned);
    let mut resolved = planned.into_iter();
    for (slot, was_planned) in plans.iter_mut().zip(occupied) {
        if was_planned {
            *slot = resolved.next();
        }
    }
}

pub fn import_file(
    db: &mut Database,
    options: &ImportOptions,
    plan: &TablePlan,
    report: &mut FileReport,
) -> Result<()> {
    info!("Importing {:?} -> table '{}'", report.path, plan.name);
    let source = options.source_for(&report.path);

    if options.drop_tables {
        db.drop_table(plan)?;
    }
    db.create_table(plan)?;
    report.stage = FileStage::SchemaCreated;
    debug!("Table '{}' ready with {} column(s)", plan.name, plan.width());

    report.stage = FileStage::Importing;
    let batch_size = options.batch_size.max(1);
    let mut batch: Vec<Vec<Value>> = Vec::with_capacity(batch_size);
    let limit = options.max_rows.unwrap_or(usize::MAX);
    for row in source.rows()?.take(limit) {
        batch.push(convert_row(plan, &row?));
        report.rows_processed += 1;
        if batch.len() >= batch_size {
            report.rows_inserted += db.insert_batch(plan, &batch)?;
            batch.clear();
        }
    }
    report.rows_inserted += db.insert_batch(plan, &batch)?;
    info!(
        "Inserted {} of {} row(s) into '{}'",
        report.rows_inserted, report.rows_processed, plan.name
    );

    for index in plan.indexes() {
        db.create_index(plan, &index)?;
        info!("Created index {} on {}", index.name, index.column);
        report.indexes.push(index.name);
    }
    report.stage = FileStage::Done;
    Ok(())
}

fn convert_row(plan: &TablePlan, raw: &[String]) -> Vec<Value> {
    plan.columns
        .iter()
        .enumerate()
        .map(|(idx, column)| {
            raw.get(idx)
                .map_or(Value::Null, |value| column.column_type.to_value(value))
        })
        .collect()
}

fn check_foreign_keys(db: &Database) -> Result<Vec<ForeignKeyViolation>> {
    let violations = db.foreign_key_violations()?;
    if violations.is_empty() {
        info!("Foreign key check passed: no violations");
    }
    for violation in &violations {
        warn!(
            "Table {} rowid={} references missing parent in {} (fk={})",
            violation.table,
            violation
                .rowid
                .map_or_else(|| "?".to_string(), |rowid| rowid.to_string()),
            violation.parent,
            violation.constraint
        );
    }
    Ok(violations)
}
