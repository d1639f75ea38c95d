#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use csv_sqlite_import::importer::ImportOptions;
use rusqlite::Connection;
use tempfile::{TempDir, tempdir};

/// Scratch directory holding a `csv/` input folder and a database path.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory with an empty `csv/` folder.
    pub fn new() -> Self {
        let temp_dir = tempdir().expect("temp dir");
        fs::create_dir(temp_dir.path().join("csv")).expect("create csv dir");
        Self { temp_dir }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn csv_dir(&self) -> PathBuf {
        self.temp_dir.path().join("csv")
    }

    pub fn db_path(&self) -> PathBuf {
        self.temp_dir.path().join("test.sqlite")
    }

    /// Writes `contents` into `csv/<name>` and returns the path.
    pub fn write_csv(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.csv_dir().join(name);
        fs::write(&path, contents).expect("write csv file");
        path
    }

    /// Writes a `<header>` file with `rows` generated lines.
    pub fn write_generated(&self, name: &str, header: &str, rows: usize) -> PathBuf {
        let mut contents = format!("{header}\n");
        for i in 1..=rows {
            contents.push_str(&format!("{i},name {i},{}.5\n", i * 2));
        }
        self.write_csv(name, &contents)
    }

    pub fn options(&self) -> ImportOptions {
        ImportOptions {
            db_path: self.db_path(),
            csv_dir: self.csv_dir(),
            ..ImportOptions::default()
        }
    }

    pub fn connect(&self) -> Connection {
        Connection::open(self.db_path()).expect("open database")
    }

    pub fn row_count(&self, table: &str) -> i64 {
        self.connect()
            .query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| row.get(0))
            .expect("count rows")
    }

    pub fn table_exists(&self, table: &str) -> bool {
        let count: i64 = self
            .connect()
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |row| row.get(0),
            )
            .expect("query sqlite_master");
        count > 0
    }

    pub fn index_names(&self, table: &str) -> Vec<String> {
        let conn = self.connect();
        let mut statement = conn
            .prepare(
                "SELECT name FROM sqlite_master WHERE type = 'index' AND tbl_name = ?1 \
                 AND sql IS NOT NULL ORDER BY name",
            )
            .expect("prepare index query");
        statement
            .query_map([table], |row| row.get(0))
            .expect("query indexes")
            .collect::<Result<Vec<String>, _>>()
            .expect("collect indexes")
    }

    /// Returns `(name, declared type, pk flag)` for each column of `table`.
    pub fn columns(&self, table: &str) -> Vec<(String, String, bool)> {
        let conn = self.connect();
        let mut statement = conn
            .prepare(&format!("PRAGMA table_info(\"{table}\")"))
            .expect("prepare table_info");
        statement
            .query_map([], |row| {
                Ok((row.get(1)?, row.get(2)?, row.get::<_, i64>(5)? > 0))
            })
            .expect("query table_info")
            .collect::<Result<Vec<_>, _>>()
            .expect("collect columns")
    }
}
