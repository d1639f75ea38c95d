use std::collections::HashSet;

use anyhow::Result;

use crate::{inference::ColumnType, source::CsvSource};

pub const DEFAULT_PK_ROW_LIMIT: usize = 1_000_000;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrimaryKeyDetection {
    Found(usize),
    NoCandidate,
    TooLarge { rows: usize, limit: usize },
}

// Values as SQLite compares them once stored under the column's affinity,
// so `1`, `01` and `1.0` collide in an INTEGER column.
#[derive(Debug, PartialEq, Eq, Hash)]
enum StoredKey {
    Integer(i64),
    Real(u64),
    Text(String),
}

impl StoredKey {
    fn new(column_type: ColumnType, raw: &str) -> Self {
        if column_type == ColumnType::Text {
            return Self::Text(raw.to_string());
        }
        if column_type == ColumnType::Integer {
            if let Ok(value) = raw.parse::<i64>() {
                return Self::Integer(value);
            }
        }
        match raw.trim().parse::<f64>() {
            Ok(value)
                if column_type == ColumnType::Integer
                    && value.fract() == 0.0
                    && value.abs() < i64::MAX as f64 =>
            {
                Self::Integer(value as i64)
            }
            Ok(value) => Self::Real((value + 0.0).to_bits()),
            Err(_) => Self::Text(raw.to_string()),
        }
    }
}

#[derive(Debug)]
pub struct PrimaryKeyDetector {
    types: Vec<ColumnType>,
    candidates: Vec<Option<HashSet<StoredKey>>>,
}

impl PrimaryKeyDetector {
    pub fn new(types: &[ColumnType]) -> Self {
        Self {
            types: types.to_vec(),
            candidates: types.iter().map(|_| Some(HashSet::new())).collect(),
        }
    }

    pub fn observe_row<S: AsRef<str>>(&mut self, row: &[S]) {
        for (idx, slot) in self.candidates.iter_mut().enumerate() {
            let Some(seen) = slot.as_mut() else {
                continue;
            };
            let value = row.get(idx).map(|v| v.as_ref()).unwrap_or("");
            if value.is_empty() || !seen.insert(StoredKey::new(self.types[idx], value)) {
                *slot = None;
            }
        }
    }

    pub fn is_exhausted(&self) -> bool {
        self.candidates.iter().all(Option::is_none)
    }

    pub fn finish(&self) -> Option<usize> {
        self.candidates.iter().position(Option::is_some)
    }
}

pub fn detect_primary_key(
    source: &CsvSource,
    types: &[ColumnType],
    row_limit: usize,
) -> Result<PrimaryKeyDetection> {
    let rows = source.count_data_lines()?;
    if rows > row_limit {
        return Ok(PrimaryKeyDetection::TooLarge {
            rows,
            limit: row_limit,
        });
    }
    let mut detector = PrimaryKeyDetector::new(types);
    let mut scanned = 0usize;
    for row in source.rows()? {
        detector.observe_row(&row?);
        scanned += 1;
        if detector.is_exhausted() {
            break;
        }
    }
    if scanned == 0 {
        return Ok(PrimaryKeyDetection::NoCandidate);
    }
    Ok(detector
        .finish()
        .map_or(PrimaryKeyDetection::NoCandidate, PrimaryKeyDetection::Found))
}
