use std::fmt;

use anyhow::Result;
use log::debug;
use rusqlite::types::Value;

use crate::source::CsvSource;

pub const DEFAULT_SAMPLE_ROWS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }

    /// Converts a raw CSV field for insertion. Empty fields become NULL and
    /// values that do not parse as the column type are stored as text.
    pub fn to_value(self, raw: &str) -> Value {
        if raw.is_empty() {
            return Value::Null;
        }
        match self {
            ColumnType::Integer => raw
                .parse::<i64>()
                .map(Value::Integer)
                .unwrap_or_else(|_| Value::Text(raw.to_string())),
            ColumnType::Real => raw
                .parse::<f64>()
                .map(Value::Real)
                .unwrap_or_else(|_| Value::Text(raw.to_string())),
            ColumnType::Text => Value::Text(raw.to_string()),
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sql_type())
    }
}

#[derive(Debug, Clone)]
struct TypeCandidate {
    possible_integer: bool,
    possible_real: bool,
    observed: bool,
}

impl TypeCandidate {
    fn new() -> Self {
        Self {
            possible_integer: true,
            possible_real: true,
            observed: false,
        }
    }

    fn observe(&mut self, value: &str) {
        if value.is_empty() {
            return;
        }
        self.observed = true;
        if self.possible_integer && value.parse::<i64>().is_err() {
            self.possible_integer = false;
        }
        if self.possible_real && value.parse::<f64>().is_err() {
            self.possible_real = false;
        }
    }

    fn decide(&self) -> ColumnType {
        if !self.observed {
            ColumnType::Text
        } else if self.possible_integer {
            ColumnType::Integer
        } else if self.possible_real {
            ColumnType::Real
        } else {
            ColumnType::Text
        }
    }
}

#[derive(Debug, Clone)]
pub struct TypeInferencer {
    candidates: Vec<TypeCandidate>,
}

impl TypeInferencer {
    pub fn new(width: usize) -> Self {
        Self {
            candidates: vec![TypeCandidate::new(); width],
        }
    }

    pub fn observe_row<S: AsRef<str>>(&mut self, row: &[S]) {
        for (candidate, value) in self.candidates.iter_mut().zip(row) {
            candidate.observe(value.as_ref());
        }
    }

    pub fn finish(&self) -> Vec<ColumnType> {
        self.candidates.iter().map(TypeCandidate::decide).collect()
    }
}

pub fn infer_column_type<'a, I>(values: I) -> ColumnType
where
    I: IntoIterator<Item = &'a str>,
{
    let mut candidate = TypeCandidate::new();
    for value in values {
        candidate.observe(value);
    }
    candidate.decide()
}

pub fn infer_types(source: &CsvSource, width: usize, sample_rows: usize) -> Result<Vec<ColumnType>> {
    let mut inferencer = TypeInferencer::new(width);
    let mut sampled = 0usize;
    for row in source.rows()? {
        if sample_rows > 0 && sampled >= sample_rows {
            break;
        }
        inferencer.observe_row(&row?);
        sampled += 1;
    }
    debug!("Sampled {sampled} row(s) of {:?} for type inference", source.path());
    Ok(inferencer.finish())
}
